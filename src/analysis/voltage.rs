//! ADC code conversion.
//!
//! The ADC reports bipolar 14-bit two's-complement codes. Voltages are
//! expressed on a 0..2 scale centred at 1.0.

use crate::decode::{SAMPLE_BITS, SAMPLE_MASK};

const SIGN_BIT: u16 = 1 << (SAMPLE_BITS - 1);
const FULL_SCALE: f64 = (1u32 << SAMPLE_BITS) as f64;

/// Interprets the low 14 bits of `value` as a signed two's-complement code.
#[inline]
pub fn sign_extend(value: u16) -> i16 {
    (value & (SIGN_BIT - 1)) as i16 - (value & SIGN_BIT) as i16
}

/// Converts a raw 14-bit code to a normalized voltage.
#[inline]
pub fn voltage(adc: u16) -> f64 {
    sign_extend(adc) as f64 / FULL_SCALE + 1.0
}

/// Converts a normalized voltage back to the nearest 14-bit code.
///
/// Values outside the ADC range are clamped.
pub fn adc_code(voltage: f64) -> u16 {
    let signed = ((voltage - 1.0) * FULL_SCALE).round();
    let min = -(SIGN_BIT as f64);
    let max = (SIGN_BIT - 1) as f64;
    (signed.clamp(min, max) as i16 as u16) & SAMPLE_MASK
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_sign_extend_boundaries() {
        assert_eq!(sign_extend(0), 0);
        assert_eq!(sign_extend(0x1FFF), 8191);
        assert_eq!(sign_extend(0x2000), -8192);
        assert_eq!(sign_extend(0x3FFF), -1);
    }

    #[test]
    fn test_voltage_scale() {
        assert_eq!(voltage(0), 1.0);
        assert_eq!(voltage(0x2000), 0.5);
        assert_eq!(voltage(0x3FFF), 1.0 - 1.0 / 16384.0);
    }

    #[test]
    fn test_round_trip_every_code() {
        for code in 0..=SAMPLE_MASK {
            assert_eq!(adc_code(voltage(code)), code, "code {code}");
        }
    }

    #[test]
    fn test_out_of_range_clamped() {
        assert_eq!(adc_code(5.0), 0x1FFF);
        assert_eq!(adc_code(-5.0), 0x2000);
    }

    proptest! {
        #[test]
        fn prop_voltage_in_range(code in 0u16..=SAMPLE_MASK) {
            let v = voltage(code);
            prop_assert!((0.5..1.5).contains(&v));
        }
    }
}
