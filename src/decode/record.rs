//! 16-byte sample record layout.
//!
//! ```text
//! byte  0..2   metadata word (LE): channel[0:4] last[4] slot[5:16]
//! byte  2..9   56-bit LE word, sub-samples 0..4 (14 bits each)
//! byte  9..16  56-bit LE word, sub-samples 4..8 (14 bits each)
//! ```

use winnow::{binary::le_u16, error::ContextError, token::take, Parser};

/// Size of one record in bytes.
pub const RECORD_LEN: usize = 16;

/// Width of one ADC sub-sample in bits.
pub const SAMPLE_BITS: u32 = 14;

/// Mask selecting one 14-bit sub-sample.
pub const SAMPLE_MASK: u16 = (1 << SAMPLE_BITS) - 1;

/// Number of sub-samples carried by one record.
pub const GROUP_LEN: usize = 8;

/// Sub-samples packed into each 56-bit word.
const SAMPLES_PER_WORD: usize = 4;

/// Bytes in one packed 56-bit word.
const WORD_BYTES: usize = 7;

/// Decoded metadata word of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordMeta {
    /// ADC channel (4 bits on the wire, only 0..12 are populated).
    pub channel: u8,
    /// Selects the second group of eight sub-samples.
    pub last: bool,
    /// Readout slot (11 bits on the wire).
    pub slot: u16,
}

impl RecordMeta {
    /// Unpacks a metadata word.
    pub fn from_word(word: u16) -> Self {
        Self {
            channel: (word & 0xF) as u8,
            last: (word >> 4) & 1 == 1,
            slot: word >> 5,
        }
    }

    /// Packs the fields back into a metadata word.
    ///
    /// Fields wider than their wire width are truncated.
    pub fn to_word(self) -> u16 {
        ((self.slot & 0x7FF) << 5) | ((self.last as u16) << 4) | (self.channel as u16 & 0xF)
    }

    /// First sub-sample index written by this record.
    #[inline]
    pub fn group_offset(&self) -> usize {
        if self.last {
            GROUP_LEN
        } else {
            0
        }
    }
}

/// One parsed record: its location and eight 14-bit sub-samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleRecord {
    pub meta: RecordMeta,
    pub samples: [u16; GROUP_LEN],
}

impl SampleRecord {
    /// Encodes the record into its 16-byte wire form.
    ///
    /// Sub-samples are masked to 14 bits.
    pub fn encode(&self) -> [u8; RECORD_LEN] {
        let mut out = [0u8; RECORD_LEN];
        out[0..2].copy_from_slice(&self.meta.to_word().to_le_bytes());

        let (low, high) = self.samples.split_at(SAMPLES_PER_WORD);
        out[2..9].copy_from_slice(&pack_word(low).to_le_bytes()[..WORD_BYTES]);
        out[9..16].copy_from_slice(&pack_word(high).to_le_bytes()[..WORD_BYTES]);
        out
    }
}

/// Splits a 56-bit word into four 14-bit sub-samples, least significant first.
pub fn unpack_word(word: u64) -> [u16; SAMPLES_PER_WORD] {
    std::array::from_fn(|i| ((word >> (i as u32 * SAMPLE_BITS)) as u16) & SAMPLE_MASK)
}

fn pack_word(samples: &[u16]) -> u64 {
    samples
        .iter()
        .enumerate()
        .fold(0u64, |acc, (i, &s)| {
            acc | (((s & SAMPLE_MASK) as u64) << (i as u32 * SAMPLE_BITS))
        })
}

/// Parses a 56-bit little-endian unsigned integer.
fn le_u56(input: &mut &[u8]) -> Result<u64, ContextError> {
    let bytes = take::<_, _, ContextError>(WORD_BYTES).parse_next(input)?;
    let mut buf = [0u8; 8];
    buf[..WORD_BYTES].copy_from_slice(bytes);
    Ok(u64::from_le_bytes(buf))
}

/// Parses one 16-byte record.
pub fn parse_record(input: &mut &[u8]) -> Result<SampleRecord, ContextError> {
    let word = le_u16::<_, ContextError>.parse_next(input)?;
    let low = le_u56.parse_next(input)?;
    let high = le_u56.parse_next(input)?;

    let mut samples = [0u16; GROUP_LEN];
    samples[..SAMPLES_PER_WORD].copy_from_slice(&unpack_word(low));
    samples[SAMPLES_PER_WORD..].copy_from_slice(&unpack_word(high));

    Ok(SampleRecord {
        meta: RecordMeta::from_word(word),
        samples,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meta_fields() {
        // slot 3, last, channel 5
        let meta = RecordMeta::from_word((3 << 5) | (1 << 4) | 5);

        assert_eq!(meta.channel, 5);
        assert!(meta.last);
        assert_eq!(meta.slot, 3);
        assert_eq!(meta.group_offset(), 8);
    }

    #[test]
    fn test_meta_full_width_slot() {
        let meta = RecordMeta::from_word(0xFFE0);
        assert_eq!(meta.slot, 2047);
        assert_eq!(meta.channel, 0);
        assert!(!meta.last);
    }

    #[test]
    fn test_unpack_word_masks_14_bits() {
        let word = 100u64 | (200 << 14) | (300 << 28) | (400 << 42);
        assert_eq!(unpack_word(word), [100, 200, 300, 400]);
        assert_eq!(unpack_word(u64::MAX), [SAMPLE_MASK; 4]);
    }

    #[test]
    fn test_parse_known_bytes() {
        let mut bytes = vec![0x25, 0x00]; // slot 1, last 0, channel 5
        // low word: sub-sample 0 = 0x3FFF, others 0
        bytes.extend_from_slice(&[0xFF, 0x3F, 0, 0, 0, 0, 0]);
        // high word: sub-sample 4 = 1
        bytes.extend_from_slice(&[0x01, 0, 0, 0, 0, 0, 0]);

        let mut input = bytes.as_slice();
        let record = parse_record(&mut input).unwrap();

        assert!(input.is_empty());
        assert_eq!(record.meta.slot, 1);
        assert_eq!(record.meta.channel, 5);
        assert_eq!(record.samples, [0x3FFF, 0, 0, 0, 1, 0, 0, 0]);
    }

    #[test]
    fn test_short_input_fails() {
        let bytes = [0u8; 10];
        let mut input = &bytes[..];
        assert!(parse_record(&mut input).is_err());
    }

    #[test]
    fn test_encode_matches_parse() {
        let record = SampleRecord {
            meta: RecordMeta {
                channel: 11,
                last: true,
                slot: 255,
            },
            samples: [1, 2, 3, 16383, 8192, 0, 42, 7],
        };

        let bytes = record.encode();
        let mut input = &bytes[..];
        assert_eq!(parse_record(&mut input).unwrap(), record);
    }
}
