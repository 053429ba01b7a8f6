//! Decoded sample array for one acquisition frame.

use super::record::{SampleRecord, GROUP_LEN};
use ndarray::{s, Array3, ArrayView1, ArrayView3};

/// Readout slots per frame.
pub const SLOTS: usize = 256;

/// ADC channels per slot.
pub const CHANNELS: usize = 12;

/// Sub-samples per (slot, channel) pair.
pub const SUBSAMPLES: usize = 16;

/// Dense `[slot][channel][subsample]` array of 14-bit ADC codes.
///
/// Created zeroed and populated record by record. Cells not covered
/// by any record stay 0.
#[derive(Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    samples: Array3<u16>,
}

impl DecodedFrame {
    /// Creates an all-zero frame.
    pub fn zeroed() -> Self {
        Self {
            samples: Array3::zeros((SLOTS, CHANNELS, SUBSAMPLES)),
        }
    }

    /// Creates a frame with every cell set to `value`.
    pub fn filled(value: u16) -> Self {
        Self {
            samples: Array3::from_elem((SLOTS, CHANNELS, SUBSAMPLES), value),
        }
    }

    /// Writes one record's eight sub-samples into place.
    ///
    /// Returns `false` without touching the array when the record's slot
    /// or channel lies outside the frame geometry.
    pub fn place(&mut self, record: &SampleRecord) -> bool {
        let slot = record.meta.slot as usize;
        let channel = record.meta.channel as usize;
        if slot >= SLOTS || channel >= CHANNELS {
            return false;
        }

        let start = record.meta.group_offset();
        self.samples
            .slice_mut(s![slot, channel, start..start + GROUP_LEN])
            .iter_mut()
            .zip(record.samples.iter())
            .for_each(|(cell, &value)| *cell = value);
        true
    }

    /// Returns the value at `(slot, channel, subsample)`, or `None` if out of range.
    #[inline]
    pub fn get(&self, slot: usize, channel: usize, subsample: usize) -> Option<u16> {
        self.samples.get((slot, channel, subsample)).copied()
    }

    /// Returns the sixteen sub-samples of one (slot, channel) pair.
    pub fn subsamples(&self, slot: usize, channel: usize) -> Option<ArrayView1<'_, u16>> {
        if slot >= SLOTS || channel >= CHANNELS {
            return None;
        }
        Some(self.samples.slice(s![slot, channel, ..]))
    }

    /// Returns a view of the whole array.
    #[inline]
    pub fn view(&self) -> ArrayView3<'_, u16> {
        self.samples.view()
    }

    /// Returns true if every cell is zero.
    pub fn is_blank(&self) -> bool {
        self.samples.iter().all(|&v| v == 0)
    }
}

impl Default for DecodedFrame {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl std::fmt::Debug for DecodedFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let populated = self.samples.iter().filter(|&&v| v != 0).count();
        f.debug_struct("DecodedFrame")
            .field("shape", &self.samples.shape())
            .field("nonzero_cells", &populated)
            .finish()
    }
}
