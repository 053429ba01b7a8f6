//! Synthetic detector for tests and demos.
//!
//! Produces well-formed readout frames covering every slot, channel
//! and sub-sample, with a fixed baseline plus bounded uniform noise.
//! Output is deterministic for a given seed.

use super::{FrameSource, RawFrame, SourceError};
use crate::decode::{
    RecordMeta, SampleRecord, CHANNELS, GROUP_LEN, HEADER_LEN, RECORD_LEN, SAMPLE_MASK, SLOTS,
};
use rand_chacha::ChaCha8Rng;
use rand_core::{RngCore, SeedableRng};
use serde::{Deserialize, Serialize};

/// Settings for the synthetic detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// RNG seed.
    pub seed: u64,
    /// Baseline ADC code of every sample.
    pub baseline: u16,
    /// Maximum deviation from the baseline, in ADC codes.
    pub noise: u16,
    /// Emit a diagnostic text frame before every Nth data frame (0 = never).
    pub diagnostic_every: u32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 0x00C0_FFEE,
            baseline: 8192,
            noise: 16,
            diagnostic_every: 0,
        }
    }
}

/// Synthetic readout source.
#[derive(Debug)]
pub struct MockDetector {
    config: SimulationConfig,
    rng: ChaCha8Rng,
    /// Data frames produced so far.
    sequence: u64,
    /// Stop after this many data frames.
    limit: Option<u64>,
    /// Diagnostic frame waiting to be returned ahead of the next data frame.
    pending_text: bool,
}

impl MockDetector {
    pub fn new(config: SimulationConfig) -> Self {
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        Self {
            config,
            rng,
            sequence: 0,
            limit: None,
            pending_text: false,
        }
    }

    /// Ends the stream after `frames` data frames.
    pub fn with_limit(mut self, frames: u64) -> Self {
        self.limit = Some(frames);
        self
    }

    /// Number of data frames produced so far.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Generates the next data frame.
    pub fn data_frame(&mut self) -> RawFrame {
        let mut payload = Vec::with_capacity(HEADER_LEN + SLOTS * CHANNELS * 2 * RECORD_LEN);
        payload.extend_from_slice(&(self.sequence as u32).to_le_bytes());
        payload.resize(HEADER_LEN, 0);

        for slot in 0..SLOTS as u16 {
            for channel in 0..CHANNELS as u8 {
                for last in [false, true] {
                    let samples: [u16; GROUP_LEN] = std::array::from_fn(|_| self.sample());
                    let record = SampleRecord {
                        meta: RecordMeta {
                            channel,
                            last,
                            slot,
                        },
                        samples,
                    };
                    payload.extend_from_slice(&record.encode());
                }
            }
        }

        self.sequence += 1;
        RawFrame::data(payload)
    }

    fn sample(&mut self) -> u16 {
        let noise = self.config.noise as i32;
        let span = (2 * noise + 1) as u32;
        let offset = (self.rng.next_u32() % span) as i32 - noise;
        (self.config.baseline as i32 + offset).clamp(0, SAMPLE_MASK as i32) as u16
    }

    fn exhausted(&self) -> bool {
        self.limit.is_some_and(|limit| self.sequence >= limit)
    }
}

impl Default for MockDetector {
    fn default() -> Self {
        Self::new(SimulationConfig::default())
    }
}

impl FrameSource for MockDetector {
    fn next_frame(&mut self) -> Result<Option<RawFrame>, SourceError> {
        if self.exhausted() {
            return Ok(None);
        }

        let every = self.config.diagnostic_every as u64;
        if every > 0 && self.sequence % every == 0 && !self.pending_text {
            self.pending_text = true;
            let text = format!("mock detector: frame {} armed\n", self.sequence);
            return Ok(Some(RawFrame::text(1, &text)));
        }

        self.pending_text = false;
        Ok(Some(self.data_frame()))
    }
}
