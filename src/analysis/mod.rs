//! Noise characterization of the accumulated sample buffer.
//!
//! This module computes per-pixel noise over a range of stored frames,
//! converts raw ADC codes to voltages and persists the buffer for
//! offline inspection.

mod export;
mod noise;
mod statistics;
mod voltage;

pub use export::{save_npy, stack_frames};
pub use noise::{AnalysisError, NoiseAnalyzer, NoiseReport, PixelNoise};
pub use statistics::RunningStats;
pub use voltage::{adc_code, sign_extend, voltage};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Noise analysis settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Leading warm-up frames excluded from the statistics.
    pub skip_leading_frames: usize,
    /// Length of the best/worst pixel lists.
    pub ranked: usize,
    /// Save the whole buffer here as `.npy`.
    pub output: Option<PathBuf>,
    /// Save the noise report here as TOML.
    pub report: Option<PathBuf>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            skip_leading_frames: 10,
            ranked: 10,
            output: None,
            report: None,
        }
    }
}

impl AnalysisConfig {
    /// Builds an analyzer for these settings.
    pub fn analyzer(&self) -> NoiseAnalyzer {
        NoiseAnalyzer::new(self.ranked)
    }
}
