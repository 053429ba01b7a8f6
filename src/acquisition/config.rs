//! Acquisition configuration.
//!
//! Everything has a default, so an empty file (or no file) is a valid
//! configuration. Command-line flags override file values.

use super::RunRate;
use crate::analysis::AnalysisConfig;
use crate::decode::SAMPLE_MASK;
use crate::source::SimulationConfig;
use crate::store::StoreConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Upper bound on the fixed trigger rate.
const MAX_RATE_HZ: u32 = 1000;

/// Run and buffering parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Trigger rate in Hz; 0 selects auto (trigger once each frame lands).
    pub rate_hz: u32,
    /// Number of triggers issued by a simulated run.
    pub frame_count: u64,
    /// Frames decoded per parallel batch (1 = frame by frame).
    pub batch_size: usize,
    /// Store bound; unbounded when absent.
    pub max_frames: Option<usize>,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            rate_hz: 0,
            frame_count: 100,
            batch_size: 1,
            max_frames: None,
        }
    }
}

impl AcquisitionConfig {
    /// Returns the configured trigger rate.
    pub fn rate(&self) -> RunRate {
        RunRate::from_hz(self.rate_hz)
    }

    /// Returns the store configuration.
    pub fn store(&self) -> StoreConfig {
        StoreConfig {
            max_frames: self.max_frames,
        }
    }

    /// Validates the acquisition parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rate_hz > MAX_RATE_HZ {
            return Err(ConfigError::InvalidRate(self.rate_hz));
        }
        if self.frame_count == 0 {
            return Err(ConfigError::InvalidFrameCount);
        }
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidBatchSize);
        }
        if self.max_frames == Some(0) {
            return Err(ConfigError::InvalidStoreBound);
        }
        Ok(())
    }
}

/// Output configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Metrics server port (0 to disable).
    pub metrics_port: u16,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { metrics_port: 9090 }
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid trigger rate {0} Hz (must be 0-1000, 0 = auto)")]
    InvalidRate(u32),
    #[error("frame count must be at least 1")]
    InvalidFrameCount,
    #[error("batch size must be at least 1")]
    InvalidBatchSize,
    #[error("store bound must be at least 1 frame")]
    InvalidStoreBound,
    #[error("simulated signal exceeds the 14-bit ADC range")]
    InvalidSimulation,
    #[error("failed to read config file: {0}")]
    FileReadError(String),
    #[error("failed to parse config file: {0}")]
    ParseError(String),
}

/// Full configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    #[serde(default)]
    pub acquisition: AcquisitionConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl FileConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileReadError(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parses configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: FileConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.acquisition.validate()?;

        let sim = &self.simulation;
        if sim.baseline > SAMPLE_MASK || sim.noise > SAMPLE_MASK / 2 {
            return Err(ConfigError::InvalidSimulation);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        assert!(FileConfig::default().validate().is_ok());
    }

    #[test]
    fn test_empty_file_is_default() {
        let config = FileConfig::from_toml("").unwrap();
        assert_eq!(config.acquisition, AcquisitionConfig::default());
        assert_eq!(config.analysis.skip_leading_frames, 10);
        assert_eq!(config.acquisition.rate(), RunRate::Auto);
    }

    #[test]
    fn test_sections_parse() {
        let config = FileConfig::from_toml(
            r#"
            [acquisition]
            rate_hz = 10
            frame_count = 20
            max_frames = 500

            [analysis]
            skip_leading_frames = 0
            output = "noise.npy"

            [simulation]
            seed = 7
            noise = 0
            "#,
        )
        .unwrap();

        assert_eq!(config.acquisition.rate(), RunRate::Hz(10));
        assert_eq!(config.acquisition.store().max_frames, Some(500));
        assert_eq!(config.analysis.skip_leading_frames, 0);
        assert_eq!(
            config.analysis.output.as_deref(),
            Some(Path::new("noise.npy"))
        );
        assert_eq!(config.simulation.seed, 7);
        assert_eq!(config.simulation.baseline, 8192);
        assert_eq!(config.output.metrics_port, 9090);
    }

    #[test]
    fn test_zero_frame_count_invalid() {
        assert!(matches!(
            FileConfig::from_toml("[acquisition]\nframe_count = 0\n"),
            Err(ConfigError::InvalidFrameCount)
        ));
    }

    #[test]
    fn test_rate_out_of_range() {
        let config = AcquisitionConfig {
            rate_hz: 5000,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidRate(5000))));
    }

    #[test]
    fn test_simulation_range_checked() {
        assert!(matches!(
            FileConfig::from_toml("[simulation]\nbaseline = 20000\n"),
            Err(ConfigError::InvalidSimulation)
        ));
    }

    #[test]
    fn test_malformed_toml() {
        assert!(matches!(
            FileConfig::from_toml("[acquisition\n"),
            Err(ConfigError::ParseError(_))
        ));
    }
}
