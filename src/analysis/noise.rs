//! Per-pixel noise characterization.
//!
//! A pixel is one (channel, subsample) pair. Its noise is the spread of
//! the values it reports across every retained frame, computed
//! separately over even slots (2, 4, ..., 254) and odd slots
//! (3, 5, ..., 255) to follow the interleaved ADC read pattern.
//! Slots 0 and 1 are not used. Parity is taken over the slot axis;
//! the sixteen subsamples of a slot always share one parity class.

use super::export::{save_npy, stack_frames};
use super::statistics::RunningStats;
use crate::decode::{CHANNELS, SUBSAMPLES};
use crate::store::{SampleStore, StoreSnapshot};
use chrono::{DateTime, Utc};
use ndarray::Axis;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

/// First slot included in the parity partition.
const FIRST_SLOT: usize = 2;

/// Errors raised by the noise analysis.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("no frames to analyze ({total} stored, {skipped} skipped)")]
    NoFrames { total: usize, skipped: usize },
    #[error("analysis cancelled")]
    Cancelled,
    #[error("failed to save sample buffer: {0}")]
    Export(#[from] ndarray_npy::WriteNpyError),
    #[error("failed to serialize report: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Noise of a single pixel, in ADC codes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PixelNoise {
    pub channel: usize,
    pub subsample: usize,
    /// Rounded standard deviation over even slots.
    pub even: f64,
    /// Rounded standard deviation over odd slots.
    pub odd: f64,
}

impl PixelNoise {
    /// Ranking key: the noisier of the two partitions.
    #[inline]
    pub fn worst(&self) -> f64 {
        self.even.max(self.odd)
    }
}

/// Result of a noise pass.
#[derive(Debug, Clone, Serialize)]
pub struct NoiseReport {
    pub generated_at: DateTime<Utc>,
    /// Frames in the store when the pass ran.
    pub total_frames: usize,
    /// Leading frames excluded as warm-up.
    pub skipped_frames: usize,
    /// Frames contributing to the statistics.
    pub analyzed_frames: usize,
    /// Where the sample buffer was saved, if requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved_to: Option<PathBuf>,
    /// Every pixel, ordered by (channel, subsample).
    pub pixels: Vec<PixelNoise>,
    /// Quietest pixels, quietest first.
    pub best: Vec<PixelNoise>,
    /// Noisiest pixels, noisiest first.
    pub worst: Vec<PixelNoise>,
}

impl NoiseReport {
    /// Looks up one pixel.
    pub fn pixel(&self, channel: usize, subsample: usize) -> Option<&PixelNoise> {
        self.pixels
            .get(channel * SUBSAMPLES + subsample)
            .filter(|p| p.channel == channel && p.subsample == subsample)
    }

    /// Serializes the report as TOML.
    pub fn to_toml(&self) -> Result<String, AnalysisError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Writes the report as TOML to `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), AnalysisError> {
        std::fs::write(path.as_ref(), self.to_toml()?)?;
        tracing::info!(path = %path.as_ref().display(), "Saved noise report");
        Ok(())
    }
}

impl fmt::Display for NoiseReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} frames ({} skipped, {} analyzed)",
            self.total_frames, self.skipped_frames, self.analyzed_frames
        )?;
        writeln!(f, "Pixel noise (channel, subsample): even, odd")?;
        for p in &self.pixels {
            writeln!(f, "  ({:2}, {:2}): {:6} {:6}", p.channel, p.subsample, p.even, p.odd)?;
        }
        writeln!(f, "Best {}", self.best.len())?;
        for p in &self.best {
            writeln!(f, "  ({:2}, {:2}): {:6} {:6}", p.channel, p.subsample, p.even, p.odd)?;
        }
        writeln!(f, "Worst {}", self.worst.len())?;
        for p in &self.worst {
            writeln!(f, "  ({:2}, {:2}): {:6} {:6}", p.channel, p.subsample, p.even, p.odd)?;
        }
        Ok(())
    }
}

/// Runs the noise pass over a sample store.
#[derive(Debug, Clone)]
pub struct NoiseAnalyzer {
    /// Length of the best/worst lists.
    ranked: usize,
}

impl NoiseAnalyzer {
    /// Creates an analyzer reporting `ranked` best and worst pixels.
    pub fn new(ranked: usize) -> Self {
        Self { ranked }
    }

    /// Analyzes every frame from `skip_leading_frames` onward.
    ///
    /// When `output` is given, the whole buffer (skipped frames included)
    /// is also saved there as `.npy`.
    pub fn analyze(
        &self,
        store: &SampleStore,
        skip_leading_frames: usize,
        output: Option<&Path>,
    ) -> Result<NoiseReport, AnalysisError> {
        self.analyze_with_cancel(store, skip_leading_frames, output, &AtomicBool::new(false))
    }

    /// Like [`analyze`](Self::analyze), checking `cancel` between frames.
    pub fn analyze_with_cancel(
        &self,
        store: &SampleStore,
        skip_leading_frames: usize,
        output: Option<&Path>,
        cancel: &AtomicBool,
    ) -> Result<NoiseReport, AnalysisError> {
        let snapshot = store.snapshot();
        let total = snapshot.len();
        let analyzed = total.saturating_sub(skip_leading_frames);
        if analyzed == 0 {
            return Err(AnalysisError::NoFrames {
                total,
                skipped: skip_leading_frames,
            });
        }

        let pixels = pixel_noise(&snapshot, skip_leading_frames, cancel)?;

        let mut ranked = pixels.clone();
        ranked.sort_by(|a, b| a.worst().total_cmp(&b.worst()));
        let best: Vec<PixelNoise> = ranked.iter().take(self.ranked).copied().collect();
        let worst: Vec<PixelNoise> = ranked.iter().rev().take(self.ranked).copied().collect();

        let saved_to = match output {
            Some(path) => {
                let stacked = stack_frames(&snapshot, cancel).ok_or(AnalysisError::Cancelled)?;
                save_npy(path, &stacked)?;
                Some(path.to_path_buf())
            }
            None => None,
        };

        tracing::info!(
            total,
            analyzed,
            quietest = ?best.first().map(PixelNoise::worst),
            noisiest = ?worst.first().map(PixelNoise::worst),
            "Noise analysis complete"
        );

        Ok(NoiseReport {
            generated_at: Utc::now(),
            total_frames: total,
            skipped_frames: total - analyzed,
            analyzed_frames: analyzed,
            saved_to,
            pixels,
            best,
            worst,
        })
    }
}

impl Default for NoiseAnalyzer {
    fn default() -> Self {
        Self::new(10)
    }
}

fn pixel_noise(
    snapshot: &StoreSnapshot,
    skip: usize,
    cancel: &AtomicBool,
) -> Result<Vec<PixelNoise>, AnalysisError> {
    // [channel][subsample][parity]
    let mut stats = [[[RunningStats::new(); 2]; SUBSAMPLES]; CHANNELS];

    for frame in snapshot.iter().skip(skip) {
        if cancel.load(Ordering::Relaxed) {
            return Err(AnalysisError::Cancelled);
        }

        let view = frame.view();
        for (slot, slot_view) in view.axis_iter(Axis(0)).enumerate().skip(FIRST_SLOT) {
            let parity = slot % 2;
            for (channel, row) in slot_view.outer_iter().enumerate() {
                for (subsample, &value) in row.iter().enumerate() {
                    stats[channel][subsample][parity].push(value as f64);
                }
            }
        }
    }

    let mut pixels = Vec::with_capacity(CHANNELS * SUBSAMPLES);
    for (channel, per_channel) in stats.iter().enumerate() {
        for (subsample, [even, odd]) in per_channel.iter().enumerate() {
            pixels.push(PixelNoise {
                channel,
                subsample,
                even: rounded_std(even),
                odd: rounded_std(odd),
            });
        }
    }
    Ok(pixels)
}

fn rounded_std(stats: &RunningStats) -> f64 {
    stats.std_dev().map(f64::round_ties_even).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::{DecodedFrame, RecordMeta, SampleRecord, SLOTS};

    fn uniform_store(frames: usize, value: u16) -> SampleStore {
        let store = SampleStore::unbounded();
        for _ in 0..frames {
            store.append(DecodedFrame::filled(value)).unwrap();
        }
        store
    }

    #[test]
    fn test_uniform_frames_have_zero_noise() {
        let store = uniform_store(20, 500);
        let report = NoiseAnalyzer::default().analyze(&store, 0, None).unwrap();

        assert_eq!(report.analyzed_frames, 20);
        assert_eq!(report.pixels.len(), CHANNELS * SUBSAMPLES);
        assert!(report.pixels.iter().all(|p| p.even == 0.0 && p.odd == 0.0));
    }

    #[test]
    fn test_empty_store_is_an_error() {
        let store = SampleStore::unbounded();
        assert!(matches!(
            NoiseAnalyzer::default().analyze(&store, 0, None),
            Err(AnalysisError::NoFrames { total: 0, .. })
        ));
    }

    #[test]
    fn test_all_frames_skipped_is_an_error() {
        let store = uniform_store(10, 1);
        assert!(matches!(
            NoiseAnalyzer::default().analyze(&store, 10, None),
            Err(AnalysisError::NoFrames {
                total: 10,
                skipped: 10
            })
        ));
    }

    #[test]
    fn test_skipped_frames_excluded() {
        let store = SampleStore::unbounded();
        // A wildly different warm-up frame followed by uniform data.
        store.append(DecodedFrame::filled(16000)).unwrap();
        for _ in 0..3 {
            store.append(DecodedFrame::filled(100)).unwrap();
        }

        let report = NoiseAnalyzer::default().analyze(&store, 1, None).unwrap();
        assert_eq!(report.skipped_frames, 1);
        assert!(report.pixels.iter().all(|p| p.worst() == 0.0));
    }

    #[test]
    fn test_parity_partitions_are_separate() {
        // Even slots alternate 0/10 across frames; odd slots stay constant.
        let store = SampleStore::unbounded();
        for f in 0..4u16 {
            let mut frame = DecodedFrame::zeroed();
            for slot in (FIRST_SLOT..SLOTS).step_by(2) {
                frame.place(&SampleRecord {
                    meta: RecordMeta {
                        channel: 0,
                        last: false,
                        slot: slot as u16,
                    },
                    samples: [(f % 2) * 10; 8],
                });
            }
            store.append(frame).unwrap();
        }

        let report = NoiseAnalyzer::default().analyze(&store, 0, None).unwrap();
        let pixel = report.pixel(0, 0).unwrap();
        assert_eq!(pixel.even, 5.0);
        assert_eq!(pixel.odd, 0.0);
        assert_eq!(report.pixel(0, 8).unwrap().worst(), 0.0);
    }

    #[test]
    fn test_parity_follows_slot_not_subsample() {
        // Noise on odd slots only, in every subsample of the group.
        let store = SampleStore::unbounded();
        for f in 0..4u16 {
            let mut frame = DecodedFrame::zeroed();
            for slot in (FIRST_SLOT + 1..SLOTS).step_by(2) {
                frame.place(&SampleRecord {
                    meta: RecordMeta {
                        channel: 2,
                        last: false,
                        slot: slot as u16,
                    },
                    samples: [(f % 2) * 10; 8],
                });
            }
            store.append(frame).unwrap();
        }

        let report = NoiseAnalyzer::default().analyze(&store, 0, None).unwrap();
        for subsample in 0..8 {
            let pixel = report.pixel(2, subsample).unwrap();
            assert_eq!(pixel.even, 0.0, "subsample {}", subsample);
            assert_eq!(pixel.odd, 5.0, "subsample {}", subsample);
        }
    }

    #[test]
    fn test_slots_zero_and_one_ignored() {
        let store = SampleStore::unbounded();
        for f in 0..2u16 {
            let mut frame = DecodedFrame::zeroed();
            for slot in 0..2 {
                frame.place(&SampleRecord {
                    meta: RecordMeta {
                        channel: 3,
                        last: false,
                        slot,
                    },
                    samples: [f * 1000; 8],
                });
            }
            store.append(frame).unwrap();
        }

        let report = NoiseAnalyzer::default().analyze(&store, 0, None).unwrap();
        assert_eq!(report.pixel(3, 0).unwrap().worst(), 0.0);
    }

    #[test]
    fn test_ranking() {
        // Channel 5 / subsample 3 gets noise on odd slots only.
        let store = SampleStore::unbounded();
        for f in 0..2u16 {
            let mut frame = DecodedFrame::zeroed();
            frame.place(&SampleRecord {
                meta: RecordMeta {
                    channel: 5,
                    last: false,
                    slot: 3,
                },
                samples: [0, 0, 0, f * 200, 0, 0, 0, 0],
            });
            store.append(frame).unwrap();
        }

        let report = NoiseAnalyzer::new(3).analyze(&store, 0, None).unwrap();

        assert_eq!(report.best.len(), 3);
        assert_eq!(report.worst.len(), 3);
        let noisiest = report.worst[0];
        assert_eq!((noisiest.channel, noisiest.subsample), (5, 3));
        assert!(noisiest.odd > 0.0);
        assert_eq!(noisiest.even, 0.0);
        // Stable order among equal keys: earliest positions first.
        assert_eq!((report.best[0].channel, report.best[0].subsample), (0, 0));
        assert_eq!((report.best[2].channel, report.best[2].subsample), (0, 2));
    }

    #[test]
    fn test_cancel() {
        let store = uniform_store(3, 1);
        assert!(matches!(
            NoiseAnalyzer::default().analyze_with_cancel(&store, 0, None, &AtomicBool::new(true)),
            Err(AnalysisError::Cancelled)
        ));
    }

    #[test]
    fn test_output_saved() {
        let store = uniform_store(12, 7);
        let path = std::env::temp_dir().join(format!(
            "coulter-daq-noise-{}.npy",
            std::process::id()
        ));

        let report = NoiseAnalyzer::default()
            .analyze(&store, 10, Some(&path))
            .unwrap();
        let loaded: ndarray::Array4<u16> = ndarray_npy::read_npy(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(report.saved_to.as_deref(), Some(path.as_path()));
        assert_eq!(loaded.shape(), &[12, SLOTS, CHANNELS, SUBSAMPLES]);
    }

    #[test]
    fn test_report_toml() {
        let store = uniform_store(2, 9);
        let report = NoiseAnalyzer::new(2).analyze(&store, 0, None).unwrap();
        let text = report.to_toml().unwrap();

        assert!(text.contains("analyzed_frames = 2"));
        assert!(text.contains("[[pixels]]"));
        assert!(!text.contains("saved_to"));
    }
}
