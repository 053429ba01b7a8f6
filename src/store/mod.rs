//! Append-only sample store.
//!
//! Holds every decoded frame of an acquisition session in arrival
//! order. One writer appends; any number of readers query through
//! cheap snapshots. A frame is published only once it is fully
//! decoded, so readers never see a partially populated array.

mod series;

pub use series::{ChannelSeries, PixelSeries, SeriesPoint};

use crate::decode::{DecodedFrame, CHANNELS, SUBSAMPLES};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors raised by the store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("store is full ({capacity} frames)")]
    CapacityExceeded { capacity: usize },
    #[error("{axis} index {index} out of range (limit {limit})")]
    OutOfRange {
        axis: &'static str,
        index: usize,
        limit: usize,
    },
}

/// Store configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Maximum number of frames retained. `None` keeps everything.
    pub max_frames: Option<usize>,
}

struct Shared {
    frames: RwLock<Vec<Arc<DecodedFrame>>>,
    grown: Mutex<()>,
    signal: Condvar,
    config: StoreConfig,
    rejected: AtomicU64,
}

/// Shared handle to the frame buffer.
///
/// Cloning the handle shares the same underlying store.
#[derive(Clone)]
pub struct SampleStore {
    shared: Arc<Shared>,
}

impl SampleStore {
    /// Creates a store with the given configuration.
    pub fn new(config: StoreConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                frames: RwLock::new(Vec::new()),
                grown: Mutex::new(()),
                signal: Condvar::new(),
                config,
                rejected: AtomicU64::new(0),
            }),
        }
    }

    /// Creates a store with no frame limit.
    pub fn unbounded() -> Self {
        Self::new(StoreConfig::default())
    }

    /// Appends a fully decoded frame and returns its index.
    pub fn append(&self, frame: DecodedFrame) -> Result<usize, StoreError> {
        let index = {
            let mut frames = self
                .shared
                .frames
                .write()
                .unwrap_or_else(PoisonError::into_inner);

            if let Some(capacity) = self.shared.config.max_frames {
                if frames.len() >= capacity {
                    self.shared.rejected.fetch_add(1, Ordering::Relaxed);
                    return Err(StoreError::CapacityExceeded { capacity });
                }
            }

            frames.push(Arc::new(frame));
            frames.len() - 1
        };

        let _guard = self
            .shared
            .grown
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.shared.signal.notify_all();

        tracing::trace!(index, "Appended frame to store");
        Ok(index)
    }

    /// Returns the frame at `index`.
    pub fn get(&self, index: usize) -> Option<Arc<DecodedFrame>> {
        self.read().get(index).cloned()
    }

    /// Returns the number of stored frames.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Returns true if no frame has been stored yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns how many appends were refused because the store was full.
    pub fn rejected(&self) -> u64 {
        self.shared.rejected.load(Ordering::Relaxed)
    }

    /// Takes a point-in-time view of every stored frame.
    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            frames: self.read().iter().cloned().collect(),
        }
    }

    /// Values at `(channel, subsample)` for every frame and slot.
    pub fn pixel_series(&self, channel: usize, subsample: usize) -> Result<PixelSeries, StoreError> {
        check_channel(channel)?;
        check_subsample(subsample)?;
        Ok(PixelSeries::new(self.snapshot(), channel, subsample))
    }

    /// Every value of `channel` across frames, slots and subsamples.
    pub fn channel_series(&self, channel: usize) -> Result<ChannelSeries, StoreError> {
        check_channel(channel)?;
        Ok(ChannelSeries::new(self.snapshot(), channel))
    }

    /// Blocks until at least `count` frames are stored.
    ///
    /// Returns false if `timeout` elapsed first.
    pub fn wait_for_len(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self
            .shared
            .grown
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        loop {
            if self.len() >= count {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            guard = self
                .shared
                .signal
                .wait_timeout(guard, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<Arc<DecodedFrame>>> {
        self.shared
            .frames
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SampleStore {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl std::fmt::Debug for SampleStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleStore")
            .field("frames", &self.len())
            .field("max_frames", &self.shared.config.max_frames)
            .field("rejected", &self.rejected())
            .finish()
    }
}

fn check_channel(channel: usize) -> Result<(), StoreError> {
    if channel >= CHANNELS {
        return Err(StoreError::OutOfRange {
            axis: "channel",
            index: channel,
            limit: CHANNELS,
        });
    }
    Ok(())
}

fn check_subsample(subsample: usize) -> Result<(), StoreError> {
    if subsample >= SUBSAMPLES {
        return Err(StoreError::OutOfRange {
            axis: "subsample",
            index: subsample,
            limit: SUBSAMPLES,
        });
    }
    Ok(())
}

/// Immutable, restartable view of the store at one point in time.
#[derive(Clone)]
pub struct StoreSnapshot {
    frames: Arc<[Arc<DecodedFrame>]>,
}

impl StoreSnapshot {
    /// Number of frames in the view.
    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Returns true if the view holds no frames.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Returns the frame at `index`.
    #[inline]
    pub fn get(&self, index: usize) -> Option<&DecodedFrame> {
        self.frames.get(index).map(Arc::as_ref)
    }

    /// Iterates frames in arrival order. May be called any number of times.
    pub fn iter(&self) -> impl Iterator<Item = &DecodedFrame> + '_ {
        self.frames.iter().map(Arc::as_ref)
    }
}

impl std::fmt::Debug for StoreSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreSnapshot")
            .field("frames", &self.frames.len())
            .finish()
    }
}
