//! Upstream frame sources.
//!
//! The readout hardware is treated as an opaque producer of raw
//! frames. This module provides the trait the acquisition pipeline
//! consumes along with a recorded-stream reader/writer and a
//! synthetic detector for tests and demos.

mod frame;
mod mock;
mod recording;

pub use frame::RawFrame;
pub use mock::{MockDetector, SimulationConfig};
pub use recording::{RecordingSource, RecordingWriter};

use std::sync::mpsc::{Receiver, TryRecvError};
use std::task::Poll;
use thiserror::Error;

/// Errors raised by frame sources.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("recording truncated inside entry {entry}")]
    Truncated { entry: u64 },
    #[error("invalid entry {entry}: size field {size} too small")]
    InvalidEntry { entry: u64, size: u32 },
}

/// Trait for frame producers.
///
/// `Ok(None)` marks the end of the stream.
pub trait FrameSource {
    /// Returns the next raw frame.
    fn next_frame(&mut self) -> Result<Option<RawFrame>, SourceError>;

    /// Returns a frame only if one is ready without waiting.
    ///
    /// `Poll::Pending` means nothing has arrived yet. Sources that never
    /// block keep the default, which defers to [`next_frame`](Self::next_frame).
    fn try_next_frame(&mut self) -> Result<Poll<Option<RawFrame>>, SourceError> {
        self.next_frame().map(Poll::Ready)
    }
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn next_frame(&mut self) -> Result<Option<RawFrame>, SourceError> {
        (**self).next_frame()
    }

    fn try_next_frame(&mut self) -> Result<Poll<Option<RawFrame>>, SourceError> {
        (**self).try_next_frame()
    }
}

/// Frames pushed from another thread. The stream ends when every
/// sender has been dropped.
impl FrameSource for Receiver<RawFrame> {
    fn next_frame(&mut self) -> Result<Option<RawFrame>, SourceError> {
        Ok(self.recv().ok())
    }

    fn try_next_frame(&mut self) -> Result<Poll<Option<RawFrame>>, SourceError> {
        match self.try_recv() {
            Ok(frame) => Ok(Poll::Ready(Some(frame))),
            Err(TryRecvError::Empty) => Ok(Poll::Pending),
            Err(TryRecvError::Disconnected) => Ok(Poll::Ready(None)),
        }
    }
}
