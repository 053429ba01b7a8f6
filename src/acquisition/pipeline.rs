//! Source → decoder → store pipeline.

use crate::decode::{DecodeStats, DecodedFrame, FrameDecoder, FrameError};
use crate::source::{FrameSource, RawFrame, SourceError};
use crate::store::SampleStore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::Poll;

/// Outcome of draining a source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineSummary {
    /// Raw frames pulled from the source.
    pub frames_seen: u64,
    /// Decoded frames appended to the store.
    pub appended: u64,
    /// Decoded frames the store refused.
    pub rejected: u64,
    /// True if the run stopped on the cancel flag.
    pub cancelled: bool,
}

/// Feeds raw frames through the decoder into the store.
///
/// Per-frame faults are logged and counted; only source errors stop a run.
#[derive(Debug)]
pub struct Pipeline {
    decoder: FrameDecoder,
    store: SampleStore,
    summary: PipelineSummary,
}

impl Pipeline {
    /// Creates a pipeline with a default decoder.
    pub fn new(store: SampleStore) -> Self {
        Self::with_decoder(FrameDecoder::new(), store)
    }

    /// Creates a pipeline around an existing decoder.
    pub fn with_decoder(decoder: FrameDecoder, store: SampleStore) -> Self {
        Self {
            decoder,
            store,
            summary: PipelineSummary::default(),
        }
    }

    /// Decodes one raw frame and appends it.
    ///
    /// Returns the store index of the appended frame, if any.
    pub fn accept(&mut self, raw: &RawFrame) -> Option<usize> {
        self.summary.frames_seen += 1;
        let result = self.decoder.decode(raw);
        self.publish(result)
    }

    fn publish(&mut self, result: Result<Option<DecodedFrame>, FrameError>) -> Option<usize> {
        let frame = match result {
            Ok(Some(frame)) => frame,
            Ok(None) => return None,
            Err(e) => {
                tracing::debug!(error = %e, "Frame dropped");
                return None;
            }
        };

        match self.store.append(frame) {
            Ok(index) => {
                self.summary.appended += 1;
                Some(index)
            }
            Err(e) => {
                self.summary.rejected += 1;
                tracing::warn!(error = %e, "Decoded frame not stored");
                None
            }
        }
    }

    /// Drains `source` frame by frame until it ends or `cancel` is set.
    pub fn run<S: FrameSource + ?Sized>(
        &mut self,
        source: &mut S,
        cancel: &AtomicBool,
    ) -> Result<PipelineSummary, SourceError> {
        while !cancel.load(Ordering::Relaxed) {
            match source.next_frame()? {
                Some(raw) => {
                    self.accept(&raw);
                }
                None => return Ok(self.finish(false)),
            }
        }
        Ok(self.finish(true))
    }

    /// Drains `source` in batches decoded in parallel.
    ///
    /// Frames are appended in arrival order. Only the first frame of a
    /// batch is waited for; the batch is then topped up with whatever
    /// the source has ready, so a partial batch is flushed rather than
    /// held back until `batch_size` frames arrive.
    pub fn run_batched<S: FrameSource + ?Sized>(
        &mut self,
        source: &mut S,
        batch_size: usize,
        cancel: &AtomicBool,
    ) -> Result<PipelineSummary, SourceError> {
        let batch_size = batch_size.max(1);
        let mut batch = Vec::with_capacity(batch_size);
        let mut ended = false;

        while !ended && !cancel.load(Ordering::Relaxed) {
            match source.next_frame()? {
                Some(raw) => batch.push(raw),
                None => {
                    ended = true;
                    break;
                }
            }
            while batch.len() < batch_size {
                match source.try_next_frame()? {
                    Poll::Ready(Some(raw)) => batch.push(raw),
                    Poll::Ready(None) => {
                        ended = true;
                        break;
                    }
                    Poll::Pending => break,
                }
            }

            self.summary.frames_seen += batch.len() as u64;
            for result in self.decoder.decode_batch(&batch) {
                self.publish(result);
            }
            batch.clear();
        }

        Ok(self.finish(!ended))
    }

    fn finish(&mut self, cancelled: bool) -> PipelineSummary {
        self.summary.cancelled = cancelled;
        tracing::info!(
            frames_seen = self.summary.frames_seen,
            appended = self.summary.appended,
            rejected = self.summary.rejected,
            cancelled,
            "Pipeline finished"
        );
        self.summary.clone()
    }

    /// Returns the decoder counters.
    pub fn stats(&self) -> &DecodeStats {
        self.decoder.stats()
    }

    /// Returns the running summary.
    pub fn summary(&self) -> &PipelineSummary {
        &self.summary
    }

    /// Returns the store handle.
    pub fn store(&self) -> &SampleStore {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::{DetectorTrigger, RunControl, RunRate};
    use crate::decode::HEADER_LEN;
    use crate::source::{MockDetector, SimulationConfig};
    use crate::store::StoreConfig;
    use std::sync::mpsc;
    use std::time::{Duration, Instant};

    fn mixed_stream() -> Vec<RawFrame> {
        vec![
            RawFrame::data(vec![0u8; HEADER_LEN]),
            RawFrame::data(vec![0u8; HEADER_LEN]).with_error(1),
            RawFrame::text(2, "hello"),
            RawFrame::data(vec![0u8; 4]),
            RawFrame::data(vec![0u8; HEADER_LEN + 3]),
        ]
    }

    #[test]
    fn test_errors_never_stop_the_stream() {
        let store = SampleStore::unbounded();
        let mut pipeline = Pipeline::new(store.clone());
        for raw in mixed_stream() {
            pipeline.accept(&raw);
        }

        assert_eq!(store.len(), 2);
        assert_eq!(pipeline.summary().frames_seen, 5);
        assert_eq!(pipeline.stats().transport_errors, 1);
        assert_eq!(pipeline.stats().diagnostic_frames, 1);
        assert_eq!(pipeline.stats().truncated_headers, 1);
        assert_eq!(pipeline.stats().malformed_frames, 1);
    }

    #[test]
    fn test_run_drains_source() {
        let store = SampleStore::unbounded();
        let mut pipeline = Pipeline::new(store.clone());
        let mut detector = MockDetector::new(SimulationConfig {
            diagnostic_every: 2,
            ..Default::default()
        })
        .with_limit(3);

        let summary = pipeline.run(&mut detector, &AtomicBool::new(false)).unwrap();

        assert_eq!(summary.appended, 3);
        assert_eq!(summary.frames_seen, 5);
        assert!(!summary.cancelled);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_run_respects_cancel() {
        let mut pipeline = Pipeline::new(SampleStore::unbounded());
        let mut detector = MockDetector::default();

        let summary = pipeline.run(&mut detector, &AtomicBool::new(true)).unwrap();

        assert!(summary.cancelled);
        assert_eq!(summary.frames_seen, 0);
    }

    #[test]
    fn test_batched_matches_sequential() {
        let sequential = SampleStore::unbounded();
        Pipeline::new(sequential.clone())
            .run(&mut MockDetector::default().with_limit(5), &AtomicBool::new(false))
            .unwrap();

        let batched = SampleStore::unbounded();
        let summary = Pipeline::new(batched.clone())
            .run_batched(
                &mut MockDetector::default().with_limit(5),
                2,
                &AtomicBool::new(false),
            )
            .unwrap();

        assert_eq!(summary.appended, 5);
        assert!(!summary.cancelled);
        for i in 0..5 {
            assert_eq!(sequential.get(i), batched.get(i));
        }
    }

    #[test]
    fn test_batched_flushes_partial_batch_under_auto_rate() {
        // Auto rate waits for each frame to be stored before the next
        // trigger, so a batch never fills on its own.
        let store = SampleStore::unbounded();
        let (tx, mut rx) = mpsc::channel();
        let mut control = RunControl::new(store.clone(), RunRate::Auto).with_limit(4);
        control
            .start(DetectorTrigger::new(MockDetector::default(), tx))
            .unwrap();

        let started = Instant::now();
        let summary = Pipeline::new(store.clone())
            .run_batched(&mut rx, 4, &AtomicBool::new(false))
            .unwrap();

        assert!(started.elapsed() < Duration::from_secs(4));
        assert!(!summary.cancelled);
        assert_eq!(summary.appended, 4);
        assert_eq!(store.len(), 4);
        assert_eq!(control.wait().unwrap(), 4);
    }

    #[test]
    fn test_full_store_is_counted() {
        let store = SampleStore::new(StoreConfig {
            max_frames: Some(2),
        });
        let mut pipeline = Pipeline::new(store.clone());

        let summary = pipeline
            .run(&mut MockDetector::default().with_limit(4), &AtomicBool::new(false))
            .unwrap();

        assert_eq!(summary.appended, 2);
        assert_eq!(summary.rejected, 2);
        assert_eq!(store.len(), 2);
    }
}
