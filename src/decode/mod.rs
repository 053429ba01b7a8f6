//! Frame decoding.
//!
//! This module turns raw readout frames into dense sample arrays.
//! Frames flagged by the transport layer and diagnostic text frames
//! are filtered out here; per-record faults are counted and never
//! abort the frame they occur in.

mod frame;
mod record;

pub use frame::{DecodedFrame, CHANNELS, SLOTS, SUBSAMPLES};
pub use record::{
    parse_record, unpack_word, RecordMeta, SampleRecord, GROUP_LEN, RECORD_LEN, SAMPLE_BITS,
    SAMPLE_MASK,
};

use crate::source::RawFrame;
use rayon::prelude::*;
use std::sync::mpsc::Sender;
use thiserror::Error;

/// Size of the frame header skipped before the first record.
pub const HEADER_LEN: usize = 16;

/// Frame-level decode failures. Both are recoverable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("transport error {code} reported by stream")]
    Transport { code: u8 },
    #[error("payload of {len} bytes is shorter than the frame header")]
    TruncatedHeader { len: usize },
}

/// Side-channel events raised while decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeEvent {
    /// A text frame arrived on a non-zero stream channel.
    Diagnostic { channel: u8, text: String },
    /// A frame was dropped because the transport flagged it.
    TransportError { code: u8 },
}

/// Running decoder counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodeStats {
    /// Sample frames decoded.
    pub data_frames: u64,
    /// Frames dropped on a transport error.
    pub transport_errors: u64,
    /// Diagnostic text frames seen.
    pub diagnostic_frames: u64,
    /// Frames shorter than the header.
    pub truncated_headers: u64,
    /// Frames ending in a partial record.
    pub malformed_frames: u64,
    /// Total bytes ignored in partial records.
    pub trailing_bytes: u64,
    /// Records dropped for an out-of-range slot or channel.
    pub out_of_range_records: u64,
    /// Records written into decoded frames.
    pub records: u64,
}

/// Per-payload record counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PayloadTally {
    /// Records placed in the frame.
    pub records: u64,
    /// Records dropped for an out-of-range slot or channel.
    pub out_of_range: u64,
    /// Bytes left over after the last whole record.
    pub trailing_bytes: usize,
}

/// Decodes a sample payload into a fresh frame.
///
/// Records are consumed in strict 16-byte steps after the header; a
/// trailing partial record is ignored and reported in the tally.
pub fn decode_payload(payload: &[u8]) -> Result<(DecodedFrame, PayloadTally), FrameError> {
    let body = payload
        .get(HEADER_LEN..)
        .ok_or(FrameError::TruncatedHeader { len: payload.len() })?;

    let mut frame = DecodedFrame::zeroed();
    let mut tally = PayloadTally::default();

    let mut chunks = body.chunks_exact(RECORD_LEN);
    for mut chunk in chunks.by_ref() {
        let Ok(record) = parse_record(&mut chunk) else {
            continue;
        };

        if frame.place(&record) {
            tally.records += 1;
        } else {
            tally.out_of_range += 1;
            tracing::trace!(
                slot = record.meta.slot,
                channel = record.meta.channel,
                "Dropped out-of-range record"
            );
        }
    }
    tally.trailing_bytes = chunks.remainder().len();

    Ok((frame, tally))
}

enum Outcome {
    Samples(DecodedFrame, PayloadTally),
    Text { channel: u8, text: String },
    Failed(FrameError),
}

fn classify(raw: &RawFrame) -> Outcome {
    if raw.is_errored() {
        return Outcome::Failed(FrameError::Transport { code: raw.error() });
    }

    if raw.is_text() {
        return Outcome::Text {
            channel: raw.channel(),
            text: String::from_utf8_lossy(raw.payload()).into_owned(),
        };
    }

    match decode_payload(raw.payload()) {
        Ok((frame, tally)) => Outcome::Samples(frame, tally),
        Err(e) => Outcome::Failed(e),
    }
}

/// Stateful frame decoder.
///
/// Keeps running counters and forwards side-channel events to an
/// optional receiver.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    stats: DecodeStats,
    events: Option<Sender<DecodeEvent>>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a decoder that publishes events on `events`.
    pub fn with_events(events: Sender<DecodeEvent>) -> Self {
        Self {
            stats: DecodeStats::default(),
            events: Some(events),
        }
    }

    /// Decodes one raw frame.
    ///
    /// Returns `Ok(None)` for diagnostic text frames.
    pub fn decode(&mut self, raw: &RawFrame) -> Result<Option<DecodedFrame>, FrameError> {
        let outcome = classify(raw);
        self.fold(outcome)
    }

    /// Decodes a batch of independent frames in parallel.
    ///
    /// Results, counters and events follow the input order.
    pub fn decode_batch(
        &mut self,
        frames: &[RawFrame],
    ) -> Vec<Result<Option<DecodedFrame>, FrameError>> {
        let outcomes: Vec<Outcome> = frames.par_iter().map(classify).collect();
        outcomes.into_iter().map(|o| self.fold(o)).collect()
    }

    fn fold(&mut self, outcome: Outcome) -> Result<Option<DecodedFrame>, FrameError> {
        match outcome {
            Outcome::Samples(frame, tally) => {
                self.stats.data_frames += 1;
                self.stats.records += tally.records;
                self.stats.out_of_range_records += tally.out_of_range;
                if tally.trailing_bytes > 0 {
                    self.stats.malformed_frames += 1;
                    self.stats.trailing_bytes += tally.trailing_bytes as u64;
                }
                if tally.out_of_range > 0 {
                    tracing::warn!(
                        dropped = tally.out_of_range,
                        "Frame contained out-of-range records"
                    );
                }
                tracing::debug!(
                    records = tally.records,
                    trailing_bytes = tally.trailing_bytes,
                    "Decoded frame"
                );
                Ok(Some(frame))
            }
            Outcome::Text { channel, text } => {
                self.stats.diagnostic_frames += 1;
                tracing::info!(channel, text = %text.trim_end(), "Diagnostic frame");
                self.emit(DecodeEvent::Diagnostic { channel, text });
                Ok(None)
            }
            Outcome::Failed(err) => {
                match err {
                    FrameError::Transport { code } => {
                        self.stats.transport_errors += 1;
                        tracing::warn!(code, "Frame error reported by transport");
                        self.emit(DecodeEvent::TransportError { code });
                    }
                    FrameError::TruncatedHeader { len } => {
                        self.stats.truncated_headers += 1;
                        tracing::warn!(len, "Frame shorter than header");
                    }
                }
                Err(err)
            }
        }
    }

    fn emit(&self, event: DecodeEvent) {
        if let Some(tx) = &self.events {
            // A dropped receiver only means nobody is listening.
            let _ = tx.send(event);
        }
    }

    /// Returns the running counters.
    pub fn stats(&self) -> &DecodeStats {
        &self.stats
    }
}
