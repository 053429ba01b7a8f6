//! Metrics collection and registry.

use crate::acquisition::PipelineSummary;
use crate::decode::DecodeStats;
use crate::store::SampleStore;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use thiserror::Error;

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// A snapshot of acquisition state for metrics update.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    /// Sample frames decoded.
    pub frames_decoded: u64,
    /// Frames dropped on a transport error.
    pub transport_errors: u64,
    /// Diagnostic text frames seen.
    pub diagnostic_frames: u64,
    /// Frames shorter than the header.
    pub truncated_frames: u64,
    /// Frames ending in a partial record.
    pub malformed_frames: u64,
    /// Records dropped for an out-of-range slot or channel.
    pub out_of_range_records: u64,
    /// Records written into decoded frames.
    pub records_decoded: u64,
    /// Frames currently held by the store.
    pub store_frames: usize,
    /// Decoded frames the store refused.
    pub rejected_frames: u64,
}

/// Prometheus registry holding every acquisition metric.
pub struct MetricsRegistry {
    registry: Registry,

    // Decoder counters
    frames_decoded: IntCounter,
    transport_errors: IntCounter,
    diagnostic_frames: IntCounter,
    truncated_frames: IntCounter,
    malformed_frames: IntCounter,
    out_of_range_records: IntCounter,
    records_decoded: IntCounter,

    // Store state
    store_frames: IntGauge,
    rejected_frames: IntCounter,
}

impl MetricsRegistry {
    /// Creates a new metrics registry with all acquisition metrics registered.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let frames_decoded = IntCounter::new(
            "coulter_daq_frames_decoded_total",
            "Sample frames decoded",
        )?;
        let transport_errors = IntCounter::new(
            "coulter_daq_transport_errors_total",
            "Frames dropped because the transport flagged an error",
        )?;
        let diagnostic_frames = IntCounter::new(
            "coulter_daq_diagnostic_frames_total",
            "Diagnostic text frames received",
        )?;
        let truncated_frames = IntCounter::new(
            "coulter_daq_truncated_frames_total",
            "Frames shorter than the frame header",
        )?;
        let malformed_frames = IntCounter::new(
            "coulter_daq_malformed_frames_total",
            "Frames ending in a partial record",
        )?;
        let out_of_range_records = IntCounter::new(
            "coulter_daq_out_of_range_records_total",
            "Records dropped for an out-of-range slot or channel",
        )?;
        let records_decoded = IntCounter::new(
            "coulter_daq_records_decoded_total",
            "Records written into decoded frames",
        )?;

        let store_frames = IntGauge::new(
            "coulter_daq_store_frames",
            "Frames currently held by the sample store",
        )?;
        let rejected_frames = IntCounter::new(
            "coulter_daq_store_rejected_total",
            "Decoded frames refused by a full sample store",
        )?;

        registry.register(Box::new(frames_decoded.clone()))?;
        registry.register(Box::new(transport_errors.clone()))?;
        registry.register(Box::new(diagnostic_frames.clone()))?;
        registry.register(Box::new(truncated_frames.clone()))?;
        registry.register(Box::new(malformed_frames.clone()))?;
        registry.register(Box::new(out_of_range_records.clone()))?;
        registry.register(Box::new(records_decoded.clone()))?;
        registry.register(Box::new(store_frames.clone()))?;
        registry.register(Box::new(rejected_frames.clone()))?;

        Ok(Self {
            registry,
            frames_decoded,
            transport_errors,
            diagnostic_frames,
            truncated_frames,
            malformed_frames,
            out_of_range_records,
            records_decoded,
            store_frames,
            rejected_frames,
        })
    }

    /// Updates all metrics from a snapshot of acquisition state.
    pub fn update(&self, snapshot: &MetricsSnapshot) {
        advance(&self.frames_decoded, snapshot.frames_decoded);
        advance(&self.transport_errors, snapshot.transport_errors);
        advance(&self.diagnostic_frames, snapshot.diagnostic_frames);
        advance(&self.truncated_frames, snapshot.truncated_frames);
        advance(&self.malformed_frames, snapshot.malformed_frames);
        advance(&self.out_of_range_records, snapshot.out_of_range_records);
        advance(&self.records_decoded, snapshot.records_decoded);
        advance(&self.rejected_frames, snapshot.rejected_frames);

        self.store_frames.set(snapshot.store_frames as i64);
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

/// Counters only move forward, so apply the difference.
fn advance(counter: &IntCounter, total: u64) {
    let current = counter.get();
    if total > current {
        counter.inc_by(total - current);
    }
}

impl MetricsSnapshot {
    /// Creates a snapshot from the current state of the acquisition components.
    pub fn from_components(
        stats: &DecodeStats,
        summary: &PipelineSummary,
        store: &SampleStore,
    ) -> Self {
        Self {
            frames_decoded: stats.data_frames,
            transport_errors: stats.transport_errors,
            diagnostic_frames: stats.diagnostic_frames,
            truncated_frames: stats.truncated_headers,
            malformed_frames: stats.malformed_frames,
            out_of_range_records: stats.out_of_range_records,
            records_decoded: stats.records,
            store_frames: store.len(),
            rejected_frames: summary.rejected,
        }
    }
}
