//! Prometheus metrics exporter for acquisition monitoring.
//!
//! # Metrics Exposed
//!
//! ## Decoder
//! - `coulter_daq_frames_decoded_total` - Sample frames decoded
//! - `coulter_daq_transport_errors_total` - Frames dropped on transport errors
//! - `coulter_daq_diagnostic_frames_total` - Diagnostic text frames
//! - `coulter_daq_truncated_frames_total` - Frames shorter than the header
//! - `coulter_daq_malformed_frames_total` - Frames ending in a partial record
//! - `coulter_daq_out_of_range_records_total` - Records with a bad slot or channel
//! - `coulter_daq_records_decoded_total` - Records written into frames
//!
//! ## Store
//! - `coulter_daq_store_frames` - Frames held by the sample store
//! - `coulter_daq_store_rejected_total` - Frames refused by a full store
//!
//! # Example
//!
//! ```no_run
//! use coulter_daq::metrics::{MetricsRegistry, MetricsSnapshot};
//!
//! let registry = MetricsRegistry::new().expect("Failed to create registry");
//!
//! let snapshot = MetricsSnapshot {
//!     frames_decoded: 120,
//!     transport_errors: 1,
//!     store_frames: 120,
//!     ..Default::default()
//! };
//!
//! registry.update(&snapshot);
//! println!("{}", registry.encode().unwrap());
//! ```

mod collector;
#[cfg(feature = "metrics")]
mod server;

pub use collector::{MetricsError, MetricsRegistry, MetricsSnapshot};
#[cfg(feature = "metrics")]
pub use server::{MetricsServer, MetricsServerConfig, MetricsState, ServerError};
