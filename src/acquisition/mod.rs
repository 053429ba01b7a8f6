//! Acquisition plumbing.
//!
//! Wires a frame source through the decoder into the sample store, and
//! paces the hardware trigger while a run is active.

mod config;
mod pipeline;
mod run_control;

pub use config::{AcquisitionConfig, ConfigError, FileConfig, OutputConfig};
pub use pipeline::{Pipeline, PipelineSummary};
pub use run_control::{
    DetectorTrigger, RunControl, RunError, RunRate, RunState, Trigger, TriggerError,
};
