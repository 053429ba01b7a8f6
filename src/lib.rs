//! Coulter Detector Acquisition Library
//!
//! Decodes raw readout frames from the Coulter detector FPGA into dense
//! sample arrays, accumulates them in an append-only store and
//! characterizes per-pixel noise.
//!
//! # Architecture
//!
//! The system follows an explicit data flow:
//!
//! ```text
//! source → decode → store → analysis
//!                     ↑
//!      acquisition (pipeline, run control)
//! ```
//!
//! # Design Principles
//!
//! - **Data faults never stop a run**: transport errors, diagnostic frames
//!   and malformed records are counted and logged, not propagated
//! - **Append-only store**: decoded frames are immutable once stored and
//!   readers work on snapshots
//! - **Fixed geometry**: 256 slots, 12 channels, 16 sub-samples per frame
//!
//! # Example
//!
//! ```no_run
//! use coulter_daq::{
//!     acquisition::Pipeline,
//!     analysis::NoiseAnalyzer,
//!     source::{MockDetector, SimulationConfig},
//!     store::SampleStore,
//! };
//! use std::sync::atomic::AtomicBool;
//!
//! let store = SampleStore::unbounded();
//! let mut detector = MockDetector::new(SimulationConfig::default()).with_limit(50);
//!
//! // Decode every frame into the store
//! let mut pipeline = Pipeline::new(store.clone());
//! pipeline.run(&mut detector, &AtomicBool::new(false)).unwrap();
//!
//! // Skip warm-up frames and rank pixels by noise
//! let report = NoiseAnalyzer::default().analyze(&store, 10, None).unwrap();
//! println!("{}", report);
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod acquisition;
pub mod analysis;
pub mod decode;
pub mod metrics;
pub mod source;
pub mod store;

// Re-export commonly used types at crate root
pub use acquisition::{FileConfig, Pipeline, RunControl, RunRate};
pub use analysis::{NoiseAnalyzer, NoiseReport, PixelNoise};
pub use decode::{DecodeStats, DecodedFrame, FrameDecoder, FrameError};
pub use source::{FrameSource, MockDetector, RawFrame, RecordingSource};
pub use store::{SampleStore, StoreSnapshot};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
