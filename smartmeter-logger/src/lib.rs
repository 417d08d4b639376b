//! Smart meter logger
//!
//! Reads SML frames from a smart electricity meter's serial interface,
//! extracts the configured OBIS fields and writes one InfluxDB point per
//! frame.
//!
//! ```text
//! serial bytes -> FrameAssembler -> extract -> bounded queue -> SinkAdapter -> InfluxDB
//! ```

pub mod app;
pub mod assembler;
pub mod config;
pub mod error;
pub mod extractor;
pub mod hexdump;
pub mod pipeline;
pub mod registry;
pub mod sink;
pub mod sml;
pub mod transport;

// Re-export commonly used types
pub use assembler::{AssemblerConfig, Feed, FrameAssembler};
pub use config::Config;
pub use error::{Error, Result};
pub use extractor::{ExtractionRequest, MeasurementSet, extract};
pub use pipeline::{CloseReason, DispatchPipeline, PipelineState, PipelineStats, Submission};
pub use registry::FieldDescriptor;
pub use sml::{FieldValue, FrameDecoder, RawFrame, SmlDecoder};
