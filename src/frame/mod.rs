//! # Telemetry Frame Module
//!
//! Wire format and decoding of the diagnostic module's telemetry records.
//!
//! This module handles:
//! - The 7-field comma-separated record layout
//! - Decoding a record into a [`TelemetrySample`]
//! - Classifying bad records as [`FrameRejection`]s the link can skip

pub mod protocol;
pub mod parser;

pub use parser::{parse_record, FrameRejection};
pub use protocol::{LinkParameters, TelemetrySample};
