//! # Mechanic Library
//!
//! Live vehicle telemetry over a wireless serial link to an onboard
//! diagnostic module.
//!
//! This library keeps the link alive across an unreliable transport,
//! decodes the module's comma-separated telemetry records, and animates
//! one gauge per measured channel at a fixed rate, independent of how
//! bursty the telemetry is.

pub mod config;
pub mod display;
pub mod error;
pub mod frame;
pub mod gauge;
pub mod link;
pub mod serial;
pub mod session;
