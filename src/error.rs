//! # Error Types
//!
//! Custom error types for Mechanic using `thiserror`.
//!
//! Link-level failures never show up here: the connection supervisor
//! contains them and only reports through the link status.

use thiserror::Error;

/// Main error type for Mechanic
#[derive(Debug, Error)]
pub enum MechanicError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial port errors
    #[error("Serial port error: {0}")]
    Serial(String),

    /// Endpoint discovery found nothing to connect to
    #[error("No paired endpoints available")]
    NoEndpoints,

    /// Operator picked an endpoint index outside the last listing
    #[error("Endpoint index {index} out of range ({available} available)")]
    EndpointIndex { index: usize, available: usize },

    /// A session task panicked or was aborted
    #[error("Session task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Result type alias for Mechanic
pub type Result<T> = std::result::Result<T, MechanicError>;
