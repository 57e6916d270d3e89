//! Error types for lapline wire handling.

use thiserror::Error;

/// Errors that can occur while encoding or decoding lapline wire data.
#[derive(Debug, Error)]
pub enum TypeError {
    /// JSON serialization failed
    #[error("serialization failed: {0}")]
    Serialization(#[source] serde_json::Error),

    /// JSON deserialization failed
    #[error("deserialization failed: {0}")]
    Deserialization(#[source] serde_json::Error),

    /// Invalid data format
    #[error("invalid data: {0}")]
    InvalidData(String),
}
