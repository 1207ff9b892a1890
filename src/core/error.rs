//! Error types for fedskew.

use thiserror::Error;

/// Result type alias for fedskew operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in fedskew operations.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Unknown federation mode: {0}")]
    UnknownMode(String),

    #[error("Unknown skew regime: {0}")]
    UnknownSkew(String),

    // Partitioning errors
    #[error("Partition infeasible: {0}")]
    PartitionInfeasible(String),

    // Tensor errors
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Unknown parameter: {0}")]
    UnknownParameter(String),

    // Checkpoint errors
    #[error("Checkpoint state mismatch: {0}")]
    StateMismatch(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}
