//! Error types for checkpoint and document storage operations

use thiserror::Error;

/// Result type for checkpoint operations
pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Errors that can occur during checkpoint or document operations
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// Checkpoint or document not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// JSON serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Binary serialization error
    #[error("Binary serialization error: {0}")]
    BinarySerialization(#[from] bincode::Error),

    /// Underlying storage failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Malformed or incompatible payload
    #[error("Invalid checkpoint: {0}")]
    Invalid(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of a storage write.
///
/// Write failures are reported through this struct rather than an `Err`
/// so callers can decide whether a failed write is fatal to their run.
#[derive(Debug, Clone, Default)]
pub struct WriteResult {
    /// Whether the write was persisted
    pub success: bool,

    /// Identifier assigned to the written record, when the backend assigns one
    pub id: Option<String>,

    /// Failure description when `success` is false
    pub error: Option<String>,
}

impl WriteResult {
    /// Successful write with an assigned id
    pub fn ok(id: impl Into<String>) -> Self {
        Self {
            success: true,
            id: Some(id.into()),
            error: None,
        }
    }

    /// Successful write without an id
    pub fn ok_anonymous() -> Self {
        Self {
            success: true,
            id: None,
            error: None,
        }
    }

    /// Failed write carrying the failure description
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            id: None,
            error: Some(error.into()),
        }
    }
}
