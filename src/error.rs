//! Error types for the filter engine

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid data at record {record}: {reason}")]
    InvalidData { record: usize, reason: String },

    #[error("Position {position} out of range (row count {count})")]
    OutOfRange { position: usize, count: usize },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    pub(crate) fn invalid_data(record: usize, reason: impl Into<String>) -> Self {
        EngineError::InvalidData {
            record,
            reason: reason.into(),
        }
    }

    /// Stable error code for the UI collaborator
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::InvalidData { .. } => "INVALID_DATA",
            EngineError::OutOfRange { .. } => "OUT_OF_RANGE",
            EngineError::Config(_) => "INVALID_CONFIG",
            EngineError::Json(_) => "INVALID_JSON",
        }
    }

    /// Whether the caller may retry the operation (e.g. a failed load with corrected data).
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::InvalidData { .. } | EngineError::Json(_))
    }
}
