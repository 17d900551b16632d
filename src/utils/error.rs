// src/utils/error.rs
use thiserror::Error;
use uuid::Uuid;

use crate::core::{matching::MatchingFault, ocr::ExtractionError};
use crate::storage::encrypted::StorageError;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Initialization error: {0}")]
    Init(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Verification error: {0}")]
    Verification(#[from] VerificationError),
}

pub type Result<T> = std::result::Result<T, NodeError>;

/// Errors surfaced by the verification engine. Every variant maps to a
/// stable code that crosses the API boundary unchanged.
#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("{0}")]
    Validation(String),

    #[error("document extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("matching fault: {0}")]
    MatchingFault(#[from] MatchingFault),

    #[error("{0}")]
    Conflict(String),

    #[error("request {request_id} is {status}, expected {expected}")]
    InvalidState {
        request_id: Uuid,
        status: String,
        expected: String,
    },

    #[error("{0} not found")]
    NotFound(String),

    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),
}

impl VerificationError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Extraction(_) => "OCR_FAILED",
            Self::MatchingFault(_) => "MATCHING_FAULT",
            Self::Conflict(_) => "CONFLICT",
            Self::InvalidState { .. } => "INVALID_STATE",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Storage(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the message is safe to show to the subject verbatim.
    pub fn is_user_facing(&self) -> bool {
        !matches!(self, Self::Storage(_) | Self::MatchingFault(_))
    }
}

impl From<StorageError> for NodeError {
    fn from(error: StorageError) -> Self {
        NodeError::Storage(error.to_string())
    }
}

impl From<config::ConfigError> for NodeError {
    fn from(error: config::ConfigError) -> Self {
        NodeError::Config(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(
            VerificationError::Validation("x".into()).code(),
            "VALIDATION_ERROR"
        );
        assert_eq!(VerificationError::Conflict("x".into()).code(), "CONFLICT");
        assert_eq!(VerificationError::NotFound("x".into()).code(), "NOT_FOUND");
        assert_eq!(
            VerificationError::Extraction(ExtractionError::Unavailable("down".into())).code(),
            "OCR_FAILED"
        );
    }

    #[test]
    fn test_storage_errors_are_not_user_facing() {
        let err = VerificationError::Storage(StorageError::DatabaseError("io".into()));
        assert!(!err.is_user_facing());
        assert_eq!(err.code(), "INTERNAL_ERROR");
        assert!(VerificationError::Conflict("busy".into()).is_user_facing());
    }
}
