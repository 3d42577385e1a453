//! Engine error taxonomy
//!
//! Every operation surfaced by the engine returns one of these as a typed,
//! user-facing failure. Nothing here is retried internally.

use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("Duplicate resource detected: {existing_id}")]
    DuplicateContent { existing_id: Uuid },

    #[error("{0} not found")]
    NotFound(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Insufficient points: balance {balance}, required {required}")]
    InsufficientPoints { balance: i64, required: i64 },

    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Malware detected: {threat}")]
    MalwareDetected { threat: String },

    #[error("Malware scan failed: {0}")]
    ScanFailure(String),

    #[error("Storage failure: {0}")]
    StorageFailure(String),

    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),
}

impl EngineError {
    pub fn not_found(entity: &str, id: Uuid) -> Self {
        EngineError::NotFound(format!("{} {}", entity, id))
    }

    pub fn validation(message: impl Into<String>) -> Self {
        EngineError::Validation(message.into())
    }

    /// Short machine-readable code, used in API error bodies
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "validation_failure",
            EngineError::UnsupportedFormat(_) => "unsupported_format",
            EngineError::DuplicateContent { .. } => "duplicate_content",
            EngineError::NotFound(_) => "not_found",
            EngineError::Unauthorized => "unauthorized",
            EngineError::Forbidden(_) => "forbidden",
            EngineError::InsufficientPoints { .. } => "insufficient_points",
            EngineError::InvalidTransition { .. } => "invalid_transition",
            EngineError::MalwareDetected { .. } => "malware_detected",
            EngineError::ScanFailure(_) => "scan_failure",
            EngineError::StorageFailure(_) => "storage_failure",
            EngineError::PersistenceFailure(_) => "persistence_failure",
        }
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(e: sqlx::Error) -> Self {
        EngineError::PersistenceFailure(e.to_string())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_carries_existing_id() {
        let id = Uuid::new_v4();
        let err = EngineError::DuplicateContent { existing_id: id };
        assert!(err.to_string().contains(&id.to_string()));
        assert_eq!(err.code(), "duplicate_content");
    }

    #[test]
    fn test_not_found_message() {
        let id = Uuid::nil();
        let err = EngineError::not_found("resource", id);
        assert_eq!(err.to_string(), format!("resource {} not found", id));
    }
}
