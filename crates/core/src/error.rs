//! Error taxonomy for the engine.
//!
//! Every failure surfaces as an [`EngineError`] whose [`ErrorKind`] is stable,
//! so callers decide on retry or reconciliation without parsing messages.

use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Result alias used across the core crate.
pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("record {0} already exists")]
    DuplicateId(Uuid),

    #[error("record {0} not found")]
    NotFound(Uuid),

    /// The record is durable in the store but not yet searchable.
    #[error("record {id} stored but not indexed: {reason}")]
    PartialIngestFailure { id: Uuid, reason: String },

    #[error("similarity index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("vector store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("embedder failed: {0}")]
    Embedder(String),
}

/// Stable discriminant of an [`EngineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    DimensionMismatch,
    DuplicateId,
    NotFound,
    PartialIngestFailure,
    IndexUnavailable,
    StoreUnavailable,
    InvalidInput,
    Embedder,
}

impl ErrorKind {
    /// Snake-case code used on the wire and in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::DimensionMismatch => "dimension_mismatch",
            ErrorKind::DuplicateId => "duplicate_id",
            ErrorKind::NotFound => "not_found",
            ErrorKind::PartialIngestFailure => "partial_ingest_failure",
            ErrorKind::IndexUnavailable => "index_unavailable",
            ErrorKind::StoreUnavailable => "store_unavailable",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::Embedder => "embedder_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::DimensionMismatch { .. } => ErrorKind::DimensionMismatch,
            EngineError::DuplicateId(_) => ErrorKind::DuplicateId,
            EngineError::NotFound(_) => ErrorKind::NotFound,
            EngineError::PartialIngestFailure { .. } => ErrorKind::PartialIngestFailure,
            EngineError::IndexUnavailable(_) => ErrorKind::IndexUnavailable,
            EngineError::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
            EngineError::InvalidInput(_) => ErrorKind::InvalidInput,
            EngineError::Embedder(_) => ErrorKind::Embedder,
        }
    }

    /// Infrastructure failures that the retry policy may attempt again.
    /// Validation failures are never transient.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EngineError::IndexUnavailable(_) | EngineError::StoreUnavailable(_)
        )
    }

    /// The record id carried by the error, if any.
    pub fn record_id(&self) -> Option<Uuid> {
        match self {
            EngineError::DuplicateId(id)
            | EngineError::NotFound(id)
            | EngineError::PartialIngestFailure { id, .. } => Some(*id),
            _ => None,
        }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError::StoreUnavailable(e.to_string())
    }
}

impl From<bincode::Error> for EngineError {
    fn from(e: bincode::Error) -> Self {
        EngineError::StoreUnavailable(format!("serialization: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_are_distinct() {
        let id = Uuid::new_v4();
        let errors = [
            EngineError::DimensionMismatch {
                expected: 4,
                actual: 3,
            },
            EngineError::DuplicateId(id),
            EngineError::NotFound(id),
            EngineError::PartialIngestFailure {
                id,
                reason: "x".into(),
            },
            EngineError::IndexUnavailable("x".into()),
            EngineError::StoreUnavailable("x".into()),
            EngineError::InvalidInput("x".into()),
            EngineError::Embedder("x".into()),
        ];
        let codes: std::collections::HashSet<&str> =
            errors.iter().map(|e| e.kind().as_str()).collect();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_only_infrastructure_errors_are_transient() {
        assert!(EngineError::StoreUnavailable("disk".into()).is_transient());
        assert!(EngineError::IndexUnavailable("graph".into()).is_transient());
        assert!(!EngineError::NotFound(Uuid::new_v4()).is_transient());
        assert!(!EngineError::DimensionMismatch {
            expected: 2,
            actual: 1
        }
        .is_transient());
    }

    #[test]
    fn test_partial_failure_reports_id() {
        let id = Uuid::new_v4();
        let err = EngineError::PartialIngestFailure {
            id,
            reason: "index busy".into(),
        };
        assert_eq!(err.record_id(), Some(id));
        assert_eq!(err.kind(), ErrorKind::PartialIngestFailure);
    }

    #[test]
    fn test_io_error_maps_to_store_unavailable() {
        let err: EngineError = std::io::Error::other("disk gone").into();
        assert_eq!(err.kind(), ErrorKind::StoreUnavailable);
    }
}
