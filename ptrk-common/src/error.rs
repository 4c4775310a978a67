//! Common error types for PTRK

use thiserror::Error;

use crate::templates::WeightViolation;

/// Common result type for PTRK operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared by the engine and the services built on it
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding/decoding of stored milestone state or weights
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found (unknown component type, component, ...)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Template weights rejected by the weight validator
    #[error("Validation error: {0}")]
    Validation(#[from] WeightViolation),

    /// Actor is not authorized to mutate templates
    #[error("Permission denied: {0}")]
    Permission(String),

    /// Another writer holds (or already advanced) the same template key
    #[error("Concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    /// Recalculation pass failed partway and was rolled back
    #[error("Transaction failed, no changes applied: {reason}")]
    TransactionFailure {
        /// Components processed before the failure (all rolled back)
        processed: usize,
        /// Underlying failure
        reason: String,
    },

    /// Recalculation pass was cancelled and rolled back
    #[error("Cancelled, no changes applied: {0}")]
    Cancelled(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the caller may retry the same request unchanged
    ///
    /// Validation and permission failures need caller correction first.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::ConcurrencyConflict(_)
            | Error::TransactionFailure { .. }
            | Error::Cancelled(_) => true,
            Error::Database(e) => is_lock_error(e),
            _ => false,
        }
    }

    /// Short machine-readable kind, used in API responses and logs
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Database(_) => "database",
            Error::Io(_) => "io",
            Error::Serialization(_) => "serialization",
            Error::Config(_) => "config",
            Error::NotFound(_) => "not_found",
            Error::Validation(_) => "validation",
            Error::Permission(_) => "permission",
            Error::ConcurrencyConflict(_) => "concurrency_conflict",
            Error::TransactionFailure { .. } => "transaction_failure",
            Error::Cancelled(_) => "cancelled",
            Error::InvalidInput(_) => "invalid_input",
            Error::Internal(_) => "internal",
        }
    }
}

/// SQLite reports writer contention as "database is locked" / "busy"
pub(crate) fn is_lock_error(err: &sqlx::Error) -> bool {
    let msg = err.to_string();
    msg.contains("database is locked") || msg.contains("database is busy")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(Error::ConcurrencyConflict("x".into()).is_retryable());
        assert!(Error::TransactionFailure {
            processed: 3,
            reason: "boom".into()
        }
        .is_retryable());
        assert!(Error::Cancelled("stop".into()).is_retryable());
        assert!(!Error::Permission("viewer".into()).is_retryable());
        assert!(!Error::NotFound("Widget".into()).is_retryable());
    }

    #[test]
    fn test_transaction_failure_message() {
        let err = Error::TransactionFailure {
            processed: 2,
            reason: "disk full".into(),
        };
        assert_eq!(err.to_string(), "Transaction failed, no changes applied: disk full");
        assert_eq!(err.kind(), "transaction_failure");
    }
}
