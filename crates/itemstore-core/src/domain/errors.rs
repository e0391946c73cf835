//! Domain error types
//!
//! This module defines the error taxonomy shared by every data store and the
//! items controller, plus the validation errors raised by domain newtypes.
//!
//! ## Design Notes
//!
//! - `StoreError` is the contract between stores and the controller. Adapters
//!   map their transport errors onto it; nothing else crosses the port.
//! - Only `ConnectionUnavailable` is retryable. Everything else is terminal
//!   from the controller's point of view.

use thiserror::Error;

/// Errors that can occur when validating domain values
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Record identifier is empty or not representable
    #[error("Invalid record ID: {0}")]
    InvalidRecordId(String),

    /// Field name used in a filter or sort is empty or malformed
    #[error("Invalid field name: {0}")]
    InvalidFieldName(String),

    /// Cursor construction violated a paging invariant
    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),

    /// Value is not a JSON object where one is required
    #[error("Invalid record body: {0}")]
    InvalidRecord(String),
}

/// Failure of a data store operation
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Backend unreachable (network down, pool closed, timeout). Retryable.
    #[error("Connection unavailable: {0}")]
    ConnectionUnavailable(String),

    /// Backend refused the record (constraint, auth, malformed request)
    #[error("Validation rejected: {0}")]
    ValidationRejected(String),

    /// Record vanished between fetch and mutate
    #[error("Not found: {0}")]
    NotFound(String),

    /// Options, cursor or store definition are inconsistent
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Anything else, wrapping the underlying backend message
    #[error("Unexpected failure: {0}")]
    Unexpected(String),
}

/// Fetch failures use the same taxonomy as mutations
pub type FetchError = StoreError;

impl StoreError {
    /// Whether the operation may succeed if retried once connectivity returns
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::ConnectionUnavailable(_))
    }

    /// Stable snake_case name of the error kind
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::ConnectionUnavailable(_) => "connection_unavailable",
            StoreError::ValidationRejected(_) => "validation_rejected",
            StoreError::NotFound(_) => "not_found",
            StoreError::InvalidConfiguration(_) => "invalid_configuration",
            StoreError::Unexpected(_) => "unexpected",
        }
    }
}

impl From<DomainError> for StoreError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::InvalidCursor(_) | DomainError::InvalidFieldName(_) => {
                StoreError::InvalidConfiguration(err.to_string())
            }
            DomainError::InvalidRecordId(_) | DomainError::InvalidRecord(_) => {
                StoreError::ValidationRejected(err.to_string())
            }
        }
    }
}
