//! UseCase errors.

use thiserror::Error;

use crate::domain::{AuthError, RepositoryError, ValueObjectError};

/// Failure of a connection-scoped chat operation.
///
/// None of these are fatal: the originating connection gets an `error`
/// event and shared room state is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    /// Malformed input. Rejected before any persistence work.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The transaction was rolled back; nothing was persisted.
    #[error("transaction failed: {0}")]
    Transaction(String),

    /// The connection closed while the request was in flight
    #[error("session is closed")]
    SessionClosed,
}

impl From<ValueObjectError> for ChatError {
    fn from(e: ValueObjectError) -> Self {
        ChatError::Validation(e.to_string())
    }
}

impl From<RepositoryError> for ChatError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound(what) => ChatError::NotFound(what),
            other => ChatError::Transaction(other.to_string()),
        }
    }
}

/// Failure to establish a session
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectError {
    #[error("unauthorized: {0}")]
    Unauthorized(#[from] AuthError),

    #[error("failed to load memberships: {0}")]
    MembershipUnavailable(String),
}
