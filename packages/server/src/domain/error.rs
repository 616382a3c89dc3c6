//! Domain errors.

use thiserror::Error;

/// Value object validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueObjectError {
    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("{field} is too long ({actual} > {max})")]
    TooLong {
        field: &'static str,
        actual: usize,
        max: usize,
    },

    #[error("{field} contains invalid characters: '{value}'")]
    InvalidFormat { field: &'static str, value: String },
}

/// Errors reported by the persistence collaborator.
///
/// Any error returned from inside a transaction means the transaction was
/// (or will be) rolled back; nothing it staged becomes visible.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("transaction aborted: {0}")]
    Aborted(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Credential verification errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("authentication token not found")]
    MissingToken,

    #[error("invalid authentication token: {0}")]
    InvalidToken(String),

    #[error("authentication token expired")]
    Expired,

    #[error("unknown user '{0}'")]
    UnknownUser(String),

    #[error("credential verification unavailable: {0}")]
    Unavailable(String),
}
