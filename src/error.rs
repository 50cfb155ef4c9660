//! Error types for the ugm store

use thiserror::Error;

/// Store-wide result type
pub type Result<T> = std::result::Result<T, UgmError>;

/// Errors raised by tables, containers and the root orchestrator
#[derive(Error, Debug)]
pub enum UgmError {
    /// Lookup or delete of an absent table key, principal id or group member
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// Assignment under a key the root container does not accept
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Structural children of the root cannot be deleted
    #[error("Operation forbidden on this node")]
    OperationForbidden,

    /// Principal already carries the role
    #[error("Principal already has role '{0}'")]
    DuplicateRole(String),

    /// Principal does not carry the role
    #[error("Principal does not have role '{0}'")]
    RoleNotFound(String),

    /// Exact match requested but more than one principal matched
    #[error("Exact match asked but result not unique")]
    AmbiguousResult,

    /// Exact match requested but no principal matched
    #[error("Exact match asked but result length is zero")]
    NoResult,

    /// Old password verification failed during a password change
    #[error("Old password does not match")]
    PasswordMismatch,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
