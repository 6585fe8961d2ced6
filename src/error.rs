//! Error types for the mailbox service.

use thiserror::Error;

use crate::auth::AuthError;

/// Common error type for the mailbox service.
#[derive(Error, Debug)]
pub enum MailboxError {
    /// Database error.
    ///
    /// Errors from sqlx are converted into this variant, as are rows that
    /// fail to decode into a domain type (e.g. a role outside the enumeration).
    #[error("database error: {0}")]
    Database(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Token or credential rejected.
    #[error("authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Authenticated, but not allowed to touch the resource.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Validation error for user input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Resource not found.
    #[error("{0} not found")]
    NotFound(String),

    /// The message existed but was consumed by its read limit or expired.
    #[error("message {0} was destroyed")]
    Destroyed(i64),

    /// Unique constraint hit, e.g. duplicate registration.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Notification could not be published.
    #[error("notification error: {0}")]
    Notification(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Anything else that should surface as a 500.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for MailboxError {
    fn from(e: sqlx::Error) -> Self {
        MailboxError::Database(e.to_string())
    }
}

/// Result type alias for mailbox operations.
pub type Result<T> = std::result::Result<T, MailboxError>;
