//! Error types for calshare.

use thiserror::Error;

/// Errors that can occur in calshare operations.
///
/// Every variant maps to an HTTP status via [`CalShareError::status`], so
/// handlers can bubble errors up with `?` and let the route boundary turn
/// them into responses.
#[derive(Error, Debug)]
pub enum CalShareError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(rusqlite::Error),

    #[error("Mail error: {0}")]
    Mail(String),

    #[error("Holiday lookup error: {0}")]
    Holiday(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl CalShareError {
    /// HTTP status code for this error.
    pub fn status(&self) -> u16 {
        match self {
            CalShareError::Validation(_) | CalShareError::BadRequest(_) => 400,
            CalShareError::Unauthorized(_) => 401,
            CalShareError::Forbidden(_) => 403,
            CalShareError::NotFound(_) => 404,
            CalShareError::Conflict(_) => 409,
            CalShareError::Config(_)
            | CalShareError::Database(_)
            | CalShareError::Mail(_)
            | CalShareError::Holiday(_)
            | CalShareError::Serialization(_)
            | CalShareError::Task(_) => 500,
        }
    }

    /// Whether the message is safe to show to API clients.
    pub fn is_client_error(&self) -> bool {
        self.status() < 500
    }
}

impl From<rusqlite::Error> for CalShareError {
    fn from(err: rusqlite::Error) -> Self {
        // Two concurrent shares (or registrations) can both pass the existence
        // check; the loser trips the key constraint here.
        if let rusqlite::Error::SqliteFailure(ref e, _) = err {
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
            {
                return CalShareError::Conflict("This record already exists.".into());
            }
        }
        CalShareError::Database(err)
    }
}

impl From<serde_json::Error> for CalShareError {
    fn from(err: serde_json::Error) -> Self {
        CalShareError::Serialization(err.to_string())
    }
}

/// Result type alias for calshare operations.
pub type CalShareResult<T> = Result<T, CalShareError>;
