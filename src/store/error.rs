// Keywarden: Store error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Key not found: {0}")]
    NotFound(String),

    #[error("Key {fingerprint} is {status} and cannot be activated")]
    InvalidTransition { fingerprint: String, status: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Database connection lock poisoned")]
    Poisoned,
}

impl StoreError {
    /// Whether retrying the same call could succeed.
    ///
    /// Busy/locked databases and constraint races are transient; missing
    /// rows, illegal transitions and corrupt data are not.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Database(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy
                    | rusqlite::ErrorCode::DatabaseLocked
                    | rusqlite::ErrorCode::ConstraintViolation
            ),
            _ => false,
        }
    }
}
