// Keywarden: Top-level error types
//
// Aggregates errors from the crypto, store and distributor modules into a
// single error enum for the application boundary.

use thiserror::Error;

/// Top-level error type for all Keywarden operations.
#[derive(Debug, Error)]
pub enum KeywardenError {
    #[error("Crypto error: {0}")]
    Crypto(#[from] crate::crypto::CryptoError),

    #[error("Store error: {0}")]
    Store(#[from] crate::store::StoreError),

    #[error("Distribution error: {0}")]
    Distribution(#[from] crate::distributor::DistributionError),

    #[error("Key operation lock contended; gave up after {0} attempts")]
    LockContention(u32),

    #[error("No active key")]
    NoActiveKey,

    #[error("Key {0} is not the active key")]
    NotActive(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl KeywardenError {
    /// Whether this error came from a missing secret (encryption or HMAC).
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            KeywardenError::Config(_)
                | KeywardenError::Crypto(crate::crypto::CryptoError::MissingEncryptionSecret)
                | KeywardenError::Distribution(
                    crate::distributor::DistributionError::MissingSharedSecret
                )
        )
    }
}

pub type Result<T> = std::result::Result<T, KeywardenError>;
