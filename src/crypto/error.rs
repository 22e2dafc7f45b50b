// Keywarden: Crypto error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Entropy source unavailable: {0}")]
    Entropy(String),

    #[error("Invalid public key format: {0}")]
    Format(String),

    #[error("Key encoding error: {0}")]
    Encoding(String),

    #[error("Encryption secret not configured")]
    MissingEncryptionSecret,

    #[error("Encryption failed")]
    Encryption,

    #[error("Sealed key is truncated ({0} bytes, need at least {1})")]
    Truncated(usize, usize),

    #[error("Authentication failed: ciphertext was tampered with or sealed under a different secret")]
    Authentication,
}
