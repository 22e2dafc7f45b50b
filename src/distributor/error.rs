// Keywarden: Distribution error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DistributionError {
    #[error("Shared secret not configured; cannot sign distribution payload")]
    MissingSharedSecret,

    #[error("Remote request failed: {0}")]
    Http(String),

    #[error("Remote request timed out")]
    Timeout,

    #[error("Remote rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Invalid response from remote: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for DistributionError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DistributionError::Timeout
        } else {
            DistributionError::Http(err.to_string())
        }
    }
}
