// Keywarden: Key Distributor
//
// Signs and delivers key material to the remote execution environment.
//
// SECURITY: the private key is borrowed straight into the install payload
// and sent once per call. It is never logged and never retained here.

use std::fmt;
use std::sync::Arc;

use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use zeroize::Zeroizing;

use super::remote::{InstallPayload, RemoteEnvironment};
use super::DistributionError;

type HmacSha256 = Hmac<Sha256>;

pub struct Distributor {
    remote: Arc<dyn RemoteEnvironment>,
    shared_secret: Option<Zeroizing<String>>,
}

impl fmt::Debug for Distributor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Distributor")
            .field("shared_secret", &self.shared_secret.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl Distributor {
    pub fn new(remote: Arc<dyn RemoteEnvironment>, shared_secret: Option<&str>) -> Self {
        let shared_secret = shared_secret
            .filter(|s| !s.is_empty())
            .map(|s| Zeroizing::new(s.to_string()));
        if shared_secret.is_none() {
            tracing::warn!("Shared secret not set; key distribution will fail");
        }
        Self {
            remote,
            shared_secret,
        }
    }

    /// Hex HMAC-SHA256 over `public_key || fingerprint`.
    pub fn sign(&self, public_key: &str, fingerprint: &str) -> Result<String, DistributionError> {
        let secret = self
            .shared_secret
            .as_ref()
            .ok_or(DistributionError::MissingSharedSecret)?;

        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|_| DistributionError::MissingSharedSecret)?;
        mac.update(public_key.as_bytes());
        mac.update(fingerprint.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Push one key to the remote side. Any failure is returned as-is; retry
    /// policy belongs to the caller.
    pub async fn distribute(
        &self,
        private_key: &str,
        public_key: &str,
        fingerprint: &str,
    ) -> Result<Value, DistributionError> {
        let payload = InstallPayload {
            private_key,
            public_key,
            fingerprint,
            signature: self.sign(public_key, fingerprint)?,
        };

        match self.remote.install_key(&payload).await {
            Ok(response) => {
                tracing::info!(fingerprint = %fingerprint, "Key distributed to remote environment");
                Ok(response)
            }
            Err(e) => {
                tracing::warn!(fingerprint = %fingerprint, error = %e, "Key distribution failed");
                Err(e)
            }
        }
    }

    pub async fn test_connectivity(&self) -> Result<Value, DistributionError> {
        self.remote.test_connection().await
    }

    /// Whether the remote side reports a key as installed.
    pub async fn probe_installed_status(&self) -> Result<bool, DistributionError> {
        Ok(self.remote.status().await?.installed)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
