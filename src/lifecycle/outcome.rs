// Keywarden: Lifecycle operation results
//
// Serializable reports returned by lifecycle operations and forwarded as-is
// by the CLI and the control socket. None of them carry private key
// material except `GeneratedKey`, which is deliberately not serializable.

use std::fmt;

use serde::Serialize;
use serde_json::Value;
use zeroize::Zeroizing;

use crate::store::{KeyRecord, KeySummary};

/// A freshly generated key together with its one-time plaintext private key.
pub struct GeneratedKey {
    pub record: KeyRecord,
    private_key: Zeroizing<String>,
}

impl GeneratedKey {
    pub(crate) fn new(record: KeyRecord, private_key: Zeroizing<String>) -> Self {
        Self {
            record,
            private_key,
        }
    }

    pub fn fingerprint(&self) -> &str {
        &self.record.fingerprint
    }

    pub fn public_key(&self) -> &str {
        &self.record.public_key
    }

    /// PKCS#8 PEM private key. Hand it to the distributor and drop it.
    pub fn private_key(&self) -> &str {
        &self.private_key
    }

    pub fn summary(&self) -> KeySummary {
        self.record.summary()
    }
}

impl fmt::Debug for GeneratedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratedKey")
            .field("record", &self.record)
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

/// Result of activating a key, including the advisory redistribution that
/// follows activation on the operational surfaces.
#[derive(Debug, Clone, Serialize)]
pub struct ActivationReport {
    pub key: KeySummary,
    pub demoted: Option<String>,
    pub distributed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distribution_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Redistribution {
    pub fingerprint: String,
    pub remote: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RotationOutcome {
    /// Nothing to rotate yet.
    NoActiveKey,
    NotDue {
        fingerprint: String,
        age_seconds: i64,
        threshold_seconds: i64,
    },
    Rotated {
        previous: String,
        current: String,
        /// Whether the new key reached the remote side.
        distributed: bool,
        purged: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum WatchdogOutcome {
    /// Remote side confirms a key is installed.
    Healthy,
    /// Remote side reported no key, and the active key was pushed again.
    Redistributed { fingerprint: String },
    /// Remote side has no key, but neither do we.
    NoActiveKey,
    /// Probe or redistribution failed; audited, nothing else done.
    Error { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ProvisionStep {
    pub step: u8,
    pub action: &'static str,
    pub detail: Value,
}

/// Report of the generate, activate, distribute, test sequence.
#[derive(Debug, Clone, Serialize)]
pub struct ProvisionReport {
    pub fingerprint: String,
    pub public_key: String,
    pub steps: Vec<ProvisionStep>,
}
