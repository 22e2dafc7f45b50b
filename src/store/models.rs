// Keywarden: Key record data models
//
// SECURITY: `encrypted_private_key` is private and never included in Debug
// output or serialized summaries. Only the lifecycle service reads it, and
// only to hand it to the cipher.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fingerprint recorded on audit events that concern no single key.
pub const SYSTEM_FINGERPRINT: &str = "system";

/// Lifecycle status of a key record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyStatus {
    Pending,
    Active,
    Deprecated,
    Revoked,
}

impl KeyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyStatus::Pending => "pending",
            KeyStatus::Active => "active",
            KeyStatus::Deprecated => "deprecated",
            KeyStatus::Revoked => "revoked",
        }
    }

    /// Statuses that can never be activated again.
    pub fn is_retired(&self) -> bool {
        matches!(self, KeyStatus::Deprecated | KeyStatus::Revoked)
    }
}

impl fmt::Display for KeyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for KeyStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(KeyStatus::Pending),
            "active" => Ok(KeyStatus::Active),
            "deprecated" => Ok(KeyStatus::Deprecated),
            "revoked" => Ok(KeyStatus::Revoked),
            other => Err(format!("unknown key status '{}'", other)),
        }
    }
}

/// One generated keypair, as persisted.
pub struct KeyRecord {
    pub fingerprint: String,
    pub public_key: String,
    encrypted_private_key: Vec<u8>,
    pub status: KeyStatus,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub rotated_at: Option<DateTime<Utc>>,
    pub last_validated_at: Option<DateTime<Utc>>,
}

impl KeyRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        fingerprint: String,
        public_key: String,
        encrypted_private_key: Vec<u8>,
        status: KeyStatus,
        active: bool,
        created_at: DateTime<Utc>,
        rotated_at: Option<DateTime<Utc>>,
        last_validated_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            fingerprint,
            public_key,
            encrypted_private_key,
            status,
            active,
            created_at,
            rotated_at,
            last_validated_at,
        }
    }

    /// The sealed private key blob (nonce || tag || ciphertext).
    pub fn encrypted_private_key(&self) -> &[u8] {
        &self.encrypted_private_key
    }

    /// Age of the key relative to `now`, in whole seconds.
    pub fn age_seconds(&self, now: DateTime<Utc>) -> i64 {
        (now - self.created_at).num_seconds().max(0)
    }

    pub fn summary(&self) -> KeySummary {
        KeySummary {
            fingerprint: self.fingerprint.clone(),
            public_key: self.public_key.clone(),
            status: self.status,
            active: self.active,
            created_at: self.created_at,
            rotated_at: self.rotated_at,
            last_validated_at: self.last_validated_at,
        }
    }
}

impl fmt::Debug for KeyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyRecord")
            .field("fingerprint", &self.fingerprint)
            .field("public_key", &self.public_key)
            .field("encrypted_private_key", &"[REDACTED]")
            .field("status", &self.status)
            .field("active", &self.active)
            .field("created_at", &self.created_at)
            .field("rotated_at", &self.rotated_at)
            .field("last_validated_at", &self.last_validated_at)
            .finish()
    }
}

impl fmt::Display for KeyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.fingerprint, self.status)
    }
}

/// Public view of a key record, safe to print and serialize.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeySummary {
    pub fingerprint: String,
    pub public_key: String,
    pub status: KeyStatus,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub rotated_at: Option<DateTime<Utc>>,
    pub last_validated_at: Option<DateTime<Utc>>,
}

/// Input for inserting a freshly generated key.
pub struct NewKeyRecord {
    pub fingerprint: String,
    pub public_key: String,
    pub encrypted_private_key: Vec<u8>,
}

/// Result of promoting a key to active.
#[derive(Debug)]
pub struct Activation {
    pub record: KeyRecord,
    /// Fingerprint of the key demoted to `deprecated`, if any.
    pub demoted: Option<String>,
}

/// Kind of audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Generated,
    Activated,
    Redistributed,
    Rotated,
    Purged,
    Revoked,
    WatchdogError,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Generated => "generated",
            EventType::Activated => "activated",
            EventType::Redistributed => "redistributed",
            EventType::Rotated => "rotated",
            EventType::Purged => "purged",
            EventType::Revoked => "revoked",
            EventType::WatchdogError => "watchdog_error",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "generated" => Ok(EventType::Generated),
            "activated" => Ok(EventType::Activated),
            "redistributed" => Ok(EventType::Redistributed),
            "rotated" => Ok(EventType::Rotated),
            "purged" => Ok(EventType::Purged),
            "revoked" => Ok(EventType::Revoked),
            "watchdog_error" => Ok(EventType::WatchdogError),
            other => Err(format!("unknown event type '{}'", other)),
        }
    }
}

/// An immutable audit trail entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: i64,
    pub fingerprint: String,
    pub event_type: EventType,
    pub meta: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl fmt::Display for AuditEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {}",
            self.created_at.format("%Y-%m-%d %H:%M:%S"),
            self.event_type,
            self.fingerprint
        )?;
        if self.meta.as_object().is_some_and(|m| !m.is_empty()) {
            write!(f, " {}", self.meta)?;
        }
        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> KeyRecord {
        KeyRecord::new(
            "SHA256:abc".to_string(),
            "ssh-ed25519 AAAA test".to_string(),
            vec![0xde, 0xad, 0xbe, 0xef],
            KeyStatus::Pending,
            false,
            Utc::now(),
            None,
            None,
        )
    }

    #[test]
    fn test_record_debug_redacts_ciphertext() {
        let debug = format!("{:?}", record());
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("222, 173"), "ciphertext bytes must not be printed");
    }

    #[test]
    fn test_summary_json_has_no_key_material() {
        let json = serde_json::to_string(&record().summary()).unwrap();
        assert!(!json.contains("private"));
        assert!(json.contains("\"status\":\"pending\""));
    }

    #[test]
    fn test_status_round_trip_and_retirement() {
        for status in [
            KeyStatus::Pending,
            KeyStatus::Active,
            KeyStatus::Deprecated,
            KeyStatus::Revoked,
        ] {
            assert_eq!(status.as_str().parse::<KeyStatus>().unwrap(), status);
        }
        assert!(KeyStatus::Deprecated.is_retired());
        assert!(KeyStatus::Revoked.is_retired());
        assert!(!KeyStatus::Pending.is_retired());
        assert!("bogus".parse::<KeyStatus>().is_err());
    }

    #[test]
    fn test_event_type_names() {
        assert_eq!(EventType::WatchdogError.as_str(), "watchdog_error");
        assert_eq!(
            serde_json::to_string(&EventType::WatchdogError).unwrap(),
            "\"watchdog_error\""
        );
        assert_eq!("purged".parse::<EventType>().unwrap(), EventType::Purged);
    }

    #[test]
    fn test_age_never_negative() {
        let rec = record();
        let earlier = rec.created_at - chrono::Duration::seconds(10);
        assert_eq!(rec.age_seconds(earlier), 0);
        let later = rec.created_at + chrono::Duration::seconds(90);
        assert_eq!(rec.age_seconds(later), 90);
    }
}
