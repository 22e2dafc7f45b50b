// Keywarden: Key Lifecycle Service
//
// The key state machine: generate, activate, rotate, purge and
// redistribute, plus the manual revoke path and the watchdog body.
//
// Every mutating operation runs under the single `OpLock`. The lock is held
// only while the next state transition is decided and committed; calls to
// the remote environment happen after it is released, so a slow or failed
// distribution never blocks other writers and never unwinds a committed
// activation.
//
// SECURITY: plaintext private keys exist only between decryption (or
// generation) and the distributor call, inside `Zeroizing` buffers.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Value};

use super::lock::{OpLock, DEFAULT_LOCK_MAX_ATTEMPTS, DEFAULT_LOCK_POLL_INTERVAL};
use super::outcome::{
    ActivationReport, GeneratedKey, ProvisionReport, ProvisionStep, Redistribution,
    RotationOutcome, WatchdogOutcome,
};
use crate::crypto::{KeyCodec, SecretCipher};
use crate::distributor::Distributor;
use crate::error::{KeywardenError, Result};
use crate::metrics::{Counter, MetricsRegistry};
use crate::store::{
    Activation, AuditEvent, EventType, KeyStore, KeySummary, NewKeyRecord, StoreError,
    SYSTEM_FINGERPRINT,
};

const SECONDS_PER_DAY: i64 = 86_400;

/// Tunables for the lifecycle service.
#[derive(Debug, Clone)]
pub struct LifecyclePolicy {
    /// Inactive keys kept by the purge that follows a rotation.
    pub retain_inactive: usize,
    pub store_retry_attempts: u32,
    /// Backoff before retry `n` is `store_retry_backoff * n`.
    pub store_retry_backoff: Duration,
    pub lock_poll_interval: Duration,
    pub lock_max_attempts: u32,
}

impl Default for LifecyclePolicy {
    fn default() -> Self {
        Self {
            retain_inactive: 3,
            store_retry_attempts: 3,
            store_retry_backoff: Duration::from_millis(100),
            lock_poll_interval: DEFAULT_LOCK_POLL_INTERVAL,
            lock_max_attempts: DEFAULT_LOCK_MAX_ATTEMPTS,
        }
    }
}

pub struct KeyLifecycle {
    store: Arc<dyn KeyStore>,
    codec: KeyCodec,
    cipher: SecretCipher,
    distributor: Distributor,
    metrics: MetricsRegistry,
    lock: OpLock,
    policy: LifecyclePolicy,
}

impl KeyLifecycle {
    pub fn new(
        store: Arc<dyn KeyStore>,
        codec: KeyCodec,
        cipher: SecretCipher,
        distributor: Distributor,
        policy: LifecyclePolicy,
    ) -> Self {
        Self {
            store,
            codec,
            cipher,
            distributor,
            metrics: MetricsRegistry::new(),
            lock: OpLock::new(policy.lock_poll_interval, policy.lock_max_attempts),
            policy,
        }
    }

    pub fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }

    pub fn policy(&self) -> &LifecyclePolicy {
        &self.policy
    }

    // ── Store helpers ─────────────────────────────────────────────────────

    /// Run a store call, retrying transient failures with linear backoff.
    /// Logical failures return on the first attempt.
    async fn with_store_retry<T, F>(
        &self,
        operation: &str,
        f: F,
    ) -> std::result::Result<T, StoreError>
    where
        F: Fn() -> std::result::Result<T, StoreError>,
    {
        let attempts = self.policy.store_retry_attempts.max(1);
        let mut attempt = 1;
        loop {
            match f() {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < attempts => {
                    tracing::warn!(
                        operation,
                        attempt,
                        error = %e,
                        "Transient store failure; retrying"
                    );
                    tokio::time::sleep(self.policy.store_retry_backoff * attempt).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Append an audit event. The state change it describes has already
    /// committed, so a failed write is logged rather than returned.
    async fn audit(&self, fingerprint: &str, event: EventType, meta: Value) {
        let result = self
            .with_store_retry("audit", || {
                self.store.append_audit_event(fingerprint, event, &meta)
            })
            .await;
        if let Err(e) = result {
            tracing::error!(
                fingerprint = %fingerprint,
                event = %event,
                error = %e,
                "Failed to record audit event"
            );
        }
    }

    // ── Mutating operations ───────────────────────────────────────────────

    /// Mint, seal and persist a new `pending` key.
    pub async fn generate_and_persist(&self) -> Result<GeneratedKey> {
        let _guard = self.lock.acquire("generate").await?;
        self.generate_locked().await
    }

    async fn generate_locked(&self) -> Result<GeneratedKey> {
        let keypair = self.codec.generate()?;
        let fingerprint = KeyCodec::fingerprint(&keypair.public_key)?;
        let sealed = self.cipher.seal(keypair.private_key().as_bytes())?;

        let record = self
            .with_store_retry("insert", || {
                self.store.insert(NewKeyRecord {
                    fingerprint: fingerprint.clone(),
                    public_key: keypair.public_key.clone(),
                    encrypted_private_key: sealed.clone(),
                })
            })
            .await?;

        self.audit(
            &fingerprint,
            EventType::Generated,
            json!({ "fingerprint": fingerprint }),
        )
        .await;
        self.metrics.increment(Counter::KeysGenerated);
        tracing::info!(fingerprint = %fingerprint, "Generated key (pending)");

        Ok(GeneratedKey::new(record, keypair.into_private_key()))
    }

    /// Promote a key to active, demoting the previous active key.
    pub async fn activate_key(&self, fingerprint: &str) -> Result<Activation> {
        let _guard = self.lock.acquire("activate").await?;
        self.activate_locked(fingerprint).await
    }

    async fn activate_locked(&self, fingerprint: &str) -> Result<Activation> {
        let activation = self
            .with_store_retry("activate", || self.store.set_active(fingerprint))
            .await?;

        let meta = match &activation.demoted {
            Some(previous) => json!({ "demoted": previous }),
            None => json!({}),
        };
        self.audit(fingerprint, EventType::Activated, meta).await;
        self.metrics.increment(Counter::KeysActivated);
        tracing::info!(
            fingerprint = %fingerprint,
            demoted = ?activation.demoted,
            "Activated key"
        );

        Ok(activation)
    }

    /// Activate, then try to push the new active key to the remote side.
    /// A failed push is reported, not returned as an error.
    pub async fn activate_and_distribute(&self, fingerprint: &str) -> Result<ActivationReport> {
        let activation = self.activate_key(fingerprint).await?;

        let (distributed, distribution_error) = match self.redistribute_active_key().await {
            Ok(_) => (true, None),
            Err(e) => {
                tracing::warn!(
                    fingerprint = %fingerprint,
                    error = %e,
                    "Post-activation redistribution failed"
                );
                (false, Some(e.to_string()))
            }
        };

        Ok(ActivationReport {
            key: activation.record.summary(),
            demoted: activation.demoted,
            distributed,
            distribution_error,
        })
    }

    /// Replace the active key if it is at least `max_age_days` old.
    pub async fn rotate_if_due(&self, max_age_days: u32) -> Result<RotationOutcome> {
        let threshold_seconds = i64::from(max_age_days) * SECONDS_PER_DAY;

        let guard = self.lock.acquire("rotate").await?;
        let Some(active) = self.store.find_active()? else {
            return Ok(RotationOutcome::NoActiveKey);
        };

        let age_seconds = active.age_seconds(Utc::now());
        if age_seconds < threshold_seconds {
            tracing::debug!(
                fingerprint = %active.fingerprint,
                age_seconds,
                threshold_seconds,
                "Active key not due for rotation"
            );
            return Ok(RotationOutcome::NotDue {
                fingerprint: active.fingerprint,
                age_seconds,
                threshold_seconds,
            });
        }

        let generated = self.generate_locked().await?;
        self.activate_locked(generated.fingerprint()).await?;
        self.audit(
            generated.fingerprint(),
            EventType::Rotated,
            json!({ "previous": active.fingerprint }),
        )
        .await;
        self.metrics.increment(Counter::RotationEvents);
        drop(guard);

        tracing::info!(
            previous = %active.fingerprint,
            current = %generated.fingerprint(),
            age_seconds,
            "Rotated active key"
        );

        let distributed = match self
            .distributor
            .distribute(
                generated.private_key(),
                generated.public_key(),
                generated.fingerprint(),
            )
            .await
        {
            Ok(_) => {
                self.audit(
                    generated.fingerprint(),
                    EventType::Redistributed,
                    json!({ "trigger": "rotation" }),
                )
                .await;
                self.metrics.increment(Counter::Redistributions);
                true
            }
            Err(e) => {
                tracing::warn!(
                    fingerprint = %generated.fingerprint(),
                    error = %e,
                    "Distribution after rotation failed; watchdog will retry"
                );
                false
            }
        };

        let purged = match self.purge_old_inactive(self.policy.retain_inactive).await {
            Ok(purged) => purged,
            Err(e) => {
                tracing::warn!(error = %e, "Purge after rotation failed");
                Vec::new()
            }
        };

        Ok(RotationOutcome::Rotated {
            previous: active.fingerprint,
            current: generated.fingerprint().to_string(),
            distributed,
            purged,
        })
    }

    /// Delete inactive keys beyond the `retain` most recently created.
    pub async fn purge_old_inactive(&self, retain: usize) -> Result<Vec<String>> {
        let _guard = self.lock.acquire("purge").await?;
        let purged = self
            .with_store_retry("purge", || self.store.delete_inactive_beyond(retain))
            .await?;

        for fingerprint in &purged {
            self.audit(fingerprint, EventType::Purged, json!({})).await;
        }
        if !purged.is_empty() {
            self.metrics.add(Counter::PurgeEvents, purged.len() as u64);
            tracing::info!(count = purged.len(), retain, "Purged inactive keys");
        }

        Ok(purged)
    }

    /// Decrypt the active key and push it to the remote side.
    pub async fn redistribute_active_key(&self) -> Result<Redistribution> {
        self.redistribute_locked_read(None).await
    }

    /// Redistribute, but only if `fingerprint` names the active key.
    pub async fn redistribute_fingerprint(&self, fingerprint: &str) -> Result<Redistribution> {
        self.redistribute_locked_read(Some(fingerprint)).await
    }

    /// The active key is read and checked against `expected` under the lock;
    /// only the network push happens outside it.
    async fn redistribute_locked_read(&self, expected: Option<&str>) -> Result<Redistribution> {
        let (record, private_key) = {
            let _guard = self.lock.acquire("redistribute").await?;
            let active = self.store.find_active()?;
            let record = match (active, expected) {
                (Some(active), Some(fp)) if active.fingerprint != fp => {
                    return Err(KeywardenError::NotActive(fp.to_string()))
                }
                (None, Some(fp)) => return Err(KeywardenError::NotActive(fp.to_string())),
                (None, None) => return Err(KeywardenError::NoActiveKey),
                (Some(active), _) => active,
            };
            let private_key = self.cipher.open_string(record.encrypted_private_key())?;
            (record, private_key)
        };

        let remote = self
            .distributor
            .distribute(&private_key, &record.public_key, &record.fingerprint)
            .await?;
        drop(private_key);

        self.audit(&record.fingerprint, EventType::Redistributed, json!({}))
            .await;
        self.metrics.increment(Counter::Redistributions);

        Ok(Redistribution {
            fingerprint: record.fingerprint,
            remote,
        })
    }

    /// Move a key to the terminal `revoked` status.
    pub async fn revoke_key(&self, fingerprint: &str) -> Result<KeySummary> {
        let _guard = self.lock.acquire("revoke").await?;

        let was_active = self
            .store
            .find_by_fingerprint(fingerprint)?
            .ok_or_else(|| StoreError::NotFound(fingerprint.to_string()))?
            .active;
        let record = self
            .with_store_retry("revoke", || self.store.revoke(fingerprint))
            .await?;

        self.audit(
            fingerprint,
            EventType::Revoked,
            json!({ "was_active": was_active }),
        )
        .await;

        if was_active {
            tracing::warn!(
                fingerprint = %fingerprint,
                "Revoked the active key; no key is active until another is activated"
            );
        } else {
            tracing::info!(fingerprint = %fingerprint, "Revoked key");
        }

        Ok(record.summary())
    }

    // ── Probes ────────────────────────────────────────────────────────────

    /// Verify the remote side still holds a key and push the active key
    /// again if it does not. Never assumes a state it could not observe:
    /// any failure is audited and otherwise ignored.
    pub async fn watchdog_check(&self) -> WatchdogOutcome {
        match self.watchdog_inner().await {
            Ok(outcome) => outcome,
            Err(e) => {
                let error = e.to_string();
                tracing::warn!(error = %error, "Watchdog check failed");
                self.audit(
                    SYSTEM_FINGERPRINT,
                    EventType::WatchdogError,
                    json!({ "error": error }),
                )
                .await;
                WatchdogOutcome::Error { error }
            }
        }
    }

    async fn watchdog_inner(&self) -> Result<WatchdogOutcome> {
        if self.distributor.probe_installed_status().await? {
            if let Some(active) = self.store.find_active()? {
                self.store.mark_validated(&active.fingerprint)?;
            }
            return Ok(WatchdogOutcome::Healthy);
        }

        if self.store.find_active()?.is_none() {
            tracing::debug!("Remote has no key installed and no key is active");
            return Ok(WatchdogOutcome::NoActiveKey);
        }

        let redistribution = self.redistribute_active_key().await?;
        self.metrics.increment(Counter::WatchdogRedistributions);
        tracing::info!(
            fingerprint = %redistribution.fingerprint,
            "Watchdog redistributed missing key"
        );

        Ok(WatchdogOutcome::Redistributed {
            fingerprint: redistribution.fingerprint,
        })
    }

    /// Make sure the remote side has the active key, then run its
    /// connection test.
    pub async fn test_connectivity(&self) -> Result<Value> {
        if let Err(e) = self.redistribute_active_key().await {
            tracing::warn!(
                error = %e,
                "Redistribution before connection test failed (key may already be installed)"
            );
        }
        Ok(self.distributor.test_connectivity().await?)
    }

    /// Generate, activate, distribute and test in one call. Stops at the
    /// first failing step.
    pub async fn provision(&self) -> Result<ProvisionReport> {
        let mut steps = Vec::with_capacity(4);

        let generated = self.generate_and_persist().await?;
        let fingerprint = generated.fingerprint().to_string();
        let public_key = generated.public_key().to_string();
        drop(generated);
        steps.push(ProvisionStep {
            step: 1,
            action: "generate",
            detail: json!({ "fingerprint": fingerprint, "public_key": public_key }),
        });

        let activation = self.activate_key(&fingerprint).await?;
        steps.push(ProvisionStep {
            step: 2,
            action: "activate",
            detail: json!({
                "fingerprint": activation.record.fingerprint,
                "active": activation.record.active,
                "demoted": activation.demoted,
            }),
        });

        let redistribution = self.redistribute_active_key().await?;
        steps.push(ProvisionStep {
            step: 3,
            action: "distribute",
            detail: json!({
                "fingerprint": redistribution.fingerprint,
                "remote": redistribution.remote,
            }),
        });

        let test_result = self.distributor.test_connectivity().await?;
        steps.push(ProvisionStep {
            step: 4,
            action: "test",
            detail: test_result,
        });

        tracing::info!(fingerprint = %fingerprint, "Key provisioned and verified");

        Ok(ProvisionReport {
            fingerprint,
            public_key,
            steps,
        })
    }

    // ── Read-only views (no lock) ─────────────────────────────────────────

    pub fn active_key(&self) -> Result<Option<KeySummary>> {
        Ok(self.store.find_active()?.map(|r| r.summary()))
    }

    pub fn list_keys(&self) -> Result<Vec<KeySummary>> {
        Ok(self.store.list()?)
    }

    pub fn audit_log(&self, fingerprint: &str) -> Result<Vec<AuditEvent>> {
        Ok(self.store.audit_events(fingerprint)?)
    }

    /// Counters plus the active key's current age.
    pub fn export_metrics(&self) -> Result<String> {
        let age = self
            .store
            .find_active()?
            .map(|active| active.age_seconds(Utc::now()));
        Ok(self.metrics.render(age))
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
