// Keywarden: Key Store Repository
//
// Persistence boundary for key records and the audit trail. The
// demote-then-promote of `set_active` runs in one transaction, and the
// schema's partial unique index rejects any write that would leave two rows
// active, so the single-active invariant holds even across processes.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::{params, OptionalExtension};

use super::db::Database;
use super::models::{
    Activation, AuditEvent, EventType, KeyRecord, KeyStatus, KeySummary, NewKeyRecord,
};
use super::StoreError;

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over key record storage.
pub trait KeyStore: Send + Sync {
    /// Insert a freshly generated key as `pending`. Fails on a duplicate
    /// fingerprint.
    fn insert(&self, key: NewKeyRecord) -> Result<KeyRecord, StoreError>;

    /// The single active key, if any.
    fn find_active(&self) -> Result<Option<KeyRecord>, StoreError>;

    fn find_by_fingerprint(&self, fingerprint: &str) -> Result<Option<KeyRecord>, StoreError>;

    /// Atomically demote the current active key (if any) and promote the
    /// target. Unknown or retired fingerprints fail without mutating anything.
    fn set_active(&self, fingerprint: &str) -> Result<Activation, StoreError>;

    /// Delete inactive keys beyond the `retain` most recently created.
    /// Returns the deleted fingerprints.
    fn delete_inactive_beyond(&self, retain: usize) -> Result<Vec<String>, StoreError>;

    /// Move a key to the terminal `revoked` status.
    fn revoke(&self, fingerprint: &str) -> Result<KeyRecord, StoreError>;

    /// Stamp `last_validated_at` on a key. Returns false if it does not exist.
    fn mark_validated(&self, fingerprint: &str) -> Result<bool, StoreError>;

    /// All keys, newest first (no key material).
    fn list(&self) -> Result<Vec<KeySummary>, StoreError>;

    /// Append an immutable audit event.
    fn append_audit_event(
        &self,
        fingerprint: &str,
        event_type: EventType,
        meta: &serde_json::Value,
    ) -> Result<(), StoreError>;

    /// Audit events for one fingerprint, oldest first.
    fn audit_events(&self, fingerprint: &str) -> Result<Vec<AuditEvent>, StoreError>;
}

// ─── SQLite Implementation ──────────────────────────────────────────────────

const RECORD_COLUMNS: &str = "fingerprint, public_key, private_key_enc, status, active,
                              created_at, rotated_at, last_validated_at";

fn now_timestamp() -> String {
    timestamp(Utc::now())
}

fn timestamp(at: DateTime<Utc>) -> String {
    // Fixed-width so lexical ORDER BY matches chronological order.
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion_error(
    idx: usize,
    err: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, err.into())
}

fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn parse_optional_timestamp(
    idx: usize,
    raw: Option<String>,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    raw.map(|s| parse_timestamp(idx, &s)).transpose()
}

pub struct SqliteKeyStore {
    db: Database,
}

impl SqliteKeyStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Parse a key record row selected with `RECORD_COLUMNS`.
    fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<KeyRecord> {
        let fingerprint: String = row.get(0)?;
        let public_key: String = row.get(1)?;
        let encrypted: Vec<u8> = row.get(2)?;
        let status_str: String = row.get(3)?;
        let active: bool = row.get(4)?;
        let created_at_str: String = row.get(5)?;
        let rotated_at_str: Option<String> = row.get(6)?;
        let validated_at_str: Option<String> = row.get(7)?;

        let status: KeyStatus = status_str.parse().map_err(|e: String| conversion_error(3, e))?;

        Ok(KeyRecord::new(
            fingerprint,
            public_key,
            encrypted,
            status,
            active,
            parse_timestamp(5, &created_at_str)?,
            parse_optional_timestamp(6, rotated_at_str)?,
            parse_optional_timestamp(7, validated_at_str)?,
        ))
    }

    fn query_one(
        conn: &rusqlite::Connection,
        clause: &str,
        args: impl rusqlite::Params,
    ) -> Result<Option<KeyRecord>, StoreError> {
        let sql = format!("SELECT {} FROM ssh_keys WHERE {} LIMIT 1", RECORD_COLUMNS, clause);
        Ok(conn.query_row(&sql, args, Self::row_to_record).optional()?)
    }

    /// Rewrite a key's creation time (test fixtures for age-based behavior).
    #[cfg(test)]
    pub fn backdate(&self, fingerprint: &str, created_at: DateTime<Utc>) -> Result<(), StoreError> {
        self.db.conn()?.execute(
            "UPDATE ssh_keys SET created_at = ?1 WHERE fingerprint = ?2",
            params![timestamp(created_at), fingerprint],
        )?;
        Ok(())
    }
}

impl KeyStore for SqliteKeyStore {
    fn insert(&self, key: NewKeyRecord) -> Result<KeyRecord, StoreError> {
        // Stored at microsecond precision; keep the returned record identical.
        let created_at = Utc::now().trunc_subsecs(6);
        self.db.conn()?.execute(
            "INSERT INTO ssh_keys
                (fingerprint, public_key, private_key_enc, status, active, created_at)
             VALUES (?1, ?2, ?3, 'pending', 0, ?4)",
            params![
                key.fingerprint,
                key.public_key,
                key.encrypted_private_key,
                timestamp(created_at),
            ],
        )?;

        tracing::debug!(fingerprint = %key.fingerprint, "Key record inserted");

        Ok(KeyRecord::new(
            key.fingerprint,
            key.public_key,
            key.encrypted_private_key,
            KeyStatus::Pending,
            false,
            created_at,
            None,
            None,
        ))
    }

    fn find_active(&self) -> Result<Option<KeyRecord>, StoreError> {
        let conn = self.db.conn()?;
        Self::query_one(&conn, "active = 1", [])
    }

    fn find_by_fingerprint(&self, fingerprint: &str) -> Result<Option<KeyRecord>, StoreError> {
        let conn = self.db.conn()?;
        Self::query_one(&conn, "fingerprint = ?1", params![fingerprint])
    }

    fn set_active(&self, fingerprint: &str) -> Result<Activation, StoreError> {
        let mut conn = self.db.conn()?;
        let tx = conn.transaction()?;

        let status: Option<String> = tx
            .query_row(
                "SELECT status FROM ssh_keys WHERE fingerprint = ?1",
                params![fingerprint],
                |row| row.get(0),
            )
            .optional()?;
        let status: KeyStatus = match status {
            Some(s) => s.parse().map_err(StoreError::Corrupt)?,
            None => return Err(StoreError::NotFound(fingerprint.to_string())),
        };

        if status.is_retired() {
            return Err(StoreError::InvalidTransition {
                fingerprint: fingerprint.to_string(),
                status: status.to_string(),
            });
        }

        let mut demoted = None;
        if status != KeyStatus::Active {
            demoted = tx
                .query_row(
                    "SELECT fingerprint FROM ssh_keys WHERE active = 1",
                    [],
                    |row| row.get::<_, String>(0),
                )
                .optional()?;

            tx.execute(
                "UPDATE ssh_keys SET active = 0, status = 'deprecated', rotated_at = ?1
                 WHERE active = 1",
                params![now_timestamp()],
            )?;
            tx.execute(
                "UPDATE ssh_keys SET active = 1, status = 'active' WHERE fingerprint = ?1",
                params![fingerprint],
            )?;
        }

        let record = Self::query_one(&tx, "fingerprint = ?1", params![fingerprint])?
            .ok_or_else(|| StoreError::NotFound(fingerprint.to_string()))?;
        tx.commit()?;

        tracing::debug!(
            fingerprint = %fingerprint,
            demoted = ?demoted,
            "Key promoted to active"
        );

        Ok(Activation { record, demoted })
    }

    fn delete_inactive_beyond(&self, retain: usize) -> Result<Vec<String>, StoreError> {
        let mut conn = self.db.conn()?;
        let tx = conn.transaction()?;

        let doomed: Vec<String> = {
            let mut stmt = tx.prepare(
                "SELECT fingerprint FROM ssh_keys WHERE active = 0
                 ORDER BY created_at DESC, id DESC
                 LIMIT -1 OFFSET ?1",
            )?;
            // SQLite reads a negative OFFSET as 0, so saturate instead of wrapping.
            let offset = i64::try_from(retain).unwrap_or(i64::MAX);
            let rows = stmt.query_map(params![offset], |row| row.get::<_, String>(0))?;
            rows.collect::<rusqlite::Result<_>>()?
        };

        for fingerprint in &doomed {
            tx.execute(
                "DELETE FROM ssh_keys WHERE fingerprint = ?1 AND active = 0",
                params![fingerprint],
            )?;
        }
        tx.commit()?;

        Ok(doomed)
    }

    fn revoke(&self, fingerprint: &str) -> Result<KeyRecord, StoreError> {
        let mut conn = self.db.conn()?;
        let tx = conn.transaction()?;

        let affected = tx.execute(
            "UPDATE ssh_keys
             SET status = 'revoked',
                 rotated_at = CASE WHEN active = 1 THEN ?1 ELSE rotated_at END,
                 active = 0
             WHERE fingerprint = ?2",
            params![now_timestamp(), fingerprint],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound(fingerprint.to_string()));
        }

        let record = Self::query_one(&tx, "fingerprint = ?1", params![fingerprint])?
            .ok_or_else(|| StoreError::NotFound(fingerprint.to_string()))?;
        tx.commit()?;
        Ok(record)
    }

    fn mark_validated(&self, fingerprint: &str) -> Result<bool, StoreError> {
        let affected = self.db.conn()?.execute(
            "UPDATE ssh_keys SET last_validated_at = ?1 WHERE fingerprint = ?2",
            params![now_timestamp(), fingerprint],
        )?;
        Ok(affected > 0)
    }

    fn list(&self) -> Result<Vec<KeySummary>, StoreError> {
        let conn = self.db.conn()?;
        let sql = format!(
            "SELECT {} FROM ssh_keys ORDER BY created_at DESC, id DESC",
            RECORD_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], Self::row_to_record)?;

        let mut summaries = Vec::new();
        for row in rows {
            summaries.push(row?.summary());
        }
        Ok(summaries)
    }

    fn append_audit_event(
        &self,
        fingerprint: &str,
        event_type: EventType,
        meta: &serde_json::Value,
    ) -> Result<(), StoreError> {
        let meta_json = serde_json::to_string(meta)?;
        self.db.conn()?.execute(
            "INSERT INTO key_events (fingerprint, event_type, meta, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![fingerprint, event_type.as_str(), meta_json, now_timestamp()],
        )?;

        tracing::debug!(
            fingerprint = %fingerprint,
            event = %event_type,
            "Audit event recorded"
        );

        Ok(())
    }

    fn audit_events(&self, fingerprint: &str) -> Result<Vec<AuditEvent>, StoreError> {
        let conn = self.db.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, fingerprint, event_type, meta, created_at FROM key_events
             WHERE fingerprint = ?1 ORDER BY id ASC",
        )?;

        let rows = stmt.query_map(params![fingerprint], |row| {
            let id: i64 = row.get(0)?;
            let fingerprint: String = row.get(1)?;
            let event_str: String = row.get(2)?;
            let meta_str: String = row.get(3)?;
            let created_at_str: String = row.get(4)?;

            let event_type: EventType =
                event_str.parse().map_err(|e: String| conversion_error(2, e))?;
            let meta = serde_json::from_str(&meta_str).map_err(|e| conversion_error(3, e))?;

            Ok(AuditEvent {
                id,
                fingerprint,
                event_type,
                meta,
                created_at: parse_timestamp(4, &created_at_str)?,
            })
        })?;

        let mut events = Vec::new();
        for row in rows {
            events.push(row?);
        }
        Ok(events)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
