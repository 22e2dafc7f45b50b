// Keywarden: SQLite Database Management
//
// Opens the key database and runs idempotent migrations. The single
// connection sits behind a mutex so the store can be shared across tasks;
// every store call holds it only for the duration of its statements.

use std::sync::{Mutex, MutexGuard};

use rusqlite::Connection;

use super::StoreError;

/// Wrapper around the SQLite connection holding key records and events.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the database at the given path.
    pub fn open(path: &std::path::Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.run_migrations()?;

        Ok(db)
    }

    /// Open an in-memory database (for testing only).
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Lock and return the underlying connection.
    pub fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Run schema migrations to create or update tables.
    fn run_migrations(&self) -> Result<(), StoreError> {
        self.conn()?.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS ssh_keys (
                id                  INTEGER PRIMARY KEY AUTOINCREMENT,
                fingerprint         TEXT NOT NULL UNIQUE,
                public_key          TEXT NOT NULL,
                private_key_enc     BLOB NOT NULL,
                status              TEXT NOT NULL DEFAULT 'pending',
                active              INTEGER NOT NULL DEFAULT 0,
                created_at          TEXT NOT NULL,
                rotated_at          TEXT,
                last_validated_at   TEXT
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_ssh_keys_single_active
                ON ssh_keys(active) WHERE active = 1;

            CREATE INDEX IF NOT EXISTS idx_ssh_keys_status
                ON ssh_keys(status);

            CREATE TABLE IF NOT EXISTS key_events (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                fingerprint     TEXT NOT NULL,
                event_type      TEXT NOT NULL,
                meta            TEXT NOT NULL DEFAULT '{}',
                created_at      TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_key_events_fingerprint
                ON key_events(fingerprint, created_at DESC);
            ",
        )?;

        tracing::debug!("Database migrations completed successfully");
        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn table_exists(db: &Database, name: &str) -> bool {
        let count: i64 = db
            .conn()
            .unwrap()
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE type='table' AND name=?1",
                [name],
                |row| row.get(0),
            )
            .unwrap();
        count == 1
    }

    #[test]
    fn test_open_in_memory_succeeds() {
        let db = Database::open_in_memory();
        assert!(db.is_ok(), "Should be able to open an in-memory database");
    }

    #[test]
    fn test_schema_migration_creates_tables() {
        let db = Database::open_in_memory().unwrap();
        assert!(table_exists(&db, "ssh_keys"), "ssh_keys table should exist");
        assert!(table_exists(&db, "key_events"), "key_events table should exist");
    }

    #[test]
    fn test_schema_migration_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        assert!(
            db.run_migrations().is_ok(),
            "Migrations should be idempotent"
        );
    }

    #[test]
    fn test_open_on_disk_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.db");

        {
            let db = Database::open(&path).unwrap();
            db.conn()
                .unwrap()
                .execute(
                    "INSERT INTO ssh_keys (fingerprint, public_key, private_key_enc, created_at)
                     VALUES ('SHA256:a', 'ssh-ed25519 AAAA', x'00', '2024-01-01T00:00:00Z')",
                    [],
                )
                .unwrap();
        }

        let db = Database::open(&path).unwrap();
        let count: i64 = db
            .conn()
            .unwrap()
            .query_row("SELECT count(*) FROM ssh_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_second_active_row_is_rejected_by_schema() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.conn().unwrap();
        conn.execute(
            "INSERT INTO ssh_keys (fingerprint, public_key, private_key_enc, status, active, created_at)
             VALUES ('SHA256:a', 'k', x'00', 'active', 1, '2024-01-01T00:00:00Z')",
            [],
        )
        .unwrap();
        let second = conn.execute(
            "INSERT INTO ssh_keys (fingerprint, public_key, private_key_enc, status, active, created_at)
             VALUES ('SHA256:b', 'k', x'00', 'active', 1, '2024-01-01T00:00:00Z')",
            [],
        );
        assert!(second.is_err(), "At most one row may be active");
    }
}
