//! Database schema migrations for SQLite.
//!
//! Each migration is a SQL batch that moves the schema from version N to N+1.
//! Applied versions are recorded in `schema_migrations`.

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema. Idempotent.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema version {current} is newer than supported version {CURRENT_VERSION}"
        )));
    }

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
        }

        tx.commit()?;
        tracing::debug!(from = current, to = CURRENT_VERSION, "migrated key store schema");
    }

    Ok(())
}

fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {version}"
        ))),
    }
}

/// Migration v1: bundles, envelopes and blobs.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Current cipher bundle per file
        CREATE TABLE bundles (
            file_id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            version INTEGER NOT NULL,          -- starts at 1, +1 per rotation
            content_iv BLOB NOT NULL,          -- 12 bytes
            name_iv BLOB NOT NULL,             -- 12 bytes
            encrypted_name BLOB NOT NULL,
            scheme_version INTEGER NOT NULL,
            blob_ref BLOB NOT NULL,            -- 32 bytes, Blake3 of content ciphertext
            updated_at INTEGER NOT NULL
        );

        -- One envelope per (file, recipient)
        CREATE TABLE envelopes (
            file_id TEXT NOT NULL,
            recipient_id TEXT NOT NULL,
            wrapped_key BLOB NOT NULL,
            wrap_iv BLOB NOT NULL,
            wrap_alg_version INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            PRIMARY KEY (file_id, recipient_id)
        );

        -- Content-addressed ciphertext blobs
        CREATE TABLE blobs (
            blob_ref BLOB PRIMARY KEY,
            data BLOB NOT NULL,
            size INTEGER NOT NULL,
            stored_at INTEGER NOT NULL
        );

        CREATE INDEX idx_envelopes_recipient ON envelopes(recipient_id);
        "#,
    )?;

    Ok(())
}

/// Current time in milliseconds since the Unix epoch.
pub(crate) fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
