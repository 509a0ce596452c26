//! Database schema migrations for SQLite.
//!
//! A simple versioned migration system. Each migration is a SQL string
//! that transforms the schema from version N to N+1. Table names carry
//! the store's configured prefix, so two stores with distinct prefixes
//! can share one database file.

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema.
///
/// Idempotent: safe to call on every open.
pub fn migrate(conn: &mut Connection, prefix: &str) -> Result<()> {
    conn.execute(
        &format!(
            "CREATE TABLE IF NOT EXISTS {prefix}schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at INTEGER NOT NULL
            )"
        ),
        [],
    )
    .map_err(StoreError::db("migrate"))?;

    let current: u32 = conn
        .query_row(
            &format!("SELECT COALESCE(MAX(version), 0) FROM {prefix}schema_migrations"),
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current < CURRENT_VERSION {
        let tx = conn.transaction().map_err(StoreError::db("migrate"))?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, prefix, version)?;

            tx.execute(
                &format!(
                    "INSERT INTO {prefix}schema_migrations (version, applied_at) VALUES (?1, ?2)"
                ),
                rusqlite::params![version, now_millis()],
            )
            .map_err(StoreError::db("migrate"))?;
        }

        tx.commit().map_err(StoreError::db("migrate"))?;
    }

    Ok(())
}

fn apply_migration(conn: &Connection, prefix: &str, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn, prefix),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: Initial schema.
fn apply_v1(conn: &Connection, prefix: &str) -> Result<()> {
    conn.execute_batch(&format!(
        r#"
        -- Global checkpoint, one row per user. Cursor columns are nullable:
        -- a field that was never observed is representable as NULL and
        -- reads back as zero.
        CREATE TABLE {prefix}checkpoints (
            user_id INTEGER PRIMARY KEY,
            pts INTEGER,
            qts INTEGER,
            date INTEGER,
            seq INTEGER
        );

        -- Per-channel checkpoints, independent of the global row.
        CREATE TABLE {prefix}channel_checkpoints (
            user_id INTEGER NOT NULL,
            channel_id INTEGER NOT NULL,
            pts INTEGER NOT NULL,
            PRIMARY KEY (user_id, channel_id)
        );

        -- Access handles. `updated` advances only when the handle value
        -- changes; `refreshed` records the last write for TTL expiry.
        CREATE TABLE {prefix}handles (
            user_id INTEGER NOT NULL,
            channel_id INTEGER NOT NULL,
            hash INTEGER NOT NULL,
            updated INTEGER NOT NULL,
            refreshed INTEGER NOT NULL,
            PRIMARY KEY (user_id, channel_id)
        );

        -- Session documents, one JSON document per agent.
        CREATE TABLE {prefix}sessions (
            agent_id INTEGER PRIMARY KEY,
            data TEXT,
            updated_at INTEGER NOT NULL
        );

        -- Credential pass-through.
        CREATE TABLE {prefix}credentials (
            user_id INTEGER PRIMARY KEY,
            login TEXT NOT NULL,
            secret TEXT NOT NULL
        );
        "#
    ))
    .map_err(StoreError::db("migrate"))?;

    Ok(())
}

/// Get current time in milliseconds.
pub(crate) fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time went backwards")
        .as_millis() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_creates_tables() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn, "").unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        assert!(tables.contains(&"checkpoints".to_string()));
        assert!(tables.contains(&"channel_checkpoints".to_string()));
        assert!(tables.contains(&"handles".to_string()));
        assert!(tables.contains(&"sessions".to_string()));
        assert!(tables.contains(&"credentials".to_string()));
        assert!(tables.contains(&"schema_migrations".to_string()));
    }

    #[test]
    fn test_migration_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn, "").unwrap();
        migrate(&mut conn, "").unwrap();
        migrate(&mut conn, "").unwrap();

        let version: u32 = conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn test_prefixed_schemas_coexist() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn, "").unwrap();
        migrate(&mut conn, "mirror_").unwrap();

        let count: u32 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master
                 WHERE type='table' AND name IN ('checkpoints', 'mirror_checkpoints')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 2);
    }
}
