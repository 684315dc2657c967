//! Database schema migrations for SQLite.
//!
//! Each migration is a SQL batch that moves the schema from version N to N+1.

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema.
///
/// Idempotent: safe to call on every open.
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

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, fleetsync_core::now_millis()],
            )?;
        }

        tx.commit()?;
    }

    Ok(())
}

fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- One row per (layer, domain) that has ever been written
        CREATE TABLE config_domains (
            layer TEXT NOT NULL,              -- 'runtime' or 'disk'
            domain TEXT NOT NULL,             -- wire name, e.g. 'mysql_users'
            checksum TEXT NOT NULL,           -- 0x-prefixed hex
            written_at INTEGER NOT NULL,      -- Unix ms
            PRIMARY KEY (layer, domain)
        );

        -- Tables making up a domain, in payload order
        CREATE TABLE config_tables (
            layer TEXT NOT NULL,
            domain TEXT NOT NULL,
            position INTEGER NOT NULL,
            name TEXT NOT NULL,
            body BLOB NOT NULL,               -- CBOR-encoded ResultSet
            PRIMARY KEY (layer, domain, position)
        );
        "#,
    )?;

    Ok(())
}
