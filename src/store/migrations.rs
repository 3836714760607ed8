// Store migrations
// Creates and updates the local queue schema

use anyhow::{Context, Result};
use rusqlite::Connection;

/// Current schema version
const SCHEMA_VERSION: i32 = 2;

/// Run all necessary migrations to bring the database up to date
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;

    if current_version < 1 {
        migrate_v1(conn)?;
    }

    if current_version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

/// Get the current schema version from the database
fn get_schema_version(conn: &Connection) -> Result<i32> {
    let table_exists: bool = conn
        .query_row(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='schema_version'",
            [],
            |row| row.get(0),
        )
        .unwrap_or(false);

    if !table_exists {
        return Ok(0);
    }

    let version: i32 = conn
        .query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))
        .unwrap_or(0);

    Ok(version)
}

/// Initial schema creation (version 1)
fn migrate_v1(conn: &Connection) -> Result<()> {
    log::info!("Running store migration v1");

    conn.execute_batch(
        r#"
        -- Schema version tracking
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- Batches: one supervisor-initiated bulk clock action
        CREATE TABLE IF NOT EXISTS sync_batches (
            id TEXT PRIMARY KEY NOT NULL,
            tenant_id TEXT NOT NULL,
            supervisor_id TEXT NOT NULL,
            supervisor_name TEXT NOT NULL,
            record_type TEXT NOT NULL,
            date TEXT NOT NULL,
            site_id TEXT,
            site_name TEXT,
            worker_count INTEGER NOT NULL DEFAULT 0,
            photo_local_path TEXT,
            photo_url TEXT,
            latitude REAL,
            longitude REAL,
            accuracy REAL,
            sync_status TEXT NOT NULL DEFAULT 'pending',
            sync_error TEXT,
            sync_attempts INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            synced_at TEXT
        );

        -- Per-worker clock events, owned by their batch
        CREATE TABLE IF NOT EXISTS pending_clock_records (
            id TEXT PRIMARY KEY NOT NULL,
            batch_id TEXT NOT NULL REFERENCES sync_batches(id),
            tenant_id TEXT NOT NULL,
            employee_id TEXT NOT NULL,
            employee_name TEXT NOT NULL,
            department TEXT,
            date TEXT NOT NULL,
            clock_in TEXT,
            clock_out TEXT,
            record_type TEXT NOT NULL,
            supervisor_id TEXT NOT NULL,
            supervisor_name TEXT NOT NULL,
            photo_local_path TEXT,
            photo_url TEXT,
            latitude REAL,
            longitude REAL,
            accuracy REAL,
            site_id TEXT,
            site_name TEXT,
            sync_status TEXT NOT NULL DEFAULT 'pending',
            sync_error TEXT,
            sync_attempts INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            synced_at TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_records_batch_id
            ON pending_clock_records(batch_id);
        CREATE INDEX IF NOT EXISTS idx_records_sync_status
            ON pending_clock_records(sync_status);
        CREATE INDEX IF NOT EXISTS idx_batches_sync_status
            ON sync_batches(sync_status);

        INSERT INTO schema_version (version) VALUES (1);
        "#,
    )
    .context("Failed to run migration v1")?;

    Ok(())
}

/// Covering index for the open-shift anti-join (version 2)
fn migrate_v2(conn: &Connection) -> Result<()> {
    log::info!("Running store migration v2");

    conn.execute_batch(
        r#"
        CREATE INDEX IF NOT EXISTS idx_records_tenant_date
            ON pending_clock_records(tenant_id, date);

        INSERT INTO schema_version (version) VALUES (2);
        "#,
    )
    .context("Failed to run migration v2")?;

    Ok(())
}
