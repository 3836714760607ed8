// Store manager
// Handles the SQLite connection and provides access to the queue tables

use anyhow::{Context, Result};
use rusqlite::{Connection, Transaction};
use std::path::PathBuf;
use std::sync::Mutex;

use super::migrations;

/// Owns the SQLite connection backing the local durable queue.
///
/// Single-writer: all access goes through the mutex, and multi-row updates
/// run inside an explicit transaction so a crash can never leave a batch and
/// its records disagreeing.
pub struct StoreManager {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl StoreManager {
    /// Open (or create) the store at the specified path and bring the schema
    /// up to date.
    pub fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create store directory")?;
        }

        let conn = Connection::open(&db_path).context("Failed to open store")?;

        conn.execute("PRAGMA foreign_keys = ON", [])
            .context("Failed to enable foreign keys")?;

        migrations::run_migrations(&conn).context("Failed to run store migrations")?;

        log::info!("Local store initialized at: {:?}", db_path);

        Ok(Self {
            conn: Mutex::new(conn),
            db_path,
        })
    }

    /// Execute a function with access to the connection
    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Failed to lock store connection: {}", e))?;
        f(&conn)
    }

    /// Execute a function inside a transaction; commits on Ok, rolls back on Err
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction) -> Result<T>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Failed to lock store connection: {}", e))?;
        let tx = conn.transaction().context("Failed to begin transaction")?;
        let result = f(&tx)?;
        tx.commit().context("Failed to commit transaction")?;
        Ok(result)
    }

    /// Get the store path
    pub fn db_path(&self) -> &PathBuf {
        &self.db_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_store_creation() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");

        let manager = StoreManager::new(db_path.clone()).unwrap();
        assert!(db_path.exists());

        manager
            .with_connection(|conn| {
                let count: i32 =
                    conn.query_row("SELECT COUNT(*) FROM sync_batches", [], |row| row.get(0))?;
                assert_eq!(count, 0);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let dir = tempdir().unwrap();
        let manager = StoreManager::new(dir.path().join("test.db")).unwrap();

        let result: Result<()> = manager.with_transaction(|tx| {
            tx.execute(
                "INSERT INTO sync_batches (id, tenant_id, supervisor_id, supervisor_name,
                 record_type, date, created_at)
                 VALUES ('b1', 't1', 's1', 'Sup', 'clock_in', '2026-01-05', 'now')",
                [],
            )?;
            anyhow::bail!("boom");
        });
        assert!(result.is_err());

        manager
            .with_connection(|conn| {
                let count: i32 =
                    conn.query_row("SELECT COUNT(*) FROM sync_batches", [], |row| row.get(0))?;
                assert_eq!(count, 0);
                Ok(())
            })
            .unwrap();
    }
}
