// Sync state facade
// Read-side aggregation for the UI: counts, the pending queue, and the
// engine's busy flag. Every mutation re-reads the whole snapshot; local
// store reads are cheap enough that incremental bookkeeping isn't worth it.

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::engine::SyncEngine;
use crate::error::SyncError;
use crate::store::{StoreManager, SyncBatch};

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncSnapshot {
    pub pending_count: i64,
    pub error_count: i64,
    pub pending_batches: Vec<SyncBatch>,
    pub syncing: bool,
    pub last_sync_at: Option<String>,
    /// Set when the read side itself failed; the UI renders an empty state
    /// with this message instead of crashing.
    pub load_error: Option<String>,
}

pub struct SyncStateFacade {
    store: Arc<StoreManager>,
    engine: Arc<SyncEngine>,
    snapshot: RwLock<SyncSnapshot>,
}

impl SyncStateFacade {
    pub fn new(store: Arc<StoreManager>, engine: Arc<SyncEngine>) -> Self {
        Self {
            store,
            engine,
            snapshot: RwLock::new(SyncSnapshot::default()),
        }
    }

    /// Current snapshot without touching the store.
    pub async fn snapshot(&self) -> SyncSnapshot {
        self.snapshot.read().await.clone()
    }

    /// Re-read counts and the pending list. Store failures degrade to an
    /// empty snapshot with `load_error` set, never an Err.
    pub async fn refresh(&self) -> SyncSnapshot {
        let mut snapshot = self.snapshot.write().await;

        let loaded = (|| -> anyhow::Result<(i64, i64, Vec<SyncBatch>)> {
            Ok((
                self.store.get_pending_count()?,
                self.store.get_error_count()?,
                self.store.get_pending_batches()?,
            ))
        })();

        match loaded {
            Ok((pending_count, error_count, pending_batches)) => {
                snapshot.pending_count = pending_count;
                snapshot.error_count = error_count;
                snapshot.pending_batches = pending_batches;
                snapshot.load_error = None;
            }
            Err(e) => {
                log::error!("Failed to refresh sync state: {}", e);
                snapshot.pending_count = 0;
                snapshot.error_count = 0;
                snapshot.pending_batches = Vec::new();
                snapshot.load_error = Some(e.to_string());
            }
        }
        snapshot.syncing = self.engine.is_syncing();

        snapshot.clone()
    }

    /// Run a full sync pass now, then refresh.
    pub async fn trigger_sync_all(&self) -> Result<SyncSnapshot, SyncError> {
        self.engine.sync_all().await?;
        {
            let mut snapshot = self.snapshot.write().await;
            snapshot.last_sync_at = Some(chrono::Utc::now().to_rfc3339());
        }
        Ok(self.refresh().await)
    }

    /// Manual per-batch retry from the error queue.
    pub async fn retry_batch(&self, batch_id: &str) -> Result<SyncSnapshot, SyncError> {
        self.engine.sync_single_batch(batch_id).await?;
        Ok(self.refresh().await)
    }

    /// User-initiated purge of a batch and its records.
    pub async fn remove_batch(&self, batch_id: &str) -> Result<SyncSnapshot, SyncError> {
        self.engine.cancel_retry(batch_id);
        self.store.delete_batch(batch_id)?;
        Ok(self.refresh().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::doubles::{MemoryBlobStore, MemoryDocumentStore};
    use crate::store::{PendingClockRecord, RecordType, SyncStatus};
    use tempfile::tempdir;
    use tokio::sync::mpsc;

    fn fixture() -> (tempfile::TempDir, Arc<StoreManager>, SyncStateFacade) {
        let dir = tempdir().unwrap();
        let store = Arc::new(StoreManager::new(dir.path().join("test.db")).unwrap());
        let (tx, _rx) = mpsc::channel(16);
        let engine = Arc::new(SyncEngine::new(
            store.clone(),
            Arc::new(MemoryDocumentStore::default()),
            Arc::new(MemoryBlobStore::default()),
            tx,
        ));
        let facade = SyncStateFacade::new(store.clone(), engine);
        (dir, store, facade)
    }

    fn insert_batch(store: &StoreManager, batch_id: &str, status: SyncStatus) {
        let mut batch = SyncBatch::new(
            "t1".to_string(),
            "sup-1".to_string(),
            "Marko".to_string(),
            RecordType::ClockIn,
            "2026-08-20".to_string(),
        );
        batch.id = batch_id.to_string();
        batch.worker_count = 1;
        batch.sync_status = status;
        let records = vec![PendingClockRecord::for_batch(
            &batch,
            "e1".to_string(),
            "Ana".to_string(),
            None,
            "08:00".to_string(),
        )];
        store.insert_batch_with_records(&batch, &records).unwrap();
    }

    #[tokio::test]
    async fn test_refresh_aggregates_counts() {
        let (_dir, store, facade) = fixture();
        insert_batch(&store, "b1", SyncStatus::Pending);
        insert_batch(&store, "b2", SyncStatus::Error);
        insert_batch(&store, "b3", SyncStatus::Synced);

        let snapshot = facade.refresh().await;
        assert_eq!(snapshot.pending_count, 1);
        assert_eq!(snapshot.error_count, 1);
        assert_eq!(snapshot.pending_batches.len(), 2);
        assert!(!snapshot.syncing);
        assert!(snapshot.load_error.is_none());
    }

    #[tokio::test]
    async fn test_trigger_sync_all_sets_last_sync_at() {
        let (_dir, store, facade) = fixture();
        insert_batch(&store, "b1", SyncStatus::Pending);

        let snapshot = facade.trigger_sync_all().await.unwrap();
        assert!(snapshot.last_sync_at.is_some());
        assert_eq!(snapshot.pending_count, 0);
        assert!(snapshot.pending_batches.is_empty());
    }

    #[tokio::test]
    async fn test_retry_batch_clears_error() {
        let (_dir, store, facade) = fixture();
        insert_batch(&store, "b1", SyncStatus::Error);

        let snapshot = facade.retry_batch("b1").await.unwrap();
        assert_eq!(snapshot.error_count, 0);
        assert_eq!(
            store.get_batch("b1").unwrap().unwrap().sync_status,
            SyncStatus::Synced
        );
    }

    #[tokio::test]
    async fn test_remove_batch_refreshes() {
        let (_dir, store, facade) = fixture();
        insert_batch(&store, "b1", SyncStatus::Error);

        let snapshot = facade.remove_batch("b1").await.unwrap();
        assert_eq!(snapshot.error_count, 0);
        assert!(store.get_batch("b1").unwrap().is_none());
    }
}
