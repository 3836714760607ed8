// Sync engine
// Drives each batch through pending -> uploading -> synced | error, talking
// to the blob store (photo), the document store (attendance rows), and the
// local queue (status). One bad batch never aborts the rest of a pass.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use super::hours;
use super::retry::RetryScheduler;
use super::SyncRequest;
use crate::error::{RemoteError, SyncError};
use crate::photo::{cleanup_local_photo, PhotoUploader};
use crate::remote::{AttendanceDoc, AttendanceStatus, AttendanceUpdate, BlobStore, DocumentStore};
use crate::store::{PendingClockRecord, RecordType, StoreManager, SyncBatch, SyncStatus};

/// Automatic retries stop after this many attempts; manual retry still works.
pub const MAX_ATTEMPTS: i32 = 5;

/// Backoff delays indexed by attempt number, capped at the last entry.
const BACKOFF_SECS: [u64; 5] = [5, 15, 60, 300, 900];

pub fn backoff_delay(attempt: i32) -> Duration {
    let index = (attempt.max(1) as usize - 1).min(BACKOFF_SECS.len() - 1);
    Duration::from_secs(BACKOFF_SECS[index])
}

pub struct SyncEngine {
    store: Arc<StoreManager>,
    docs: Arc<dyn DocumentStore>,
    photos: PhotoUploader,
    retry: RetryScheduler,
    /// Collapses concurrent sync passes into one.
    pass_lock: tokio::sync::Mutex<()>,
    syncing: AtomicBool,
}

/// Clears the syncing flag when a pass ends, whichever way it ends.
struct SyncingGuard<'a>(&'a AtomicBool);

impl Drop for SyncingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl SyncEngine {
    pub fn new(
        store: Arc<StoreManager>,
        docs: Arc<dyn DocumentStore>,
        blobs: Arc<dyn BlobStore>,
        retry_tx: mpsc::Sender<SyncRequest>,
    ) -> Self {
        Self {
            store,
            docs,
            photos: PhotoUploader::new(blobs),
            retry: RetryScheduler::new(retry_tx),
            pass_lock: tokio::sync::Mutex::new(()),
            syncing: AtomicBool::new(false),
        }
    }

    /// Whether a sync pass is currently running.
    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::SeqCst)
    }

    /// Sync every pending/errored batch, sequentially, newest first.
    /// A pass already in progress absorbs this call.
    pub async fn sync_all(&self) -> Result<(), SyncError> {
        let Ok(_pass) = self.pass_lock.try_lock() else {
            log::debug!("Sync pass already running, skipping");
            return Ok(());
        };
        self.syncing.store(true, Ordering::SeqCst);
        let _flag = SyncingGuard(&self.syncing);

        let batches = self.store.get_pending_batches()?;
        log::info!("Sync pass over {} batch(es)", batches.len());

        for batch in batches {
            if batch.sync_attempts >= MAX_ATTEMPTS {
                log::debug!(
                    "Batch {} exhausted {} attempts, waiting for manual retry",
                    batch.id,
                    batch.sync_attempts
                );
                continue;
            }
            self.sync_batch(&batch).await;
        }

        Ok(())
    }

    /// Manual retry path: re-reads the batch and runs it regardless of how
    /// many attempts it has burned, but never re-syncs a synced batch.
    pub async fn sync_single_batch(&self, batch_id: &str) -> Result<(), SyncError> {
        let _pass = self.pass_lock.lock().await;
        self.syncing.store(true, Ordering::SeqCst);
        let _flag = SyncingGuard(&self.syncing);

        let Some(batch) = self.store.get_batch(batch_id)? else {
            log::warn!("Batch {} no longer exists, dropping retry", batch_id);
            return Ok(());
        };
        if batch.sync_status == SyncStatus::Synced {
            log::debug!("Batch {} already synced, nothing to do", batch_id);
            return Ok(());
        }

        self.sync_batch(&batch).await;
        Ok(())
    }

    /// Drop any queued retry for a batch (used when the user deletes it).
    pub fn cancel_retry(&self, batch_id: &str) {
        self.retry.cancel(batch_id);
    }

    /// Run one batch, converting any failure into persisted error state and
    /// a scheduled backoff retry.
    async fn sync_batch(&self, batch: &SyncBatch) {
        match self.run_batch(batch).await {
            Ok(()) => {
                log::info!("Batch {} synced", batch.id);
            }
            Err(err) => {
                log::error!("Batch {} failed to sync: {}", batch.id, err);
                if let Err(store_err) =
                    self.store
                        .update_sync_status(&batch.id, SyncStatus::Error, Some(&err.to_string()))
                {
                    log::error!("Failed to record sync error for {}: {}", batch.id, store_err);
                }

                // The uploading transition bumped the persisted counter
                let attempts = batch.sync_attempts + 1;
                if err.retryable() && attempts < MAX_ATTEMPTS {
                    self.retry.schedule(batch.id.clone(), backoff_delay(attempts));
                }
            }
        }
    }

    async fn run_batch(&self, batch: &SyncBatch) -> Result<(), SyncError> {
        self.store
            .update_sync_status(&batch.id, SyncStatus::Uploading, None)?;

        // Photo first: once the URL is persisted, retries skip the upload
        let mut photo_url = batch.photo_url.clone();
        if photo_url.is_none() {
            if let Some(local_path) = &batch.photo_local_path {
                let url = self
                    .photos
                    .upload_photo(local_path, &batch.tenant_id, &batch.id, &batch.date)
                    .await
                    .map_err(SyncError::Upload)?;
                self.store.update_photo_url(&batch.id, &url)?;
                photo_url = Some(url);
            }
        }

        let records = self.store.get_batch_records(&batch.id)?;

        match batch.record_type {
            RecordType::ClockIn => {
                self.push_clock_ins(batch, &records, photo_url.as_deref())
                    .await?
            }
            RecordType::ClockOut => {
                self.close_clock_outs(batch, &records, photo_url.as_deref())
                    .await?
            }
        }

        self.store
            .update_sync_status(&batch.id, SyncStatus::Synced, None)?;
        self.retry.cancel(&batch.id);

        if let Some(local_path) = &batch.photo_local_path {
            cleanup_local_photo(local_path).await;
        }

        Ok(())
    }

    /// One atomic multi-document write: all N workers' rows appear or none.
    async fn push_clock_ins(
        &self,
        batch: &SyncBatch,
        records: &[PendingClockRecord],
        photo_url: Option<&str>,
    ) -> Result<(), SyncError> {
        let docs: Vec<AttendanceDoc> = records
            .iter()
            .map(|record| {
                let clock_in = record.clock_in.clone().unwrap_or_default();
                let late = hours::late_minutes(&clock_in, hours::EXPECTED_START);
                AttendanceDoc {
                    tenant_id: record.tenant_id.clone(),
                    employee_id: record.employee_id.clone(),
                    employee_name: record.employee_name.clone(),
                    department: record.department.clone(),
                    date: record.date.clone(),
                    clock_in,
                    clock_out: String::new(),
                    regular_hours: 0.0,
                    overtime_hours: 0.0,
                    late_minutes: late,
                    status: AttendanceStatus::Present,
                    source: "supervisor".to_string(),
                    batch_id: batch.id.clone(),
                    supervisor_id: record.supervisor_id.clone(),
                    supervisor_name: record.supervisor_name.clone(),
                    photo_url: photo_url.map(str::to_string),
                    geolocation: record.geolocation,
                    site_id: record.site.as_ref().map(|s| s.id.clone()),
                    site_name: record.site.as_ref().map(|s| s.name.clone()),
                    created_at: chrono::Utc::now().to_rfc3339(),
                }
            })
            .collect();

        self.docs
            .create_attendance_batch(&docs)
            .await
            .map_err(remote_write)?;

        Ok(())
    }

    /// Locate and close each worker's open clock-in row, one update per
    /// worker. Workers without an open row are skipped, never fabricated,
    /// which keeps a partially-applied batch safe to re-run.
    async fn close_clock_outs(
        &self,
        batch: &SyncBatch,
        records: &[PendingClockRecord],
        photo_url: Option<&str>,
    ) -> Result<(), SyncError> {
        for record in records {
            let Some(clock_out) = record.clock_out.as_deref() else {
                continue;
            };

            let found = self
                .docs
                .find_open_clock_in(&record.tenant_id, &record.employee_id, &record.date, &batch.id)
                .await
                .map_err(remote_write)?;

            let Some(open) = found else {
                log::warn!(
                    "No open clock-in for employee {} on {}, skipping",
                    record.employee_id,
                    record.date
                );
                continue;
            };

            let total = hours::hours_between(&open.clock_in, clock_out);
            let (regular, overtime) = hours::hours_breakdown(total);
            let late = hours::late_minutes(&open.clock_in, hours::EXPECTED_START);
            let status = hours::derive_status(&open.clock_in, clock_out, late, total);

            let update = AttendanceUpdate {
                clock_out: clock_out.to_string(),
                total_hours: hours::round2(total),
                regular_hours: hours::round2(regular),
                overtime_hours: hours::round2(overtime),
                late_minutes: late,
                status,
                clock_out_photo_url: photo_url.map(str::to_string),
                clock_out_geolocation: record.geolocation,
                updated_at: chrono::Utc::now().to_rfc3339(),
            };

            self.docs
                .update_attendance(&open.doc_id, &update)
                .await
                .map_err(remote_write)?;
        }

        Ok(())
    }
}

fn remote_write(err: RemoteError) -> SyncError {
    SyncError::RemoteWrite(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::doubles::{MemoryBlobStore, MemoryDocumentStore};
    use tempfile::tempdir;

    struct Fixture {
        _dir: tempfile::TempDir,
        store: Arc<StoreManager>,
        docs: Arc<MemoryDocumentStore>,
        blobs: Arc<MemoryBlobStore>,
        engine: SyncEngine,
        rx: mpsc::Receiver<SyncRequest>,
    }

    fn fixture_with(docs: MemoryDocumentStore, blobs: MemoryBlobStore) -> Fixture {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = tempdir().unwrap();
        let store = Arc::new(StoreManager::new(dir.path().join("test.db")).unwrap());
        let docs = Arc::new(docs);
        let blobs = Arc::new(blobs);
        let (tx, rx) = mpsc::channel(16);
        let engine = SyncEngine::new(store.clone(), docs.clone(), blobs.clone(), tx);
        Fixture {
            _dir: dir,
            store,
            docs,
            blobs,
            engine,
            rx,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(MemoryDocumentStore::default(), MemoryBlobStore::default())
    }

    fn insert_clock_in_batch(
        store: &StoreManager,
        batch_id: &str,
        workers: &[(&str, &str)],
        clock_in: &str,
    ) -> SyncBatch {
        let mut batch = SyncBatch::new(
            "t1".to_string(),
            "sup-1".to_string(),
            "Marko".to_string(),
            RecordType::ClockIn,
            "2026-08-20".to_string(),
        );
        batch.id = batch_id.to_string();
        batch.worker_count = workers.len() as i32;
        batch.site = Some(crate::store::SiteRef {
            id: "site-a".to_string(),
            name: "Site-A".to_string(),
        });

        let records: Vec<PendingClockRecord> = workers
            .iter()
            .map(|(id, name)| {
                PendingClockRecord::for_batch(
                    &batch,
                    id.to_string(),
                    name.to_string(),
                    None,
                    clock_in.to_string(),
                )
            })
            .collect();

        store.insert_batch_with_records(&batch, &records).unwrap();
        batch
    }

    fn insert_clock_out_batch(
        store: &StoreManager,
        batch_id: &str,
        workers: &[(&str, &str)],
        clock_out: &str,
    ) -> SyncBatch {
        let mut batch = SyncBatch::new(
            "t1".to_string(),
            "sup-1".to_string(),
            "Marko".to_string(),
            RecordType::ClockOut,
            "2026-08-20".to_string(),
        );
        batch.id = batch_id.to_string();
        batch.worker_count = workers.len() as i32;

        let records: Vec<PendingClockRecord> = workers
            .iter()
            .map(|(id, name)| {
                PendingClockRecord::for_batch(
                    &batch,
                    id.to_string(),
                    name.to_string(),
                    None,
                    clock_out.to_string(),
                )
            })
            .collect();

        store.insert_batch_with_records(&batch, &records).unwrap();
        batch
    }

    #[tokio::test]
    async fn test_clock_in_batch_creates_attendance_rows() {
        let f = fixture();
        insert_clock_in_batch(
            &f.store,
            "b1",
            &[("e1", "Ana"), ("e2", "Ivan"), ("e3", "Petra")],
            "08:15",
        );

        f.engine.sync_all().await.unwrap();

        let docs = f.docs.docs.lock().unwrap();
        assert_eq!(docs.len(), 3);
        for doc in docs.values() {
            assert_eq!(doc.late_minutes, 15);
            assert_eq!(doc.status, AttendanceStatus::Present);
            assert_eq!(doc.source, "supervisor");
            assert_eq!(doc.batch_id, "b1");
            assert_eq!(doc.clock_out, "");
            assert_eq!(doc.site_name.as_deref(), Some("Site-A"));
        }
        drop(docs);

        let batch = f.store.get_batch("b1").unwrap().unwrap();
        assert_eq!(batch.sync_status, SyncStatus::Synced);
        assert!(batch.synced_at.is_some());
        assert_eq!(batch.sync_attempts, 1);
    }

    #[tokio::test]
    async fn test_clock_out_closes_matching_row() {
        let f = fixture();
        insert_clock_in_batch(&f.store, "b-in", &[("e1", "Ana")], "08:15");
        f.engine.sync_all().await.unwrap();

        insert_clock_out_batch(&f.store, "b-out", &[("e1", "Ana")], "17:00");
        f.engine.sync_all().await.unwrap();

        let updates = f.docs.updates.lock().unwrap();
        assert_eq!(updates.len(), 1);
        let update = updates.values().next().unwrap();
        assert_eq!(update.clock_out, "17:00");
        assert_eq!(update.total_hours, 8.75);
        assert_eq!(update.regular_hours, 8.0);
        assert_eq!(update.overtime_hours, 0.75);
        // 15 minutes late is within tolerance
        assert_eq!(update.late_minutes, 15);
        assert_eq!(update.status, AttendanceStatus::Present);
        drop(updates);

        let batch = f.store.get_batch("b-out").unwrap().unwrap();
        assert_eq!(batch.sync_status, SyncStatus::Synced);
    }

    #[tokio::test]
    async fn test_clock_out_skips_worker_without_open_row() {
        let f = fixture();
        insert_clock_in_batch(&f.store, "b-in", &[("e1", "Ana")], "08:00");
        f.engine.sync_all().await.unwrap();

        // e2 never clocked in; the batch still syncs
        insert_clock_out_batch(&f.store, "b-out", &[("e1", "Ana"), ("e2", "Ivan")], "16:00");
        f.engine.sync_all().await.unwrap();

        assert_eq!(f.docs.updates.lock().unwrap().len(), 1);
        let batch = f.store.get_batch("b-out").unwrap().unwrap();
        assert_eq!(batch.sync_status, SyncStatus::Synced);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_marks_error_and_retry_recovers() {
        let mut f = fixture_with(MemoryDocumentStore::failing(1), MemoryBlobStore::default());
        insert_clock_in_batch(&f.store, "b1", &[("e1", "Ana")], "08:00");

        f.engine.sync_all().await.unwrap();

        let batch = f.store.get_batch("b1").unwrap().unwrap();
        assert_eq!(batch.sync_status, SyncStatus::Error);
        assert!(batch.sync_error.as_deref().unwrap_or("").contains("outage"));
        assert_eq!(batch.sync_attempts, 1);

        // Backoff elapses; the scheduled retry lands on the worker channel
        tokio::time::advance(Duration::from_secs(6)).await;
        let request = f.rx.recv().await.unwrap();
        assert_eq!(request, SyncRequest::Batch("b1".to_string()));

        // Connectivity is back (the double only failed once)
        f.engine.sync_single_batch("b1").await.unwrap();
        let batch = f.store.get_batch("b1").unwrap().unwrap();
        assert_eq!(batch.sync_status, SyncStatus::Synced);
        assert_eq!(batch.sync_attempts, 2);
        assert_eq!(f.docs.docs.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_photo_uploaded_persisted_and_cleaned_up() {
        let f = fixture();
        let photo_dir = tempdir().unwrap();
        let photo_path = photo_dir.path().join("capture.jpg");
        std::fs::write(&photo_path, b"jpeg").unwrap();

        let mut batch = SyncBatch::new(
            "t1".to_string(),
            "sup-1".to_string(),
            "Marko".to_string(),
            RecordType::ClockIn,
            "2026-08-20".to_string(),
        );
        batch.id = "b1".to_string();
        batch.worker_count = 1;
        batch.photo_local_path = Some(photo_path.to_string_lossy().into_owned());
        let records = vec![PendingClockRecord::for_batch(
            &batch,
            "e1".to_string(),
            "Ana".to_string(),
            None,
            "08:00".to_string(),
        )];
        f.store.insert_batch_with_records(&batch, &records).unwrap();

        f.engine.sync_all().await.unwrap();

        assert_eq!(f.blobs.uploads.lock().unwrap().len(), 1);
        let synced = f.store.get_batch("b1").unwrap().unwrap();
        assert!(synced
            .photo_url
            .as_deref()
            .unwrap()
            .starts_with("https://blobs.test/attendance/t1/2026-08-20/"));
        let rows = f.store.get_batch_records("b1").unwrap();
        assert_eq!(rows[0].photo_url, synced.photo_url);
        assert!(!photo_path.exists());

        let docs = f.docs.docs.lock().unwrap();
        assert_eq!(docs.values().next().unwrap().photo_url, synced.photo_url);
    }

    #[tokio::test(start_paused = true)]
    async fn test_photo_upload_failure_writes_no_rows() {
        let f = fixture_with(MemoryDocumentStore::default(), MemoryBlobStore::failing(1));
        let photo_dir = tempdir().unwrap();
        let photo_path = photo_dir.path().join("capture.jpg");
        std::fs::write(&photo_path, b"jpeg").unwrap();

        let mut batch = SyncBatch::new(
            "t1".to_string(),
            "sup-1".to_string(),
            "Marko".to_string(),
            RecordType::ClockIn,
            "2026-08-20".to_string(),
        );
        batch.id = "b1".to_string();
        batch.photo_local_path = Some(photo_path.to_string_lossy().into_owned());
        let records = vec![PendingClockRecord::for_batch(
            &batch,
            "e1".to_string(),
            "Ana".to_string(),
            None,
            "08:00".to_string(),
        )];
        f.store.insert_batch_with_records(&batch, &records).unwrap();

        f.engine.sync_all().await.unwrap();

        assert!(f.docs.docs.lock().unwrap().is_empty());
        let errored = f.store.get_batch("b1").unwrap().unwrap();
        assert_eq!(errored.sync_status, SyncStatus::Error);
        // Local photo kept for the retry
        assert!(photo_path.exists());
    }

    #[tokio::test]
    async fn test_exhausted_batch_skipped_by_auto_but_manual_retries() {
        let f = fixture();
        insert_clock_in_batch(&f.store, "b1", &[("e1", "Ana")], "08:00");
        // Burn through the attempt budget
        for _ in 0..MAX_ATTEMPTS {
            f.store
                .update_sync_status("b1", SyncStatus::Uploading, None)
                .unwrap();
            f.store
                .update_sync_status("b1", SyncStatus::Error, Some("down"))
                .unwrap();
        }

        f.engine.sync_all().await.unwrap();
        assert!(f.docs.docs.lock().unwrap().is_empty());

        f.engine.sync_single_batch("b1").await.unwrap();
        assert_eq!(f.docs.docs.lock().unwrap().len(), 1);
        let batch = f.store.get_batch("b1").unwrap().unwrap();
        assert_eq!(batch.sync_status, SyncStatus::Synced);
    }

    #[tokio::test]
    async fn test_synced_batch_is_never_rerun() {
        let f = fixture();
        insert_clock_in_batch(&f.store, "b1", &[("e1", "Ana"), ("e2", "Ivan")], "08:00");

        f.engine.sync_all().await.unwrap();
        assert_eq!(f.docs.docs.lock().unwrap().len(), 2);

        // A stale retry or double-tap must not duplicate remote rows
        f.engine.sync_single_batch("b1").await.unwrap();
        f.engine.sync_all().await.unwrap();
        assert_eq!(f.docs.docs.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_backoff_delay_table() {
        assert_eq!(backoff_delay(1), Duration::from_secs(5));
        assert_eq!(backoff_delay(2), Duration::from_secs(15));
        assert_eq!(backoff_delay(3), Duration::from_secs(60));
        assert_eq!(backoff_delay(4), Duration::from_secs(300));
        assert_eq!(backoff_delay(5), Duration::from_secs(900));
        // Capped beyond the table
        assert_eq!(backoff_delay(9), Duration::from_secs(900));
    }
}
