// Batch submission service ("crew store")
// Turns a supervisor's in-progress selection into a durable local batch and
// kicks off a non-blocking sync attempt.

use std::sync::{Arc, Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::SubmissionError;
use crate::store::{
    GeoPoint, PendingClockRecord, RecordType, SiteRef, StoreManager, SyncBatch,
};
use crate::sync::SyncRequest;

/// A worker picked into the current draft.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSelection {
    pub employee_id: String,
    pub employee_name: String,
    pub department: Option<String>,
}

/// Identity of the supervisor performing the submission.
#[derive(Debug, Clone)]
pub struct SubmissionContext {
    pub tenant_id: String,
    pub supervisor_id: String,
    pub supervisor_name: String,
}

/// In-progress selection state. Site, date, and mode survive a submission
/// because supervisors usually run several batches in the same context.
struct Draft {
    workers: Vec<WorkerSelection>,
    mode: RecordType,
    date: String,
    site: Option<SiteRef>,
    photo_local_path: Option<String>,
    geolocation: Option<GeoPoint>,
    recent: Vec<SyncBatch>,
}

impl Draft {
    fn new() -> Self {
        Self {
            workers: Vec::new(),
            mode: RecordType::ClockIn,
            date: chrono::Local::now().format("%Y-%m-%d").to_string(),
            site: None,
            photo_local_path: None,
            geolocation: None,
            recent: Vec::new(),
        }
    }
}

pub struct CrewSubmission {
    store: Arc<StoreManager>,
    sync_tx: mpsc::Sender<SyncRequest>,
    draft: Mutex<Draft>,
}

const RECENT_LIMIT: i32 = 20;

impl CrewSubmission {
    pub fn new(store: Arc<StoreManager>, sync_tx: mpsc::Sender<SyncRequest>) -> Self {
        Self {
            store,
            sync_tx,
            draft: Mutex::new(Draft::new()),
        }
    }

    // Draft mutators, driven by the selection UI ---------------------------

    /// Add a worker to the selection, or remove them if already selected.
    pub fn toggle_worker(&self, worker: WorkerSelection) {
        let mut draft = self.lock_draft();
        if let Some(pos) = draft
            .workers
            .iter()
            .position(|w| w.employee_id == worker.employee_id)
        {
            draft.workers.remove(pos);
        } else {
            draft.workers.push(worker);
        }
    }

    pub fn clear_workers(&self) {
        self.lock_draft().workers.clear();
    }

    pub fn selected_count(&self) -> usize {
        self.lock_draft().workers.len()
    }

    pub fn set_mode(&self, mode: RecordType) {
        self.lock_draft().mode = mode;
    }

    pub fn mode(&self) -> RecordType {
        self.lock_draft().mode
    }

    pub fn set_date(&self, date: String) {
        self.lock_draft().date = date;
    }

    pub fn set_site(&self, site: Option<SiteRef>) {
        self.lock_draft().site = site;
    }

    pub fn set_photo(&self, local_path: Option<String>) {
        self.lock_draft().photo_local_path = local_path;
    }

    pub fn set_geolocation(&self, geolocation: Option<GeoPoint>) {
        self.lock_draft().geolocation = geolocation;
    }

    /// Cached recent batches for the activity feed.
    pub fn recent_batches(&self) -> Vec<SyncBatch> {
        self.lock_draft().recent.clone()
    }

    pub fn refresh_recent(&self) {
        match self.store.get_recent_batches(RECENT_LIMIT) {
            Ok(recent) => self.lock_draft().recent = recent,
            Err(e) => log::warn!("Failed to refresh recent batches: {}", e),
        }
    }

    // Submission ------------------------------------------------------------

    /// Persist the current draft as one batch plus one record per selected
    /// worker, all inside a single transaction, then request a background
    /// sync without waiting for it.
    ///
    /// On success the worker selection and photo reset; site, date, and mode
    /// stay for the next batch.
    pub fn submit_batch(&self, ctx: &SubmissionContext) -> Result<SyncBatch, SubmissionError> {
        let (batch, records) = {
            let draft = self.lock_draft();
            if draft.workers.is_empty() {
                return Err(SubmissionError::NoWorkersSelected);
            }

            let mut batch = SyncBatch::new(
                ctx.tenant_id.clone(),
                ctx.supervisor_id.clone(),
                ctx.supervisor_name.clone(),
                draft.mode,
                draft.date.clone(),
            );
            batch.site = draft.site.clone();
            batch.photo_local_path = draft.photo_local_path.clone();
            batch.geolocation = draft.geolocation;
            batch.worker_count = draft.workers.len() as i32;

            // Clock value comes from the device, not the server
            let clock_value = chrono::Local::now().format("%H:%M").to_string();

            let records: Vec<PendingClockRecord> = draft
                .workers
                .iter()
                .map(|worker| {
                    PendingClockRecord::for_batch(
                        &batch,
                        worker.employee_id.clone(),
                        worker.employee_name.clone(),
                        worker.department.clone(),
                        clock_value.clone(),
                    )
                })
                .collect();

            (batch, records)
        };

        self.store.insert_batch_with_records(&batch, &records)?;

        log::info!(
            "Submitted {:?} batch {} for {} worker(s)",
            batch.record_type,
            batch.id,
            batch.worker_count
        );

        // Fire and forget: the worker loop picks this up when it can
        if let Err(e) = self.sync_tx.try_send(SyncRequest::All) {
            log::warn!("Could not queue immediate sync: {}", e);
        }

        {
            let mut draft = self.lock_draft();
            draft.workers.clear();
            draft.photo_local_path = None;
        }
        self.refresh_recent();

        Ok(batch)
    }

    fn lock_draft(&self) -> MutexGuard<'_, Draft> {
        match self.draft.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
