// Retry scheduler
// Delayed-task queue keyed by batch id. Scheduling a batch that already has
// a retry queued resets its delay instead of stacking a duplicate task; a
// fired retry goes back through the worker channel, which re-reads persisted
// state before acting.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::SyncRequest;

pub struct RetryScheduler {
    tx: mpsc::Sender<SyncRequest>,
    tasks: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl RetryScheduler {
    pub fn new(tx: mpsc::Sender<SyncRequest>) -> Self {
        Self {
            tx,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Queue a retry for a batch after `delay`. Replaces any retry already
    /// queued for the same batch.
    pub fn schedule(&self, batch_id: String, delay: Duration) {
        let tx = self.tx.clone();
        let id = batch_id.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if tx.send(SyncRequest::Batch(id)).await.is_err() {
                log::warn!("Retry fired but the sync worker is gone");
            }
        });

        log::info!("Scheduled retry for batch {} in {:?}", batch_id, delay);

        let mut tasks = lock_tasks(&self.tasks);
        if let Some(previous) = tasks.insert(batch_id, handle) {
            previous.abort();
        }
    }

    /// Drop any queued retry for a batch (it synced or was deleted).
    pub fn cancel(&self, batch_id: &str) {
        let mut tasks = lock_tasks(&self.tasks);
        if let Some(handle) = tasks.remove(batch_id) {
            handle.abort();
        }
    }

    /// Drop all queued retries.
    pub fn clear(&self) {
        let mut tasks = lock_tasks(&self.tasks);
        for (_, handle) in tasks.drain() {
            handle.abort();
        }
    }
}

impl Drop for RetryScheduler {
    fn drop(&mut self) {
        self.clear();
    }
}

fn lock_tasks(
    tasks: &Mutex<HashMap<String, JoinHandle<()>>>,
) -> std::sync::MutexGuard<'_, HashMap<String, JoinHandle<()>>> {
    match tasks.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
