// Sync lifecycle controller
// Decides when sync passes run: app foreground, connectivity restored, and a
// periodic timer while work is queued. The engine itself stays lifecycle-
// unaware.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

use super::engine::SyncEngine;
use super::SyncRequest;
use crate::store::StoreManager;

/// How often the periodic trigger fires while batches are queued.
pub const SYNC_INTERVAL: Duration = Duration::from_secs(30);

/// Host-provided lifecycle signals.
pub struct SyncSignals {
    /// Fires when the app returns to the foreground.
    pub foreground: broadcast::Receiver<()>,
    /// Tracks network connectivity; sync triggers on the edge to `true`.
    pub connectivity: watch::Receiver<bool>,
}

pub struct SyncController {
    engine: Arc<SyncEngine>,
    store: Arc<StoreManager>,
    tx: mpsc::Sender<SyncRequest>,
    /// Receiver parked here until the worker loop starts; the worker then
    /// owns it for the life of the controller.
    worker_rx: Mutex<Option<mpsc::Receiver<SyncRequest>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    triggers: Mutex<Vec<JoinHandle<()>>>,
}

impl SyncController {
    pub fn new(
        engine: Arc<SyncEngine>,
        store: Arc<StoreManager>,
        tx: mpsc::Sender<SyncRequest>,
        rx: mpsc::Receiver<SyncRequest>,
    ) -> Self {
        Self {
            engine,
            store,
            tx,
            worker_rx: Mutex::new(Some(rx)),
            worker: Mutex::new(None),
            triggers: Mutex::new(Vec::new()),
        }
    }

    /// Sender for fire-and-forget sync requests (submission service, UI).
    pub fn request_sender(&self) -> mpsc::Sender<SyncRequest> {
        self.tx.clone()
    }

    /// Register the three automatic triggers and make sure the worker loop
    /// is running. Calling start twice is a no-op.
    pub fn start(&self, signals: SyncSignals) {
        {
            let mut triggers = lock(&self.triggers);
            if !triggers.is_empty() {
                log::debug!("Sync controller already started");
                return;
            }

            let SyncSignals {
                mut foreground,
                mut connectivity,
            } = signals;

            let tx = self.tx.clone();
            triggers.push(tokio::spawn(async move {
                while foreground.recv().await.is_ok() {
                    log::debug!("App foregrounded, requesting sync");
                    let _ = tx.send(SyncRequest::All).await;
                }
            }));

            let tx = self.tx.clone();
            triggers.push(tokio::spawn(async move {
                let mut was_connected = *connectivity.borrow();
                while connectivity.changed().await.is_ok() {
                    let connected = *connectivity.borrow();
                    if connected && !was_connected {
                        log::info!("Connectivity restored, requesting sync");
                        let _ = tx.send(SyncRequest::All).await;
                    }
                    was_connected = connected;
                }
            }));

            let tx = self.tx.clone();
            let store = self.store.clone();
            triggers.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(SYNC_INTERVAL);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                // The first tick completes immediately
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    match store.get_pending_count() {
                        Ok(0) => {}
                        Ok(_) => {
                            let _ = tx.send(SyncRequest::All).await;
                        }
                        Err(e) => log::warn!("Skipping periodic sync tick: {}", e),
                    }
                }
            }));
        }

        let mut worker = lock(&self.worker);
        if worker.is_none() {
            if let Some(rx) = lock(&self.worker_rx).take() {
                let engine = self.engine.clone();
                *worker = Some(tokio::spawn(worker_loop(engine, rx)));
            }
        }

        log::info!("Sync controller started");
    }

    /// Unregister all triggers. The worker loop keeps draining requests so
    /// explicit submissions still sync; only the automatic triggers stop.
    pub fn stop(&self) {
        let mut triggers = lock(&self.triggers);
        for handle in triggers.drain(..) {
            handle.abort();
        }
        log::info!("Sync controller stopped");
    }

    pub fn is_started(&self) -> bool {
        !lock(&self.triggers).is_empty()
    }
}

impl Drop for SyncController {
    fn drop(&mut self) {
        self.stop();
        if let Some(handle) = lock(&self.worker).take() {
            handle.abort();
        }
    }
}

/// Single consumer of the request channel; sequential by construction, so
/// remote write load stays bounded.
async fn worker_loop(engine: Arc<SyncEngine>, mut rx: mpsc::Receiver<SyncRequest>) {
    while let Some(request) = rx.recv().await {
        let result = match request {
            SyncRequest::All => engine.sync_all().await,
            SyncRequest::Batch(ref batch_id) => engine.sync_single_batch(batch_id).await,
        };
        if let Err(e) = result {
            log::error!("Sync request {:?} failed: {}", request, e);
        }
    }
    log::debug!("Sync worker loop ended");
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
