// Ekipa crew sync core
//
// Offline-first clock-in/out queue for supervisors: batches persist locally
// in SQLite the moment they are submitted, and a background engine reconciles
// them against the remote attendance store with retry and backoff.

pub mod config;
pub mod error;
pub mod photo;
pub mod remote;
pub mod store;
pub mod submission;
pub mod sync;

pub use config::RemoteConfig;
pub use error::{RemoteError, SubmissionError, SyncError};
pub use store::{
    GeoPoint, PendingClockRecord, RecordType, SiteRef, StoreManager, SyncBatch, SyncStatus,
};
pub use submission::{CrewSubmission, SubmissionContext, WorkerSelection};
pub use sync::{SyncController, SyncEngine, SyncRequest, SyncSignals, SyncSnapshot, SyncStateFacade};

use std::path::PathBuf;
use std::sync::Arc;

use remote::{firestore::FirestoreClient, storage::StorageClient, BlobStore, DocumentStore};

/// Fully wired sync core, ready for the UI bridge to hold.
pub struct SyncCore {
    pub store: Arc<StoreManager>,
    pub engine: Arc<SyncEngine>,
    pub submission: Arc<CrewSubmission>,
    pub controller: Arc<SyncController>,
    pub facade: Arc<SyncStateFacade>,
}

impl SyncCore {
    /// Wire the core against the production REST adapters.
    pub fn new(db_path: PathBuf, config: RemoteConfig) -> anyhow::Result<Self> {
        let docs: Arc<dyn DocumentStore> = Arc::new(FirestoreClient::new(config.clone()));
        let blobs: Arc<dyn BlobStore> = Arc::new(StorageClient::new(config));
        Self::with_remotes(db_path, docs, blobs)
    }

    /// Wire the core against arbitrary remote implementations.
    pub fn with_remotes(
        db_path: PathBuf,
        docs: Arc<dyn DocumentStore>,
        blobs: Arc<dyn BlobStore>,
    ) -> anyhow::Result<Self> {
        let store = Arc::new(StoreManager::new(db_path)?);
        let (tx, rx) = tokio::sync::mpsc::channel(32);

        let engine = Arc::new(SyncEngine::new(store.clone(), docs, blobs, tx.clone()));
        let controller = Arc::new(SyncController::new(
            engine.clone(),
            store.clone(),
            tx.clone(),
            rx,
        ));
        let submission = Arc::new(CrewSubmission::new(store.clone(), tx));
        let facade = Arc::new(SyncStateFacade::new(store.clone(), engine.clone()));

        Ok(Self {
            store,
            engine,
            submission,
            controller,
            facade,
        })
    }
}
