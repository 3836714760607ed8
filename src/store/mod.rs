// Local durable store
// SQLite-backed queue of clock batches surviving restarts and offline periods

mod batches_repo;
pub mod manager;
pub mod migrations;
pub mod models;

pub use manager::StoreManager;
pub use models::{GeoPoint, PendingClockRecord, RecordType, SiteRef, SyncBatch, SyncStatus};
