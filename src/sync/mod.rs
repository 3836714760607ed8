// Sync subsystem
// Engine (per-batch state machine), retry scheduler, lifecycle controller,
// and the read-side facade consumed by the UI.

pub mod controller;
pub mod engine;
pub mod facade;
pub mod hours;
pub mod retry;

pub use controller::{SyncController, SyncSignals};
pub use engine::{SyncEngine, MAX_ATTEMPTS};
pub use facade::{SyncSnapshot, SyncStateFacade};

/// Work item for the background sync worker. Submission, lifecycle triggers,
/// and fired retries all funnel through this channel, so the UI never blocks
/// on a sync pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncRequest {
    /// Run a full pass over all pending/errored batches.
    All,
    /// Re-sync one batch, re-reading its persisted state first.
    Batch(String),
}
