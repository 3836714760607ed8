// Error taxonomy for the crew sync core
//
// Storage plumbing uses anyhow internally; these closed enums are what
// crosses the public boundary so the UI can tell "will retry" apart from
// "needs user action".

use thiserror::Error;

/// Failure talking to a remote collaborator (document store or blob store).
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Transport-level failure (offline, DNS, timeout).
    #[error("network error: {0}")]
    Network(String),

    /// The remote service answered but refused the request.
    #[error("remote store rejected request: {0}")]
    Rejected(String),

    /// A document came back in a shape we cannot read.
    #[error("malformed remote document: {0}")]
    InvalidDocument(String),
}

/// Failure while turning a supervisor's selection into a durable batch.
#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("no workers selected")]
    NoWorkersSelected,

    #[error("failed to persist batch: {0}")]
    Storage(#[from] anyhow::Error),
}

/// Failure while syncing a batch to the remote store.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("photo upload failed: {0}")]
    Upload(#[source] RemoteError),

    #[error("remote write failed: {0}")]
    RemoteWrite(#[source] RemoteError),

    #[error("local store failure: {0}")]
    Storage(#[from] anyhow::Error),
}

impl SyncError {
    /// Whether the automatic backoff retry path applies.
    pub fn retryable(&self) -> bool {
        matches!(self, SyncError::Upload(_) | SyncError::RemoteWrite(_))
    }
}
