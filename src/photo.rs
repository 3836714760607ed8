// Photo utility
// Moves a locally captured photo into the remote blob store and cleans up
// the local copy once the batch has fully synced.

use std::path::Path;
use std::sync::Arc;

use crate::error::RemoteError;
use crate::remote::BlobStore;

pub struct PhotoUploader {
    blobs: Arc<dyn BlobStore>,
}

impl PhotoUploader {
    pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self { blobs }
    }

    /// Upload the batch photo and return its stable remote URL.
    /// Failures are retryable; the caller keeps the local file until the
    /// whole batch syncs.
    pub async fn upload_photo(
        &self,
        local_path: &str,
        tenant_id: &str,
        batch_id: &str,
        date: &str,
    ) -> Result<String, RemoteError> {
        let object_key = format!("attendance/{}/{}/{}.jpg", tenant_id, date, batch_id);
        self.blobs.upload(Path::new(local_path), &object_key).await
    }
}

/// Best-effort deletion of the local photo after a successful sync.
/// Never fails the sync; an undeletable file just takes up space.
pub async fn cleanup_local_photo(local_path: &str) {
    if let Err(e) = tokio::fs::remove_file(local_path).await {
        log::warn!("Failed to remove local photo {}: {}", local_path, e);
    }
}
