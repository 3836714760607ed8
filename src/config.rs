// Remote endpoint configuration, injected by the host app

use serde::{Deserialize, Serialize};

/// Connection details for the remote document and blob stores.
///
/// The host app resolves these (tenant provisioning, auth refresh) and hands
/// them to the REST adapters; this crate never reads the environment itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Cloud project backing the document store.
    pub project_id: String,
    /// Bucket name for photo uploads.
    pub storage_bucket: String,
    /// Bearer token for authenticated requests, if the session has one.
    pub auth_token: Option<String>,
}

impl RemoteConfig {
    pub fn new(project_id: impl Into<String>, storage_bucket: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            storage_bucket: storage_bucket.into(),
            auth_token: None,
        }
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }
}
