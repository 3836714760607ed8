// Blob store REST adapter
// Uploads batch photos and hands back the stable download URL.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::path::Path;

use super::BlobStore;
use crate::config::RemoteConfig;
use crate::error::RemoteError;

const STORAGE_HOST: &str = "https://firebasestorage.googleapis.com/v0";

pub struct StorageClient {
    http: Client,
    config: RemoteConfig,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    name: String,
    download_tokens: Option<String>,
}

impl StorageClient {
    pub fn new(config: RemoteConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }

    fn download_url(&self, object_key: &str, token: Option<&str>) -> String {
        let mut url = format!(
            "{}/b/{}/o/{}?alt=media",
            STORAGE_HOST,
            self.config.storage_bucket,
            encode_object_key(object_key)
        );
        if let Some(token) = token {
            url.push_str("&token=");
            url.push_str(token);
        }
        url
    }
}

#[async_trait]
impl BlobStore for StorageClient {
    async fn upload(&self, local_path: &Path, object_key: &str) -> Result<String, RemoteError> {
        let bytes = tokio::fs::read(local_path)
            .await
            .map_err(|e| RemoteError::Network(format!("cannot read {:?}: {}", local_path, e)))?;

        let url = format!("{}/b/{}/o", STORAGE_HOST, self.config.storage_bucket);
        let mut req = self
            .http
            .post(&url)
            .query(&[("uploadType", "media"), ("name", object_key)])
            .header("Content-Type", "image/jpeg")
            .body(bytes);
        if let Some(token) = &self.config.auth_token {
            req = req.bearer_auth(token);
        }

        let response = req
            .send()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Rejected(format!("{}: {}", status, body)));
        }

        let uploaded: UploadResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::InvalidDocument(e.to_string()))?;

        log::debug!("Uploaded photo as {}", uploaded.name);
        Ok(self.download_url(object_key, uploaded.download_tokens.as_deref()))
    }
}

/// Object keys appear as a single path segment in download URLs, so the
/// slashes must be escaped. Keys are generated internally from ids and
/// dates, so slash is the only character needing it.
fn encode_object_key(key: &str) -> String {
    key.replace('/', "%2F")
}
