//! Object storage: resolves stored match-file keys to URLs and fetches them.
//!
//! Submissions upload their matches file to a public bucket; the store
//! keeps the object key. `PublicBucket` turns that key into a URL under the
//! bucket's base and downloads it over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use tracing::debug;

use crate::error::StorageError;

/// Object-storage collaborator consumed by the worker.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Resolve a stored key (or URL) to a fetchable URL.
    async fn resolve_url(&self, key: &str) -> Result<Url, StorageError>;

    /// Fetch the object at `url` as text.
    async fn fetch_text(&self, url: &Url) -> Result<String, StorageError>;
}

/// Public HTTP bucket.
pub struct PublicBucket {
    base: Url,
    client: reqwest::Client,
}

impl PublicBucket {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, StorageError> {
        let base = Url::parse(base_url).map_err(|e| StorageError::InvalidKey {
            key: base_url.to_string(),
            reason: format!("invalid base URL: {e}"),
        })?;
        if base.cannot_be_a_base() {
            return Err(StorageError::InvalidKey {
                key: base_url.to_string(),
                reason: "base URL cannot carry a path".into(),
            });
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StorageError::Request {
                url: base_url.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self { base, client })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Join a key onto the base, percent-encoding each path segment.
    fn key_url(&self, key: &str) -> Result<Url, StorageError> {
        let trimmed = key.trim();
        if trimmed.is_empty() {
            return Err(StorageError::InvalidKey {
                key: key.to_string(),
                reason: "empty key".into(),
            });
        }

        // Older rows store the full URL rather than the key.
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            return Url::parse(trimmed).map_err(|e| StorageError::InvalidKey {
                key: key.to_string(),
                reason: e.to_string(),
            });
        }

        let mut url = self.base.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| StorageError::InvalidKey {
                key: key.to_string(),
                reason: "base URL cannot carry a path".into(),
            })?;
            segments
                .pop_if_empty()
                .extend(trimmed.trim_start_matches('/').split('/'));
        }
        Ok(url)
    }
}

#[async_trait]
impl ObjectStorage for PublicBucket {
    async fn resolve_url(&self, key: &str) -> Result<Url, StorageError> {
        self.key_url(key)
    }

    async fn fetch_text(&self, url: &Url) -> Result<String, StorageError> {
        debug!(url = %url, "Fetching object");
        let resp = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| StorageError::Request {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(StorageError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        resp.text().await.map_err(|e| StorageError::Request {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }
}
