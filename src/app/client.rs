//! HTTP client for the topic content backend
//!
//! This module provides the transfer executor: a cheap HEAD-style size
//! probe and a streaming, cancellable byte transfer for a topic's content
//! bundle. The `TopicFetcher` trait is the seam the scheduler depends on,
//! so tests can drive deterministic fake transfers.
//!
//! Every `fetch` starts from byte zero: the destination is truncated on
//! open and no byte-range resume is attempted (see DESIGN.md). Progress is
//! reported once per received chunk, which naturally bounds the callback
//! rate to the transport's chunking.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use super::models::{TopicId, TransferOutcome};
use crate::constants::{api, http};
use crate::errors::{FetchError, FetchResult};

/// Progress callback for an in-flight transfer: receives the cumulative
/// byte count of the current attempt
pub type ChunkHook = Box<dyn Fn(u64) + Send + Sync>;

/// Abstract transfer primitive consumed by the scheduler
#[async_trait]
pub trait TopicFetcher: Send + Sync {
    /// Resolve the download URL for a topic's content bundle
    fn content_url(&self, topic_id: &TopicId) -> String;

    /// Probe the byte size of a topic's content bundle
    async fn probe_size(&self, topic_id: &TopicId) -> FetchResult<u64>;

    /// Stream a topic's bytes from `url` to `dest`, reporting cumulative
    /// progress per chunk and aborting promptly when `token` fires
    async fn fetch(
        &self,
        url: &str,
        dest: &Path,
        on_chunk: ChunkHook,
        token: CancellationToken,
    ) -> TransferOutcome;
}

/// Configuration for the HTTP client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend base URL
    pub base_url: String,
    /// Request timeout for content downloads
    pub request_timeout: Duration,
    /// Connection establishment timeout
    pub connect_timeout: Duration,
    /// Timeout for the size probe request
    pub probe_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: api::BASE_URL.to_string(),
            request_timeout: http::DEFAULT_TIMEOUT,
            connect_timeout: http::CONNECT_TIMEOUT,
            probe_timeout: http::SIZE_PROBE_TIMEOUT,
        }
    }
}

/// Production `TopicFetcher` backed by reqwest
#[derive(Debug)]
pub struct TopicClient {
    client: Client,
    base_url: Url,
    probe_timeout: Duration,
}

impl TopicClient {
    /// Create a client with default configuration
    pub fn new() -> FetchResult<Self> {
        Self::with_config(ClientConfig::default())
    }

    /// Create a client with custom configuration
    pub fn with_config(config: ClientConfig) -> FetchResult<Self> {
        let client = Client::builder()
            .user_agent(http::USER_AGENT)
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()?;

        let base_url = Url::parse(&config.base_url).map_err(|e| FetchError::InvalidUrl {
            url: config.base_url.clone(),
            error: e.to_string(),
        })?;

        Ok(Self {
            client,
            base_url,
            probe_timeout: config.probe_timeout,
        })
    }

    /// Build an absolute URL from a `{topic_id}` path template
    fn endpoint(&self, template: &str, topic_id: &TopicId) -> String {
        let path = template.replace("{topic_id}", topic_id.as_str());
        match self.base_url.join(&path) {
            Ok(url) => url.to_string(),
            // base_url is validated at construction; a join failure can
            // only come from a malformed topic id, surfaced at request time
            Err(_) => format!("{}{}", self.base_url, path),
        }
    }

    /// Remove a partially written destination file, best effort
    async fn discard_partial(dest: &Path) {
        if let Err(e) = tokio::fs::remove_file(dest).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %dest.display(), error = %e, "Failed to remove partial download");
            }
        }
    }
}

#[async_trait]
impl TopicFetcher for TopicClient {
    fn content_url(&self, topic_id: &TopicId) -> String {
        self.endpoint(api::TOPIC_CONTENT_PATH, topic_id)
    }

    async fn probe_size(&self, topic_id: &TopicId) -> FetchResult<u64> {
        let url = self.endpoint(api::TOPIC_SIZE_PATH, topic_id);
        debug!(topic = %topic_id, %url, "Probing topic size");

        let response = self
            .client
            .head(&url)
            .timeout(self.probe_timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(FetchError::ServerError {
                status: response.status().as_u16(),
            });
        }

        response
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .ok_or(FetchError::MissingContentLength)
    }

    async fn fetch(
        &self,
        url: &str,
        dest: &Path,
        on_chunk: ChunkHook,
        token: CancellationToken,
    ) -> TransferOutcome {
        debug!(%url, dest = %dest.display(), "Starting transfer");

        if let Some(parent) = dest.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return TransferOutcome::Failed(format!(
                    "could not create download directory {}: {}",
                    parent.display(),
                    e
                ));
            }
        }

        let response = match self.client.get(url).send().await {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                return TransferOutcome::Failed(format!("server error: HTTP {}", r.status()));
            }
            Err(e) => return TransferOutcome::Failed(format!("request failed: {}", e)),
        };

        // Truncating create: every attempt restarts from zero
        let mut file = match tokio::fs::File::create(dest).await {
            Ok(f) => f,
            Err(e) => {
                return TransferOutcome::Failed(format!(
                    "could not open {}: {}",
                    dest.display(),
                    e
                ));
            }
        };

        let mut response = response;
        let mut received: u64 = 0;

        loop {
            let chunk = tokio::select! {
                _ = token.cancelled() => {
                    debug!(%url, received, "Transfer cancelled");
                    drop(file);
                    Self::discard_partial(dest).await;
                    return TransferOutcome::Cancelled;
                }
                chunk = response.chunk() => chunk,
            };

            match chunk {
                Ok(Some(bytes)) => {
                    if let Err(e) = file.write_all(&bytes).await {
                        drop(file);
                        Self::discard_partial(dest).await;
                        return TransferOutcome::Failed(format!(
                            "write failed at {}: {}",
                            dest.display(),
                            e
                        ));
                    }
                    received += bytes.len() as u64;
                    on_chunk(received);
                }
                Ok(None) => break,
                Err(e) => {
                    drop(file);
                    Self::discard_partial(dest).await;
                    return TransferOutcome::Failed(format!("stream error: {}", e));
                }
            }
        }

        if let Err(e) = file.sync_all().await {
            return TransferOutcome::Failed(format!("sync failed: {}", e));
        }

        debug!(%url, received, "Transfer complete");
        TransferOutcome::Completed
    }
}

/// Derive the local destination path for a topic's content bundle
pub fn destination_path(download_dir: &Path, topic_id: &TopicId) -> PathBuf {
    download_dir.join(topic_id.as_str())
}
