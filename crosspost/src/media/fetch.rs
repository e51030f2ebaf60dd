//! Source media download with bounded size and time.

use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use rand::RngExt;
use tracing::{debug, warn};

use crate::utils::http::build_client;

use super::error::MediaError;

/// Content-download collaborator.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Fetch the raw bytes behind a URL.
    async fn fetch(&self, url: &str) -> Result<Bytes, MediaError>;
}

/// HTTP implementation of [`MediaFetcher`].
///
/// Transfers are bounded in both size and time; oversized or slow sources
/// fail as `DownloadFailed`. Transient failures retry with jittered backoff
/// up to a bounded attempt count.
pub struct HttpMediaFetcher {
    client: reqwest::Client,
    max_bytes: usize,
    attempts: u32,
}

impl HttpMediaFetcher {
    pub fn new(request_timeout: Duration, max_bytes: usize, attempts: u32) -> Self {
        Self {
            client: build_client(request_timeout),
            max_bytes,
            attempts: attempts.max(1),
        }
    }

    async fn try_fetch(&self, url: &str) -> Result<Bytes, MediaError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| MediaError::download(url, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MediaError::download(url, format!("status {status}")));
        }

        // Reject early when the source declares an oversized body.
        if let Some(length) = response.content_length()
            && length as usize > self.max_bytes
        {
            return Err(MediaError::download(
                url,
                format!("declared length {length} exceeds limit {}", self.max_bytes),
            ));
        }

        // The declared length is advisory; enforce the cap while streaming.
        let mut buf = BytesMut::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| MediaError::download(url, e.to_string()))?;
            if buf.len() + chunk.len() > self.max_bytes {
                return Err(MediaError::download(
                    url,
                    format!("body exceeds limit {}", self.max_bytes),
                ));
            }
            buf.extend_from_slice(&chunk);
        }

        debug!(url = %url, bytes = buf.len(), "Media downloaded");
        Ok(buf.freeze())
    }
}

#[async_trait]
impl MediaFetcher for HttpMediaFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, MediaError> {
        let mut last_err = None;

        for attempt in 1..=self.attempts {
            match self.try_fetch(url).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) => {
                    if attempt < self.attempts {
                        let backoff = backoff_with_jitter(attempt);
                        warn!(
                            url = %url,
                            attempt,
                            error = %e,
                            backoff_ms = backoff.as_millis() as u64,
                            "Download attempt failed; retrying"
                        );
                        tokio::time::sleep(backoff).await;
                    }
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| MediaError::download(url, "no attempts made")))
    }
}

fn backoff_with_jitter(attempt: u32) -> Duration {
    let base = 250u64.saturating_mul(1u64 << attempt.min(6));
    let jitter = rand::rng().random_range(0..100u64);
    Duration::from_millis(base.saturating_add(jitter))
}
