//! Canonical media storage (rehost) collaborator.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use crate::utils::http::build_client;

use super::error::MediaError;
use super::types::MediaType;

/// Content-store collaborator that rehosts bytes at a canonical URL.
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Upload bytes under their content hash; returns the canonical URL.
    async fn rehost(
        &self,
        content_hash: &str,
        media_type: MediaType,
        bytes: Bytes,
    ) -> Result<String, MediaError>;

    /// Host of the canonical storage domain. URLs already under this host
    /// are never re-fetched or re-uploaded.
    fn canonical_host(&self) -> &str;
}

/// HTTP blob-store implementation of [`MediaStore`].
///
/// PUTs bytes to `{upload_url}/{media_type}/{hash}` and serves them from
/// `{public_url}/{media_type}/{hash}`.
pub struct HttpBlobStore {
    client: reqwest::Client,
    upload_url: String,
    public_url: String,
    canonical_host: String,
}

impl HttpBlobStore {
    pub fn new(
        upload_url: impl Into<String>,
        public_url: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, MediaError> {
        let upload_url = upload_url.into();
        let public_url: String = public_url.into();

        let canonical_host = url::Url::parse(&public_url)
            .ok()
            .and_then(|u| u.host_str().map(String::from))
            .ok_or_else(|| MediaError::rehost(format!("invalid public URL: {public_url}")))?;

        Ok(Self {
            client: build_client(request_timeout),
            upload_url: upload_url.trim_end_matches('/').to_string(),
            public_url: public_url.trim_end_matches('/').to_string(),
            canonical_host,
        })
    }
}

#[async_trait]
impl MediaStore for HttpBlobStore {
    async fn rehost(
        &self,
        content_hash: &str,
        media_type: MediaType,
        bytes: Bytes,
    ) -> Result<String, MediaError> {
        let upload_url = format!("{}/{}/{}", self.upload_url, media_type.as_str(), content_hash);

        let response = self
            .client
            .put(&upload_url)
            .body(bytes)
            .send()
            .await
            .map_err(|e| MediaError::rehost(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MediaError::rehost(format!(
                "upload returned {status} for {content_hash}"
            )));
        }

        debug!(content_hash = %content_hash, "Media rehosted");
        Ok(format!(
            "{}/{}/{}",
            self.public_url,
            media_type.as_str(),
            content_hash
        ))
    }

    fn canonical_host(&self) -> &str {
        &self.canonical_host
    }
}
