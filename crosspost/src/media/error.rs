//! Media error types.

use thiserror::Error;

/// Errors at the media boundary. Both variants are retryable by the caller
/// with backoff; neither leaves partial cache state behind.
#[derive(Debug, Error)]
pub enum MediaError {
    /// Source bytes could not be obtained within the configured bounds.
    #[error("Download failed for {url}: {reason}")]
    DownloadFailed { url: String, reason: String },

    /// Rehosting the bytes to canonical storage failed.
    #[error("Rehost failed: {reason}")]
    RehostFailed { reason: String },
}

impl MediaError {
    pub fn download(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DownloadFailed {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub fn rehost(reason: impl Into<String>) -> Self {
        Self::RehostFailed {
            reason: reason.into(),
        }
    }
}
