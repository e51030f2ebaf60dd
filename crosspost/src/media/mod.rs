//! Content-addressed media dedup cache.
//!
//! Prevents redundant re-uploads across providers: every piece of content is
//! identified by the hash of its raw bytes and rehosted to the canonical
//! storage domain at most once.
//!
//! # Architecture
//!
//! - [`MediaFetcher`]: bounded content download collaborator
//! - [`MediaStore`]: canonical storage (rehost) collaborator
//! - [`DedupCache`]: bounded TTL hash -> URL map with single-flight population
//! - [`MediaDedupService`]: orchestrates resolve -> download -> hash -> rehost

mod cache;
mod error;
mod fetch;
mod service;
mod store;
mod types;

pub use cache::DedupCache;
pub use error::MediaError;
pub use fetch::{HttpMediaFetcher, MediaFetcher};
pub use service::MediaDedupService;
pub use store::{HttpBlobStore, MediaStore};
pub use types::MediaType;
