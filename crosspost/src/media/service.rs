//! Media dedup service.
//!
//! Maps a source URL to a canonical URL on the rehost domain, uploading each
//! distinct piece of content at most once. Identity is the hash of the raw
//! bytes, never the source URL, so mirrors and querystring variants of the
//! same file all collapse to one canonical copy.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};

use super::cache::DedupCache;
use super::error::MediaError;
use super::fetch::MediaFetcher;
use super::store::MediaStore;
use super::types::MediaType;

pub struct MediaDedupService {
    fetcher: Arc<dyn MediaFetcher>,
    store: Arc<dyn MediaStore>,
    cache: DedupCache,
}

impl MediaDedupService {
    pub fn new(fetcher: Arc<dyn MediaFetcher>, store: Arc<dyn MediaStore>, cache: DedupCache) -> Self {
        Self {
            fetcher,
            store,
            cache,
        }
    }

    /// Resolve a source URL to its canonical URL.
    ///
    /// URLs already on the canonical domain are returned unchanged. Otherwise
    /// the bytes are downloaded under bounded size/time, hashed, and either
    /// served from the cache or rehosted exactly once per distinct content.
    #[instrument(skip(self), fields(media_type = %media_type))]
    pub async fn get_consistent_url(
        &self,
        source_url: &str,
        media_type: MediaType,
    ) -> Result<String, MediaError> {
        if self.is_canonical(source_url) {
            debug!("Source already canonical");
            return Ok(source_url.to_string());
        }

        let bytes = self.fetcher.fetch(source_url).await?;
        let content_hash = hex::encode(Sha256::digest(&bytes));

        if let Some(url) = self.cache.get(&content_hash) {
            debug!(content_hash = %content_hash, "Dedup cache hit");
            return Ok(url);
        }

        // Single-flight the population of this hash: concurrent requests for
        // never-before-seen content must not both upload.
        let (request, is_new) = self.cache.get_or_create_in_flight(&content_hash);
        if !is_new {
            return self
                .cache
                .wait_for_in_flight(&request)
                .await
                .map_err(MediaError::rehost);
        }

        // Became the uploader; a prior winner may have completed between the
        // cache check and the claim.
        if let Some(url) = self.cache.get(&content_hash) {
            self.cache
                .complete_in_flight(&content_hash, &request, url.clone());
            return Ok(url);
        }

        match self.store.rehost(&content_hash, media_type, bytes).await {
            Ok(url) => {
                info!(content_hash = %content_hash, "Content rehosted");
                self.cache
                    .complete_in_flight(&content_hash, &request, url.clone());
                Ok(url)
            }
            Err(e) => {
                self.cache
                    .fail_in_flight(&content_hash, &request, e.to_string());
                Err(e)
            }
        }
    }

    fn is_canonical(&self, source_url: &str) -> bool {
        url::Url::parse(source_url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h == self.store.canonical_host()))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use bytes::Bytes;

    use super::*;

    /// Serves a fixed URL -> bytes map.
    struct FakeFetcher {
        responses: HashMap<String, Bytes>,
        fetches: AtomicUsize,
        delay: Duration,
    }

    impl FakeFetcher {
        fn new(responses: &[(&str, &[u8])]) -> Self {
            Self {
                responses: responses
                    .iter()
                    .map(|(url, bytes)| (url.to_string(), Bytes::copy_from_slice(bytes)))
                    .collect(),
                fetches: AtomicUsize::new(0),
                delay: Duration::ZERO,
            }
        }
    }

    #[async_trait]
    impl MediaFetcher for FakeFetcher {
        async fn fetch(&self, url: &str) -> Result<Bytes, MediaError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.responses
                .get(url)
                .cloned()
                .ok_or_else(|| MediaError::download(url, "not found"))
        }
    }

    /// Counts uploads; canonical host is media.example.com.
    struct FakeStore {
        uploads: AtomicUsize,
        fail: bool,
        delay: Duration,
    }

    impl FakeStore {
        fn new() -> Self {
            Self {
                uploads: AtomicUsize::new(0),
                fail: false,
                delay: Duration::ZERO,
            }
        }

        fn uploads(&self) -> usize {
            self.uploads.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MediaStore for FakeStore {
        async fn rehost(
            &self,
            content_hash: &str,
            media_type: MediaType,
            _bytes: Bytes,
        ) -> Result<String, MediaError> {
            self.uploads.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail {
                return Err(MediaError::rehost("storage offline"));
            }
            Ok(format!(
                "https://media.example.com/{}/{}",
                media_type.as_str(),
                content_hash
            ))
        }

        fn canonical_host(&self) -> &str {
            "media.example.com"
        }
    }

    fn service(fetcher: FakeFetcher, store: FakeStore) -> (MediaDedupService, Arc<FakeStore>) {
        let store = Arc::new(store);
        let service = MediaDedupService::new(
            Arc::new(fetcher),
            Arc::clone(&store) as Arc<dyn MediaStore>,
            DedupCache::new(Duration::from_secs(60), 64),
        );
        (service, store)
    }

    #[tokio::test]
    async fn test_canonical_url_returned_unchanged() {
        let (service, store) = service(FakeFetcher::new(&[]), FakeStore::new());

        let url = "https://media.example.com/image/abc123";
        let resolved = service
            .get_consistent_url(url, MediaType::Image)
            .await
            .unwrap();

        assert_eq!(resolved, url);
        assert_eq!(store.uploads(), 0);
    }

    #[tokio::test]
    async fn test_identical_bytes_from_different_urls_upload_once() {
        let fetcher = FakeFetcher::new(&[
            ("https://a.example/clip.mp4", b"same-bytes"),
            ("https://b.example/mirror.mp4?utm=1", b"same-bytes"),
        ]);
        let (service, store) = service(fetcher, FakeStore::new());

        let first = service
            .get_consistent_url("https://a.example/clip.mp4", MediaType::Video)
            .await
            .unwrap();
        let second = service
            .get_consistent_url("https://b.example/mirror.mp4?utm=1", MediaType::Video)
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(store.uploads(), 1);
    }

    #[tokio::test]
    async fn test_distinct_content_uploads_separately() {
        let fetcher = FakeFetcher::new(&[
            ("https://a.example/one.png", b"bytes-one"),
            ("https://a.example/two.png", b"bytes-two"),
        ]);
        let (service, store) = service(fetcher, FakeStore::new());

        let one = service
            .get_consistent_url("https://a.example/one.png", MediaType::Image)
            .await
            .unwrap();
        let two = service
            .get_consistent_url("https://a.example/two.png", MediaType::Image)
            .await
            .unwrap();

        assert_ne!(one, two);
        assert_eq!(store.uploads(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_same_content_single_upload() {
        let fetcher = FakeFetcher {
            delay: Duration::from_millis(10),
            ..FakeFetcher::new(&[
                ("https://a.example/clip.mp4", b"same-bytes"),
                ("https://b.example/clip.mp4", b"same-bytes"),
            ])
        };
        let mut store = FakeStore::new();
        store.delay = Duration::from_millis(30);
        let (service, store) = service(fetcher, store);
        let service = Arc::new(service);

        let a = tokio::spawn({
            let service = Arc::clone(&service);
            async move {
                service
                    .get_consistent_url("https://a.example/clip.mp4", MediaType::Video)
                    .await
            }
        });
        let b = tokio::spawn({
            let service = Arc::clone(&service);
            async move {
                service
                    .get_consistent_url("https://b.example/clip.mp4", MediaType::Video)
                    .await
            }
        });

        let (a, b) = (a.await.unwrap().unwrap(), b.await.unwrap().unwrap());
        assert_eq!(a, b);
        assert_eq!(store.uploads(), 1);
    }

    #[tokio::test]
    async fn test_download_failure_propagates() {
        let (service, store) = service(FakeFetcher::new(&[]), FakeStore::new());

        let err = service
            .get_consistent_url("https://a.example/missing.png", MediaType::Image)
            .await
            .unwrap_err();

        assert!(matches!(err, MediaError::DownloadFailed { .. }));
        assert_eq!(store.uploads(), 0);
    }

    #[tokio::test]
    async fn test_rehost_failure_does_not_poison_cache() {
        let fetcher = FakeFetcher::new(&[("https://a.example/clip.mp4", b"bytes")]);
        let mut store = FakeStore::new();
        store.fail = true;
        let (service, _) = service(fetcher, store);

        let err = service
            .get_consistent_url("https://a.example/clip.mp4", MediaType::Video)
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::RehostFailed { .. }));

        // A second attempt with a working store succeeds from scratch.
        let fetcher = FakeFetcher::new(&[("https://a.example/clip.mp4", b"bytes")]);
        let (service, store) = self::service(fetcher, FakeStore::new());
        service
            .get_consistent_url("https://a.example/clip.mp4", MediaType::Video)
            .await
            .unwrap();
        assert_eq!(store.uploads(), 1);
    }
}
