//! Bounded-concurrency media downloads with content-level dedup.
//!
//! [`DownloadManager::fetch`] handles one `MediaRef` end to end: dedup
//! consults, rate-limited download with retry, fingerprinting, and the
//! registration/storage handshake. The manager itself imposes no
//! concurrency — the coordinator runs many `fetch` calls through a bounded
//! stream — so all shared state here must hold up under arbitrary
//! interleaving.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use thiserror::Error;

use adgrab_client::{retry_with_backoff, BackoffPolicy, ClientError, RateLimiter, Transient};

use crate::dedup::DedupIndex;
use crate::error::IngestError;
use crate::store::{fingerprint, AssetStore};
use crate::types::{DownloadOutcome, MediaRef};

/// Failure of a single media request attempt.
#[derive(Debug, Error)]
enum MediaFetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("rate limited by media host (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("media not found: {url}")]
    NotFound { url: String },

    #[error("unexpected HTTP status {status} for {url}")]
    UnexpectedStatus { status: u16, url: String },

    /// Body shorter or longer than the declared Content-Length. Treated as
    /// a transient transfer fault, not corruption.
    #[error("truncated body for {url}: expected {expected} bytes, got {got}")]
    SizeMismatch { url: String, expected: u64, got: u64 },
}

impl Transient for MediaFetchError {
    fn is_transient(&self) -> bool {
        match self {
            MediaFetchError::Http(e) => {
                e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error())
            }
            MediaFetchError::UnexpectedStatus { status, .. } => (500..600).contains(status),
            MediaFetchError::RateLimited { .. } | MediaFetchError::SizeMismatch { .. } => true,
            MediaFetchError::NotFound { .. } => false,
        }
    }

    fn retry_hint_secs(&self) -> Option<u64> {
        match self {
            MediaFetchError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }
}

pub struct DownloadManager {
    client: Client,
    limiter: Arc<RateLimiter>,
    index: Arc<DedupIndex>,
    store: Arc<AssetStore>,
    policy: BackoffPolicy,
    /// Caps downloads in flight across all records.
    workers: tokio::sync::Semaphore,
    bytes_downloaded: AtomicU64,
    bytes_deduplicated: AtomicU64,
}

impl DownloadManager {
    /// Creates a manager sharing `limiter` (the media-host budget) and
    /// `index` with the rest of the run. `workers` caps how many
    /// downloads run concurrently, independent of how many records are
    /// in flight.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Fetch`] if the HTTP client cannot be built.
    pub fn new(
        timeout_secs: u64,
        user_agent: &str,
        workers: usize,
        limiter: Arc<RateLimiter>,
        index: Arc<DedupIndex>,
        store: Arc<AssetStore>,
        policy: BackoffPolicy,
    ) -> Result<Self, IngestError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(user_agent)
            .build()
            .map_err(|e| IngestError::Fetch(ClientError::from(e)))?;
        Ok(Self {
            client,
            limiter,
            index,
            store,
            policy,
            workers: tokio::sync::Semaphore::new(workers.max(1)),
            bytes_downloaded: AtomicU64::new(0),
            bytes_deduplicated: AtomicU64::new(0),
        })
    }

    /// Total bytes fetched over the network so far.
    #[must_use]
    pub fn bytes_downloaded(&self) -> u64 {
        self.bytes_downloaded.load(Ordering::Relaxed)
    }

    /// Total bytes satisfied from the dedup index without storing again.
    #[must_use]
    pub fn bytes_deduplicated(&self) -> u64 {
        self.bytes_deduplicated.load(Ordering::Relaxed)
    }

    /// Resolves one `MediaRef` to a terminal [`DownloadOutcome`].
    ///
    /// Unit-level failures (exhausted retries, 404, storage write error) are
    /// encoded in the outcome, never propagated — one bad URL must not
    /// abort the run.
    ///
    /// # Errors
    ///
    /// Only [`IngestError::Integrity`] escapes: a path collision with
    /// mismatched content is a fatal corruption signal.
    pub async fn fetch(&self, media: &MediaRef) -> Result<DownloadOutcome, IngestError> {
        // URL-level cache: this exact URL already resolved this run.
        if let Some(asset) = self.index.lookup_url(&media.url) {
            tracing::debug!(url = %media.url, "url cache hit — no download");
            self.bytes_deduplicated.fetch_add(asset.len, Ordering::Relaxed);
            return Ok(DownloadOutcome::Succeeded(asset));
        }

        // One worker slot for the whole retry sequence: a download that is
        // backing off still occupies its slot.
        let _slot = self
            .workers
            .acquire()
            .await
            .expect("download semaphore is never closed");

        let bytes = match retry_with_backoff(&self.policy, || {
            let url = media.url.clone();
            async move { self.fetch_once(&url).await }
        })
        .await
        {
            Ok(bytes) => bytes,
            Err(retry_err) => {
                tracing::warn!(
                    url = %media.url,
                    record_id = %media.record_id,
                    attempts = retry_err.attempts,
                    error = %retry_err.last,
                    "media download failed permanently"
                );
                return Ok(DownloadOutcome::Failed {
                    error: retry_err.last.to_string(),
                    attempts: retry_err.attempts,
                });
            }
        };

        self.bytes_downloaded
            .fetch_add(bytes.len() as u64, Ordering::Relaxed);
        let fp = fingerprint(&bytes);

        // Content-level dedup: identical bytes from a different URL.
        if let Some(asset) = self.index.lookup(&fp) {
            self.bytes_deduplicated
                .fetch_add(asset.len, Ordering::Relaxed);
            self.index.cache_url(&media.url, &fp);
            return Ok(DownloadOutcome::Succeeded(asset));
        }

        // First sight of this content: serialize racing writers, then
        // re-check under the permit. The loser discards its bytes here.
        let _permit = self.index.write_permit(&fp).await;
        if let Some(asset) = self.index.lookup(&fp) {
            self.bytes_deduplicated
                .fetch_add(asset.len, Ordering::Relaxed);
            self.index.cache_url(&media.url, &fp);
            return Ok(DownloadOutcome::Succeeded(asset));
        }

        let asset = match self.store.write(&fp, media.kind, &bytes).await {
            Ok(asset) => asset,
            Err(integrity @ IngestError::Integrity { .. }) => return Err(integrity),
            Err(storage) => {
                tracing::error!(
                    url = %media.url,
                    fingerprint = %fp,
                    error = %storage,
                    "storage write failed; dedup index left untouched"
                );
                return Ok(DownloadOutcome::Failed {
                    error: storage.to_string(),
                    attempts: 1,
                });
            }
        };

        let registered = self.index.register(asset);
        self.index.cache_url(&media.url, &fp);
        Ok(DownloadOutcome::Succeeded(registered))
    }

    /// One attempt: rate-limiter slot, request, status classification, body.
    async fn fetch_once(&self, url: &str) -> Result<Vec<u8>, MediaFetchError> {
        self.limiter.acquire().await;

        let response = self.client.get(url).send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(30);
            return Err(MediaFetchError::RateLimited { retry_after_secs });
        }
        if status == StatusCode::NOT_FOUND {
            return Err(MediaFetchError::NotFound {
                url: url.to_owned(),
            });
        }
        if !status.is_success() {
            return Err(MediaFetchError::UnexpectedStatus {
                status: status.as_u16(),
                url: url.to_owned(),
            });
        }

        let expected = response.content_length();
        let bytes = response.bytes().await?;
        if let Some(expected) = expected {
            if bytes.len() as u64 != expected {
                return Err(MediaFetchError::SizeMismatch {
                    url: url.to_owned(),
                    expected,
                    got: bytes.len() as u64,
                });
            }
        }
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MediaKind;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn no_wait_policy(max_retries: u32) -> BackoffPolicy {
        BackoffPolicy {
            max_retries,
            base_ms: 0,
            cap_ms: 0,
        }
    }

    fn manager(store_root: &std::path::Path, max_retries: u32) -> DownloadManager {
        DownloadManager::new(
            30,
            "adgrab-test/0.1",
            4,
            Arc::new(RateLimiter::new(1_000, Duration::from_secs(1))),
            Arc::new(DedupIndex::new()),
            Arc::new(AssetStore::new(store_root)),
            no_wait_policy(max_retries),
        )
        .expect("manager construction should not fail")
    }

    fn image_ref(url: String, record_id: &str) -> MediaRef {
        MediaRef {
            url,
            kind: MediaKind::Image,
            record_id: record_id.to_owned(),
        }
    }

    #[tokio::test]
    async fn downloads_and_stores_new_content() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"image-bytes".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path(), 0);
        let outcome = manager
            .fetch(&image_ref(format!("{}/a.jpg", server.uri()), "r1"))
            .await
            .unwrap();

        match outcome {
            DownloadOutcome::Succeeded(asset) => {
                assert_eq!(asset.len, 11);
                assert_eq!(
                    tokio::fs::read(&asset.path).await.unwrap(),
                    b"image-bytes"
                );
            }
            other => panic!("expected success, got {other:?}"),
        }
        assert_eq!(manager.bytes_downloaded(), 11);
    }

    #[tokio::test]
    async fn second_fetch_of_same_url_skips_the_network() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"image-bytes".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path(), 0);
        let url = format!("{}/a.jpg", server.uri());

        let first = manager.fetch(&image_ref(url.clone(), "r1")).await.unwrap();
        let second = manager.fetch(&image_ref(url, "r2")).await.unwrap();

        let (DownloadOutcome::Succeeded(a), DownloadOutcome::Succeeded(b)) = (first, second)
        else {
            panic!("both fetches should succeed");
        };
        assert_eq!(a.path, b.path);
        assert_eq!(manager.bytes_deduplicated(), 11);
    }

    #[tokio::test]
    async fn identical_content_from_different_urls_stores_once() {
        let server = MockServer::start().await;
        for p in ["/a.jpg", "/b.jpg"] {
            Mock::given(method("GET"))
                .and(path(p))
                .respond_with(ResponseTemplate::new(200).set_body_bytes(b"same".to_vec()))
                .mount(&server)
                .await;
        }

        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path(), 0);
        let first = manager
            .fetch(&image_ref(format!("{}/a.jpg", server.uri()), "r1"))
            .await
            .unwrap();
        let second = manager
            .fetch(&image_ref(format!("{}/b.jpg", server.uri()), "r2"))
            .await
            .unwrap();

        let (DownloadOutcome::Succeeded(a), DownloadOutcome::Succeeded(b)) = (first, second)
        else {
            panic!("both fetches should succeed");
        };
        assert_eq!(a.fingerprint, b.fingerprint);
        assert_eq!(a.path, b.path);
    }

    #[tokio::test]
    async fn transient_failures_then_success_reports_succeeded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"late".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path(), 3);
        let outcome = manager
            .fetch(&image_ref(format!("{}/x.jpg", server.uri()), "r1"))
            .await
            .unwrap();
        assert!(outcome.is_success());
    }

    #[tokio::test]
    async fn exhausted_retries_report_attempt_count() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path(), 2);
        let outcome = manager
            .fetch(&image_ref(format!("{}/x.jpg", server.uri()), "r1"))
            .await
            .unwrap();

        match outcome {
            DownloadOutcome::Failed { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn permanent_404_fails_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path(), 3);
        let outcome = manager
            .fetch(&image_ref(format!("{}/gone.jpg", server.uri()), "r1"))
            .await
            .unwrap();

        match outcome {
            DownloadOutcome::Failed { attempts, error } => {
                assert_eq!(attempts, 1);
                assert!(error.contains("not found"));
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn concurrent_workers_racing_on_one_url_store_one_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/shared.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"raced".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let manager = Arc::new(manager(dir.path(), 0));
        let url = format!("{}/shared.jpg", server.uri());

        let mut handles = Vec::new();
        for i in 0..4 {
            let manager = Arc::clone(&manager);
            let media = image_ref(url.clone(), &format!("r{i}"));
            handles.push(tokio::spawn(async move { manager.fetch(&media).await }));
        }

        let mut paths = Vec::new();
        for h in handles {
            match h.await.unwrap().unwrap() {
                DownloadOutcome::Succeeded(asset) => paths.push(asset.path),
                other => panic!("expected success, got {other:?}"),
            }
        }
        paths.dedup();
        assert_eq!(paths.len(), 1, "all workers must converge on one path");

        let shard = dir.path().join(paths[0].parent().unwrap().file_name().unwrap());
        let mut entries = tokio::fs::read_dir(&shard).await.unwrap();
        let mut count = 0;
        while entries.next_entry().await.unwrap().is_some() {
            count += 1;
        }
        assert_eq!(count, 1, "exactly one stored file for the fingerprint");
    }
}
