//! Content-level deduplication index.
//!
//! Two levels: a URL→fingerprint cache short-circuits re-downloading a URL
//! already seen this run (the same creative is routinely referenced by many
//! ads), and the fingerprint→[`Asset`] map is the authoritative dedup key —
//! identical bytes served from two different URLs still collapse to one
//! stored asset.
//!
//! Registration is an atomic check-then-insert under one mutex, so of N
//! workers racing on the same fingerprint exactly one becomes the writer;
//! the rest adopt its asset and discard their bytes.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::IngestError;
use crate::types::Asset;

#[derive(Default)]
struct Inner {
    by_fingerprint: HashMap<String, Asset>,
    by_url: HashMap<String, String>,
}

#[derive(Default)]
pub struct DedupIndex {
    inner: Mutex<Inner>,
    /// Per-fingerprint write serialization; see [`DedupIndex::write_permit`].
    write_locks: Mutex<HashMap<String, std::sync::Arc<tokio::sync::Mutex<()>>>>,
}

/// Snapshot format for cross-run persistence.
#[derive(Serialize, Deserialize)]
struct Snapshot {
    assets: HashMap<String, Asset>,
}

impl DedupIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The asset registered for a fingerprint, if any.
    #[must_use]
    pub fn lookup(&self, fingerprint: &str) -> Option<Asset> {
        self.inner
            .lock()
            .expect("dedup index lock poisoned")
            .by_fingerprint
            .get(fingerprint)
            .cloned()
    }

    /// The fingerprint previously cached for a URL, resolved to its asset.
    #[must_use]
    pub fn lookup_url(&self, url: &str) -> Option<Asset> {
        let inner = self.inner.lock().expect("dedup index lock poisoned");
        let fp = inner.by_url.get(url)?;
        inner.by_fingerprint.get(fp).cloned()
    }

    /// Records that `url` served content with `fingerprint`.
    pub fn cache_url(&self, url: &str, fingerprint: &str) {
        let mut inner = self.inner.lock().expect("dedup index lock poisoned");
        inner
            .by_url
            .insert(url.to_owned(), fingerprint.to_owned());
    }

    /// Registers `asset` for its fingerprint unless one is already present.
    ///
    /// Idempotent and atomic: the first caller's asset wins, later callers
    /// get the existing asset back unchanged. Storage must already hold the
    /// bytes when this is called — the index only ever points at confirmed
    /// writes.
    pub fn register(&self, asset: Asset) -> Asset {
        let fingerprint = asset.fingerprint.clone();
        let registered = {
            let mut inner = self.inner.lock().expect("dedup index lock poisoned");
            inner
                .by_fingerprint
                .entry(fingerprint.clone())
                .or_insert(asset)
                .clone()
        };
        // The fingerprint is visible to lookups now, so late writers adopt
        // it on their permit re-check; the lock entry has no further use.
        // Must happen after the insert above or a fresh writer could slip
        // past both the lookup and the permit.
        self.write_locks
            .lock()
            .expect("dedup write-lock map poisoned")
            .remove(&fingerprint);
        registered
    }

    /// Serializes writers racing on one fingerprint.
    ///
    /// Plain check-then-act would let two workers both believe they are the
    /// first registrant. Instead a worker holding bytes with an unregistered
    /// fingerprint takes this permit, re-checks [`DedupIndex::lookup`], and
    /// only then writes and registers. A loser reaching the permit second
    /// finds the winner's asset on its re-check and discards its bytes, and
    /// the index itself is only ever updated after a confirmed storage
    /// write. [`DedupIndex::register`] removes the entry once the
    /// fingerprint is published, so the map only holds in-flight writes.
    pub(crate) async fn write_permit(&self, fingerprint: &str) -> tokio::sync::OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self
                .write_locks
                .lock()
                .expect("dedup write-lock map poisoned");
            std::sync::Arc::clone(
                locks
                    .entry(fingerprint.to_owned())
                    .or_insert_with(|| std::sync::Arc::new(tokio::sync::Mutex::new(()))),
            )
        };
        lock.lock_owned().await
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .expect("dedup index lock poisoned")
            .by_fingerprint
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writes the fingerprint→asset map to `path` for reuse by a later run.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::StatePersist`] on I/O failure.
    pub fn save(&self, path: &Path) -> Result<(), IngestError> {
        let assets = self
            .inner
            .lock()
            .expect("dedup index lock poisoned")
            .by_fingerprint
            .clone();
        let snapshot = Snapshot { assets };
        let json = serde_json::to_string_pretty(&snapshot).map_err(|e| {
            IngestError::StatePersist {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
            }
        })?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| IngestError::StatePersist {
                path: path.to_path_buf(),
                source: e,
            })?;
        }
        std::fs::write(path, json).map_err(|e| IngestError::StatePersist {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Loads a snapshot saved by [`DedupIndex::save`]. URL cache entries are
    /// not persisted; only content-level knowledge survives across runs.
    ///
    /// # Errors
    ///
    /// - [`IngestError::StatePersist`] on I/O failure.
    /// - [`IngestError::StateCorrupt`] if the snapshot does not parse.
    pub fn load(path: &Path) -> Result<Self, IngestError> {
        let raw = std::fs::read_to_string(path).map_err(|e| IngestError::StatePersist {
            path: path.to_path_buf(),
            source: e,
        })?;
        let snapshot: Snapshot =
            serde_json::from_str(&raw).map_err(|e| IngestError::StateCorrupt {
                path: path.to_path_buf(),
                source: e,
            })?;
        Ok(Self {
            inner: Mutex::new(Inner {
                by_fingerprint: snapshot.assets,
                by_url: HashMap::new(),
            }),
            write_locks: Mutex::new(HashMap::new()),
        })
    }
}
