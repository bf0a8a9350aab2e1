//! Content-addressed asset storage.
//!
//! An asset lives at `<root>/<fp[0..2]>/<fp>.<ext>` where `fp` is the hex
//! SHA-256 of its bytes. Writes go to a uniquely named temp file in the
//! destination directory and are renamed into place, so concurrent writers
//! to different fingerprints never contend and a crashed writer leaves no
//! half-written asset at a final path. Assets are append-only: nothing in
//! this crate ever rewrites or deletes one.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::IngestError;
use crate::types::{Asset, MediaKind};

/// Hex SHA-256 of the bytes; the dedup key and storage key.
#[must_use]
pub fn fingerprint(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

pub struct AssetStore {
    root: PathBuf,
}

impl AssetStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The one storage path for a fingerprint.
    #[must_use]
    pub fn path_for(&self, fingerprint: &str, kind: MediaKind) -> PathBuf {
        let shard = fingerprint.get(0..2).unwrap_or("00");
        self.root
            .join(shard)
            .join(format!("{fingerprint}.{}", kind.extension()))
    }

    /// Persists `bytes` under their fingerprint and returns the stored asset.
    ///
    /// Idempotent: if the path already holds a file of the same length the
    /// existing asset is returned without touching disk.
    ///
    /// # Errors
    ///
    /// - [`IngestError::Integrity`] if the path already exists with a
    ///   different length — the one-path-per-fingerprint invariant would be
    ///   silently violated by overwriting.
    /// - [`IngestError::Storage`] on any filesystem failure.
    pub async fn write(
        &self,
        fingerprint: &str,
        kind: MediaKind,
        bytes: &[u8],
    ) -> Result<Asset, IngestError> {
        let path = self.path_for(fingerprint, kind);
        let len = bytes.len() as u64;

        match tokio::fs::metadata(&path).await {
            Ok(meta) => {
                if meta.len() == len {
                    return Ok(Asset {
                        fingerprint: fingerprint.to_owned(),
                        len,
                        path,
                        kind,
                    });
                }
                return Err(IngestError::Integrity {
                    path,
                    detail: format!(
                        "existing file is {} bytes but fingerprint {fingerprint} maps to {len} bytes",
                        meta.len()
                    ),
                });
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(IngestError::Storage { path, source: e });
            }
        }

        let dir = path.parent().unwrap_or(&self.root).to_path_buf();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| IngestError::Storage {
                path: dir.clone(),
                source: e,
            })?;

        // Unique temp name per writer; losers of a same-fingerprint race
        // rename over an identical file, which is harmless.
        let tmp = dir.join(format!(
            "{fingerprint}.{}.{}.part",
            kind.extension(),
            uuid::Uuid::new_v4()
        ));
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| IngestError::Storage {
                path: tmp.clone(),
                source: e,
            })?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| IngestError::Storage {
                path: path.clone(),
                source: e,
            })?;

        Ok(Asset {
            fingerprint: fingerprint.to_owned(),
            len,
            path,
            kind,
        })
    }
}
