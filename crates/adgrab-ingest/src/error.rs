use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] adgrab_client::ClientError),

    #[error("storage write error at {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The one-path-per-fingerprint invariant would be violated. Always
    /// fatal; never downgraded to a ledger entry.
    #[error("storage integrity violation at {path}: {detail}")]
    Integrity { path: PathBuf, detail: String },

    #[error("failed to persist run state to {path}: {source}")]
    StatePersist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("resume state at {path} is corrupt: {source}")]
    StateCorrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("sink write error: {0}")]
    Sink(#[source] std::io::Error),
}
