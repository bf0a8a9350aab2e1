//! Durable run state for crash recovery.
//!
//! The coordinator persists a `RunState` after every completed page. A
//! later `resume` run reloads it, restores the pagination cursor, and
//! relies on downstream idempotence (content-addressed storage plus the
//! dedup index) to absorb any work that was re-fetched.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use adgrab_client::FetchCursor;
use adgrab_core::AdQuery;

use crate::error::IngestError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    /// The query this run was started with. A resume must reuse it
    /// verbatim or the cursor is meaningless.
    pub query: AdQuery,
    /// Cursor of the last fully ingested page. `None` before the first
    /// page completes.
    pub cursor: Option<FetchCursor>,
    pub pages_completed: u64,
    pub records_ingested: u64,
    /// Id of the last record whose media all reached a terminal outcome.
    pub last_completed_record: Option<String>,
}

impl RunState {
    #[must_use]
    pub fn new(query: AdQuery) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            query,
            cursor: None,
            pages_completed: 0,
            records_ingested: 0,
            last_completed_record: None,
        }
    }

    /// Atomically persists the state: write to a temp sibling, then rename.
    /// A crash mid-save leaves the previous state file intact.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::StatePersist`] on I/O failure.
    pub async fn save(&self, path: &Path) -> Result<(), IngestError> {
        let persist = |source| IngestError::StatePersist {
            path: path.to_path_buf(),
            source,
        };

        let json = serde_json::to_vec_pretty(self).map_err(|e| IngestError::StateCorrupt {
            path: path.to_path_buf(),
            source: e,
        })?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(persist)?;
        }
        let tmp = path.with_extension("json.part");
        tokio::fs::write(&tmp, &json).await.map_err(persist)?;
        tokio::fs::rename(&tmp, path).await.map_err(persist)
    }

    /// # Errors
    ///
    /// Returns [`IngestError::StatePersist`] if the file cannot be read and
    /// [`IngestError::StateCorrupt`] if it does not parse.
    pub async fn load(path: &Path) -> Result<Self, IngestError> {
        let raw = tokio::fs::read(path)
            .await
            .map_err(|source| IngestError::StatePersist {
                path: path.to_path_buf(),
                source,
            })?;
        serde_json::from_slice(&raw).map_err(|source| IngestError::StateCorrupt {
            path: path.to_path_buf(),
            source,
        })
    }
}
