//! Result types produced by the ingest pipeline.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use adgrab_client::AdRecord;

/// Media kind as declared by the payload field the URL came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
    Unknown,
}

impl MediaKind {
    /// File extension used by the content-addressed store.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            MediaKind::Image => "jpg",
            MediaKind::Video => "mp4",
            MediaKind::Unknown => "bin",
        }
    }
}

/// One addressable remote media location, plus the record that declared it.
///
/// Not stored itself; consumed by the download manager. Two records may
/// reference the same URL — each gets its own `MediaRef`, and dedup happens
/// at the content level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    pub url: String,
    pub kind: MediaKind,
    pub record_id: String,
}

/// A stored media asset. For any two assets with equal fingerprint the
/// storage path is identical; assets are never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    /// Hex SHA-256 of the stored bytes; also the storage key.
    pub fingerprint: String,
    pub len: u64,
    pub path: PathBuf,
    pub kind: MediaKind,
}

/// Terminal outcome of one `MediaRef`'s attempt chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadOutcome {
    /// The bytes are in the store — freshly downloaded or deduplicated.
    Succeeded(Asset),
    /// The download never settled: cancellation stopped it before a
    /// terminal success or failure. A resumed run retries it.
    Skipped { reason: String },
    /// The attempt chain is exhausted or hit a permanent error.
    Failed { error: String, attempts: u32 },
}

impl DownloadOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, DownloadOutcome::Succeeded(_))
    }
}

/// A `MediaRef` paired with what became of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaOutcome {
    pub media: MediaRef,
    pub outcome: DownloadOutcome,
    /// OCR-derived text for image assets, when extraction is enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ocr_text: Option<String>,
}

/// Terminal state of one record after all its media settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordState {
    /// Every `MediaRef` resolved to an asset (vacuously true for zero media).
    Completed,
    /// At least one success and at least one failure.
    PartiallyFailed,
    /// Every `MediaRef` failed.
    Failed,
}

/// The terminal artifact for one record: the record itself plus the settled
/// outcome of each of its `MediaRef`s. A record is never emitted
/// half-resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestResult {
    pub record: AdRecord,
    pub media: Vec<MediaOutcome>,
    pub state: RecordState,
}

impl IngestResult {
    /// Builds the result, classifying the record from its media outcomes.
    #[must_use]
    pub fn new(record: AdRecord, media: Vec<MediaOutcome>) -> Self {
        let state = Self::classify(&media);
        Self {
            record,
            media,
            state,
        }
    }

    fn classify(media: &[MediaOutcome]) -> RecordState {
        if media.is_empty() {
            return RecordState::Completed;
        }
        let succeeded = media.iter().filter(|m| m.outcome.is_success()).count();
        if succeeded == media.len() {
            RecordState::Completed
        } else if succeeded > 0 {
            RecordState::PartiallyFailed
        } else {
            RecordState::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: &str) -> AdRecord {
        AdRecord {
            id: id.to_owned(),
            payload: json!({}),
        }
    }

    fn media_outcome(url: &str, outcome: DownloadOutcome) -> MediaOutcome {
        MediaOutcome {
            media: MediaRef {
                url: url.to_owned(),
                kind: MediaKind::Image,
                record_id: "r".to_owned(),
            },
            outcome,
            ocr_text: None,
        }
    }

    fn asset() -> Asset {
        Asset {
            fingerprint: "ab".repeat(32),
            len: 3,
            path: PathBuf::from("assets/ab/abab.jpg"),
            kind: MediaKind::Image,
        }
    }

    #[test]
    fn zero_media_records_complete() {
        let result = IngestResult::new(record("1"), Vec::new());
        assert_eq!(result.state, RecordState::Completed);
    }

    #[test]
    fn all_successes_complete() {
        let result = IngestResult::new(
            record("1"),
            vec![media_outcome("u1", DownloadOutcome::Succeeded(asset()))],
        );
        assert_eq!(result.state, RecordState::Completed);
    }

    #[test]
    fn mixed_outcomes_partially_fail() {
        let result = IngestResult::new(
            record("1"),
            vec![
                media_outcome("u1", DownloadOutcome::Succeeded(asset())),
                media_outcome(
                    "u2",
                    DownloadOutcome::Failed {
                        error: "404".to_owned(),
                        attempts: 1,
                    },
                ),
            ],
        );
        assert_eq!(result.state, RecordState::PartiallyFailed);
    }

    #[test]
    fn all_failures_fail() {
        let result = IngestResult::new(
            record("1"),
            vec![
                media_outcome(
                    "u1",
                    DownloadOutcome::Failed {
                        error: "404".to_owned(),
                        attempts: 1,
                    },
                ),
                media_outcome(
                    "u2",
                    DownloadOutcome::Skipped {
                        reason: "cancelled".to_owned(),
                    },
                ),
            ],
        );
        assert_eq!(result.state, RecordState::Failed);
    }
}
