//! Append-only failure ledger for a run.
//!
//! Every skipped page, failed record, and failed media unit lands here so
//! the run can finish with a faithful account of what it did not get.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::IngestError;

/// How bad the entry is for the run's completeness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Something was skipped or degraded, but the run stayed on course.
    Warning,
    /// A unit of work failed permanently.
    Error,
}

/// The granularity of the failed unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerUnit {
    Page,
    Record,
    Media,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub at: DateTime<Utc>,
    pub severity: Severity,
    pub unit: LedgerUnit,
    /// Page number, record id, or media URL, depending on `unit`.
    pub subject: String,
    pub detail: String,
}

#[derive(Debug, Default)]
pub struct Ledger {
    entries: Mutex<Vec<LedgerEntry>>,
}

impl Ledger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(&self, unit: LedgerUnit, subject: impl Into<String>, detail: impl Into<String>) {
        self.push(Severity::Warning, unit, subject.into(), detail.into());
    }

    pub fn error(&self, unit: LedgerUnit, subject: impl Into<String>, detail: impl Into<String>) {
        self.push(Severity::Error, unit, subject.into(), detail.into());
    }

    fn push(&self, severity: Severity, unit: LedgerUnit, subject: String, detail: String) {
        let entry = LedgerEntry {
            at: Utc::now(),
            severity,
            unit,
            subject,
            detail,
        };
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(entry);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries at [`Severity::Error`].
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .filter(|e| e.severity == Severity::Error)
            .count()
    }

    /// Snapshot of all entries in append order.
    #[must_use]
    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Writes the ledger as pretty JSON, overwriting any previous file.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::StatePersist`] on I/O failure.
    pub async fn save(&self, path: &Path) -> Result<(), IngestError> {
        let entries = self.entries();
        let json = serde_json::to_string_pretty(&entries)
            .unwrap_or_else(|_| "[]".to_owned());
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| IngestError::StatePersist {
                    path: path.to_path_buf(),
                    source,
                })?;
        }
        tokio::fs::write(path, json)
            .await
            .map_err(|source| IngestError::StatePersist {
                path: path.to_path_buf(),
                source,
            })
    }
}
