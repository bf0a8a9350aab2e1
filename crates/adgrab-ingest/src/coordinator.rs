//! Run orchestration: pages in, classified records out.
//!
//! The coordinator walks archive pages serially through an [`AdFetcher`],
//! fans each record's media out through the shared [`DownloadManager`], and
//! emits one [`IngestResult`] per record to the sink in fetch order. Record
//! processing overlaps across a page via an ordered `buffered` stream, so
//! slow media never reorders output, only delays it.

use std::path::PathBuf;
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use futures::{stream, StreamExt};
use tokio_util::sync::CancellationToken;

use adgrab_client::{AdFetcher, AdRecord, PageBatch};

use crate::dedup::DedupIndex;
use crate::download::DownloadManager;
use crate::error::IngestError;
use crate::ledger::{Ledger, LedgerUnit};
use crate::ocr::TextExtractor;
use crate::resolve::{resolve, MediaFieldPolicy};
use crate::resume::RunState;
use crate::sink::IngestSink;
use crate::types::{Asset, DownloadOutcome, IngestResult, MediaKind, MediaOutcome, RecordState};

#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    /// Upper bound on records being processed at once within a page.
    pub max_inflight_records: usize,
    /// How long in-flight downloads get to settle after cancellation.
    pub drain_timeout: Duration,
    pub ocr_enabled: bool,
    /// Where to persist [`RunState`] after each completed page. `None`
    /// disables crash recovery.
    pub state_path: Option<PathBuf>,
    /// Where to write the failure ledger when the run ends.
    pub ledger_path: Option<PathBuf>,
    /// Where to persist the dedup index when the run ends.
    pub dedup_index_path: Option<PathBuf>,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            max_inflight_records: 16,
            drain_timeout: Duration::from_secs(30),
            ocr_enabled: false,
            state_path: None,
            ledger_path: None,
            dedup_index_path: None,
        }
    }
}

/// Final account of a run, suitable for logging and exit-code decisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub pages: u64,
    pub records: u64,
    pub completed: u64,
    pub partially_failed: u64,
    pub failed: u64,
    pub bytes_downloaded: u64,
    pub bytes_deduplicated: u64,
    pub ledger_errors: usize,
    /// `Some(reason)` when the run stopped cleanly before the archive
    /// was exhausted (cancellation). Hitting the page budget is a fetch
    /// error instead, so a resume picks up where the budget cut off.
    pub halted: Option<String>,
}

pub struct IngestCoordinator {
    fetcher: AdFetcher,
    downloads: Arc<DownloadManager>,
    index: Arc<DedupIndex>,
    sink: Arc<dyn IngestSink>,
    ledger: Arc<Ledger>,
    media_policy: Arc<MediaFieldPolicy>,
    extractor: Option<Arc<dyn TextExtractor>>,
    cancel: CancellationToken,
    state: RunState,
    options: CoordinatorOptions,
}

impl IngestCoordinator {
    /// `state` is either fresh ([`RunState::new`]) or restored from a
    /// previous run; the fetcher must already be positioned to match it.
    pub fn new(
        fetcher: AdFetcher,
        downloads: Arc<DownloadManager>,
        index: Arc<DedupIndex>,
        sink: Arc<dyn IngestSink>,
        state: RunState,
        options: CoordinatorOptions,
    ) -> Self {
        Self {
            fetcher,
            downloads,
            index,
            sink,
            ledger: Arc::new(Ledger::new()),
            media_policy: Arc::new(MediaFieldPolicy::default()),
            extractor: None,
            cancel: CancellationToken::new(),
            state,
            options,
        }
    }

    #[must_use]
    pub fn with_media_policy(mut self, policy: MediaFieldPolicy) -> Self {
        self.media_policy = Arc::new(policy);
        self
    }

    #[must_use]
    pub fn with_extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Token for external shutdown (Ctrl-C handling lives in the caller).
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs to archive exhaustion, cancellation, or a fatal error.
    ///
    /// Unit failures are absorbed into outcomes and the ledger. On a fatal
    /// error the run state and ledger are persisted before the error
    /// propagates, so `resume` can pick up from the last completed page.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Fetch`] on unrecoverable archive failures,
    /// [`IngestError::Integrity`] on storage corruption, and
    /// [`IngestError::Sink`]/persistence errors from the output path.
    pub async fn run(mut self) -> Result<RunSummary, IngestError> {
        let mut summary = RunSummary {
            pages: 0,
            records: 0,
            completed: 0,
            partially_failed: 0,
            failed: 0,
            bytes_downloaded: 0,
            bytes_deduplicated: 0,
            ledger_errors: 0,
            halted: None,
        };

        loop {
            if self.cancel.is_cancelled() {
                summary.halted = Some("cancelled".to_owned());
                break;
            }

            let batch = match self.fetcher.next_page().await {
                Ok(Some(batch)) => batch,
                Ok(None) => break,
                Err(e) => {
                    self.persist_on_exit().await;
                    return Err(IngestError::Fetch(e));
                }
            };

            if let Err(e) = self.ingest_page(batch, &mut summary).await {
                self.persist_on_exit().await;
                return Err(e);
            }

            // The page is fully emitted; move the durable cursor forward.
            self.state.cursor = self.fetcher.current_cursor().cloned();
            self.state.pages_completed += 1;
            summary.pages += 1;
            if let Some(path) = &self.options.state_path {
                if let Err(e) = self.state.save(path).await {
                    self.persist_on_exit().await;
                    return Err(e);
                }
            }
        }

        self.sink.finish()?;
        self.persist_on_exit().await;

        summary.bytes_downloaded = self.downloads.bytes_downloaded();
        summary.bytes_deduplicated = self.downloads.bytes_deduplicated();
        summary.ledger_errors = self.ledger.error_count();
        tracing::info!(
            pages = summary.pages,
            records = summary.records,
            completed = summary.completed,
            partially_failed = summary.partially_failed,
            failed = summary.failed,
            bytes_downloaded = summary.bytes_downloaded,
            halted = summary.halted.as_deref(),
            "ingest run finished"
        );
        Ok(summary)
    }

    /// Processes one page's records with bounded, order-preserving
    /// concurrency and emits each result to the sink.
    async fn ingest_page(
        &mut self,
        batch: PageBatch,
        summary: &mut RunSummary,
    ) -> Result<(), IngestError> {
        for warning in &batch.warnings {
            self.ledger
                .warn(LedgerUnit::Page, batch.page.to_string(), warning.clone());
        }

        let downloads = Arc::clone(&self.downloads);
        let policy = Arc::clone(&self.media_policy);
        let ledger = Arc::clone(&self.ledger);
        let extractor = self.extractor.clone().filter(|_| self.options.ocr_enabled);
        let cancel = self.cancel.clone();
        let drain = self.options.drain_timeout;

        let mut results = pin!(stream::iter(batch.records)
            .map(move |record| {
                ingest_record(
                    record,
                    Arc::clone(&downloads),
                    Arc::clone(&policy),
                    Arc::clone(&ledger),
                    extractor.clone(),
                    cancel.clone(),
                    drain,
                )
            })
            .buffered(self.options.max_inflight_records));

        while let Some(result) = results.next().await {
            let result = result?;
            self.sink.emit(&result)?;
            match result.state {
                RecordState::Completed => summary.completed += 1,
                RecordState::PartiallyFailed => summary.partially_failed += 1,
                RecordState::Failed => summary.failed += 1,
            }
            summary.records += 1;
            self.state.records_ingested += 1;
            self.state.last_completed_record = Some(result.record.id);
        }
        Ok(())
    }

    /// Best-effort persistence of state, ledger, and dedup index. Runs on
    /// every exit path, including fatal errors, so failures here are
    /// logged rather than propagated.
    async fn persist_on_exit(&self) {
        if let Err(e) = self.sink.finish() {
            tracing::error!(error = %e, "failed to flush sink");
        }
        if let Some(path) = &self.options.state_path {
            if let Err(e) = self.state.save(path).await {
                tracing::error!(path = %path.display(), error = %e, "failed to persist run state");
            }
        }
        if let Some(path) = &self.options.ledger_path {
            if let Err(e) = self.ledger.save(path).await {
                tracing::error!(path = %path.display(), error = %e, "failed to persist ledger");
            }
        }
        if let Some(path) = &self.options.dedup_index_path {
            if let Err(e) = self.index.save(path) {
                tracing::error!(path = %path.display(), error = %e, "failed to persist dedup index");
            }
        }
    }
}

/// Resolves and downloads one record's media, classifying the record from
/// the terminal outcomes. Free function so the buffered stream owns
/// everything it needs.
async fn ingest_record(
    record: AdRecord,
    downloads: Arc<DownloadManager>,
    policy: Arc<MediaFieldPolicy>,
    ledger: Arc<Ledger>,
    extractor: Option<Arc<dyn TextExtractor>>,
    cancel: CancellationToken,
    drain_timeout: Duration,
) -> Result<IngestResult, IngestError> {
    let refs = resolve(&record, &policy);
    if refs.is_empty() {
        return Ok(IngestResult::new(record, Vec::new()));
    }

    let outcomes = {
        let mut work = pin!(futures::future::try_join_all(
            refs.iter().map(|media| downloads.fetch(media))
        ));
        tokio::select! {
            res = &mut work => res?,
            () = cancel.cancelled() => {
                // Let in-flight transfers settle; past the drain window
                // they are recorded as failed and a resume retries them.
                match tokio::time::timeout(drain_timeout, &mut work).await {
                    Ok(res) => res?,
                    Err(_) => refs
                        .iter()
                        .map(|_| DownloadOutcome::Skipped {
                            reason: "cancelled before completion".to_owned(),
                        })
                        .collect(),
                }
            }
        }
    };

    let mut media_outcomes = Vec::with_capacity(refs.len());
    for (media, outcome) in refs.into_iter().zip(outcomes) {
        if let DownloadOutcome::Failed { error, .. } = &outcome {
            ledger.error(LedgerUnit::Media, media.url.clone(), error.clone());
        }
        let ocr_text = match (&outcome, &extractor) {
            (DownloadOutcome::Succeeded(asset), Some(extractor))
                if media.kind == MediaKind::Image =>
            {
                extract_text(asset, extractor.as_ref(), &ledger).await
            }
            _ => None,
        };
        media_outcomes.push(MediaOutcome {
            media,
            outcome,
            ocr_text,
        });
    }
    Ok(IngestResult::new(record, media_outcomes))
}

/// Runs OCR over a stored image asset. Extraction problems degrade to a
/// ledger warning; the asset itself already succeeded.
async fn extract_text(
    asset: &Asset,
    extractor: &dyn TextExtractor,
    ledger: &Ledger,
) -> Option<String> {
    let bytes = match tokio::fs::read(&asset.path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            ledger.warn(
                LedgerUnit::Media,
                asset.path.display().to_string(),
                format!("asset unreadable for text extraction: {e}"),
            );
            return None;
        }
    };
    match extractor.extract_text(&bytes) {
        Ok(text) if text.is_empty() => None,
        Ok(text) => Some(text),
        Err(e) => {
            ledger.warn(
                LedgerUnit::Media,
                asset.path.display().to_string(),
                format!("text extraction failed: {e}"),
            );
            None
        }
    }
}
