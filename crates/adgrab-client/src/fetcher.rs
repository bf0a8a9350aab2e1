//! Pull-based pagination over the archive.
//!
//! [`AdFetcher`] owns the [`FetchCursor`] and never buffers more than the
//! page the caller is consuming — backpressure comes from the caller simply
//! not asking for the next page yet. Pages must be requested in order (each
//! cursor comes from the previous page), so the fetcher is inherently
//! serial.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;

use adgrab_core::AdQuery;

use crate::client::AdArchiveClient;
use crate::error::ClientError;
use crate::pagination::FetchCursor;
use crate::types::{parse_archive_page, AdRecord};

/// Guard against cycling continuation cursors.
const DEFAULT_MAX_PAGES: usize = 2_000;

/// What to do when the archive reports the persisted cursor expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeMode {
    /// Restart pagination from the first page and refetch.
    RestartOnExpiry,
    /// Surface [`ClientError::ResumeUnavailable`]; the caller decides.
    Strict,
}

/// Headless-browser fallback for pages the plain HTTP path cannot reach.
///
/// Implementations render the archive query in a real browser session and
/// hand back the raw page JSON; how they do that is their business. Invoked
/// only on [`ClientError::Blocked`].
pub trait PageRenderer: Send + Sync {
    fn render_and_extract(
        &self,
        query: &AdQuery,
        after: Option<&str>,
    ) -> Pin<Box<dyn Future<Output = Result<Value, ClientError>> + Send + '_>>;
}

/// One batch of records handed to the coordinator.
#[derive(Debug)]
pub struct PageBatch {
    /// 1-based page number within this run (continues from a restored
    /// cursor's position on resume).
    pub page: u64,
    pub records: Vec<AdRecord>,
    /// Diagnostics to append to the run ledger: skipped pages, dropped
    /// entries, expiry restarts.
    pub warnings: Vec<String>,
}

#[derive(Debug, PartialEq, Eq)]
enum FetcherState {
    /// Next call fetches the first page (no continuation token).
    Start,
    /// Mid-pagination; `cursor` holds the continuation token.
    Mid,
    Done,
}

/// Lazily walks archive pages, yielding one [`PageBatch`] per call.
pub struct AdFetcher {
    client: Arc<AdArchiveClient>,
    query: AdQuery,
    /// Last known-good cursor; `cursor.page` is the page it points past.
    cursor: Option<FetchCursor>,
    state: FetcherState,
    resume_mode: ResumeMode,
    renderer: Option<Arc<dyn PageRenderer>>,
    /// Number the next fetched page will carry. Strictly increasing for the
    /// life of the fetcher, across expiry restarts included.
    next_page_no: u64,
    /// Pages fetched by this fetcher instance, for the cycle guard.
    pages_fetched: usize,
    max_pages: usize,
}

impl AdFetcher {
    /// Starts a fresh pagination over `query`.
    #[must_use]
    pub fn new(client: Arc<AdArchiveClient>, query: AdQuery) -> Self {
        Self {
            client,
            query,
            cursor: None,
            state: FetcherState::Start,
            resume_mode: ResumeMode::RestartOnExpiry,
            renderer: None,
            next_page_no: 1,
            pages_fetched: 0,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    /// Resumes pagination from a cursor persisted by an earlier run.
    #[must_use]
    pub fn resume(
        client: Arc<AdArchiveClient>,
        query: AdQuery,
        cursor: FetchCursor,
        resume_mode: ResumeMode,
    ) -> Self {
        let next_page_no = cursor.page + 1;
        Self {
            client,
            query,
            cursor: Some(cursor),
            state: FetcherState::Mid,
            resume_mode,
            renderer: None,
            next_page_no,
            pages_fetched: 0,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    #[must_use]
    pub fn with_renderer(mut self, renderer: Arc<dyn PageRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    #[must_use]
    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// The last known-good cursor, for persistence. `None` before the first
    /// page has produced a continuation token.
    #[must_use]
    pub fn current_cursor(&self) -> Option<&FetchCursor> {
        self.cursor.as_ref()
    }

    /// Fetches the next page of records.
    ///
    /// Returns `Ok(None)` once pagination is exhausted. A malformed page
    /// whose continuation cursor survived is skipped: the batch comes back
    /// with zero records and a warning, and the cursor advances. An expired
    /// cursor restarts pagination or surfaces
    /// [`ClientError::ResumeUnavailable`] per the [`ResumeMode`].
    ///
    /// # Errors
    ///
    /// - [`ClientError::RetryBudgetExhausted`] — transient failure outlived
    ///   the retry budget; [`Self::current_cursor`] still returns the last
    ///   good cursor, so the run is resumable.
    /// - [`ClientError::MalformedPage`] — broken page with no salvageable
    ///   cursor; pagination cannot continue safely.
    /// - [`ClientError::ResumeUnavailable`] — expired cursor in strict mode.
    /// - [`ClientError::PaginationLimit`] — cursor cycling guard tripped.
    pub async fn next_page(&mut self) -> Result<Option<PageBatch>, ClientError> {
        if self.state == FetcherState::Done {
            return Ok(None);
        }
        if self.pages_fetched >= self.max_pages {
            self.state = FetcherState::Done;
            return Err(ClientError::PaginationLimit {
                max_pages: self.max_pages,
            });
        }

        let after = match self.state {
            FetcherState::Start => None,
            FetcherState::Mid | FetcherState::Done => {
                self.cursor.as_ref().map(|c| c.after.clone())
            }
        };

        let mut warnings = Vec::new();
        let page_no = self.next_page_no;

        let fetched = self
            .client
            .fetch_ads_page(&self.query, after.as_deref())
            .await;

        let page = match fetched {
            Ok(page) => page,
            Err(ClientError::MalformedPage {
                context,
                next_after: Some(next),
            }) => {
                // Broken records but an intact paging envelope: skip the
                // page, keep the cursor moving.
                tracing::warn!(page = page_no, %context, "skipping malformed page");
                warnings.push(format!("page {page_no} skipped: {context}"));
                self.advance(Some(next));
                return Ok(Some(PageBatch {
                    page: page_no,
                    records: Vec::new(),
                    warnings,
                }));
            }
            Err(ClientError::CursorExpired) => {
                return self.handle_expired_cursor(page_no, warnings).await;
            }
            Err(ClientError::Blocked { url }) => {
                let Some(renderer) = self.renderer.clone() else {
                    self.state = FetcherState::Done;
                    return Err(ClientError::Blocked { url });
                };
                tracing::info!(page = page_no, "HTTP path blocked — using browser renderer");
                warnings.push(format!("page {page_no} fetched via browser fallback"));
                let body = renderer
                    .render_and_extract(&self.query, after.as_deref())
                    .await?;
                parse_archive_page(&body, "rendered archive page")?
            }
            Err(fatal) => {
                self.state = FetcherState::Done;
                return Err(fatal);
            }
        };

        if page.skipped_entries > 0 {
            warnings.push(format!(
                "page {page_no}: dropped {} entries without an id",
                page.skipped_entries
            ));
        }

        let next = if page.has_more { page.next_after } else { None };
        self.advance(next);

        tracing::debug!(
            page = page_no,
            records = page.records.len(),
            has_more = self.state != FetcherState::Done,
            "fetched archive page"
        );

        Ok(Some(PageBatch {
            page: page_no,
            records: page.records,
            warnings,
        }))
    }

    async fn handle_expired_cursor(
        &mut self,
        page_no: u64,
        mut warnings: Vec<String>,
    ) -> Result<Option<PageBatch>, ClientError> {
        match self.resume_mode {
            ResumeMode::Strict => {
                self.state = FetcherState::Done;
                Err(ClientError::ResumeUnavailable)
            }
            ResumeMode::RestartOnExpiry => {
                tracing::warn!(
                    page = page_no,
                    "cursor expired — restarting pagination from the first page"
                );
                warnings.push(format!(
                    "page {page_no}: cursor expired, restarted from the beginning"
                ));
                // Only the token resets; the page counter keeps increasing.
                self.cursor = None;
                self.state = FetcherState::Start;
                let mut batch = match Box::pin(self.next_page()).await? {
                    Some(batch) => batch,
                    None => return Ok(None),
                };
                warnings.append(&mut batch.warnings);
                batch.warnings = warnings;
                Ok(Some(batch))
            }
        }
    }

    /// Marks the current page consumed and installs its continuation token;
    /// `None` terminates pagination.
    fn advance(&mut self, next_after: Option<String>) {
        let finished_page = self.next_page_no;
        self.pages_fetched += 1;
        self.next_page_no += 1;
        match next_after {
            Some(after) => {
                self.cursor = Some(FetchCursor::new(after, finished_page));
                self.state = FetcherState::Mid;
            }
            None => {
                self.state = FetcherState::Done;
            }
        }
    }
}
