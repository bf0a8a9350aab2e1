use std::path::PathBuf;

/// Runtime configuration for a collection run.
///
/// Built from environment variables by [`crate::load_app_config`]; individual
/// fields can be overridden by CLI flags before the pipeline is constructed.
#[derive(Clone)]
pub struct AppConfig {
    /// Access token for the ad-archive API. Sent as a query parameter on
    /// every page request; never logged.
    pub access_token: String,
    /// Override for the archive API base URL (tests point this at a mock
    /// server). `None` means the production endpoint.
    pub api_base_url: Option<String>,
    /// Root directory for datasets, assets, ledgers, and resume state.
    pub out_dir: PathBuf,
    pub log_level: String,
    /// Per-request timeout for both page fetches and media downloads.
    pub request_timeout_secs: u64,
    pub user_agent: String,
    /// Archive API quota: at most `api_rate_limit` page requests per
    /// `api_rate_window_secs`.
    pub api_rate_limit: usize,
    pub api_rate_window_secs: u64,
    /// Media host budget, deliberately separate from (and usually tighter
    /// than) the API quota.
    pub media_rate_limit: usize,
    pub media_rate_window_secs: u64,
    /// Additional attempts after the first failure for transient errors.
    pub max_retries: u32,
    /// Base delay for exponential backoff: `backoff_base_ms * 2^attempt`.
    pub backoff_base_ms: u64,
    /// Fixed size of the media download worker pool.
    pub download_workers: usize,
    /// Upper bound on records concurrently mid-download; throttles page
    /// consumption when reached.
    pub max_inflight_records: usize,
    /// How long in-flight downloads may run after cancellation is requested.
    pub drain_timeout_secs: u64,
    /// Run OCR text extraction over downloaded image assets.
    pub ocr_enabled: bool,
    /// Persist the dedup index across runs at `<out_dir>/dedup_state.json`.
    pub persist_dedup_index: bool,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("access_token", &"[redacted]")
            .field("api_base_url", &self.api_base_url)
            .field("out_dir", &self.out_dir)
            .field("log_level", &self.log_level)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("user_agent", &self.user_agent)
            .field("api_rate_limit", &self.api_rate_limit)
            .field("api_rate_window_secs", &self.api_rate_window_secs)
            .field("media_rate_limit", &self.media_rate_limit)
            .field("media_rate_window_secs", &self.media_rate_window_secs)
            .field("max_retries", &self.max_retries)
            .field("backoff_base_ms", &self.backoff_base_ms)
            .field("download_workers", &self.download_workers)
            .field("max_inflight_records", &self.max_inflight_records)
            .field("drain_timeout_secs", &self.drain_timeout_secs)
            .field("ocr_enabled", &self.ocr_enabled)
            .field("persist_dedup_index", &self.persist_dedup_index)
            .finish()
    }
}
