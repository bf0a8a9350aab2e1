use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("rate limited by the archive (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("archive API error {code}: {message}")]
    ApiError { code: i64, message: String },

    #[error("pagination cursor expired or is no longer valid")]
    CursorExpired,

    #[error("cursor expired and strict resume mode is set; a fresh run is required")]
    ResumeUnavailable,

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("malformed page payload: {context}")]
    MalformedPage {
        context: String,
        /// Continuation cursor salvaged from the broken page, if the paging
        /// envelope itself was intact. `Some` means pagination can continue.
        next_after: Option<String>,
    },

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("request blocked by an interstitial at {url}")]
    Blocked { url: String },

    #[error("retry budget exhausted after {attempts} attempts: {last}")]
    RetryBudgetExhausted {
        attempts: u32,
        #[source]
        last: Box<ClientError>,
    },

    #[error("pagination limit reached: exceeded {max_pages} pages")]
    PaginationLimit { max_pages: usize },
}
