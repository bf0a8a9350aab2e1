//! Client for the ad-transparency archive API.
//!
//! Provides the rate limiter and retry policy shared by the whole pipeline,
//! the low-level page client, and [`AdFetcher`] — the pull-based pagination
//! state machine that yields one page of [`AdRecord`]s at a time.

mod client;
mod error;
mod fetcher;
mod pagination;
mod rate_limit;
mod retry;
mod types;

pub use client::AdArchiveClient;
pub use error::ClientError;
pub use fetcher::{AdFetcher, PageBatch, PageRenderer, ResumeMode};
pub use pagination::FetchCursor;
pub use rate_limit::RateLimiter;
pub use retry::{retry_with_backoff, BackoffPolicy, RetryError, Transient};
pub use types::{AdRecord, AdsPage, AdPayload};
