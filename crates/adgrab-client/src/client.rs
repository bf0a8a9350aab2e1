//! HTTP client for the ad-transparency archive endpoint.
//!
//! Wraps `reqwest` with archive-specific error classification, access-token
//! management, and typed page parsing. Every request goes through the shared
//! [`RateLimiter`] and the crate backoff policy; transient failures are
//! retried before a [`ClientError::RetryBudgetExhausted`] surfaces.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, StatusCode, Url};
use serde_json::Value;

use adgrab_core::AdQuery;

use crate::error::ClientError;
use crate::rate_limit::RateLimiter;
use crate::retry::{retry_with_backoff, BackoffPolicy, Transient};
use crate::types::{parse_archive_page, AdsPage};

const DEFAULT_BASE_URL: &str = "https://graph.facebook.com/v22.0/ads_archive";

/// Payload fields requested on every page.
const FIELDS: &str = "id,ad_delivery_start_time,ad_delivery_stop_time,\
ad_creative_bodies,ad_creative_link_captions,ad_creative_link_descriptions,\
ad_creative_link_titles,ad_snapshot_url,beneficiary_payers,languages,\
page_id,page_name,target_ages,target_gender,target_locations,\
eu_total_reach,age_country_gender_reach_breakdown";

/// Archive error-envelope codes that signal an expired or invalid cursor.
const CURSOR_ERROR_CODE: i64 = 613;

/// Archive error-envelope codes for application-level throttling.
const THROTTLE_CODES: [i64; 3] = [4, 17, 32];

/// Client for the archive's paginated query endpoint.
///
/// Use [`AdArchiveClient::new`] for production or
/// [`AdArchiveClient::with_base_url`] to point at a mock server in tests.
pub struct AdArchiveClient {
    client: Client,
    access_token: String,
    base_url: Url,
    limiter: Arc<RateLimiter>,
    policy: BackoffPolicy,
}

impl AdArchiveClient {
    /// Creates a client pointed at the production archive endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(
        access_token: &str,
        timeout_secs: u64,
        user_agent: &str,
        limiter: Arc<RateLimiter>,
        policy: BackoffPolicy,
    ) -> Result<Self, ClientError> {
        Self::with_base_url(
            access_token,
            timeout_secs,
            user_agent,
            limiter,
            policy,
            DEFAULT_BASE_URL,
        )
    }

    /// Creates a client with a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed, or [`ClientError::ApiError`] if `base_url` is
    /// not a valid URL.
    pub fn with_base_url(
        access_token: &str,
        timeout_secs: u64,
        user_agent: &str,
        limiter: Arc<RateLimiter>,
        policy: BackoffPolicy,
        base_url: &str,
    ) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(user_agent)
            .build()?;

        let base_url = Url::parse(base_url).map_err(|e| ClientError::ApiError {
            code: 0,
            message: format!("invalid base URL '{base_url}': {e}"),
        })?;

        Ok(Self {
            client,
            access_token: access_token.to_owned(),
            base_url,
            limiter,
            policy,
        })
    }

    /// Fetches one page of archive results, retrying transient failures.
    ///
    /// `after` is the continuation token from the previous page's paging
    /// envelope; `None` fetches the first page.
    ///
    /// # Errors
    ///
    /// - [`ClientError::RetryBudgetExhausted`] — a transient condition (5xx,
    ///   429, network failure) outlived the retry budget.
    /// - [`ClientError::CursorExpired`] — the archive rejected `after`.
    /// - [`ClientError::Blocked`] — interstitial response on the HTTP path.
    /// - [`ClientError::ApiError`] — application-level error envelope.
    /// - [`ClientError::MalformedPage`] / [`ClientError::Deserialize`] — the
    ///   page body did not parse (not retried).
    pub async fn fetch_ads_page(
        &self,
        query: &AdQuery,
        after: Option<&str>,
    ) -> Result<AdsPage, ClientError> {
        let url = self.page_url(query, after);
        let context = match after {
            Some(_) => "archive page (continuation)",
            None => "archive page (first)",
        };

        retry_with_backoff(&self.policy, || {
            let url = url.clone();
            async move { self.fetch_page_once(url, context).await }
        })
        .await
        .map_err(|retry_err| {
            if retry_err.attempts > 1 || retry_err.last.is_transient() {
                ClientError::RetryBudgetExhausted {
                    attempts: retry_err.attempts,
                    last: Box::new(retry_err.last),
                }
            } else {
                retry_err.last
            }
        })
    }

    /// One attempt: rate-limiter slot, request, classification, parse.
    async fn fetch_page_once(&self, url: Url, context: &str) -> Result<AdsPage, ClientError> {
        self.limiter.acquire().await;

        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(ClientError::RateLimited { retry_after_secs });
        }

        let body = response.text().await?;

        if !status.is_success() {
            return Err(Self::classify_failure(status, &url, &body));
        }

        let parsed: Value =
            serde_json::from_str(&body).map_err(|e| ClientError::Deserialize {
                context: context.to_owned(),
                source: e,
            })?;

        // Some archive deployments return 200 with an error envelope.
        if let Some(err) = Self::envelope_error(&parsed) {
            return Err(err);
        }

        parse_archive_page(&parsed, context)
    }

    /// Maps a non-2xx response to a typed error.
    ///
    /// A JSON error envelope wins over the raw status: cursor errors and
    /// application throttling both arrive as HTTP 400 and are only
    /// distinguishable by envelope code. A 403 without an envelope (an HTML
    /// consent or challenge interstitial) marks the HTTP path as blocked so
    /// the fetcher can hand the page to a browser renderer.
    fn classify_failure(status: StatusCode, url: &Url, body: &str) -> ClientError {
        if let Ok(parsed) = serde_json::from_str::<Value>(body) {
            if let Some(err) = Self::envelope_error(&parsed) {
                return err;
            }
        } else if status == StatusCode::FORBIDDEN {
            return ClientError::Blocked {
                url: redacted(url),
            };
        }
        ClientError::UnexpectedStatus {
            status: status.as_u16(),
            url: redacted(url),
        }
    }

    /// Extracts a typed error from the archive's `{"error": {...}}` envelope.
    fn envelope_error(body: &Value) -> Option<ClientError> {
        let envelope = body.get("error")?;
        let code = envelope.get("code").and_then(Value::as_i64).unwrap_or(0);
        let message = envelope
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown archive error")
            .to_owned();

        if code == CURSOR_ERROR_CODE || message.to_ascii_lowercase().contains("cursor") {
            return Some(ClientError::CursorExpired);
        }
        if THROTTLE_CODES.contains(&code) {
            return Some(ClientError::RateLimited {
                retry_after_secs: 60,
            });
        }
        Some(ClientError::ApiError { code, message })
    }

    /// Builds the page request URL: filters, field list, limit, token, and
    /// the continuation cursor when present.
    fn page_url(&self, query: &AdQuery, after: Option<&str>) -> Url {
        let mut url = self.base_url.clone();
        {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in query.request_params() {
                pairs.append_pair(&k, &v);
            }
            pairs.append_pair("fields", FIELDS);
            pairs.append_pair("access_token", &self.access_token);
            if let Some(after) = after {
                pairs.append_pair("after", after);
            }
        }
        url
    }
}

/// Renders a URL for logs and error messages with the access token blanked.
fn redacted(url: &Url) -> String {
    let mut clean = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            if k == "access_token" {
                (k.into_owned(), "[redacted]".to_owned())
            } else {
                (k.into_owned(), v.into_owned())
            }
        })
        .collect();
    clean.query_pairs_mut().clear();
    {
        let mut qp = clean.query_pairs_mut();
        for (k, v) in &pairs {
            qp.append_pair(k, v);
        }
    }
    clean.to_string()
}
