//! Retry with exponential back-off and jitter.
//!
//! [`retry_with_backoff`] wraps any fallible async operation whose error type
//! implements [`Transient`] and retries on transient failures. The page
//! client and the media download manager share this one policy so a single
//! set of tuning knobs governs both.

use std::future::Future;
use std::time::Duration;

use crate::error::ClientError;

/// Backoff tuning: `base_ms * 2^attempt`, capped at `cap_ms`, ±25% jitter.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    /// Additional attempts after the first failure. `0` disables retries.
    pub max_retries: u32,
    pub base_ms: u64,
    pub cap_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_ms: 1_000,
            cap_ms: 60_000,
        }
    }
}

/// Classification hook for [`retry_with_backoff`].
pub trait Transient {
    /// Whether this error is worth another attempt after a delay.
    fn is_transient(&self) -> bool;

    /// Server-supplied delay hint in seconds (e.g. a `Retry-After` header).
    /// When present it overrides the computed exponential delay.
    fn retry_hint_secs(&self) -> Option<u64> {
        None
    }
}

impl Transient for ClientError {
    /// Retriable: network-level failures (timeout, connection reset), 5xx
    /// responses, and rate-limit rejections. Everything else — API-level
    /// errors, expired cursors, parse failures, blocked requests — is
    /// returned immediately.
    fn is_transient(&self) -> bool {
        match self {
            ClientError::Http(e) => {
                e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error())
            }
            ClientError::UnexpectedStatus { status, .. } => (500..600).contains(status),
            ClientError::RateLimited { .. } => true,
            _ => false,
        }
    }

    fn retry_hint_secs(&self) -> Option<u64> {
        match self {
            ClientError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }
}

/// The last error after the retry budget is spent, with the attempt count
/// that produced it.
#[derive(Debug)]
pub struct RetryError<E> {
    pub last: E,
    /// Total attempts made, including the first. A non-transient error gives
    /// `attempts == 1`.
    pub attempts: u32,
}

/// Runs `operation` with up to `policy.max_retries` additional attempts on
/// transient errors.
///
/// Back-off schedule with `base_ms = 1_000`:
///
/// | Attempt | Sleep before next attempt        |
/// |---------|----------------------------------|
/// | 1       | 1 000 ms × 2⁰ ± 25 % jitter     |
/// | 2       | 1 000 ms × 2¹ ± 25 % jitter     |
/// | 3       | 1 000 ms × 2² ± 25 % jitter     |
///
/// Delay is capped at `policy.cap_ms`. When the error carries a
/// [`Transient::retry_hint_secs`] hint, the hint is used instead of the
/// exponential delay, subject to the same cap. Non-retriable errors are
/// returned immediately with `attempts == 1`.
///
/// # Errors
///
/// Returns [`RetryError`] wrapping the last error once the budget is spent
/// or on the first non-transient failure.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &BackoffPolicy,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    E: Transient + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !err.is_transient() || attempt >= policy.max_retries {
                    return Err(RetryError {
                        last: err,
                        attempts: attempt + 1,
                    });
                }
                let delay_ms = match err.retry_hint_secs() {
                    // Hints come from the server; cap them like any other
                    // delay so a hostile header cannot stall a worker.
                    Some(hint) => hint.saturating_mul(1_000).min(policy.cap_ms),
                    None => {
                        let computed = policy.base_ms.saturating_mul(1u64 << attempt.min(10));
                        let capped = computed.min(policy.cap_ms);
                        #[allow(
                            clippy::cast_possible_truncation,
                            clippy::cast_sign_loss,
                            clippy::cast_precision_loss
                        )]
                        {
                            (capped as f64 * (rand::random::<f64>() * 0.5 + 0.75)) as u64
                        }
                    }
                };
                tracing::warn!(
                    attempt,
                    max_retries = policy.max_retries,
                    delay_ms,
                    error = %err,
                    "transient error — retrying after back-off"
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn no_wait_policy(max_retries: u32) -> BackoffPolicy {
        BackoffPolicy {
            max_retries,
            base_ms: 0,
            cap_ms: 0,
        }
    }

    fn rate_limited() -> ClientError {
        ClientError::RateLimited {
            retry_after_secs: 0,
        }
    }

    #[tokio::test]
    async fn succeeds_immediately_on_first_try() {
        let call_count = Arc::new(AtomicU32::new(0));
        let cc = Arc::clone(&call_count);
        let result = retry_with_backoff(&no_wait_policy(3), || {
            let cc = Arc::clone(&cc);
            async move {
                cc.fetch_add(1, Ordering::SeqCst);
                Ok::<u32, ClientError>(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_on_rate_limited_then_succeeds() {
        let call_count = Arc::new(AtomicU32::new(0));
        let cc = Arc::clone(&call_count);
        let result = retry_with_backoff(&no_wait_policy(3), || {
            let cc = Arc::clone(&cc);
            async move {
                let n = cc.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(rate_limited())
                } else {
                    Ok::<u32, ClientError>(99)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 99);
        assert_eq!(call_count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn reports_attempt_count_after_exhausting_budget() {
        let call_count = Arc::new(AtomicU32::new(0));
        let cc = Arc::clone(&call_count);
        let result = retry_with_backoff(&no_wait_policy(2), || {
            let cc = Arc::clone(&cc);
            async move {
                cc.fetch_add(1, Ordering::SeqCst);
                Err::<u32, ClientError>(rate_limited())
            }
        })
        .await;
        // max_retries=2 → 3 total attempts.
        assert_eq!(call_count.load(Ordering::SeqCst), 3);
        let err = result.unwrap_err();
        assert_eq!(err.attempts, 3);
        assert!(matches!(err.last, ClientError::RateLimited { .. }));
    }

    #[tokio::test]
    async fn does_not_retry_non_transient_error() {
        let call_count = Arc::new(AtomicU32::new(0));
        let cc = Arc::clone(&call_count);
        let result = retry_with_backoff(&no_wait_policy(3), || {
            let cc = Arc::clone(&cc);
            async move {
                cc.fetch_add(1, Ordering::SeqCst);
                Err::<u32, ClientError>(ClientError::CursorExpired)
            }
        })
        .await;
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
        let err = result.unwrap_err();
        assert_eq!(err.attempts, 1);
        assert!(matches!(err.last, ClientError::CursorExpired));
    }

    #[tokio::test]
    async fn does_not_retry_malformed_page() {
        let result = retry_with_backoff(&no_wait_policy(3), || async {
            Err::<u32, ClientError>(ClientError::MalformedPage {
                context: "test".to_owned(),
                next_after: None,
            })
        })
        .await;
        assert!(matches!(
            result.unwrap_err().last,
            ClientError::MalformedPage { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn honors_server_retry_hint() {
        let call_count = Arc::new(AtomicU32::new(0));
        let cc = Arc::clone(&call_count);
        let policy = BackoffPolicy {
            max_retries: 1,
            base_ms: 1,
            cap_ms: 60_000,
        };
        let started = tokio::time::Instant::now();
        let _ = retry_with_backoff(&policy, || {
            let cc = Arc::clone(&cc);
            async move {
                cc.fetch_add(1, Ordering::SeqCst);
                Err::<u32, ClientError>(ClientError::RateLimited {
                    retry_after_secs: 7,
                })
            }
        })
        .await;
        // One retry separated by the 7 s server hint rather than base_ms.
        assert_eq!(call_count.load(Ordering::SeqCst), 2);
        assert!(started.elapsed() >= Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn caps_oversized_server_retry_hint() {
        let policy = BackoffPolicy {
            max_retries: 1,
            base_ms: 1,
            cap_ms: 5_000,
        };
        let started = tokio::time::Instant::now();
        let _ = retry_with_backoff(&policy, || async {
            // A day-long Retry-After must not be honored verbatim.
            Err::<u32, ClientError>(ClientError::RateLimited {
                retry_after_secs: 86_400,
            })
        })
        .await;
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(5));
        assert!(waited < Duration::from_secs(60));
    }
}
