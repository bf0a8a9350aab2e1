//! Sliding-window rate limiter shared by the page fetcher and every
//! download worker.
//!
//! One limiter instance is scoped to one remote service quota: the archive
//! API and the media hosts each get their own. Waiters are served in FIFO
//! order — the window state sits behind a `tokio::sync::Mutex`, which queues
//! waiters fairly, and the holder sleeps with the lock held until its slot
//! opens. That bounds worst-case wait at `queue position × window / max`.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    grants: tokio::sync::Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Creates a limiter allowing at most `max_requests` acquisitions per
    /// sliding `window`.
    ///
    /// # Panics
    ///
    /// Panics if `max_requests` is zero — such a limiter could never grant.
    #[must_use]
    pub fn new(max_requests: usize, window: Duration) -> Self {
        assert!(max_requests > 0, "rate limiter requires max_requests >= 1");
        Self {
            max_requests,
            window,
            grants: tokio::sync::Mutex::new(VecDeque::with_capacity(max_requests)),
        }
    }

    /// Waits until a request slot is free under the configured window, then
    /// consumes it.
    ///
    /// Never fails. Cancellation-safe: a caller dropped while waiting has
    /// not consumed a slot.
    pub async fn acquire(&self) {
        let mut grants = self.grants.lock().await;
        loop {
            let now = Instant::now();
            while grants
                .front()
                .is_some_and(|&t| now.duration_since(t) >= self.window)
            {
                grants.pop_front();
            }
            if grants.len() < self.max_requests {
                grants.push_back(now);
                return;
            }
            // Full window: sleep until the oldest grant expires. Holding the
            // lock across the sleep keeps later callers queued behind us.
            let oldest = *grants.front().unwrap_or(&now);
            tokio::time::sleep_until(oldest + self.window).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn grants_up_to_limit_without_waiting() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        let started = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn m_requests_take_at_least_the_bounded_rate_floor() {
        // 5 requests at 2 per 10 s must take at least ceil(5/2 - 1) * 10 = 20 s.
        let limiter = RateLimiter::new(2, Duration::from_secs(10));
        let started = Instant::now();
        for _ in 0..5 {
            limiter.acquire().await;
        }
        assert!(
            started.elapsed() >= Duration::from_secs(20),
            "elapsed {:?} under the bounded-rate floor",
            started.elapsed()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn window_slides_rather_than_resets() {
        let limiter = RateLimiter::new(1, Duration::from_secs(10));
        limiter.acquire().await;
        tokio::time::advance(Duration::from_secs(10)).await;
        let started = Instant::now();
        limiter.acquire().await;
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_are_all_served() {
        let limiter = std::sync::Arc::new(RateLimiter::new(2, Duration::from_secs(5)));
        let mut handles = Vec::new();
        for _ in 0..6 {
            let limiter = std::sync::Arc::clone(&limiter);
            handles.push(tokio::spawn(async move {
                limiter.acquire().await;
                Instant::now()
            }));
        }
        let started = Instant::now();
        let mut grant_times = Vec::new();
        for h in handles {
            grant_times.push(h.await.expect("task panicked"));
        }
        // 6 requests at 2 per 5 s: the last grant lands at or after +10 s.
        let last = grant_times.iter().max().copied().unwrap_or(started);
        assert!(last.duration_since(started) >= Duration::from_secs(10));
    }
}
