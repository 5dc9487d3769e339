//! # Retrying Fetch Layer
//!
//! Wraps a [`FeedClient`] with bounded retry, linear backoff and
//! single-flight cancellation, and normalizes raw responses into
//! [`FeedPage`]s.
//!
//! # Developer Note
//! Only one fetch is in flight at a time. Starting a fetch cancels the
//! previous one; the superseded call resolves to `Ok(None)` instead of an
//! error, so callers never see `AppError::Cancelled`.

use crate::error::{AppError, Result};
use crate::models::{FeedPage, PageQuery};
use crate::traits::FeedClient;
use chrono::Utc;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Retry ceiling and backoff step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    /// Wait after the given failed attempt (1-based): `attempt × base_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

pub struct RetryingFetcher {
    client: Arc<dyn FeedClient>,
    policy: RetryPolicy,
    /// Token of the most recent fetch; cancelling it tears that fetch down.
    in_flight: Mutex<CancellationToken>,
}

impl RetryingFetcher {
    pub fn new(client: Arc<dyn FeedClient>, policy: RetryPolicy) -> Self {
        Self {
            client,
            policy,
            in_flight: Mutex::new(CancellationToken::new()),
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Fetches one page, superseding any fetch still in flight.
    ///
    /// Returns `Ok(None)` when this fetch was itself superseded or
    /// cancelled, and the last failure once every attempt is spent.
    pub async fn fetch_page(&self, query: PageQuery) -> Result<Option<FeedPage>> {
        let token = self.supersede();
        match self.run(&query, &token).await {
            Ok(page) => Ok(Some(page)),
            Err(AppError::Cancelled) => {
                debug!(page = query.page, "fetch superseded");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Cancels the fetch in flight, if any.
    pub fn cancel(&self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
    }

    fn supersede(&self) -> CancellationToken {
        let fresh = CancellationToken::new();
        let previous = std::mem::replace(
            &mut *self.in_flight.lock().unwrap_or_else(PoisonError::into_inner),
            fresh.clone(),
        );
        previous.cancel();
        fresh
    }

    async fn run(&self, query: &PageQuery, token: &CancellationToken) -> Result<FeedPage> {
        let mut attempt = 1;
        loop {
            let outcome = tokio::select! {
                biased;
                _ = token.cancelled() => Err(AppError::Cancelled),
                result = self.client.fetch_page(query) => result,
            };

            let err = match outcome {
                Ok(raw) => {
                    let page = FeedPage::from_raw(query, raw, Utc::now());
                    debug!(page = page.page, items = page.images.len(), has_more = page.has_more, "page fetched");
                    return Ok(page);
                }
                Err(err) if err.is_cancelled() => return Err(err),
                Err(err) => err,
            };

            if attempt >= self.policy.max_attempts {
                warn!(page = query.page, attempt, error = %err, "giving up on page fetch");
                return Err(err);
            }

            let delay = self.policy.delay_for(attempt);
            warn!(page = query.page, attempt, delay_ms = delay.as_millis() as u64, error = %err, "page fetch failed, retrying");
            tokio::select! {
                biased;
                _ = token.cancelled() => return Err(AppError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RawFeedResponse;
    use crate::test_support::raw_page;
    use crate::traits::MockFeedClient;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn query(page: u32) -> PageQuery {
        PageQuery { page, page_size: 3, order_by: 2, order_ascending: false }
    }

    fn network_error() -> AppError {
        AppError::Network { message: "connection reset".into(), code: None }
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_failures_then_success_waits_twice() {
        let calls = Arc::new(Mutex::new(Vec::<Instant>::new()));
        let recorded = calls.clone();
        let mut client = MockFeedClient::new();
        client.expect_fetch_page().times(3).returning(move |_| {
            let mut calls = recorded.lock().unwrap();
            calls.push(Instant::now());
            if calls.len() < 3 {
                Err(AppError::Network { message: "connection reset".into(), code: None })
            } else {
                Ok(RawFeedResponse { items: raw_page(0, 3), total_count: Some(10) })
            }
        });

        let policy = RetryPolicy { max_attempts: 3, base_delay: Duration::from_millis(100) };
        let fetcher = RetryingFetcher::new(Arc::new(client), policy);
        let page = fetcher.fetch_page(query(0)).await.unwrap().expect("not superseded");
        assert_eq!(page.images.len(), 3);
        assert!(page.has_more);

        let calls = calls.lock().unwrap();
        let first_delay = calls[1] - calls[0];
        let second_delay = calls[2] - calls[1];
        assert!(first_delay >= Duration::from_millis(100) && first_delay < Duration::from_millis(110));
        assert!(second_delay >= Duration::from_millis(200) && second_delay < Duration::from_millis(210));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_return_last_error() {
        let mut client = MockFeedClient::new();
        client
            .expect_fetch_page()
            .times(3)
            .returning(|_| Err(AppError::Http { status: 503, message: "unavailable".into() }));

        let fetcher = RetryingFetcher::new(Arc::new(client), RetryPolicy::default());
        let err = fetcher.fetch_page(query(0)).await.unwrap_err();
        assert_eq!(err.status(), Some(503));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_is_not_retried() {
        let mut client = MockFeedClient::new();
        client.expect_fetch_page().times(1).returning(|_| Err(AppError::Cancelled));

        let fetcher = RetryingFetcher::new(Arc::new(client), RetryPolicy::default());
        let start = Instant::now();
        assert_eq!(fetcher.fetch_page(query(0)).await.unwrap(), None);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[test]
    fn test_backoff_is_linear() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(3000));
    }

    /// Page 0 never answers; every other page answers immediately.
    #[derive(Default)]
    struct StallingClient {
        stalled: tokio::sync::Notify,
    }

    #[async_trait]
    impl FeedClient for StallingClient {
        async fn fetch_page(&self, query: &PageQuery) -> Result<RawFeedResponse> {
            if query.page == 0 {
                self.stalled.notify_one();
                std::future::pending::<()>().await;
            }
            Ok(RawFeedResponse { items: raw_page(100, 3), total_count: None })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_fetch_supersedes_in_flight_one() {
        let client = Arc::new(StallingClient::default());
        let fetcher = Arc::new(RetryingFetcher::new(client.clone(), RetryPolicy::default()));

        let stalled = tokio::spawn({
            let fetcher = fetcher.clone();
            async move { fetcher.fetch_page(query(0)).await }
        });
        client.stalled.notified().await;

        let fresh = fetcher.fetch_page(query(1)).await.unwrap();
        assert_eq!(fresh.map(|page| page.page), Some(1));
        assert_eq!(stalled.await.unwrap().unwrap(), None);
    }

    struct FailingClient {
        calls: AtomicU32,
    }

    #[async_trait]
    impl FeedClient for FailingClient {
        async fn fetch_page(&self, _query: &PageQuery) -> Result<RawFeedResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(network_error())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff_stops_retrying() {
        let client = Arc::new(FailingClient { calls: AtomicU32::new(0) });
        let fetcher = Arc::new(RetryingFetcher::new(client.clone(), RetryPolicy::default()));

        let pending = tokio::spawn({
            let fetcher = fetcher.clone();
            async move { fetcher.fetch_page(query(0)).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        fetcher.cancel();

        assert_eq!(pending.await.unwrap().unwrap(), None);
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }
}
