use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::proxy::{ProxyPool, ProxyRoute};

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Attempts per proxy route before moving to the next one.
    pub max_retries: u32,
    /// Fixed delay between transient failures.
    pub backoff: Duration,
    /// Cooldown after an explicit rate-limit signal. Does not consume an
    /// attempt; the price feed asks us to wait, not to give up.
    pub rate_limit_cooldown: Duration,
}

/// Why a single attempt failed.
#[derive(Debug)]
pub enum CallError {
    /// Timeout or connection failure; retried after the backoff.
    Transient(String),
    /// HTTP 429; the executor cools down and repeats the same attempt.
    RateLimited,
    /// The remote answered with a non-retryable error; the whole rotation is
    /// abandoned.
    Fatal(String),
}

/// Tagged result of a rotation: callers interpret `Exhausted` as
/// "treat as zero / unavailable", never as a crash.
#[derive(Debug, PartialEq)]
pub enum FetchOutcome<T> {
    Success(T),
    Exhausted,
}

impl<T> FetchOutcome<T> {
    pub fn unwrap_or(self, fallback: T) -> T {
        match self {
            FetchOutcome::Success(value) => value,
            FetchOutcome::Exhausted => fallback,
        }
    }
}

/// Runs one logical remote call across the proxy rotation.
///
/// Attempts are nested outer-loop-over-proxies, inner-loop-over-retries:
/// exhausting the retry budget on one proxy moves to the next proxy starting
/// from `start_index`, so different callers spread load across the pool. An
/// empty pool runs the same loop over the single direct route.
pub async fn run_with_rotation<T, F, Fut>(
    policy: &RetryPolicy,
    pool: &ProxyPool,
    start_index: usize,
    what: &str,
    op: F,
) -> FetchOutcome<T>
where
    F: Fn(ProxyRoute) -> Fut,
    Fut: Future<Output = Result<T, CallError>>,
{
    for route in pool.routes(start_index) {
        let mut attempt = 0;
        while attempt < policy.max_retries {
            match op(route.clone()).await {
                Ok(value) => return FetchOutcome::Success(value),
                Err(CallError::RateLimited) => {
                    warn!(
                        "{} rate limited; cooling down for {}s",
                        what,
                        policy.rate_limit_cooldown.as_secs()
                    );
                    sleep(policy.rate_limit_cooldown).await;
                }
                Err(CallError::Fatal(reason)) => {
                    warn!("{} failed terminally via {}: {}", what, route.describe(), reason);
                    return FetchOutcome::Exhausted;
                }
                Err(CallError::Transient(reason)) => {
                    attempt += 1;
                    debug!(
                        "{} attempt {}/{} via {} failed: {}",
                        what,
                        attempt,
                        policy.max_retries,
                        route.describe(),
                        reason
                    );
                    if attempt < policy.max_retries {
                        sleep(policy.backoff).await;
                    }
                }
            }
        }
        warn!(
            "{} exhausted {} attempts via {}",
            what,
            policy.max_retries,
            route.describe()
        );
    }
    FetchOutcome::Exhausted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::{ProxyEndpoint, ProxyPool};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            backoff: Duration::from_secs(2),
            rate_limit_cooldown: Duration::from_secs(60),
        }
    }

    fn pool_of(size: usize) -> ProxyPool {
        let endpoints = (0..size)
            .map(|i| ProxyEndpoint {
                label: format!("proxy-{}:8080", i),
                client: reqwest::Client::new(),
            })
            .collect();
        ProxyPool::from_endpoints(endpoints)
    }

    /// An operation failing deterministically `failures` times, then
    /// succeeding with the total number of calls made.
    fn flaky(failures: u32) -> (Arc<AtomicU32>, impl Fn(crate::proxy::ProxyRoute) -> std::pin::Pin<Box<dyn Future<Output = Result<u32, CallError>> + Send>>) {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let op = move |_route: crate::proxy::ProxyRoute| {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            Box::pin(async move {
                if n <= failures {
                    Err(CallError::Transient("connection reset".to_string()))
                } else {
                    Ok(n)
                }
            }) as std::pin::Pin<Box<dyn Future<Output = Result<u32, CallError>> + Send>>
        };
        (calls, op)
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures_within_budget() {
        let (calls, op) = flaky(2);
        let outcome = run_with_rotation(&policy(), &ProxyPool::unproxied(), 0, "test", op).await;
        assert_eq!(outcome, FetchOutcome::Success(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_after_max_retries_unproxied() {
        let (calls, op) = flaky(3);
        let outcome = run_with_rotation(&policy(), &ProxyPool::unproxied(), 0, "test", op).await;
        assert_eq!(outcome, FetchOutcome::Exhausted);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn rotation_extends_budget_across_proxies() {
        // 5 failures fit inside 3 retries x 2 proxies.
        let (_, op) = flaky(5);
        let outcome = run_with_rotation(&policy(), &pool_of(2), 0, "test", op).await;
        assert_eq!(outcome, FetchOutcome::Success(6));

        // 6 failures exhaust both proxies.
        let (calls, op) = flaky(6);
        let outcome = run_with_rotation(&policy(), &pool_of(2), 0, "test", op).await;
        assert_eq!(outcome, FetchOutcome::Exhausted);
        assert_eq!(calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_does_not_consume_an_attempt() {
        // With a budget of one attempt, a 429 followed by success must still
        // succeed: the cooldown repeats the attempt instead of spending it.
        let tight = RetryPolicy {
            max_retries: 1,
            ..policy()
        };
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let op = move |_route: crate::proxy::ProxyRoute| {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            Box::pin(async move {
                if n == 1 {
                    Err(CallError::RateLimited)
                } else {
                    Ok(n)
                }
            }) as std::pin::Pin<Box<dyn Future<Output = Result<u32, CallError>> + Send>>
        };
        let outcome = run_with_rotation(&tight, &ProxyPool::unproxied(), 0, "test", op).await;
        assert_eq!(outcome, FetchOutcome::Success(2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_error_abandons_the_rotation() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let op = move |_route: crate::proxy::ProxyRoute| {
            counter.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                Err::<u32, _>(CallError::Fatal("400 Bad Request".to_string()))
            }) as std::pin::Pin<Box<dyn Future<Output = Result<u32, CallError>> + Send>>
        };
        let outcome = run_with_rotation(&policy(), &pool_of(3), 0, "test", op).await;
        assert_eq!(outcome, FetchOutcome::Exhausted);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unwrap_or_degrades_exhaustion_to_fallback() {
        assert_eq!(FetchOutcome::Success(7.5).unwrap_or(0.0), 7.5);
        assert_eq!(FetchOutcome::<f64>::Exhausted.unwrap_or(0.0), 0.0);
    }
}
