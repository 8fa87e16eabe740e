use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::retry::FetchOutcome;

/// Precision assumed for tokens whose metadata cannot be resolved.
pub const DEFAULT_DECIMALS: u8 = 9;

struct Snapshot {
    prices: HashMap<String, f64>,
    fetched_at: Instant,
}

/// Time-bounded cache of one whole price snapshot. Keyed by time only: a
/// fresh snapshot is returned regardless of the requested symbol set, since
/// one run always asks for the same global set.
pub struct PriceCache {
    ttl: Duration,
    inner: Mutex<Option<Snapshot>>,
}

impl PriceCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: Mutex::new(None),
        }
    }

    /// Returns the cached snapshot when fresh, otherwise refreshes it with
    /// one batched call. The lock is held across the refresh so concurrent
    /// callers racing a miss wait for the first refresh instead of issuing
    /// their own. A failed refresh returns zero prices without stamping the
    /// cache, leaving the next caller free to try again.
    pub async fn get_or_refresh<F, Fut>(
        &self,
        symbols: &[String],
        refresh: F,
    ) -> HashMap<String, f64>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Option<HashMap<String, f64>>>,
    {
        let mut guard = self.inner.lock().await;
        if let Some(snapshot) = guard.as_ref() {
            if snapshot.fetched_at.elapsed() < self.ttl {
                debug!("Price cache hit");
                return snapshot.prices.clone();
            }
        }
        match refresh().await {
            Some(prices) => {
                *guard = Some(Snapshot {
                    prices: prices.clone(),
                    fetched_at: Instant::now(),
                });
                prices
            }
            None => {
                warn!("Price refresh failed; reporting prices as unavailable");
                symbols.iter().map(|s| (s.clone(), 0.0)).collect()
            }
        }
    }
}

/// Write-once cache of token type -> decimal precision. Warmed sequentially
/// before the parallel fetch phase, so fetch-time reads hit a populated map.
/// A failed lookup memoizes the fallback: "unknown, assume default" is a
/// result too, not something to re-ask on every balance conversion.
pub struct DecimalsCache {
    inner: Mutex<HashMap<String, u8>>,
}

impl DecimalsCache {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Fast read for the fetch phase.
    pub async fn get(&self, token_type: &str) -> Option<u8> {
        self.inner.lock().await.get(token_type).copied()
    }

    pub async fn get_or_fetch<F, Fut>(&self, token_type: &str, fetch: F) -> u8
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FetchOutcome<Option<u8>>>,
    {
        if let Some(decimals) = self.inner.lock().await.get(token_type).copied() {
            return decimals;
        }
        let resolved = match fetch().await {
            FetchOutcome::Success(Some(decimals)) => decimals,
            FetchOutcome::Success(None) => {
                warn!(
                    "No metadata for {}; assuming {} decimals",
                    token_type, DEFAULT_DECIMALS
                );
                DEFAULT_DECIMALS
            }
            FetchOutcome::Exhausted => {
                warn!(
                    "Decimals lookup failed for {}; assuming {} decimals",
                    token_type, DEFAULT_DECIMALS
                );
                DEFAULT_DECIMALS
            }
        };
        self.inner
            .lock()
            .await
            .insert(token_type.to_string(), resolved);
        resolved
    }
}

impl Default for DecimalsCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn symbols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn decimals_lookup_is_memoized() {
        let cache = DecimalsCache::new();
        let calls = Arc::new(AtomicU32::new(0));

        let counter = calls.clone();
        let first = cache
            .get_or_fetch("0x2::usdc::USDC", || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                FetchOutcome::Success(Some(6))
            })
            .await;
        assert_eq!(first, 6);

        let counter = calls.clone();
        let second = cache
            .get_or_fetch("0x2::usdc::USDC", || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                FetchOutcome::Success(Some(0))
            })
            .await;
        assert_eq!(second, 6);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.get("0x2::usdc::USDC").await, Some(6));
    }

    #[tokio::test]
    async fn failed_lookup_memoizes_the_fallback() {
        let cache = DecimalsCache::new();
        let calls = Arc::new(AtomicU32::new(0));

        let counter = calls.clone();
        let first = cache
            .get_or_fetch("0xdead::beef::BEEF", || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                FetchOutcome::Exhausted
            })
            .await;
        assert_eq!(first, DEFAULT_DECIMALS);

        // Second call never re-issues the remote lookup.
        let counter = calls.clone();
        let second = cache
            .get_or_fetch("0xdead::beef::BEEF", || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                FetchOutcome::Success(Some(2))
            })
            .await;
        assert_eq!(second, DEFAULT_DECIMALS);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fresh_snapshot_is_served_without_refresh() {
        let cache = PriceCache::new(Duration::from_secs(300));
        let seed: HashMap<String, f64> = [("SUI".to_string(), 1.5)].into_iter().collect();
        let seeded = seed.clone();
        let first = cache
            .get_or_refresh(&symbols(&["SUI"]), || async move { Some(seeded) })
            .await;
        assert_eq!(first, seed);

        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let second = cache
            .get_or_refresh(&symbols(&["SUI"]), || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Some(HashMap::new())
            })
            .await;
        assert_eq!(second, seed);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_refresh_returns_zeros_without_stamping() {
        let cache = PriceCache::new(Duration::from_secs(300));
        let first = cache
            .get_or_refresh(&symbols(&["SUI", "USDC"]), || async { None })
            .await;
        assert_eq!(first["SUI"], 0.0);
        assert_eq!(first["USDC"], 0.0);

        // The failure was not cached; the next call refreshes for real.
        let second = cache
            .get_or_refresh(&symbols(&["SUI", "USDC"]), || async {
                Some([("SUI".to_string(), 2.0), ("USDC".to_string(), 1.0)]
                    .into_iter()
                    .collect())
            })
            .await;
        assert_eq!(second["SUI"], 2.0);
    }

    #[tokio::test]
    async fn racing_callers_share_a_single_refresh() {
        let cache = Arc::new(PriceCache::new(Duration::from_secs(300)));
        let calls = Arc::new(AtomicU32::new(0));

        let make = |cache: Arc<PriceCache>, calls: Arc<AtomicU32>| async move {
            cache
                .get_or_refresh(&symbols(&["SUI"]), || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::task::yield_now().await;
                    Some([("SUI".to_string(), 1.5)].into_iter().collect())
                })
                .await
        };

        let (a, b) = tokio::join!(
            make(cache.clone(), calls.clone()),
            make(cache.clone(), calls.clone())
        );
        assert_eq!(a["SUI"], 1.5);
        assert_eq!(b["SUI"], 1.5);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
