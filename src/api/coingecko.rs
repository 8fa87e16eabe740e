use lazy_static::lazy_static;
use reqwest::StatusCode;
use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;

use crate::proxy::ProxyPool;
use crate::retry::{self, CallError, FetchOutcome, RetryPolicy};

const PRICE_TIMEOUT: Duration = Duration::from_secs(5);

lazy_static! {
    /// Well-known symbols mapped to their CoinGecko identifiers. Anything
    /// unmapped falls back to the lower-cased symbol.
    static ref SYMBOL_TO_ID: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        m.insert("SUI", "sui");
        m.insert("USDC", "usd-coin");
        m.insert("USDT", "tether");
        m.insert("BUCK", "bucket-protocol-buck-stablecoin");
        m.insert("AFSUI", "aftermath-staked-sui");
        m.insert("NS", "suins-token");
        m.insert("WAL", "walrus-2");
        m.insert("CERT", "volo-staked-sui");
        m
    };
}

/// One batched `simple/price` response: id -> currency -> price.
type PriceResponse = HashMap<String, HashMap<String, f64>>;

/// CoinGecko-style REST price feed. HTTP 429 triggers the cooldown-and-retry
/// policy; other HTTP errors abandon the lookup immediately, matching the
/// feed's behavior of rejecting malformed id lists outright.
pub struct PriceFeedClient {
    base_url: String,
    currency: String,
    policy: RetryPolicy,
}

impl PriceFeedClient {
    pub fn new(base_url: &str, currency: &str, policy: RetryPolicy) -> Self {
        Self {
            base_url: base_url.to_string(),
            currency: currency.to_string(),
            policy,
        }
    }

    pub fn feed_id(symbol: &str) -> String {
        SYMBOL_TO_ID
            .get(symbol)
            .map(|id| id.to_string())
            .unwrap_or_else(|| symbol.to_lowercase())
    }

    /// Fetches every symbol in one batched call. `None` means the feed is
    /// unreachable; the caller reports prices as unavailable without stamping
    /// its cache.
    pub async fn fetch_prices(
        &self,
        pool: &ProxyPool,
        symbols: &[String],
    ) -> Option<HashMap<String, f64>> {
        let ids: Vec<String> = symbols.iter().map(|s| Self::feed_id(s)).collect();
        let url = format!(
            "{}?ids={}&vs_currencies={}",
            self.base_url,
            ids.join(","),
            self.currency
        );

        let outcome = retry::run_with_rotation(&self.policy, pool, 0, "simple/price", |route| {
            let url = url.clone();
            async move {
                let response = route
                    .client
                    .get(&url)
                    .timeout(PRICE_TIMEOUT)
                    .send()
                    .await
                    .map_err(|e| CallError::Transient(e.to_string()))?;
                if response.status() == StatusCode::TOO_MANY_REQUESTS {
                    return Err(CallError::RateLimited);
                }
                let response = response
                    .error_for_status()
                    .map_err(|e| CallError::Fatal(e.to_string()))?;
                let body: PriceResponse = response
                    .json()
                    .await
                    .map_err(|e| CallError::Transient(e.to_string()))?;
                Ok(body)
            }
        })
        .await;

        match outcome {
            FetchOutcome::Success(body) => Some(
                symbols
                    .iter()
                    .map(|symbol| {
                        let id = Self::feed_id(symbol);
                        let price = body
                            .get(&id)
                            .and_then(|quotes| quotes.get(&self.currency))
                            .copied()
                            .unwrap_or(0.0);
                        (symbol.clone(), price)
                    })
                    .collect(),
            ),
            FetchOutcome::Exhausted => {
                warn!("Price feed unavailable for {} symbols", symbols.len());
                None
            }
        }
    }
}
