use anyhow::Result;
use std::env;
use std::time::Duration;

use crate::retry::RetryPolicy;

const DEFAULT_SUI_RPC_URL: &str = "https://fullnode.mainnet.sui.io:443";
const DEFAULT_COINGECKO_API_URL: &str = "https://api.coingecko.com/api/v3/simple/price";

#[derive(Clone, Debug)]
pub struct Config {
    pub sui_rpc_url: String,
    pub coingecko_api_url: String,
    pub vs_currency: String,

    pub wallets_file: String,
    pub tokens_file: String,
    pub proxies_file: String,

    /// Seconds a fetched price snapshot stays valid.
    pub price_cache_ttl_secs: u64,
    /// Minimum aggregate fiat value for a token to earn a report column.
    pub min_token_value: f64,

    pub max_workers: usize,
    pub max_retries: u32,
    pub retry_backoff_secs: u64,
    pub rate_limit_cooldown_secs: u64,
}

impl Config {
    pub fn load() -> Result<Self> {
        Ok(Self {
            sui_rpc_url: env::var("SUI_RPC_URL")
                .unwrap_or_else(|_| DEFAULT_SUI_RPC_URL.to_string()),
            coingecko_api_url: env::var("COINGECKO_API_URL")
                .unwrap_or_else(|_| DEFAULT_COINGECKO_API_URL.to_string()),
            vs_currency: env::var("VS_CURRENCY").unwrap_or_else(|_| "usd".to_string()),

            wallets_file: env::var("WALLETS_FILE").unwrap_or_else(|_| "wallets.txt".to_string()),
            tokens_file: env::var("TOKENS_FILE").unwrap_or_else(|_| "tokens.txt".to_string()),
            proxies_file: env::var("PROXIES_FILE").unwrap_or_else(|_| "proxies.txt".to_string()),

            price_cache_ttl_secs: env::var("PRICE_CACHE_TTL_SECS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .unwrap_or(300),
            min_token_value: env::var("MIN_TOKEN_VALUE")
                .unwrap_or_else(|_| "0.05".to_string())
                .parse()
                .unwrap_or(0.05),

            max_workers: env::var("MAX_WORKERS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),
            max_retries: env::var("MAX_RETRIES")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .unwrap_or(3),
            retry_backoff_secs: env::var("RETRY_BACKOFF_SECS")
                .unwrap_or_else(|_| "2".to_string())
                .parse()
                .unwrap_or(2),
            rate_limit_cooldown_secs: env::var("RATE_LIMIT_COOLDOWN_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .unwrap_or(60),
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries.max(1),
            backoff: Duration::from_secs(self.retry_backoff_secs),
            rate_limit_cooldown: Duration::from_secs(self.rate_limit_cooldown_secs),
        }
    }
}
