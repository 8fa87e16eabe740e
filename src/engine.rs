use indicatif::ProgressBar;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::error;

use crate::fetcher::BalanceFetcher;
use crate::models::{token_symbol, BalanceRecord, PortfolioTotals};

/// Everything the reporting layer needs from one run.
pub struct RunSummary {
    /// One record per wallet, in original input order.
    pub records: Vec<BalanceRecord>,
    pub totals: PortfolioTotals,
    /// Token types that earned a report column.
    pub significant_tokens: Vec<String>,
}

/// Runs the fetcher over the whole batch under a fixed worker budget.
/// Sub-queries are sequential within a wallet, parallel across wallets;
/// completion order is unconstrained, so results land in a slot array indexed
/// by input position and totals are folded only on the collecting task.
pub struct AggregationEngine {
    fetcher: Arc<BalanceFetcher>,
    max_workers: usize,
    min_token_value: f64,
}

impl AggregationEngine {
    pub fn new(fetcher: Arc<BalanceFetcher>, max_workers: usize, min_token_value: f64) -> Self {
        Self {
            fetcher,
            max_workers: max_workers.max(1),
            min_token_value,
        }
    }

    pub async fn run(
        &self,
        wallets: &[String],
        token_types: &[String],
        prices: &HashMap<String, f64>,
        progress: Option<ProgressBar>,
    ) -> RunSummary {
        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let shared_tokens = Arc::new(token_types.to_vec());
        let shared_prices = Arc::new(prices.clone());

        let mut tasks = JoinSet::new();
        for (position, wallet) in wallets.iter().enumerate() {
            let fetcher = self.fetcher.clone();
            let semaphore = semaphore.clone();
            let tokens = shared_tokens.clone();
            let prices = shared_prices.clone();
            let wallet = wallet.clone();
            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("worker semaphore closed");
                let record = fetcher
                    .fetch_wallet(position + 1, &wallet, &tokens, &prices)
                    .await;
                (position, record)
            });
        }

        let mut slots: Vec<Option<BalanceRecord>> = Vec::with_capacity(wallets.len());
        slots.resize_with(wallets.len(), || None);
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((position, record)) => slots[position] = Some(record),
                Err(e) => error!("Wallet task failed: {}", e),
            }
            if let Some(bar) = &progress {
                bar.inc(1);
            }
        }

        let records: Vec<BalanceRecord> = slots.into_iter().flatten().collect();
        let mut totals = PortfolioTotals::new(token_types);
        for record in &records {
            totals.fold(record);
        }
        let significant_tokens =
            significant_tokens(&records, token_types, prices, self.min_token_value);
        RunSummary {
            records,
            totals,
            significant_tokens,
        }
    }
}

/// A token earns a report column iff some wallet holds a non-zero balance and
/// its aggregate fiat value clears the threshold. Hidden tokens still count
/// toward the internal totals.
pub fn significant_tokens(
    records: &[BalanceRecord],
    token_types: &[String],
    prices: &HashMap<String, f64>,
    min_token_value: f64,
) -> Vec<String> {
    token_types
        .iter()
        .filter(|token| {
            let total: f64 = records
                .iter()
                .map(|r| r.tokens.get(*token).copied().unwrap_or(0.0))
                .sum();
            let any_non_zero = records
                .iter()
                .any(|r| r.tokens.get(*token).copied().unwrap_or(0.0) > 0.0);
            let price = prices
                .get(&token_symbol(token))
                .copied()
                .unwrap_or(0.0);
            any_non_zero && total * price > min_token_value
        })
        .cloned()
        .collect()
}
