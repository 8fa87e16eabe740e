use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::api::rpc::RpcClient;
use crate::cache::{DecimalsCache, DEFAULT_DECIMALS};
use crate::models::{token_symbol, BalanceRecord};
use crate::proxy::ProxyPool;

pub const NATIVE_SYMBOL: &str = "SUI";

/// Liquid-staked SUI wrappers: their balances count toward the SUI-equivalent
/// total alongside raw native and staked amounts.
const AFTERMATH_STAKED_SYMBOL: &str = "AFSUI";
const VOLO_STAKED_SYMBOL: &str = "CERT";

/// Resolves every balance for one wallet: native, staked, then each token in
/// list order, each sub-query retried and proxy-rotated independently.
/// Network failure degrades to zero; a wholly unreachable wallet reports all
/// zeros rather than aborting the run.
pub struct BalanceFetcher {
    rpc: Arc<RpcClient>,
    decimals: Arc<DecimalsCache>,
    pool: Arc<ProxyPool>,
}

impl BalanceFetcher {
    pub fn new(rpc: Arc<RpcClient>, decimals: Arc<DecimalsCache>, pool: Arc<ProxyPool>) -> Self {
        Self {
            rpc,
            decimals,
            pool,
        }
    }

    /// `index` is the wallet's 1-based position in the batch; it seeds the
    /// proxy rotation so different wallets tend to start on different proxies.
    pub async fn fetch_wallet(
        &self,
        index: usize,
        address: &str,
        token_types: &[String],
        prices: &HashMap<String, f64>,
    ) -> BalanceRecord {
        let rotations = self.pool.len().max(1);
        let mut sui = 0.0;
        let mut staked = 0.0;
        let mut token_balances: HashMap<String, f64> = HashMap::new();

        // An all-zero pass is indistinguishable from a dead proxy, so the
        // whole sequence is repeated once per available proxy, stopping at the
        // first non-zero signal. A genuinely empty wallet pays the full cost.
        for attempt in 0..rotations {
            let start_index = index - 1 + attempt;
            sui = self.rpc.get_sui_balance(&self.pool, start_index, address).await;
            staked = self.rpc.get_staked_sui(&self.pool, start_index, address).await;
            token_balances.clear();
            for token in token_types {
                let decimals = self
                    .decimals
                    .get(token)
                    .await
                    .unwrap_or(DEFAULT_DECIMALS);
                let balance = self
                    .rpc
                    .get_token_balance(&self.pool, start_index, address, token, decimals)
                    .await;
                token_balances.insert(token.clone(), balance);
            }
            if sui > 0.0 || staked > 0.0 || token_balances.values().any(|b| *b > 0.0) {
                break;
            }
            if attempt + 1 < rotations {
                warn!(
                    "All balances zero for {} (rotation {}); retrying with next proxy",
                    address,
                    attempt + 1
                );
            }
        }

        let mut af_sui = 0.0;
        let mut v_sui = 0.0;
        let mut total_value = 0.0;
        let sui_price = prices.get(NATIVE_SYMBOL).copied().unwrap_or(0.0);
        if sui_price > 0.0 {
            total_value += (sui + staked) * sui_price;
        }
        for token in token_types {
            let balance = token_balances.get(token).copied().unwrap_or(0.0);
            let symbol = token_symbol(token);
            match symbol.as_str() {
                AFTERMATH_STAKED_SYMBOL => af_sui = balance,
                VOLO_STAKED_SYMBOL => v_sui = balance,
                _ => {}
            }
            let price = prices.get(&symbol).copied().unwrap_or(0.0);
            if price > 0.0 {
                total_value += balance * price;
            }
        }

        let total_sui = sui + staked + af_sui + v_sui;
        debug!(
            "Wallet {} resolved: {} SUI, {} staked, total value {:.2}",
            address, sui, staked, total_value
        );
        BalanceRecord {
            index,
            address: address.to_string(),
            sui,
            staked,
            af_sui,
            v_sui,
            tokens: token_balances,
            total_sui,
            total_value,
        }
    }
}
