use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::warn;

use crate::proxy::ProxyPool;
use crate::retry::{self, CallError, FetchOutcome, RetryPolicy};

/// The native coin and staking principals use a fixed precision of 9.
pub const NATIVE_DECIMALS: u8 = 9;

/// Account-level queries tolerate slower full-node responses.
const BALANCE_TIMEOUT: Duration = Duration::from_secs(10);
/// Token balance and metadata lookups are cheap; fail them faster.
const TOKEN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    result: Option<Value>,
}

/// Sui JSON-RPC 2.0 client. Every method degrades to zero/unknown on
/// terminal failure instead of surfacing an error; the report must always
/// include every wallet.
pub struct RpcClient {
    url: String,
    policy: RetryPolicy,
}

impl RpcClient {
    pub fn new(url: &str, policy: RetryPolicy) -> Self {
        Self {
            url: url.to_string(),
            policy,
        }
    }

    /// One JSON-RPC call through the proxy rotation. `Success(None)` means the
    /// node answered without a `result` field, which callers treat as
    /// zero/unknown rather than an error.
    async fn call(
        &self,
        pool: &ProxyPool,
        start_index: usize,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> FetchOutcome<Option<Value>> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        retry::run_with_rotation(&self.policy, pool, start_index, method, |route| {
            let url = self.url.clone();
            let payload = payload.clone();
            async move {
                let response = route
                    .client
                    .post(&url)
                    .timeout(timeout)
                    .json(&payload)
                    .send()
                    .await
                    .map_err(|e| CallError::Transient(e.to_string()))?;
                let response = response
                    .error_for_status()
                    .map_err(|e| CallError::Transient(e.to_string()))?;
                let envelope: RpcEnvelope = response
                    .json()
                    .await
                    .map_err(|e| CallError::Transient(e.to_string()))?;
                Ok(envelope.result)
            }
        })
        .await
    }

    /// Liquid SUI balance in whole coins.
    pub async fn get_sui_balance(
        &self,
        pool: &ProxyPool,
        start_index: usize,
        address: &str,
    ) -> f64 {
        match self
            .call(
                pool,
                start_index,
                "suix_getBalance",
                json!([address]),
                BALANCE_TIMEOUT,
            )
            .await
        {
            FetchOutcome::Success(result) => {
                scale(total_balance(result.as_ref()), NATIVE_DECIMALS)
            }
            FetchOutcome::Exhausted => {
                warn!("SUI balance unavailable for {}", address);
                0.0
            }
        }
    }

    /// Sum of staking principals across all validators, in whole coins.
    pub async fn get_staked_sui(
        &self,
        pool: &ProxyPool,
        start_index: usize,
        address: &str,
    ) -> f64 {
        match self
            .call(
                pool,
                start_index,
                "suix_getStakes",
                json!([address]),
                BALANCE_TIMEOUT,
            )
            .await
        {
            FetchOutcome::Success(result) => {
                scale(staked_principal(result.as_ref()), NATIVE_DECIMALS)
            }
            FetchOutcome::Exhausted => {
                warn!("Staked SUI unavailable for {}", address);
                0.0
            }
        }
    }

    /// Token balance converted with the caller-resolved precision.
    pub async fn get_token_balance(
        &self,
        pool: &ProxyPool,
        start_index: usize,
        address: &str,
        token_type: &str,
        decimals: u8,
    ) -> f64 {
        match self
            .call(
                pool,
                start_index,
                "suix_getBalance",
                json!([address, token_type]),
                TOKEN_TIMEOUT,
            )
            .await
        {
            FetchOutcome::Success(result) => scale(total_balance(result.as_ref()), decimals),
            FetchOutcome::Exhausted => {
                warn!("Balance of {} unavailable for {}", token_type, address);
                0.0
            }
        }
    }

    /// Decimal precision from coin metadata. `Success(None)` means the node
    /// knows nothing about this token; the cache layer decides the fallback.
    pub async fn get_coin_decimals(
        &self,
        pool: &ProxyPool,
        start_index: usize,
        token_type: &str,
    ) -> FetchOutcome<Option<u8>> {
        match self
            .call(
                pool,
                start_index,
                "suix_getCoinMetadata",
                json!([token_type]),
                TOKEN_TIMEOUT,
            )
            .await
        {
            FetchOutcome::Success(result) => FetchOutcome::Success(
                result
                    .as_ref()
                    .and_then(|v| v.get("decimals"))
                    .and_then(Value::as_u64)
                    .map(|d| d as u8),
            ),
            FetchOutcome::Exhausted => FetchOutcome::Exhausted,
        }
    }
}

fn scale(raw: u128, decimals: u8) -> f64 {
    raw as f64 / 10f64.powi(decimals as i32)
}

/// Reads `result.totalBalance`; absence is zero, not an error.
fn total_balance(result: Option<&Value>) -> u128 {
    result
        .and_then(|v| v.get("totalBalance"))
        .map(amount_u128)
        .unwrap_or(0)
}

/// Sums `result[].stakes[].principal`.
fn staked_principal(result: Option<&Value>) -> u128 {
    let Some(Value::Array(delegations)) = result else {
        return 0;
    };
    delegations
        .iter()
        .flat_map(|delegation| {
            delegation
                .get("stakes")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
        })
        .map(|stake| stake.get("principal").map(amount_u128).unwrap_or(0))
        .sum()
}

/// The node serializes amounts as integer strings; accept bare numbers too.
fn amount_u128(value: &Value) -> u128 {
    match value {
        Value::String(s) => s.parse().unwrap_or(0),
        Value::Number(n) => n.as_u64().map(u128::from).unwrap_or(0),
        _ => 0,
    }
}
