use anyhow::{Context, Result};
use dotenv::dotenv;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

mod api;
mod cache;
mod config;
mod engine;
mod error;
mod fetcher;
mod inputs;
mod models;
mod proxy;
mod report;
mod retry;

use crate::api::coingecko::PriceFeedClient;
use crate::api::rpc::RpcClient;
use crate::cache::{DecimalsCache, PriceCache};
use crate::config::Config;
use crate::engine::AggregationEngine;
use crate::error::CheckerError;
use crate::fetcher::{BalanceFetcher, NATIVE_SYMBOL};
use crate::models::token_symbol;
use crate::proxy::ProxyPool;

/// Logs go to a rotating file only; stdout belongs to the progress bars and
/// the final report.
fn init_logging() -> Result<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_appender::rolling::{RollingFileAppender, Rotation};
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let log_dir = std::path::PathBuf::from("./logs");
    std::fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, log_dir, "sui-checker.log");
    let (writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true),
        )
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sui_checker=info".into()),
        )
        .init();
    Ok(guard)
}

/// True when proxies were configured but none survived validation: the run
/// proceeds unproxied and the operator should know. A proxies file that
/// parses to zero candidates means unproxied is the normal mode instead.
fn proxies_all_failed(parsed_candidates: usize, pool: &ProxyPool) -> bool {
    parsed_candidates > 0 && pool.is_empty()
}

fn progress_bar(len: usize, message: &str) -> ProgressBar {
    let bar = ProgressBar::new(len as u64);
    bar.set_style(
        ProgressStyle::with_template("{msg} [{bar:40.cyan/blue}] {pos}/{len}")
            .expect("valid progress bar template")
            .progress_chars("#>-"),
    );
    bar.set_message(message.to_string());
    bar
}

#[tokio::main]
async fn main() -> Result<()> {
    let _log_guard = init_logging()?;
    dotenv().ok();

    let config = Config::load()?;
    info!("Configuration loaded");

    let wallets = inputs::load_lines(&config.wallets_file);
    let token_types = inputs::load_lines(&config.tokens_file);
    if wallets.is_empty() {
        println!("Error: no wallets to check.");
        return Err(CheckerError::Setup("wallet list is empty".to_string()).into());
    }

    let policy = config.retry_policy();

    // Proxy validation happens before any balance work; a proxy that starts
    // failing later is rotated past, never re-checked.
    let proxy_lines = inputs::load_lines(&config.proxies_file);
    let specs = proxy::parse_specs(&proxy_lines);
    let parsed_candidates = specs.len();
    let (pool, rejected) = if specs.is_empty() {
        info!("No proxies configured; running without proxies");
        (ProxyPool::unproxied(), Vec::new())
    } else {
        let bar = progress_bar(specs.len(), "Validating proxies");
        let result = ProxyPool::validate(specs, &policy, config.max_workers, Some(bar.clone())).await;
        bar.finish();
        result
    };
    if !rejected.is_empty() {
        println!("\nFailed proxies:");
        for label in &rejected {
            println!("- {}", label);
        }
    }
    if proxies_all_failed(parsed_candidates, &pool) {
        println!("\nNo working proxies. Running without proxies.");
    }
    info!("Using {} proxies", pool.len());
    let pool = Arc::new(pool);

    let rpc = Arc::new(RpcClient::new(&config.sui_rpc_url, policy));
    let decimals = Arc::new(DecimalsCache::new());

    println!("\nCaching token decimals...");
    for token in &token_types {
        decimals
            .get_or_fetch(token, || rpc.get_coin_decimals(&pool, 0, token))
            .await;
    }

    let mut symbols = vec![NATIVE_SYMBOL.to_string()];
    symbols.extend(token_types.iter().map(|t| token_symbol(t)));

    println!("Fetching token prices...");
    let feed = PriceFeedClient::new(&config.coingecko_api_url, &config.vs_currency, policy);
    let price_cache = PriceCache::new(Duration::from_secs(config.price_cache_ttl_secs));
    let prices = price_cache
        .get_or_refresh(&symbols, || feed.fetch_prices(&pool, &symbols))
        .await;

    let fetcher = Arc::new(BalanceFetcher::new(rpc, decimals, pool));
    let aggregator = AggregationEngine::new(fetcher, config.max_workers, config.min_token_value);

    println!("\nChecking {} wallets...", wallets.len());
    let bar = progress_bar(wallets.len(), "Checking wallets");
    let summary = aggregator
        .run(&wallets, &token_types, &prices, Some(bar.clone()))
        .await;
    bar.finish();

    println!("\n{}", "=".repeat(120));
    print!("{}", report::render_table(&summary, &prices, wallets.len()));
    Ok(())
}
