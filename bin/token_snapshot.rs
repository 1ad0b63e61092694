//! # Token Snapshot
//!
//! One-shot CLI that reads an exchange contract's allowed tokens and the
//! configured account's claimable balances, and prints both as JSON.
//!
//! ## Usage
//!
//! ```bash
//! TOKEN_LEDGER_EXCHANGE_ADDRESS=0x... TOKEN_LEDGER_ACCOUNT=0x... \
//!     cargo run --bin token_snapshot -- --config Config.toml
//! ```
//!
//! Claimable scan failures do not abort the run; they are reported in the
//! `claims` section so "nothing to claim" and "could not check" stay distinct.

use anyhow::{Context, Result};
use clap::Parser;
use ethers::prelude::{Http, Middleware, Provider};
use std::sync::Arc;
use token_ledger_sdk::{
    cache::{CacheManager, SystemClock},
    icons::{IconResolver, NoIcons, TemplateIconResolver},
    metrics,
    multicall::Multicall,
    onchain::{OnchainExchange, OnchainTokenReader},
    storage::{DurableStore, FileStore},
    utils::with_deadline,
    ClaimScanner, Settings, TokenRegistry, WalletContext,
};

#[derive(Parser, Debug)]
#[command(name = "token_snapshot", about = "Print enriched allowed tokens and claimables as JSON")]
struct Args {
    /// Config file (optional; TOKEN_LEDGER_* env vars override it)
    #[arg(long, default_value = "Config.toml")]
    config: String,

    /// Account to inspect, overrides `wallet.account`
    #[arg(long)]
    account: Option<String>,

    /// Wipe caches and the persisted metadata before reading
    #[arg(long)]
    fresh: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    env_logger::init();
    init_observability();

    let args = Args::parse();

    // 1. Load settings
    let mut settings = Settings::load(&args.config)?;
    if let Some(account) = args.account {
        settings.wallet.account = Some(account);
    }
    let exchange_address = settings.exchange_address()?;
    log::info!("✅ Settings loaded");

    // 2. Provider and chain id (startup path, must not hang)
    let provider = Arc::new(
        Provider::<Http>::try_from(settings.rpc.url.as_str())
            .with_context(|| format!("Invalid RPC url {}", settings.rpc.url))?,
    );
    let chain_id = with_deadline("eth_chainId", settings.startup_timeout(), async {
        provider
            .get_chainid()
            .await
            .map_err(|e| anyhow::anyhow!("eth_chainId failed: {}", e))
    })
    .await?
    .as_u64();
    if let Some(expected) = settings.rpc.chain_id {
        if expected != chain_id {
            log::warn!(
                "⚠️ Provider reports chain {} but config expects {}",
                chain_id,
                expected
            );
        }
    }
    log::info!("✅ Connected to chain {}", chain_id);

    // 3. Caches with their durable mirror
    let store = open_store(&settings).await?;
    let caches = Arc::new(CacheManager::new(
        chain_id,
        store,
        Arc::new(SystemClock),
        settings.cache_config(),
    ));

    // 4. Collaborators
    let batch = Arc::new(Multicall::new(
        provider.clone(),
        settings.multicall_address()?,
        settings.scheduler.multicall_batch_size,
    ));
    let reader = Arc::new(
        OnchainTokenReader::new(provider.clone()).with_qps_limit(settings.rpc.qps_limit),
    );
    let icons: Arc<dyn IconResolver> = match &settings.icons.url_template {
        Some(template) => Arc::new(TemplateIconResolver::new(template.clone())),
        None => Arc::new(NoIcons),
    };

    let registry = Arc::new(
        TokenRegistry::new(batch, reader, icons, caches)
            .with_concurrency(settings.scheduler.concurrency),
    );
    let scanner = ClaimScanner::with_metadata(registry.clone())
        .with_concurrency(settings.scheduler.concurrency);

    let exchange =
        OnchainExchange::connect(provider.clone(), exchange_address, settings.startup_timeout())
            .await;
    let wallet: WalletContext = settings.wallet_context(chain_id);

    if args.fresh {
        registry.clear_caches().await;
    }

    // 5. Read
    let tokens = registry.get_allowed_tokens_enriched(&exchange, &wallet).await?;
    let claims = match scanner.get_claimable_snapshot(&exchange, &wallet).await {
        Ok(rows) => serde_json::json!({ "state": "ok", "rows": rows }),
        Err(e) => {
            log::error!("❌ Claimable scan failed: {:#}", e);
            serde_json::json!({ "state": "error", "error": format!("{:#}", e) })
        }
    };

    let output = serde_json::json!({
        "chainId": chain_id,
        "exchange": token_ledger_sdk::types::to_checksum(&exchange_address),
        "account": wallet.account.map(|a| token_ledger_sdk::types::to_checksum(&a)),
        "tokens": tokens,
        "claims": claims,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);

    let stats = registry.caches().metadata.memory().stats();
    log::info!(
        "📊 Metadata cache: {} entries, {} hits / {} misses ({:.1}%)",
        stats.size,
        stats.hits,
        stats.misses,
        stats.hit_rate * 100.0
    );
    Ok(())
}

async fn open_store(settings: &Settings) -> Result<Arc<dyn DurableStore>> {
    #[cfg(feature = "redis")]
    if let Some(url) = &settings.cache.redis_url {
        let store = token_ledger_sdk::storage::RedisStore::connect(url).await?;
        return Ok(Arc::new(store));
    }
    #[cfg(not(feature = "redis"))]
    if settings.cache.redis_url.is_some() {
        log::warn!("⚠️ cache.redis_url set but the `redis` feature is disabled, using files");
    }

    let store = FileStore::open(&settings.cache.storage_dir).await?;
    Ok(Arc::new(store))
}

#[cfg(feature = "observability")]
fn init_observability() {
    if let Err(e) = metrics_exporter_prometheus::PrometheusBuilder::new().install() {
        eprintln!("Failed to install Prometheus exporter: {}", e);
    }
    let _ = tracing_subscriber::fmt().json().try_init();
    metrics::describe_metrics();
}

#[cfg(not(feature = "observability"))]
fn init_observability() {
    metrics::describe_metrics();
}
