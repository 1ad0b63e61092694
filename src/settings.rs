use crate::cache::CacheConfig;
use crate::multicall::MULTICALL3_ADDRESS;
use crate::types::parse_address;
use crate::wallet::WalletContext;
use config::{Config, ConfigError, File};
use ethers::types::Address;
use serde::Deserialize;
use std::env;
use std::time::Duration;

const ENV_PREFIX: &str = "TOKEN_LEDGER_";

#[derive(Debug, Deserialize, Clone)]
pub struct Rpc {
    #[serde(default = "default_rpc_url")]
    pub url: String,
    /// Expected chain. `None` trusts whatever the provider reports.
    #[serde(default)]
    pub chain_id: Option<u64>,
    #[serde(default = "default_startup_timeout_ms")]
    pub startup_timeout_ms: u64,
    /// Client-side cap on individual reads per second. 0 disables it.
    #[serde(default)]
    pub qps_limit: u32,
}

fn default_rpc_url() -> String {
    "http://127.0.0.1:8545".to_string()
}
fn default_startup_timeout_ms() -> u64 {
    5_000
}

impl Default for Rpc {
    fn default() -> Self {
        Self {
            url: default_rpc_url(),
            chain_id: None,
            startup_timeout_ms: default_startup_timeout_ms(),
            qps_limit: 0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Contracts {
    #[serde(default)]
    pub exchange: Option<String>,
    #[serde(default = "default_multicall")]
    pub multicall: String,
}

fn default_multicall() -> String {
    MULTICALL3_ADDRESS.to_string()
}

impl Default for Contracts {
    fn default() -> Self {
        Self {
            exchange: None,
            multicall: default_multicall(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheSettings {
    #[serde(default = "default_metadata_ttl_seconds")]
    pub metadata_ttl_seconds: u64,
    #[serde(default = "default_balance_ttl_seconds")]
    pub balance_ttl_seconds: u64,
    /// Directory for the file-backed metadata mirror.
    #[serde(default = "default_storage_dir")]
    pub storage_dir: String,
    /// Mirrors metadata into Redis instead of files (needs the `redis` feature).
    #[serde(default)]
    pub redis_url: Option<String>,
}

fn default_metadata_ttl_seconds() -> u64 {
    6 * 60 * 60 // 6h
}
fn default_balance_ttl_seconds() -> u64 {
    30
}
fn default_storage_dir() -> String {
    ".token-ledger-cache".to_string()
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            metadata_ttl_seconds: default_metadata_ttl_seconds(),
            balance_ttl_seconds: default_balance_ttl_seconds(),
            storage_dir: default_storage_dir(),
            redis_url: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Scheduler {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_multicall_batch_size")]
    pub multicall_batch_size: usize,
}

fn default_concurrency() -> usize {
    crate::scheduler::DEFAULT_CONCURRENCY
}
fn default_multicall_batch_size() -> usize {
    200
}

impl Default for Scheduler {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            multicall_batch_size: default_multicall_batch_size(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Icons {
    /// e.g. `https://assets.example.org/{chain_id}/{address}/logo.png`
    #[serde(default)]
    pub url_template: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Wallet {
    #[serde(default)]
    pub account: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub rpc: Rpc,
    #[serde(default)]
    pub contracts: Contracts,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub scheduler: Scheduler,
    #[serde(default)]
    pub icons: Icons,
    #[serde(default)]
    pub wallet: Wallet,
}

impl Settings {
    /// Loads `Config.toml` from the working directory if present.
    pub fn new() -> Result<Self, ConfigError> {
        Self::load("Config.toml")
    }

    /// Loads `path` (optional), applies `TOKEN_LEDGER_*` overrides and validates.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path).required(false))
            .build()?;

        let mut settings: Self = s.try_deserialize()?;
        settings.apply_env_overrides(|name| env::var(name).ok());
        settings.validate()?;
        Ok(settings)
    }

    fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(&format!("{}{}", ENV_PREFIX, name))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(url) = var("RPC_URL") {
            self.rpc.url = url;
        }
        if let Some(raw) = var("CHAIN_ID") {
            match raw.parse() {
                Ok(id) => self.rpc.chain_id = Some(id),
                Err(e) => log::warn!("Ignoring {}CHAIN_ID={}: {}", ENV_PREFIX, raw, e),
            }
        }
        if let Some(exchange) = var("EXCHANGE_ADDRESS") {
            self.contracts.exchange = Some(exchange);
        }
        if let Some(multicall) = var("MULTICALL_ADDRESS") {
            self.contracts.multicall = multicall;
        }
        if let Some(account) = var("ACCOUNT") {
            self.wallet.account = Some(account);
        }
        if let Some(dir) = var("CACHE_DIR") {
            self.cache.storage_dir = dir;
        }
        if let Some(redis_url) = var("REDIS_URL") {
            self.cache.redis_url = Some(redis_url);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        url::Url::parse(&self.rpc.url)
            .map_err(|e| ConfigError::Message(format!("rpc.url {}: {}", self.rpc.url, e)))?;
        if let Some(exchange) = &self.contracts.exchange {
            parse_address(exchange)
                .map_err(|e| ConfigError::Message(format!("contracts.exchange: {}", e)))?;
        }
        parse_address(&self.contracts.multicall)
            .map_err(|e| ConfigError::Message(format!("contracts.multicall: {}", e)))?;
        if self.cache.metadata_ttl_seconds == 0 || self.cache.balance_ttl_seconds == 0 {
            return Err(ConfigError::Message(
                "cache TTLs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn exchange_address(&self) -> Result<Address, ConfigError> {
        let raw = self.contracts.exchange.as_deref().ok_or_else(|| {
            ConfigError::Message(format!(
                "contracts.exchange is not set (or {}EXCHANGE_ADDRESS)",
                ENV_PREFIX
            ))
        })?;
        parse_address(raw).map_err(|e| ConfigError::Message(e.to_string()))
    }

    pub fn multicall_address(&self) -> Result<Address, ConfigError> {
        parse_address(&self.contracts.multicall).map_err(|e| ConfigError::Message(e.to_string()))
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            metadata_ttl: Duration::from_secs(self.cache.metadata_ttl_seconds),
            balance_ttl: Duration::from_secs(self.cache.balance_ttl_seconds),
        }
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc.startup_timeout_ms)
    }

    /// Wallet snapshot for the configured account on `chain_id`.
    pub fn wallet_context(&self, chain_id: u64) -> WalletContext {
        WalletContext::from_raw(self.wallet.account.as_deref(), chain_id)
    }
}
