use crate::metrics;
use crate::storage::DurableStore;
use crate::types::{BalanceEntry, TokenMetadata};
use dashmap::DashMap;
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

/// Metadata is near-immutable on-chain.
pub const METADATA_TTL: Duration = Duration::from_secs(6 * 60 * 60);
/// Bounds the balance staleness a user can see.
pub const BALANCE_TTL: Duration = Duration::from_secs(30);

pub const METADATA_CACHE_NAME: &str = "tokenMetadataCache";
const SCHEMA_VERSION: &str = "v1";

/// Wall-clock source in milliseconds, injectable so expiry can be tested.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicI64,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now_ms: AtomicI64::new(start_ms),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now_ms.fetch_add(by.as_millis() as i64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry<V> {
    pub value: V,
    pub timestamp_ms: i64,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now_ms: i64, ttl: Duration) -> bool {
        now_ms.saturating_sub(self.timestamp_ms) >= ttl.as_millis() as i64
    }
}

/// In-memory key/value cache with one TTL for every entry.
///
/// Keys are lower-cased on the way in, so differently-cased spellings of the
/// same address always share an entry. Expired entries are ignored on read but
/// only dropped when overwritten or when the cache is cleared.
pub struct TtlCache<V> {
    name: &'static str,
    entries: DashMap<String, CacheEntry<V>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(name: &'static str, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            name,
            entries: DashMap::new(),
            ttl,
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now_ms();
        let live = self
            .entries
            .get(&key.to_lowercase())
            .filter(|entry| !entry.is_expired(now, self.ttl))
            .map(|entry| entry.value.clone());

        if live.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            metrics::increment_cache_hit(self.name);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            metrics::increment_cache_miss(self.name);
        }
        live
    }

    pub fn set(&self, key: &str, value: V) {
        let entry = CacheEntry {
            value,
            timestamp_ms: self.clock.now_ms(),
        };
        self.entries.insert(key.to_lowercase(), entry);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            hits,
            misses,
            hit_rate: if total > 0 { hits as f64 / total as f64 } else { 0.0 },
            size: self.entries.len(),
        }
    }

    fn live_entries(&self) -> HashMap<String, CacheEntry<V>> {
        let now = self.clock.now_ms();
        self.entries
            .iter()
            .filter(|entry| !entry.is_expired(now, self.ttl))
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Inserts a persisted entry unless it is already expired or a fresher one exists.
    fn restore(&self, key: String, entry: CacheEntry<V>) -> bool {
        if entry.is_expired(self.clock.now_ms(), self.ttl) {
            return false;
        }
        let mut restored = false;
        self.entries.entry(key.to_lowercase()).or_insert_with(|| {
            restored = true;
            entry
        });
        restored
    }
}

/// Generation of a [`PersistentTtlCache`] scope, captured before a lookup.
///
/// Every scope switch and every `clear()` starts a new generation. Reads and
/// writes made under an older one are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheScope(u64);

#[derive(Debug, Clone)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub size: usize,
}

/// [`TtlCache`] mirrored write-through into a [`DurableStore`].
///
/// The mirror is one JSON object per scope, `{ key: { value, timestampMs } }`,
/// stored under `<name>:v1:<chain id>`. The first read or write after
/// construction, a scope switch or a `clear()` hydrates the memory tier from
/// the store, skipping entries that are already expired.
///
/// Lookups that can outlive a scope switch should capture [`Self::scope`]
/// first and go through [`Self::get_in`] / [`Self::set_in`].
pub struct PersistentTtlCache<V> {
    memory: TtlCache<V>,
    store: Arc<dyn DurableStore>,
    storage_key: RwLock<String>,
    generation: AtomicU64,
    hydrated: AtomicBool,
    hydrate_lock: tokio::sync::Mutex<()>,
    persist_lock: tokio::sync::Mutex<()>,
}

impl<V> PersistentTtlCache<V>
where
    V: Clone + Serialize + DeserializeOwned + Send + Sync,
{
    pub fn new(
        name: &'static str,
        ttl: Duration,
        clock: Arc<dyn Clock>,
        store: Arc<dyn DurableStore>,
        chain_id: u64,
    ) -> Self {
        Self {
            memory: TtlCache::new(name, ttl, clock),
            store,
            storage_key: RwLock::new(storage_key(name, chain_id)),
            generation: AtomicU64::new(0),
            hydrated: AtomicBool::new(false),
            hydrate_lock: tokio::sync::Mutex::new(()),
            persist_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn storage_key(&self) -> String {
        self.storage_key
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn memory(&self) -> &TtlCache<V> {
        &self.memory
    }

    pub fn scope(&self) -> CacheScope {
        CacheScope(self.generation.load(Ordering::SeqCst))
    }

    pub fn is_current(&self, scope: CacheScope) -> bool {
        self.scope() == scope
    }

    /// Points the cache at another chain's mirror. The in-memory tier is dropped
    /// so one chain's entries are never served for another.
    ///
    /// Returns the scope that is active once the call returns.
    pub fn activate_chain(&self, chain_id: u64) -> CacheScope {
        let next = storage_key(self.memory.name(), chain_id);
        let mut current = self
            .storage_key
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if *current != next {
            debug!("Cache {} switching scope {} -> {}", self.memory.name(), current, next);
            *current = next;
            self.generation.fetch_add(1, Ordering::SeqCst);
            self.memory.clear();
            self.hydrated.store(false, Ordering::SeqCst);
        }
        self.scope()
    }

    pub async fn get(&self, key: &str) -> Option<V> {
        self.get_in(self.scope(), key).await
    }

    pub async fn set(&self, key: &str, value: V) {
        self.set_in(self.scope(), key, value).await;
    }

    /// Reads `key` only while `scope` is still the active one.
    pub async fn get_in(&self, scope: CacheScope, key: &str) -> Option<V> {
        self.ensure_hydrated().await;
        let _current = self.storage_key.read().unwrap_or_else(PoisonError::into_inner);
        if !self.is_current(scope) {
            return None;
        }
        self.memory.get(key)
    }

    /// Writes `key` only while `scope` is still the active one. Returns
    /// whether the entry was stored.
    pub async fn set_in(&self, scope: CacheScope, key: &str, value: V) -> bool {
        self.ensure_hydrated().await;
        {
            let current = self.storage_key.read().unwrap_or_else(PoisonError::into_inner);
            if !self.is_current(scope) {
                debug!(
                    "Dropping {} write for {}: scope moved to {}",
                    self.memory.name(),
                    key,
                    current
                );
                return false;
            }
            self.memory.set(key, value);
        }
        self.persist().await;
        true
    }

    pub async fn clear(&self) {
        let key = {
            let current = self.storage_key.read().unwrap_or_else(PoisonError::into_inner);
            self.generation.fetch_add(1, Ordering::SeqCst);
            self.memory.clear();
            self.hydrated.store(false, Ordering::SeqCst);
            current.clone()
        };
        let _guard = self.persist_lock.lock().await;
        if let Err(e) = self.store.remove(&key).await {
            warn!("Failed to remove persisted cache {}: {:#}", key, e);
        }
    }

    async fn ensure_hydrated(&self) {
        if self.hydrated.load(Ordering::SeqCst) {
            return;
        }
        let _guard = self.hydrate_lock.lock().await;
        if self.hydrated.load(Ordering::SeqCst) {
            return;
        }

        let scope = self.scope();
        let key = self.storage_key();
        let persisted = match self.store.get(&key).await {
            Ok(Some(bytes)) => {
                match serde_json::from_slice::<HashMap<String, CacheEntry<V>>>(&bytes) {
                    Ok(persisted) => persisted,
                    Err(e) => {
                        warn!("Discarding unreadable persisted cache {}: {}", key, e);
                        HashMap::new()
                    }
                }
            }
            Ok(None) => {
                debug!("No persisted cache under {}", key);
                HashMap::new()
            }
            Err(e) => {
                warn!("Failed to load persisted cache {}: {:#}", key, e);
                HashMap::new()
            }
        };

        // The scope may have moved while the store was being read.
        let _current = self.storage_key.read().unwrap_or_else(PoisonError::into_inner);
        if !self.is_current(scope) {
            debug!("Discarding hydration of {}: scope changed", key);
            return;
        }
        let total = persisted.len();
        let restored = persisted
            .into_iter()
            .map(|(k, entry)| self.memory.restore(k, entry))
            .filter(|restored| *restored)
            .count();
        if total > 0 {
            debug!("Hydrated {} of {} persisted entries from {}", restored, total, key);
        }
        self.hydrated.store(true, Ordering::SeqCst);
    }

    async fn persist(&self) {
        let _guard = self.persist_lock.lock().await;
        let (key, snapshot) = {
            let current = self.storage_key.read().unwrap_or_else(PoisonError::into_inner);
            (current.clone(), self.memory.live_entries())
        };
        let bytes = match serde_json::to_vec(&snapshot) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Failed to serialize cache {}: {}", key, e);
                return;
            }
        };
        if let Err(e) = self.store.set(&key, bytes).await {
            warn!("Failed to persist cache {}: {:#}", key, e);
        }
    }
}

pub fn storage_key(name: &str, chain_id: u64) -> String {
    format!("{}:{}:{}", name, SCHEMA_VERSION, chain_id)
}

/// TTLs used by [`CacheManager`].
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    pub metadata_ttl: Duration,
    pub balance_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            metadata_ttl: METADATA_TTL,
            balance_ttl: BALANCE_TTL,
        }
    }
}

/// Owns the two caches of a session: persistent token metadata and
/// session-only balances.
pub struct CacheManager {
    pub metadata: PersistentTtlCache<TokenMetadata>,
    pub balances: TtlCache<BalanceEntry>,
    active_chain: AtomicU64,
}

impl CacheManager {
    pub fn new(
        chain_id: u64,
        store: Arc<dyn DurableStore>,
        clock: Arc<dyn Clock>,
        config: CacheConfig,
    ) -> Self {
        Self {
            metadata: PersistentTtlCache::new(
                METADATA_CACHE_NAME,
                config.metadata_ttl,
                clock.clone(),
                store,
                chain_id,
            ),
            balances: TtlCache::new("tokenBalanceCache", config.balance_ttl, clock),
            active_chain: AtomicU64::new(chain_id),
        }
    }

    pub fn active_chain(&self) -> u64 {
        self.active_chain.load(Ordering::SeqCst)
    }

    /// Rescopes both caches when the wallet moved to another network.
    pub fn activate_chain(&self, chain_id: u64) -> CacheScope {
        let scope = self.metadata.activate_chain(chain_id);
        if self.active_chain.swap(chain_id, Ordering::SeqCst) != chain_id {
            self.balances.clear();
        }
        scope
    }

    /// Scope shared by both caches; it moves with the metadata cache.
    pub fn scope(&self) -> CacheScope {
        self.metadata.scope()
    }

    pub fn balance(&self, scope: CacheScope, key: &str) -> Option<BalanceEntry> {
        if !self.metadata.is_current(scope) {
            return None;
        }
        self.balances.get(key)
    }

    /// Stores a balance unless the caches were rescoped or cleared since `scope`.
    pub fn set_balance(&self, scope: CacheScope, key: &str, entry: BalanceEntry) -> bool {
        if !self.metadata.is_current(scope) {
            debug!("Dropping balance write for {}: scope changed", key);
            return false;
        }
        self.balances.set(key, entry);
        true
    }

    /// Wipes both in-memory caches and the durable mirror of the active chain.
    pub async fn clear(&self) {
        self.metadata.clear().await;
        self.balances.clear();
    }

    pub fn record_cache_sizes(&self) {
        let metadata = self.metadata.memory();
        metrics::set_cache_size(metadata.name(), metadata.len() as f64);
        metrics::set_cache_size(self.balances.name(), self.balances.len() as f64);
    }
}
