//! # Token Registry
//!
//! Builds the enriched list of tokens an exchange contract allows, combining
//! batched reads, the metadata/balance caches and bounded fan-out.
//!
//! ## Pass structure
//!
//! 1. Read the allow-list from the exchange contract.
//! 2. One aggregate request with `balanceOf(user)` and `decimals()` per token,
//!    interleaved so token `i` owns results `2i` and `2i + 1`. If the aggregate
//!    is unavailable, every balance is read through the single-token path.
//! 3. Per token, with bounded concurrency: metadata (cache, then a batched
//!    `symbol`/`name`/`decimals` request, then individual reads, then the
//!    fallback descriptor) and an icon URL.
//! 4. Merge. Every allowed token appears in the output; failures only degrade
//!    its fields.

use crate::cache::{CacheManager, CacheScope};
use crate::contracts::erc20::{
    balance_of_calldata, decimals_calldata, decode_decimals, decode_text, decode_uint,
    name_calldata, symbol_calldata,
};
use crate::errors::is_rate_limited;
use crate::exchange::{ExchangeContract, TokenReader};
use crate::icons::IconResolver;
use crate::metrics;
use crate::multicall::{BatchExecutor, Call, CallResult};
use crate::scheduler::{map_bounded, DEFAULT_CONCURRENCY};
use crate::types::{
    canonical_key, format_units, to_checksum, BalanceEntry, EnrichedToken, TokenMetadata,
    DEFAULT_DECIMALS,
};
use crate::wallet::WalletContext;
use anyhow::{Context, Result};
use ethers::types::Address;
use log::{debug, info, warn};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

/// Metadata and formatted balance of one token for one wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenInfo {
    pub metadata: TokenMetadata,
    pub balance: String,
}

pub struct TokenRegistry {
    batch: Arc<dyn BatchExecutor>,
    reader: Arc<dyn TokenReader>,
    icons: Arc<dyn IconResolver>,
    caches: Arc<CacheManager>,
    concurrency: usize,
}

impl TokenRegistry {
    pub fn new(
        batch: Arc<dyn BatchExecutor>,
        reader: Arc<dyn TokenReader>,
        icons: Arc<dyn IconResolver>,
        caches: Arc<CacheManager>,
    ) -> Self {
        Self {
            batch,
            reader,
            icons,
            caches,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn caches(&self) -> &Arc<CacheManager> {
        &self.caches
    }

    /// Enriched records for every token the exchange allows, in allow-list order.
    ///
    /// Fails only when the allow-list itself cannot be read.
    pub async fn get_allowed_tokens_enriched(
        &self,
        exchange: &dyn ExchangeContract,
        wallet: &WalletContext,
    ) -> Result<Vec<EnrichedToken>> {
        let started = Instant::now();
        let scope = self.caches.activate_chain(wallet.chain_id);

        let tokens = dedupe(
            exchange
                .allowed_tokens()
                .await
                .context("Failed to read allowed tokens")?,
        );
        if tokens.is_empty() {
            info!("TokenRegistry: exchange {:?} allows no tokens", exchange.address());
            return Ok(Vec::new());
        }

        let balances = self.fetch_balances(&tokens, wallet, scope).await;

        let chain_id = wallet.chain_id;
        let enrichment: HashMap<Address, (TokenMetadata, Option<String>)> = map_bounded(
            "token_enrichment",
            tokens.clone(),
            self.concurrency,
            |token| async move {
                let metadata = self.resolve_metadata(token, scope).await;
                let icon_url = self.resolve_icon(token, chain_id).await;
                Ok((token, (metadata, icon_url)))
            },
        )
        .await
        .into_iter()
        .collect();

        let enriched: Vec<EnrichedToken> = tokens
            .iter()
            .map(|token| {
                let (metadata, icon_url) = enrichment
                    .get(token)
                    .cloned()
                    .unwrap_or_else(|| (TokenMetadata::fallback(), None));
                let balance = balances
                    .get(token)
                    .cloned()
                    .unwrap_or_else(|| BalanceEntry::zero().formatted);
                EnrichedToken {
                    address: *token,
                    symbol: metadata.symbol,
                    name: metadata.name,
                    decimals: metadata.decimals,
                    balance,
                    icon_url,
                    is_allowed: true,
                }
            })
            .collect();

        metrics::record_enrich_duration(started.elapsed());
        self.caches.record_cache_sizes();
        info!(
            "TokenRegistry: enriched {} allowed tokens in {:?}",
            enriched.len(),
            started.elapsed()
        );
        Ok(enriched)
    }

    /// Metadata and balance of a single token, both cache-backed.
    pub async fn get_token_info(&self, token: Address, wallet: &WalletContext) -> TokenInfo {
        let scope = self.caches.activate_chain(wallet.chain_id);
        self.token_info_in(token, wallet, scope).await
    }

    /// Resolves metadata from the cache, a batched read, individual reads, or
    /// the fallback descriptor, in that order. Never fails.
    pub async fn get_token_metadata(&self, token: Address) -> TokenMetadata {
        self.resolve_metadata(token, self.caches.scope()).await
    }

    async fn token_info_in(
        &self,
        token: Address,
        wallet: &WalletContext,
        scope: CacheScope,
    ) -> TokenInfo {
        let metadata = self.resolve_metadata(token, scope).await;
        let balance = match wallet.account {
            Some(user) => {
                let key = balance_key(wallet.chain_id, &token, &user);
                self.get_balance(token, user, &key, metadata.decimals, scope).await
            }
            None => BalanceEntry::zero().formatted,
        };
        TokenInfo { metadata, balance }
    }

    /// Cache reads and writes are pinned to `scope`, so a lookup that outlives
    /// a chain switch or a cache clear never lands in the new scope.
    async fn resolve_metadata(&self, token: Address, scope: CacheScope) -> TokenMetadata {
        let key = canonical_key(&token);
        if let Some(hit) = self.caches.metadata.get_in(scope, &key).await {
            return hit;
        }

        let calls = vec![
            Call {
                target: token,
                call_data: symbol_calldata(),
            },
            Call {
                target: token,
                call_data: name_calldata(),
            },
            Call {
                target: token,
                call_data: decimals_calldata(),
            },
        ];
        let batched = self.batch.try_aggregate(calls).await;
        let (mut symbol, mut name, mut decimals) = match expect_results(batched, 3, "metadata") {
            Some(results) => (
                decode_result(&results[0], decode_text),
                decode_result(&results[1], decode_text),
                decode_result(&results[2], decode_decimals),
            ),
            None => (None, None, None),
        };

        let mut throttled = false;
        if symbol.is_none() {
            symbol = self
                .read_or_log(token, "symbol", self.reader.symbol(token).await, &mut throttled);
        }
        if name.is_none() {
            name = self.read_or_log(token, "name", self.reader.name(token).await, &mut throttled);
        }
        if decimals.is_none() {
            decimals = self.read_or_log(
                token,
                "decimals",
                self.reader.decimals(token).await,
                &mut throttled,
            );
        }

        let fallback = TokenMetadata::fallback();
        let metadata = TokenMetadata {
            symbol: symbol.unwrap_or(fallback.symbol),
            name: name.unwrap_or(fallback.name),
            decimals: decimals.unwrap_or(fallback.decimals),
        };

        if throttled {
            // A throttled read says nothing about the token; retry on the next pass.
            debug!("Not caching throttled metadata for {}", to_checksum(&token));
        } else {
            self.caches.metadata.set_in(scope, &key, metadata.clone()).await;
        }
        metadata
    }

    /// Best-effort icon lookup; failures become `None`.
    pub async fn resolve_icon(&self, token: Address, chain_id: u64) -> Option<String> {
        match self.icons.icon_url(token, chain_id).await {
            Ok(url) => url,
            Err(e) => {
                debug!("No icon for {}: {:#}", to_checksum(&token), e);
                None
            }
        }
    }

    /// Wipes both caches and the durable metadata mirror of the active chain.
    pub async fn clear_caches(&self) {
        self.caches.clear().await;
        info!("TokenRegistry: caches cleared");
    }

    async fn fetch_balances(
        &self,
        tokens: &[Address],
        wallet: &WalletContext,
        scope: CacheScope,
    ) -> HashMap<Address, String> {
        let Some(user) = wallet.account else {
            return tokens
                .iter()
                .map(|token| (*token, BalanceEntry::zero().formatted))
                .collect();
        };

        let calls: Vec<Call> = tokens
            .iter()
            .flat_map(|token| {
                [
                    Call {
                        target: *token,
                        call_data: balance_of_calldata(user),
                    },
                    Call {
                        target: *token,
                        call_data: decimals_calldata(),
                    },
                ]
            })
            .collect();

        let batched = self.batch.try_aggregate(calls).await;
        match expect_results(batched, tokens.len() * 2, "balance") {
            Some(results) => tokens
                .iter()
                .zip(results.chunks_exact(2))
                .map(|(token, pair)| {
                    let balance = match decode_balance(&pair[0], &pair[1]) {
                        Some(formatted) => {
                            self.caches.set_balance(
                                scope,
                                &balance_key(wallet.chain_id, token, &user),
                                BalanceEntry {
                                    formatted: formatted.clone(),
                                },
                            );
                            formatted
                        }
                        None => {
                            debug!(
                                "Batched balance for {} failed, reporting zero",
                                to_checksum(token)
                            );
                            format_units(0u64.into(), DEFAULT_DECIMALS)
                        }
                    };
                    (*token, balance)
                })
                .collect(),
            None => {
                warn!(
                    "TokenRegistry: balance batch unavailable, reading {} tokens individually",
                    tokens.len()
                );
                map_bounded(
                    "balance_fallback",
                    tokens.to_vec(),
                    self.concurrency,
                    |token| async move {
                        let info = self.token_info_in(token, wallet, scope).await;
                        Ok((token, info.balance))
                    },
                )
                .await
                .into_iter()
                .collect()
            }
        }
    }

    async fn get_balance(
        &self,
        token: Address,
        user: Address,
        key: &str,
        decimals: u8,
        scope: CacheScope,
    ) -> String {
        if let Some(hit) = self.caches.balance(scope, key) {
            return hit.formatted;
        }

        let mut throttled = false;
        match self.read_or_log(
            token,
            "balanceOf",
            self.reader.balance_of(token, user).await,
            &mut throttled,
        ) {
            Some(raw) => {
                let formatted = format_units(raw, decimals);
                self.caches.set_balance(
                    scope,
                    key,
                    BalanceEntry {
                        formatted: formatted.clone(),
                    },
                );
                formatted
            }
            None => BalanceEntry::zero().formatted,
        }
    }

    fn read_or_log<T>(
        &self,
        token: Address,
        field: &str,
        read: Result<T>,
        throttled: &mut bool,
    ) -> Option<T> {
        match read {
            Ok(value) => Some(value),
            Err(e) if is_rate_limited(&e) => {
                *throttled = true;
                metrics::increment_rate_limited("token_registry");
                debug!("{} of {} rate limited: {:#}", field, to_checksum(&token), e);
                None
            }
            Err(e) => {
                warn!("{} of {} failed: {:#}", field, to_checksum(&token), e);
                None
            }
        }
    }
}

fn balance_key(chain_id: u64, token: &Address, user: &Address) -> String {
    format!("{}:{}-{}", chain_id, canonical_key(token), canonical_key(user))
}

/// Accepts an aggregate answer only when it has one result per call.
fn expect_results(
    results: Option<Vec<CallResult>>,
    expected: usize,
    what: &str,
) -> Option<Vec<CallResult>> {
    match results {
        Some(results) if results.len() == expected => Some(results),
        Some(results) => {
            warn!(
                "TokenRegistry: {} batch returned {} results for {} calls, ignoring it",
                what,
                results.len(),
                expected
            );
            None
        }
        None => None,
    }
}

fn decode_result<T>(result: &CallResult, decode: fn(&[u8]) -> Result<T>) -> Option<T> {
    if !result.success {
        return None;
    }
    decode(&result.return_data).ok()
}

fn decode_balance(balance: &CallResult, decimals: &CallResult) -> Option<String> {
    let raw = decode_result(balance, decode_uint)?;
    let decimals = decode_result(decimals, decode_decimals)?;
    Some(format_units(raw, decimals))
}

fn dedupe(tokens: Vec<Address>) -> Vec<Address> {
    let mut seen = HashSet::new();
    tokens.into_iter().filter(|t| seen.insert(*t)).collect()
}
