//! Claimable balance scans over an exchange's claim interface.
//!
//! Three outcomes stay distinguishable for the caller: a list of rows, a
//! verified empty list, and an error when not a single per-token read went
//! through. The last one is never reported as "nothing to claim".

use crate::errors::AggregatorError;
use crate::exchange::{ClaimSurface, ExchangeContract};
use crate::metrics;
use crate::scheduler::{map_bounded, scan_bounded, DEFAULT_CONCURRENCY};
use crate::token_registry::TokenRegistry;
use crate::types::{format_units, to_checksum, truncated_symbol, ClaimableRow, TokenMetadata};
use crate::wallet::WalletContext;
use anyhow::{Context, Result};
use ethers::types::{Address, U256};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub struct ClaimScanner {
    concurrency: usize,
    registry: Option<Arc<TokenRegistry>>,
}

impl Default for ClaimScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl ClaimScanner {
    /// Scanner without metadata: rows carry a truncated-address symbol.
    pub fn new() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            registry: None,
        }
    }

    /// Scanner that labels rows through the registry's metadata cache and icons.
    pub fn with_metadata(registry: Arc<TokenRegistry>) -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            registry: Some(registry),
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Every token with a non-zero claimable amount, sorted by symbol.
    ///
    /// Returns an empty list when the contract has no claim interface or no
    /// account is connected. Fails with [`AggregatorError::AllReadsFailed`] when
    /// candidates exist but every amount read failed.
    pub async fn get_claimable_snapshot(
        &self,
        exchange: &dyn ExchangeContract,
        wallet: &WalletContext,
    ) -> Result<Vec<ClaimableRow>> {
        let Some((claims, user)) = gate(exchange, wallet) else {
            return Ok(Vec::new());
        };
        if let Some(registry) = &self.registry {
            registry.caches().activate_chain(wallet.chain_id);
        }

        let tokens = candidate_tokens(claims.as_ref(), user).await?;
        if tokens.is_empty() {
            return Ok(Vec::new());
        }
        let attempted = tokens.len();

        // Failures are kept in the output so the scan can tell "all zero" from "all failed".
        let reads = map_bounded("claimable_scan", tokens, self.concurrency, |token| {
            let claims = claims.clone();
            async move { Ok((token, claims.claimable(user, token).await)) }
        })
        .await;

        let mut amounts = Vec::with_capacity(reads.len());
        let mut last_error = None;
        for (token, read) in reads {
            match read {
                Ok(amount) => amounts.push((token, amount)),
                Err(e) => {
                    warn!("claimable({}) failed: {:#}", to_checksum(&token), e);
                    last_error = Some(e);
                }
            }
        }

        if amounts.is_empty() {
            return Err(total_failure(attempted, last_error));
        }

        let positive: Vec<(Address, U256)> = amounts
            .into_iter()
            .filter(|(_, amount)| !amount.is_zero())
            .collect();

        let chain_id = wallet.chain_id;
        let mut rows = map_bounded(
            "claimable_enrichment",
            positive,
            self.concurrency,
            |(token, amount)| async move { Ok(self.build_row(token, amount, chain_id).await) },
        )
        .await;

        rows.sort_by(|a, b| a.symbol.cmp(&b.symbol).then_with(|| a.token.cmp(&b.token)));
        info!(
            user = %to_checksum(&user),
            claimable = rows.len(),
            scanned = attempted,
            "claimable snapshot built"
        );
        Ok(rows)
    }

    /// `true` as soon as one token has a positive claimable amount.
    ///
    /// Shares the gates and the total-failure rule of [`Self::get_claimable_snapshot`].
    pub async fn has_any_claimables(
        &self,
        exchange: &dyn ExchangeContract,
        wallet: &WalletContext,
    ) -> Result<bool> {
        let Some((claims, user)) = gate(exchange, wallet) else {
            return Ok(false);
        };

        let tokens = candidate_tokens(claims.as_ref(), user).await?;
        if tokens.is_empty() {
            return Ok(false);
        }

        let outcome = scan_bounded("claimable_check", tokens, self.concurrency, |token| {
            let claims = claims.clone();
            async move { Ok(!claims.claimable(user, token).await?.is_zero()) }
        })
        .await;

        if outcome.found {
            return Ok(true);
        }
        if outcome.succeeded == 0 {
            return Err(total_failure(outcome.failed, outcome.last_error));
        }
        Ok(false)
    }

    async fn build_row(&self, token: Address, amount: U256, chain_id: u64) -> ClaimableRow {
        let (metadata, icon_url) = match &self.registry {
            Some(registry) => (
                registry.get_token_metadata(token).await,
                registry.resolve_icon(token, chain_id).await,
            ),
            None => (TokenMetadata::fallback(), None),
        };

        let symbol = if metadata.is_fallback() {
            truncated_symbol(&token)
        } else {
            metadata.symbol
        };

        ClaimableRow {
            token,
            raw_amount: amount,
            formatted_amount: format_units(amount, metadata.decimals),
            symbol,
            name: metadata.name,
            decimals: metadata.decimals,
            icon_url,
        }
    }
}

fn gate(
    exchange: &dyn ExchangeContract,
    wallet: &WalletContext,
) -> Option<(Arc<dyn ClaimSurface>, Address)> {
    let Some(claims) = exchange.claims() else {
        debug!(exchange = ?exchange.address(), "no claim interface, skipping claimable scan");
        return None;
    };
    let Some(user) = wallet.account else {
        debug!("no connected account, skipping claimable scan");
        return None;
    };
    Some((claims, user))
}

async fn candidate_tokens(claims: &dyn ClaimSurface, user: Address) -> Result<Vec<Address>> {
    let listed = claims
        .claimable_tokens(user)
        .await
        .with_context(|| format!("Failed to list claimable tokens for {}", to_checksum(&user)))?;

    let mut seen = HashSet::new();
    Ok(listed.into_iter().filter(|t| seen.insert(*t)).collect())
}

fn total_failure(attempted: usize, last_error: Option<anyhow::Error>) -> anyhow::Error {
    metrics::increment_claim_scan_total_failure();
    let last_error = last_error
        .map(|e| format!("{:#}", e))
        .unwrap_or_else(|| "no read completed".to_string());
    error!(attempted, %last_error, "every claimable read failed");
    AggregatorError::AllReadsFailed {
        attempted,
        last_error,
    }
    .into()
}
