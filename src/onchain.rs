//! Ethers-backed implementations of the contract seams.

use crate::contracts::erc20::{
    balance_of_calldata, decimals_calldata, decode_decimals, decode_text, decode_uint,
    name_calldata, symbol_calldata,
};
use crate::contracts::ITokenExchange;
use crate::exchange::{ClaimSurface, ExchangeContract, TokenReader};
use crate::metrics;
use crate::utils::with_deadline;
use anyhow::Result;
use async_trait::async_trait;
use ethers::prelude::*;
use ethers::types::transaction::eip2718::TypedTransaction;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use log::{debug, info};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

type DefaultDirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Single-call ERC-20 reader, optionally throttled client-side.
pub struct OnchainTokenReader<M: Middleware> {
    provider: Arc<M>,
    limiter: Option<Arc<DefaultDirectRateLimiter>>,
}

impl<M: Middleware + 'static> OnchainTokenReader<M> {
    pub fn new(provider: Arc<M>) -> Self {
        Self {
            provider,
            limiter: None,
        }
    }

    /// Caps individual reads at `qps` per second. Zero disables the cap.
    pub fn with_qps_limit(mut self, qps: u32) -> Self {
        self.limiter = NonZeroU32::new(qps)
            .map(|qps| Arc::new(RateLimiter::direct(Quota::per_second(qps))));
        self
    }

    async fn read(&self, target: Address, data: Bytes) -> Result<Bytes> {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
        metrics::increment_rpc_call("token_reader");

        let tx: TypedTransaction = TransactionRequest::new().to(target).data(data).into();
        self.provider
            .call(&tx, None)
            .await
            .map_err(|e| anyhow::anyhow!("eth_call to {:?} failed: {}", target, e))
    }
}

#[async_trait]
impl<M: Middleware + 'static> TokenReader for OnchainTokenReader<M> {
    async fn symbol(&self, token: Address) -> Result<String> {
        decode_text(&self.read(token, symbol_calldata()).await?)
    }

    async fn name(&self, token: Address) -> Result<String> {
        decode_text(&self.read(token, name_calldata()).await?)
    }

    async fn decimals(&self, token: Address) -> Result<u8> {
        decode_decimals(&self.read(token, decimals_calldata()).await?)
    }

    async fn balance_of(&self, token: Address, owner: Address) -> Result<U256> {
        decode_uint(&self.read(token, balance_of_calldata(owner)).await?)
    }
}

/// Claim interface of an on-chain exchange.
pub struct OnchainClaims<M: Middleware> {
    contract: ITokenExchange<M>,
}

#[async_trait]
impl<M: Middleware + 'static> ClaimSurface for OnchainClaims<M> {
    async fn claimable_tokens(&self, user: Address) -> Result<Vec<Address>> {
        metrics::increment_rpc_call("claims");
        self.contract
            .get_claimable_tokens(user)
            .call()
            .await
            .map_err(|e| anyhow::anyhow!("getClaimableTokens failed: {}", e))
    }

    async fn claimable(&self, user: Address, token: Address) -> Result<U256> {
        metrics::increment_rpc_call("claims");
        self.contract
            .claimable(user, token)
            .call()
            .await
            .map_err(|e| anyhow::anyhow!("claimable({:?}) failed: {}", token, e))
    }
}

/// The exchange contract, with its claim interface checked once at connect time.
pub struct OnchainExchange<M: Middleware> {
    contract: ITokenExchange<M>,
    claims: Option<Arc<OnchainClaims<M>>>,
}

impl<M: Middleware + 'static> OnchainExchange<M> {
    /// Binds the contract and checks for a claim interface.
    ///
    /// Both claim reads run under `check_timeout`; a revert, an error or a
    /// timeout in either means "no claim interface" and never fails the connection.
    pub async fn connect(provider: Arc<M>, address: Address, check_timeout: Duration) -> Self {
        let contract = ITokenExchange::new(address, provider.clone());

        let check = with_deadline(
            "claim interface check",
            check_timeout,
            check_claim_interface(&contract),
        )
        .await;

        let has_claims = match check {
            Ok(()) => true,
            Err(e) => {
                debug!("Exchange {:?} claim interface check failed: {:#}", address, e);
                false
            }
        };
        info!(
            "Exchange {:?} bound (claim interface: {})",
            address,
            if has_claims { "present" } else { "absent" }
        );

        Self::with_claims(provider, address, has_claims)
    }

    /// Binds the contract without checking, trusting the caller about claims.
    pub fn with_claims(provider: Arc<M>, address: Address, has_claims: bool) -> Self {
        let contract = ITokenExchange::new(address, provider);
        let claims = has_claims.then(|| {
            Arc::new(OnchainClaims {
                contract: contract.clone(),
            })
        });
        Self { contract, claims }
    }
}

/// Both claim reads must answer for the zero address.
async fn check_claim_interface<M: Middleware + 'static>(
    contract: &ITokenExchange<M>,
) -> Result<()> {
    let list = contract.get_claimable_tokens(Address::zero());
    let amount = contract.claimable(Address::zero(), Address::zero());
    tokio::try_join!(
        async {
            list.call()
                .await
                .map_err(|e| anyhow::anyhow!("getClaimableTokens failed: {}", e))
        },
        async {
            amount
                .call()
                .await
                .map_err(|e| anyhow::anyhow!("claimable failed: {}", e))
        },
    )?;
    Ok(())
}

#[async_trait]
impl<M: Middleware + 'static> ExchangeContract for OnchainExchange<M> {
    fn address(&self) -> Address {
        self.contract.address()
    }

    async fn allowed_tokens(&self) -> Result<Vec<Address>> {
        metrics::increment_rpc_call("exchange");
        self.contract
            .get_allowed_tokens()
            .call()
            .await
            .map_err(|e| anyhow::anyhow!("getAllowedTokens failed: {}", e))
    }

    fn claims(&self) -> Option<Arc<dyn ClaimSurface>> {
        self.claims
            .clone()
            .map(|claims| claims as Arc<dyn ClaimSurface>)
    }
}
