//! # Contract seams
//!
//! The aggregators never talk to a provider directly. They consume these
//! traits, which the on-chain implementations in [`crate::onchain`] back with
//! ethers bindings and which tests back with in-memory fakes.
//!
//! A contract's claim interface is optional. Whether it exists is decided once,
//! when the handle is built, and exposed through [`ExchangeContract::claims`];
//! callers branch on that single `Option` instead of probing at every call site.

use anyhow::Result;
use async_trait::async_trait;
use ethers::types::{Address, U256};
use std::sync::Arc;

/// Individual ERC-20 reads, used when a batch is unavailable or incomplete.
#[async_trait]
pub trait TokenReader: Send + Sync {
    async fn symbol(&self, token: Address) -> Result<String>;
    async fn name(&self, token: Address) -> Result<String>;
    async fn decimals(&self, token: Address) -> Result<u8>;
    async fn balance_of(&self, token: Address, owner: Address) -> Result<U256>;
}

/// The claimable-balance surface of an exchange contract.
#[async_trait]
pub trait ClaimSurface: Send + Sync {
    /// Tokens the contract may owe `user`.
    async fn claimable_tokens(&self, user: Address) -> Result<Vec<Address>>;
    /// Amount of `token` owed to `user`.
    async fn claimable(&self, user: Address, token: Address) -> Result<U256>;
}

/// Handle to the exchange contract whose allow-list drives the token list.
#[async_trait]
pub trait ExchangeContract: Send + Sync {
    fn address(&self) -> Address;

    async fn allowed_tokens(&self) -> Result<Vec<Address>>;

    /// The claim interface, if this contract has one.
    fn claims(&self) -> Option<Arc<dyn ClaimSurface>>;
}
