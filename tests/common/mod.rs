//! In-memory chain used by the integration tests.
//!
//! `FakeChain` answers both batched and individual ERC-20 reads from the same
//! token table, so the tests can switch the aggregate path off and check that
//! the individual path produces the same records.

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use ethers::abi::{encode, Token};
use ethers::types::{Address, Bytes, U256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use token_ledger_sdk::cache::{CacheConfig, CacheManager, Clock, ManualClock};
use token_ledger_sdk::contracts::erc20::{
    balance_of_calldata, decimals_calldata, name_calldata, symbol_calldata,
};
use token_ledger_sdk::exchange::{ClaimSurface, ExchangeContract, TokenReader};
use token_ledger_sdk::icons::{IconResolver, NoIcons};
use token_ledger_sdk::multicall::{BatchExecutor, Call, CallResult};
use token_ledger_sdk::storage::{DurableStore, MemoryStore};
use token_ledger_sdk::TokenRegistry;

pub const CHAIN_ID: u64 = 42161;

pub fn addr(n: u64) -> Address {
    Address::from_low_u64_be(n)
}

pub fn units(whole: u64, decimals: u32) -> U256 {
    U256::from(whole) * U256::exp10(decimals as usize)
}

#[derive(Debug, Clone, Default)]
pub struct FakeToken {
    pub symbol: Option<String>,
    pub name: Option<String>,
    pub decimals: Option<u8>,
    pub balances: HashMap<Address, U256>,
}

impl FakeToken {
    pub fn new(symbol: &str, name: &str, decimals: u8) -> Self {
        Self {
            symbol: Some(symbol.to_string()),
            name: Some(name.to_string()),
            decimals: Some(decimals),
            balances: HashMap::new(),
        }
    }

    pub fn with_balance(mut self, owner: Address, amount: U256) -> Self {
        self.balances.insert(owner, amount);
        self
    }
}

enum Read {
    Symbol,
    Name,
    Decimals,
    BalanceOf(Address),
}

fn classify(data: &[u8]) -> Option<Read> {
    if data == &symbol_calldata()[..] {
        Some(Read::Symbol)
    } else if data == &name_calldata()[..] {
        Some(Read::Name)
    } else if data == &decimals_calldata()[..] {
        Some(Read::Decimals)
    } else if data.len() == 36 && data[..4] == balance_of_calldata(Address::zero())[..4] {
        Some(Read::BalanceOf(Address::from_slice(&data[16..36])))
    } else {
        None
    }
}

#[derive(Default)]
pub struct FakeChain {
    tokens: Mutex<HashMap<Address, FakeToken>>,
    batch_down: AtomicBool,
    throttled: AtomicBool,
    batch_delay_ms: AtomicU64,
    pub batch_requests: AtomicUsize,
    pub single_reads: AtomicUsize,
}

impl FakeChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(self, address: Address, token: FakeToken) -> Self {
        self.put_token(address, token);
        self
    }

    pub fn put_token(&self, address: Address, token: FakeToken) {
        self.tokens.lock().unwrap().insert(address, token);
    }

    /// Makes every aggregate request return `None`.
    pub fn set_batch_down(&self, down: bool) {
        self.batch_down.store(down, Ordering::SeqCst);
    }

    /// Makes every individual read fail with a provider throttling error.
    pub fn set_throttled(&self, throttled: bool) {
        self.throttled.store(throttled, Ordering::SeqCst);
    }

    /// Holds every aggregate request for `delay` before answering.
    pub fn set_batch_delay(&self, delay: Duration) {
        self.batch_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn batch_requests(&self) -> usize {
        self.batch_requests.load(Ordering::SeqCst)
    }

    pub fn single_reads(&self) -> usize {
        self.single_reads.load(Ordering::SeqCst)
    }

    fn answer(&self, target: Address, read: &Read) -> Option<Vec<u8>> {
        let tokens = self.tokens.lock().unwrap();
        let token = tokens.get(&target)?;
        let encoded = match read {
            Read::Symbol => encode(&[Token::String(token.symbol.clone()?)]),
            Read::Name => encode(&[Token::String(token.name.clone()?)]),
            Read::Decimals => encode(&[Token::Uint(U256::from(token.decimals?))]),
            Read::BalanceOf(owner) => encode(&[Token::Uint(
                token.balances.get(owner).copied().unwrap_or_default(),
            )]),
        };
        Some(encoded)
    }

    fn single(&self, target: Address, read: Read) -> Result<Vec<u8>> {
        self.single_reads.fetch_add(1, Ordering::SeqCst);
        if self.throttled.load(Ordering::SeqCst) {
            return Err(anyhow!("(code: -32005, message: 429 Too Many Requests)"));
        }
        self.answer(target, &read)
            .ok_or_else(|| anyhow!("execution reverted"))
    }
}

#[async_trait]
impl BatchExecutor for FakeChain {
    async fn try_aggregate(&self, calls: Vec<Call>) -> Option<Vec<CallResult>> {
        self.batch_requests.fetch_add(1, Ordering::SeqCst);
        let delay = self.batch_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.batch_down.load(Ordering::SeqCst) {
            return None;
        }
        Some(
            calls
                .iter()
                .map(|call| {
                    let answer = classify(&call.call_data)
                        .and_then(|read| self.answer(call.target, &read));
                    match answer {
                        Some(data) => CallResult {
                            success: true,
                            return_data: Bytes::from(data),
                        },
                        None => CallResult {
                            success: false,
                            return_data: Bytes::new(),
                        },
                    }
                })
                .collect(),
        )
    }
}

/// Aggregate executor that drops the last result of every answer.
pub struct ShortBatch(pub Arc<FakeChain>);

#[async_trait]
impl BatchExecutor for ShortBatch {
    async fn try_aggregate(&self, calls: Vec<Call>) -> Option<Vec<CallResult>> {
        let mut results = self.0.try_aggregate(calls).await?;
        results.pop();
        Some(results)
    }
}

#[async_trait]
impl TokenReader for FakeChain {
    async fn symbol(&self, token: Address) -> Result<String> {
        let data = self.single(token, Read::Symbol)?;
        token_ledger_sdk::contracts::erc20::decode_text(&data)
    }

    async fn name(&self, token: Address) -> Result<String> {
        let data = self.single(token, Read::Name)?;
        token_ledger_sdk::contracts::erc20::decode_text(&data)
    }

    async fn decimals(&self, token: Address) -> Result<u8> {
        let data = self.single(token, Read::Decimals)?;
        token_ledger_sdk::contracts::erc20::decode_decimals(&data)
    }

    async fn balance_of(&self, token: Address, owner: Address) -> Result<U256> {
        let data = self.single(token, Read::BalanceOf(owner))?;
        token_ledger_sdk::contracts::erc20::decode_uint(&data)
    }
}

/// Claim interface with scripted per-token answers. Unlisted tokens owe zero.
#[derive(Default)]
pub struct FakeClaims {
    pub listed: Vec<Address>,
    pub amounts: HashMap<Address, std::result::Result<U256, String>>,
    pub list_fails: bool,
    pub reads: AtomicUsize,
}

impl FakeClaims {
    pub fn listing(tokens: Vec<Address>) -> Self {
        Self {
            listed: tokens,
            ..Default::default()
        }
    }

    pub fn owing(mut self, token: Address, amount: U256) -> Self {
        self.amounts.insert(token, Ok(amount));
        self
    }

    pub fn failing(mut self, token: Address, message: &str) -> Self {
        self.amounts.insert(token, Err(message.to_string()));
        self
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClaimSurface for FakeClaims {
    async fn claimable_tokens(&self, _user: Address) -> Result<Vec<Address>> {
        if self.list_fails {
            return Err(anyhow!("getClaimableTokens reverted"));
        }
        Ok(self.listed.clone())
    }

    async fn claimable(&self, _user: Address, token: Address) -> Result<U256> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        match self.amounts.get(&token) {
            Some(Ok(amount)) => Ok(*amount),
            Some(Err(message)) => Err(anyhow!("{}", message)),
            None => Ok(U256::zero()),
        }
    }
}

pub struct FakeExchange {
    pub allowed: Vec<Address>,
    pub allowed_fails: bool,
    pub claims: Option<Arc<FakeClaims>>,
}

impl FakeExchange {
    pub fn allowing(tokens: Vec<Address>) -> Self {
        Self {
            allowed: tokens,
            allowed_fails: false,
            claims: None,
        }
    }

    pub fn with_claims(claims: Arc<FakeClaims>) -> Self {
        Self {
            allowed: Vec::new(),
            allowed_fails: false,
            claims: Some(claims),
        }
    }
}

#[async_trait]
impl ExchangeContract for FakeExchange {
    fn address(&self) -> Address {
        addr(0xE1)
    }

    async fn allowed_tokens(&self) -> Result<Vec<Address>> {
        if self.allowed_fails {
            return Err(anyhow!("getAllowedTokens reverted"));
        }
        Ok(self.allowed.clone())
    }

    fn claims(&self) -> Option<Arc<dyn ClaimSurface>> {
        self.claims
            .clone()
            .map(|claims| claims as Arc<dyn ClaimSurface>)
    }
}

/// Icon resolver that always errors.
pub struct BrokenIcons;

#[async_trait]
impl IconResolver for BrokenIcons {
    async fn icon_url(&self, _token: Address, _chain_id: u64) -> Result<Option<String>> {
        Err(anyhow!("icon service unreachable"))
    }
}

pub struct Harness {
    pub chain: Arc<FakeChain>,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub registry: Arc<TokenRegistry>,
}

pub fn harness(chain: FakeChain) -> Harness {
    harness_with_icons(chain, Arc::new(NoIcons))
}

pub fn harness_with_icons(chain: FakeChain, icons: Arc<dyn IconResolver>) -> Harness {
    build_harness(chain, icons, |chain| chain as Arc<dyn BatchExecutor>)
}

/// Harness whose aggregate requests go through `batch` instead of the chain.
pub fn harness_with_batch(
    chain: FakeChain,
    batch: impl FnOnce(Arc<FakeChain>) -> Arc<dyn BatchExecutor>,
) -> Harness {
    build_harness(chain, Arc::new(NoIcons), batch)
}

fn build_harness(
    chain: FakeChain,
    icons: Arc<dyn IconResolver>,
    batch: impl FnOnce(Arc<FakeChain>) -> Arc<dyn BatchExecutor>,
) -> Harness {
    let chain = Arc::new(chain);
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(1_700_000_000_000));
    let caches = Arc::new(CacheManager::new(
        CHAIN_ID,
        store.clone() as Arc<dyn DurableStore>,
        clock.clone() as Arc<dyn Clock>,
        CacheConfig::default(),
    ));
    let registry = Arc::new(
        TokenRegistry::new(batch(chain.clone()), chain.clone(), icons, caches).with_concurrency(3),
    );
    Harness {
        chain,
        store,
        clock,
        registry,
    }
}
