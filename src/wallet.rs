//! Wallet/network context consumed by the aggregators, and the observer
//! registry used to fan wallet events out to interested components.
//!
//! The aggregators never subscribe to anything: they take a [`WalletContext`]
//! snapshot per call. Connection handling and network switching live with the
//! caller, which typically subscribes a listener that rebuilds the snapshot and
//! calls `clear_caches()` on a chain change.

use crate::types::parse_address;
use dashmap::DashMap;
use ethers::types::Address;
use log::{debug, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Snapshot of the active account and chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalletContext {
    /// Connected signer, `None` when disconnected or when the wallet reported
    /// something that is not an address.
    pub account: Option<Address>,
    pub chain_id: u64,
}

impl WalletContext {
    pub fn new(account: Option<Address>, chain_id: u64) -> Self {
        Self { account, chain_id }
    }

    /// Builds a context from an untrusted account string.
    pub fn from_raw(account: Option<&str>, chain_id: u64) -> Self {
        let account = account.and_then(|raw| match parse_address(raw) {
            Ok(addr) => Some(addr),
            Err(e) => {
                warn!("Ignoring wallet account: {}", e);
                None
            }
        });
        Self { account, chain_id }
    }

    /// Next snapshot after `event`.
    pub fn apply(&self, event: &WalletEvent) -> Self {
        match event {
            WalletEvent::AccountChanged(account) => Self::new(*account, self.chain_id),
            WalletEvent::ChainChanged(chain_id) => Self::new(self.account, *chain_id),
            WalletEvent::Disconnected => Self::new(None, self.chain_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletEvent {
    AccountChanged(Option<Address>),
    ChainChanged(u64),
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Arc<dyn Fn(&WalletEvent) + Send + Sync>;

/// Observer registry for wallet events.
#[derive(Default)]
pub struct WalletEvents {
    next_id: AtomicU64,
    listeners: DashMap<u64, Listener>,
}

impl WalletEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&WalletEvent) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.insert(id, Arc::new(listener));
        SubscriptionId(id)
    }

    /// Returns `false` if the subscription was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.listeners.remove(&id.0).is_some()
    }

    /// Delivers `event` to every listener and returns how many were called.
    pub fn notify(&self, event: &WalletEvent) -> usize {
        // Snapshot first so a listener may (un)subscribe without deadlocking the map.
        let listeners: Vec<Listener> = self
            .listeners
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        debug!("Wallet event {:?} -> {} listeners", event, listeners.len());
        for listener in &listeners {
            listener(event);
        }
        listeners.len()
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}
