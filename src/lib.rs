//! # Token Ledger SDK
//!
//! Read-side data layer for a token exchange dApp: it turns a contract's
//! allow-list and claim interface into UI-ready token records while keeping the
//! number of RPC round trips low.
//!
//! ## Overview
//!
//! - **Batching**: many independent `eth_call`s travel in one Multicall3
//!   `tryAggregate`, with per-call success flags.
//! - **Caching**: token metadata (6h, mirrored to durable storage per chain)
//!   and balances (30s, memory only).
//! - **Fan-out**: per-token work runs under a bounded concurrency ceiling where
//!   one failing token never costs the others.
//!
//! ## Architecture
//!
//! ### Token Registry
//! [`TokenRegistry::get_allowed_tokens_enriched`] returns every allowed token
//! with metadata, balance and icon. Failures degrade a record, they never drop it.
//!
//! ### Claim Scanner
//! [`ClaimScanner::get_claimable_snapshot`] and
//! [`ClaimScanner::has_any_claimables`] report what the connected account can
//! claim, and fail loudly when no read could be completed.
//!
//! ### Seams
//! Contracts, batching, storage and icons sit behind traits so the aggregators
//! run against ethers providers in production and in-memory fakes in tests.

// Core Types
/// Token records, conversions and formatting
pub mod types;
/// Error taxonomy and throttling detection
pub mod errors;

// Chain Access
/// Smart contract ABIs (read-only)
pub mod contracts;
/// Contract seams consumed by the aggregators
pub mod exchange;
/// Ethers-backed contract implementations
pub mod onchain;
/// Multicall3 batch executor
pub mod multicall;

// Caching & Scheduling
/// TTL caches and the per-session cache manager
pub mod cache;
/// Durable key/value backends for the metadata mirror
pub mod storage;
/// Bounded concurrency fan-out
pub mod scheduler;

// Aggregators
/// Allowed-token enrichment
pub mod token_registry;
/// Claimable balance scans
pub mod claims;

// Collaborators
/// Token icon lookup
pub mod icons;
/// Wallet snapshot and event registry
pub mod wallet;

// Infrastructure
/// Metrics and observability
pub mod metrics;
/// General utilities
pub mod utils;

// Settings & Configuration
/// Configuration management
pub mod settings;

// Re-exports for convenience
pub use anyhow::Result;
pub use cache::{CacheConfig, CacheManager};
pub use claims::ClaimScanner;
pub use errors::AggregatorError;
pub use exchange::{ClaimSurface, ExchangeContract, TokenReader};
pub use multicall::{BatchExecutor, Multicall};
pub use settings::Settings;
pub use token_registry::{TokenInfo, TokenRegistry};
pub use types::{ClaimableRow, EnrichedToken, TokenMetadata};
pub use wallet::{WalletContext, WalletEvent, WalletEvents};
