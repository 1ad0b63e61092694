use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};

/// Decimals assumed when a token's `decimals()` cannot be read or decoded.
///
/// This is a policy choice matching the common ERC-20 default, applied in every
/// fallback path; revisit it here rather than at the call sites.
pub const DEFAULT_DECIMALS: u8 = 18;

/// Static ERC-20 descriptor, cached per lower-cased token address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMetadata {
    pub symbol: String,
    pub name: String,
    pub decimals: u8,
}

impl TokenMetadata {
    /// Placeholder used when metadata cannot be resolved. It is cached like a
    /// real value so a reverting token is not queried again until expiry.
    pub fn fallback() -> Self {
        Self {
            symbol: "UNKNOWN".to_string(),
            name: "Unknown Token".to_string(),
            decimals: DEFAULT_DECIMALS,
        }
    }

    pub fn is_fallback(&self) -> bool {
        *self == Self::fallback()
    }
}

/// Formatted balance, cached per `token-user` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceEntry {
    pub formatted: String,
}

impl BalanceEntry {
    pub fn zero() -> Self {
        Self {
            formatted: "0.0".to_string(),
        }
    }
}

/// One allowed token as presented to the UI. Rebuilt on every aggregation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedToken {
    #[serde(serialize_with = "super::conversions::serialize_checksummed")]
    pub address: Address,
    pub symbol: String,
    pub name: String,
    pub decimals: u8,
    pub balance: String,
    pub icon_url: Option<String>,
    pub is_allowed: bool,
}

/// A token with a strictly positive claimable amount for the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimableRow {
    #[serde(serialize_with = "super::conversions::serialize_checksummed")]
    pub token: Address,
    pub raw_amount: U256,
    pub formatted_amount: String,
    pub symbol: String,
    pub name: String,
    pub decimals: u8,
    pub icon_url: Option<String>,
}
