//! Data model shared by the aggregation components.

pub mod conversions;
pub mod token_data;

pub use conversions::{canonical_key, format_units, parse_address, to_checksum, truncated_symbol};
pub use token_data::{
    BalanceEntry, ClaimableRow, EnrichedToken, TokenMetadata, DEFAULT_DECIMALS,
};
