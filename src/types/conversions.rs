use ethers::types::{Address, U256};
use std::str::FromStr;

// Para cache keys: una sola forma canónica por address
pub fn canonical_key(addr: &Address) -> String {
    format!("{:?}", addr).to_lowercase()
}

// Para display (EIP-55)
pub fn to_checksum(addr: &Address) -> String {
    ethers::utils::to_checksum(addr, None)
}

/// Serde helper so addresses leave the crate in EIP-55 form.
pub fn serialize_checksummed<S>(addr: &Address, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&to_checksum(addr))
}

/// Parses a `0x`-prefixed, 40 hex digit address in any letter case.
pub fn parse_address(s: &str) -> Result<Address, ConversionError> {
    let trimmed = s.trim();
    let hex_part = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .ok_or_else(|| ConversionError::InvalidAddress(s.to_string()))?;
    if hex_part.len() != 40 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ConversionError::InvalidAddress(s.to_string()));
    }
    Address::from_str(hex_part).map_err(|e| ConversionError::InvalidAddress(e.to_string()))
}

/// Renders a raw token amount the way wallets display it: integer part, a dot,
/// and the fraction with trailing zeros trimmed but never empty ("10.0", "0.25").
pub fn format_units(value: U256, decimals: u8) -> String {
    let digits = value.to_string();
    let decimals = decimals as usize;

    let (int_part, frac_part) = if decimals == 0 {
        (digits, String::new())
    } else if digits.len() > decimals {
        let (int_part, frac_part) = digits.split_at(digits.len() - decimals);
        (int_part.to_string(), frac_part.to_string())
    } else {
        ("0".to_string(), format!("{:0>width$}", digits, width = decimals))
    };

    let frac = frac_part.trim_end_matches('0');
    if frac.is_empty() {
        format!("{}.0", int_part)
    } else {
        format!("{}.{}", int_part, frac)
    }
}

/// Pseudo-symbol for tokens whose metadata could not be read, e.g. `0xAbCd…1234`.
pub fn truncated_symbol(addr: &Address) -> String {
    let checksummed = to_checksum(addr);
    format!("{}…{}", &checksummed[..6], &checksummed[checksummed.len() - 4..])
}

#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_units_matches_wallet_display() {
        let ten = U256::from(10u64) * U256::exp10(18);
        assert_eq!(format_units(ten, 18), "10.0");
        assert_eq!(format_units(U256::zero(), 6), "0.0");
        assert_eq!(format_units(U256::from(1_500_000u64), 6), "1.5");
        assert_eq!(format_units(U256::from(1u64), 18), "0.000000000000000001");
        assert_eq!(format_units(U256::from(42u64), 0), "42.0");
        assert_eq!(format_units(U256::MAX, 18).split('.').count(), 2);
    }

    #[test]
    fn canonical_key_ignores_input_case() {
        let lower = parse_address("0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed").unwrap();
        let mixed = parse_address("0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed").unwrap();
        assert_eq!(canonical_key(&lower), canonical_key(&mixed));
        assert_eq!(canonical_key(&mixed), "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed");
        assert_eq!(to_checksum(&lower), "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed");
    }

    #[test]
    fn parse_address_rejects_malformed_input() {
        assert!(parse_address("5aaeb6053f3e94c9b9a09f33669435e7ef1beaed").is_err());
        assert!(parse_address("0x5aaeb6053f3e94c9b9a09f33669435e7ef1bea").is_err());
        assert!(parse_address("0xzzaeb6053f3e94c9b9a09f33669435e7ef1beaed").is_err());
        assert!(parse_address("").is_err());
    }

    #[test]
    fn truncated_symbol_keeps_both_ends() {
        let addr = parse_address("0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed").unwrap();
        assert_eq!(truncated_symbol(&addr), "0x5aAe…eAed");
    }
}
