use anyhow::Result;
use ethers::abi::{AbiEncode, ParamType, Token};
use ethers::prelude::*;

abigen!(
    Erc20,
    r#"[
        function name() external view returns (string)
        function symbol() external view returns (string)
        function decimals() external view returns (uint8)
        function balanceOf(address account) external view returns (uint256)
    ]"#
);

pub fn symbol_calldata() -> Bytes {
    SymbolCall.encode().into()
}

pub fn name_calldata() -> Bytes {
    NameCall.encode().into()
}

pub fn decimals_calldata() -> Bytes {
    DecimalsCall.encode().into()
}

pub fn balance_of_calldata(account: Address) -> Bytes {
    BalanceOfCall { account }.encode().into()
}

pub fn decode_uint(data: &[u8]) -> Result<U256> {
    ethers::abi::decode(&[ParamType::Uint(256)], data)?
        .into_iter()
        .next()
        .and_then(Token::into_uint)
        .ok_or_else(|| anyhow::anyhow!("expected uint256 return value"))
}

pub fn decode_decimals(data: &[u8]) -> Result<u8> {
    let raw = decode_uint(data)?;
    if raw > U256::from(u8::MAX) {
        anyhow::bail!("decimals out of range: {}", raw);
    }
    Ok(raw.as_u32() as u8)
}

/// Decodes a `string` return value, accepting the `bytes32` encoding some
/// early tokens use for `symbol()` and `name()`.
pub fn decode_text(data: &[u8]) -> Result<String> {
    if let Some(text) = ethers::abi::decode(&[ParamType::String], data)
        .ok()
        .and_then(|tokens| tokens.into_iter().next())
        .and_then(Token::into_string)
    {
        return Ok(text);
    }

    if data.len() == 32 {
        let end = data.iter().position(|b| *b == 0).unwrap_or(32);
        let text = std::str::from_utf8(&data[..end])?;
        if !text.is_empty() {
            return Ok(text.to_string());
        }
    }
    anyhow::bail!("undecodable string return value ({} bytes)", data.len())
}
