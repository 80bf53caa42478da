// ERC-20 metadata calls: name(), symbol(), decimals()

use super::{decode_u256, encode_call};
use crate::chain_client::ChainClient;
use crate::errors::{Result, TopologyError};
use crate::token::Token;
use ethers::abi::{decode, ParamType};
use ethers::types::{Address, U256};

pub const NAME: &str = "name()";
pub const SYMBOL: &str = "symbol()";
pub const DECIMALS: &str = "decimals()";

/// Fetches all three metadata fields. Any failure means the token is unusable.
pub async fn fetch_token(client: &dyn ChainClient, address: Address) -> Result<Token> {
    let name = client.call_contract(address, encode_call(NAME, &[])).await?;
    let symbol = client.call_contract(address, encode_call(SYMBOL, &[])).await?;
    let decimals = client.call_contract(address, encode_call(DECIMALS, &[])).await?;

    Ok(Token::new(
        address,
        decode_string(address, &name, NAME)?,
        decode_string(address, &symbol, SYMBOL)?,
        decode_decimals(address, &decimals)?,
    ))
}

/// Decodes an ABI `string` return, falling back to a right-padded `bytes32`
/// (tokens such as MKR predate the string convention).
pub fn decode_string(target: Address, data: &[u8], method: &str) -> Result<String> {
    if data.is_empty() {
        return Err(TopologyError::data_integrity(target, format!("empty {} return", method)));
    }
    if let Ok(tokens) = decode(&[ParamType::String], data) {
        if let Some(s) = tokens.into_iter().next().and_then(|t| t.into_string()) {
            return Ok(s);
        }
    }
    if data.len() == 32 {
        let trimmed: Vec<u8> = data.iter().copied().take_while(|b| *b != 0).collect();
        if let Ok(s) = String::from_utf8(trimmed) {
            return Ok(s);
        }
    }
    Err(TopologyError::data_integrity(target, format!("undecodable {} return", method)))
}

pub fn decode_decimals(target: Address, data: &[u8]) -> Result<u8> {
    let raw = decode_u256(target, data, DECIMALS)?;
    if raw > U256::from(u8::MAX) {
        return Err(TopologyError::data_integrity(target, format!("decimals out of range: {}", raw)));
    }
    Ok(raw.as_u32() as u8)
}
