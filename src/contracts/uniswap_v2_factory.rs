// Uniswap V2 factory calls: allPairsLength(), allPairs(uint256)

use super::{decode_u256, encode_call};
use crate::errors::{Result, TopologyError};
use ethers::abi::Token as AbiToken;
use ethers::types::{Address, Bytes, U256};

pub const ALL_PAIRS_LENGTH: &str = "allPairsLength()";
pub const ALL_PAIRS: &str = "allPairs(uint256)";

pub fn encode_all_pairs_length() -> Bytes {
    encode_call(ALL_PAIRS_LENGTH, &[])
}

pub fn encode_all_pairs(index: u64) -> Bytes {
    encode_call(ALL_PAIRS, &[AbiToken::Uint(U256::from(index))])
}

pub fn decode_pair_count(factory: Address, data: &[u8]) -> Result<u64> {
    let raw = decode_u256(factory, data, ALL_PAIRS_LENGTH)?;
    if raw > U256::from(u64::MAX) {
        return Err(TopologyError::data_integrity(factory, format!("pair count out of range: {}", raw)));
    }
    Ok(raw.as_u64())
}
