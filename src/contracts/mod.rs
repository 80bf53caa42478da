// Contracts Module - call encoding and return decoding for the read-only methods the SDK uses

pub mod erc20;
pub mod uniswap_v2_factory;
pub mod uniswap_v2_pair;

use crate::errors::{Result, TopologyError};
use ethers::abi::Token as AbiToken;
use ethers::types::{Address, Bytes, U256};
use ethers::utils::keccak256;

const WORD: usize = 32;

/// First four bytes of `keccak256(signature)`, e.g. `selector("getReserves()") == 0x0902f1ac`.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

pub fn encode_call(signature: &str, args: &[AbiToken]) -> Bytes {
    let mut data = selector(signature).to_vec();
    data.extend(ethers::abi::encode(args));
    Bytes::from(data)
}

fn expect_words(target: Address, data: &[u8], words: usize, method: &str) -> Result<()> {
    if data.is_empty() {
        return Err(TopologyError::data_integrity(target, format!("empty {} return", method)));
    }
    if data.len() < words * WORD {
        return Err(TopologyError::data_integrity(
            target,
            format!("{} returned {} bytes, expected at least {}", method, data.len(), words * WORD),
        ));
    }
    Ok(())
}

fn word(data: &[u8], index: usize) -> U256 {
    U256::from_big_endian(&data[index * WORD..(index + 1) * WORD])
}

pub(crate) fn decode_u256(target: Address, data: &[u8], method: &str) -> Result<U256> {
    expect_words(target, data, 1, method)?;
    Ok(word(data, 0))
}

pub(crate) fn decode_address(target: Address, data: &[u8], method: &str) -> Result<Address> {
    expect_words(target, data, 1, method)?;
    let addr = Address::from_slice(&data[12..WORD]);
    if addr.is_zero() {
        return Err(TopologyError::data_integrity(target, format!("{} returned the zero address", method)));
    }
    Ok(addr)
}
