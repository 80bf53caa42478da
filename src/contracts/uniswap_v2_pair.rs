// Uniswap V2 pair calls: token0(), token1(), getReserves()

use super::{decode_address, encode_call, expect_words, word};
use crate::chain_client::ChainClient;
use crate::errors::Result;
use ethers::types::{Address, U256};

pub const TOKEN0: &str = "token0()";
pub const TOKEN1: &str = "token1()";
pub const GET_RESERVES: &str = "getReserves()";

pub async fn fetch_tokens(client: &dyn ChainClient, pair: Address) -> Result<(Address, Address)> {
    let t0 = client.call_contract(pair, encode_call(TOKEN0, &[])).await?;
    let t1 = client.call_contract(pair, encode_call(TOKEN1, &[])).await?;
    Ok((decode_address(pair, &t0, TOKEN0)?, decode_address(pair, &t1, TOKEN1)?))
}

pub async fn fetch_reserves(client: &dyn ChainClient, pair: Address) -> Result<(U256, U256)> {
    let data = client.call_contract(pair, encode_call(GET_RESERVES, &[])).await?;
    decode_reserves(pair, &data)
}

/// `getReserves()` returns `(uint112, uint112, uint32)`; the timestamp word is ignored.
pub fn decode_reserves(pair: Address, data: &[u8]) -> Result<(U256, U256)> {
    expect_words(pair, data, 2, GET_RESERVES)?;
    Ok((word(data, 0), word(data, 1)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::abi::{encode, Token as AbiToken};

    #[test]
    fn reserves_need_two_words() {
        let pair = Address::repeat_byte(9);
        let one_word = encode(&[AbiToken::Uint(U256::from(5u64))]);
        assert!(decode_reserves(pair, &one_word).is_err());

        let full = encode(&[
            AbiToken::Uint(U256::from(1000u64)),
            AbiToken::Uint(U256::from(2000u64)),
            AbiToken::Uint(U256::from(1_700_000_000u64)),
        ]);
        assert_eq!(decode_reserves(pair, &full).unwrap(), (U256::from(1000u64), U256::from(2000u64)));
    }
}
