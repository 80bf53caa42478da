//! ERC-20 token metadata.
//!
//! A [`Token`] is created once by the [`TokenRegistry`](crate::token_registry::TokenRegistry)
//! after its `name()`, `symbol()` and `decimals()` calls all succeed, and is shared
//! read-only (`Arc<Token>`) by every pool that trades it.

use crate::types::conversions::{address_key, pow10};
use ethers::types::Address;
use num_rational::BigRational;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Token {
    pub address: Address,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

impl Token {
    pub fn new(address: Address, name: impl Into<String>, symbol: impl Into<String>, decimals: u8) -> Self {
        Self { address, name: name.into(), symbol: symbol.into(), decimals }
    }

    /// Tokens only exist once fully fetched.
    pub fn is_initialized(&self) -> bool {
        true
    }

    pub fn key(&self) -> String {
        address_key(self.address)
    }

    /// `10^decimals`, the divisor turning raw amounts into whole-token units.
    pub fn unit(&self) -> BigRational {
        BigRational::from_integer(pow10(self.decimals as u32))
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({:?})", self.symbol, self.address)
    }
}
