//! Constant-product pair and its pricing primitives.
//!
//! Reserves are kept as the raw 256-bit words returned by `getReserves()` and
//! published as one immutable [`Reserves`] snapshot through `ArcSwap`, so a
//! concurrent reader sees either the old pair of reserves or the new one, never
//! a mix. All arithmetic is exact (`BigUint` / `BigRational`).

use crate::chain_client::ChainClient;
use crate::contracts::uniswap_v2_pair;
use crate::errors::{Result, TopologyError};
use crate::token::Token;
use crate::token_registry::TokenRegistry;
use crate::types::conversions::{address_key, pow10_ratio, ratio_to_decimal, u256_to_biguint, u256_to_ratio};
use arc_swap::ArcSwap;
use ethers::types::{Address, U256};
use num_bigint::BigUint;
use num_rational::BigRational;
use num_traits::{Signed, Zero};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reserves {
    pub reserve0: U256,
    pub reserve1: U256,
    /// Block the reserves were read at, when the caller knew it.
    pub block_number: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Zero,
    One,
}

#[derive(Debug)]
pub struct Pool {
    pub address: Address,
    pub token0: Arc<Token>,
    pub token1: Arc<Token>,
    reserves: ArcSwap<Reserves>,
}

impl Pool {
    pub fn new(address: Address, token0: Arc<Token>, token1: Arc<Token>, reserve0: U256, reserve1: U256) -> Self {
        Self {
            address,
            token0,
            token1,
            reserves: ArcSwap::from_pointee(Reserves { reserve0, reserve1, block_number: None }),
        }
    }

    /// Builds a pool from chain state: `token0()`/`token1()`, both tokens through
    /// the registry, then `getReserves()`. Any failure drops the whole pool.
    pub async fn fetch(client: &dyn ChainClient, registry: &TokenRegistry, address: Address) -> Result<Self> {
        let (t0, t1) = uniswap_v2_pair::fetch_tokens(client, address).await?;
        if t0 == t1 {
            return Err(TopologyError::data_integrity(address, "pair lists the same token twice"));
        }
        let token0 = registry.resolve(client, t0).await?;
        let token1 = registry.resolve(client, t1).await?;
        let (reserve0, reserve1) = uniswap_v2_pair::fetch_reserves(client, address).await?;
        Ok(Self::new(address, token0, token1, reserve0, reserve1))
    }

    /// Always true: a `Pool` is only constructed from a complete fetch.
    pub fn is_initialized(&self) -> bool {
        true
    }

    pub fn key(&self) -> String {
        address_key(self.address)
    }

    /// Current reserves snapshot.
    pub fn reserves(&self) -> Arc<Reserves> {
        self.reserves.load_full()
    }

    pub fn contains(&self, token: &Address) -> bool {
        self.side(token).is_some()
    }

    pub fn other_token(&self, token: &Address) -> Option<&Arc<Token>> {
        match self.side(token)? {
            Side::Zero => Some(&self.token1),
            Side::One => Some(&self.token0),
        }
    }

    /// `reserve0 * reserve1`. Diagnostic only.
    pub fn invariant(&self) -> BigUint {
        let r = self.reserves.load();
        u256_to_biguint(r.reserve0) * u256_to_biguint(r.reserve1)
    }

    /// Raw reserve on `token`'s side; zero for a token this pool does not trade.
    pub fn reserve_of(&self, token: &Address) -> U256 {
        let r = self.reserves.load();
        match self.side(token) {
            Some(Side::Zero) => r.reserve0,
            Some(Side::One) => r.reserve1,
            None => U256::zero(),
        }
    }

    /// Reserve on `token`'s side in whole-token units (`reserve / 10^decimals`).
    pub fn adjusted_reserve_of(&self, token: &Address) -> BigRational {
        match self.side(token) {
            Some(side) => u256_to_ratio(self.reserve_of(token)) / self.token(side).unit(),
            None => BigRational::zero(),
        }
    }

    /// Marginal price of `token` in units of the other token, decimal adjusted.
    ///
    /// Zero when either reserve is zero or `token` is not part of this pool.
    pub fn price_of(&self, token: &Address) -> BigRational {
        let Some(side) = self.side(token) else {
            return BigRational::zero();
        };
        let r = self.reserves.load();
        let (this_reserve, other_reserve) = match side {
            Side::Zero => (r.reserve0, r.reserve1),
            Side::One => (r.reserve1, r.reserve0),
        };
        if this_reserve.is_zero() || other_reserve.is_zero() {
            return BigRational::zero();
        }
        let this_decimals = self.token(side).decimals as i32;
        let other_decimals = self.token(side.flip()).decimals as i32;
        u256_to_ratio(other_reserve) / u256_to_ratio(this_reserve) * pow10_ratio(this_decimals - other_decimals)
    }

    /// Output of swapping `amount_in` raw units of `token_in`, with no fee deducted:
    /// `reserveOut - reserveIn * reserveOut / (reserveIn + amountIn)`.
    pub fn amount_out(&self, token_in: &Address, amount_in: &BigRational) -> Result<BigRational> {
        let side = self.side(token_in).ok_or_else(|| {
            TopologyError::data_integrity(self.address, format!("{:?} is not traded by this pool", token_in))
        })?;
        if amount_in.is_negative() {
            return Err(TopologyError::Precondition(format!("negative swap amount {}", amount_in)));
        }
        let r = self.reserves.load();
        let (reserve_in, reserve_out) = match side {
            Side::Zero => (u256_to_ratio(r.reserve0), u256_to_ratio(r.reserve1)),
            Side::One => (u256_to_ratio(r.reserve1), u256_to_ratio(r.reserve0)),
        };
        let denominator = &reserve_in + amount_in;
        if denominator.is_zero() {
            return Ok(BigRational::zero());
        }
        Ok(&reserve_out - (&reserve_in * &reserve_out) / denominator)
    }

    /// Re-reads `getReserves()` and publishes both reserves in one swap.
    pub async fn update_reserves(&self, client: &dyn ChainClient, block_number: Option<u64>) -> Result<()> {
        let (reserve0, reserve1) = uniswap_v2_pair::fetch_reserves(client, self.address).await?;
        self.store_reserves(reserve0, reserve1, block_number);
        Ok(())
    }

    pub(crate) fn store_reserves(&self, reserve0: U256, reserve1: U256, block_number: Option<u64>) {
        self.reserves.store(Arc::new(Reserves { reserve0, reserve1, block_number }));
    }

    fn side(&self, token: &Address) -> Option<Side> {
        if *token == self.token0.address {
            Some(Side::Zero)
        } else if *token == self.token1.address {
            Some(Side::One)
        } else {
            None
        }
    }

    fn token(&self, side: Side) -> &Arc<Token> {
        match side {
            Side::Zero => &self.token0,
            Side::One => &self.token1,
        }
    }
}

impl Side {
    fn flip(self) -> Self {
        match self {
            Side::Zero => Side::One,
            Side::One => Side::Zero,
        }
    }
}

impl fmt::Display for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let price = ratio_to_decimal(&self.price_of(&self.token0.address), 6)
            .map(|d| d.to_string())
            .unwrap_or_else(|_| "overflow".to_string());
        write!(
            f,
            "{}/{} @ {:?} (1 {} = {} {})",
            self.token0.symbol, self.token1.symbol, self.address, self.token0.symbol, price, self.token1.symbol
        )
    }
}
