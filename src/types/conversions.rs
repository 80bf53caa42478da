use ethers::types::{Address, U256};
use num_bigint::{BigInt, BigUint};
use num_rational::BigRational;
use num_traits::ToPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;

// Reserves arrive as 256-bit words; all arithmetic happens on unbounded integers.
pub fn u256_to_biguint(value: U256) -> BigUint {
    let mut buf = [0u8; 32];
    value.to_big_endian(&mut buf);
    BigUint::from_bytes_be(&buf)
}

pub fn u256_to_bigint(value: U256) -> BigInt {
    BigInt::from(u256_to_biguint(value))
}

pub fn u256_to_ratio(value: U256) -> BigRational {
    BigRational::from_integer(u256_to_bigint(value))
}

pub fn pow10(exp: u32) -> BigInt {
    BigInt::from(10u32).pow(exp)
}

/// `10^exp` as a rational, for signed exponents (decimal differences between tokens).
pub fn pow10_ratio(exp: i32) -> BigRational {
    let magnitude = pow10(exp.unsigned_abs());
    if exp >= 0 {
        BigRational::from_integer(magnitude)
    } else {
        BigRational::new(BigInt::from(1u32), magnitude)
    }
}

/// Exact conversion of a configured decimal (e.g. a liquidity threshold) into a rational.
pub fn decimal_to_ratio(value: Decimal) -> BigRational {
    BigRational::new(BigInt::from(value.mantissa()), pow10(value.scale()))
}

/// Truncating conversion of a rational into a `Decimal` with `scale` fractional digits.
/// Used for logs and reports; never feeds back into pricing.
pub fn ratio_to_decimal(value: &BigRational, scale: u32) -> Result<Decimal, ConversionError> {
    let scaled = (value.numer() * pow10(scale)) / value.denom();
    let as_i128 = scaled.to_i128().ok_or(ConversionError::Overflow)?;
    Decimal::try_from_i128_with_scale(as_i128, scale)
        .map_err(|e| ConversionError::InvalidDecimal(e.to_string()))
}

// Normalized address key: lowercase 0x-prefixed hex
pub fn address_key(addr: Address) -> String {
    format!("{:?}", addr).to_lowercase()
}

pub fn parse_address(s: &str) -> Result<Address, ConversionError> {
    let trimmed = s.trim();
    Address::from_str(trimmed).map_err(|e| ConversionError::InvalidAddress(format!("{}: {}", trimmed, e)))
}

#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("Invalid decimal: {0}")]
    InvalidDecimal(String),
    #[error("Overflow in conversion")]
    Overflow,
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}
