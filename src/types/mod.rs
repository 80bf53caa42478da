/// Numeric and address conversions shared by pricing, configuration and logging
pub mod conversions;

pub use conversions::{address_key, parse_address, ConversionError};
