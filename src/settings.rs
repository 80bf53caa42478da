use config::{Config, ConfigError, File};
use ethers::types::Address;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::discovery::DiscoverySource;
use crate::errors::Result;
use crate::types::parse_address;
use crate::updater::OverlapPolicy;

/// Uniswap V2 factory on Ethereum mainnet.
pub const UNISWAP_V2_FACTORY: &str = "0x5C69bEe701ef814a2B6a3EDD4B1652CB9cc5aA6f";
/// WETH on Ethereum mainnet, the default trimming root.
pub const WETH: &str = "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2";

#[derive(Debug, Deserialize, Clone)]
pub struct Rpc {
    #[serde(default = "default_http_url")]
    pub http_url: String,
    #[serde(default)]
    pub ws_url: Option<String>,
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
}

fn default_http_url() -> String {
    "http://127.0.0.1:8545".to_string()
}
fn default_call_timeout_ms() -> u64 {
    10_000
}

impl Default for Rpc {
    fn default() -> Self {
        Self { http_url: default_http_url(), ws_url: None, call_timeout_ms: default_call_timeout_ms() }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Contracts {
    #[serde(default = "default_factory")]
    pub factory: Address,
    /// Token the trimmer roots its walk at.
    #[serde(default = "default_root_token")]
    pub root_token: Address,
}

fn default_factory() -> Address {
    parse_address(UNISWAP_V2_FACTORY).unwrap_or_default()
}
fn default_root_token() -> Address {
    parse_address(WETH).unwrap_or_default()
}

impl Default for Contracts {
    fn default() -> Self {
        Self { factory: default_factory(), root_token: default_root_token() }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Discovery {
    #[serde(default = "default_discovery_workers")]
    pub workers: usize,
    /// Read pool addresses from this file instead of enumerating the factory.
    #[serde(default)]
    pub address_file: Option<PathBuf>,
    #[serde(default)]
    pub start_index: Option<u64>,
    #[serde(default)]
    pub end_index: Option<u64>,
}

fn default_discovery_workers() -> usize {
    12
}

impl Default for Discovery {
    fn default() -> Self {
        Self { workers: default_discovery_workers(), address_file: None, start_index: None, end_index: None }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Trim {
    #[serde(default)]
    pub enabled: bool,
    /// Minimum pool-side liquidity, in whole root-token units.
    #[serde(default = "default_threshold")]
    pub threshold: Decimal,
    #[serde(default)]
    pub drop_unreached: bool,
}

fn default_threshold() -> Decimal {
    Decimal::from(30)
}

impl Default for Trim {
    fn default() -> Self {
        Self { enabled: false, threshold: default_threshold(), drop_unreached: false }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Updater {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_updater_workers")]
    pub workers: usize,
    #[serde(default)]
    pub overlap: OverlapPolicy,
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_true() -> bool {
    true
}
fn default_updater_workers() -> usize {
    24
}
fn default_event_capacity() -> usize {
    64
}

impl Default for Updater {
    fn default() -> Self {
        Self {
            enabled: true,
            workers: default_updater_workers(),
            overlap: OverlapPolicy::default(),
            event_capacity: default_event_capacity(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Log {
    /// Where to write the surviving pool addresses after discovery/trimming.
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub rpc: Rpc,
    #[serde(default)]
    pub contracts: Contracts,
    #[serde(default)]
    pub discovery: Discovery,
    #[serde(default)]
    pub trim: Trim,
    #[serde(default)]
    pub updater: Updater,
    #[serde(default)]
    pub log: Log,
}

impl Settings {
    /// Loads `Config.toml` from the working directory, then applies `SDK_*` overrides.
    pub fn new() -> Result<Self> {
        Self::from_path("Config.toml")
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let s = Config::builder()
            .add_source(File::from(path))
            .build()?;

        let mut settings: Self = s.try_deserialize()?;
        settings.apply_overrides(|key| env::var(key).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    /// Applies `SDK_*` overrides; `lookup` resolves a variable name to its value.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(url) = get("SDK_RPC_HTTP_URL") {
            self.rpc.http_url = url;
        }
        if let Some(url) = get("SDK_RPC_WS_URL") {
            self.rpc.ws_url = Some(url);
        }
        if let Some(raw) = get("SDK_CONTRACTS_ROOT_TOKEN") {
            self.contracts.root_token = parse_address(&raw)
                .map_err(|e| ConfigError::Message(format!("SDK_CONTRACTS_ROOT_TOKEN: {}", e)))?;
        }
        if let Some(raw) = get("SDK_CONTRACTS_FACTORY") {
            self.contracts.factory = parse_address(&raw)
                .map_err(|e| ConfigError::Message(format!("SDK_CONTRACTS_FACTORY: {}", e)))?;
        }
        if let Some(raw) = get("SDK_TRIM_THRESHOLD") {
            self.trim.threshold = Decimal::from_str(&raw)
                .map_err(|e| ConfigError::Message(format!("SDK_TRIM_THRESHOLD '{}': {}", raw, e)))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.trim.threshold.is_sign_negative() {
            return Err(ConfigError::Message(format!("trim.threshold must be >= 0, got {}", self.trim.threshold)).into());
        }
        if let (Some(start), Some(end)) = (self.discovery.start_index, self.discovery.end_index) {
            if start > end {
                return Err(ConfigError::Message(format!(
                    "discovery.start_index ({}) is past discovery.end_index ({})",
                    start, end
                ))
                .into());
            }
        }
        Ok(())
    }

    /// Resolves the configured discovery input: an address file if one is set,
    /// otherwise the factory (optionally limited to an index range).
    pub fn discovery_source(&self) -> Result<DiscoverySource> {
        if let Some(path) = &self.discovery.address_file {
            return DiscoverySource::from_address_file(path);
        }
        let factory = self.contracts.factory;
        Ok(match (self.discovery.start_index, self.discovery.end_index) {
            (None, None) => DiscoverySource::Factory { factory },
            (start, end) => DiscoverySource::FactoryRange {
                factory,
                start: start.unwrap_or(0),
                end: end.unwrap_or(u64::MAX),
            },
        })
    }

    pub fn call_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.rpc.call_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_follow_mainnet_uniswap_v2() {
        let s = Settings::default();
        assert_eq!(s.discovery.workers, 12);
        assert_eq!(s.updater.workers, 24);
        assert_eq!(s.trim.threshold, Decimal::from(30));
        assert_eq!(s.updater.overlap, OverlapPolicy::CatchUp);
        assert_eq!(s.contracts.root_token, parse_address(WETH).unwrap());
        assert_eq!(
            s.discovery_source().unwrap(),
            DiscoverySource::Factory { factory: parse_address(UNISWAP_V2_FACTORY).unwrap() }
        );
    }

    #[test]
    fn overrides_replace_values() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("SDK_RPC_HTTP_URL", "http://node:8545"),
            ("SDK_TRIM_THRESHOLD", "12.5"),
            ("SDK_CONTRACTS_ROOT_TOKEN", "0x6B175474E89094C44Da98b954EedeAC495271d0F"),
            ("SDK_RPC_WS_URL", "   "),
        ]);
        let mut s = Settings::default();
        s.apply_overrides(|k| vars.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(s.rpc.http_url, "http://node:8545");
        assert_eq!(s.trim.threshold, Decimal::from_str("12.5").unwrap());
        assert_eq!(s.rpc.ws_url, None);
        assert_eq!(s.contracts.root_token, parse_address("0x6b175474e89094c44da98b954eedeac495271d0f").unwrap());
    }

    #[test]
    fn malformed_override_is_a_config_error() {
        let mut s = Settings::default();
        let err = s.apply_overrides(|k| (k == "SDK_TRIM_THRESHOLD").then(|| "thirty".to_string()));
        assert!(matches!(err, Err(crate::errors::TopologyError::Config(_))));
    }

    #[test]
    fn index_range_becomes_factory_range() {
        let mut s = Settings::default();
        s.discovery.start_index = Some(100);
        assert!(matches!(
            s.discovery_source().unwrap(),
            DiscoverySource::FactoryRange { start: 100, end: u64::MAX, .. }
        ));
        s.discovery.end_index = Some(50);
        assert!(s.validate().is_err());
    }
}
