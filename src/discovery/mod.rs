//! # Pool Discovery
//!
//! Concurrent bulk discovery of constant-product pairs.
//!
//! The unit space (an explicit address list, or an index range of a factory's
//! `allPairs`) is split into contiguous disjoint shards, one `tokio` task per
//! shard. Inside a shard, units run sequentially: resolve the pair address,
//! fetch `token0()`/`token1()`, resolve both tokens through the shared
//! [`TokenRegistry`], fetch `getReserves()`. A unit that fails at any step is
//! logged and dropped; it never cancels its shard or its siblings. The only
//! run-fatal failure is the factory's `allPairsLength()`.

use std::ops::Range;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ethers::types::Address;
use futures::future::join_all;
use log::{debug, error, info, warn};

use crate::chain_client::ChainClient;
use crate::errors::Result;
use crate::metrics;
use crate::pool::Pool;
use crate::token_registry::TokenRegistry;
use crate::types::parse_address;
use crate::utils::shard_ranges;

/// Where the pool addresses come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoverySource {
    Addresses(Vec<Address>),
    /// Every pair the factory has created, `0..allPairsLength()`.
    Factory { factory: Address },
    /// `start..end` of the factory's pairs, clamped to `allPairsLength()`.
    FactoryRange { factory: Address, start: u64, end: u64 },
}

impl DiscoverySource {
    /// One pool address per line; blank lines and `#` comments are ignored and
    /// malformed lines are logged and skipped.
    pub fn from_address_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let mut addresses = Vec::new();
        for (lineno, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match parse_address(line) {
                Ok(addr) => addresses.push(addr),
                Err(e) => warn!("⚠️ Skipping {}:{}: {}", path.display(), lineno + 1, e),
            }
        }
        info!("Loaded {} pool addresses from {}", addresses.len(), path.display());
        Ok(Self::Addresses(addresses))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryReport {
    pub expected: usize,
    pub discovered: usize,
    pub dropped: usize,
    pub elapsed: Duration,
}

#[derive(Debug, Default)]
pub struct DiscoveryResult {
    pub pools: Vec<Arc<Pool>>,
    pub report: DiscoveryReport,
}

#[derive(Clone)]
enum Plan {
    Addresses(Arc<Vec<Address>>),
    Factory { factory: Address, start: u64, len: usize },
}

impl Plan {
    fn len(&self) -> usize {
        match self {
            Plan::Addresses(list) => list.len(),
            Plan::Factory { len, .. } => *len,
        }
    }

    async fn resolve(&self, client: &dyn ChainClient, i: usize) -> Result<Address> {
        match self {
            Plan::Addresses(list) => Ok(list[i]),
            Plan::Factory { factory, start, .. } => client.pair_address_at(*factory, start + i as u64).await,
        }
    }
}

pub struct Discovery {
    client: Arc<dyn ChainClient>,
    registry: Arc<TokenRegistry>,
    workers: usize,
}

impl Discovery {
    pub fn new(client: Arc<dyn ChainClient>, registry: Arc<TokenRegistry>, workers: usize) -> Self {
        Self { client, registry, workers }
    }

    pub fn registry(&self) -> &Arc<TokenRegistry> {
        &self.registry
    }

    /// Discovers every pool in `source`.
    ///
    /// Pools from different shards come back in no particular order; within a
    /// shard the unit order is kept.
    pub async fn discover_all(&self, source: &DiscoverySource) -> Result<DiscoveryResult> {
        let started = Instant::now();
        let plan = self.plan(source).await?;
        let expected = plan.len();
        let shards = shard_ranges(expected, self.workers);
        info!(
            "🔍 Discovering {} pools with {} workers via {}",
            expected,
            shards.len(),
            self.client.name()
        );

        let tasks = shards.iter().cloned().map(|range| {
            let client = Arc::clone(&self.client);
            let registry = Arc::clone(&self.registry);
            let plan = plan.clone();
            tokio::spawn(async move { run_shard(client.as_ref(), &registry, &plan, range).await })
        });

        let mut pools = Vec::with_capacity(expected);
        let mut dropped = 0;
        for (range, joined) in shards.iter().zip(join_all(tasks).await) {
            match joined {
                Ok((shard_pools, shard_dropped)) => {
                    pools.extend(shard_pools);
                    dropped += shard_dropped;
                }
                Err(e) => {
                    error!("❌ Discovery shard {:?} aborted: {}", range, e);
                    dropped += range.len();
                }
            }
        }

        let report = DiscoveryReport { expected, discovered: pools.len(), dropped, elapsed: started.elapsed() };
        if report.dropped > 0 {
            warn!(
                "⚠️ Discovered {}/{} pools ({} dropped) in {:?}",
                report.discovered, report.expected, report.dropped, report.elapsed
            );
        } else {
            info!("✅ Discovered {}/{} pools in {:?}", report.discovered, report.expected, report.elapsed);
        }
        metrics::record_discovery(report.expected, report.discovered, report.dropped, report.elapsed);

        Ok(DiscoveryResult { pools, report })
    }

    async fn plan(&self, source: &DiscoverySource) -> Result<Plan> {
        match source {
            DiscoverySource::Addresses(list) => Ok(Plan::Addresses(Arc::new(list.clone()))),
            DiscoverySource::Factory { factory } => {
                let count = self.client.pair_count(*factory).await?;
                Ok(Plan::Factory { factory: *factory, start: 0, len: count as usize })
            }
            DiscoverySource::FactoryRange { factory, start, end } => {
                let count = self.client.pair_count(*factory).await?;
                let end = (*end).min(count);
                let start = (*start).min(end);
                Ok(Plan::Factory { factory: *factory, start, len: (end - start) as usize })
            }
        }
    }
}

async fn run_shard(
    client: &dyn ChainClient,
    registry: &TokenRegistry,
    plan: &Plan,
    range: Range<usize>,
) -> (Vec<Arc<Pool>>, usize) {
    let mut pools = Vec::with_capacity(range.len());
    let mut dropped = 0;
    for i in range {
        let outcome = match plan.resolve(client, i).await {
            Ok(address) => Pool::fetch(client, registry, address).await,
            Err(e) => Err(e),
        };
        match outcome {
            Ok(pool) => pools.push(Arc::new(pool)),
            Err(e) => {
                debug!("dropping discovery unit {}: {}", i, e);
                dropped += 1;
            }
        }
    }
    (pools, dropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::StaticChain;
    use ethers::types::U256;
    use std::io::Write;

    #[test]
    fn address_file_skips_comments_and_garbage() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# pools").unwrap();
        writeln!(file, "0xB4e16d0168e52d35CaCD2c6185b44281Ec28C9Dc").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "not-an-address").unwrap();
        writeln!(file, "  0x0d4a11d5eeaac28ec3f61d100daf4d40471f1852  ").unwrap();

        let source = DiscoverySource::from_address_file(file.path()).unwrap();
        match source {
            DiscoverySource::Addresses(list) => assert_eq!(list.len(), 2),
            other => panic!("unexpected source {:?}", other),
        }
    }

    #[test]
    fn missing_address_file_is_an_error() {
        assert!(DiscoverySource::from_address_file("/definitely/not/here.txt").is_err());
    }

    #[tokio::test]
    async fn factory_range_is_clamped() {
        let chain = Arc::new(StaticChain::new());
        let (a, b) = (Address::repeat_byte(1), Address::repeat_byte(2));
        chain.add_token(a, "A", "A", 18);
        chain.add_token(b, "B", "B", 18);
        let pairs: Vec<Address> = (10..15u8).map(Address::repeat_byte).collect();
        for p in &pairs {
            chain.add_pair(*p, a, b, U256::from(1u64), U256::from(1u64));
        }
        let factory = Address::repeat_byte(0xfa);
        chain.add_factory(factory, pairs);

        let discovery = Discovery::new(chain, Arc::new(TokenRegistry::new()), 3);
        let result = discovery
            .discover_all(&DiscoverySource::FactoryRange { factory, start: 3, end: 100 })
            .await
            .unwrap();
        assert_eq!(result.report.expected, 2);
        assert_eq!(result.report.discovered, 2);
    }
}
