//! # Pair Graph
//!
//! Tokens are nodes, pools are edges. Both sets are keyed by address and
//! endpoints refer to each other by key only, never by pointer:
//!
//! - an edge exists iff both endpoint nodes exist and each lists it exactly once;
//! - removing an edge removes it from both endpoint lists and deletes any
//!   endpoint left with no edges, so no isolated node survives;
//! - a node's edge list keeps insertion order, which makes traversals
//!   deterministic for a given discovery order.
//!
//! Mutation needs `&mut Graph`; share it behind a lock (see [`crate::updater::SharedGraph`]).

use std::collections::{HashSet, VecDeque};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ethers::types::Address;
use futures::future::join_all;
use indexmap::IndexMap;
use tracing::{debug, info, trace, warn};

use crate::chain_client::ChainClient;
use crate::errors::{Result, TopologyError};
use crate::pool::Pool;
use crate::token::Token;
use crate::types::conversions::address_key;
use crate::utils::shard_ranges;

#[derive(Debug, Clone)]
pub struct Node {
    pub token: Arc<Token>,
    edges: Vec<Address>,
}

impl Node {
    /// Incident pool addresses in insertion order.
    pub fn edges(&self) -> &[Address] {
        &self.edges
    }

    pub fn degree(&self) -> usize {
        self.edges.len()
    }
}

#[derive(Debug, Clone)]
pub struct Edge {
    pub pool: Arc<Pool>,
}

impl Edge {
    pub fn address(&self) -> Address {
        self.pool.address
    }

    /// `(token0, token1)` addresses; reserve sides stay pool-relative.
    pub fn endpoints(&self) -> (Address, Address) {
        (self.pool.token0.address, self.pool.token1.address)
    }

    /// Endpoint opposite `token`, if `token` is an endpoint at all.
    pub fn other(&self, token: &Address) -> Option<Address> {
        self.pool.other_token(token).map(|t| t.address)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateReport {
    pub refreshed: usize,
    pub failed: usize,
    pub elapsed: Duration,
}

#[derive(Debug, Default)]
pub struct Graph {
    nodes: IndexMap<Address, Node>,
    edges: IndexMap<Address, Edge>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pools(pools: impl IntoIterator<Item = Arc<Pool>>) -> Self {
        let mut graph = Self::new();
        for pool in pools {
            if let Err(e) = graph.add_edge(pool) {
                warn!("skipping pool: {}", e);
            }
        }
        graph
    }

    /// Inserts `pool` as an edge, creating missing endpoint nodes.
    ///
    /// Returns `false` when a pool with the same address is already present.
    pub fn add_edge(&mut self, pool: Arc<Pool>) -> Result<bool> {
        if self.edges.contains_key(&pool.address) {
            return Ok(false);
        }
        if pool.token0.address == pool.token1.address {
            return Err(TopologyError::data_integrity(pool.address, "pool trades a token against itself"));
        }

        for token in [&pool.token0, &pool.token1] {
            self.nodes
                .entry(token.address)
                .or_insert_with(|| Node { token: Arc::clone(token), edges: Vec::new() })
                .edges
                .push(pool.address);
        }
        trace!(pool = %address_key(pool.address), "edge added");
        self.edges.insert(pool.address, Edge { pool });
        Ok(true)
    }

    /// Removes the edge for `pool` from the edge set and both endpoint lists,
    /// deleting endpoints left without edges.
    pub fn remove_edge(&mut self, pool: &Address) -> Option<Arc<Pool>> {
        let edge = self.edges.swap_remove(pool)?;
        let (a, b) = edge.endpoints();
        for token in [a, b] {
            let now_empty = match self.nodes.get_mut(&token) {
                Some(node) => {
                    if let Some(pos) = node.edges.iter().position(|e| e == pool) {
                        node.edges.remove(pos);
                    }
                    node.edges.is_empty()
                }
                None => false,
            };
            if now_empty {
                self.nodes.swap_remove(&token);
                trace!(token = %address_key(token), "node removed");
            }
        }
        Some(edge.pool)
    }

    /// Removes every edge incident to `token`, and with the last one the node itself.
    pub fn remove_node(&mut self, token: &Address) -> usize {
        let incident = match self.nodes.get(token) {
            Some(node) => node.edges.clone(),
            None => return 0,
        };
        incident.iter().filter(|pool| self.remove_edge(pool).is_some()).count()
    }

    /// Removes every edge not connected to `root`. Returns the number removed.
    ///
    /// When `root` is absent every edge is unreachable.
    pub fn retain_reachable(&mut self, root: &Address) -> usize {
        let mut reachable: HashSet<Address> = HashSet::new();
        if self.nodes.contains_key(root) {
            let mut queue = VecDeque::from([*root]);
            reachable.insert(*root);
            while let Some(current) = queue.pop_front() {
                for neighbor in self.neighbors(&current) {
                    if reachable.insert(neighbor) {
                        queue.push_back(neighbor);
                    }
                }
            }
        }

        let unreachable: Vec<Address> = self
            .edges
            .values()
            .filter(|e| !reachable.contains(&e.pool.token0.address))
            .map(|e| e.address())
            .collect();
        for pool in &unreachable {
            self.remove_edge(pool);
        }
        if !unreachable.is_empty() {
            debug!(removed = unreachable.len(), "dropped edges unreachable from root");
        }
        unreachable.len()
    }

    pub fn node(&self, token: &Address) -> Option<&Node> {
        self.nodes.get(token)
    }

    pub fn edge(&self, pool: &Address) -> Option<&Edge> {
        self.edges.get(pool)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn contains_node(&self, token: &Address) -> bool {
        self.nodes.contains_key(token)
    }

    pub fn contains_edge(&self, pool: &Address) -> bool {
        self.edges.contains_key(pool)
    }

    /// Opposite endpoints of `token`'s edges, in edge order. A token pair linked
    /// by several pools appears once per pool.
    pub fn neighbors(&self, token: &Address) -> Vec<Address> {
        self.nodes
            .get(token)
            .map(|node| {
                node.edges
                    .iter()
                    .filter_map(|pool| self.edges.get(pool).and_then(|e| e.other(token)))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn pool_addresses(&self) -> Vec<Address> {
        self.edges.keys().copied().collect()
    }

    /// Refreshes every pool's reserves over `workers` disjoint shards.
    ///
    /// Per-pool failures are logged and counted; the old reserves stay in place.
    pub async fn update_all(
        &self,
        client: Arc<dyn ChainClient>,
        workers: usize,
        block_number: Option<u64>,
    ) -> UpdateReport {
        let started = Instant::now();
        let pools: Arc<Vec<Arc<Pool>>> = Arc::new(self.edges.values().map(|e| Arc::clone(&e.pool)).collect());
        let shards = shard_ranges(pools.len(), workers);

        let tasks = shards.iter().cloned().map(|range| {
            let client = Arc::clone(&client);
            let pools = Arc::clone(&pools);
            tokio::spawn(async move {
                let mut refreshed = 0;
                let mut failed = 0;
                for pool in &pools[range] {
                    match pool.update_reserves(client.as_ref(), block_number).await {
                        Ok(()) => refreshed += 1,
                        Err(e) => {
                            debug!(pool = %pool.key(), error = %e, "reserve refresh failed");
                            failed += 1;
                        }
                    }
                }
                (refreshed, failed)
            })
        });

        let mut report = UpdateReport::default();
        for (range, joined) in shards.iter().zip(join_all(tasks).await) {
            match joined {
                Ok((refreshed, failed)) => {
                    report.refreshed += refreshed;
                    report.failed += failed;
                }
                Err(e) => {
                    warn!(shard = ?range, error = %e, "refresh shard aborted");
                    report.failed += range.len();
                }
            }
        }
        report.elapsed = started.elapsed();

        if report.failed > 0 {
            warn!(refreshed = report.refreshed, failed = report.failed, elapsed = ?report.elapsed, "⚠️ reserve refresh incomplete");
        } else {
            debug!(refreshed = report.refreshed, elapsed = ?report.elapsed, "reserve refresh complete");
        }
        report
    }

    /// Writes the current pool set, one normalized address per line.
    pub fn write_pool_addresses(&self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let mut out = std::io::BufWriter::new(std::fs::File::create(path)?);
        for pool in self.edges.keys() {
            writeln!(out, "{}", address_key(*pool))?;
        }
        out.flush()?;
        info!(pools = self.edges.len(), path = %path.display(), "📝 pool snapshot written");
        Ok(self.edges.len())
    }
}
