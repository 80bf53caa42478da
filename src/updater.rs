//! # Live Reserve Refresh
//!
//! One refresh per chain head: every pool in the shared graph re-reads its
//! reserves, then the strategy hook sees the refreshed graph.
//!
//! A refresh holds the graph's write lock for the whole fan-out and downgrades
//! it to a read lock for the strategy call, so no reader ever observes a graph
//! where some pools are at block N and others at N-1.
//!
//! ## Overlap
//!
//! Heads can arrive faster than a refresh completes. With
//! [`OverlapPolicy::Queue`] every head gets its own refresh, in order. With
//! [`OverlapPolicy::CatchUp`] (the default) heads that piled up during a
//! refresh are collapsed and only the newest one is refreshed.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use ethers::types::Address;
use futures::{FutureExt, Stream, StreamExt};
use serde::Deserialize;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

use crate::chain_client::ChainClient;
use crate::errors::{Result, TopologyError};
use crate::graph::{Graph, UpdateReport};
use crate::metrics;

pub type SharedGraph = Arc<RwLock<Graph>>;

const DEFAULT_EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// Refresh for every head, in arrival order.
    Queue,
    /// Drop heads that arrived mid-refresh and refresh once for the newest.
    #[default]
    CatchUp,
}

impl FromStr for OverlapPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "queue" => Ok(Self::Queue),
            "catch_up" | "catchup" | "catch-up" => Ok(Self::CatchUp),
            other => Err(format!("unknown overlap policy '{}'", other)),
        }
    }
}

impl fmt::Display for OverlapPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queue => write!(f, "queue"),
            Self::CatchUp => write!(f, "catch_up"),
        }
    }
}

/// Published after every completed refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshEvent {
    pub block_number: u64,
    pub report: UpdateReport,
    /// Heads collapsed into this refresh under [`OverlapPolicy::CatchUp`].
    pub skipped: usize,
}

/// Downstream consumer of a freshly refreshed graph (e.g. a path search).
#[async_trait]
pub trait Strategy: Send + Sync {
    async fn on_refresh(&self, block_number: u64, graph: &Graph);
}

/// Strategy that only logs the graph it is handed.
pub struct LogStrategy;

#[async_trait]
impl Strategy for LogStrategy {
    async fn on_refresh(&self, block_number: u64, graph: &Graph) {
        info!(
            block = block_number,
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "graph ready for block"
        );
    }
}

pub struct Updater {
    graph: SharedGraph,
    client: Arc<dyn ChainClient>,
    workers: usize,
    policy: OverlapPolicy,
    strategy: Option<Arc<dyn Strategy>>,
    events: broadcast::Sender<RefreshEvent>,
}

impl Updater {
    pub fn new(graph: SharedGraph, client: Arc<dyn ChainClient>, workers: usize) -> Self {
        let (events, _) = broadcast::channel(DEFAULT_EVENT_CAPACITY);
        Self { graph, client, workers, policy: OverlapPolicy::default(), strategy: None, events }
    }

    pub fn with_policy(mut self, policy: OverlapPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_strategy(mut self, strategy: Arc<dyn Strategy>) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Replaces the event channel; existing subscribers stop receiving events.
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        self.events = events;
        self
    }

    pub fn graph(&self) -> &SharedGraph {
        &self.graph
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RefreshEvent> {
        self.events.subscribe()
    }

    /// Runs one refresh for `block_number` to completion.
    pub async fn refresh(&self, block_number: u64) -> RefreshEvent {
        self.refresh_collapsed(block_number, 0).await
    }

    async fn refresh_collapsed(&self, block_number: u64, skipped: usize) -> RefreshEvent {
        let guard = self.graph.write().await;
        let report = guard
            .update_all(Arc::clone(&self.client), self.workers, Some(block_number))
            .await;
        let guard = guard.downgrade();

        if let Some(strategy) = &self.strategy {
            strategy.on_refresh(block_number, &guard).await;
        }
        drop(guard);

        info!(
            block = block_number,
            refreshed = report.refreshed,
            failed = report.failed,
            skipped,
            elapsed = ?report.elapsed,
            "🔄 reserves refreshed"
        );
        metrics::record_refresh(report.refreshed, report.failed, skipped, report.elapsed);

        let event = RefreshEvent { block_number, report, skipped };
        if self.events.send(event.clone()).is_err() {
            debug!(block = block_number, "no refresh subscribers");
        }
        event
    }

    /// Subscribes to new heads and refreshes until the subscription ends.
    ///
    /// The head stream ending is reported as a transport error.
    pub async fn run(&self) -> Result<()> {
        let heads = self.client.subscribe_new_heads().await?;
        info!(policy = %self.policy, workers = self.workers, "updater subscribed to new heads");
        let refreshes = self.run_with_heads(heads).await?;
        warn!(refreshes, "head stream ended");
        Err(TopologyError::transport(Address::zero(), "new-heads stream ended"))
    }

    /// Refreshes once per head from `heads` (subject to the overlap policy) and
    /// returns the number of refreshes once the stream ends.
    pub async fn run_with_heads<S>(&self, mut heads: S) -> Result<usize>
    where
        S: Stream<Item = u64> + Send + Unpin,
    {
        let mut refreshes = 0;
        while let Some(mut block_number) = heads.next().await {
            let mut skipped = 0;
            let mut ended = false;
            if self.policy == OverlapPolicy::CatchUp {
                loop {
                    match heads.next().now_or_never() {
                        Some(Some(newer)) => {
                            skipped += 1;
                            block_number = newer;
                        }
                        Some(None) => {
                            ended = true;
                            break;
                        }
                        None => break,
                    }
                }
                if skipped > 0 {
                    debug!(block = block_number, skipped, "catching up to newest head");
                }
            }

            self.refresh_collapsed(block_number, skipped).await;
            refreshes += 1;
            if ended {
                break;
            }
        }
        Ok(refreshes)
    }
}
