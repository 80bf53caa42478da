//! End-to-end pipeline tests: discovery -> graph -> trimming -> per-block refresh
//!
//! Everything runs against the in-memory chain, with heads pushed by the test.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ethers::types::{Address, U256};
use pair_topology_sdk::clients::StaticChain;
use pair_topology_sdk::{
    Discovery, DiscoverySource, Graph, LiquidityTrimmer, OverlapPolicy, Strategy, TokenRegistry,
    TopologyError, Updater,
};
use rust_decimal::Decimal;
use tokio::sync::{Mutex, RwLock};

const WETH: u8 = 0xc0;
const USDC: u8 = 0x0a;
const DUST: u8 = 0x0b;

fn whole(amount: u64, decimals: u8) -> U256 {
    U256::from(amount) * U256::exp10(decimals as usize)
}

/// WETH/USDC is deep, WETH/DUST is thin
fn build_chain() -> Arc<StaticChain> {
    let chain = Arc::new(StaticChain::new());
    chain.add_token(Address::repeat_byte(WETH), "Wrapped Ether", "WETH", 18);
    chain.add_token(Address::repeat_byte(USDC), "USD Coin", "USDC", 6);
    chain.add_token(Address::repeat_byte(DUST), "Dust", "DUST", 18);

    chain.add_pair(
        Address::repeat_byte(0xa0),
        Address::repeat_byte(WETH),
        Address::repeat_byte(USDC),
        whole(500, 18),
        whole(1_000_000, 6),
    );
    chain.add_pair(
        Address::repeat_byte(0xa1),
        Address::repeat_byte(DUST),
        Address::repeat_byte(WETH),
        whole(10_000, 18),
        whole(2, 18),
    );
    chain.add_factory(Address::repeat_byte(0xfa), vec![Address::repeat_byte(0xa0), Address::repeat_byte(0xa1)]);
    chain
}

async fn build_graph(chain: Arc<StaticChain>) -> Graph {
    let discovery = Discovery::new(chain, Arc::new(TokenRegistry::new()), 2);
    let result = discovery
        .discover_all(&DiscoverySource::Factory { factory: Address::repeat_byte(0xfa) })
        .await
        .unwrap();
    Graph::from_pools(result.pools)
}

struct PriceWatcher {
    seen: Mutex<Vec<(u64, U256)>>,
}

#[async_trait]
impl Strategy for PriceWatcher {
    async fn on_refresh(&self, block_number: u64, graph: &Graph) {
        let reserve = graph
            .edge(&Address::repeat_byte(0xa0))
            .map(|e| e.pool.reserve_of(&Address::repeat_byte(WETH)))
            .unwrap_or_default();
        self.seen.lock().await.push((block_number, reserve));
    }
}

/// Discovery feeds the trimmer; only the deep pool survives a 30 WETH threshold
#[tokio::test]
async fn test_discover_and_trim() {
    let chain = build_chain();
    let mut graph = build_graph(chain).await;
    assert_eq!((graph.node_count(), graph.edge_count()), (3, 2));

    let report = LiquidityTrimmer::new(Address::repeat_byte(WETH), Decimal::from(30))
        .trim(&mut graph)
        .unwrap();

    assert_eq!(report.edges_pruned, 1);
    assert!(graph.contains_edge(&Address::repeat_byte(0xa0)));
    assert!(!graph.contains_node(&Address::repeat_byte(DUST)));
    assert_eq!(report.display_price(&Address::repeat_byte(USDC), 2), Some(Decimal::from(2000)));
}

/// Heads pushed on the chain drive refreshes until the head stream closes
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_updater_follows_heads() {
    let chain = build_chain();
    let graph = build_graph(chain.clone()).await;
    let watcher = Arc::new(PriceWatcher { seen: Mutex::new(Vec::new()) });

    let updater = Arc::new(
        Updater::new(Arc::new(RwLock::new(graph)), chain.clone(), 4)
            .with_policy(OverlapPolicy::Queue)
            .with_strategy(watcher.clone()),
    );
    let mut events = updater.subscribe();

    let runner = {
        let updater = Arc::clone(&updater);
        tokio::spawn(async move { updater.run().await })
    };

    // Wait for the updater to subscribe before pushing heads
    tokio::time::timeout(Duration::from_secs(5), async {
        while chain.head_subscribers() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("updater never subscribed");

    for (block, weth_reserve) in [(101u64, 510u64), (102, 520), (103, 530)] {
        chain.set_reserves(Address::repeat_byte(0xa0), whole(weth_reserve, 18), whole(1_000_000, 6));
        chain.push_head(block);
        let event = events.recv().await.unwrap();
        assert_eq!(event.block_number, block);
        assert_eq!((event.report.refreshed, event.report.failed), (2, 0));
    }
    chain.close_heads();

    let outcome = runner.await.unwrap();
    assert!(matches!(outcome, Err(TopologyError::Transport { .. })));

    let seen = watcher.seen.lock().await.clone();
    assert_eq!(
        seen,
        vec![(101, whole(510, 18)), (102, whole(520, 18)), (103, whole(530, 18))]
    );

    let graph = updater.graph().read().await;
    let reserves = graph.edge(&Address::repeat_byte(0xa0)).unwrap().pool.reserves();
    assert_eq!(reserves.block_number, Some(103));
}
