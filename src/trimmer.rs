//! Liquidity-propagation trimming.
//!
//! Breadth-first walk from the reference token (the chain's wrapped native
//! asset). Each hop values the neighbor's side of the pool being crossed by
//! dividing its reserve by the pool's marginal price of the current token.
//! Pools worth less than the threshold are removed from the graph on the spot.
//! Surviving neighbors carry the compounded price `priceInRef[current] * marginal`.
//!
//! Every node is entered at most once, through the first edge that reaches it
//! with enough liquidity. Later, possibly better, paths to an already visited
//! node are not examined.

use std::collections::{HashSet, VecDeque};
use std::fmt;

use ethers::types::Address;
use indexmap::IndexMap;
use num_rational::BigRational;
use num_traits::{One, Zero};
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::errors::{Result, TopologyError};
use crate::graph::Graph;
use crate::metrics;
use crate::types::conversions::{address_key, decimal_to_ratio};

/// Price of the reference token expressed in a node's token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefPrice {
    /// Never reached from the root.
    Unreached,
    /// Units of this token per one reference token along the path that reached it.
    Priced(BigRational),
    /// Last seen across a pool that failed the liquidity check.
    Pruned,
}

impl RefPrice {
    pub fn as_ratio(&self) -> Option<&BigRational> {
        match self {
            RefPrice::Priced(r) => Some(r),
            _ => None,
        }
    }
}

impl fmt::Display for RefPrice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefPrice::Unreached => write!(f, "+inf"),
            RefPrice::Priced(r) => write!(f, "{}", r),
            RefPrice::Pruned => write!(f, "-1"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TrimReport {
    pub nodes_before: usize,
    pub edges_before: usize,
    /// Pools removed for failing the liquidity check.
    pub edges_pruned: usize,
    /// Pools removed afterwards for not being connected to the root.
    pub edges_unreached: usize,
    pub visited: usize,
    pub nodes_after: usize,
    pub edges_after: usize,
    pub prices: IndexMap<Address, RefPrice>,
}

#[derive(Debug, Clone)]
pub struct LiquidityTrimmer {
    root: Address,
    threshold: Decimal,
    drop_unreached: bool,
}

impl LiquidityTrimmer {
    /// `threshold` is in whole reference-token units (e.g. 30 WETH).
    pub fn new(root: Address, threshold: Decimal) -> Self {
        Self { root, threshold, drop_unreached: false }
    }

    /// Also delete every component the walk never entered.
    pub fn with_drop_unreached(mut self, drop_unreached: bool) -> Self {
        self.drop_unreached = drop_unreached;
        self
    }

    pub fn trim(&self, graph: &mut Graph) -> Result<TrimReport> {
        if !graph.contains_node(&self.root) {
            return Err(TopologyError::Precondition(format!(
                "reference token {} is not in the graph",
                address_key(self.root)
            )));
        }

        let threshold = decimal_to_ratio(self.threshold);
        let sentinel = -BigRational::one();

        let mut report = TrimReport {
            nodes_before: graph.node_count(),
            edges_before: graph.edge_count(),
            ..Default::default()
        };
        let mut prices: IndexMap<Address, RefPrice> =
            graph.nodes().map(|n| (n.token.address, RefPrice::Unreached)).collect();
        prices.insert(self.root, RefPrice::Priced(BigRational::one()));

        let mut visited: HashSet<Address> = HashSet::from([self.root]);
        let mut queue: VecDeque<(Address, BigRational)> = VecDeque::from([(self.root, BigRational::one())]);

        while let Some((current, current_price)) = queue.pop_front() {
            // Edges may be removed while we walk them.
            let snapshot = match graph.node(&current) {
                Some(node) => node.edges().to_vec(),
                None => continue,
            };

            for pool_address in snapshot {
                let Some(edge) = graph.edge(&pool_address) else {
                    continue;
                };
                let Some(neighbor) = edge.other(&current) else {
                    continue;
                };
                if visited.contains(&neighbor) {
                    continue;
                }

                let mut marginal = edge.pool.price_of(&current);
                if marginal.is_zero() {
                    marginal = sentinel.clone();
                }
                let value_in_ref = edge.pool.adjusted_reserve_of(&neighbor) / &marginal;

                if value_in_ref < threshold {
                    debug!(
                        pool = %address_key(pool_address),
                        neighbor = %address_key(neighbor),
                        value = %value_in_ref,
                        "pruning under-liquid pool"
                    );
                    graph.remove_edge(&pool_address);
                    prices.insert(neighbor, RefPrice::Pruned);
                    report.edges_pruned += 1;
                } else {
                    let neighbor_price = &current_price * &marginal;
                    visited.insert(neighbor);
                    prices.insert(neighbor, RefPrice::Priced(neighbor_price.clone()));
                    queue.push_back((neighbor, neighbor_price));
                }
            }
        }

        if self.drop_unreached {
            report.edges_unreached = graph.retain_reachable(&self.root);
        }

        report.visited = visited.len();
        report.nodes_after = graph.node_count();
        report.edges_after = graph.edge_count();
        report.prices = prices;

        info!(
            threshold = %self.threshold,
            pruned = report.edges_pruned,
            unreached = report.edges_unreached,
            visited = report.visited,
            nodes = report.nodes_after,
            edges = report.edges_after,
            "✂️ graph trimmed"
        );
        metrics::record_trim(report.edges_pruned + report.edges_unreached);
        metrics::record_graph_size(report.nodes_after, report.edges_after);
        Ok(report)
    }
}

impl TrimReport {
    /// Exact reference price of `token` if the last trim reached it.
    pub fn ref_price(&self, token: &Address) -> Option<BigRational> {
        self.prices.get(token).and_then(|p| p.as_ratio().cloned())
    }

    /// Reference price of `token` with `scale` decimals, for display.
    pub fn display_price(&self, token: &Address, scale: u32) -> Option<Decimal> {
        let price = self.ref_price(token)?;
        crate::types::conversions::ratio_to_decimal(&price, scale).ok()
    }

    pub fn edges_removed(&self) -> usize {
        self.edges_pruned + self.edges_unreached
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::Pool;
    use crate::token::Token;
    use ethers::types::U256;
    use std::str::FromStr;
    use num_bigint::BigInt;
    use std::sync::Arc;

    const WETH: u8 = 0xc0;

    fn ratio(n: i64) -> BigRational {
        BigRational::from_integer(BigInt::from(n))
    }

    fn token(b: u8, decimals: u8) -> Arc<Token> {
        Arc::new(Token::new(Address::repeat_byte(b), format!("Token {}", b), format!("T{}", b), decimals))
    }

    fn whole(amount: u64, decimals: u8) -> U256 {
        U256::from(amount) * U256::exp10(decimals as usize)
    }

    fn pool(addr: u8, a: (u8, u8, u64), b: (u8, u8, u64)) -> Arc<Pool> {
        Arc::new(Pool::new(
            Address::repeat_byte(addr),
            token(a.0, a.1),
            token(b.0, b.1),
            whole(a.2, a.1),
            whole(b.2, b.1),
        ))
    }

    fn weth_pair(threshold: &str) -> (Graph, Result<TrimReport>) {
        let mut g = Graph::new();
        g.add_edge(pool(0xa0, (WETH, 18, 1_000), (0x0a, 18, 2_000_000))).unwrap();
        let trimmer = LiquidityTrimmer::new(Address::repeat_byte(WETH), Decimal::from_str(threshold).unwrap());
        let report = trimmer.trim(&mut g);
        (g, report)
    }

    #[test]
    fn liquid_pool_survives() {
        let (g, report) = weth_pair("500");
        let report = report.unwrap();
        assert_eq!(g.edge_count(), 1);
        assert_eq!(report.edges_pruned, 0);
        assert_eq!(report.ref_price(&Address::repeat_byte(0x0a)), Some(ratio(2000)));
        assert_eq!(report.ref_price(&Address::repeat_byte(WETH)), Some(ratio(1)));
    }

    #[test]
    fn thin_pool_is_pruned_with_both_nodes() {
        let (g, report) = weth_pair("5000000");
        let report = report.unwrap();
        assert_eq!((g.node_count(), g.edge_count()), (0, 0));
        assert_eq!(report.edges_pruned, 1);
        assert_eq!(report.prices.get(&Address::repeat_byte(0x0a)), Some(&RefPrice::Pruned));
    }

    #[test]
    fn missing_root_is_a_precondition_error() {
        let mut g = Graph::new();
        g.add_edge(pool(0xa0, (1, 18, 10), (2, 18, 10))).unwrap();
        let err = LiquidityTrimmer::new(Address::repeat_byte(WETH), Decimal::from(30)).trim(&mut g);
        assert!(matches!(err, Err(TopologyError::Precondition(_))));
        assert_eq!(g.edge_count(), 1);
    }

    #[test]
    fn drained_pool_is_always_pruned() {
        let mut g = Graph::new();
        g.add_edge(pool(0xa0, (WETH, 18, 0), (0x0a, 18, 5_000))).unwrap();
        g.add_edge(pool(0xa1, (WETH, 18, 100), (0x0b, 6, 100))).unwrap();
        let report = LiquidityTrimmer::new(Address::repeat_byte(WETH), Decimal::ZERO).trim(&mut g).unwrap();
        assert!(!g.contains_edge(&Address::repeat_byte(0xa0)));
        assert!(g.contains_edge(&Address::repeat_byte(0xa1)));
        assert_eq!(report.prices[&Address::repeat_byte(0x0a)], RefPrice::Pruned);
    }

    fn two_hop_chain(a_b: (u64, u64)) -> Graph {
        // WETH -> A at 2000 A/WETH, A -> B at 3 B/A
        let mut g = Graph::new();
        g.add_edge(pool(0xa0, (WETH, 18, 1_000), (0x0a, 18, 2_000_000))).unwrap();
        g.add_edge(pool(0xa1, (0x0a, 18, a_b.0), (0x0b, 6, a_b.1))).unwrap();
        g
    }

    #[test]
    fn prices_compound_along_paths() {
        let mut g = two_hop_chain((100_000, 300_000));
        let report = LiquidityTrimmer::new(Address::repeat_byte(WETH), Decimal::from(30)).trim(&mut g).unwrap();
        assert_eq!(report.ref_price(&Address::repeat_byte(0x0a)), Some(ratio(2000)));
        assert_eq!(report.ref_price(&Address::repeat_byte(0x0b)), Some(ratio(6000)));
        assert_eq!(g.edge_count(), 2);
    }

    #[test]
    fn deeper_hops_compare_against_marginal_price() {
        // 300_000 B over 3 B/A is 100_000, well above 60 although the compounded
        // price would put the pool at 50.
        let mut g = two_hop_chain((100_000, 300_000));
        let report = LiquidityTrimmer::new(Address::repeat_byte(WETH), Decimal::from(60)).trim(&mut g).unwrap();
        assert_eq!(report.edges_pruned, 0);
        assert!(g.contains_edge(&Address::repeat_byte(0xa1)));
        assert_eq!(report.ref_price(&Address::repeat_byte(0x0b)), Some(ratio(6000)));

        // 150 B over 3 B/A is 50
        let mut thin = two_hop_chain((50, 150));
        let report = LiquidityTrimmer::new(Address::repeat_byte(WETH), Decimal::from(60)).trim(&mut thin).unwrap();
        assert_eq!(report.edges_pruned, 1);
        assert!(!thin.contains_node(&Address::repeat_byte(0x0b)));
        assert!(thin.contains_edge(&Address::repeat_byte(0xa0)));
        assert_eq!(report.prices[&Address::repeat_byte(0x0b)], RefPrice::Pruned);
    }

    #[test]
    fn no_examined_edge_stays_below_threshold() {
        // Tree rooted at WETH, so every surviving edge was examined exactly once.
        // Each pool is built (near, far) relative to the root.
        let mut g = Graph::new();
        let first_hop = [5u64, 50, 500, 20, 80];
        let second_hop = [100u64, 10, 40, 100, 25];
        for i in 0..first_hop.len() {
            let (x, y) = (0x10 + i as u8, 0x20 + i as u8);
            g.add_edge(pool(0xa0 + i as u8, (WETH, 18, first_hop[i]), (x, 18, first_hop[i]))).unwrap();
            g.add_edge(pool(0xb0 + i as u8, (x, 18, second_hop[i]), (y, 18, second_hop[i] * 3))).unwrap();
        }
        let threshold = Decimal::from(30);
        let report = LiquidityTrimmer::new(Address::repeat_byte(WETH), threshold)
            .with_drop_unreached(true)
            .trim(&mut g)
            .unwrap();

        assert_eq!(report.edges_pruned, 4);
        assert_eq!(report.edges_unreached, 2);
        assert_eq!(g.edge_count(), 4);

        let threshold = decimal_to_ratio(threshold);
        for edge in g.edges() {
            let (near, far) = edge.endpoints();
            assert!(report.ref_price(&far).is_some());
            let marginal = edge.pool.price_of(&near);
            assert!(edge.pool.adjusted_reserve_of(&far) / marginal >= threshold, "{:?}", edge.address());
        }
    }

    #[test]
    fn first_path_wins() {
        // Root reaches C through A first even though the path through B prices C differently.
        let mut g = Graph::new();
        g.add_edge(pool(0xa0, (WETH, 18, 1_000), (0x0a, 18, 1_000))).unwrap();
        g.add_edge(pool(0xa1, (WETH, 18, 1_000), (0x0b, 18, 2_000))).unwrap();
        g.add_edge(pool(0xa2, (0x0a, 18, 1_000), (0x0c, 18, 1_000))).unwrap();
        g.add_edge(pool(0xa3, (0x0b, 18, 1_000), (0x0c, 18, 5_000))).unwrap();
        let report = LiquidityTrimmer::new(Address::repeat_byte(WETH), Decimal::from(1)).trim(&mut g).unwrap();
        assert_eq!(report.ref_price(&Address::repeat_byte(0x0c)), Some(ratio(1)));
        assert_eq!(report.visited, 4);
        assert_eq!(g.edge_count(), 4);
    }

    #[test]
    fn unreached_components_are_kept_unless_asked() {
        let build = || {
            let mut g = Graph::new();
            g.add_edge(pool(0xa0, (WETH, 18, 1_000), (0x0a, 18, 1_000))).unwrap();
            g.add_edge(pool(0xb0, (0x0e, 18, 1_000), (0x0f, 18, 1_000))).unwrap();
            g
        };
        let trimmer = LiquidityTrimmer::new(Address::repeat_byte(WETH), Decimal::from(30));

        let mut kept = build();
        let report = trimmer.trim(&mut kept).unwrap();
        assert_eq!(kept.edge_count(), 2);
        assert_eq!(report.prices[&Address::repeat_byte(0x0e)], RefPrice::Unreached);

        let mut dropped = build();
        let report = trimmer.with_drop_unreached(true).trim(&mut dropped).unwrap();
        assert_eq!(dropped.edge_count(), 1);
        assert_eq!(report.edges_unreached, 1);
        assert_eq!(report.edges_removed(), 1);
        assert_eq!(report.display_price(&Address::repeat_byte(0x0a), 2), Some(Decimal::from(1)));
    }
}
