//! In-memory ledger.
//!
//! `StaticChain` answers the handful of calls the SDK makes (ERC-20 metadata,
//! pair tokens/reserves, factory enumeration) from maps populated up front, and
//! replays block heads pushed with [`StaticChain::push_head`]. It backs offline
//! runs and every test that needs ledger behavior, including injected transport
//! failures, malformed returns and slow calls.

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use dashmap::DashMap;
use ethers::abi::{encode, Token as AbiToken};
use ethers::types::{Address, Bytes, U256};
use futures::stream::{BoxStream, StreamExt};
use log::trace;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use crate::chain_client::ChainClient;
use crate::contracts::{erc20, selector, uniswap_v2_factory, uniswap_v2_pair};
use crate::errors::{Result, TopologyError};

const HEAD_BUFFER: usize = 1024;

#[derive(Debug, Clone)]
struct StaticPair {
    token0: Address,
    token1: Address,
    reserve0: U256,
    reserve1: U256,
}

#[derive(Debug, Clone)]
struct StaticErc20 {
    name: String,
    symbol: String,
    decimals: u8,
}

/// How calls to a target misbehave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// The call itself fails, as a dropped connection or timeout would.
    Transport,
    /// The call succeeds with empty return data, as a revert on a missing method would.
    EmptyReturn,
}

pub struct StaticChain {
    pairs: DashMap<Address, StaticPair>,
    tokens: DashMap<Address, StaticErc20>,
    factories: DashMap<Address, Vec<Address>>,
    failures: DashMap<Address, Failure>,
    calls: DashMap<Address, usize>,
    latency_ms: AtomicU64,
    heads: ArcSwapOption<broadcast::Sender<u64>>,
}

impl Default for StaticChain {
    fn default() -> Self {
        Self::new()
    }
}

impl StaticChain {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(HEAD_BUFFER);
        Self {
            pairs: DashMap::new(),
            tokens: DashMap::new(),
            factories: DashMap::new(),
            failures: DashMap::new(),
            calls: DashMap::new(),
            latency_ms: AtomicU64::new(0),
            heads: ArcSwapOption::from(Some(Arc::new(sender))),
        }
    }

    pub fn add_token(&self, address: Address, name: &str, symbol: &str, decimals: u8) {
        self.tokens.insert(
            address,
            StaticErc20 { name: name.to_string(), symbol: symbol.to_string(), decimals },
        );
    }

    pub fn add_pair(&self, pair: Address, token0: Address, token1: Address, reserve0: U256, reserve1: U256) {
        self.pairs.insert(pair, StaticPair { token0, token1, reserve0, reserve1 });
    }

    pub fn add_factory(&self, factory: Address, pairs: Vec<Address>) {
        self.factories.insert(factory, pairs);
    }

    /// Overwrites a pair's reserves, as a swap landing on chain would.
    pub fn set_reserves(&self, pair: Address, reserve0: U256, reserve1: U256) {
        if let Some(mut p) = self.pairs.get_mut(&pair) {
            p.reserve0 = reserve0;
            p.reserve1 = reserve1;
        }
    }

    pub fn fail(&self, target: Address, failure: Failure) {
        self.failures.insert(target, failure);
    }

    pub fn clear_failure(&self, target: Address) {
        self.failures.remove(&target);
    }

    /// Delay applied to every call before it is answered.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms.store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Number of `call_contract` invocations that targeted `target`, failed ones included.
    pub fn calls_to(&self, target: Address) -> usize {
        self.calls.get(&target).map(|c| *c).unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.iter().map(|c| *c.value()).sum()
    }

    /// Publishes a new chain head; returns how many subscribers received it.
    pub fn push_head(&self, block_number: u64) -> usize {
        match self.heads.load_full() {
            Some(sender) => sender.send(block_number).unwrap_or(0),
            None => 0,
        }
    }

    pub fn head_subscribers(&self) -> usize {
        self.heads.load_full().map(|s| s.receiver_count()).unwrap_or(0)
    }

    /// Ends every head stream once buffered heads are drained.
    pub fn close_heads(&self) {
        self.heads.store(None);
    }

    fn answer(&self, target: Address, data: &[u8]) -> Option<Vec<u8>> {
        if data.len() < 4 {
            return None;
        }
        let sel = [data[0], data[1], data[2], data[3]];

        if let Some(pair) = self.pairs.get(&target) {
            if sel == selector(uniswap_v2_pair::TOKEN0) {
                return Some(encode(&[AbiToken::Address(pair.token0)]));
            }
            if sel == selector(uniswap_v2_pair::TOKEN1) {
                return Some(encode(&[AbiToken::Address(pair.token1)]));
            }
            if sel == selector(uniswap_v2_pair::GET_RESERVES) {
                return Some(encode(&[
                    AbiToken::Uint(pair.reserve0),
                    AbiToken::Uint(pair.reserve1),
                    AbiToken::Uint(U256::zero()),
                ]));
            }
        }

        if let Some(token) = self.tokens.get(&target) {
            if sel == selector(erc20::NAME) {
                return Some(encode(&[AbiToken::String(token.name.clone())]));
            }
            if sel == selector(erc20::SYMBOL) {
                return Some(encode(&[AbiToken::String(token.symbol.clone())]));
            }
            if sel == selector(erc20::DECIMALS) {
                return Some(encode(&[AbiToken::Uint(U256::from(token.decimals))]));
            }
        }

        if let Some(pairs) = self.factories.get(&target) {
            if sel == selector(uniswap_v2_factory::ALL_PAIRS_LENGTH) {
                return Some(encode(&[AbiToken::Uint(U256::from(pairs.len()))]));
            }
            if sel == selector(uniswap_v2_factory::ALL_PAIRS) && data.len() >= 36 {
                let index = U256::from_big_endian(&data[4..36]);
                if index >= U256::from(pairs.len()) {
                    return None;
                }
                return Some(encode(&[AbiToken::Address(pairs[index.as_usize()])]));
            }
        }

        None
    }
}

#[async_trait]
impl ChainClient for StaticChain {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn call_contract(&self, target: Address, data: Bytes) -> Result<Bytes> {
        *self.calls.entry(target).or_insert(0) += 1;

        let latency = self.latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        let failure = self.failures.get(&target).map(|f| *f);
        match failure {
            Some(Failure::Transport) => {
                return Err(TopologyError::transport(target, "injected transport failure"))
            }
            Some(Failure::EmptyReturn) => return Ok(Bytes::new()),
            None => {}
        }

        match self.answer(target, &data) {
            Some(ret) => Ok(Bytes::from(ret)),
            None => {
                trace!("no static answer for {:?} selector 0x{}", target, hex::encode(data.get(..4).unwrap_or(&[])));
                Ok(Bytes::new())
            }
        }
    }

    async fn subscribe_new_heads(&self) -> Result<BoxStream<'static, u64>> {
        let receiver = match self.heads.load_full() {
            Some(sender) => sender.subscribe(),
            None => return Err(TopologyError::transport(Address::zero(), "head stream closed")),
        };
        let heads = futures::stream::unfold(receiver, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(n) => return Some((n, rx)),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });
        Ok(heads.boxed())
    }
}
