//! # Chain Client Trait
//!
//! The single seam between the SDK and the ledger. Discovery, the token
//! registry, pool refreshes and the updater only ever talk to the chain through
//! a [`ChainClient`]; the transport behind it (HTTP, websocket, in-memory) is a
//! choice of implementation, see [`crate::clients`].
//!
//! Implementations must treat a timed-out call and a failed call identically:
//! both surface as [`TopologyError::Transport`](crate::errors::TopologyError).
//!
//! ## Example
//!
//! ```rust,no_run
//! use pair_topology_sdk::chain_client::ChainClient;
//! use pair_topology_sdk::clients::StaticChain;
//! use ethers::types::Address;
//!
//! # async fn demo() -> pair_topology_sdk::errors::Result<()> {
//! let chain = StaticChain::new();
//! let factory = Address::repeat_byte(0xfa);
//! chain.add_factory(factory, vec![]);
//! assert_eq!(chain.pair_count(factory).await?, 0);
//! # Ok(())
//! # }
//! ```

use crate::contracts::{decode_address, uniswap_v2_factory};
use crate::errors::Result;
use async_trait::async_trait;
use ethers::types::{Address, Bytes};
use futures::stream::BoxStream;

/// Read-only access to an Ethereum-compatible ledger.
///
/// All implementations must be `Send + Sync`: one client is shared by every
/// discovery and refresh worker.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Executes an `eth_call` against `target` with raw calldata and returns the raw return data.
    async fn call_contract(&self, target: Address, data: Bytes) -> Result<Bytes>;

    /// Number of pairs a Uniswap V2 style factory has created (`allPairsLength()`).
    async fn pair_count(&self, factory: Address) -> Result<u64> {
        let data = self
            .call_contract(factory, uniswap_v2_factory::encode_all_pairs_length())
            .await?;
        uniswap_v2_factory::decode_pair_count(factory, &data)
    }

    /// Pair address at `index` in the factory's creation order (`allPairs(uint256)`).
    async fn pair_address_at(&self, factory: Address, index: u64) -> Result<Address> {
        let data = self
            .call_contract(factory, uniswap_v2_factory::encode_all_pairs(index))
            .await?;
        decode_address(factory, &data, uniswap_v2_factory::ALL_PAIRS)
    }

    /// Stream of new chain-head block numbers. Drives the updater only.
    async fn subscribe_new_heads(&self) -> Result<BoxStream<'static, u64>>;
}
