// Chain Clients Module
// Concrete ledger backends behind the ChainClient trait

pub mod ethers_client;
pub mod static_chain;

pub use crate::chain_client::ChainClient;
pub use ethers_client::EthersChainClient;
pub use static_chain::{Failure, StaticChain};
