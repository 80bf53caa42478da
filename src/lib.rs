//! # Pair Topology SDK
//!
//! A Rust library that maps the constant-product (Uniswap V2 style) liquidity
//! topology of an EVM chain into an in-memory graph, prices every pool exactly,
//! prunes the pools too thin to matter, and keeps the survivors fresh block by
//! block.
//!
//! ## Overview
//!
//! - **Discovery**: concurrent fan-out over a factory's `allPairs` (or an address
//!   list), deduplicating token metadata through a shared [`TokenRegistry`]
//! - **Pricing**: [`Pool`] marginal prices and constant-product swap output in
//!   arbitrary precision
//! - **Graph**: tokens as nodes, pools as edges, keyed by address
//! - **Trimming**: breadth-first liquidity propagation from a reference token
//! - **Updater**: per-block reserve refresh feeding a downstream [`Strategy`]
//!
//! ## Flow
//!
//! ```text
//! Discovery ──▶ TokenRegistry (dedup) ──▶ Graph::add_edge ──▶ LiquidityTrimmer ──▶ Updater (per block) ──▶ Strategy
//! ```
//!
//! All chain access goes through the [`ChainClient`] trait; see [`clients`] for
//! the ethers-backed client and the in-memory [`StaticChain`](clients::StaticChain).

// Core Types
/// Common numeric and address conversions
pub mod types;
/// ERC-20 token metadata
pub mod token;
/// Constant-product pool and pricing primitives
pub mod pool;
/// Error taxonomy
pub mod errors;

// Chain Access
/// Trait for ledger access
pub mod chain_client;
/// `ChainClient` implementations (ethers, in-memory)
pub mod clients;
/// Call encoding and return decoding for pair, factory and ERC-20 methods
pub mod contracts;

// Discovery Layer
/// Concurrent pool discovery
pub mod discovery;
/// Shared token metadata cache
pub mod token_registry;

// Graph & State Layer
/// Token/pool adjacency graph
pub mod graph;
/// Liquidity-propagation trimming
pub mod trimmer;
/// Per-block reserve refresh
pub mod updater;

// Infrastructure
/// Metrics and observability
pub mod metrics;
/// General utilities
pub mod utils;

// Settings & Configuration
/// Configuration management
pub mod settings;

// Re-exports for convenience
pub use chain_client::ChainClient;
pub use discovery::{Discovery, DiscoveryReport, DiscoverySource};
pub use errors::{Result, TopologyError};
pub use graph::{Graph, UpdateReport};
pub use pool::Pool;
pub use settings::Settings;
pub use token::Token;
pub use token_registry::TokenRegistry;
pub use trimmer::{LiquidityTrimmer, RefPrice, TrimReport};
pub use updater::{OverlapPolicy, RefreshEvent, SharedGraph, Strategy, Updater};
