//! # Error Taxonomy
//!
//! Every fallible operation in the SDK returns [`TopologyError`]. The variants map
//! onto how far a failure is allowed to travel:
//!
//! - **Transport**: an external call failed or timed out. Absorbed at the worker
//!   boundary (the pool or token is dropped), except for the factory pair-count
//!   oracle, whose failure ends the discovery run.
//! - **DataIntegrity**: a contract answered, but the answer is unusable (empty
//!   return, decode failure, degenerate pair). Absorbed at the worker boundary.
//! - **Precondition**: the run cannot proceed at all (e.g. the reference token is
//!   missing from the graph at trim time).

use ethers::types::Address;

#[derive(Debug, thiserror::Error)]
pub enum TopologyError {
    #[error("transport error calling {target:?}: {reason}")]
    Transport { target: Address, reason: String },
    #[error("data integrity error at {target:?}: {reason}")]
    DataIntegrity { target: Address, reason: String },
    #[error("precondition failed: {0}")]
    Precondition(String),
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TopologyError {
    pub fn transport(target: Address, reason: impl Into<String>) -> Self {
        Self::Transport { target, reason: reason.into() }
    }

    pub fn data_integrity(target: Address, reason: impl Into<String>) -> Self {
        Self::DataIntegrity { target, reason: reason.into() }
    }

    /// True when the failure only invalidates the unit of work that produced it
    /// (one pool, one token) and the surrounding batch should carry on.
    pub fn is_unit_scoped(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::DataIntegrity { .. })
    }
}

pub type Result<T, E = TopologyError> = std::result::Result<T, E>;
