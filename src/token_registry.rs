//! # Token Registry
//!
//! Deduplicating cache of ERC-20 metadata shared by every discovery worker.
//!
//! Each address owns one `tokio::sync::OnceCell` slot. The first caller for an
//! address runs the fetch while concurrent callers for the same address wait on
//! the slot and then observe the same `Arc<Token>`; callers for other addresses
//! are never blocked. A failed fetch leaves the slot empty, so nothing invalid
//! is ever committed and a later caller may retry.

use crate::chain_client::ChainClient;
use crate::contracts::erc20;
use crate::errors::{Result, TopologyError};
use crate::token::Token;
use dashmap::DashMap;
use ethers::types::Address;
use log::debug;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::OnceCell;

#[derive(Default)]
pub struct TokenRegistry {
    slots: DashMap<Address, Arc<OnceCell<Arc<Token>>>>,
}

impl TokenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached token for `address`, or runs `fetch` and commits its result.
    ///
    /// `fetch` runs at most once per address across all concurrent callers unless
    /// it fails, in which case the error goes to the caller that ran it and the
    /// slot stays empty.
    pub async fn get_or_create<F, Fut>(&self, address: Address, fetch: F) -> Result<Arc<Token>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Token>>,
    {
        // Clone the slot out so no map shard lock is held across the fetch.
        let slot = self.slots.entry(address).or_default().value().clone();

        let token = slot
            .get_or_try_init(|| async {
                let token = fetch().await?;
                if token.address != address {
                    return Err(TopologyError::data_integrity(
                        address,
                        format!("fetched metadata belongs to {:?}", token.address),
                    ));
                }
                debug!("registered token {}", token);
                Ok(Arc::new(token))
            })
            .await?;
        Ok(Arc::clone(token))
    }

    /// `get_or_create` with the standard `name()`/`symbol()`/`decimals()` fetch.
    pub async fn resolve(&self, client: &dyn ChainClient, address: Address) -> Result<Arc<Token>> {
        self.get_or_create(address, || erc20::fetch_token(client, address)).await
    }

    pub fn get(&self, address: &Address) -> Option<Arc<Token>> {
        self.slots.get(address).and_then(|slot| slot.get().cloned())
    }

    /// Number of committed tokens.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn tokens(&self) -> Vec<Arc<Token>> {
        self.slots.iter().filter_map(|slot| slot.get().cloned()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn weth() -> Token {
        Token::new(Address::repeat_byte(0xc0), "Wrapped Ether", "WETH", 18)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_callers_share_one_fetch() {
        let registry = Arc::new(TokenRegistry::new());
        let fetches = Arc::new(AtomicUsize::new(0));
        let address = weth().address;

        let handles: Vec<_> = (0..64)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let fetches = Arc::clone(&fetches);
                tokio::spawn(async move {
                    registry
                        .get_or_create(address, || async move {
                            fetches.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            Ok(weth())
                        })
                        .await
                        .unwrap()
                })
            })
            .collect();

        let tokens: Vec<Arc<Token>> = futures::future::join_all(handles)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        assert_eq!(fetches.load(Ordering::SeqCst), 1);
        assert!(tokens.iter().all(|t| Arc::ptr_eq(t, &tokens[0])));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn failed_fetch_is_not_cached() {
        let registry = TokenRegistry::new();
        let address = weth().address;

        let err = registry
            .get_or_create(address, || async move {
                Err(TopologyError::data_integrity(address, "decimals() reverted"))
            })
            .await;
        assert!(err.is_err());
        assert!(registry.get(&address).is_none());
        assert!(registry.is_empty());

        let token = registry.get_or_create(address, || async { Ok(weth()) }).await.unwrap();
        assert_eq!(token.symbol, "WETH");
        assert_eq!(registry.tokens().len(), 1);
    }

    #[tokio::test]
    async fn cached_token_skips_fetch() {
        let registry = TokenRegistry::new();
        let address = weth().address;
        registry.get_or_create(address, || async { Ok(weth()) }).await.unwrap();

        let again = registry
            .get_or_create(address, || async move {
                Err(TopologyError::transport(address, "should not be called"))
            })
            .await
            .unwrap();
        assert_eq!(again.decimals, 18);
    }

    #[tokio::test]
    async fn mismatched_address_is_rejected() {
        let registry = TokenRegistry::new();
        let requested = Address::repeat_byte(0x01);
        let result = registry.get_or_create(requested, || async { Ok(weth()) }).await;
        assert!(matches!(result, Err(TopologyError::DataIntegrity { .. })));
        assert!(registry.get(&requested).is_none());
    }
}
