use async_trait::async_trait;
use ethers::prelude::*;
use ethers::types::transaction::eip2718::TypedTransaction;
use futures::stream::BoxStream;
use futures_util::StreamExt;
use log::{debug, info, warn};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

use crate::chain_client::ChainClient;
use crate::errors::{Result, TopologyError};

const HEAD_CHANNEL_CAPACITY: usize = 256;

/// [`ChainClient`] over an ethers HTTP provider for calls and a websocket
/// provider for `newHeads`.
#[derive(Clone)]
pub struct EthersChainClient {
    provider: Provider<Http>,
    ws_url: Option<String>,
    call_timeout: Duration,
}

impl EthersChainClient {
    pub fn new(http_url: &str, ws_url: Option<String>, call_timeout: Duration) -> Result<Self> {
        let provider = Provider::<Http>::try_from(http_url).map_err(|e| {
            TopologyError::Precondition(format!("invalid rpc http url {}: {}", http_url, e))
        })?;
        Ok(Self { provider, ws_url, call_timeout })
    }

    fn ws_url(&self) -> Result<String> {
        let url = self
            .ws_url
            .clone()
            .ok_or_else(|| TopologyError::Precondition("rpc.ws_url is required for head subscriptions".into()))?;
        // Accept http(s) endpoints for providers serving both on one URL
        Ok(if let Some(rest) = url.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = url.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            url
        })
    }
}

#[async_trait]
impl ChainClient for EthersChainClient {
    fn name(&self) -> &'static str {
        "ethers"
    }

    async fn call_contract(&self, target: Address, data: Bytes) -> Result<Bytes> {
        let tx: TypedTransaction = TransactionRequest::new().to(target).data(data).into();
        match timeout(self.call_timeout, self.provider.call(&tx, None)).await {
            Ok(Ok(bytes)) => Ok(bytes),
            Ok(Err(e)) => Err(TopologyError::transport(target, e.to_string())),
            Err(_) => Err(TopologyError::transport(
                target,
                format!("call timed out after {:?}", self.call_timeout),
            )),
        }
    }

    async fn subscribe_new_heads(&self) -> Result<BoxStream<'static, u64>> {
        let ws_url = self.ws_url()?;
        let (tx, rx) = mpsc::channel::<u64>(HEAD_CHANNEL_CAPACITY);
        let (ready_tx, ready_rx) = oneshot::channel::<std::result::Result<(), String>>();

        // The subscription borrows its provider, so both live inside the forwarding task.
        tokio::spawn(async move {
            info!("🔌 Connecting to websocket {}", ws_url);
            let provider = match Provider::<Ws>::connect(&ws_url).await {
                Ok(p) => p,
                Err(e) => {
                    let _ = ready_tx.send(Err(format!("websocket connect failed: {}", e)));
                    return;
                }
            };
            let mut stream = match provider.subscribe_blocks().await {
                Ok(s) => s,
                Err(e) => {
                    let _ = ready_tx.send(Err(format!("newHeads subscription failed: {}", e)));
                    return;
                }
            };
            let _ = ready_tx.send(Ok(()));
            info!("✅ Subscribed to newHeads");

            while let Some(block) = stream.next().await {
                let Some(number) = block.number else {
                    debug!("newHeads notification without a block number, skipping");
                    continue;
                };
                if tx.send(number.as_u64()).await.is_err() {
                    debug!("head receiver dropped, closing subscription");
                    return;
                }
            }
            warn!("⚠️ newHeads subscription ended");
        });

        match ready_rx.await {
            Ok(Ok(())) => {}
            Ok(Err(reason)) => return Err(TopologyError::transport(Address::zero(), reason)),
            Err(_) => {
                return Err(TopologyError::transport(Address::zero(), "subscription task aborted"))
            }
        }

        let heads = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|n| (n, rx))
        });
        Ok(heads.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_http_url() {
        assert!(EthersChainClient::new("not a url", None, Duration::from_secs(1)).is_err());
    }

    #[test]
    fn ws_url_is_derived_from_http_scheme() {
        let client = EthersChainClient::new(
            "http://localhost:8545",
            Some("https://node.example/ws".into()),
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(client.ws_url().unwrap(), "wss://node.example/ws");
    }

    #[tokio::test]
    async fn missing_ws_url_is_a_precondition_error() {
        let client = EthersChainClient::new("http://localhost:8545", None, Duration::from_secs(1)).unwrap();
        let err = client.subscribe_new_heads().await.err().unwrap();
        assert!(matches!(err, TopologyError::Precondition(_)));
    }
}
