pub mod erc20;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use alloy::eips::BlockNumberOrTag;
use alloy::primitives::{Address, B256, Bytes, TxKind, U256};
use alloy::providers::{Provider, RootProvider};
use alloy::rpc::types::{Block, Filter, Log, TransactionInput, TransactionReceipt, TransactionRequest};
use anyhow::{Context, Result, bail};
use tokio_util::sync::CancellationToken;
use url::Url;

pub use erc20::{TRANSFER_EVENT_TOPIC, balance_of_calldata, transfer_calldata};

const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(3);
const RECEIPT_WAIT_TIMEOUT: Duration = Duration::from_secs(2 * 60);

struct Endpoint {
    url: String,
    provider: RootProvider,
}

/// EVM JSON-RPC client over an ordered endpoint list. Every request probes
/// the current endpoint with `eth_chainId` and walks to the next one on
/// failure; the index of the last healthy endpoint is kept so the common
/// path stays on one node.
pub struct EvmRpcClient {
    endpoints: Vec<Endpoint>,
    current: AtomicUsize,
}

impl EvmRpcClient {
    pub fn new(urls: &[String]) -> Result<Self> {
        if urls.is_empty() {
            bail!("at least one RPC URL is required");
        }

        let mut endpoints = Vec::with_capacity(urls.len());
        for raw in urls {
            match raw.parse::<Url>() {
                Ok(url) => endpoints.push(Endpoint {
                    url: raw.clone(),
                    provider: RootProvider::new_http(url),
                }),
                Err(err) => {
                    tracing::warn!(url = %raw, error = %err, "skipping unparseable RPC URL");
                }
            }
        }

        if endpoints.is_empty() {
            bail!("no usable RPC endpoint in the configured list");
        }

        Ok(Self {
            endpoints,
            current: AtomicUsize::new(0),
        })
    }

    /// Picks a live endpoint, starting at the last one that worked.
    async fn provider(&self) -> Result<&RootProvider> {
        let start = self.current.load(Ordering::Relaxed);

        for offset in 0..self.endpoints.len() {
            let idx = (start + offset) % self.endpoints.len();
            let endpoint = &self.endpoints[idx];

            match endpoint.provider.get_chain_id().await {
                Ok(_) => {
                    if idx != start {
                        self.current.store(idx, Ordering::Relaxed);
                    }
                    return Ok(&endpoint.provider);
                }
                Err(err) => {
                    tracing::warn!(url = %endpoint.url, error = %err, "RPC endpoint unhealthy, trying next");
                }
            }
        }

        bail!("all RPC endpoints are unavailable")
    }

    pub async fn block_number(&self) -> Result<u64> {
        let provider = self.provider().await?;
        provider
            .get_block_number()
            .await
            .context("failed to fetch latest block number")
    }

    /// Block at `number` with full transaction bodies, as the scanner needs.
    pub async fn block_by_number(&self, number: u64) -> Result<Block> {
        let provider = self.provider().await?;
        provider
            .get_block_by_number(BlockNumberOrTag::Number(number))
            .full()
            .await
            .context("failed to fetch block")?
            .with_context(|| format!("block {number} not found"))
    }

    /// Latest block header only; used for `baseFeePerGas`.
    pub async fn latest_block(&self) -> Result<Block> {
        let provider = self.provider().await?;
        provider
            .get_block_by_number(BlockNumberOrTag::Latest)
            .await
            .context("failed to fetch latest block")?
            .context("latest block not found")
    }

    pub async fn transaction_receipt(&self, tx_hash: B256) -> Result<Option<TransactionReceipt>> {
        let provider = self.provider().await?;
        provider
            .get_transaction_receipt(tx_hash)
            .await
            .context("failed to fetch transaction receipt")
    }

    pub async fn send_raw_transaction(&self, raw: &[u8]) -> Result<B256> {
        let provider = self.provider().await?;
        let pending = provider
            .send_raw_transaction(raw)
            .await
            .context("failed to broadcast transaction")?;
        Ok(*pending.tx_hash())
    }

    pub async fn balance_at(&self, address: Address) -> Result<U256> {
        let provider = self.provider().await?;
        provider
            .get_balance(address)
            .await
            .context("failed to fetch balance")
    }

    /// Next nonce as the node sees it, pending transactions included.
    pub async fn pending_nonce_at(&self, address: Address) -> Result<u64> {
        let provider = self.provider().await?;
        provider
            .get_transaction_count(address)
            .pending()
            .await
            .context("failed to fetch pending nonce")
    }

    pub async fn suggest_gas_tip_cap(&self) -> Result<u128> {
        let provider = self.provider().await?;
        provider
            .get_max_priority_fee_per_gas()
            .await
            .context("failed to fetch gas tip cap")
    }

    pub async fn chain_id(&self) -> Result<u64> {
        let provider = self.provider().await?;
        provider.get_chain_id().await.context("failed to fetch chain id")
    }

    pub async fn filter_logs(&self, filter: &Filter) -> Result<Vec<Log>> {
        let provider = self.provider().await?;
        provider
            .get_logs(filter)
            .await
            .context("failed to fetch logs")
    }

    pub async fn call(&self, request: TransactionRequest) -> Result<Bytes> {
        let provider = self.provider().await?;
        provider.call(request).await.context("eth_call failed")
    }

    /// ERC-20 `balanceOf(account)` via `eth_call`.
    pub async fn token_balance(&self, token: Address, account: Address) -> Result<U256> {
        let request = TransactionRequest {
            to: Some(TxKind::Call(token)),
            input: TransactionInput::new(balance_of_calldata(account).into()),
            ..Default::default()
        };

        let ret = self.call(request).await.context("balanceOf call failed")?;
        if ret.len() > 32 {
            bail!("balanceOf returned {} bytes, expected at most 32", ret.len());
        }
        Ok(U256::from_be_slice(&ret))
    }

    /// Polls for the receipt every 3 s under a 2-minute deadline,
    /// unwinding early when the root token fires.
    pub async fn wait_for_receipt(
        &self,
        tx_hash: B256,
        cancel: &CancellationToken,
    ) -> Result<TransactionReceipt> {
        let deadline = tokio::time::Instant::now() + RECEIPT_WAIT_TIMEOUT;

        loop {
            if let Some(receipt) = self.transaction_receipt(tx_hash).await? {
                return Ok(receipt);
            }

            if tokio::time::Instant::now() >= deadline {
                bail!("timed out waiting for receipt of {tx_hash}");
            }

            tokio::select! {
                () = cancel.cancelled() => bail!("cancelled while waiting for receipt of {tx_hash}"),
                () = tokio::time::sleep(RECEIPT_POLL_INTERVAL) => {}
            }
        }
    }
}
