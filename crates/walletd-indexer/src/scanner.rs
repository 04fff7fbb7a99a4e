use std::sync::Arc;

use alloy::network::TransactionResponse;
use alloy::rpc::types::Block as RpcBlock;
use anyhow::{Context, Result};
use deadpool_diesel::postgres::Pool;
use tokio_util::sync::CancellationToken;

use walletd_db::WalletdPool;
use walletd_db::models::{Block, BlockStatus, NewBlock};
use walletd_rpc::EvmRpcClient;

use crate::analyzer::Analyzer;
use crate::deposit::DepositService;
use crate::reorg::ReorgDetector;
use crate::{IndexerConfig, IndexerService};

/// Long-running per-chain ingestion loop. Blocks are persisted strictly in
/// height order; a failure inside a batch stops the batch so the cursor
/// never skips past an unpersisted block.
pub struct ChainScanner {
    pool: Pool,
    client: Arc<EvmRpcClient>,
    deposit_service: DepositService,
    indexer: Arc<IndexerService>,
    chain_id: i32,
    config: IndexerConfig,
}

impl ChainScanner {
    pub fn new(
        pool: Pool,
        client: Arc<EvmRpcClient>,
        deposit_service: DepositService,
        indexer: Arc<IndexerService>,
        chain_id: i32,
        config: IndexerConfig,
    ) -> Self {
        Self {
            pool,
            client,
            deposit_service,
            indexer,
            chain_id,
            config,
        }
    }

    pub async fn run(self, shutdown: CancellationToken) {
        let mut cursor = match self.start_block().await {
            Ok(cursor) => cursor,
            Err(err) => {
                tracing::error!(chain_id = self.chain_id, error = %err, "scanner failed to determine start block");
                return;
            }
        };

        tracing::info!(chain_id = self.chain_id, start_block = cursor, "scanner running");

        let mut ticker = tokio::time::interval(self.config.scan_interval);

        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    tracing::info!(chain_id = self.chain_id, "scanner stopped");
                    return;
                }
                _ = ticker.tick() => {}
            }

            let latest = match self.client.block_number().await {
                Ok(latest) => latest,
                Err(err) => {
                    tracing::error!(chain_id = self.chain_id, error = %err, "failed to fetch latest block number");
                    continue;
                }
            };

            while cursor <= latest {
                if shutdown.is_cancelled() {
                    return;
                }

                let end = latest.min(cursor + self.config.block_batch_size - 1);
                if let Err(err) = self.scan_range(cursor, end).await {
                    tracing::error!(
                        chain_id = self.chain_id,
                        start_block = cursor,
                        end_block = end,
                        error = %err,
                        "failed to scan block range"
                    );
                    break;
                }
                cursor = end + 1;
            }

            self.run_post_scan_hooks(latest as i64).await;
        }
    }

    /// One past the highest non-orphaned block already stored; the chain
    /// tip when nothing was scanned yet (no historical backfill).
    async fn start_block(&self) -> Result<u64> {
        let chain_id = self.chain_id;
        let max_scanned = self
            .pool
            .interact_with_context(format!("max scanned block for chain {chain_id}"), move |conn| {
                Block::max_canonical_number(chain_id, conn)
            })
            .await?;

        if let Some(max) = max_scanned {
            return Ok(max as u64 + 1);
        }

        let latest = self.client.block_number().await?;
        tracing::info!(
            chain_id = self.chain_id,
            start_block = latest,
            "no previous blocks found, starting from chain tip"
        );
        Ok(latest)
    }

    async fn scan_range(&self, start: u64, end: u64) -> Result<()> {
        for number in start..=end {
            self.scan_block(number)
                .await
                .with_context(|| format!("failed to scan block {number}"))?;
        }
        Ok(())
    }

    pub async fn scan_block(&self, number: u64) -> Result<()> {
        let block = self.client.block_by_number(number).await?;

        let detector = ReorgDetector::new(self.pool.clone(), self.chain_id);
        detector.detect_and_handle(&block).await?;

        let chain_id = self.chain_id;
        let block_hash = format!("{:#x}", block.header.hash);
        {
            let block_hash = block_hash.clone();
            let already_stored = self
                .pool
                .interact_with_context(format!("block existence for chain {chain_id}"), move |conn| {
                    Block::canonical_hash_exists(chain_id, &block_hash, conn)
                })
                .await?;
            if already_stored {
                return Ok(());
            }
        }

        self.save_block(&block).await?;
        self.process_transactions(&block).await;

        tracing::debug!(
            chain_id = self.chain_id,
            block_number = number,
            block_hash = %block_hash,
            tx_count = block.transactions.len(),
            "block scanned"
        );

        Ok(())
    }

    async fn save_block(&self, block: &RpcBlock) -> Result<()> {
        let new_block = NewBlock {
            hash: format!("{:#x}", block.header.hash),
            chain_id: self.chain_id,
            parent_hash: format!("{:#x}", block.header.parent_hash),
            number: block.header.number as i64,
            timestamp: block.header.timestamp as i64,
            status: BlockStatus::Confirmed.as_str().to_string(),
        };

        self.pool
            .interact_with_context(
                format!("persist block {} for chain {}", new_block.number, self.chain_id),
                move |conn| Block::create(&new_block, conn),
            )
            .await
            .context("failed to persist block")?;
        Ok(())
    }

    /// Fetch every receipt and hand the pair to the analyzer. A single
    /// receipt failure is logged and skipped; the block stays persisted.
    async fn process_transactions(&self, block: &RpcBlock) {
        let analyzer = Analyzer::new(self.pool.clone());
        let transactions = block.transactions.as_transactions().unwrap_or(&[]);

        for tx in transactions {
            let tx_hash = tx.tx_hash();
            let receipt = match self.client.transaction_receipt(tx_hash).await {
                Ok(Some(receipt)) => receipt,
                Ok(None) => {
                    tracing::warn!(tx_hash = %tx_hash, "receipt not found yet, skipping");
                    continue;
                }
                Err(err) => {
                    tracing::warn!(tx_hash = %tx_hash, error = %err, "failed to fetch receipt, skipping");
                    continue;
                }
            };

            if let Err(err) = analyzer
                .analyze_transaction(
                    self.chain_id,
                    tx,
                    &receipt,
                    block.header.number as i64,
                    block.header.hash,
                )
                .await
            {
                tracing::warn!(tx_hash = %tx_hash, error = %err, "failed to analyze transaction, skipping");
            }
        }
    }

    pub async fn run_post_scan_hooks(&self, latest_block: i64) {
        if let Err(err) = self
            .deposit_service
            .update_confirmation_status(self.chain_id, latest_block)
            .await
        {
            tracing::error!(chain_id = self.chain_id, error = %err, "failed to update deposit confirmations");
        }

        if let Err(err) = self
            .deposit_service
            .process_finalized_deposits(self.chain_id)
            .await
        {
            tracing::error!(chain_id = self.chain_id, error = %err, "failed to process finalized deposits");
        }

        self.indexer.run_withdraw_hook(self.chain_id, latest_block).await;
    }
}
