pub mod analyzer;
pub mod deposit;
pub mod reorg;
pub mod scanner;

use std::collections::HashMap;
use std::sync::{Arc, RwLock as StdRwLock};
use std::time::Duration;

use anyhow::{Context, Result};
use deadpool_diesel::postgres::Pool;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use walletd_db::WalletdPool;
use walletd_db::models::{Block, Chain};
use walletd_rpc::EvmRpcClient;

use crate::deposit::DepositService;
use crate::scanner::ChainScanner;

/// Runtime tunables for block ingestion.
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    pub scan_interval: Duration,
    pub block_batch_size: u64,
    pub backfill_interval: Duration,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            // Tight interval so fast chains are read every few blocks.
            scan_interval: Duration::from_secs(2),
            block_batch_size: 1000,
            backfill_interval: Duration::from_secs(30),
        }
    }
}

/// Capability the scanner consumes to advance withdraw state on every chain
/// tick. The withdraw service implements it and is injected after
/// construction, which breaks the scanner <-> withdraw dependency cycle.
#[async_trait::async_trait]
pub trait WithdrawStatusUpdater: Send + Sync {
    async fn update_withdraw_status(&self, chain_id: i32, latest_block: i64) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct ScanProgress {
    pub chain_id: i32,
    pub latest_block: i64,
    pub scanned_to: i64,
    pub status: &'static str,
}

/// Owns one RPC client and one long-running scanner per active chain.
pub struct IndexerService {
    pool: Pool,
    config: IndexerConfig,
    deposit_service: DepositService,
    clients: RwLock<HashMap<i32, Arc<EvmRpcClient>>>,
    running_scanners: RwLock<HashMap<i32, CancellationToken>>,
    withdraw_updater: StdRwLock<Option<Arc<dyn WithdrawStatusUpdater>>>,
}

impl IndexerService {
    pub fn new(pool: Pool, config: IndexerConfig) -> Self {
        Self {
            deposit_service: DepositService::new(pool.clone()),
            pool,
            config,
            clients: RwLock::new(HashMap::new()),
            running_scanners: RwLock::new(HashMap::new()),
            withdraw_updater: StdRwLock::new(None),
        }
    }

    /// Post-construction injection; see [`WithdrawStatusUpdater`].
    pub fn set_withdraw_updater(&self, updater: Arc<dyn WithdrawStatusUpdater>) {
        *self
            .withdraw_updater
            .write()
            .expect("withdraw updater lock poisoned") = Some(updater);
    }

    fn current_withdraw_updater(&self) -> Option<Arc<dyn WithdrawStatusUpdater>> {
        self.withdraw_updater
            .read()
            .expect("withdraw updater lock poisoned")
            .clone()
    }

    /// Returns the chain's pooled RPC client, creating it from the chain
    /// config on first use.
    pub async fn get_client(&self, chain_id: i32) -> Result<Arc<EvmRpcClient>> {
        if let Some(client) = self.clients.read().await.get(&chain_id) {
            return Ok(client.clone());
        }

        let chain = self.load_chain(chain_id).await?;
        let urls = chain.parse_rpc_urls();
        let client = Arc::new(
            EvmRpcClient::new(&urls)
                .with_context(|| format!("cannot build RPC client for chain {chain_id}"))?,
        );

        let mut clients = self.clients.write().await;
        let client = clients.entry(chain_id).or_insert(client).clone();
        Ok(client)
    }

    pub async fn load_chain(&self, chain_id: i32) -> Result<Chain> {
        self.pool
            .interact_with_context(format!("load chain {chain_id}"), move |conn| {
                Chain::find_by_chain_id(chain_id, conn)
            })
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    anyhow::anyhow!("chain not found or inactive")
                } else {
                    e.into()
                }
            })
    }

    pub async fn active_chains(&self) -> Result<Vec<Chain>> {
        Ok(self
            .pool
            .interact_with_context("load active chains".to_string(), Chain::find_active)
            .await?)
    }

    /// Enumerates active chains and launches one scanner task per chain.
    /// Scanner lifetimes are bounded by `shutdown`.
    pub async fn start_multi_chain_scan(
        self: Arc<Self>,
        shutdown: CancellationToken,
    ) -> Result<()> {
        let chains = self.active_chains().await?;
        if chains.is_empty() {
            tracing::warn!("no active chains configured, scanner idle");
            return Ok(());
        }

        for chain in chains {
            if let Err(err) = self.clone().start_chain_scan(chain, shutdown.clone()).await {
                tracing::error!(error = %err, "failed to start chain scanner");
            }
        }

        Ok(())
    }

    async fn start_chain_scan(
        self: Arc<Self>,
        chain: Chain,
        shutdown: CancellationToken,
    ) -> Result<()> {
        let chain_id = chain.chain_id;

        let mut running = self.running_scanners.write().await;
        if running.contains_key(&chain_id) {
            return Ok(());
        }

        let client = self.get_client(chain_id).await?;
        let scanner = ChainScanner::new(
            self.pool.clone(),
            client,
            self.deposit_service.clone(),
            self.clone(),
            chain_id,
            self.config.clone(),
        );

        let token = shutdown.clone();
        running.insert(chain_id, token.clone());
        drop(running);

        tokio::spawn(async move {
            scanner.run(token).await;
        });

        tracing::info!(chain_id, "chain scanner started");
        Ok(())
    }

    /// Manual single-block scan, followed by the same post-scan hooks the
    /// periodic loop runs.
    pub async fn scan_chain_block(self: Arc<Self>, chain_id: i32, number: u64) -> Result<()> {
        let client = self.get_client(chain_id).await?;
        let scanner = ChainScanner::new(
            self.pool.clone(),
            client.clone(),
            self.deposit_service.clone(),
            self.clone(),
            chain_id,
            self.config.clone(),
        );

        scanner.scan_block(number).await?;
        let latest = client.block_number().await? as i64;
        scanner.run_post_scan_hooks(latest).await;
        Ok(())
    }

    pub async fn scan_progress(&self, chain_id: i32) -> Result<ScanProgress> {
        let client = self.get_client(chain_id).await?;
        let latest_block = client.block_number().await? as i64;

        let scanned_to = self
            .pool
            .interact_with_context(format!("scan progress for chain {chain_id}"), move |conn| {
                Block::max_canonical_number(chain_id, conn)
            })
            .await?
            .unwrap_or(0);

        Ok(ScanProgress {
            chain_id,
            latest_block,
            scanned_to,
            status: "scanning",
        })
    }

    pub(crate) async fn run_withdraw_hook(&self, chain_id: i32, latest_block: i64) {
        if let Some(updater) = self.current_withdraw_updater() {
            if let Err(err) = updater.update_withdraw_status(chain_id, latest_block).await {
                tracing::error!(chain_id, error = %err, "failed to update withdraw statuses");
            }
        }
    }

    /// Periodic safety net behind the post-scan hook: credits finalized
    /// deposits that the hook missed (restart, crash mid-batch).
    pub async fn run_backfill_worker(&self, shutdown: CancellationToken) {
        tracing::info!(
            interval_secs = self.config.backfill_interval.as_secs(),
            "deposit backfill worker started"
        );

        let mut ticker = tokio::time::interval(self.config.backfill_interval);

        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    tracing::info!("deposit backfill worker stopped");
                    return;
                }
                _ = ticker.tick() => {}
            }

            let chains = match self.active_chains().await {
                Ok(chains) => chains,
                Err(err) => {
                    tracing::error!(error = %err, "backfill worker failed to load active chains");
                    continue;
                }
            };

            for chain in chains {
                if let Err(err) = self
                    .deposit_service
                    .process_finalized_deposits(chain.chain_id)
                    .await
                {
                    tracing::error!(
                        chain_id = chain.chain_id,
                        error = %err,
                        "backfill worker failed to process finalized deposits"
                    );
                }
            }
        }
    }
}
