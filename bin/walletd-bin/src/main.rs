mod cli;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use dotenvy::dotenv;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use walletd_api::{ApiService, AppState};
use walletd_db::{init_pool, run_migrations};
use walletd_indexer::{IndexerConfig, IndexerService};
use walletd_keys::{AddressService, KeystoreService, SeedManager, Signer, initialize_keystore};
use walletd_treasury::{
    BalanceService, CollectService, HotWalletService, RebalanceService, WalletService,
    WithdrawService,
};

use crate::cli::{Cli, Command};

const COLLECT_INTERVAL: Duration = Duration::from_secs(5 * 60);
const REBALANCE_INTERVAL: Duration = Duration::from_secs(10 * 60);

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let pool = init_pool("walletd", &cli.database_url)?;
    run_migrations(&pool).await?;

    match cli.command {
        None | Some(Command::Serve) => serve(cli, pool).await,
        Some(Command::ScanBlock { chain_id, block }) => scan_block(pool, chain_id, block).await,
    }
}

async fn serve(cli: Cli, pool: deadpool_diesel::postgres::Pool) -> Result<()> {
    // Unlock (or create) the keystore before anything touches the chain; a
    // wrong password is fatal here.
    let seed_manager = Arc::new(SeedManager::new());
    let keystore_service = KeystoreService::new(pool.clone());
    initialize_keystore(&keystore_service, &seed_manager).await?;

    let address_service = AddressService::new(pool.clone());
    let signer = Arc::new(Signer::new(seed_manager.clone()));

    let indexer = Arc::new(IndexerService::new(pool.clone(), IndexerConfig::default()));
    let balance_service = Arc::new(BalanceService::new(pool.clone()));
    let hot_wallet_service =
        HotWalletService::new(pool.clone(), address_service.clone(), seed_manager.clone());
    let wallet_service = Arc::new(WalletService::new(
        pool.clone(),
        address_service,
        seed_manager.clone(),
    ));

    let withdraw_service = Arc::new(WithdrawService::new(
        pool.clone(),
        BalanceService::new(pool.clone()),
        hot_wallet_service.clone(),
        indexer.clone(),
        signer.clone(),
    ));
    // The scanner calls back into the withdraw service on every chain tick;
    // the slot is filled once both sides exist.
    indexer.set_withdraw_updater(withdraw_service.clone());

    let collect_service = Arc::new(CollectService::new(
        pool.clone(),
        indexer.clone(),
        hot_wallet_service.clone(),
        signer.clone(),
    ));
    let rebalance_service = Arc::new(RebalanceService::new(
        pool.clone(),
        indexer.clone(),
        hot_wallet_service.clone(),
        signer.clone(),
    ));

    let shutdown = CancellationToken::new();

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
            signal_token.cancel();
        }
    });

    indexer.clone().start_multi_chain_scan(shutdown.clone()).await?;

    {
        let indexer = indexer.clone();
        let token = shutdown.clone();
        tokio::spawn(async move { indexer.run_backfill_worker(token).await });
    }

    if cli.enable_auto_collect {
        let collect_service = collect_service.clone();
        let token = shutdown.clone();
        tokio::spawn(async move { collect_service.run_forever(COLLECT_INTERVAL, token).await });
    } else {
        tracing::info!("auto collect disabled");
    }

    if cli.enable_auto_rebalance {
        let rebalance_service = rebalance_service.clone();
        let token = shutdown.clone();
        tokio::spawn(async move { rebalance_service.run_forever(REBALANCE_INTERVAL, token).await });
    }

    let state = AppState {
        pool,
        wallet_service,
        balance_service,
        withdraw_service,
        collect_service,
        rebalance_service,
        hot_wallet_service: Arc::new(hot_wallet_service),
        indexer,
        signer,
        shutdown: shutdown.clone(),
    };

    let api = ApiService::new(state, &cli.api_host, cli.api_port);
    let result = api.run(shutdown.clone()).await;

    shutdown.cancel();
    seed_manager.clear();

    result
}

/// One-shot manual ingestion; no keystore needed since nothing is signed.
async fn scan_block(
    pool: deadpool_diesel::postgres::Pool,
    chain_id: i32,
    block: u64,
) -> Result<()> {
    let indexer = Arc::new(IndexerService::new(pool, IndexerConfig::default()));
    indexer.scan_chain_block(chain_id, block).await?;
    tracing::info!(chain_id, block, "block scanned");
    Ok(())
}
