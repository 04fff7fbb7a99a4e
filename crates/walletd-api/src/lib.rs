pub mod docs;
pub mod dto;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod router;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use deadpool_diesel::postgres::Pool;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

use walletd_indexer::IndexerService;
use walletd_keys::Signer;
use walletd_treasury::{
    BalanceService, CollectService, HotWalletService, RebalanceService, WalletService,
    WithdrawService,
};

use router::api_router;

/// Everything the handlers need, cheap to clone per request.
#[derive(Clone)]
pub struct AppState {
    pub pool: Pool,
    pub wallet_service: Arc<WalletService>,
    pub balance_service: Arc<BalanceService>,
    pub withdraw_service: Arc<WithdrawService>,
    pub collect_service: Arc<CollectService>,
    pub rebalance_service: Arc<RebalanceService>,
    pub hot_wallet_service: Arc<HotWalletService>,
    pub indexer: Arc<IndexerService>,
    pub signer: Arc<Signer>,
    pub shutdown: CancellationToken,
}

/// The HTTP adapter over the custody core. Request framing and identity
/// verification live upstream; this surface only exposes the operations.
pub struct ApiService {
    state: AppState,
    host: String,
    port: u16,
}

impl ApiService {
    pub fn new(state: AppState, host: &str, port: u16) -> Self {
        Self {
            state,
            host: host.to_owned(),
            port,
        }
    }

    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let address: SocketAddr = format!("{}:{}", self.host, self.port)
            .parse()
            .context("invalid API listen address")?;
        let listener = TcpListener::bind(address)
            .await
            .with_context(|| format!("cannot bind API listener on {address}"))?;

        let app = api_router()
            .with_state(self.state)
            .layer(CorsLayer::permissive());

        tracing::info!(%address, "API listening");

        let graceful = async move { shutdown.cancelled().await };
        axum::serve(listener, app)
            .with_graceful_shutdown(graceful)
            .await
            .context("API server stopped unexpectedly")
    }
}
