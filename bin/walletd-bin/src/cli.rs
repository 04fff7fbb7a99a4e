use clap::{Parser, Subcommand};

/// Custodial HD wallet daemon for EVM chains.
#[derive(Debug, Parser)]
#[command(name = "walletd", version)]
pub struct Cli {
    /// Postgres connection string.
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    /// Address the HTTP adapter binds to.
    #[arg(long, env = "WALLETD_API_HOST", default_value = "0.0.0.0")]
    pub api_host: String,

    #[arg(long, env = "WALLETD_API_PORT", default_value_t = 8080)]
    pub api_port: u16,

    /// Periodically sweep user wallets into the hot wallets.
    #[arg(long, env = "WALLETD_ENABLE_AUTO_COLLECT", default_value_t = false)]
    pub enable_auto_collect: bool,

    /// Periodically redistribute native balance across hot wallets.
    #[arg(long, env = "WALLETD_ENABLE_AUTO_REBALANCE", default_value_t = true)]
    pub enable_auto_rebalance: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the wallet daemon (scanner, workers, HTTP adapter). Default.
    Serve,
    /// Re-scan one block on one chain and run the post-scan hooks once.
    /// Useful after an RPC outage left a gap in ingestion.
    ScanBlock {
        #[arg(long)]
        chain_id: i32,
        #[arg(long)]
        block: u64,
    },
}
