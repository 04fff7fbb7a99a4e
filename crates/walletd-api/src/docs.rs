use utoipa::OpenApi;

use crate::dto;
use crate::handlers;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "walletd API",
        description = "Custodial HD wallet core for EVM chains"
    ),
    paths(
        handlers::wallets::create_wallet,
        handlers::wallets::list_wallets,
        handlers::wallets::get_wallet_address,
        handlers::wallets::sign_transaction,
        handlers::chains::list_chains,
        handlers::chains::get_scan_progress,
        handlers::deposits::list_deposits,
        handlers::deposits::list_pending_deposits,
        handlers::balances::get_total_balance,
        handlers::balances::get_pending_deposit_balance,
        handlers::balances::get_balance_by_token,
        handlers::withdraws::request_withdraw,
        handlers::withdraws::list_withdraws,
        handlers::withdraws::approve_withdraw,
        handlers::withdraws::reject_withdraw,
        handlers::treasury::trigger_collect,
        handlers::treasury::list_collects,
        handlers::treasury::trigger_rebalance,
        handlers::treasury::create_hot_wallet,
    ),
    components(schemas(
        dto::CreateWalletRequest,
        dto::WalletResponse,
        dto::ChainResponse,
        dto::TransactionResponse,
        dto::BalanceResponse,
        dto::TokenBalanceResponse,
        dto::RequestWithdrawBody,
        dto::WithdrawResponse,
        dto::RejectWithdrawBody,
        dto::TriggerCollectBody,
        dto::TriggerRebalanceBody,
        dto::CreateHotWalletBody,
        dto::SignTransactionBody,
        dto::SignTransactionResponse,
        dto::TriggeredResponse,
        dto::ScanProgressResponse,
    ))
)]
pub struct ApiDoc;
