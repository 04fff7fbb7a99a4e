pub mod balances;
pub mod chains;
pub mod deposits;
pub mod treasury;
pub mod wallets;
pub mod withdraws;

pub use balances::{get_balance_by_token, get_pending_deposit_balance, get_total_balance};
pub use chains::{get_scan_progress, list_chains};
pub use deposits::{list_deposits, list_pending_deposits};
pub use treasury::{create_hot_wallet, list_collects, trigger_collect, trigger_rebalance};
pub use wallets::{create_wallet, get_wallet_address, list_wallets, sign_transaction};
pub use withdraws::{approve_withdraw, list_withdraws, reject_withdraw, request_withdraw};
