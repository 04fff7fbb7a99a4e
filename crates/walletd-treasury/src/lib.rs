pub mod amounts;
pub mod balance;
pub mod collect;
pub mod hotwallet;
pub mod rebalance;
pub mod wallets;
pub mod withdraw;

pub use amounts::{decimal_to_u256, to_base_units, u256_to_decimal};
pub use balance::{BalanceService, TokenBalance};
pub use collect::CollectService;
pub use hotwallet::HotWalletService;
pub use rebalance::{PlannedTransfer, RebalanceRequest, RebalanceService, plan_transfers};
pub use wallets::WalletService;
pub use withdraw::{WithdrawRequest, WithdrawService, map_withdraw_confirmations};
