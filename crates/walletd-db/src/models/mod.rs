pub mod address_index;
pub mod block;
pub mod chain;
pub mod credit;
pub mod keystore;
pub mod token;
pub mod transaction;
pub mod wallet;
pub mod wallet_nonce;
pub mod withdraw;

pub use address_index::{AddressIndex, NewAddressIndex};
pub use block::{Block, BlockStatus, NewBlock};
pub use chain::{Chain, parse_rpc_urls};
pub use credit::{
    Credit, CreditStatus, NewCredit, REFERENCE_TYPE_BLOCKCHAIN_TX, REFERENCE_TYPE_WITHDRAW,
};
pub use keystore::{KEYSTORE_SENTINEL_ID, Keystore, NewKeystore};
pub use token::{NewToken, Token};
pub use transaction::{NewTransaction, Transaction, TransactionStatus, TransactionType};
pub use wallet::{NewWallet, Wallet, WalletType};
pub use wallet_nonce::{NewWalletNonce, WalletNonce};
pub use withdraw::{NewWithdraw, Withdraw, WithdrawStatus};
