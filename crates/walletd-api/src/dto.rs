use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use walletd_db::models::{Chain, Transaction, Wallet, Withdraw};
use walletd_treasury::TokenBalance;

/// Uniform response envelope.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateWalletRequest {
    pub chain_id: i32,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WalletResponse {
    pub id: Uuid,
    pub user_id: String,
    pub address: String,
    pub chain_type: String,
    pub chain_id: i32,
    pub derivation_path: String,
    pub address_index: i32,
    pub wallet_type: String,
    pub created_at: DateTime<Utc>,
}

impl From<Wallet> for WalletResponse {
    fn from(wallet: Wallet) -> Self {
        Self {
            id: wallet.id,
            user_id: wallet.user_id,
            address: wallet.address,
            chain_type: wallet.chain_type,
            chain_id: wallet.chain_id,
            derivation_path: wallet.derivation_path,
            address_index: wallet.address_index,
            wallet_type: wallet.wallet_type,
            created_at: wallet.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ChainResponse {
    pub chain_id: i32,
    pub chain_name: String,
    pub native_token_symbol: String,
    pub confirmation_blocks: i32,
    pub finalized_blocks: i32,
    pub is_active: bool,
}

impl From<Chain> for ChainResponse {
    fn from(chain: Chain) -> Self {
        Self {
            chain_id: chain.chain_id,
            chain_name: chain.chain_name,
            native_token_symbol: chain.native_token_symbol,
            confirmation_blocks: chain.confirmation_blocks,
            finalized_blocks: chain.finalized_blocks,
            is_active: chain.is_active,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TransactionResponse {
    pub tx_hash: String,
    pub chain_id: i32,
    pub block_no: i64,
    pub from_addr: String,
    pub to_addr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_addr: Option<String>,
    /// Base units as a decimal string.
    pub amount: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub status: String,
    pub confirmation_count: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl From<Transaction> for TransactionResponse {
    fn from(tx: Transaction) -> Self {
        Self {
            tx_hash: tx.tx_hash,
            chain_id: tx.chain_id,
            block_no: tx.block_no,
            from_addr: tx.from_addr,
            to_addr: tx.to_addr,
            token_addr: tx.token_addr,
            amount: tx.amount.normalized().to_string(),
            type_: tx.type_,
            status: tx.status,
            confirmation_count: tx.confirmation_count,
            created_at: tx.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BalanceResponse {
    /// Signed base-unit sum as a decimal string.
    pub amount: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TokenBalanceResponse {
    pub token_id: i32,
    pub token_symbol: String,
    pub chain_id: Option<i32>,
    pub amount: String,
}

impl From<TokenBalance> for TokenBalanceResponse {
    fn from(balance: TokenBalance) -> Self {
        Self {
            token_id: balance.token_id,
            token_symbol: balance.token_symbol,
            chain_id: balance.chain_id,
            amount: balance.amount.normalized().to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RequestWithdrawBody {
    pub to_address: String,
    pub token_id: i32,
    /// Human-readable token amount, e.g. "1.5".
    pub amount: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WithdrawResponse {
    pub id: Uuid,
    pub user_id: String,
    pub to_address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_address: Option<String>,
    pub token_id: i32,
    pub amount: String,
    pub chain_id: i32,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Withdraw> for WithdrawResponse {
    fn from(withdraw: Withdraw) -> Self {
        Self {
            id: withdraw.id,
            user_id: withdraw.user_id,
            to_address: withdraw.to_address,
            from_address: withdraw.from_address,
            token_id: withdraw.token_id,
            amount: withdraw.amount.normalized().to_string(),
            chain_id: withdraw.chain_id,
            status: withdraw.status,
            tx_hash: withdraw.tx_hash,
            nonce: withdraw.nonce,
            error_message: withdraw.error_message,
            created_at: withdraw.created_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RejectWithdrawBody {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct TriggerCollectBody {
    #[serde(default)]
    pub chain_id: Option<i32>,
    #[serde(default)]
    pub wallet_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct TriggerRebalanceBody {
    pub chain_id: i32,
    #[serde(default)]
    pub from_address: Option<String>,
    #[serde(default)]
    pub to_address: Option<String>,
    /// Base units (wei) as a decimal string; required for manual transfers.
    #[serde(default)]
    pub amount_wei: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateHotWalletBody {
    pub chain_id: i32,
    #[serde(default)]
    pub device_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SignTransactionBody {
    pub chain_id: i64,
    pub to: String,
    pub value: String,
    pub gas_limit: u64,
    pub max_fee_per_gas: String,
    pub max_priority_fee_per_gas: String,
    pub nonce: u64,
    /// Hex-encoded calldata, with or without `0x`.
    #[serde(default)]
    pub data: Option<String>,
    pub from_address: String,
    pub derivation_path: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SignTransactionResponse {
    pub raw_transaction: String,
    pub tx_hash: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TriggeredResponse {
    pub triggered: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ScanProgressResponse {
    pub chain_id: i32,
    pub latest_block: i64,
    pub scanned_to: i64,
    pub status: String,
}
