use anyhow::Result;
use bigdecimal::{BigDecimal, Zero};
use deadpool_diesel::postgres::Pool;

use walletd_db::WalletdPool;
use walletd_db::models::Credit;

/// Per-token finalized balance line.
#[derive(Debug, Clone)]
pub struct TokenBalance {
    pub token_id: i32,
    pub token_symbol: String,
    pub chain_id: Option<i32>,
    pub amount: BigDecimal,
}

/// Pure aggregation over the credits ledger; no cache, no private state.
#[derive(Clone)]
pub struct BalanceService {
    pool: Pool,
}

impl BalanceService {
    pub const fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Sum of every finalized credit, optionally scoped to one chain.
    pub async fn total_balance(&self, user_id: &str, chain_id: Option<i32>) -> Result<BigDecimal> {
        let user_id = user_id.to_string();
        let total = self
            .pool
            .interact_with_context(format!("total balance for {user_id}"), move |conn| {
                Credit::total_balance(&user_id, chain_id, conn)
            })
            .await?;
        Ok(total.unwrap_or_else(BigDecimal::zero))
    }

    /// Deposits still travelling towards finality.
    pub async fn pending_deposit_balance(
        &self,
        user_id: &str,
        chain_id: Option<i32>,
    ) -> Result<BigDecimal> {
        let user_id = user_id.to_string();
        let total = self
            .pool
            .interact_with_context(format!("pending deposit balance for {user_id}"), move |conn| {
                Credit::pending_deposit_balance(&user_id, chain_id, conn)
            })
            .await?;
        Ok(total.unwrap_or_else(BigDecimal::zero))
    }

    /// Finalized balances grouped per token, zero-sum rows dropped.
    pub async fn balance_by_token(
        &self,
        user_id: &str,
        chain_id: Option<i32>,
    ) -> Result<Vec<TokenBalance>> {
        let user_id = user_id.to_string();
        let rows = self
            .pool
            .interact_with_context(format!("balance by token for {user_id}"), move |conn| {
                Credit::balance_by_token(&user_id, chain_id, conn)
            })
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(token_id, token_symbol, chain_id, amount)| {
                let amount = amount.unwrap_or_else(BigDecimal::zero);
                (!amount.is_zero()).then_some(TokenBalance {
                    token_id,
                    token_symbol,
                    chain_id,
                    amount,
                })
            })
            .collect())
    }

    /// Withdraw precheck: finalized credits plus the (negative) outstanding
    /// withdraw rows, so the result is what the user can still move.
    pub async fn available_balance(
        &self,
        user_id: &str,
        chain_id: i32,
        token_id: i32,
    ) -> Result<BigDecimal> {
        let user_id = user_id.to_string();
        let total = self
            .pool
            .interact_with_context(format!("available balance for {user_id}"), move |conn| {
                Credit::available_balance(&user_id, chain_id, token_id, conn)
            })
            .await?;
        Ok(total.unwrap_or_else(BigDecimal::zero))
    }
}
