use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::withdraws;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawStatus {
    UserWithdrawRequest,
    Signing,
    Pending,
    Processing,
    Confirmed,
    Failed,
}

impl WithdrawStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::UserWithdrawRequest => "user_withdraw_request",
            Self::Signing => "signing",
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Confirmed => "confirmed",
            Self::Failed => "failed",
        }
    }
}

/// Full lifecycle record of one outbound user withdrawal. `from_address`
/// and `nonce` stay null until a hot wallet is chosen at processing time.
#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = withdraws)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Withdraw {
    pub id: Uuid,
    pub user_id: String,
    pub to_address: String,
    pub from_address: Option<String>,
    pub token_id: i32,
    pub amount: BigDecimal,
    pub fee: BigDecimal,
    pub chain_id: i32,
    pub chain_type: String,
    pub status: String,
    pub tx_hash: Option<String>,
    pub nonce: Option<i64>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = withdraws)]
pub struct NewWithdraw {
    pub user_id: String,
    pub to_address: String,
    pub token_id: i32,
    pub amount: BigDecimal,
    pub fee: BigDecimal,
    pub chain_id: i32,
    pub chain_type: String,
    pub status: String,
}

impl Withdraw {
    pub fn find_by_id(id: Uuid, conn: &mut PgConnection) -> QueryResult<Self> {
        withdraws::table.find(id).first(conn)
    }

    pub fn find_by_id_for_update(id: Uuid, conn: &mut PgConnection) -> QueryResult<Self> {
        withdraws::table.find(id).for_update().first(conn)
    }

    pub fn find_by_user(user_id: &str, conn: &mut PgConnection) -> QueryResult<Vec<Self>> {
        withdraws::table
            .filter(withdraws::user_id.eq(user_id))
            .order(withdraws::created_at.desc())
            .load(conn)
    }

    /// Broadcast withdraws still waiting on confirmations.
    pub fn find_in_flight_for_chain(
        chain_id: i32,
        conn: &mut PgConnection,
    ) -> QueryResult<Vec<Self>> {
        withdraws::table
            .filter(withdraws::chain_id.eq(chain_id))
            .filter(withdraws::status.eq_any([
                WithdrawStatus::Pending.as_str(),
                WithdrawStatus::Processing.as_str(),
            ]))
            .filter(withdraws::tx_hash.is_not_null())
            .load(conn)
    }

    pub fn create(new_withdraw: &NewWithdraw, conn: &mut PgConnection) -> QueryResult<Self> {
        diesel::insert_into(withdraws::table)
            .values(new_withdraw)
            .get_result(conn)
    }

    pub fn update_status(
        &self,
        status: WithdrawStatus,
        conn: &mut PgConnection,
    ) -> QueryResult<usize> {
        diesel::update(withdraws::table.find(self.id))
            .set((
                withdraws::status.eq(status.as_str()),
                withdraws::updated_at.eq(Utc::now()),
            ))
            .execute(conn)
    }

    /// Record a successful broadcast: the chosen hot wallet, the consumed
    /// nonce, and the transaction hash, moving the row to `pending`.
    pub fn record_broadcast(
        &self,
        tx_hash: &str,
        from_address: &str,
        nonce: i64,
        conn: &mut PgConnection,
    ) -> QueryResult<usize> {
        diesel::update(withdraws::table.find(self.id))
            .set((
                withdraws::status.eq(WithdrawStatus::Pending.as_str()),
                withdraws::tx_hash.eq(tx_hash),
                withdraws::from_address.eq(from_address),
                withdraws::nonce.eq(nonce),
                withdraws::updated_at.eq(Utc::now()),
            ))
            .execute(conn)
    }

    pub fn set_failed(
        &self,
        error_message: &str,
        conn: &mut PgConnection,
    ) -> QueryResult<usize> {
        diesel::update(withdraws::table.find(self.id))
            .set((
                withdraws::status.eq(WithdrawStatus::Failed.as_str()),
                withdraws::error_message.eq(error_message),
                withdraws::updated_at.eq(Utc::now()),
            ))
            .execute(conn)
    }
}
