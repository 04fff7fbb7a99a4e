use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::dsl::{exists, select, sum};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::schema::credits;

pub const REFERENCE_TYPE_BLOCKCHAIN_TX: &str = "blockchain_tx";
pub const REFERENCE_TYPE_WITHDRAW: &str = "withdraw";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CreditStatus {
    Pending,
    Confirmed,
    Finalized,
    Failed,
    Frozen,
}

impl CreditStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Finalized => "finalized",
            Self::Failed => "failed",
            Self::Frozen => "frozen",
        }
    }
}

/// Append-only ledger row. The signed sum of `finalized` rows per user and
/// token is the realized balance; frozen withdraw rows carry a negative
/// amount so the available balance is a plain sum as well.
#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = credits)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Credit {
    pub id: i64,
    pub user_id: String,
    pub address: String,
    pub token_id: i32,
    pub token_symbol: String,
    pub amount: BigDecimal,
    pub credit_type: String,
    pub business_type: String,
    pub reference_id: String,
    pub reference_type: String,
    pub event_index: i32,
    pub chain_id: Option<i32>,
    pub chain_type: Option<String>,
    pub status: String,
    pub block_number: Option<i64>,
    pub tx_hash: Option<String>,
    pub metadata: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = credits)]
pub struct NewCredit {
    pub user_id: String,
    pub address: String,
    pub token_id: i32,
    pub token_symbol: String,
    pub amount: BigDecimal,
    pub credit_type: String,
    pub business_type: String,
    pub reference_id: String,
    pub reference_type: String,
    pub event_index: i32,
    pub chain_id: Option<i32>,
    pub chain_type: Option<String>,
    pub status: String,
    pub block_number: Option<i64>,
    pub tx_hash: Option<String>,
}

impl Credit {
    pub fn create(new_credit: &NewCredit, conn: &mut PgConnection) -> QueryResult<Self> {
        diesel::insert_into(credits::table)
            .values(new_credit)
            .get_result(conn)
    }

    pub fn exists_for_reference(
        reference_id: &str,
        reference_type: &str,
        conn: &mut PgConnection,
    ) -> QueryResult<bool> {
        select(exists(
            credits::table
                .filter(credits::reference_id.eq(reference_id))
                .filter(credits::reference_type.eq(reference_type)),
        ))
        .get_result(conn)
    }

    /// Mirror a transaction status change into every linked ledger row.
    pub fn update_status_for_reference(
        reference_id: &str,
        reference_type: &str,
        status: CreditStatus,
        conn: &mut PgConnection,
    ) -> QueryResult<usize> {
        diesel::update(
            credits::table
                .filter(credits::reference_id.eq(reference_id))
                .filter(credits::reference_type.eq(reference_type)),
        )
        .set((
            credits::status.eq(status.as_str()),
            credits::updated_at.eq(Utc::now()),
        ))
        .execute(conn)
    }

    pub fn find_frozen_for_withdraw(
        withdraw_id: &str,
        conn: &mut PgConnection,
    ) -> QueryResult<Vec<Self>> {
        credits::table
            .filter(credits::reference_id.eq(withdraw_id))
            .filter(credits::reference_type.eq(REFERENCE_TYPE_WITHDRAW))
            .filter(credits::status.eq(CreditStatus::Frozen.as_str()))
            .load(conn)
    }

    /// Reorg rollback: every ledger row attributed to an orphaned height
    /// fails; the re-ingested canonical block recreates the deposits.
    pub fn fail_by_chain_and_block(
        chain_id: i32,
        block_number: i64,
        conn: &mut PgConnection,
    ) -> QueryResult<usize> {
        diesel::update(
            credits::table
                .filter(credits::chain_id.eq(chain_id))
                .filter(credits::block_number.eq(block_number)),
        )
        .set((
            credits::status.eq(CreditStatus::Failed.as_str()),
            credits::updated_at.eq(Utc::now()),
        ))
        .execute(conn)
    }

    // Balance aggregations. All balance queries are sums over this table;
    // there is no cache to invalidate.

    pub fn total_balance(
        user_id: &str,
        chain_id: Option<i32>,
        conn: &mut PgConnection,
    ) -> QueryResult<Option<BigDecimal>> {
        let base = credits::table
            .filter(credits::user_id.eq(user_id))
            .filter(credits::status.eq(CreditStatus::Finalized.as_str()));

        match chain_id {
            Some(chain_id) => base
                .filter(credits::chain_id.eq(chain_id))
                .select(sum(credits::amount))
                .first(conn),
            None => base.select(sum(credits::amount)).first(conn),
        }
    }

    pub fn pending_deposit_balance(
        user_id: &str,
        chain_id: Option<i32>,
        conn: &mut PgConnection,
    ) -> QueryResult<Option<BigDecimal>> {
        let base = credits::table
            .filter(credits::user_id.eq(user_id))
            .filter(credits::credit_type.eq("deposit"))
            .filter(credits::status.eq_any([
                CreditStatus::Pending.as_str(),
                CreditStatus::Confirmed.as_str(),
            ]));

        match chain_id {
            Some(chain_id) => base
                .filter(credits::chain_id.eq(chain_id))
                .select(sum(credits::amount))
                .first(conn),
            None => base.select(sum(credits::amount)).first(conn),
        }
    }

    /// Finalized sums grouped per token; zero-sum groups are dropped by the
    /// caller.
    pub fn balance_by_token(
        user_id: &str,
        chain_id: Option<i32>,
        conn: &mut PgConnection,
    ) -> QueryResult<Vec<(i32, String, Option<i32>, Option<BigDecimal>)>> {
        let base = credits::table
            .filter(credits::user_id.eq(user_id))
            .filter(credits::status.eq(CreditStatus::Finalized.as_str()));

        match chain_id {
            Some(chain_id) => base
                .filter(credits::chain_id.eq(chain_id))
                .group_by((credits::token_id, credits::token_symbol, credits::chain_id))
                .select((
                    credits::token_id,
                    credits::token_symbol,
                    credits::chain_id,
                    sum(credits::amount),
                ))
                .load(conn),
            None => base
                .group_by((credits::token_id, credits::token_symbol, credits::chain_id))
                .select((
                    credits::token_id,
                    credits::token_symbol,
                    credits::chain_id,
                    sum(credits::amount),
                ))
                .load(conn),
        }
    }

    /// Withdraw precheck. Outstanding withdraw rows are negative, so this
    /// sum equals finalized minus everything frozen or in flight.
    pub fn available_balance(
        user_id: &str,
        chain_id: i32,
        token_id: i32,
        conn: &mut PgConnection,
    ) -> QueryResult<Option<BigDecimal>> {
        credits::table
            .filter(credits::user_id.eq(user_id))
            .filter(credits::chain_id.eq(chain_id))
            .filter(credits::token_id.eq(token_id))
            .filter(
                credits::status.eq(CreditStatus::Finalized.as_str()).or(credits::credit_type
                    .eq("withdraw")
                    .and(credits::status.eq_any(["pending", "processing", "frozen", "signing"]))),
            )
            .select(sum(credits::amount))
            .first(conn)
    }
}
