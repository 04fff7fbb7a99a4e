use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::dsl::{exists, select};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::transactions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Deposit,
    Withdraw,
    Collect,
    Rebalance,
}

impl TransactionType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::Withdraw => "withdraw",
            Self::Collect => "collect",
            Self::Rebalance => "rebalance",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Confirmed,
    Safe,
    Finalized,
    Failed,
}

impl TransactionStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Confirmed => "confirmed",
            Self::Safe => "safe",
            Self::Finalized => "finalized",
            Self::Failed => "failed",
        }
    }
}

/// One on-chain transfer the core cares about, inserted by the analyzer or
/// synthesized from a receipt on the withdraw-confirmation path. Never
/// deleted; hashes are stored lowercased.
#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = transactions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Transaction {
    pub id: i64,
    pub chain_id: i32,
    pub block_hash: String,
    pub block_no: i64,
    pub tx_hash: String,
    pub from_addr: String,
    pub to_addr: String,
    pub token_addr: Option<String>,
    pub amount: BigDecimal,
    pub type_: String,
    pub status: String,
    pub confirmation_count: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = transactions)]
pub struct NewTransaction {
    pub chain_id: i32,
    pub block_hash: String,
    pub block_no: i64,
    pub tx_hash: String,
    pub from_addr: String,
    pub to_addr: String,
    pub token_addr: Option<String>,
    pub amount: BigDecimal,
    pub type_: String,
    pub status: String,
    pub confirmation_count: Option<i64>,
}

impl Transaction {
    pub fn exists_by_hash(
        chain_id: i32,
        tx_hash: &str,
        conn: &mut PgConnection,
    ) -> QueryResult<bool> {
        select(exists(
            transactions::table
                .filter(transactions::chain_id.eq(chain_id))
                .filter(transactions::tx_hash.eq(tx_hash.to_lowercase())),
        ))
        .get_result(conn)
    }

    pub fn find_by_hash(
        chain_id: i32,
        tx_hash: &str,
        conn: &mut PgConnection,
    ) -> QueryResult<Self> {
        transactions::table
            .filter(transactions::chain_id.eq(chain_id))
            .filter(transactions::tx_hash.eq(tx_hash.to_lowercase()))
            .first(conn)
    }

    /// Transactions still travelling through the confirmation state machine,
    /// oldest block first. `finalized` is terminal and is not revisited.
    pub fn find_awaiting_confirmation(
        chain_id: i32,
        conn: &mut PgConnection,
    ) -> QueryResult<Vec<Self>> {
        transactions::table
            .filter(transactions::chain_id.eq(chain_id))
            .filter(transactions::status.eq_any([
                TransactionStatus::Confirmed.as_str(),
                TransactionStatus::Safe.as_str(),
            ]))
            .order(transactions::block_no.asc())
            .load(conn)
    }

    pub fn find_finalized_deposits(
        chain_id: i32,
        conn: &mut PgConnection,
    ) -> QueryResult<Vec<Self>> {
        transactions::table
            .filter(transactions::chain_id.eq(chain_id))
            .filter(transactions::type_.eq(TransactionType::Deposit.as_str()))
            .filter(transactions::status.eq(TransactionStatus::Finalized.as_str()))
            .order(transactions::block_no.asc())
            .load(conn)
    }

    pub fn find_deposits_for_addresses(
        addresses: &[String],
        statuses: &[&'static str],
        conn: &mut PgConnection,
    ) -> QueryResult<Vec<Self>> {
        transactions::table
            .filter(transactions::type_.eq(TransactionType::Deposit.as_str()))
            .filter(transactions::to_addr.eq_any(addresses.iter().map(String::as_str)))
            .filter(transactions::status.eq_any(statuses.iter().copied()))
            .order(transactions::block_no.desc())
            .load(conn)
    }

    pub fn find_by_type(
        type_: TransactionType,
        chain_id: Option<i32>,
        conn: &mut PgConnection,
    ) -> QueryResult<Vec<Self>> {
        let mut query = transactions::table
            .filter(transactions::type_.eq(type_.as_str()))
            .into_boxed();
        if let Some(chain_id) = chain_id {
            query = query.filter(transactions::chain_id.eq(chain_id));
        }
        query.order(transactions::block_no.desc()).load(conn)
    }

    pub fn create(new_tx: &NewTransaction, conn: &mut PgConnection) -> QueryResult<Self> {
        diesel::insert_into(transactions::table)
            .values(new_tx)
            .get_result(conn)
    }

    pub fn update_status_and_count(
        &self,
        status: TransactionStatus,
        confirmation_count: i64,
        conn: &mut PgConnection,
    ) -> QueryResult<usize> {
        diesel::update(transactions::table.find(self.id))
            .set((
                transactions::status.eq(status.as_str()),
                transactions::confirmation_count.eq(confirmation_count),
                transactions::updated_at.eq(Utc::now()),
            ))
            .execute(conn)
    }

    pub fn update_confirmation_count(
        &self,
        confirmation_count: i64,
        conn: &mut PgConnection,
    ) -> QueryResult<usize> {
        diesel::update(transactions::table.find(self.id))
            .set((
                transactions::confirmation_count.eq(confirmation_count),
                transactions::updated_at.eq(Utc::now()),
            ))
            .execute(conn)
    }

    /// Fail every transaction sitting on an orphaned block.
    pub fn fail_by_block_hash(
        chain_id: i32,
        block_hash: &str,
        conn: &mut PgConnection,
    ) -> QueryResult<usize> {
        diesel::update(
            transactions::table
                .filter(transactions::chain_id.eq(chain_id))
                .filter(transactions::block_hash.eq(block_hash)),
        )
        .set((
            transactions::status.eq(TransactionStatus::Failed.as_str()),
            transactions::updated_at.eq(Utc::now()),
        ))
        .execute(conn)
    }
}
