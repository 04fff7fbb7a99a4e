use chrono::{DateTime, Utc};
use diesel::dsl::{exists, max, select};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::blocks;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockStatus {
    Confirmed,
    Safe,
    Finalized,
    Orphaned,
}

impl BlockStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Confirmed => "confirmed",
            Self::Safe => "safe",
            Self::Finalized => "finalized",
            Self::Orphaned => "orphaned",
        }
    }
}

/// One observed block. A hash is inserted at most once per chain; a reorg
/// flips the row to `orphaned` instead of deleting it.
#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = blocks)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Block {
    pub id: i64,
    pub hash: String,
    pub chain_id: i32,
    pub parent_hash: String,
    pub number: i64,
    pub timestamp: i64,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = blocks)]
pub struct NewBlock {
    pub hash: String,
    pub chain_id: i32,
    pub parent_hash: String,
    pub number: i64,
    pub timestamp: i64,
    pub status: String,
}

impl Block {
    /// Highest non-orphaned height for a chain, if any block was scanned.
    pub fn max_canonical_number(chain_id: i32, conn: &mut PgConnection) -> QueryResult<Option<i64>> {
        blocks::table
            .filter(blocks::chain_id.eq(chain_id))
            .filter(blocks::status.ne(BlockStatus::Orphaned.as_str()))
            .select(max(blocks::number))
            .first(conn)
    }

    pub fn find_canonical_at_height(
        chain_id: i32,
        number: i64,
        conn: &mut PgConnection,
    ) -> QueryResult<Self> {
        blocks::table
            .filter(blocks::chain_id.eq(chain_id))
            .filter(blocks::number.eq(number))
            .filter(blocks::status.ne(BlockStatus::Orphaned.as_str()))
            .first(conn)
    }

    pub fn find_canonical_above(
        chain_id: i32,
        number: i64,
        conn: &mut PgConnection,
    ) -> QueryResult<Vec<Self>> {
        blocks::table
            .filter(blocks::chain_id.eq(chain_id))
            .filter(blocks::number.gt(number))
            .filter(blocks::status.ne(BlockStatus::Orphaned.as_str()))
            .order(blocks::number.desc())
            .load(conn)
    }

    pub fn canonical_hash_exists(
        chain_id: i32,
        hash: &str,
        conn: &mut PgConnection,
    ) -> QueryResult<bool> {
        select(exists(
            blocks::table
                .filter(blocks::chain_id.eq(chain_id))
                .filter(blocks::hash.eq(hash))
                .filter(blocks::status.ne(BlockStatus::Orphaned.as_str())),
        ))
        .get_result(conn)
    }

    pub fn create(new_block: &NewBlock, conn: &mut PgConnection) -> QueryResult<Self> {
        diesel::insert_into(blocks::table)
            .values(new_block)
            .get_result(conn)
    }

    pub fn mark_orphaned(chain_id: i32, hash: &str, conn: &mut PgConnection) -> QueryResult<usize> {
        diesel::update(
            blocks::table
                .filter(blocks::chain_id.eq(chain_id))
                .filter(blocks::hash.eq(hash)),
        )
        .set((
            blocks::status.eq(BlockStatus::Orphaned.as_str()),
            blocks::updated_at.eq(Utc::now()),
        ))
        .execute(conn)
    }
}
