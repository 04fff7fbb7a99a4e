use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::tokens;

/// A native or ERC-20 asset on one chain. The native row carries an empty
/// `token_address` and `is_native = true`.
#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = tokens)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Token {
    pub id: i32,
    pub chain_id: i32,
    pub chain_type: String,
    pub token_address: String,
    pub token_symbol: String,
    pub token_name: Option<String>,
    pub decimals: i32,
    pub is_native: bool,
    pub min_withdraw_amount: Option<BigDecimal>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = tokens)]
pub struct NewToken {
    pub chain_id: i32,
    pub chain_type: String,
    pub token_address: String,
    pub token_symbol: String,
    pub token_name: Option<String>,
    pub decimals: i32,
    pub is_native: bool,
    pub is_active: bool,
}

impl Token {
    pub fn find_by_id(id: i32, conn: &mut PgConnection) -> QueryResult<Self> {
        tokens::table.find(id).first(conn)
    }

    pub fn find_native(chain_id: i32, conn: &mut PgConnection) -> QueryResult<Self> {
        tokens::table
            .filter(tokens::chain_id.eq(chain_id))
            .filter(tokens::is_native.eq(true))
            .first(conn)
    }

    pub fn find_by_address(
        chain_id: i32,
        token_address: &str,
        conn: &mut PgConnection,
    ) -> QueryResult<Self> {
        tokens::table
            .filter(tokens::chain_id.eq(chain_id))
            .filter(tokens::token_address.eq(token_address.to_lowercase()))
            .first(conn)
    }

    pub fn find_active_for_chain(chain_id: i32, conn: &mut PgConnection) -> QueryResult<Vec<Self>> {
        tokens::table
            .filter(tokens::chain_id.eq(chain_id))
            .filter(tokens::is_active.eq(true))
            .order(tokens::id.asc())
            .load(conn)
    }

    pub fn create(new_token: &NewToken, conn: &mut PgConnection) -> QueryResult<Self> {
        diesel::insert_into(tokens::table)
            .values(new_token)
            .get_result(conn)
    }
}
