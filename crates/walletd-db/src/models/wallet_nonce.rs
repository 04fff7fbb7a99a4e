use chrono::{DateTime, Utc};
use diesel::prelude::*;

use crate::schema::wallet_nonces;

/// Per-(address, chain) outbound nonce counter. The stored value is the
/// next nonce to hand out; every allocation happens under a row lock.
#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = wallet_nonces)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct WalletNonce {
    pub id: i32,
    pub address: String,
    pub chain_id: i32,
    pub nonce: i64,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = wallet_nonces)]
pub struct NewWalletNonce {
    pub address: String,
    pub chain_id: i32,
    pub nonce: i64,
}

impl WalletNonce {
    pub fn find_for_update(
        address: &str,
        chain_id: i32,
        conn: &mut PgConnection,
    ) -> QueryResult<Self> {
        wallet_nonces::table
            .filter(wallet_nonces::address.eq(address))
            .filter(wallet_nonces::chain_id.eq(chain_id))
            .for_update()
            .first(conn)
    }

    pub fn create(new_nonce: &NewWalletNonce, conn: &mut PgConnection) -> QueryResult<Self> {
        diesel::insert_into(wallet_nonces::table)
            .values(new_nonce)
            .get_result(conn)
    }

    pub fn advance(&self, conn: &mut PgConnection) -> QueryResult<usize> {
        diesel::update(wallet_nonces::table.find(self.id))
            .set((
                wallet_nonces::nonce.eq(self.nonce + 1),
                wallet_nonces::last_used_at.eq(Utc::now()),
                wallet_nonces::updated_at.eq(Utc::now()),
            ))
            .execute(conn)
    }
}
