use chrono::{DateTime, Utc};
use diesel::prelude::*;

use crate::schema::address_indexes;

/// Monotonic per-chain-type allocation counter for BIP44 address indices.
/// One row is shared across every EVM chain so an index is never reused.
#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = address_indexes)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct AddressIndex {
    pub id: i32,
    pub chain_type: String,
    pub device_name: String,
    pub current_index: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = address_indexes)]
pub struct NewAddressIndex {
    pub chain_type: String,
    pub device_name: String,
    pub current_index: i32,
}

impl AddressIndex {
    pub fn find_for_update(
        chain_type: &str,
        device_name: &str,
        conn: &mut PgConnection,
    ) -> QueryResult<Self> {
        address_indexes::table
            .filter(address_indexes::chain_type.eq(chain_type))
            .filter(address_indexes::device_name.eq(device_name))
            .for_update()
            .first(conn)
    }

    pub fn create(new_index: &NewAddressIndex, conn: &mut PgConnection) -> QueryResult<Self> {
        diesel::insert_into(address_indexes::table)
            .values(new_index)
            .get_result(conn)
    }

    pub fn set_current_index(&self, next: i32, conn: &mut PgConnection) -> QueryResult<usize> {
        diesel::update(address_indexes::table.find(self.id))
            .set((
                address_indexes::current_index.eq(next),
                address_indexes::updated_at.eq(Utc::now()),
            ))
            .execute(conn)
    }
}
