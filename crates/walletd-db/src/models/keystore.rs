use chrono::{DateTime, Utc};
use diesel::dsl::count_star;
use diesel::prelude::*;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::schema::keystore;

/// Fixed primary key of the single keystore row. All users share one
/// mnemonic; only the derivation index differs per wallet.
pub const KEYSTORE_SENTINEL_ID: Uuid = Uuid::from_u128(1);

/// The encrypted mnemonic at rest, in keystore-v3 shape inside
/// `keystore_data`, plus the index-0 address used to verify the unlock
/// password at boot.
#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = keystore)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Keystore {
    pub id: Uuid,
    pub keystore_data: JsonValue,
    pub version: i32,
    pub cipher: String,
    pub kdf: String,
    pub verification_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = keystore)]
pub struct NewKeystore {
    pub id: Uuid,
    pub keystore_data: JsonValue,
    pub version: i32,
    pub cipher: String,
    pub kdf: String,
}

impl Keystore {
    pub fn get(conn: &mut PgConnection) -> QueryResult<Self> {
        keystore::table.first(conn)
    }

    pub fn exists(conn: &mut PgConnection) -> QueryResult<bool> {
        keystore::table
            .select(count_star())
            .first::<i64>(conn)
            .map(|count| count > 0)
    }

    pub fn create(new_keystore: &NewKeystore, conn: &mut PgConnection) -> QueryResult<Self> {
        diesel::insert_into(keystore::table)
            .values(new_keystore)
            .get_result(conn)
    }

    pub fn set_verification_address(
        address: &str,
        conn: &mut PgConnection,
    ) -> QueryResult<usize> {
        diesel::update(keystore::table.find(KEYSTORE_SENTINEL_ID))
            .set((
                keystore::verification_address.eq(address),
                keystore::updated_at.eq(Utc::now()),
            ))
            .execute(conn)
    }
}
