use chrono::{DateTime, Utc};
use diesel::dsl::{exists, select};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::wallets;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalletType {
    User,
    Hot,
    Cold,
}

impl WalletType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Hot => "hot",
            Self::Cold => "cold",
        }
    }
}

/// A derived account. `(address, chain_id)` is unique; the address is the
/// lowercase hex of the key at `derivation_path`.
#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = wallets)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Wallet {
    pub id: Uuid,
    pub user_id: String,
    pub address: String,
    pub chain_type: String,
    pub chain_id: i32,
    pub derivation_path: String,
    pub address_index: i32,
    pub wallet_type: String,
    pub device_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = wallets)]
pub struct NewWallet {
    pub user_id: String,
    pub address: String,
    pub chain_type: String,
    pub chain_id: i32,
    pub derivation_path: String,
    pub address_index: i32,
    pub wallet_type: String,
    pub device_name: Option<String>,
}

impl Wallet {
    pub fn find_by_id(id: Uuid, conn: &mut PgConnection) -> QueryResult<Self> {
        wallets::table.find(id).first(conn)
    }

    pub fn find_by_user_and_chain(
        user_id: &str,
        chain_id: i32,
        conn: &mut PgConnection,
    ) -> QueryResult<Self> {
        wallets::table
            .filter(wallets::user_id.eq(user_id))
            .filter(wallets::chain_id.eq(chain_id))
            .first(conn)
    }

    pub fn find_by_user(user_id: &str, conn: &mut PgConnection) -> QueryResult<Vec<Self>> {
        wallets::table
            .filter(wallets::user_id.eq(user_id))
            .order(wallets::created_at.asc())
            .load(conn)
    }

    /// Case-insensitive address lookup; addresses are stored lowercased but
    /// callers may hand in checksummed hex.
    pub fn find_by_address(
        address: &str,
        chain_id: i32,
        conn: &mut PgConnection,
    ) -> QueryResult<Self> {
        wallets::table
            .filter(wallets::address.eq(address.to_lowercase()))
            .filter(wallets::chain_id.eq(chain_id))
            .first(conn)
    }

    pub fn is_tracked_address(
        address: &str,
        chain_id: i32,
        conn: &mut PgConnection,
    ) -> QueryResult<bool> {
        select(exists(
            wallets::table
                .filter(wallets::chain_id.eq(chain_id))
                .filter(wallets::address.eq(address.to_lowercase())),
        ))
        .get_result(conn)
    }

    pub fn find_by_type(
        chain_id: i32,
        wallet_type: WalletType,
        conn: &mut PgConnection,
    ) -> QueryResult<Vec<Self>> {
        wallets::table
            .filter(wallets::chain_id.eq(chain_id))
            .filter(wallets::wallet_type.eq(wallet_type.as_str()))
            .order(wallets::address_index.asc())
            .load(conn)
    }

    pub fn find_first_hot(chain_id: i32, conn: &mut PgConnection) -> QueryResult<Self> {
        wallets::table
            .filter(wallets::chain_id.eq(chain_id))
            .filter(wallets::wallet_type.eq(WalletType::Hot.as_str()))
            .order(wallets::address_index.asc())
            .first(conn)
    }

    pub fn find_hot_by_address(
        address: &str,
        chain_id: i32,
        conn: &mut PgConnection,
    ) -> QueryResult<Self> {
        wallets::table
            .filter(wallets::address.eq(address.to_lowercase()))
            .filter(wallets::chain_id.eq(chain_id))
            .filter(wallets::wallet_type.eq(WalletType::Hot.as_str()))
            .first(conn)
    }

    pub fn create(new_wallet: &NewWallet, conn: &mut PgConnection) -> QueryResult<Self> {
        diesel::insert_into(wallets::table)
            .values(new_wallet)
            .get_result(conn)
    }
}
