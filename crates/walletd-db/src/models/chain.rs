use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::chains;

/// One EVM chain the custody core tracks. `rpc_url` may hold several
/// endpoints separated by commas, walked in order on failover.
#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = chains)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Chain {
    pub id: i32,
    pub chain_id: i32,
    pub chain_name: String,
    pub chain_type: String,
    pub rpc_url: String,
    pub native_token_symbol: String,
    pub confirmation_blocks: i32,
    pub finalized_blocks: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Chain {
    pub fn find_by_chain_id(chain_id: i32, conn: &mut PgConnection) -> QueryResult<Self> {
        chains::table
            .filter(chains::chain_id.eq(chain_id))
            .first(conn)
    }

    pub fn find_all(conn: &mut PgConnection) -> QueryResult<Vec<Self>> {
        chains::table.order(chains::chain_id.asc()).load(conn)
    }

    pub fn find_active(conn: &mut PgConnection) -> QueryResult<Vec<Self>> {
        chains::table
            .filter(chains::is_active.eq(true))
            .order(chains::chain_id.asc())
            .load(conn)
    }

    /// Split the stored endpoint list on commas, dropping blanks.
    pub fn parse_rpc_urls(&self) -> Vec<String> {
        parse_rpc_urls(&self.rpc_url)
    }
}

pub fn parse_rpc_urls(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comma_separated_urls() {
        let urls = parse_rpc_urls("https://a.example/rpc, https://b.example/rpc ,");
        assert_eq!(urls, vec!["https://a.example/rpc", "https://b.example/rpc"]);
    }

    #[test]
    fn empty_input_yields_no_urls() {
        assert!(parse_rpc_urls("").is_empty());
        assert!(parse_rpc_urls(" , ,").is_empty());
    }
}
