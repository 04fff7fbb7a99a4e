use alloy::rpc::types::Block as RpcBlock;
use anyhow::{Context, Result};
use deadpool_diesel::postgres::Pool;
use diesel::Connection;
use diesel::result::OptionalExtension;

use walletd_db::WalletdPool;
use walletd_db::models::{Block, Credit, Transaction};

/// Detects a fork by comparing the incoming block's parent hash with the
/// stored canonical block one height below. Detection is deliberately
/// shallow: the confirmation threshold keeps credits from finalizing while
/// the scanner is near the tip, so deeper forks resolve through repeated
/// single-height rollbacks.
pub struct ReorgDetector {
    pool: Pool,
    chain_id: i32,
}

impl ReorgDetector {
    pub const fn new(pool: Pool, chain_id: i32) -> Self {
        Self { pool, chain_id }
    }

    pub async fn detect_and_handle(&self, block: &RpcBlock) -> Result<()> {
        let number = block.header.number as i64;
        let chain_id = self.chain_id;

        let parent = self
            .pool
            .interact_with_context(
                format!("load parent block {} for chain {chain_id}", number - 1),
                move |conn| Block::find_canonical_at_height(chain_id, number - 1, conn).optional(),
            )
            .await?;

        // Nothing stored below this height: first block or boot gap.
        let Some(parent) = parent else {
            return Ok(());
        };

        let incoming_parent = format!("{:#x}", block.header.parent_hash);
        if parent.hash == incoming_parent {
            return Ok(());
        }

        tracing::warn!(
            chain_id = self.chain_id,
            block_number = number,
            expected_parent = %parent.hash,
            actual_parent = %incoming_parent,
            "block reorg detected"
        );

        self.rollback_above(number - 1).await
    }

    /// Orphans every canonical block above `height`, failing its
    /// transactions and the credits attributed to its height, one SQL
    /// transaction per block so a crash mid-rollback stays consistent.
    pub async fn rollback_above(&self, height: i64) -> Result<()> {
        let chain_id = self.chain_id;

        let orphaned = self
            .pool
            .interact_with_context(
                format!("load blocks to orphan above {height} for chain {chain_id}"),
                move |conn| Block::find_canonical_above(chain_id, height, conn),
            )
            .await?;

        if orphaned.is_empty() {
            return Ok(());
        }

        tracing::info!(
            chain_id = self.chain_id,
            orphaned_count = orphaned.len(),
            rollback_height = height,
            "rolling back orphaned blocks"
        );

        for block in orphaned {
            self.rollback_block(block).await?;
        }

        Ok(())
    }

    async fn rollback_block(&self, block: Block) -> Result<()> {
        let chain_id = self.chain_id;

        tracing::info!(
            chain_id,
            block_number = block.number,
            block_hash = %block.hash,
            "rolling back block"
        );

        self.pool
            .interact_with_context(
                format!("rollback block {} for chain {chain_id}", block.number),
                move |conn| {
                    conn.transaction(|conn| {
                        Block::mark_orphaned(chain_id, &block.hash, conn)?;
                        Transaction::fail_by_block_hash(chain_id, &block.hash, conn)?;
                        Credit::fail_by_chain_and_block(chain_id, block.number, conn)?;
                        diesel::QueryResult::Ok(())
                    })
                },
            )
            .await
            .context("failed to roll back block")?;
        Ok(())
    }
}
