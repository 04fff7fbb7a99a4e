use anyhow::{Context, Result};
use deadpool_diesel::postgres::Pool;
use diesel::prelude::*;

use walletd_db::WalletdPool;
use walletd_db::models::{
    Chain, Credit, CreditStatus, NewCredit, NewToken, REFERENCE_TYPE_BLOCKCHAIN_TX, Token,
    Transaction, TransactionStatus, Wallet,
};

const NATIVE_TOKEN_DECIMALS: i32 = 18;

/// Maps a confirmation depth onto the transaction state machine using the
/// chain's thresholds.
pub fn map_confirmation_status(
    confirmations: i64,
    confirmation_blocks: i64,
    finalized_blocks: i64,
) -> TransactionStatus {
    if confirmations >= finalized_blocks {
        TransactionStatus::Finalized
    } else if confirmations >= confirmation_blocks {
        TransactionStatus::Safe
    } else {
        TransactionStatus::Confirmed
    }
}

/// Transaction status fans out into the ledger with a coarser vocabulary.
pub fn credit_status_for(tx_status: TransactionStatus) -> CreditStatus {
    match tx_status {
        TransactionStatus::Confirmed | TransactionStatus::Safe => CreditStatus::Confirmed,
        TransactionStatus::Finalized => CreditStatus::Finalized,
        TransactionStatus::Failed => CreditStatus::Failed,
    }
}

/// Drives deposits through `confirmed -> safe -> finalized` and mirrors
/// every state change into the credits ledger. Runs as a post-scan hook and
/// behind the periodic backfill worker.
#[derive(Clone)]
pub struct DepositService {
    pool: Pool,
}

impl DepositService {
    pub const fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Recomputes the confirmation count of every non-terminal transaction
    /// on the chain against `latest_block`. `finalized` is terminal: the
    /// final count is written once on entry and the row is not revisited.
    pub async fn update_confirmation_status(&self, chain_id: i32, latest_block: i64) -> Result<()> {
        let updated = self
            .pool
            .interact_with_context(
                format!("update confirmation status for chain {chain_id}"),
                move |conn| update_confirmation_status_sync(chain_id, latest_block, conn),
            )
            .await
            .context("confirmation status pass failed")?;

        if updated > 0 {
            tracing::info!(chain_id, updated, "transaction statuses updated");
        }
        Ok(())
    }

    /// Credits every finalized deposit that has no ledger row yet. The
    /// unique reference index makes replays and concurrent runs no-ops.
    pub async fn process_finalized_deposits(&self, chain_id: i32) -> Result<()> {
        let created = self
            .pool
            .interact_with_context(
                format!("process finalized deposits for chain {chain_id}"),
                move |conn| process_finalized_deposits_sync(chain_id, conn),
            )
            .await
            .context("finalized deposit backfill failed")?;

        if created > 0 {
            tracing::info!(chain_id, created, "deposit credits created");
        }
        Ok(())
    }

    pub async fn pending_deposits(&self, chain_id: i32) -> Result<Vec<Transaction>> {
        Ok(self
            .pool
            .interact_with_context(
                format!("load pending deposits for chain {chain_id}"),
                move |conn| Transaction::find_awaiting_confirmation(chain_id, conn),
            )
            .await?)
    }
}

fn update_confirmation_status_sync(
    chain_id: i32,
    latest_block: i64,
    conn: &mut PgConnection,
) -> QueryResult<usize> {
    let chain = Chain::find_by_chain_id(chain_id, conn)?;
    let confirmation_blocks = chain.confirmation_blocks as i64;
    let finalized_blocks = chain.finalized_blocks as i64;

    let transactions = Transaction::find_awaiting_confirmation(chain_id, conn)?;
    let mut updated = 0;

    for tx in transactions {
        let confirmations = latest_block - tx.block_no;
        if confirmations < 0 {
            // Reorg window: the stored block is ahead of the reported tip.
            tracing::warn!(
                chain_id,
                tx_hash = %tx.tx_hash,
                block_no = tx.block_no,
                latest_block,
                "negative confirmation count, skipping"
            );
            continue;
        }

        let new_status =
            map_confirmation_status(confirmations, confirmation_blocks, finalized_blocks);

        if tx.status != new_status.as_str() {
            if let Err(err) = tx.update_status_and_count(new_status, confirmations, conn) {
                tracing::error!(tx_hash = %tx.tx_hash, error = %err, "failed to update transaction status");
                continue;
            }

            let credit_status = credit_status_for(new_status);
            if let Err(err) = Credit::update_status_for_reference(
                &tx.id.to_string(),
                REFERENCE_TYPE_BLOCKCHAIN_TX,
                credit_status,
                conn,
            ) {
                tracing::error!(tx_hash = %tx.tx_hash, error = %err, "failed to sync credit status");
            }

            tracing::debug!(
                chain_id,
                tx_hash = %tx.tx_hash,
                old_status = %tx.status,
                new_status = new_status.as_str(),
                confirmations,
                "transaction status updated"
            );
            updated += 1;
        } else if let Err(err) = tx.update_confirmation_count(confirmations, conn) {
            tracing::error!(tx_hash = %tx.tx_hash, error = %err, "failed to update confirmation count");
        }
    }

    Ok(updated)
}

fn process_finalized_deposits_sync(chain_id: i32, conn: &mut PgConnection) -> QueryResult<usize> {
    let deposits = Transaction::find_finalized_deposits(chain_id, conn)?;
    let mut created = 0;

    for tx in deposits {
        let reference_id = tx.id.to_string();
        if Credit::exists_for_reference(&reference_id, REFERENCE_TYPE_BLOCKCHAIN_TX, conn)? {
            continue;
        }

        match create_deposit_credit(&tx, conn) {
            Ok(()) => {
                created += 1;
                tracing::info!(
                    chain_id,
                    tx_hash = %tx.tx_hash,
                    "finalized deposit credited"
                );
            }
            Err(err) => {
                // Unknown token or missing wallet; the next backfill tick
                // retries once the configuration catches up.
                tracing::error!(
                    chain_id,
                    tx_hash = %tx.tx_hash,
                    error = %err,
                    "failed to credit finalized deposit"
                );
            }
        }
    }

    Ok(created)
}

fn create_deposit_credit(tx: &Transaction, conn: &mut PgConnection) -> anyhow::Result<()> {
    let wallet = Wallet::find_by_address(&tx.to_addr, tx.chain_id, conn).map_err(|e| {
        if e == diesel::result::Error::NotFound {
            anyhow::anyhow!("wallet not found for address {} on chain {}", tx.to_addr, tx.chain_id)
        } else {
            e.into()
        }
    })?;

    let token = resolve_token(tx.chain_id, tx.token_addr.as_deref(), conn)?;

    let new_credit = NewCredit {
        user_id: wallet.user_id,
        address: tx.to_addr.clone(),
        token_id: token.id,
        token_symbol: token.token_symbol,
        amount: tx.amount.clone(),
        credit_type: "deposit".to_string(),
        business_type: "blockchain".to_string(),
        reference_id: tx.id.to_string(),
        reference_type: REFERENCE_TYPE_BLOCKCHAIN_TX.to_string(),
        event_index: 0,
        chain_id: Some(tx.chain_id),
        chain_type: Some("evm".to_string()),
        status: CreditStatus::Finalized.as_str().to_string(),
        block_number: Some(tx.block_no),
        tx_hash: Some(tx.tx_hash.clone()),
    };

    match Credit::create(&new_credit, conn) {
        Ok(_) => Ok(()),
        // Lost a race against a concurrent backfill; the credit exists.
        Err(diesel::result::Error::DatabaseError(
            diesel::result::DatabaseErrorKind::UniqueViolation,
            _,
        )) => Ok(()),
        Err(err) => Err(err.into()),
    }
}

/// Native deposits resolve to the chain's native token row, created from
/// the chain config on first sight. ERC-20 deposits require the token to be
/// registered up front.
fn resolve_token(
    chain_id: i32,
    token_addr: Option<&str>,
    conn: &mut PgConnection,
) -> anyhow::Result<Token> {
    match token_addr {
        None | Some("") => match Token::find_native(chain_id, conn) {
            Ok(token) => Ok(token),
            Err(diesel::result::Error::NotFound) => {
                let chain = Chain::find_by_chain_id(chain_id, conn)?;
                let token = Token::create(
                    &NewToken {
                        chain_id,
                        chain_type: "evm".to_string(),
                        token_address: String::new(),
                        token_symbol: chain.native_token_symbol.clone(),
                        token_name: Some(chain.native_token_symbol),
                        decimals: NATIVE_TOKEN_DECIMALS,
                        is_native: true,
                        is_active: true,
                    },
                    conn,
                )?;
                Ok(token)
            }
            Err(err) => Err(err.into()),
        },
        Some(addr) => Token::find_by_address(chain_id, addr, conn).map_err(|e| {
            if e == diesel::result::Error::NotFound {
                anyhow::anyhow!("token not found: chain_id={chain_id}, token_addr={addr}")
            } else {
                e.into()
            }
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_confirmations_to_statuses() {
        // chain with confirmation_blocks=12, finalized_blocks=32
        assert_eq!(map_confirmation_status(0, 12, 32), TransactionStatus::Confirmed);
        assert_eq!(map_confirmation_status(11, 12, 32), TransactionStatus::Confirmed);
        assert_eq!(map_confirmation_status(12, 12, 32), TransactionStatus::Safe);
        assert_eq!(map_confirmation_status(31, 12, 32), TransactionStatus::Safe);
        assert_eq!(map_confirmation_status(32, 12, 32), TransactionStatus::Finalized);
        assert_eq!(map_confirmation_status(500, 12, 32), TransactionStatus::Finalized);
    }

    #[test]
    fn deposit_at_block_100_follows_the_expected_path() {
        // A deposit mined at block 100: safe at latest=112, finalized at 132.
        let block_no = 100;
        assert_eq!(map_confirmation_status(112 - block_no, 12, 32), TransactionStatus::Safe);
        assert_eq!(
            map_confirmation_status(132 - block_no, 12, 32),
            TransactionStatus::Finalized
        );
    }

    #[test]
    fn credit_status_follows_transaction_status() {
        assert_eq!(credit_status_for(TransactionStatus::Confirmed), CreditStatus::Confirmed);
        assert_eq!(credit_status_for(TransactionStatus::Safe), CreditStatus::Confirmed);
        assert_eq!(credit_status_for(TransactionStatus::Finalized), CreditStatus::Finalized);
        assert_eq!(credit_status_for(TransactionStatus::Failed), CreditStatus::Failed);
    }
}
