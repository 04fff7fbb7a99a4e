use std::str::FromStr;

use alloy::consensus::{Transaction as _, TxReceipt};
use alloy::network::{ReceiptResponse, TransactionResponse};
use alloy::primitives::{Address, B256, U256};
use alloy::rpc::types::{Log, Transaction as RpcTransaction, TransactionReceipt};
use anyhow::{Context, Result};
use bigdecimal::BigDecimal;
use deadpool_diesel::postgres::Pool;

use walletd_db::WalletdPool;
use walletd_db::models::{NewTransaction, Transaction, TransactionStatus, TransactionType, Wallet};
use walletd_rpc::TRANSFER_EVENT_TOPIC;

const MIN_TRANSFER_TOPICS: usize = 3;

/// Turns raw transactions and receipts into `transactions` rows for
/// transfers that land on tracked addresses. Only successful receipts are
/// considered; a failed transfer never yields a deposit.
pub struct Analyzer {
    pool: Pool,
}

impl Analyzer {
    pub const fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub async fn analyze_transaction(
        &self,
        chain_id: i32,
        tx: &RpcTransaction,
        receipt: &TransactionReceipt,
        block_number: i64,
        block_hash: B256,
    ) -> Result<()> {
        if !receipt.status() {
            return Ok(());
        }

        self.analyze_native_transfer(chain_id, tx, block_number, block_hash)
            .await
            .context("failed to analyze native transfer")?;

        self.analyze_erc20_transfers(chain_id, tx, receipt, block_number, block_hash)
            .await
            .context("failed to analyze ERC-20 transfers")?;

        Ok(())
    }

    async fn analyze_native_transfer(
        &self,
        chain_id: i32,
        tx: &RpcTransaction,
        block_number: i64,
        block_hash: B256,
    ) -> Result<()> {
        // Contract creations have no recipient.
        let Some(to) = tx.to() else {
            return Ok(());
        };

        let to_addr = format!("{to:#x}").to_lowercase();
        if !self.is_tracked_address(chain_id, &to_addr).await? {
            return Ok(());
        }

        let tx_hash = format!("{:#x}", tx.tx_hash()).to_lowercase();
        if self.transaction_exists(chain_id, &tx_hash).await? {
            return Ok(());
        }

        let from_addr = format!("{:#x}", tx.from()).to_lowercase();
        let amount = u256_to_decimal(tx.value())?;

        tracing::info!(
            chain_id,
            tx_hash = %tx_hash,
            to_addr = %to_addr,
            amount = %amount,
            "native deposit detected"
        );

        self.insert_deposit(NewTransaction {
            chain_id,
            block_hash: format!("{block_hash:#x}"),
            block_no: block_number,
            tx_hash,
            from_addr,
            to_addr,
            token_addr: None,
            amount,
            type_: TransactionType::Deposit.as_str().to_string(),
            status: TransactionStatus::Confirmed.as_str().to_string(),
            confirmation_count: None,
        })
        .await
    }

    async fn analyze_erc20_transfers(
        &self,
        chain_id: i32,
        tx: &RpcTransaction,
        receipt: &TransactionReceipt,
        block_number: i64,
        block_hash: B256,
    ) -> Result<()> {
        for log in receipt.inner.logs() {
            let Some((from, to, amount)) = decode_transfer_log(log) else {
                continue;
            };

            let to_addr = format!("{to:#x}").to_lowercase();
            if !self.is_tracked_address(chain_id, &to_addr).await? {
                continue;
            }

            let tx_hash = format!("{:#x}", tx.tx_hash()).to_lowercase();
            if self.transaction_exists(chain_id, &tx_hash).await? {
                // Deduped on tx hash alone: a second Transfer log in the
                // same transaction is collapsed into the first row.
                continue;
            }

            let token_addr = format!("{:#x}", log.address()).to_lowercase();
            let amount = u256_to_decimal(amount)?;

            tracing::info!(
                chain_id,
                tx_hash = %tx_hash,
                to_addr = %to_addr,
                token_addr = %token_addr,
                amount = %amount,
                "ERC-20 deposit detected"
            );

            self.insert_deposit(NewTransaction {
                chain_id,
                block_hash: format!("{block_hash:#x}"),
                block_no: block_number,
                tx_hash,
                from_addr: format!("{from:#x}").to_lowercase(),
                to_addr,
                token_addr: Some(token_addr),
                amount,
                type_: TransactionType::Deposit.as_str().to_string(),
                status: TransactionStatus::Confirmed.as_str().to_string(),
                confirmation_count: None,
            })
            .await?;
        }

        Ok(())
    }

    async fn insert_deposit(&self, new_tx: NewTransaction) -> Result<()> {
        let result = self
            .pool
            .interact_with_context(format!("insert deposit {}", new_tx.tx_hash), move |conn| {
                Transaction::create(&new_tx, conn)
            })
            .await;

        match result {
            Ok(_) => Ok(()),
            // A concurrent scan of the same block won the race; the row is
            // there, which is all that matters.
            Err(err) if err.is_unique_violation() => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    async fn is_tracked_address(&self, chain_id: i32, address: &str) -> Result<bool> {
        let address = address.to_string();
        Ok(self
            .pool
            .interact_with_context(format!("tracked address lookup on chain {chain_id}"), move |conn| {
                Wallet::is_tracked_address(&address, chain_id, conn)
            })
            .await?)
    }

    async fn transaction_exists(&self, chain_id: i32, tx_hash: &str) -> Result<bool> {
        let tx_hash = tx_hash.to_string();
        Ok(self
            .pool
            .interact_with_context(format!("transaction existence on chain {chain_id}"), move |conn| {
                Transaction::exists_by_hash(chain_id, &tx_hash, conn)
            })
            .await?)
    }
}

/// Decodes an ERC-20 `Transfer(address indexed from, address indexed to,
/// uint256 value)` log. Returns `None` for anything else.
pub fn decode_transfer_log(log: &Log) -> Option<(Address, Address, U256)> {
    let topics = log.topics();
    if topics.len() < MIN_TRANSFER_TOPICS || topics[0] != TRANSFER_EVENT_TOPIC {
        return None;
    }

    let from = Address::from_slice(&topics[1][12..]);
    let to = Address::from_slice(&topics[2][12..]);
    let amount = U256::from_be_slice(&log.data().data);
    Some((from, to, amount))
}

pub(crate) fn u256_to_decimal(value: U256) -> Result<BigDecimal> {
    BigDecimal::from_str(&value.to_string()).context("u256 is not a valid decimal")
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Bytes, LogData, address, b256, keccak256};

    fn topic_for(address: Address) -> B256 {
        let mut word = [0u8; 32];
        word[12..].copy_from_slice(address.as_slice());
        B256::from(word)
    }

    fn transfer_log(from: Address, to: Address, amount: U256) -> Log {
        Log {
            inner: alloy::primitives::Log {
                address: address!("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"),
                data: LogData::new_unchecked(
                    vec![TRANSFER_EVENT_TOPIC, topic_for(from), topic_for(to)],
                    Bytes::from(amount.to_be_bytes::<32>().to_vec()),
                ),
            },
            ..Default::default()
        }
    }

    #[test]
    fn decodes_a_transfer_log() {
        let from = address!("1111111111111111111111111111111111111111");
        let to = address!("2222222222222222222222222222222222222222");
        let amount = U256::from(12_345u64);

        let (got_from, got_to, got_amount) = decode_transfer_log(&transfer_log(from, to, amount)).unwrap();
        assert_eq!(got_from, from);
        assert_eq!(got_to, to);
        assert_eq!(got_amount, amount);
    }

    #[test]
    fn ignores_logs_with_other_signatures() {
        let mut log = transfer_log(
            address!("1111111111111111111111111111111111111111"),
            address!("2222222222222222222222222222222222222222"),
            U256::from(1u64),
        );
        log.inner.data = LogData::new_unchecked(
            vec![
                keccak256(b"Approval(address,address,uint256)"),
                b256!("0000000000000000000000001111111111111111111111111111111111111111"),
                b256!("0000000000000000000000002222222222222222222222222222222222222222"),
            ],
            Bytes::new(),
        );
        assert!(decode_transfer_log(&log).is_none());
    }

    #[test]
    fn ignores_logs_with_too_few_topics() {
        let mut log = transfer_log(
            address!("1111111111111111111111111111111111111111"),
            address!("2222222222222222222222222222222222222222"),
            U256::from(1u64),
        );
        log.inner.data = LogData::new_unchecked(vec![TRANSFER_EVENT_TOPIC], Bytes::new());
        assert!(decode_transfer_log(&log).is_none());
    }

    #[test]
    fn converts_full_range_u256_amounts() {
        let max = U256::MAX;
        let decimal = u256_to_decimal(max).unwrap();
        assert_eq!(decimal.to_string(), max.to_string());
    }
}
