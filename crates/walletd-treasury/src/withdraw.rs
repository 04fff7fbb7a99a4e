use std::str::FromStr;
use std::sync::Arc;

use alloy::network::ReceiptResponse;
use alloy::primitives::{Address, B256, U256};
use anyhow::{Context, Result, anyhow, bail};
use bigdecimal::BigDecimal;
use deadpool_diesel::postgres::Pool;
use diesel::Connection;
use uuid::Uuid;

use walletd_db::WalletdPool;
use walletd_db::models::{
    Chain, Credit, CreditStatus, NewCredit, NewTransaction, NewWithdraw, Token, Transaction,
    TransactionStatus, TransactionType, Wallet, Withdraw, WithdrawStatus,
};
use walletd_indexer::{IndexerService, WithdrawStatusUpdater};
use walletd_keys::{SignRequest, Signer};
use walletd_rpc::{EvmRpcClient, transfer_calldata};

use crate::amounts::{is_positive, to_base_units, u256_to_decimal};
use crate::balance::BalanceService;
use crate::hotwallet::HotWalletService;

const NATIVE_TRANSFER_GAS_LIMIT: u64 = 21_000;
// Flat default; a production deployment estimates per token contract.
const ERC20_TRANSFER_GAS_LIMIT: u64 = 100_000;
const FEE_MULTIPLIER: u128 = 2;
const DEFAULT_CONFIRMATION_BLOCKS: i64 = 12;

#[derive(Debug, Clone)]
pub struct WithdrawRequest {
    pub to_address: String,
    pub token_id: i32,
    /// Human-readable token amount; scaled by the token's decimals.
    pub amount: BigDecimal,
}

/// Confirmation-depth mapping for broadcast withdraws.
pub fn map_withdraw_confirmations(confirmations: i64, confirmation_blocks: i64) -> WithdrawStatus {
    if confirmations >= confirmation_blocks {
        WithdrawStatus::Confirmed
    } else if confirmations > 0 {
        WithdrawStatus::Processing
    } else {
        WithdrawStatus::Pending
    }
}

/// Request -> approve -> sign+broadcast -> confirm. Rejection and every
/// failure path keep the ledger consistent through the paired frozen
/// credit rows.
pub struct WithdrawService {
    pool: Pool,
    balance_service: BalanceService,
    hot_wallet_service: HotWalletService,
    indexer: Arc<IndexerService>,
    signer: Arc<Signer>,
}

impl WithdrawService {
    pub fn new(
        pool: Pool,
        balance_service: BalanceService,
        hot_wallet_service: HotWalletService,
        indexer: Arc<IndexerService>,
        signer: Arc<Signer>,
    ) -> Self {
        Self {
            pool,
            balance_service,
            hot_wallet_service,
            indexer,
            signer,
        }
    }

    /// Validates the request, checks the available balance, and freezes the
    /// funds: the withdraw row and a negative frozen credit land in one
    /// transaction, so the freeze is atomic with the request.
    pub async fn request_withdraw(
        &self,
        user_id: &str,
        request: &WithdrawRequest,
    ) -> Result<Withdraw> {
        if !is_positive(&request.amount) {
            bail!("invalid amount");
        }

        let token = self.load_token(request.token_id).await?;
        let amount_base = to_base_units(&request.amount, token.decimals)?;
        if amount_base.is_zero() {
            bail!("invalid amount");
        }

        let available = self
            .balance_service
            .available_balance(user_id, token.chain_id, token.id)
            .await?;
        if available < u256_to_decimal(amount_base) {
            bail!("insufficient balance");
        }

        let user_id = user_id.to_string();
        let to_address = request.to_address.to_lowercase();
        let amount = request.amount.clone();

        let withdraw = self
            .pool
            .interact_with_context(format!("create withdraw for {user_id}"), move |conn| {
                conn.transaction(|conn| {
                    let user_wallet =
                        Wallet::find_by_user_and_chain(&user_id, token.chain_id, conn)?;

                    let withdraw = Withdraw::create(
                        &NewWithdraw {
                            user_id: user_id.clone(),
                            to_address,
                            token_id: token.id,
                            amount,
                            fee: BigDecimal::from(0),
                            chain_id: token.chain_id,
                            chain_type: token.chain_type.clone(),
                            status: WithdrawStatus::UserWithdrawRequest.as_str().to_string(),
                        },
                        conn,
                    )?;

                    Credit::create(
                        &NewCredit {
                            user_id,
                            address: user_wallet.address,
                            token_id: token.id,
                            token_symbol: token.token_symbol.clone(),
                            amount: -u256_to_decimal(amount_base),
                            credit_type: "withdraw".to_string(),
                            business_type: "blockchain".to_string(),
                            reference_id: withdraw.id.to_string(),
                            reference_type: "withdraw".to_string(),
                            event_index: 0,
                            chain_id: Some(token.chain_id),
                            chain_type: Some(token.chain_type.clone()),
                            status: CreditStatus::Frozen.as_str().to_string(),
                            block_number: None,
                            tx_hash: None,
                        },
                        conn,
                    )?;

                    diesel::QueryResult::Ok(withdraw)
                })
            })
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    anyhow!("wallet not found")
                } else {
                    anyhow::Error::from(e).context("failed to create withdraw request")
                }
            })?;

        tracing::info!(
            withdraw_id = %withdraw.id,
            user_id = %withdraw.user_id,
            amount = %withdraw.amount,
            "withdraw request created"
        );
        Ok(withdraw)
    }

    /// Admin approval. Only `user_withdraw_request` is admissible; a failure
    /// inside processing flips the withdraw to `failed` with the error
    /// recorded, leaving the frozen credit for a later reject to release.
    pub async fn approve_withdraw(&self, withdraw_id: Uuid) -> Result<Withdraw> {
        let withdraw = self.lock_and_load(withdraw_id).await?;
        if withdraw.status != WithdrawStatus::UserWithdrawRequest.as_str() {
            bail!(
                "withdraw status is {}, expected {}",
                withdraw.status,
                WithdrawStatus::UserWithdrawRequest.as_str()
            );
        }

        if let Err(err) = self.process_withdraw(withdraw_id).await {
            self.mark_failed(withdraw_id, &format!("{err:#}")).await;
            return Err(err.context("failed to process withdraw after approval"));
        }

        self.get_withdraw(withdraw_id).await
    }

    /// The core signing path: pick a hot wallet, price the transaction,
    /// verify funds, reserve a nonce, sign, broadcast, persist.
    pub async fn process_withdraw(&self, withdraw_id: Uuid) -> Result<()> {
        let withdraw = self.lock_and_load(withdraw_id).await?;
        if withdraw.status != WithdrawStatus::UserWithdrawRequest.as_str() {
            bail!(
                "withdraw status is {}, expected {}",
                withdraw.status,
                WithdrawStatus::UserWithdrawRequest.as_str()
            );
        }

        let hot_wallet = self.hot_wallet_service.get_hot_wallet(withdraw.chain_id).await?;
        let client = self.indexer.get_client(withdraw.chain_id).await?;
        let token = self.load_token(withdraw.token_id).await?;

        let amount_base = to_base_units(&withdraw.amount, token.decimals)?;

        let tip_cap = client.suggest_gas_tip_cap().await?;
        let latest = client.latest_block().await?;
        let base_fee = latest
            .header
            .base_fee_per_gas
            .ok_or_else(|| anyhow!("chain does not support EIP-1559 (baseFee is null)"))?;
        let max_fee = u128::from(base_fee) * FEE_MULTIPLIER + tip_cap;

        let hot_address = Address::from_str(&hot_wallet.address)
            .context("hot wallet address is not valid hex")?;
        check_hot_wallet_funds(&client, &token, hot_address, amount_base, max_fee).await?;

        let nonce = self
            .hot_wallet_service
            .next_nonce(&hot_wallet.address, withdraw.chain_id)
            .await?;

        let mut sign_request = SignRequest {
            chain_id: i64::from(withdraw.chain_id),
            to: withdraw.to_address.clone(),
            value: amount_base.to_string(),
            gas_limit: NATIVE_TRANSFER_GAS_LIMIT,
            max_fee_per_gas: max_fee.to_string(),
            max_priority_fee_per_gas: tip_cap.to_string(),
            nonce: nonce as u64,
            data: Vec::new(),
            from_address: hot_wallet.address.clone(),
            derivation_path: hot_wallet.derivation_path.clone(),
        };

        if !token.is_native {
            if token.token_address.is_empty() {
                bail!("token address is empty for non-native token");
            }
            let recipient = Address::from_str(&withdraw.to_address)
                .context("withdraw destination is not valid hex")?;

            sign_request.to = token.token_address.clone();
            sign_request.value = "0".to_string();
            sign_request.data = transfer_calldata(recipient, amount_base);
            sign_request.gas_limit = ERC20_TRANSFER_GAS_LIMIT;
        }

        let signed = self.signer.sign_transaction(&sign_request)?;
        client
            .send_raw_transaction(&signed.raw_transaction)
            .await
            .context("failed to broadcast withdraw transaction")?;

        let tx_hash = signed.tx_hash.clone();
        let from_address = hot_wallet.address.clone();
        self.pool
            .interact_with_context(format!("record broadcast for withdraw {withdraw_id}"), {
                let tx_hash = tx_hash.clone();
                move |conn| {
                    let withdraw = Withdraw::find_by_id(withdraw_id, conn)?;
                    withdraw.record_broadcast(&tx_hash, &from_address, nonce, conn)
                }
            })
            .await
            .context("broadcast succeeded but status update failed")?;

        tracing::info!(withdraw_id = %withdraw_id, tx_hash = %tx_hash, "withdraw broadcast");
        Ok(())
    }

    /// Admin rejection: allowed while the frozen credits still exist and
    /// the withdraw sits in `user_withdraw_request` or `failed`. Flips the
    /// withdraw and every frozen credit to `failed`, releasing the balance.
    pub async fn reject_withdraw(&self, withdraw_id: Uuid, reason: Option<String>) -> Result<Withdraw> {
        let reason = reason.filter(|r| !r.is_empty()).unwrap_or_else(|| "rejected by admin".to_string());

        let outcome = self
            .pool
            .interact_with_context(format!("reject withdraw {withdraw_id}"), move |conn| {
                conn.transaction(|conn| {
                    let withdraw = Withdraw::find_by_id_for_update(withdraw_id, conn)?;

                    let frozen = Credit::find_frozen_for_withdraw(&withdraw.id.to_string(), conn)?;
                    if frozen.is_empty() {
                        return diesel::QueryResult::Ok(Err(format!(
                            "withdraw has no frozen credits to reject (status: {})",
                            withdraw.status
                        )));
                    }

                    let rejectable = withdraw.status == WithdrawStatus::UserWithdrawRequest.as_str()
                        || withdraw.status == WithdrawStatus::Failed.as_str();
                    if !rejectable {
                        return Ok(Err(format!(
                            "withdraw status is {}, can only reject {} or {}",
                            withdraw.status,
                            WithdrawStatus::UserWithdrawRequest.as_str(),
                            WithdrawStatus::Failed.as_str()
                        )));
                    }

                    withdraw.set_failed(&reason, conn)?;
                    Credit::update_status_for_reference(
                        &withdraw.id.to_string(),
                        "withdraw",
                        CreditStatus::Failed,
                        conn,
                    )?;

                    Ok(Ok(Withdraw::find_by_id(withdraw_id, conn)?))
                })
            })
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    anyhow!("withdraw not found")
                } else {
                    anyhow::Error::from(e)
                }
            })?;

        let withdraw = outcome.map_err(|message| anyhow!(message))?;
        tracing::info!(withdraw_id = %withdraw_id, "withdraw rejected");
        Ok(withdraw)
    }

    /// Per chain tick: resolve each in-flight withdraw's transaction row
    /// (synthesizing it from the receipt when the scanner has not caught it
    /// yet) and advance the status by confirmation depth.
    pub async fn update_withdraw_status(&self, chain_id: i32, latest_block: i64) -> Result<()> {
        let chain = self.load_chain(chain_id).await?;
        let confirmation_blocks = if chain.confirmation_blocks > 0 {
            i64::from(chain.confirmation_blocks)
        } else {
            DEFAULT_CONFIRMATION_BLOCKS
        };

        let withdraws = self
            .pool
            .interact_with_context(format!("load in-flight withdraws for chain {chain_id}"), move |conn| {
                Withdraw::find_in_flight_for_chain(chain_id, conn)
            })
            .await?;

        if withdraws.is_empty() {
            return Ok(());
        }

        let mut updated = 0;
        for withdraw in withdraws {
            let Some(tx_hash) = withdraw.tx_hash.clone() else {
                continue;
            };

            let tx = match self
                .resolve_transaction(chain_id, &tx_hash, &withdraw, latest_block)
                .await
            {
                Ok(tx) => tx,
                Err(err) => {
                    tracing::debug!(
                        withdraw_id = %withdraw.id,
                        tx_hash = %tx_hash,
                        error = %err,
                        "withdraw transaction not resolvable yet, skipping"
                    );
                    continue;
                }
            };

            let confirmations = latest_block - tx.block_no;
            if confirmations < 0 {
                tracing::warn!(
                    withdraw_id = %withdraw.id,
                    tx_hash = %tx_hash,
                    block_no = tx.block_no,
                    latest_block,
                    "negative confirmation count, skipping"
                );
                continue;
            }

            let new_status = map_withdraw_confirmations(confirmations, confirmation_blocks);
            if withdraw.status == new_status.as_str() {
                continue;
            }

            let old_status = withdraw.status.clone();
            let result = self
                .pool
                .interact_with_context(format!("update withdraw {} status", withdraw.id), move |conn| {
                    withdraw.update_status(new_status, conn)
                })
                .await;

            match result {
                Ok(_) => {
                    updated += 1;
                    tracing::info!(
                        chain_id,
                        tx_hash = %tx_hash,
                        old_status = %old_status,
                        new_status = new_status.as_str(),
                        confirmations,
                        "withdraw status updated"
                    );
                }
                Err(err) => {
                    tracing::error!(tx_hash = %tx_hash, error = %err, "failed to update withdraw status");
                }
            }
        }

        if updated > 0 {
            tracing::info!(chain_id, updated, "withdraw statuses updated");
        }
        Ok(())
    }

    pub async fn get_withdraw(&self, withdraw_id: Uuid) -> Result<Withdraw> {
        self.pool
            .interact_with_context(format!("load withdraw {withdraw_id}"), move |conn| {
                Withdraw::find_by_id(withdraw_id, conn)
            })
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    anyhow!("withdraw not found")
                } else {
                    e.into()
                }
            })
    }

    pub async fn list_withdraws(&self, user_id: &str) -> Result<Vec<Withdraw>> {
        let user_id = user_id.to_string();
        Ok(self
            .pool
            .interact_with_context(format!("list withdraws for {user_id}"), move |conn| {
                Withdraw::find_by_user(&user_id, conn)
            })
            .await?)
    }

    /// Finds the scanner's row for `tx_hash`, or builds one from the
    /// receipt so confirmation tracking does not wait on the scanner.
    async fn resolve_transaction(
        &self,
        chain_id: i32,
        tx_hash: &str,
        withdraw: &Withdraw,
        latest_block: i64,
    ) -> Result<Transaction> {
        let lookup = {
            let tx_hash = tx_hash.to_string();
            self.pool
                .interact_with_context(format!("load transaction {tx_hash}"), move |conn| {
                    Transaction::find_by_hash(chain_id, &tx_hash, conn)
                })
                .await
        };

        match lookup {
            Ok(tx) => return Ok(tx),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }

        self.synthesize_transaction(chain_id, tx_hash, withdraw, latest_block)
            .await?;

        let tx_hash = tx_hash.to_string();
        Ok(self
            .pool
            .interact_with_context(format!("reload transaction {tx_hash}"), move |conn| {
                Transaction::find_by_hash(chain_id, &tx_hash, conn)
            })
            .await?)
    }

    async fn synthesize_transaction(
        &self,
        chain_id: i32,
        tx_hash: &str,
        withdraw: &Withdraw,
        latest_block: i64,
    ) -> Result<()> {
        let client = self.indexer.get_client(chain_id).await?;
        let hash = B256::from_str(tx_hash).context("withdraw tx hash is not valid hex")?;

        let receipt = client
            .transaction_receipt(hash)
            .await?
            .ok_or_else(|| anyhow!("transaction receipt not found (may still be pending)"))?;

        let block_hash = receipt
            .block_hash
            .ok_or_else(|| anyhow!("receipt has no block hash yet"))?;
        let block_no = receipt
            .block_number
            .ok_or_else(|| anyhow!("receipt has no block number yet"))? as i64;

        let status = if receipt.status() {
            TransactionStatus::Confirmed
        } else {
            TransactionStatus::Failed
        };

        let token = self.load_token(withdraw.token_id).await?;
        let token_addr = (!token.is_native && !token.token_address.is_empty())
            .then(|| token.token_address.to_lowercase());
        let amount = u256_to_decimal(to_base_units(&withdraw.amount, token.decimals)?);

        let new_tx = NewTransaction {
            chain_id,
            block_hash: format!("{block_hash:#x}"),
            block_no,
            tx_hash: tx_hash.to_lowercase(),
            from_addr: withdraw.from_address.clone().unwrap_or_default().to_lowercase(),
            to_addr: withdraw.to_address.to_lowercase(),
            token_addr,
            amount,
            type_: TransactionType::Withdraw.as_str().to_string(),
            status: status.as_str().to_string(),
            confirmation_count: Some(latest_block - block_no),
        };

        let result = self
            .pool
            .interact_with_context(format!("synthesize transaction {tx_hash}"), move |conn| {
                Transaction::create(&new_tx, conn)
            })
            .await;

        match result {
            Ok(_) => {
                tracing::info!(
                    withdraw_id = %withdraw.id,
                    tx_hash = %tx_hash,
                    block_no,
                    "transaction record created for withdraw"
                );
                Ok(())
            }
            // The scanner inserted it between our lookup and now.
            Err(e) if e.is_unique_violation() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn lock_and_load(&self, withdraw_id: Uuid) -> Result<Withdraw> {
        self.pool
            .interact_with_context(format!("lock withdraw {withdraw_id}"), move |conn| {
                conn.transaction(|conn| Withdraw::find_by_id_for_update(withdraw_id, conn))
            })
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    anyhow!("withdraw not found")
                } else {
                    e.into()
                }
            })
    }

    async fn mark_failed(&self, withdraw_id: Uuid, error_message: &str) {
        let error_message = error_message.to_string();
        let result = self
            .pool
            .interact_with_context(format!("mark withdraw {withdraw_id} failed"), move |conn| {
                let withdraw = Withdraw::find_by_id(withdraw_id, conn)?;
                withdraw.set_failed(&error_message, conn)
            })
            .await;

        if let Err(err) = result {
            tracing::error!(withdraw_id = %withdraw_id, error = %err, "failed to record withdraw failure");
        }
    }

    async fn load_token(&self, token_id: i32) -> Result<Token> {
        self.pool
            .interact_with_context(format!("load token {token_id}"), move |conn| {
                Token::find_by_id(token_id, conn)
            })
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    anyhow!("token not found")
                } else {
                    e.into()
                }
            })
    }

    async fn load_chain(&self, chain_id: i32) -> Result<Chain> {
        self.pool
            .interact_with_context(format!("load chain {chain_id}"), move |conn| {
                Chain::find_by_chain_id(chain_id, conn)
            })
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    anyhow!("chain not found or inactive")
                } else {
                    e.into()
                }
            })
    }
}

/// Enough native for amount + gas, or enough token plus native for gas.
async fn check_hot_wallet_funds(
    client: &EvmRpcClient,
    token: &Token,
    hot_address: Address,
    amount: U256,
    max_fee: u128,
) -> Result<()> {
    if token.is_native {
        let balance = client.balance_at(hot_address).await?;
        let gas_cost = U256::from(max_fee) * U256::from(NATIVE_TRANSFER_GAS_LIMIT);
        let required = amount + gas_cost;
        if balance < required {
            bail!(
                "insufficient balance in hot wallet: have {balance}, need {required} (amount: {amount} + gas: {gas_cost})"
            );
        }
        return Ok(());
    }

    let token_address =
        Address::from_str(&token.token_address).context("token address is not valid hex")?;
    let token_balance = client.token_balance(token_address, hot_address).await?;
    if token_balance < amount {
        bail!("insufficient ERC-20 token balance in hot wallet: have {token_balance}, need {amount}");
    }

    let native_balance = client.balance_at(hot_address).await?;
    let gas_cost = U256::from(max_fee) * U256::from(ERC20_TRANSFER_GAS_LIMIT);
    if native_balance < gas_cost {
        bail!(
            "insufficient native token balance in hot wallet for gas: have {native_balance}, need {gas_cost}"
        );
    }

    Ok(())
}

#[async_trait::async_trait]
impl WithdrawStatusUpdater for WithdrawService {
    async fn update_withdraw_status(&self, chain_id: i32, latest_block: i64) -> Result<()> {
        Self::update_withdraw_status(self, chain_id, latest_block).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_withdraw_confirmations() {
        assert_eq!(map_withdraw_confirmations(0, 12), WithdrawStatus::Pending);
        assert_eq!(map_withdraw_confirmations(1, 12), WithdrawStatus::Processing);
        assert_eq!(map_withdraw_confirmations(11, 12), WithdrawStatus::Processing);
        assert_eq!(map_withdraw_confirmations(12, 12), WithdrawStatus::Confirmed);
        assert_eq!(map_withdraw_confirmations(100, 12), WithdrawStatus::Confirmed);
    }
}
