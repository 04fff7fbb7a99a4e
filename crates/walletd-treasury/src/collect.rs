use std::collections::HashSet;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::network::ReceiptResponse;
use alloy::primitives::{Address, U256};
use anyhow::{Context, Result, anyhow, bail};
use bigdecimal::BigDecimal;
use deadpool_diesel::postgres::Pool;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use walletd_db::WalletdPool;
use walletd_db::models::{
    NewTransaction, Token, Transaction, TransactionStatus, TransactionType, Wallet, WalletType,
};
use walletd_indexer::IndexerService;
use walletd_keys::{SignRequest, Signer};
use walletd_rpc::{EvmRpcClient, transfer_calldata};

use crate::amounts::{to_base_units, u256_to_decimal};
use crate::hotwallet::HotWalletService;

const NATIVE_GAS_LIMIT: u64 = 21_000;
const ERC20_GAS_LIMIT: u64 = 120_000;
const FEE_MULTIPLIER: u128 = 2;

// 0.005 native: below this a sweep is not worth its gas.
const MIN_NATIVE_COLLECT_WEI: u64 = 5_000_000_000_000_000;
// 0.0001 native kept as a floor after fees.
const MIN_BALANCE_GAS_BUFFER_WEI: u64 = 100_000_000_000_000;
// 0.00005 native sent on top of the exact shortfall when topping up gas.
const TOP_UP_BUFFER_WEI: u64 = 50_000_000_000_000;

/// Default minimum for ERC-20 sweeps when the token has no configured
/// `min_withdraw_amount`: one whole token.
fn default_min_erc20_collect(decimals: i32) -> U256 {
    to_base_units(&BigDecimal::from(1), decimals).unwrap_or(U256::from(1u64))
}

#[derive(Debug, Clone, Copy)]
struct FeeQuote {
    tip_cap: u128,
    max_fee: u128,
}

/// Sweeps user wallets (ERC-20 first, then native) into the chain's hot
/// wallet. Periodic and manually triggerable; a per-wallet guard keeps two
/// sweeps of the same wallet from racing.
pub struct CollectService {
    pool: Pool,
    indexer: Arc<IndexerService>,
    hot_wallet_service: HotWalletService,
    signer: Arc<Signer>,
    collecting: Mutex<HashSet<Uuid>>,
}

impl CollectService {
    pub fn new(
        pool: Pool,
        indexer: Arc<IndexerService>,
        hot_wallet_service: HotWalletService,
        signer: Arc<Signer>,
    ) -> Self {
        Self {
            pool,
            indexer,
            hot_wallet_service,
            signer,
            collecting: Mutex::new(HashSet::new()),
        }
    }

    /// Periodic sweep over every active chain. Runs once immediately, then
    /// on the interval until `shutdown` fires.
    pub async fn run_forever(&self, interval: Duration, shutdown: CancellationToken) {
        tracing::info!(interval_secs = interval.as_secs(), "auto collect started");

        let mut ticker = tokio::time::interval(interval);

        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    tracing::info!("auto collect stopped");
                    return;
                }
                _ = ticker.tick() => {}
            }

            self.run_cycle(&shutdown).await;
        }
    }

    async fn run_cycle(&self, shutdown: &CancellationToken) {
        let chains = match self.indexer.active_chains().await {
            Ok(chains) => chains,
            Err(err) => {
                tracing::error!(error = %err, "collect failed to load active chains");
                return;
            }
        };

        for chain in chains {
            if shutdown.is_cancelled() {
                return;
            }
            if let Err(err) = self.collect_for_chain(chain.chain_id, shutdown).await {
                tracing::error!(chain_id = chain.chain_id, error = %err, "collect cycle failed");
            }
        }
    }

    /// One collection pass over every user wallet on the chain. Failures on
    /// one wallet never abort the others.
    pub async fn collect_for_chain(&self, chain_id: i32, cancel: &CancellationToken) -> Result<()> {
        let wallets = self
            .pool
            .interact_with_context(format!("load user wallets for chain {chain_id}"), move |conn| {
                Wallet::find_by_type(chain_id, WalletType::User, conn)
            })
            .await?;
        if wallets.is_empty() {
            return Ok(());
        }

        let tokens = self
            .pool
            .interact_with_context(format!("load active tokens for chain {chain_id}"), move |conn| {
                Token::find_active_for_chain(chain_id, conn)
            })
            .await?;

        let hot_wallet = self.hot_wallet_service.get_hot_wallet(chain_id).await?;

        for wallet in wallets {
            if cancel.is_cancelled() {
                return Ok(());
            }

            if let Err(err) = self
                .collect_wallet_erc20(&wallet, &hot_wallet, &tokens, cancel)
                .await
            {
                tracing::error!(
                    wallet_id = %wallet.id,
                    address = %wallet.address,
                    chain_id,
                    error = %err,
                    "ERC-20 collection failed for wallet"
                );
            }

            if let Err(err) = self.collect_wallet_native(&wallet, &hot_wallet, cancel).await {
                tracing::error!(
                    wallet_id = %wallet.id,
                    address = %wallet.address,
                    chain_id,
                    error = %err,
                    "native collection failed for wallet"
                );
            }
        }

        Ok(())
    }

    /// Manual per-wallet trigger.
    pub async fn collect_wallet(&self, wallet_id: Uuid, cancel: &CancellationToken) -> Result<()> {
        let wallet = self
            .pool
            .interact_with_context(format!("load wallet {wallet_id}"), move |conn| {
                Wallet::find_by_id(wallet_id, conn)
            })
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    anyhow!("wallet not found")
                } else {
                    e.into()
                }
            })?;

        if wallet.wallet_type != WalletType::User.as_str() {
            bail!("only user wallets support collection");
        }

        let hot_wallet = self.hot_wallet_service.get_hot_wallet(wallet.chain_id).await?;
        self.collect_wallet_native(&wallet, &hot_wallet, cancel).await
    }

    pub async fn list_collects(&self, chain_id: Option<i32>) -> Result<Vec<Transaction>> {
        Ok(self
            .pool
            .interact_with_context("list collect transactions".to_string(), move |conn| {
                Transaction::find_by_type(TransactionType::Collect, chain_id, conn)
            })
            .await?)
    }

    async fn collect_wallet_native(
        &self,
        wallet: &Wallet,
        hot_wallet: &Wallet,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let Some(_guard) = self.try_lock_wallet(wallet.id) else {
            tracing::debug!(wallet_id = %wallet.id, "wallet is already collecting, skipping");
            return Ok(());
        };

        let client = self.indexer.get_client(wallet.chain_id).await?;
        let from = parse_address(&wallet.address)?;

        let balance = client.balance_at(from).await?;
        if balance < U256::from(MIN_NATIVE_COLLECT_WEI) {
            return Ok(());
        }

        let fees = quote_fees(&client).await?;
        let gas_fee = U256::from(fees.max_fee) * U256::from(NATIVE_GAS_LIMIT);
        if balance <= gas_fee {
            tracing::debug!(
                wallet_id = %wallet.id,
                balance = %balance,
                gas_fee = %gas_fee,
                "balance does not cover gas, skipping sweep"
            );
            return Ok(());
        }

        let transfer = balance - gas_fee;
        if transfer < U256::from(MIN_NATIVE_COLLECT_WEI)
            || transfer <= U256::from(MIN_BALANCE_GAS_BUFFER_WEI)
        {
            return Ok(());
        }

        // User wallets are not nonce-managed; ask the node.
        let nonce = client.pending_nonce_at(from).await?;

        let signed = self.signer.sign_transaction(&SignRequest {
            chain_id: i64::from(wallet.chain_id),
            to: hot_wallet.address.clone(),
            value: transfer.to_string(),
            gas_limit: NATIVE_GAS_LIMIT,
            max_fee_per_gas: fees.max_fee.to_string(),
            max_priority_fee_per_gas: fees.tip_cap.to_string(),
            nonce,
            data: Vec::new(),
            from_address: wallet.address.clone(),
            derivation_path: wallet.derivation_path.clone(),
        })?;

        let tx_hash = client.send_raw_transaction(&signed.raw_transaction).await?;
        let receipt = client.wait_for_receipt(tx_hash, cancel).await?;

        self.record_collect(wallet, hot_wallet, transfer, &receipt, None).await?;

        tracing::info!(
            wallet_id = %wallet.id,
            from = %wallet.address,
            to = %hot_wallet.address,
            tx_hash = %signed.tx_hash,
            amount_wei = %transfer,
            "native funds collected into hot wallet"
        );
        Ok(())
    }

    async fn collect_wallet_erc20(
        &self,
        wallet: &Wallet,
        hot_wallet: &Wallet,
        tokens: &[Token],
        cancel: &CancellationToken,
    ) -> Result<()> {
        let sweepable: Vec<&Token> = tokens
            .iter()
            .filter(|t| !t.is_native && !t.token_address.is_empty())
            .collect();
        if sweepable.is_empty() {
            return Ok(());
        }

        let client = self.indexer.get_client(wallet.chain_id).await?;
        let from = parse_address(&wallet.address)?;
        let to = parse_address(&hot_wallet.address)?;

        let mut native_balance = client.balance_at(from).await?;
        let fees = quote_fees(&client).await?;
        let gas_fee = U256::from(fees.max_fee) * U256::from(ERC20_GAS_LIMIT);

        for token in sweepable {
            if cancel.is_cancelled() {
                return Ok(());
            }

            let token_address = parse_address(&token.token_address)?;
            let token_balance = match client.token_balance(token_address, from).await {
                Ok(balance) => balance,
                Err(err) => {
                    tracing::warn!(
                        wallet_id = %wallet.id,
                        token_address = %token.token_address,
                        error = %err,
                        "failed to query ERC-20 balance"
                    );
                    continue;
                }
            };

            if token_balance.is_zero() || token_balance < min_collect_amount(token) {
                continue;
            }

            if native_balance <= gas_fee {
                let required = gas_fee + U256::from(MIN_BALANCE_GAS_BUFFER_WEI);
                match self
                    .top_up_native_gas(wallet, hot_wallet, &client, native_balance, required, cancel)
                    .await
                {
                    Ok(updated) => native_balance = updated,
                    Err(err) => {
                        tracing::warn!(
                            wallet_id = %wallet.id,
                            token_address = %token.token_address,
                            error = %err,
                            "failed to top up native gas for ERC-20 sweep"
                        );
                        continue;
                    }
                }
            }

            let nonce = match client.pending_nonce_at(from).await {
                Ok(nonce) => nonce,
                Err(err) => {
                    tracing::warn!(wallet_id = %wallet.id, error = %err, "failed to fetch nonce for sweep");
                    continue;
                }
            };

            let signed = match self.signer.sign_transaction(&SignRequest {
                chain_id: i64::from(wallet.chain_id),
                to: token.token_address.clone(),
                value: "0".to_string(),
                gas_limit: ERC20_GAS_LIMIT,
                max_fee_per_gas: fees.max_fee.to_string(),
                max_priority_fee_per_gas: fees.tip_cap.to_string(),
                nonce,
                data: transfer_calldata(to, token_balance),
                from_address: wallet.address.clone(),
                derivation_path: wallet.derivation_path.clone(),
            }) {
                Ok(signed) => signed,
                Err(err) => {
                    tracing::warn!(wallet_id = %wallet.id, error = %err, "failed to sign ERC-20 sweep");
                    continue;
                }
            };

            let tx_hash = match client.send_raw_transaction(&signed.raw_transaction).await {
                Ok(hash) => hash,
                Err(err) => {
                    tracing::warn!(wallet_id = %wallet.id, error = %err, "failed to broadcast ERC-20 sweep");
                    continue;
                }
            };

            let receipt = match client.wait_for_receipt(tx_hash, cancel).await {
                Ok(receipt) => receipt,
                Err(err) => {
                    tracing::warn!(wallet_id = %wallet.id, error = %err, "failed waiting for sweep receipt");
                    continue;
                }
            };

            if let Err(err) = self
                .record_collect(
                    wallet,
                    hot_wallet,
                    token_balance,
                    &receipt,
                    Some(token.token_address.to_lowercase()),
                )
                .await
            {
                tracing::error!(wallet_id = %wallet.id, error = %err, "failed to record ERC-20 sweep");
                continue;
            }

            native_balance = native_balance.saturating_sub(gas_fee);
            tracing::info!(
                wallet_id = %wallet.id,
                token_address = %token.token_address,
                amount = %token_balance,
                tx_hash = %signed.tx_hash,
                "ERC-20 funds collected into hot wallet"
            );
        }

        Ok(())
    }

    /// Sends the gas shortfall (plus a small buffer) from the hot wallet to
    /// the user wallet so the ERC-20 sweep can pay for itself.
    async fn top_up_native_gas(
        &self,
        wallet: &Wallet,
        hot_wallet: &Wallet,
        client: &EvmRpcClient,
        current_balance: U256,
        required_balance: U256,
        cancel: &CancellationToken,
    ) -> Result<U256> {
        if current_balance >= required_balance {
            return Ok(current_balance);
        }

        let shortfall = required_balance - current_balance + U256::from(TOP_UP_BUFFER_WEI);
        let hot_address = parse_address(&hot_wallet.address)?;

        let hot_balance = client.balance_at(hot_address).await?;
        let fees = quote_fees(client).await?;
        let gas_fee = U256::from(fees.max_fee) * U256::from(NATIVE_GAS_LIMIT);

        if hot_balance <= shortfall + gas_fee {
            bail!("hot wallet does not have enough native balance for top-up");
        }

        let nonce = client.pending_nonce_at(hot_address).await?;

        let signed = self.signer.sign_transaction(&SignRequest {
            chain_id: i64::from(wallet.chain_id),
            to: wallet.address.clone(),
            value: shortfall.to_string(),
            gas_limit: NATIVE_GAS_LIMIT,
            max_fee_per_gas: fees.max_fee.to_string(),
            max_priority_fee_per_gas: fees.tip_cap.to_string(),
            nonce,
            data: Vec::new(),
            from_address: hot_wallet.address.clone(),
            derivation_path: hot_wallet.derivation_path.clone(),
        })?;

        let tx_hash = client.send_raw_transaction(&signed.raw_transaction).await?;
        let receipt = client.wait_for_receipt(tx_hash, cancel).await?;
        if !receipt.status() {
            bail!("native top-up transaction reverted");
        }

        tracing::info!(
            wallet_id = %wallet.id,
            hot_wallet_id = %hot_wallet.id,
            tx_hash = %signed.tx_hash,
            topup_amount = %shortfall,
            "topped up native gas for ERC-20 sweep"
        );
        Ok(current_balance + shortfall)
    }

    async fn record_collect(
        &self,
        from_wallet: &Wallet,
        to_wallet: &Wallet,
        amount: U256,
        receipt: &alloy::rpc::types::TransactionReceipt,
        token_address: Option<String>,
    ) -> Result<()> {
        let status = if receipt.status() {
            TransactionStatus::Confirmed
        } else {
            TransactionStatus::Failed
        };

        let new_tx = NewTransaction {
            chain_id: from_wallet.chain_id,
            block_hash: receipt
                .block_hash
                .map(|h| format!("{h:#x}"))
                .unwrap_or_default(),
            block_no: receipt.block_number.unwrap_or_default() as i64,
            tx_hash: format!("{:#x}", receipt.transaction_hash).to_lowercase(),
            from_addr: from_wallet.address.to_lowercase(),
            to_addr: to_wallet.address.to_lowercase(),
            token_addr: token_address,
            amount: u256_to_decimal(amount),
            type_: TransactionType::Collect.as_str().to_string(),
            status: status.as_str().to_string(),
            confirmation_count: Some(0),
        };

        self.pool
            .interact_with_context(format!("record collect {}", new_tx.tx_hash), move |conn| {
                Transaction::create(&new_tx, conn)
            })
            .await
            .context("failed to insert collect transaction")?;
        Ok(())
    }

    fn try_lock_wallet(&self, wallet_id: Uuid) -> Option<WalletGuard<'_>> {
        let mut collecting = self.collecting.lock().expect("collect lock poisoned");
        collecting.insert(wallet_id).then(|| WalletGuard {
            service: self,
            wallet_id,
        })
    }
}

struct WalletGuard<'a> {
    service: &'a CollectService,
    wallet_id: Uuid,
}

impl Drop for WalletGuard<'_> {
    fn drop(&mut self) {
        self.service
            .collecting
            .lock()
            .expect("collect lock poisoned")
            .remove(&self.wallet_id);
    }
}

async fn quote_fees(client: &EvmRpcClient) -> Result<FeeQuote> {
    let tip_cap = client.suggest_gas_tip_cap().await?;
    let latest = client.latest_block().await?;
    // Pre-London chains quote no base fee; sweeps still work with tip only.
    let base_fee = latest.header.base_fee_per_gas.unwrap_or_default();
    Ok(FeeQuote {
        tip_cap,
        max_fee: u128::from(base_fee) * FEE_MULTIPLIER + tip_cap,
    })
}

fn min_collect_amount(token: &Token) -> U256 {
    if let Some(min) = &token.min_withdraw_amount {
        if let Ok(amount) = to_base_units(min, token.decimals) {
            if !amount.is_zero() {
                return amount;
            }
        }
    }
    default_min_erc20_collect(token.decimals)
}

fn parse_address(raw: &str) -> Result<Address> {
    Address::from_str(raw).with_context(|| format!("invalid address: {raw}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn token(min_withdraw: Option<&str>, decimals: i32) -> Token {
        Token {
            id: 1,
            chain_id: 1,
            chain_type: "evm".to_string(),
            token_address: "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa".to_string(),
            token_symbol: "TST".to_string(),
            token_name: None,
            decimals,
            is_native: false,
            min_withdraw_amount: min_withdraw.map(|m| m.parse().unwrap()),
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn min_collect_defaults_to_one_token() {
        assert_eq!(min_collect_amount(&token(None, 6)), U256::from(1_000_000u64));
    }

    #[test]
    fn min_collect_uses_configured_threshold() {
        assert_eq!(
            min_collect_amount(&token(Some("2.5"), 6)),
            U256::from(2_500_000u64)
        );
    }

    #[test]
    fn zero_threshold_falls_back_to_default() {
        assert_eq!(min_collect_amount(&token(Some("0"), 6)), U256::from(1_000_000u64));
    }
}
