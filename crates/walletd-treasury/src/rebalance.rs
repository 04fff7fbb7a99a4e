use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use alloy::network::ReceiptResponse;
use alloy::primitives::{Address, U256};
use anyhow::{Context, Result, anyhow, bail};
use deadpool_diesel::postgres::Pool;
use tokio_util::sync::CancellationToken;

use walletd_db::WalletdPool;
use walletd_db::models::{
    NewTransaction, Transaction, TransactionStatus, TransactionType, Wallet, WalletType,
};
use walletd_indexer::IndexerService;
use walletd_keys::{SignRequest, Signer};
use walletd_rpc::EvmRpcClient;

use crate::amounts::u256_to_decimal;
use crate::hotwallet::HotWalletService;

const NATIVE_GAS_LIMIT: u64 = 21_000;
const FEE_MULTIPLIER: u128 = 2;
const MIN_HOT_WALLETS: usize = 2;

const WEI_PER_NATIVE: u128 = 1_000_000_000_000_000_000;
// Hot wallets below 3 native receive, above 8 native donate.
const MIN_BALANCE_WEI: u128 = 3 * WEI_PER_NATIVE;
const MAX_BALANCE_WEI: u128 = 8 * WEI_PER_NATIVE;
// 0.0002 native held back per transfer for fees.
const GAS_BUFFER_WEI: u128 = 200_000_000_000_000;

#[derive(Debug, Clone)]
pub struct RebalanceRequest {
    pub chain_id: i32,
    pub from_address: String,
    pub to_address: String,
    /// Base units (wei).
    pub amount: U256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedTransfer {
    pub from: usize,
    pub to: usize,
    pub amount: U256,
}

/// Greedy donor/receiver matching over hot-wallet balances.
///
/// Donors (balance > `max`) are drained largest-first down to `max` plus
/// the gas buffer; receivers (balance < `min`) are filled smallest-first up
/// to `min`. Transfers below the gas buffer are not worth their fee and are
/// skipped.
pub fn plan_transfers(
    balances: &[U256],
    min: U256,
    max: U256,
    gas_buffer: U256,
) -> Vec<PlannedTransfer> {
    let mut donors: Vec<(usize, U256)> = balances
        .iter()
        .enumerate()
        .filter(|(_, b)| **b > max)
        .map(|(i, b)| (i, *b))
        .collect();
    let mut receivers: Vec<(usize, U256)> = balances
        .iter()
        .enumerate()
        .filter(|(_, b)| **b < min)
        .map(|(i, b)| (i, *b))
        .collect();

    if donors.is_empty() || receivers.is_empty() {
        return Vec::new();
    }

    donors.sort_by(|a, b| b.1.cmp(&a.1));
    receivers.sort_by(|a, b| a.1.cmp(&b.1));

    let mut transfers = Vec::new();

    for receiver in &mut receivers {
        let mut needed = min - receiver.1;

        for donor in &mut donors {
            if needed.is_zero() {
                break;
            }

            let floor = max + gas_buffer;
            if donor.1 <= floor {
                continue;
            }

            let available = donor.1 - floor;
            let amount = available.min(needed);
            if amount < gas_buffer {
                continue;
            }

            transfers.push(PlannedTransfer {
                from: donor.0,
                to: receiver.0,
                amount,
            });
            donor.1 -= amount;
            receiver.1 += amount;
            needed -= amount;
        }
    }

    transfers
}

/// Keeps native balance spread across hot wallets inside the configured
/// band. Planning is pure; execution is strictly sequential per chain.
pub struct RebalanceService {
    pool: Pool,
    indexer: Arc<IndexerService>,
    hot_wallet_service: HotWalletService,
    signer: Arc<Signer>,
}

impl RebalanceService {
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
        }
    }

    pub async fn run_forever(&self, interval: Duration, shutdown: CancellationToken) {
        tracing::info!(interval_secs = interval.as_secs(), "auto rebalance started");

        let mut ticker = tokio::time::interval(interval);

        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    tracing::info!("auto rebalance stopped");
                    return;
                }
                _ = ticker.tick() => {}
            }

            let chains = match self.indexer.active_chains().await {
                Ok(chains) => chains,
                Err(err) => {
                    tracing::error!(error = %err, "rebalance failed to load active chains");
                    continue;
                }
            };

            for chain in chains {
                if shutdown.is_cancelled() {
                    return;
                }
                if let Err(err) = self.rebalance_for_chain(chain.chain_id, &shutdown).await {
                    tracing::error!(chain_id = chain.chain_id, error = %err, "chain rebalance failed");
                }
            }
        }
    }

    pub async fn rebalance_for_chain(&self, chain_id: i32, cancel: &CancellationToken) -> Result<()> {
        let wallets = self
            .pool
            .interact_with_context(format!("load hot wallets for chain {chain_id}"), move |conn| {
                Wallet::find_by_type(chain_id, WalletType::Hot, conn)
            })
            .await?;

        if wallets.len() < MIN_HOT_WALLETS {
            return Ok(());
        }

        let client = self.indexer.get_client(chain_id).await?;

        let mut balances = Vec::with_capacity(wallets.len());
        for wallet in &wallets {
            let address = Address::from_str(&wallet.address)
                .with_context(|| format!("invalid hot wallet address {}", wallet.address))?;
            match client.balance_at(address).await {
                Ok(balance) => balances.push(balance),
                Err(err) => {
                    tracing::error!(
                        address = %wallet.address,
                        chain_id,
                        error = %err,
                        "failed to fetch hot wallet balance"
                    );
                    balances.push(U256::ZERO);
                }
            }
        }

        let plan = plan_transfers(
            &balances,
            U256::from(MIN_BALANCE_WEI),
            U256::from(MAX_BALANCE_WEI),
            U256::from(GAS_BUFFER_WEI),
        );

        for transfer in plan {
            if cancel.is_cancelled() {
                return Ok(());
            }
            if let Err(err) = self
                .transfer_between_hot_wallets(
                    &wallets[transfer.from],
                    &wallets[transfer.to],
                    transfer.amount,
                    cancel,
                )
                .await
            {
                tracing::error!(
                    from = %wallets[transfer.from].address,
                    to = %wallets[transfer.to].address,
                    chain_id,
                    error = %err,
                    "rebalance transfer failed"
                );
            }
        }

        Ok(())
    }

    /// Manual transfer between two named hot wallets.
    pub async fn rebalance(&self, request: &RebalanceRequest, cancel: &CancellationToken) -> Result<()> {
        if request.amount.is_zero() {
            bail!("invalid amount");
        }

        let from_wallet = self
            .load_hot_wallet(&request.from_address, request.chain_id)
            .await?;
        let to_wallet = self
            .load_hot_wallet(&request.to_address, request.chain_id)
            .await?;

        self.transfer_between_hot_wallets(&from_wallet, &to_wallet, request.amount, cancel)
            .await
    }

    async fn load_hot_wallet(&self, address: &str, chain_id: i32) -> Result<Wallet> {
        let address = address.to_string();
        self.pool
            .interact_with_context(format!("load hot wallet on chain {chain_id}"), move |conn| {
                Wallet::find_hot_by_address(&address, chain_id, conn)
            })
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    anyhow!("wallet not found")
                } else {
                    e.into()
                }
            })
    }

    async fn transfer_between_hot_wallets(
        &self,
        from_wallet: &Wallet,
        to_wallet: &Wallet,
        amount: U256,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let client = self.indexer.get_client(from_wallet.chain_id).await?;
        let from = Address::from_str(&from_wallet.address).context("invalid source address")?;

        let balance = client.balance_at(from).await?;
        if amount + U256::from(GAS_BUFFER_WEI) > balance {
            bail!("insufficient balance on source hot wallet");
        }

        let (tip_cap, max_fee) = self.quote_fees(&client).await?;
        let gas_fee = U256::from(max_fee) * U256::from(NATIVE_GAS_LIMIT);
        if amount + gas_fee > balance {
            bail!("insufficient funds after gas estimation");
        }

        let nonce = self
            .hot_wallet_service
            .next_nonce(&from_wallet.address, from_wallet.chain_id)
            .await?;

        let signed = self.signer.sign_transaction(&SignRequest {
            chain_id: i64::from(from_wallet.chain_id),
            to: to_wallet.address.clone(),
            value: amount.to_string(),
            gas_limit: NATIVE_GAS_LIMIT,
            max_fee_per_gas: max_fee.to_string(),
            max_priority_fee_per_gas: tip_cap.to_string(),
            nonce: nonce as u64,
            data: Vec::new(),
            from_address: from_wallet.address.clone(),
            derivation_path: from_wallet.derivation_path.clone(),
        })?;

        let tx_hash = client.send_raw_transaction(&signed.raw_transaction).await?;
        let receipt = client.wait_for_receipt(tx_hash, cancel).await?;

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
            token_addr: None,
            amount: u256_to_decimal(amount),
            type_: TransactionType::Rebalance.as_str().to_string(),
            status: status.as_str().to_string(),
            confirmation_count: Some(0),
        };

        self.pool
            .interact_with_context(format!("record rebalance {}", new_tx.tx_hash), move |conn| {
                Transaction::create(&new_tx, conn)
            })
            .await
            .context("failed to insert rebalance transaction")?;

        tracing::info!(
            from = %from_wallet.address,
            to = %to_wallet.address,
            tx_hash = %signed.tx_hash,
            amount_wei = %amount,
            chain_id = from_wallet.chain_id,
            "rebalance transfer broadcast"
        );
        Ok(())
    }

    async fn quote_fees(&self, client: &EvmRpcClient) -> Result<(u128, u128)> {
        let tip_cap = client.suggest_gas_tip_cap().await?;
        let latest = client.latest_block().await?;
        let base_fee = latest.header.base_fee_per_gas.unwrap_or_default();
        Ok((tip_cap, u128::from(base_fee) * FEE_MULTIPLIER + tip_cap))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn native(n: u64) -> U256 {
        U256::from(n) * U256::from(WEI_PER_NATIVE)
    }

    fn plan(balances: &[U256]) -> Vec<PlannedTransfer> {
        plan_transfers(
            balances,
            U256::from(MIN_BALANCE_WEI),
            U256::from(MAX_BALANCE_WEI),
            U256::from(GAS_BUFFER_WEI),
        )
    }

    #[test]
    fn balanced_wallets_need_no_transfers() {
        assert!(plan(&[native(5), native(4)]).is_empty());
    }

    #[test]
    fn single_donor_fills_single_receiver() {
        // 12 native donor, 1 native receiver: receiver needs 2 to reach min.
        let transfers = plan(&[native(12), native(1)]);
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].from, 0);
        assert_eq!(transfers[0].to, 1);
        assert_eq!(transfers[0].amount, native(2));
    }

    #[test]
    fn donor_never_drops_below_max_plus_buffer() {
        // Donor has 9: only 1 - buffer surplus, receiver needs 3.
        let transfers = plan(&[native(9), U256::ZERO]);
        assert_eq!(transfers.len(), 1);
        let given = transfers[0].amount;
        assert_eq!(given, native(1) - U256::from(GAS_BUFFER_WEI));
        assert!(native(9) - given >= native(8));
    }

    #[test]
    fn receivers_are_filled_smallest_first() {
        let transfers = plan(&[native(20), native(1), U256::ZERO]);
        assert!(!transfers.is_empty());
        // Wallet 2 (empty) is served before wallet 1.
        assert_eq!(transfers[0].to, 2);
        assert_eq!(transfers[0].amount, native(3));
    }

    #[test]
    fn multiple_donors_serve_one_receiver() {
        // Each donor has 1 - buffer to give; receiver needs 3.
        let transfers = plan(&[native(9), native(9), U256::ZERO]);
        assert_eq!(transfers.len(), 2);
        assert!(transfers.iter().all(|t| t.to == 2));
        let total: U256 = transfers.iter().map(|t| t.amount).fold(U256::ZERO, |a, b| a + b);
        assert_eq!(total, native(2) - U256::from(GAS_BUFFER_WEI) * U256::from(2u8));
    }

    #[test]
    fn dust_transfers_are_skipped() {
        // Donor surplus below the gas buffer is not worth moving.
        let barely_over = native(8) + U256::from(GAS_BUFFER_WEI);
        assert!(plan(&[barely_over, U256::ZERO]).is_empty());
    }
}
