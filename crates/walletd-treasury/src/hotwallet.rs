use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use deadpool_diesel::postgres::Pool;
use diesel::Connection;

use walletd_db::WalletdPool;
use walletd_db::models::{NewWallet, NewWalletNonce, Wallet, WalletNonce, WalletType};
use walletd_keys::{AddressService, CHAIN_TYPE_EVM, SeedManager, bip44_path, derive_address};

/// Creates hot wallets out of the shared index space and serializes their
/// outbound nonces.
#[derive(Clone)]
pub struct HotWalletService {
    pool: Pool,
    address_service: AddressService,
    seed_manager: Arc<SeedManager>,
}

impl HotWalletService {
    pub fn new(pool: Pool, address_service: AddressService, seed_manager: Arc<SeedManager>) -> Self {
        Self {
            pool,
            address_service,
            seed_manager,
        }
    }

    /// Allocates the next shared address index, derives the address, and
    /// seeds the wallet's nonce row at 0, all in one transaction.
    pub async fn create_hot_wallet(
        &self,
        user_id: &str,
        chain_id: i32,
        device_name: &str,
    ) -> Result<Wallet> {
        let seed = self
            .seed_manager
            .seed()
            .ok_or_else(|| anyhow!("seed not initialized"))?;

        let index = self
            .address_service
            .next_address_index(CHAIN_TYPE_EVM, device_name)
            .await?;
        let derivation_path = bip44_path(index);
        let address = derive_address(&seed, &derivation_path, CHAIN_TYPE_EVM)?;

        let new_wallet = NewWallet {
            user_id: user_id.to_string(),
            address: address.clone(),
            chain_type: CHAIN_TYPE_EVM.to_string(),
            chain_id,
            derivation_path,
            address_index: index,
            wallet_type: WalletType::Hot.as_str().to_string(),
            device_name: (!device_name.is_empty()).then(|| device_name.to_string()),
        };

        let wallet = self
            .pool
            .interact_with_context(format!("create hot wallet on chain {chain_id}"), move |conn| {
                conn.transaction(|conn| {
                    let wallet = Wallet::create(&new_wallet, conn)?;
                    WalletNonce::create(
                        &NewWalletNonce {
                            address: wallet.address.clone(),
                            chain_id,
                            nonce: 0,
                        },
                        conn,
                    )?;
                    diesel::QueryResult::Ok(wallet)
                })
            })
            .await
            .context("failed to persist hot wallet")?;

        tracing::info!(
            address = %wallet.address,
            chain_id,
            address_index = index,
            "hot wallet created"
        );
        Ok(wallet)
    }

    /// Selection policy is deliberately minimal: first hot wallet on the
    /// chain by allocation order.
    pub async fn get_hot_wallet(&self, chain_id: i32) -> Result<Wallet> {
        self.pool
            .interact_with_context(format!("select hot wallet for chain {chain_id}"), move |conn| {
                Wallet::find_first_hot(chain_id, conn)
            })
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    anyhow!("no hot wallet found for this chain")
                } else {
                    e.into()
                }
            })
    }

    /// Claims the next outbound nonce for `(address, chain_id)`.
    ///
    /// The row lock makes allocations strictly sequential: the stored value
    /// is returned and `value + 1` written back before commit. A caller
    /// whose broadcast fails burns the nonce; reconciliation happens
    /// through `eth_getTransactionCount(pending)` resync.
    pub async fn next_nonce(&self, address: &str, chain_id: i32) -> Result<i64> {
        let address = address.to_lowercase();
        let nonce = self
            .pool
            .interact_with_context(format!("allocate nonce for chain {chain_id}"), move |conn| {
                conn.transaction(|conn| {
                    let row = WalletNonce::find_for_update(&address, chain_id, conn)?;
                    row.advance(conn)?;
                    diesel::QueryResult::Ok(row.nonce)
                })
            })
            .await
            .context("failed to allocate nonce")?;
        Ok(nonce)
    }
}
