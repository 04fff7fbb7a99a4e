use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use deadpool_diesel::postgres::Pool;
use diesel::result::OptionalExtension;

use walletd_db::WalletdPool;
use walletd_db::models::{Chain, NewWallet, Wallet, WalletType};
use walletd_keys::{AddressService, CHAIN_TYPE_EVM, SeedManager, bip44_path, derive_address};

/// User wallet management: one derived address per `(user, chain)` out of
/// the shared index space.
#[derive(Clone)]
pub struct WalletService {
    pool: Pool,
    address_service: AddressService,
    seed_manager: Arc<SeedManager>,
}

impl WalletService {
    pub fn new(pool: Pool, address_service: AddressService, seed_manager: Arc<SeedManager>) -> Self {
        Self {
            pool,
            address_service,
            seed_manager,
        }
    }

    /// Creates the user's wallet on `chain_id`. Idempotent: an existing
    /// wallet is returned as-is, so no index is burned on replays.
    pub async fn create_wallet(&self, user_id: &str, chain_id: i32) -> Result<Wallet> {
        let chain = self.load_active_chain(chain_id).await?;

        let existing = {
            let user_id = user_id.to_string();
            self.pool
                .interact_with_context(format!("check existing wallet for {user_id}"), move |conn| {
                    Wallet::find_by_user_and_chain(&user_id, chain_id, conn).optional()
                })
                .await?
        };
        if let Some(wallet) = existing {
            tracing::info!(user_id, chain_id, address = %wallet.address, "wallet already exists");
            return Ok(wallet);
        }

        let seed = self
            .seed_manager
            .seed()
            .ok_or_else(|| anyhow!("seed not initialized"))?;

        let index = self
            .address_service
            .next_address_index(CHAIN_TYPE_EVM, "")
            .await?;
        let derivation_path = bip44_path(index);
        let address = derive_address(&seed, &derivation_path, CHAIN_TYPE_EVM)?;

        let new_wallet = NewWallet {
            user_id: user_id.to_string(),
            address: address.to_lowercase(),
            chain_type: CHAIN_TYPE_EVM.to_string(),
            chain_id,
            derivation_path,
            address_index: index,
            wallet_type: WalletType::User.as_str().to_string(),
            device_name: None,
        };

        let wallet = self
            .pool
            .interact_with_context(format!("create wallet on chain {chain_id}"), move |conn| {
                Wallet::create(&new_wallet, conn)
            })
            .await
            .context("failed to persist wallet")?;

        tracing::info!(
            user_id,
            chain_id,
            chain_name = %chain.chain_name,
            address = %wallet.address,
            address_index = index,
            "wallet created"
        );
        Ok(wallet)
    }

    pub async fn get_wallet(&self, user_id: &str, chain_id: i32) -> Result<Wallet> {
        let user_id = user_id.to_string();
        self.pool
            .interact_with_context(format!("load wallet for {user_id}"), move |conn| {
                Wallet::find_by_user_and_chain(&user_id, chain_id, conn)
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

    pub async fn list_wallets(&self, user_id: &str) -> Result<Vec<Wallet>> {
        let user_id = user_id.to_string();
        Ok(self
            .pool
            .interact_with_context(format!("list wallets for {user_id}"), move |conn| {
                Wallet::find_by_user(&user_id, conn)
            })
            .await?)
    }

    pub async fn get_wallet_by_address(&self, address: &str, chain_id: i32) -> Result<Wallet> {
        let address = address.to_string();
        self.pool
            .interact_with_context(format!("load wallet by address on chain {chain_id}"), move |conn| {
                Wallet::find_by_address(&address, chain_id, conn)
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

    async fn load_active_chain(&self, chain_id: i32) -> Result<Chain> {
        let chain = self
            .pool
            .interact_with_context(format!("load chain {chain_id}"), move |conn| {
                Chain::find_by_chain_id(chain_id, conn).optional()
            })
            .await?;

        match chain {
            Some(chain) if chain.is_active => Ok(chain),
            _ => Err(anyhow!("chain not found or inactive")),
        }
    }
}
