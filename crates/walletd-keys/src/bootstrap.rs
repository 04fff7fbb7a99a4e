use anyhow::{Context, bail};
use bip39::{Language, Mnemonic, MnemonicType};

use crate::address::{CHAIN_TYPE_EVM, bip44_path, derive_address};
use crate::keystore::KeystoreService;
use crate::seed::SeedManager;

const MIN_PASSWORD_LEN: usize = 8;
const VERIFICATION_ADDRESS_INDEX: i32 = 0;

/// Environment fallback for non-interactive deployments; otherwise the
/// password comes from a hidden TTY prompt.
pub const PASSWORD_ENV_VAR: &str = "WALLETD_KEYSTORE_PASSWORD";

/// Creates or unlocks the system keystore at startup.
///
/// First boot generates a 24-word mnemonic, asks for the password twice,
/// persists the encrypted keystore and pins the index-0 address as the
/// verification address. Every later boot decrypts the stored mnemonic and
/// requires the freshly derived index-0 address to byte-match the pinned
/// one: a ciphertext that decrypts under the wrong password to a garbled
/// (but valid-looking) mnemonic is caught here instead of silently deriving
/// an unrelated key tree.
pub async fn initialize_keystore(
    keystore_service: &KeystoreService,
    seed_manager: &SeedManager,
) -> anyhow::Result<()> {
    if keystore_service.exists().await? {
        unlock_existing(keystore_service, seed_manager).await
    } else {
        create_new(keystore_service, seed_manager).await
    }
}

async fn create_new(
    keystore_service: &KeystoreService,
    seed_manager: &SeedManager,
) -> anyhow::Result<()> {
    tracing::info!("keystore not found, generating a new mnemonic");

    let mnemonic = Mnemonic::new(MnemonicType::Words24, Language::English);
    let phrase = mnemonic.phrase();

    let password = read_password("Enter password for new keystore (min 8 characters): ")?;
    if password.len() < MIN_PASSWORD_LEN {
        bail!("password must be at least {MIN_PASSWORD_LEN} characters");
    }
    let confirmation = read_password("Confirm password: ")?;
    if password != confirmation {
        bail!("passwords do not match");
    }

    keystore_service
        .create_keystore(phrase, &password)
        .await
        .context("failed to create keystore")?;

    seed_manager
        .initialize(phrase, &password)
        .context("failed to initialize seed manager")?;

    let seed = seed_manager
        .seed()
        .context("seed missing right after initialization")?;
    let verification_address = derive_address(
        &seed,
        &bip44_path(VERIFICATION_ADDRESS_INDEX),
        CHAIN_TYPE_EVM,
    )?;
    keystore_service
        .set_verification_address(&verification_address)
        .await?;

    tracing::info!(address = %verification_address, "keystore created and unlocked");
    Ok(())
}

async fn unlock_existing(
    keystore_service: &KeystoreService,
    seed_manager: &SeedManager,
) -> anyhow::Result<()> {
    tracing::info!("keystore found, unlocking");

    let password = read_password("Enter keystore password: ")?;
    let keystore = keystore_service.get_keystore().await?;
    let mnemonic = keystore_service
        .decrypt_mnemonic(&keystore, &password)
        .context("failed to decrypt keystore")?;

    seed_manager
        .initialize(&mnemonic, &password)
        .context("failed to initialize seed manager")?;

    let seed = seed_manager
        .seed()
        .context("seed missing right after initialization")?;
    let derived = derive_address(
        &seed,
        &bip44_path(VERIFICATION_ADDRESS_INDEX),
        CHAIN_TYPE_EVM,
    )?;

    match keystore.verification_address.as_deref() {
        Some(stored) if !stored.is_empty() => {
            if derived != stored {
                bail!(
                    "password verification failed: derived address does not match stored verification address"
                );
            }
            tracing::info!("keystore password verified");
        }
        _ => {
            // A keystore created before the verification address existed;
            // pin it now.
            keystore_service.set_verification_address(&derived).await?;
            tracing::info!(address = %derived, "verification address stored");
        }
    }

    Ok(())
}

fn read_password(prompt: &str) -> anyhow::Result<String> {
    if let Ok(password) = std::env::var(PASSWORD_ENV_VAR) {
        if !password.is_empty() {
            return Ok(password);
        }
    }
    rpassword::prompt_password(prompt).context("failed to read password from terminal")
}
