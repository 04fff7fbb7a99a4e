use std::str::FromStr;

use alloy::primitives::keccak256;
use bip32::{DerivationPath, XPrv};
use deadpool_diesel::postgres::Pool;
use diesel::result::Error as DieselError;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use zeroize::Zeroizing;

use walletd_db::models::{AddressIndex, NewAddressIndex};
use walletd_db::{DatabaseError, WalletdPool};

use crate::error::KeyError;

pub const CHAIN_TYPE_EVM: &str = "evm";

/// BIP44 path shared by every EVM chain: coin 60, account 0, external chain.
pub fn bip44_path(address_index: i32) -> String {
    format!("m/44'/60'/0'/0/{address_index}")
}

/// Walks the BIP32 tree from the seed and returns the raw 32-byte key at
/// `path`. The buffer zeroes itself on drop; callers must not copy it out.
pub fn derive_private_key(
    seed: &[u8],
    path: &str,
    chain_type: &str,
) -> Result<Zeroizing<[u8; 32]>, KeyError> {
    if chain_type != CHAIN_TYPE_EVM {
        return Err(KeyError::UnsupportedChainType(chain_type.to_string()));
    }

    let path = DerivationPath::from_str(path)
        .map_err(|_| KeyError::InvalidPath(path.to_string()))?;
    let xprv = XPrv::derive_from_path(seed, &path)
        .map_err(|e| KeyError::Signing(format!("bip32 derivation failed: {e}")))?;

    let mut key = Zeroizing::new([0u8; 32]);
    key.copy_from_slice(xprv.private_key().to_bytes().as_slice());
    Ok(key)
}

/// Derives the EVM address at `path`: keccak-256 over the 64-byte
/// uncompressed public key, last 20 bytes, lowercase `0x` hex.
pub fn derive_address(seed: &[u8], path: &str, chain_type: &str) -> Result<String, KeyError> {
    if chain_type != CHAIN_TYPE_EVM {
        return Err(KeyError::UnsupportedChainType(chain_type.to_string()));
    }

    let path = DerivationPath::from_str(path)
        .map_err(|_| KeyError::InvalidPath(path.to_string()))?;
    let xprv = XPrv::derive_from_path(seed, &path)
        .map_err(|e| KeyError::Signing(format!("bip32 derivation failed: {e}")))?;

    let public_key = xprv.private_key().verifying_key().to_encoded_point(false);
    let digest = keccak256(&public_key.as_bytes()[1..]);
    Ok(format!("0x{}", hex::encode(&digest[12..])))
}

const INDEX_ALLOCATION_RETRIES: usize = 3;

/// Allocates monotonically increasing BIP44 indices out of the shared
/// `address_indexes` counter row.
#[derive(Clone)]
pub struct AddressService {
    pool: Pool,
}

impl AddressService {
    pub const fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Atomically claims the next index for `(chain_type, device_name)`.
    /// The first allocation creates the row and returns 0. Serialization
    /// conflicts retry; an index is never reused or skipped.
    pub async fn next_address_index(
        &self,
        chain_type: &str,
        device_name: &str,
    ) -> Result<i32, KeyError> {
        let mut last_err = None;

        for _ in 0..INDEX_ALLOCATION_RETRIES {
            let chain_type = chain_type.to_string();
            let device_name = device_name.to_string();

            let result = self
                .pool
                .interact_with_context(
                    format!("allocate address index for {chain_type}"),
                    move |conn| allocate_index(&chain_type, &device_name, conn),
                )
                .await;

            match result {
                Ok(index) => return Ok(index),
                Err(err) if is_retryable(&err) => {
                    tracing::debug!(error = %err, "address index allocation conflict, retrying");
                    last_err = Some(err);
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(last_err.expect("retry loop ran at least once").into())
    }
}

fn allocate_index(
    chain_type: &str,
    device_name: &str,
    conn: &mut diesel::PgConnection,
) -> Result<i32, DieselError> {
    conn.build_transaction().serializable().run(|conn| {
        match AddressIndex::find_for_update(chain_type, device_name, conn) {
            Ok(row) => {
                let next = row.current_index + 1;
                row.set_current_index(next, conn)?;
                Ok(next)
            }
            Err(DieselError::NotFound) => {
                AddressIndex::create(
                    &NewAddressIndex {
                        chain_type: chain_type.to_string(),
                        device_name: device_name.to_string(),
                        current_index: 0,
                    },
                    conn,
                )?;
                Ok(0)
            }
            Err(err) => Err(err),
        }
    })
}

fn is_retryable(err: &DatabaseError) -> bool {
    // Serializable transactions surface contention as a serialization
    // failure; a concurrent first allocation shows up as a unique violation.
    err.is_unique_violation()
        || matches!(err, DatabaseError::Query { message, .. } if message.contains("serialize"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bip39::{Language, Mnemonic, Seed};

    const MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    fn test_seed(password: &str) -> Vec<u8> {
        let mnemonic = Mnemonic::from_phrase(MNEMONIC, Language::English).unwrap();
        Seed::new(&mnemonic, password).as_bytes().to_vec()
    }

    #[test]
    fn derives_the_known_index_zero_address() {
        // Canonical BIP44 vector for the English test mnemonic with an
        // empty passphrase.
        let seed = test_seed("");
        let address = derive_address(&seed, &bip44_path(0), CHAIN_TYPE_EVM).unwrap();
        assert_eq!(address, "0x9858effd232b4033e47d90003d41ec34ecaeda94");
    }

    #[test]
    fn derivation_is_deterministic() {
        let seed = test_seed("password123");
        let first = derive_address(&seed, &bip44_path(7), CHAIN_TYPE_EVM).unwrap();
        let second = derive_address(&seed, &bip44_path(7), CHAIN_TYPE_EVM).unwrap();
        assert_eq!(first, second);
        assert!(first.starts_with("0x"));
        assert_eq!(first.len(), 42);
        assert_eq!(first, first.to_lowercase());
    }

    #[test]
    fn distinct_indices_yield_distinct_addresses() {
        let seed = test_seed("password123");
        let a = derive_address(&seed, &bip44_path(0), CHAIN_TYPE_EVM).unwrap();
        let b = derive_address(&seed, &bip44_path(1), CHAIN_TYPE_EVM).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn private_key_matches_address() {
        let seed = test_seed("");
        let key = derive_private_key(&seed, &bip44_path(0), CHAIN_TYPE_EVM).unwrap();
        assert_eq!(
            hex::encode(&key[..]),
            "1ab42cc412b618bdea3a599e3c9bae199ebf030895b039e9db1e30dafb12b727"
        );
    }

    #[test]
    fn rejects_non_evm_chain_types() {
        let seed = test_seed("");
        let err = derive_address(&seed, &bip44_path(0), "solana").unwrap_err();
        assert!(matches!(err, KeyError::UnsupportedChainType(_)));
    }

    #[test]
    fn rejects_malformed_paths() {
        let seed = test_seed("");
        let err = derive_address(&seed, "m/44'/60'/x", CHAIN_TYPE_EVM).unwrap_err();
        assert!(matches!(err, KeyError::InvalidPath(_)));
    }

    #[test]
    fn builds_bip44_paths() {
        assert_eq!(bip44_path(0), "m/44'/60'/0'/0/0");
        assert_eq!(bip44_path(42), "m/44'/60'/0'/0/42");
    }
}
