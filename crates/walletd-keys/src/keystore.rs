use aes::Aes128;
use aes::cipher::{KeyIvInit, StreamCipher};
use ctr::Ctr128BE;
use deadpool_diesel::postgres::Pool;
use rand::RngCore;
use scrypt::Params as ScryptParams;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use uuid::Uuid;
use zeroize::Zeroizing;

use walletd_db::WalletdPool;
use walletd_db::models::{KEYSTORE_SENTINEL_ID, Keystore, NewKeystore};

use crate::error::KeyError;

const SCRYPT_LOG_N: u8 = 18; // N = 262144
const SCRYPT_R: u32 = 8;
const SCRYPT_P: u32 = 1;
const SCRYPT_DKLEN: usize = 32;
const SALT_LEN: usize = 32;
const IV_LEN: usize = 16;
const KEYSTORE_VERSION: i32 = 3;
const CIPHER_NAME: &str = "aes-128-ctr";
const KDF_NAME: &str = "scrypt";

type Aes128Ctr = Ctr128BE<Aes128>;

/// Ethereum keystore-v3 shaped blob stored as JSONB. The MAC binds the
/// second half of the scrypt key to the ciphertext, so a wrong password is
/// detected before any plaintext is produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeystoreJson {
    pub version: i32,
    pub id: String,
    pub crypto: CryptoJson,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CryptoJson {
    pub ciphertext: String,
    pub cipherparams: CipherParamsJson,
    pub cipher: String,
    pub kdf: String,
    pub kdfparams: KdfParamsJson,
    pub mac: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CipherParamsJson {
    pub iv: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KdfParamsJson {
    pub dklen: usize,
    pub salt: String,
    pub n: u32,
    pub r: u32,
    pub p: u32,
}

pub fn encrypt_mnemonic(mnemonic: &str, password: &str) -> Result<KeystoreJson, KeyError> {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    let mut iv = [0u8; IV_LEN];
    rand::thread_rng().fill_bytes(&mut iv);

    let derived_key = derive_key(password.as_bytes(), &salt, SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P)?;

    let mut ciphertext = mnemonic.as_bytes().to_vec();
    apply_aes128_ctr(&derived_key[..16], &iv, &mut ciphertext);

    let mac = compute_mac(&derived_key[16..32], &ciphertext);

    Ok(KeystoreJson {
        version: KEYSTORE_VERSION,
        id: Uuid::new_v4().to_string(),
        crypto: CryptoJson {
            ciphertext: hex::encode(&ciphertext),
            cipherparams: CipherParamsJson {
                iv: hex::encode(iv),
            },
            cipher: CIPHER_NAME.to_string(),
            kdf: KDF_NAME.to_string(),
            kdfparams: KdfParamsJson {
                dklen: SCRYPT_DKLEN,
                salt: hex::encode(salt),
                n: 1 << SCRYPT_LOG_N,
                r: SCRYPT_R,
                p: SCRYPT_P,
            },
            mac: hex::encode(mac),
        },
    })
}

pub fn decrypt_mnemonic(keystore: &KeystoreJson, password: &str) -> Result<String, KeyError> {
    let salt = decode_hex_field(&keystore.crypto.kdfparams.salt, "salt")?;
    let iv = decode_hex_field(&keystore.crypto.cipherparams.iv, "iv")?;
    let ciphertext = decode_hex_field(&keystore.crypto.ciphertext, "ciphertext")?;
    let expected_mac = decode_hex_field(&keystore.crypto.mac, "mac")?;

    if iv.len() != IV_LEN {
        return Err(KeyError::MalformedKeystore(format!(
            "iv must be {IV_LEN} bytes"
        )));
    }

    let log_n = log2_exact(keystore.crypto.kdfparams.n).ok_or_else(|| {
        KeyError::MalformedKeystore(format!(
            "scrypt n {} is not a power of two",
            keystore.crypto.kdfparams.n
        ))
    })?;
    let derived_key = derive_key(
        password.as_bytes(),
        &salt,
        log_n,
        keystore.crypto.kdfparams.r,
        keystore.crypto.kdfparams.p,
    )?;

    let mac = compute_mac(&derived_key[16..32], &ciphertext);
    let matches: bool = mac.as_slice().ct_eq(expected_mac.as_slice()).into();
    if !matches {
        return Err(KeyError::InvalidPassword);
    }

    let mut plaintext = ciphertext;
    apply_aes128_ctr(&derived_key[..16], &iv, &mut plaintext);

    String::from_utf8(plaintext)
        .map_err(|_| KeyError::MalformedKeystore("mnemonic is not valid utf-8".to_string()))
}

fn derive_key(
    password: &[u8],
    salt: &[u8],
    log_n: u8,
    r: u32,
    p: u32,
) -> Result<Zeroizing<[u8; SCRYPT_DKLEN]>, KeyError> {
    let params = ScryptParams::new(log_n, r, p, SCRYPT_DKLEN)
        .map_err(|e| KeyError::MalformedKeystore(format!("bad scrypt params: {e}")))?;
    let mut derived = Zeroizing::new([0u8; SCRYPT_DKLEN]);
    scrypt::scrypt(password, salt, &params, derived.as_mut_slice())
        .map_err(|e| KeyError::MalformedKeystore(format!("scrypt failed: {e}")))?;
    Ok(derived)
}

fn apply_aes128_ctr(key: &[u8], iv: &[u8], buf: &mut [u8]) {
    let mut cipher = Aes128Ctr::new(key.into(), iv.into());
    cipher.apply_keystream(buf);
}

/// MAC = SHA-256(derived_key[16..32] ‖ ciphertext).
fn compute_mac(mac_key: &[u8], ciphertext: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(mac_key);
    hasher.update(ciphertext);
    hasher.finalize().into()
}

fn decode_hex_field(value: &str, field: &str) -> Result<Vec<u8>, KeyError> {
    hex::decode(value).map_err(|_| KeyError::MalformedKeystore(format!("{field} is not hex")))
}

fn log2_exact(n: u32) -> Option<u8> {
    (n.is_power_of_two() && n > 1).then(|| n.trailing_zeros() as u8)
}

/// DB-backed access to the single keystore row.
#[derive(Clone)]
pub struct KeystoreService {
    pool: Pool,
}

impl KeystoreService {
    pub const fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub async fn exists(&self) -> Result<bool, KeyError> {
        Ok(self
            .pool
            .interact_with_context("check keystore existence".to_string(), Keystore::exists)
            .await?)
    }

    pub async fn create_keystore(
        &self,
        mnemonic: &str,
        password: &str,
    ) -> Result<Keystore, KeyError> {
        if self.exists().await? {
            return Err(KeyError::KeystoreExists);
        }

        let blob = encrypt_mnemonic(mnemonic, password)?;
        let keystore_data = serde_json::to_value(&blob)
            .map_err(|e| KeyError::MalformedKeystore(e.to_string()))?;

        let new_keystore = NewKeystore {
            id: KEYSTORE_SENTINEL_ID,
            keystore_data,
            version: KEYSTORE_VERSION,
            cipher: CIPHER_NAME.to_string(),
            kdf: KDF_NAME.to_string(),
        };

        Ok(self
            .pool
            .interact_with_context("create keystore".to_string(), move |conn| {
                Keystore::create(&new_keystore, conn)
            })
            .await?)
    }

    pub async fn get_keystore(&self) -> Result<Keystore, KeyError> {
        Ok(self
            .pool
            .interact_with_context("load keystore".to_string(), Keystore::get)
            .await?)
    }

    pub fn decrypt_mnemonic(&self, keystore: &Keystore, password: &str) -> Result<String, KeyError> {
        let blob: KeystoreJson = serde_json::from_value(keystore.keystore_data.clone())
            .map_err(|e| KeyError::MalformedKeystore(e.to_string()))?;
        decrypt_mnemonic(&blob, password)
    }

    pub async fn set_verification_address(&self, address: &str) -> Result<(), KeyError> {
        let address = address.to_string();
        self.pool
            .interact_with_context("store verification address".to_string(), move |conn| {
                Keystore::set_verification_address(&address, conn)
            })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[test]
    fn round_trips_mnemonic() {
        let blob = encrypt_mnemonic(MNEMONIC, "password123").unwrap();
        assert_eq!(blob.version, 3);
        assert_eq!(blob.crypto.cipher, "aes-128-ctr");
        assert_eq!(blob.crypto.kdf, "scrypt");
        assert_eq!(blob.crypto.kdfparams.n, 262_144);

        let decrypted = decrypt_mnemonic(&blob, "password123").unwrap();
        assert_eq!(decrypted, MNEMONIC);
    }

    #[test]
    fn rejects_wrong_password() {
        let blob = encrypt_mnemonic(MNEMONIC, "password123").unwrap();
        let err = decrypt_mnemonic(&blob, "password124").unwrap_err();
        assert!(matches!(err, KeyError::InvalidPassword));
        assert_eq!(err.to_string(), "invalid password");
    }

    #[test]
    fn rejects_tampered_ciphertext() {
        let mut blob = encrypt_mnemonic(MNEMONIC, "password123").unwrap();
        let mut raw = hex::decode(&blob.crypto.ciphertext).unwrap();
        raw[0] ^= 0xff;
        blob.crypto.ciphertext = hex::encode(raw);

        // Same diagnostic as a bad password: only the MAC knows.
        let err = decrypt_mnemonic(&blob, "password123").unwrap_err();
        assert!(matches!(err, KeyError::InvalidPassword));
    }

    #[test]
    fn fresh_salts_give_distinct_blobs() {
        let a = encrypt_mnemonic(MNEMONIC, "password123").unwrap();
        let b = encrypt_mnemonic(MNEMONIC, "password123").unwrap();
        assert_ne!(a.crypto.kdfparams.salt, b.crypto.kdfparams.salt);
        assert_ne!(a.crypto.ciphertext, b.crypto.ciphertext);
    }
}
