pub mod address;
pub mod bootstrap;
pub mod error;
pub mod keystore;
pub mod seed;
pub mod signer;

pub use address::{AddressService, CHAIN_TYPE_EVM, bip44_path, derive_address, derive_private_key};
pub use bootstrap::{PASSWORD_ENV_VAR, initialize_keystore};
pub use error::KeyError;
pub use keystore::{KeystoreJson, KeystoreService, decrypt_mnemonic, encrypt_mnemonic};
pub use seed::SeedManager;
pub use signer::{SignRequest, SignResponse, Signer};
