use thiserror::Error;
use walletd_db::DatabaseError;

#[derive(Debug, Error)]
pub enum KeyError {
    /// The single keystore row already exists; bootstrap must not run twice.
    #[error("keystore already exists")]
    KeystoreExists,

    /// MAC mismatch on decrypt. Deliberately indistinguishable from a
    /// tampered ciphertext.
    #[error("invalid password")]
    InvalidPassword,

    #[error("seed not initialized")]
    SeedNotInitialized,

    #[error("unsupported chain type: {0}")]
    UnsupportedChainType(String),

    #[error("invalid derivation path: {0}")]
    InvalidPath(String),

    #[error("invalid {0} format")]
    InvalidFieldFormat(&'static str),

    #[error("from address does not match private key")]
    FromAddressMismatch,

    #[error("invalid mnemonic: {0}")]
    Mnemonic(String),

    #[error("keystore blob is malformed: {0}")]
    MalformedKeystore(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}
