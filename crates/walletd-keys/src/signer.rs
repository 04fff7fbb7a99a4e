use std::str::FromStr;
use std::sync::Arc;

use alloy::consensus::{SignableTransaction, TxEip1559, TxEnvelope};
use alloy::eips::eip2718::Encodable2718;
use alloy::network::TxSignerSync;
use alloy::primitives::{Address, TxKind, U256};
use alloy::signers::local::PrivateKeySigner;

use crate::address::{CHAIN_TYPE_EVM, derive_private_key};
use crate::error::KeyError;
use crate::seed::SeedManager;

/// Everything needed to build and sign one EIP-1559 transaction. Numeric
/// fields travel as base-10 strings so 256-bit values survive the trip.
#[derive(Debug, Clone)]
pub struct SignRequest {
    pub chain_id: i64,
    pub to: String,
    pub value: String,
    pub gas_limit: u64,
    pub max_fee_per_gas: String,
    pub max_priority_fee_per_gas: String,
    pub nonce: u64,
    pub data: Vec<u8>,
    pub from_address: String,
    pub derivation_path: String,
}

#[derive(Debug, Clone)]
pub struct SignResponse {
    /// EIP-2718 encoded, ready for `eth_sendRawTransaction`.
    pub raw_transaction: Vec<u8>,
    pub tx_hash: String,
}

/// Signs outbound transactions with per-signature ephemeral keys derived
/// from the in-memory seed. Key buffers zero on drop on every exit path.
pub struct Signer {
    seed_manager: Arc<SeedManager>,
}

impl Signer {
    pub const fn new(seed_manager: Arc<SeedManager>) -> Self {
        Self { seed_manager }
    }

    pub fn sign_transaction(&self, req: &SignRequest) -> Result<SignResponse, KeyError> {
        let seed = self.seed_manager.seed().ok_or(KeyError::SeedNotInitialized)?;
        let private_key = derive_private_key(&seed, &req.derivation_path, CHAIN_TYPE_EVM)?;

        let signer = PrivateKeySigner::from_slice(&private_key[..])
            .map_err(|e| KeyError::Signing(e.to_string()))?;

        let from = Address::from_str(&req.from_address)
            .map_err(|_| KeyError::InvalidFieldFormat("fromAddress"))?;
        if signer.address() != from {
            return Err(KeyError::FromAddressMismatch);
        }

        let to = Address::from_str(&req.to).map_err(|_| KeyError::InvalidFieldFormat("to"))?;
        let value = U256::from_str_radix(&req.value, 10)
            .map_err(|_| KeyError::InvalidFieldFormat("value"))?;
        let max_fee_per_gas: u128 = req
            .max_fee_per_gas
            .parse()
            .map_err(|_| KeyError::InvalidFieldFormat("maxFeePerGas"))?;
        let max_priority_fee_per_gas: u128 = req
            .max_priority_fee_per_gas
            .parse()
            .map_err(|_| KeyError::InvalidFieldFormat("maxPriorityFeePerGas"))?;

        let mut tx = TxEip1559 {
            chain_id: req.chain_id as u64,
            nonce: req.nonce,
            gas_limit: req.gas_limit,
            max_fee_per_gas,
            max_priority_fee_per_gas,
            to: TxKind::Call(to),
            value,
            access_list: Default::default(),
            input: req.data.clone().into(),
        };

        let signature = signer
            .sign_transaction_sync(&mut tx)
            .map_err(|e| KeyError::Signing(e.to_string()))?;
        let signed = tx.into_signed(signature);
        let tx_hash = format!("0x{}", hex::encode(signed.hash()));
        let envelope = TxEnvelope::Eip1559(signed);

        Ok(SignResponse {
            raw_transaction: envelope.encoded_2718(),
            tx_hash,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";
    const INDEX_ZERO_ADDRESS: &str = "0x9858effd232b4033e47d90003d41ec34ecaeda94";

    fn signer() -> Signer {
        let manager = Arc::new(SeedManager::new());
        manager.initialize(MNEMONIC, "").unwrap();
        Signer::new(manager)
    }

    fn base_request() -> SignRequest {
        SignRequest {
            chain_id: 1,
            to: "0x000000000000000000000000000000000000dead".to_string(),
            value: "1000000000000000000".to_string(),
            gas_limit: 21_000,
            max_fee_per_gas: "40000000000".to_string(),
            max_priority_fee_per_gas: "2000000000".to_string(),
            nonce: 0,
            data: Vec::new(),
            from_address: INDEX_ZERO_ADDRESS.to_string(),
            derivation_path: "m/44'/60'/0'/0/0".to_string(),
        }
    }

    #[test]
    fn signs_a_type_two_transaction() {
        let resp = signer().sign_transaction(&base_request()).unwrap();

        // Type-2 envelope marker.
        assert_eq!(resp.raw_transaction[0], 0x02);
        assert!(resp.tx_hash.starts_with("0x"));
        assert_eq!(resp.tx_hash.len(), 66);
    }

    #[test]
    fn signing_is_deterministic_for_identical_requests() {
        let signer = signer();
        let a = signer.sign_transaction(&base_request()).unwrap();
        let b = signer.sign_transaction(&base_request()).unwrap();
        assert_eq!(a.raw_transaction, b.raw_transaction);
        assert_eq!(a.tx_hash, b.tx_hash);
    }

    #[test]
    fn rejects_mismatched_from_address() {
        let mut req = base_request();
        req.from_address = "0x000000000000000000000000000000000000beef".to_string();
        let err = signer().sign_transaction(&req).unwrap_err();
        assert!(matches!(err, KeyError::FromAddressMismatch));
    }

    #[test]
    fn rejects_unparseable_numeric_fields() {
        let mut req = base_request();
        req.value = "one ether".to_string();
        let err = signer().sign_transaction(&req).unwrap_err();
        assert_eq!(err.to_string(), "invalid value format");

        let mut req = base_request();
        req.max_fee_per_gas = "-5".to_string();
        let err = signer().sign_transaction(&req).unwrap_err();
        assert_eq!(err.to_string(), "invalid maxFeePerGas format");
    }

    #[test]
    fn refuses_to_sign_without_a_seed() {
        let signer = Signer::new(Arc::new(SeedManager::new()));
        let err = signer.sign_transaction(&base_request()).unwrap_err();
        assert!(matches!(err, KeyError::SeedNotInitialized));
    }
}
