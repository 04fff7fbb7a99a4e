use std::sync::RwLock;

use bip39::{Language, Mnemonic, Seed};
use zeroize::{Zeroize, Zeroizing};

use crate::error::KeyError;

/// Process-wide holder of the BIP39 seed. Initialized once at bootstrap,
/// read concurrently by every signing path, zeroed on shutdown.
#[derive(Default)]
pub struct SeedManager {
    inner: RwLock<Option<Zeroizing<Vec<u8>>>>,
}

impl SeedManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs the BIP39 seed transform: PBKDF2-HMAC-SHA512 over the mnemonic
    /// with salt `"mnemonic" + password`, 2048 iterations, 64 bytes out.
    pub fn initialize(&self, mnemonic: &str, password: &str) -> Result<(), KeyError> {
        let mnemonic = Mnemonic::from_phrase(mnemonic, Language::English)
            .map_err(|e| KeyError::Mnemonic(e.to_string()))?;
        let seed = Seed::new(&mnemonic, password);

        let mut guard = self.inner.write().expect("seed lock poisoned");
        *guard = Some(Zeroizing::new(seed.as_bytes().to_vec()));
        Ok(())
    }

    /// Defensive copy; the caller may scrub it without touching the master.
    pub fn seed(&self) -> Option<Zeroizing<Vec<u8>>> {
        self.inner
            .read()
            .expect("seed lock poisoned")
            .as_ref()
            .map(|seed| Zeroizing::new(seed.to_vec()))
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.read().expect("seed lock poisoned").is_some()
    }

    pub fn clear(&self) {
        let mut guard = self.inner.write().expect("seed lock poisoned");
        if let Some(mut seed) = guard.take() {
            seed.zeroize();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[test]
    fn produces_the_bip39_test_vector_seed() {
        let manager = SeedManager::new();
        manager.initialize(MNEMONIC, "").unwrap();

        let seed = manager.seed().unwrap();
        assert_eq!(seed.len(), 64);
        assert_eq!(
            hex::encode(&seed[..16]),
            // First 16 bytes of the canonical BIP39 English vector.
            "5eb00bbddcf069084889a8ab91555681"
        );
    }

    #[test]
    fn password_changes_the_seed() {
        let manager = SeedManager::new();
        manager.initialize(MNEMONIC, "").unwrap();
        let without = manager.seed().unwrap();

        manager.initialize(MNEMONIC, "password123").unwrap();
        let with = manager.seed().unwrap();
        assert_ne!(without[..], with[..]);
    }

    #[test]
    fn clear_makes_seed_unreadable() {
        let manager = SeedManager::new();
        manager.initialize(MNEMONIC, "pw").unwrap();
        assert!(manager.is_initialized());

        manager.clear();
        assert!(!manager.is_initialized());
        assert!(manager.seed().is_none());
    }

    #[test]
    fn rejects_garbled_mnemonic() {
        let manager = SeedManager::new();
        let err = manager.initialize("definitely not a mnemonic", "pw").unwrap_err();
        assert!(matches!(err, KeyError::Mnemonic(_)));
    }
}
