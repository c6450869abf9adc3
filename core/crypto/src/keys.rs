//! Key types with secure memory handling.
//!
//! All key types automatically zeroize their memory on drop to prevent
//! sensitive data from persisting in memory.

use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Length of symmetric keys in bytes (256-bit).
pub const KEY_LENGTH: usize = 32;

/// Fill an array from the operating system's CSPRNG.
pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

/// Root secret derived from a username and password.
///
/// Never stored anywhere; it exists only inside a live session and every
/// other key of the user is derived from it.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct RootSecret {
    key: [u8; KEY_LENGTH],
}

impl RootSecret {
    /// Create a root secret from raw bytes.
    pub fn from_bytes(key: [u8; KEY_LENGTH]) -> Self {
        Self { key }
    }

    /// Get the key bytes.
    ///
    /// # Security
    /// The returned slice should be used immediately and not stored.
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }
}

impl fmt::Debug for RootSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RootSecret([REDACTED])")
    }
}

/// Purpose-bound symmetric key.
#[derive(Clone, Zeroize, ZeroizeOnDrop, Serialize, Deserialize)]
pub struct SubKey {
    key: [u8; KEY_LENGTH],
}

impl SubKey {
    /// Create a subkey from raw bytes.
    pub fn from_bytes(key: [u8; KEY_LENGTH]) -> Self {
        Self { key }
    }

    /// Get the key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }

    /// Generate a random subkey.
    pub fn generate() -> Self {
        Self {
            key: random_bytes(),
        }
    }
}

impl fmt::Debug for SubKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubKey([REDACTED])")
    }
}

/// Encryption and integrity key pair for one kind of sealed record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SealKeys {
    encryption: SubKey,
    integrity: SubKey,
}

impl SealKeys {
    /// Pair an encryption key with an integrity key.
    pub fn new(encryption: SubKey, integrity: SubKey) -> Self {
        Self {
            encryption,
            integrity,
        }
    }

    /// Generate an independent random key pair.
    pub fn generate() -> Self {
        Self::new(SubKey::generate(), SubKey::generate())
    }

    /// Key used by the cipher.
    pub fn encryption(&self) -> &SubKey {
        &self.encryption
    }

    /// Key used by the MAC.
    pub fn integrity(&self) -> &SubKey {
        &self.integrity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subkey_generate() {
        let key1 = SubKey::generate();
        let key2 = SubKey::generate();

        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_seal_keys_are_independent() {
        let keys = SealKeys::generate();
        assert_ne!(keys.encryption().as_bytes(), keys.integrity().as_bytes());
    }

    #[test]
    fn test_debug_is_redacted() {
        let root = RootSecret::from_bytes([9u8; KEY_LENGTH]);
        assert_eq!(format!("{:?}", root), "RootSecret([REDACTED])");

        let keys = SealKeys::new(SubKey::from_bytes([7u8; KEY_LENGTH]), SubKey::generate());
        let debug = format!("{:?}", keys);
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains('7'));
    }

    #[test]
    fn test_seal_keys_serde() {
        let keys = SealKeys::generate();
        let json = serde_json::to_vec(&keys).unwrap();
        let back: SealKeys = serde_json::from_slice(&json).unwrap();

        assert_eq!(back.encryption().as_bytes(), keys.encryption().as_bytes());
        assert_eq!(back.integrity().as_bytes(), keys.integrity().as_bytes());
    }
}
