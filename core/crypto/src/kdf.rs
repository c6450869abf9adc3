//! Key derivation.
//!
//! The root secret comes from Argon2id, a memory-hard password hashing
//! function, salted with the username. Every other key is a keyed BLAKE2b
//! MAC of a purpose [`Label`] under the root, so keys for different
//! purposes are computationally unrelated.

use argon2::{Algorithm, Argon2, Params, Version};
use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use serde::{Deserialize, Serialize};

use crate::keys::{RootSecret, SealKeys, SubKey, KEY_LENGTH};
use crate::mac;
use sealvault_common::{Error, Location, Result};

const SALT_DOMAIN: &[u8] = b"sealvault/argon2-salt/v1";

/// Parameters for Argon2id key derivation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB (e.g., 65536 = 64 MiB).
    pub memory_cost: u32,
    /// Number of iterations.
    pub time_cost: u32,
    /// Degree of parallelism.
    pub parallelism: u32,
}

impl KdfParams {
    /// Create parameters suitable for interactive use.
    ///
    /// These parameters provide a balance between security and usability,
    /// targeting approximately 0.5-1 second of derivation time.
    pub fn interactive() -> Self {
        Self {
            memory_cost: 65536, // 64 MiB
            time_cost: 3,
            parallelism: 4,
        }
    }

    /// Create parameters suitable for sensitive data.
    ///
    /// Higher security parameters that may take several seconds.
    pub fn sensitive() -> Self {
        Self {
            memory_cost: 262144, // 256 MiB
            time_cost: 4,
            parallelism: 4,
        }
    }

    /// Create moderate parameters for mobile devices.
    pub fn moderate() -> Self {
        Self {
            memory_cost: 32768, // 32 MiB
            time_cost: 3,
            parallelism: 2,
        }
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::moderate()
    }
}

/// Unambiguous encoding of a key-derivation purpose.
///
/// A purpose tag followed by length-prefixed parts, so that
/// `("ab", "c")` and `("a", "bc")` label different keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    bytes: Vec<u8>,
}

impl Label {
    /// Start a label with its purpose tag.
    pub fn new(purpose: &str) -> Self {
        Self {
            bytes: Vec::with_capacity(64),
        }
        .part(purpose)
    }

    /// Append one length-prefixed part.
    pub fn part(mut self, part: impl AsRef<[u8]>) -> Self {
        let part = part.as_ref();
        self.bytes
            .extend_from_slice(&(part.len() as u64).to_be_bytes());
        self.bytes.extend_from_slice(part);
        self
    }

    /// Encoded label bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

fn username_salt(username: &str) -> [u8; 32] {
    let mut hasher = Blake2b::<U32>::new();
    hasher.update(SALT_DOMAIN);
    hasher.update(username.as_bytes());
    hasher.finalize().into()
}

/// Derive a user's root secret from their password and username.
///
/// # Preconditions
/// - `password` and `username` must not be empty
///
/// # Postconditions
/// - The derived secret is deterministic given the same inputs
///
/// # Errors
/// - Returns error if password or username is empty
/// - Returns error if Argon2id parameters are invalid
pub fn derive_root(password: &[u8], username: &str, params: &KdfParams) -> Result<RootSecret> {
    if password.is_empty() {
        return Err(Error::InvalidInput("Password cannot be empty".to_string()));
    }
    if username.is_empty() {
        return Err(Error::InvalidInput("Username cannot be empty".to_string()));
    }

    let argon2_params = Params::new(
        params.memory_cost,
        params.time_cost,
        params.parallelism,
        Some(KEY_LENGTH),
    )
    .map_err(|e| Error::Crypto(format!("Invalid KDF parameters: {}", e)))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params);

    let mut key_bytes = [0u8; KEY_LENGTH];
    argon2
        .hash_password_into(password, &username_salt(username), &mut key_bytes)
        .map_err(|e| Error::Crypto(format!("Key derivation failed: {}", e)))?;

    Ok(RootSecret::from_bytes(key_bytes))
}

/// Derive a purpose-bound subkey: the MAC of `label` under the root.
pub fn derive_subkey(root: &RootSecret, label: &Label) -> Result<SubKey> {
    let tag = mac::compute(root.as_bytes(), &[label.as_bytes()])?;
    let mut key = [0u8; KEY_LENGTH];
    key.copy_from_slice(&tag[..KEY_LENGTH]);
    Ok(SubKey::from_bytes(key))
}

/// Derive the encryption and integrity keys for one record kind.
pub fn derive_seal_keys(root: &RootSecret, label: &Label) -> Result<SealKeys> {
    let encryption = derive_subkey(root, &label.clone().part("enc"))?;
    let integrity = derive_subkey(root, &label.clone().part("mac"))?;
    Ok(SealKeys::new(encryption, integrity))
}

/// Compute a Datastore location as `H(MAC(key, discriminant))`.
pub fn locate(key: &[u8], discriminant: &[u8]) -> Result<Location> {
    let tag = mac::compute(key, &[discriminant])?;
    let digest = Blake2b::<U32>::digest(tag);
    Location::from_digest(&digest)
}
