//! Symmetric encryption using XChaCha20-Poly1305.
//!
//! XChaCha20-Poly1305 has a 24-byte nonce that is safe for random
//! generation, so every call to [`encrypt`] draws a fresh one.

use chacha20poly1305::{
    aead::{generic_array::GenericArray, Aead, AeadCore, KeyInit, OsRng, Payload},
    XChaCha20Poly1305,
};

use crate::keys::KEY_LENGTH;
use sealvault_common::{Error, Result};

/// Nonce size for XChaCha20-Poly1305 (24 bytes).
pub const NONCE_SIZE: usize = 24;

/// Poly1305 tag size (16 bytes).
pub const AEAD_TAG_SIZE: usize = 16;

fn cipher(key: &[u8]) -> Result<XChaCha20Poly1305> {
    if key.len() != KEY_LENGTH {
        return Err(Error::Crypto(format!(
            "Invalid key length: expected {}, got {}",
            KEY_LENGTH,
            key.len()
        )));
    }
    Ok(XChaCha20Poly1305::new(GenericArray::from_slice(key)))
}

/// Encrypt plaintext under a fresh random nonce.
///
/// `aad` is authenticated but not encrypted.
///
/// # Postconditions
/// - Returns the nonce and `ciphertext || poly1305_tag`
///
/// # Errors
/// - Returns error if key length is incorrect
pub fn encrypt(key: &[u8], aad: &[u8], plaintext: &[u8]) -> Result<([u8; NONCE_SIZE], Vec<u8>)> {
    let cipher = cipher(key)?;
    let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(
            &nonce,
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| Error::Crypto(format!("Encryption failed: {}", e)))?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    nonce_bytes.copy_from_slice(&nonce);
    Ok((nonce_bytes, ciphertext))
}

/// Decrypt ciphertext produced by [`encrypt`].
///
/// # Errors
/// - Returns error if key length is incorrect
/// - Returns [`Error::Integrity`] if authentication fails
pub fn decrypt(
    key: &[u8],
    nonce: &[u8; NONCE_SIZE],
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>> {
    let cipher = cipher(key)?;

    if ciphertext.len() < AEAD_TAG_SIZE {
        return Err(Error::Integrity("Ciphertext too short".to_string()));
    }

    cipher
        .decrypt(
            GenericArray::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| Error::Integrity("Decryption failed".to_string()))
}
