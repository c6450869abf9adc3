//! Public-key encryption and signatures.
//!
//! Encryption to a recipient uses an ephemeral X25519 key pair: the ECDH
//! shared secret is hashed together with both public keys into a one-time
//! XChaCha20-Poly1305 key. Signatures are Ed25519 with strict verification.
//!
//! # Wire Format (encryption)
//!
//! ```text
//! [ ephemeral_pubkey: 32 bytes ][ nonce: 24 bytes ][ ciphertext || tag ]
//! ```

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use std::fmt;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::aead::{self, NONCE_SIZE};
use crate::keys::random_bytes;
use sealvault_common::{Error, Result};

/// Size of X25519 and Ed25519 public keys in bytes.
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Size of X25519 and Ed25519 secret keys in bytes.
pub const SECRET_KEY_SIZE: usize = 32;

/// Size of an Ed25519 signature in bytes.
pub const SIGNATURE_SIZE: usize = 64;

const KEY_DOMAIN: &[u8] = b"sealvault/x25519-wrap/v1";

fn to_array(bytes: &[u8], what: &str) -> Result<[u8; PUBLIC_KEY_SIZE]> {
    bytes.try_into().map_err(|_| {
        Error::Crypto(format!(
            "Invalid {} size: expected {}, got {}",
            what,
            PUBLIC_KEY_SIZE,
            bytes.len()
        ))
    })
}

fn wrapping_key(
    shared: &[u8; 32],
    ephemeral: &X25519PublicKey,
    recipient: &X25519PublicKey,
) -> Zeroizing<[u8; 32]> {
    let mut hasher = Blake2b::<U32>::new();
    hasher.update(KEY_DOMAIN);
    hasher.update(shared);
    hasher.update(ephemeral.as_bytes());
    hasher.update(recipient.as_bytes());
    Zeroizing::new(hasher.finalize().into())
}

/// Public half of an encryption key pair, as published in the Keystore.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct EncryptionPublicKey(X25519PublicKey);

impl EncryptionPublicKey {
    /// Parse a published key.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(Self(X25519PublicKey::from(to_array(bytes, "encryption key")?)))
    }

    /// Raw key bytes.
    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.0.to_bytes()
    }

    /// Encrypt `plaintext` so that only the holder of the matching secret
    /// key can read it.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let ephemeral_secret = StaticSecret::from(random_bytes::<SECRET_KEY_SIZE>());
        let ephemeral_public = X25519PublicKey::from(&ephemeral_secret);

        let shared = ephemeral_secret.diffie_hellman(&self.0);
        if !shared.was_contributory() {
            return Err(Error::Crypto("Recipient key is a low-order point".to_string()));
        }
        let key = wrapping_key(shared.as_bytes(), &ephemeral_public, &self.0);

        let (nonce, ciphertext) = aead::encrypt(&key[..], ephemeral_public.as_bytes(), plaintext)?;

        let mut sealed = Vec::with_capacity(PUBLIC_KEY_SIZE + NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(ephemeral_public.as_bytes());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }
}

impl fmt::Debug for EncryptionPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptionPublicKey({:02x?})", &self.0.as_bytes()[..4])
    }
}

/// X25519 key pair used to receive invitations.
#[derive(Clone)]
pub struct EncryptionKeyPair {
    secret: StaticSecret,
    public: X25519PublicKey,
}

impl EncryptionKeyPair {
    /// Generate a fresh key pair.
    pub fn generate() -> Self {
        Self::from_secret_bytes(random_bytes())
    }

    /// Rebuild a key pair from its secret half.
    pub fn from_secret_bytes(secret: [u8; SECRET_KEY_SIZE]) -> Self {
        let secret = StaticSecret::from(secret);
        let public = X25519PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Secret half, for persisting inside a sealed profile.
    pub fn secret_bytes(&self) -> Zeroizing<[u8; SECRET_KEY_SIZE]> {
        Zeroizing::new(self.secret.to_bytes())
    }

    /// Public half.
    pub fn public_key(&self) -> EncryptionPublicKey {
        EncryptionPublicKey(self.public)
    }

    /// Decrypt a message produced by [`EncryptionPublicKey::encrypt`].
    ///
    /// # Errors
    /// - Returns [`Error::Integrity`] if the message is malformed, was sent
    ///   to a different key, or was modified
    pub fn decrypt(&self, sealed: &[u8]) -> Result<Vec<u8>> {
        if sealed.len() < PUBLIC_KEY_SIZE + NONCE_SIZE {
            return Err(Error::Integrity("Sealed message too short".to_string()));
        }

        let (ephemeral_bytes, rest) = sealed.split_at(PUBLIC_KEY_SIZE);
        let (nonce_bytes, ciphertext) = rest.split_at(NONCE_SIZE);

        let ephemeral_public = X25519PublicKey::from(to_array(ephemeral_bytes, "ephemeral key")?);
        let shared = self.secret.diffie_hellman(&ephemeral_public);
        if !shared.was_contributory() {
            return Err(Error::Integrity("Ephemeral key is a low-order point".to_string()));
        }
        let key = wrapping_key(shared.as_bytes(), &ephemeral_public, &self.public);

        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(nonce_bytes);
        aead::decrypt(&key[..], &nonce, ephemeral_public.as_bytes(), ciphertext)
    }
}

impl fmt::Debug for EncryptionKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptionKeyPair([REDACTED])")
    }
}

/// Public half of a signing key pair, as published in the Keystore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignaturePublicKey(VerifyingKey);

impl SignaturePublicKey {
    /// Parse a published key.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let bytes = to_array(bytes, "signature key")?;
        VerifyingKey::from_bytes(&bytes)
            .map(Self)
            .map_err(|e| Error::Crypto(format!("Invalid signature key: {}", e)))
    }

    /// Raw key bytes.
    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.0.to_bytes()
    }

    /// Verify an Ed25519 signature on a message.
    ///
    /// # Errors
    /// - Returns [`Error::Integrity`] if the signature is malformed or does
    ///   not verify
    pub fn verify(&self, msg: &[u8], signature: &[u8]) -> Result<()> {
        let signature = Signature::from_slice(signature)
            .map_err(|_| Error::Integrity("Malformed signature".to_string()))?;
        self.0
            .verify_strict(msg, &signature)
            .map_err(|_| Error::Integrity("Signature verification failed".to_string()))
    }
}

/// Ed25519 key pair used to sign invitations.
#[derive(Clone)]
pub struct SigningKeyPair {
    key: SigningKey,
}

impl SigningKeyPair {
    /// Generate a fresh key pair.
    pub fn generate() -> Self {
        Self::from_seed(random_bytes())
    }

    /// Rebuild a key pair from its 32-byte seed.
    pub fn from_seed(seed: [u8; SECRET_KEY_SIZE]) -> Self {
        Self {
            key: SigningKey::from_bytes(&seed),
        }
    }

    /// Seed bytes, for persisting inside a sealed profile.
    pub fn seed(&self) -> Zeroizing<[u8; SECRET_KEY_SIZE]> {
        Zeroizing::new(self.key.to_bytes())
    }

    /// Public half.
    pub fn public_key(&self) -> SignaturePublicKey {
        SignaturePublicKey(self.key.verifying_key())
    }

    /// Sign a message.
    pub fn sign(&self, msg: &[u8]) -> [u8; SIGNATURE_SIZE] {
        self.key.sign(msg).to_bytes()
    }
}

impl fmt::Debug for SigningKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SigningKeyPair([REDACTED])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_to_recipient() {
        let recipient = EncryptionKeyPair::generate();
        let sealed = recipient.public_key().encrypt(b"pointer").unwrap();

        assert_eq!(recipient.decrypt(&sealed).unwrap(), b"pointer");
    }

    #[test]
    fn test_other_recipient_cannot_decrypt() {
        let bob = EncryptionKeyPair::generate();
        let eve = EncryptionKeyPair::generate();
        let sealed = bob.public_key().encrypt(b"pointer").unwrap();

        assert!(matches!(eve.decrypt(&sealed), Err(Error::Integrity(_))));
    }

    #[test]
    fn test_tampered_message_fails() {
        let bob = EncryptionKeyPair::generate();
        let mut sealed = bob.public_key().encrypt(b"pointer").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;

        assert!(bob.decrypt(&sealed).is_err());
        assert!(bob.decrypt(&sealed[..10]).is_err());
    }

    #[test]
    fn test_key_pair_restores_from_secret() {
        let pair = EncryptionKeyPair::generate();
        let restored = EncryptionKeyPair::from_secret_bytes(*pair.secret_bytes());

        assert_eq!(pair.public_key(), restored.public_key());
        let published = EncryptionPublicKey::from_bytes(&pair.public_key().to_bytes()).unwrap();
        assert_eq!(published, pair.public_key());
    }

    #[test]
    fn test_sign_verify() {
        let signer = SigningKeyPair::generate();
        let signature = signer.sign(b"invitation");
        let public = signer.public_key();

        assert!(public.verify(b"invitation", &signature).is_ok());
        assert!(public.verify(b"other", &signature).is_err());
        assert!(public.verify(b"invitation", &signature[..32]).is_err());
    }

    #[test]
    fn test_other_signer_rejected() {
        let alice = SigningKeyPair::generate();
        let mallory = SigningKeyPair::generate();
        let signature = mallory.sign(b"invitation");

        assert!(matches!(
            alice.public_key().verify(b"invitation", &signature),
            Err(Error::Integrity(_))
        ));
    }

    #[test]
    fn test_signing_key_restores_from_seed() {
        let signer = SigningKeyPair::generate();
        let restored = SigningKeyPair::from_seed(*signer.seed());
        let published = SignaturePublicKey::from_bytes(&signer.public_key().to_bytes()).unwrap();

        assert_eq!(restored.public_key(), published);
    }

    #[test]
    fn test_public_key_wrong_length() {
        assert!(EncryptionPublicKey::from_bytes(&[0u8; 31]).is_err());
        assert!(SignaturePublicKey::from_bytes(&[0u8; 33]).is_err());
    }
}
