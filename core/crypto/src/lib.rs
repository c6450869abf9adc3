//! Cryptographic primitives for sealvault.
//!
//! This module provides:
//! - Root key derivation using Argon2id and labelled subkeys using keyed BLAKE2b
//! - The sealed record envelope every Datastore blob is written in
//! - Asymmetric encryption (X25519) and signatures (Ed25519) for sharing
//!
//! # Security Guarantees
//! - All symmetric key material is zeroized on drop
//! - No plaintext or key material is ever logged
//! - MAC tags are compared in constant time before anything is decrypted

pub mod aead;
pub mod asymmetric;
pub mod envelope;
pub mod kdf;
pub mod keys;
pub mod mac;

pub use asymmetric::{EncryptionKeyPair, EncryptionPublicKey, SignaturePublicKey, SigningKeyPair};
pub use envelope::{open, seal, Envelope, BLOCK_SIZE};
pub use kdf::{derive_root, derive_seal_keys, derive_subkey, locate, KdfParams, Label};
pub use keys::{random_bytes, RootSecret, SealKeys, SubKey, KEY_LENGTH};
