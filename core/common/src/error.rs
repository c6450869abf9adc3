//! Common error types for sealvault.

use thiserror::Error;

/// Top-level error type for sealvault operations.
///
/// The first group of variants is what the client API reports to callers.
/// Wrong passwords, unknown users and corrupted profiles all surface as
/// [`Error::InvalidCredentials`] so that login failures reveal nothing about
/// which accounts exist.
#[derive(Debug, Error)]
pub enum Error {
    /// An account with this username is already published in the Keystore.
    #[error("Account already exists: {0}")]
    AccountExists(String),

    /// Wrong password, unknown user, or an unreadable profile record.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// No file is reachable under this name.
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// A MAC, padding or decryption check failed on data read from a store.
    #[error("Integrity check failed: {0}")]
    Integrity(String),

    /// An invitation does not carry a valid signature from its claimed sender.
    #[error("Forged invitation from {0}")]
    Forgery(String),

    /// The operation would clobber an existing object.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// A write-once Keystore slot is already occupied.
    #[error("Keystore slot already taken: {0}")]
    KeyConflict(String),

    /// No public keys are published for this username.
    #[error("Unknown user: {0}")]
    UnknownUser(String),

    /// Operation not permitted for the calling user.
    #[error("Not permitted: {0}")]
    NotPermitted(String),

    /// Cryptographic primitive failed for a reason other than integrity.
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// Storage backend failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
