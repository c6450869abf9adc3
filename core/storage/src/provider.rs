//! Storage trait definitions.

use async_trait::async_trait;

use sealvault_common::{Location, Result};

/// Untrusted blob store.
///
/// An adversary controlling the backend may drop, replace or corrupt any
/// entry at will. Callers must verify everything they read.
#[async_trait]
pub trait Datastore: Send + Sync {
    /// Get the backend name (e.g., "memory", "local").
    fn name(&self) -> &str;

    /// Store `data` at `location`, overwriting any previous value.
    async fn set(&self, location: &Location, data: Vec<u8>) -> Result<()>;

    /// Fetch the value at `location`.
    ///
    /// # Returns
    /// `None` if nothing is stored there.
    async fn get(&self, location: &Location) -> Result<Option<Vec<u8>>>;

    /// Erase the value at `location`.
    ///
    /// Deleting an absent location is not an error.
    async fn delete(&self, location: &Location) -> Result<()>;
}

/// Public, write-once key directory.
#[async_trait]
pub trait Keystore: Send + Sync {
    /// Get the backend name (e.g., "memory", "local").
    fn name(&self) -> &str;

    /// Publish `value` under `key`.
    ///
    /// # Errors
    /// - [`Error::KeyConflict`](sealvault_common::Error::KeyConflict) if
    ///   `key` has already been written
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()>;

    /// Look up the value published under `key`.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
}
