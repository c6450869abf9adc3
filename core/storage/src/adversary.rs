//! Fault injection for the in-memory stores.
//!
//! Models the adversary of the threat model: someone with full control of
//! both services who can read, replace, corrupt or erase anything, and a
//! backend that fails part way through an operation. Only compiled with the
//! `fault-injection` feature.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use crate::memory::{MemoryDatastore, MemoryKeystore};
use crate::provider::Datastore;
use sealvault_common::{Error, Location, Result};

/// Raw, unauthenticated access to a Datastore.
pub trait DatastoreAdversary {
    /// Every location currently holding data.
    fn locations(&self) -> Vec<Location>;

    /// Read an entry without going through the client.
    fn raw_get(&self, location: &Location) -> Option<Vec<u8>>;

    /// Overwrite an entry with arbitrary bytes.
    fn raw_set(&self, location: &Location, data: Vec<u8>);

    /// Erase an entry.
    fn erase(&self, location: &Location);

    /// Flip one bit of an entry.
    ///
    /// # Errors
    /// - Returns error if the entry is missing or `bit` is out of range
    fn flip_bit(&self, location: &Location, bit: usize) -> Result<()> {
        let mut data = self
            .raw_get(location)
            .ok_or_else(|| Error::Storage(format!("Nothing stored at {}", location)))?;
        let byte = data
            .get_mut(bit / 8)
            .ok_or_else(|| Error::InvalidInput(format!("Bit {} out of range", bit)))?;
        *byte ^= 1 << (bit % 8);
        self.raw_set(location, data);
        Ok(())
    }
}

/// Raw access to a Keystore, bypassing write-once.
pub trait KeystoreAdversary {
    /// Remove every published key.
    fn clear(&self);

    /// Replace a published key.
    fn overwrite(&self, key: &str, value: Vec<u8>);

    /// Read a published key.
    fn raw_get(&self, key: &str) -> Option<Vec<u8>>;
}

impl DatastoreAdversary for MemoryDatastore {
    fn locations(&self) -> Vec<Location> {
        self.entries
            .read()
            .map(|entries| entries.keys().copied().collect())
            .unwrap_or_default()
    }

    fn raw_get(&self, location: &Location) -> Option<Vec<u8>> {
        self.entries
            .read()
            .ok()
            .and_then(|entries| entries.get(location).cloned())
    }

    fn raw_set(&self, location: &Location, data: Vec<u8>) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(*location, data);
        }
    }

    fn erase(&self, location: &Location) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(location);
        }
    }
}

impl KeystoreAdversary for MemoryKeystore {
    fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }

    fn overwrite(&self, key: &str, value: Vec<u8>) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(key.to_string(), value);
        }
    }

    fn raw_get(&self, key: &str) -> Option<Vec<u8>> {
        self.entries
            .read()
            .ok()
            .and_then(|entries| entries.get(key).cloned())
    }
}

/// Datastore whose writes and deletes can be made to fail.
///
/// Wraps a [`MemoryDatastore`]; clones share both the entries and the
/// injected faults. Nothing fails until asked to.
#[derive(Clone, Default)]
pub struct FaultyDatastore {
    inner: MemoryDatastore,
    refused_writes: Arc<RwLock<HashSet<Location>>>,
    refuse_deletes: Arc<AtomicBool>,
}

impl FaultyDatastore {
    /// Wrap `inner`.
    pub fn new(inner: MemoryDatastore) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    /// Make every write to `location` fail.
    pub fn refuse_writes_to(&self, location: Location) {
        if let Ok(mut refused) = self.refused_writes.write() {
            refused.insert(location);
        }
    }

    /// Make every delete fail, or succeed again.
    pub fn refuse_deletes(&self, refuse: bool) {
        self.refuse_deletes.store(refuse, Ordering::SeqCst);
    }

    /// Drop all injected faults.
    pub fn heal(&self) {
        if let Ok(mut refused) = self.refused_writes.write() {
            refused.clear();
        }
        self.refuse_deletes(false);
    }

    fn write_refused(&self, location: &Location) -> bool {
        self.refused_writes
            .read()
            .map(|refused| refused.contains(location))
            .unwrap_or(false)
    }
}

#[async_trait]
impl Datastore for FaultyDatastore {
    fn name(&self) -> &str {
        "faulty"
    }

    async fn set(&self, location: &Location, data: Vec<u8>) -> Result<()> {
        if self.write_refused(location) {
            return Err(Error::Storage(format!("Write to {} refused", location)));
        }
        self.inner.set(location, data).await
    }

    async fn get(&self, location: &Location) -> Result<Option<Vec<u8>>> {
        self.inner.get(location).await
    }

    async fn delete(&self, location: &Location) -> Result<()> {
        if self.refuse_deletes.load(Ordering::SeqCst) {
            return Err(Error::Storage(format!("Delete of {} refused", location)));
        }
        self.inner.delete(location).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{Datastore, Keystore};

    #[tokio::test]
    async fn test_flip_bit() {
        let store = MemoryDatastore::new();
        let location = Location::random();
        store.set(&location, vec![0b0000_0000, 0b1111_1111]).await.unwrap();

        store.flip_bit(&location, 9).unwrap();
        assert_eq!(store.raw_get(&location).unwrap(), vec![0b0000_0000, 0b1111_1101]);

        assert!(store.flip_bit(&location, 16).is_err());
        assert!(store.flip_bit(&Location::random(), 0).is_err());
    }

    #[tokio::test]
    async fn test_keystore_clear_and_overwrite() {
        let keystore = MemoryKeystore::new();
        keystore.set("aliceenc", vec![1]).await.unwrap();

        keystore.overwrite("aliceenc", vec![2]);
        assert_eq!(keystore.get("aliceenc").await.unwrap().unwrap(), vec![2]);

        keystore.clear();
        assert!(keystore.get("aliceenc").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_faulty_datastore_refuses_on_demand() {
        let memory = MemoryDatastore::new();
        let store = FaultyDatastore::new(memory.clone());
        let blocked = Location::random();
        let open = Location::random();

        store.refuse_writes_to(blocked);
        assert!(matches!(
            store.set(&blocked, vec![1]).await,
            Err(Error::Storage(_))
        ));
        store.set(&open, vec![2]).await.unwrap();
        assert!(memory.raw_get(&blocked).is_none());

        store.refuse_deletes(true);
        assert!(store.delete(&open).await.is_err());
        assert_eq!(store.get(&open).await.unwrap().unwrap(), vec![2]);

        store.heal();
        store.set(&blocked, vec![3]).await.unwrap();
        store.delete(&open).await.unwrap();
        assert_eq!(memory.raw_get(&blocked).unwrap(), vec![3]);
        assert!(memory.raw_get(&open).is_none());
    }
}
