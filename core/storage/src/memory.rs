//! In-memory stores for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::provider::{Datastore, Keystore};
use sealvault_common::{Error, Location, Result};

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read()
        .map_err(|_| Error::Storage("Memory store lock poisoned".to_string()))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
    lock.write()
        .map_err(|_| Error::Storage("Memory store lock poisoned".to_string()))
}

/// In-memory Datastore.
///
/// Clones share the same underlying map, so a test can hand one clone to
/// the client and keep another for inspection. All data is lost on drop.
#[derive(Clone, Default)]
pub struct MemoryDatastore {
    pub(crate) entries: Arc<RwLock<HashMap<Location, Vec<u8>>>>,
}

impl MemoryDatastore {
    /// Create a new empty datastore.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        read(&self.entries).map(|e| e.len()).unwrap_or(0)
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Datastore for MemoryDatastore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn set(&self, location: &Location, data: Vec<u8>) -> Result<()> {
        write(&self.entries)?.insert(*location, data);
        Ok(())
    }

    async fn get(&self, location: &Location) -> Result<Option<Vec<u8>>> {
        Ok(read(&self.entries)?.get(location).cloned())
    }

    async fn delete(&self, location: &Location) -> Result<()> {
        write(&self.entries)?.remove(location);
        Ok(())
    }
}

/// In-memory Keystore.
#[derive(Clone, Default)]
pub struct MemoryKeystore {
    pub(crate) entries: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryKeystore {
    /// Create a new empty keystore.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Keystore for MemoryKeystore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let mut entries = write(&self.entries)?;
        if entries.contains_key(key) {
            return Err(Error::KeyConflict(key.to_string()));
        }
        entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(read(&self.entries)?.get(key).cloned())
    }
}
