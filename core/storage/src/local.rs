//! Local filesystem stores.
//!
//! Used by the command-line tool so that accounts and files survive
//! between invocations. One file per entry:
//!
//! ```text
//! <root>/objects/<location>        Datastore
//! <root>/keys/<base64url(key)>     Keystore
//! ```

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::provider::{Datastore, Keystore};
use sealvault_common::{Error, Location, Result};

const OBJECTS_DIRNAME: &str = "objects";
const KEYS_DIRNAME: &str = "keys";
// Not in the base64url alphabet, so never a key's file name
const STAGING_PREFIX: &str = ".staging-";

fn ensure_dir(path: &Path) -> Result<()> {
    // Sync for constructors
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path).await {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Datastore backed by a local directory.
pub struct LocalDatastore {
    root: PathBuf,
}

impl LocalDatastore {
    /// Open (or create) a datastore under `root`.
    ///
    /// # Errors
    /// - Permission denied creating the directory
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().join(OBJECTS_DIRNAME);
        ensure_dir(&root)?;
        tracing::debug!(root = %root.display(), "Opened local datastore");
        Ok(Self { root })
    }

    fn to_fs_path(&self, location: &Location) -> PathBuf {
        self.root.join(location.to_string())
    }
}

#[async_trait]
impl Datastore for LocalDatastore {
    fn name(&self) -> &str {
        "local"
    }

    async fn set(&self, location: &Location, data: Vec<u8>) -> Result<()> {
        fs::write(self.to_fs_path(location), &data).await?;
        Ok(())
    }

    async fn get(&self, location: &Location) -> Result<Option<Vec<u8>>> {
        read_optional(&self.to_fs_path(location)).await
    }

    async fn delete(&self, location: &Location) -> Result<()> {
        match fs::remove_file(self.to_fs_path(location)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Keystore backed by a local directory.
pub struct LocalKeystore {
    root: PathBuf,
}

impl LocalKeystore {
    /// Open (or create) a keystore under `root`.
    ///
    /// # Errors
    /// - Permission denied creating the directory
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().join(KEYS_DIRNAME);
        ensure_dir(&root)?;
        tracing::debug!(root = %root.display(), "Opened local keystore");
        Ok(Self { root })
    }

    fn to_fs_path(&self, key: &str) -> PathBuf {
        self.root.join(URL_SAFE_NO_PAD.encode(key))
    }
}

#[async_trait]
impl Keystore for LocalKeystore {
    fn name(&self) -> &str {
        "local"
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let staging = self
            .root
            .join(format!("{}{}", STAGING_PREFIX, Uuid::new_v4().simple()));
        let published = publish(&staging, &self.to_fs_path(key), &value).await;
        if let Err(e) = fs::remove_file(&staging).await {
            if e.kind() != ErrorKind::NotFound {
                tracing::warn!(path = %staging.display(), error = %e, "Failed to remove staging file");
            }
        }

        match published {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                tracing::warn!(key, "Keystore slot already taken");
                Err(Error::KeyConflict(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        read_optional(&self.to_fs_path(key)).await
    }
}

/// Write `value` to `staging`, then link it into place at `slot`.
///
/// Linking fails with `AlreadyExists` if the slot is taken, and a slot only
/// ever appears with its full contents.
async fn publish(staging: &Path, slot: &Path, value: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(staging).await?;
    file.write_all(value).await?;
    file.sync_all().await?;
    drop(file);
    fs::hard_link(staging, slot).await
}
