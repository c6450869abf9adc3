//! Sealed records kept in the Datastore.
//!
//! Every record is sealed with the envelope construction, using its own
//! location as context, so a record copied to another location fails to
//! open. Structured records are JSON inside the envelope; content blocks
//! are raw bytes.
//!
//! ```text
//! owner anchor ──► file header ──► block, block, ...
//!      │                ▲
//!      └─► grant record ┘   (one per direct recipient)
//! ```

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;

use sealvault_common::{Error, Location, Result, Username};
use sealvault_crypto::{open, seal, Envelope, SealKeys};
use sealvault_storage::Datastore;

/// Seal `plaintext` and write it at `location`.
pub(crate) async fn put_sealed(
    datastore: &dyn Datastore,
    location: &Location,
    keys: &SealKeys,
    plaintext: &[u8],
) -> Result<()> {
    let envelope = seal(keys, location.as_bytes(), plaintext)?;
    datastore.set(location, envelope.to_bytes()).await
}

/// Read and open the record at `location`.
///
/// # Returns
/// `None` if nothing is stored there.
///
/// # Errors
/// - [`Error::Integrity`] if the record was modified, truncated or moved
pub(crate) async fn get_sealed(
    datastore: &dyn Datastore,
    location: &Location,
    keys: &SealKeys,
) -> Result<Option<Vec<u8>>> {
    let Some(bytes) = datastore.get(location).await? else {
        return Ok(None);
    };
    let envelope = Envelope::from_bytes(&bytes)?;
    open(keys, location.as_bytes(), &envelope).map(Some)
}

/// Capability to read and write one sealed record: where it lives and the
/// keys it is sealed under.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessPointer {
    pub location: Location,
    pub keys: SealKeys,
}

impl AccessPointer {
    /// Create a pointer from its parts.
    pub fn new(location: Location, keys: SealKeys) -> Self {
        Self { location, keys }
    }

    /// Fetch and decode the record this pointer designates.
    ///
    /// # Returns
    /// `None` if the record does not exist.
    ///
    /// # Errors
    /// - [`Error::Integrity`] if the record fails verification
    /// - [`Error::Serialization`] if a verified record cannot be decoded
    pub(crate) async fn fetch<T: DeserializeOwned>(
        &self,
        datastore: &dyn Datastore,
    ) -> Result<Option<T>> {
        match get_sealed(datastore, &self.location, &self.keys).await? {
            Some(plaintext) => serde_json::from_slice(&plaintext)
                .map(Some)
                .map_err(|e| Error::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    /// Encode, seal and write `record` at this pointer.
    pub(crate) async fn store<T: Serialize>(
        &self,
        datastore: &dyn Datastore,
        record: &T,
    ) -> Result<()> {
        let plaintext =
            serde_json::to_vec(record).map_err(|e| Error::Serialization(e.to_string()))?;
        put_sealed(datastore, &self.location, &self.keys, &plaintext).await
    }
}

/// Per-file metadata: the content key and the ordered block list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileHeader {
    pub content_keys: SealKeys,
    pub blocks: Vec<Location>,
}

/// Owner-only entry point of a file.
///
/// Lives at a location only the owner can derive and records who the file
/// has been shared with directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileAnchor {
    pub header: AccessPointer,
    pub grants: BTreeMap<Username, AccessPointer>,
}

/// One direct recipient's view of a file.
///
/// Rewritten by the owner whenever the header moves, so recipients keep
/// access across key rotations without doing anything.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrantRecord {
    pub header: AccessPointer,
}
