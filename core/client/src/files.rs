//! File operations on a user's namespace.
//!
//! A name resolves either to a file the user owns, reached through an
//! anchor only the owner can locate, or to a file received from someone
//! else, reached through the grant record named in the profile. Received
//! names shadow owned ones, and receiving never allows a clash.
//!
//! File content is a list of independently sealed blocks. Appending adds a
//! block and rewrites the header, so its cost is independent of the file's
//! size.

use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::records::{get_sealed, put_sealed, AccessPointer, FileAnchor, FileHeader, GrantRecord};
use crate::session::User;
use sealvault_common::{Error, Location, Result};
use sealvault_crypto::{derive_seal_keys, derive_subkey, locate, random_bytes, Label, SealKeys};

/// How a filename is reached from this session.
#[derive(Debug, Clone)]
pub(crate) enum Access {
    /// Owned by this user; holds the pointer to the anchor.
    Owned(AccessPointer),
    /// Received from another user; holds the pointer to the grant record.
    Shared(AccessPointer),
}

/// Length of the random epoch mixed into every file key derivation.
const EPOCH_SIZE: usize = 16;

impl User {
    /// Resolve `filename` in this user's namespace.
    pub(crate) fn resolve(&self, filename: &str) -> Result<Access> {
        match self.shared_pointer(filename) {
            Some(grant) => Ok(Access::Shared(grant.clone())),
            None => self.anchor_pointer(filename).map(Access::Owned),
        }
    }

    /// Pointer to the anchor of an owned file.
    pub(crate) fn anchor_pointer(&self, filename: &str) -> Result<AccessPointer> {
        let label = Label::new("anchor")
            .part(filename)
            .part(self.username().as_str());
        let keys = derive_seal_keys(self.root(), &label)?;
        let locator = derive_subkey(self.root(), &label.part("location"))?;
        let location = locate(locator.as_bytes(), filename.as_bytes())?;
        Ok(AccessPointer::new(location, keys))
    }

    /// Whether this user owns a file called `filename`.
    pub(crate) async fn owns(&self, filename: &str) -> Result<bool> {
        let anchor = self.anchor_pointer(filename)?;
        Ok(self.datastore().get(&anchor.location).await?.is_some())
    }

    /// Mint the header pointer and content keys of a new key epoch.
    ///
    /// Each epoch draws fresh randomness, so keys from an earlier epoch say
    /// nothing about later ones.
    pub(crate) fn mint_epoch(&self, filename: &str) -> Result<(AccessPointer, SealKeys)> {
        let epoch: [u8; EPOCH_SIZE] = random_bytes();
        let label = Label::new("file")
            .part(filename)
            .part(self.username().as_str())
            .part(epoch);

        let header_keys = derive_seal_keys(self.root(), &label.clone().part("header"))?;
        let content_keys = derive_seal_keys(self.root(), &label.clone().part("content"))?;
        let locator = derive_subkey(self.root(), &label.part("location"))?;
        let location = locate(locator.as_bytes(), filename.as_bytes())?;

        Ok((AccessPointer::new(location, header_keys), content_keys))
    }

    /// Load the anchor of an owned file.
    pub(crate) async fn load_anchor(
        &self,
        anchor: &AccessPointer,
        filename: &str,
    ) -> Result<FileAnchor> {
        anchor
            .fetch(self.datastore())
            .await?
            .ok_or_else(|| Error::FileNotFound(filename.to_string()))
    }

    /// Follow a grant record to the header pointer it names.
    pub(crate) async fn follow_grant(
        &self,
        grant: &AccessPointer,
        filename: &str,
    ) -> Result<AccessPointer> {
        let record: GrantRecord = grant
            .fetch(self.datastore())
            .await?
            .ok_or_else(|| Error::FileNotFound(filename.to_string()))?;
        Ok(record.header)
    }

    /// Find the header pointer of `filename`, however it is reached.
    async fn header_pointer(&self, access: &Access, filename: &str) -> Result<AccessPointer> {
        match access {
            Access::Owned(anchor) => Ok(self.load_anchor(anchor, filename).await?.header),
            Access::Shared(grant) => self.follow_grant(grant, filename).await,
        }
    }

    pub(crate) async fn load_header(
        &self,
        header: &AccessPointer,
        filename: &str,
    ) -> Result<FileHeader> {
        header
            .fetch(self.datastore())
            .await?
            .ok_or_else(|| Error::FileNotFound(filename.to_string()))
    }

    /// Seal `data` as a new block at a fresh random location.
    pub(crate) async fn write_block(&self, keys: &SealKeys, data: &[u8]) -> Result<Location> {
        let location = Location::random();
        put_sealed(self.datastore(), &location, keys, data).await?;
        Ok(location)
    }

    /// Read one block.
    ///
    /// # Errors
    /// - [`Error::Integrity`] if the block is missing or fails verification
    pub(crate) async fn read_block(&self, keys: &SealKeys, location: &Location) -> Result<Vec<u8>> {
        get_sealed(self.datastore(), location, keys)
            .await?
            .ok_or_else(|| Error::Integrity(format!("Block {} missing", location)))
    }

    /// Seal `contents` as the blocks of a new header stored at `pointer`.
    ///
    /// Whatever was written before a failure is erased again.
    pub(crate) async fn write_header(
        &self,
        pointer: &AccessPointer,
        content_keys: SealKeys,
        contents: &[&[u8]],
    ) -> Result<FileHeader> {
        let mut header = FileHeader {
            content_keys,
            blocks: Vec::with_capacity(contents.len()),
        };
        let mut written = Ok(());
        for data in contents {
            match self.write_block(&header.content_keys, data).await {
                Ok(block) => header.blocks.push(block),
                Err(e) => {
                    written = Err(e);
                    break;
                }
            }
        }
        if written.is_ok() {
            written = pointer.store(self.datastore(), &header).await;
        }

        match written {
            Ok(()) => Ok(header),
            Err(e) => {
                warn!(error = %e, "Failed to write file header");
                self.discard_header(pointer, Some(header)).await;
                Err(e)
            }
        }
    }

    /// Move every grant of `anchor` to its header, then store the anchor.
    ///
    /// If any write fails the grants are pointed back at `previous` and the
    /// new `header` is erased, so the owner and the recipients keep reading
    /// the same header.
    pub(crate) async fn commit_anchor(
        &self,
        anchor_pointer: &AccessPointer,
        anchor: &FileAnchor,
        header: FileHeader,
        previous: Option<&AccessPointer>,
    ) -> Result<()> {
        let record = GrantRecord {
            header: anchor.header.clone(),
        };
        let mut committed = Ok(());
        for grant in anchor.grants.values() {
            committed = grant.store(self.datastore(), &record).await;
            if committed.is_err() {
                break;
            }
        }
        if committed.is_ok() {
            committed = anchor_pointer.store(self.datastore(), anchor).await;
        }

        let e = match committed {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };
        warn!(user = %self.username(), error = %e, "File update failed, restoring previous header");
        if let Some(previous) = previous {
            let record = GrantRecord {
                header: previous.clone(),
            };
            for (user, grant) in &anchor.grants {
                if let Err(restore) = grant.store(self.datastore(), &record).await {
                    warn!(recipient = %user, error = %restore, "Failed to restore grant");
                }
            }
        }
        self.discard_header(&anchor.header, Some(header)).await;
        Err(e)
    }

    /// Erase a superseded or abandoned header and its blocks.
    ///
    /// Failures are logged and not returned.
    pub(crate) async fn discard_header(&self, pointer: &AccessPointer, header: Option<FileHeader>) {
        let header = match header {
            Some(header) => Some(header),
            None => match pointer.fetch::<FileHeader>(self.datastore()).await {
                Ok(header) => header,
                Err(e) => {
                    warn!(error = %e, "Superseded header unreadable, erasing it alone");
                    None
                }
            },
        };

        let blocks = header.map(|h| h.blocks).unwrap_or_default();
        for location in blocks.iter().chain(std::iter::once(&pointer.location)) {
            if let Err(e) = self.datastore().delete(location).await {
                warn!(%location, error = %e, "Failed to erase superseded record");
            }
        }
    }

    /// Create or overwrite a file with `data`.
    ///
    /// # Postconditions
    /// - `load_file(filename)` returns exactly `data`
    /// - Overwriting an owned file moves it to fresh keys and locations;
    ///   existing recipients keep access
    /// - Overwriting a received file keeps its keys, so the owner and
    ///   other recipients see the new content
    ///
    /// # Errors
    /// - [`Error::Integrity`] if an existing anchor or header was tampered with
    /// - [`Error::FileNotFound`] if access to a received file was revoked
    pub async fn store_file(&self, filename: &str, data: &[u8]) -> Result<()> {
        debug!(user = %self.username(), file = filename, len = data.len(), "Storing file");

        match self.resolve(filename)? {
            Access::Shared(grant) => {
                let pointer = self.follow_grant(&grant, filename).await?;
                let mut header = self.load_header(&pointer, filename).await?;
                let superseded = std::mem::take(&mut header.blocks);

                let block = self.write_block(&header.content_keys, data).await?;
                header.blocks.push(block);
                pointer.store(self.datastore(), &header).await?;

                for location in &superseded {
                    if let Err(e) = self.datastore().delete(location).await {
                        warn!(%location, error = %e, "Failed to erase superseded block");
                    }
                }
            }
            Access::Owned(anchor_pointer) => {
                let existing: Option<FileAnchor> = anchor_pointer.fetch(self.datastore()).await?;

                let (pointer, content_keys) = self.mint_epoch(filename)?;
                let header = self.write_header(&pointer, content_keys, &[data]).await?;

                let (grants, previous) = match existing {
                    Some(anchor) => (anchor.grants, Some(anchor.header)),
                    None => (BTreeMap::new(), None),
                };
                let anchor = FileAnchor {
                    header: pointer,
                    grants,
                };
                self.commit_anchor(&anchor_pointer, &anchor, header, previous.as_ref())
                    .await?;

                if let Some(previous) = previous {
                    self.discard_header(&previous, None).await;
                }
            }
        }

        info!(user = %self.username(), file = filename, "File stored");
        Ok(())
    }

    /// Append `data` to the end of a file.
    ///
    /// Only the header and one new block are written; existing blocks are
    /// untouched.
    ///
    /// # Errors
    /// - [`Error::FileNotFound`] if the file does not exist
    /// - [`Error::Integrity`] if the header was tampered with
    pub async fn append_file(&self, filename: &str, data: &[u8]) -> Result<()> {
        debug!(user = %self.username(), file = filename, len = data.len(), "Appending to file");

        let access = self.resolve(filename)?;
        let pointer = self.header_pointer(&access, filename).await?;
        let mut header = self.load_header(&pointer, filename).await?;

        let block = self.write_block(&header.content_keys, data).await?;
        header.blocks.push(block);
        pointer.store(self.datastore(), &header).await?;

        info!(user = %self.username(), file = filename, blocks = header.blocks.len(), "File appended");
        Ok(())
    }

    /// Read the full content of a file.
    ///
    /// # Errors
    /// - [`Error::FileNotFound`] if the name is unknown or access was revoked
    /// - [`Error::Integrity`] if any record of the file was tampered with
    pub async fn load_file(&self, filename: &str) -> Result<Vec<u8>> {
        debug!(user = %self.username(), file = filename, "Loading file");

        let access = self.resolve(filename)?;
        let pointer = self.header_pointer(&access, filename).await?;
        let header = self.load_header(&pointer, filename).await?;

        let mut content = Vec::new();
        for location in &header.blocks {
            content.extend(self.read_block(&header.content_keys, location).await?);
        }

        debug!(user = %self.username(), file = filename, len = content.len(), "File loaded");
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{profile_location, TestEnv};
    use sealvault_storage::DatastoreAdversary;
    use std::collections::HashSet;

    #[tokio::test]
    async fn test_store_load_lengths() {
        let env = TestEnv::new();
        let alice = env.user("alice").await;

        for len in [0usize, 1, 15, 16, 17, 1000] {
            let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            let name = format!("file-{}", len);
            alice.store_file(&name, &data).await.unwrap();
            assert_eq!(alice.load_file(&name).await.unwrap(), data);
        }
    }

    #[tokio::test]
    async fn test_load_missing() {
        let env = TestEnv::new();
        let alice = env.user("alice").await;

        let result = alice.load_file("nothing").await;
        assert!(matches!(result, Err(Error::FileNotFound(_))));
    }

    #[tokio::test]
    async fn test_append_missing() {
        let env = TestEnv::new();
        let alice = env.user("alice").await;

        let result = alice.append_file("nothing", b"data").await;
        assert!(matches!(result, Err(Error::FileNotFound(_))));
    }

    #[tokio::test]
    async fn test_namespaces_are_per_user() {
        let env = TestEnv::new();
        let alice = env.user("alice").await;
        let bob = env.user("bob").await;

        alice.store_file("notes", b"alice's").await.unwrap();
        bob.store_file("notes", b"bob's").await.unwrap();

        assert_eq!(alice.load_file("notes").await.unwrap(), b"alice's");
        assert_eq!(bob.load_file("notes").await.unwrap(), b"bob's");
    }

    #[tokio::test]
    async fn test_append_concatenates() {
        let env = TestEnv::new();
        let alice = env.user("alice").await;

        alice.store_file("log", b"one").await.unwrap();
        alice.append_file("log", b"").await.unwrap();
        alice.append_file("log", b" two").await.unwrap();
        alice.append_file("log", b" three").await.unwrap();

        assert_eq!(alice.load_file("log").await.unwrap(), b"one two three");
    }

    #[tokio::test]
    async fn test_append_leaves_blocks_untouched() {
        let env = TestEnv::new();
        let alice = env.user("alice").await;
        alice.store_file("log", &[7u8; 4096]).await.unwrap();

        let before: Vec<(Location, Vec<u8>)> = env
            .datastore
            .locations()
            .into_iter()
            .map(|location| (location, env.datastore.raw_get(&location).unwrap()))
            .collect();

        alice.append_file("log", b"tail").await.unwrap();

        // Only the header changes; one block is added
        let changed = before
            .iter()
            .filter(|(location, bytes)| env.datastore.raw_get(location).as_ref() != Some(bytes))
            .count();
        assert_eq!(changed, 1);
        assert_eq!(env.datastore.len(), before.len() + 1);
    }

    #[tokio::test]
    async fn test_overwrite_rotates_and_erases() {
        let env = TestEnv::new();
        let alice = env.user("alice").await;
        alice.store_file("f", b"first").await.unwrap();
        alice.append_file("f", b" more").await.unwrap();
        let before: HashSet<Location> = env.datastore.locations().into_iter().collect();

        alice.store_file("f", b"second").await.unwrap();
        let after: HashSet<Location> = env.datastore.locations().into_iter().collect();

        assert_eq!(alice.load_file("f").await.unwrap(), b"second");
        // Profile and anchor stay, header and block are new
        assert_eq!(before.intersection(&after).count(), 2);
        assert_eq!(after.len(), 4);
    }

    #[tokio::test]
    async fn test_nothing_in_plaintext() {
        let env = TestEnv::new();
        let alice = env.user("alice").await;
        alice
            .store_file("secret-plans.txt", b"attack at dawn")
            .await
            .unwrap();

        for location in env.datastore.locations() {
            let bytes = env.datastore.raw_get(&location).unwrap();
            for needle in [&b"secret-plans"[..], b"attack at dawn", b"alice"] {
                assert!(!bytes.windows(needle.len()).any(|w| w == needle));
            }
        }
    }

    #[tokio::test]
    async fn test_tampered_block_detected() {
        let env = TestEnv::new();
        let alice = env.user("alice").await;
        alice.store_file("f", b"content").await.unwrap();
        let before: HashSet<Location> = env.datastore.locations().into_iter().collect();
        alice.append_file("f", b"more").await.unwrap();

        let block = env
            .datastore
            .locations()
            .into_iter()
            .find(|location| !before.contains(location))
            .unwrap();
        env.datastore.flip_bit(&block, 200).unwrap();

        let result = alice.load_file("f").await;
        assert!(matches!(result, Err(Error::Integrity(_))));
    }

    #[tokio::test]
    async fn test_deleted_block_detected() {
        let env = TestEnv::new();
        let alice = env.user("alice").await;
        alice.store_file("f", b"content").await.unwrap();
        let before: HashSet<Location> = env.datastore.locations().into_iter().collect();
        alice.append_file("f", b"more").await.unwrap();

        let block = env
            .datastore
            .locations()
            .into_iter()
            .find(|location| !before.contains(location))
            .unwrap();
        env.datastore.erase(&block);

        let result = alice.load_file("f").await;
        assert!(matches!(result, Err(Error::Integrity(_))));
    }

    #[tokio::test]
    async fn test_tampering_anywhere_detected() {
        let env = TestEnv::new();
        let alice = env.user("alice").await;
        let profile = profile_location("alice");
        alice.store_file("f", b"content").await.unwrap();

        for location in env.datastore.locations() {
            if location == profile {
                continue;
            }
            let pristine = env.datastore.raw_get(&location).unwrap();
            env.datastore.flip_bit(&location, 100).unwrap();

            let result = alice.load_file("f").await;
            assert!(matches!(result, Err(Error::Integrity(_))));

            env.datastore.raw_set(&location, pristine);
        }

        assert_eq!(alice.load_file("f").await.unwrap(), b"content");
    }

    #[tokio::test]
    async fn test_overwrite_tampered_anchor_rejected() {
        let env = TestEnv::new();
        let alice = env.user("alice").await;
        alice.store_file("f", b"content").await.unwrap();

        let anchor = alice.anchor_pointer("f").unwrap();
        env.datastore.flip_bit(&anchor.location, 300).unwrap();

        let result = alice.store_file("f", b"new").await;
        assert!(matches!(result, Err(Error::Integrity(_))));
    }

    #[tokio::test]
    async fn test_first_store_failure_leaves_nothing() {
        let env = TestEnv::new();
        let alice = env.user("alice").await;
        let before = env.datastore.len();

        env.faults
            .refuse_writes_to(alice.anchor_pointer("f").unwrap().location);
        assert!(alice.store_file("f", b"data").await.is_err());

        assert_eq!(env.datastore.len(), before);
        assert!(matches!(
            alice.load_file("f").await,
            Err(Error::FileNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_overwrite_failed_anchor_write_keeps_file() {
        let env = TestEnv::new();
        let alice = env.user("alice").await;
        let mut bob = env.user("bob").await;
        alice.store_file("f", b"v1").await.unwrap();
        let invitation = alice.share_file("f", "bob").await.unwrap();
        bob.receive_file("g", "alice", &invitation).await.unwrap();
        let before: HashSet<Location> = env.datastore.locations().into_iter().collect();

        env.faults
            .refuse_writes_to(alice.anchor_pointer("f").unwrap().location);
        let result = alice.store_file("f", b"v2").await;
        assert!(matches!(result, Err(Error::Storage(_))));
        env.faults.heal();

        let after: HashSet<Location> = env.datastore.locations().into_iter().collect();
        assert_eq!(before, after);
        assert_eq!(alice.load_file("f").await.unwrap(), b"v1");
        assert_eq!(bob.load_file("g").await.unwrap(), b"v1");

        alice.append_file("f", b"+alice").await.unwrap();
        assert_eq!(bob.load_file("g").await.unwrap(), b"v1+alice");
    }

    #[tokio::test]
    async fn test_overwrite_failed_grant_write_keeps_file() {
        let env = TestEnv::new();
        let alice = env.user("alice").await;
        let mut bob = env.user("bob").await;
        let mut carol = env.user("carol").await;
        alice.store_file("f", b"v1").await.unwrap();
        for (recipient, local) in [(&mut bob, "g"), (&mut carol, "h")] {
            let invitation = alice
                .share_file("f", recipient.username().as_str())
                .await
                .unwrap();
            recipient.receive_file(local, "alice", &invitation).await.unwrap();
        }

        // bob's grant moves first, then carol's cannot be written
        env.faults
            .refuse_writes_to(carol.shared_pointer("h").unwrap().location);
        assert!(alice.store_file("f", b"v2").await.is_err());
        env.faults.heal();

        assert_eq!(alice.load_file("f").await.unwrap(), b"v1");
        assert_eq!(bob.load_file("g").await.unwrap(), b"v1");
        assert_eq!(carol.load_file("h").await.unwrap(), b"v1");

        bob.append_file("g", b"+bob").await.unwrap();
        assert_eq!(alice.load_file("f").await.unwrap(), b"v1+bob");
        assert_eq!(carol.load_file("h").await.unwrap(), b"v1+bob");

        alice.store_file("f", b"v2").await.unwrap();
        assert_eq!(bob.load_file("g").await.unwrap(), b"v2");
        assert_eq!(carol.load_file("h").await.unwrap(), b"v2");
    }
}
