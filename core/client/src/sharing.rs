//! Sharing and revocation.
//!
//! Sharing hands the recipient a pointer to a grant record through an
//! invitation: encrypted to the recipient's published encryption key and
//! signed with the sender's signing key. The owner keeps one grant record
//! per direct recipient; a recipient who shares further forwards their own
//! grant, so whole subtrees hang off one direct grant.
//!
//! Revocation rotates the file to fresh keys and locations, then rewrites
//! only the grant records that are kept. Revoked users are left holding
//! pointers to records that no longer exist.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::files::Access;
use crate::records::{AccessPointer, FileAnchor, GrantRecord};
use crate::session::User;
use sealvault_common::{Error, Result, Username};
use sealvault_crypto::{derive_seal_keys, derive_subkey, locate, random_bytes, Label};

/// Signed, encrypted access grant sent from one user to another.
///
/// Carried out of band; [`Invitation::to_token`] gives a printable form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invitation {
    /// Payload encrypted to the recipient's encryption key.
    pub ciphertext: Vec<u8>,
    /// Sender's signature over sender, recipient and ciphertext.
    pub signature: Vec<u8>,
}

impl Invitation {
    /// Encode as a URL-safe token.
    pub fn to_token(&self) -> Result<String> {
        let json = serde_json::to_vec(self).map_err(|e| Error::Serialization(e.to_string()))?;
        Ok(URL_SAFE_NO_PAD.encode(json))
    }

    /// Decode a token produced by [`Invitation::to_token`].
    ///
    /// # Errors
    /// - [`Error::InvalidInput`] if the token is malformed
    pub fn from_token(token: &str) -> Result<Self> {
        let json = URL_SAFE_NO_PAD
            .decode(token.trim())
            .map_err(|e| Error::InvalidInput(format!("Invalid invitation token: {}", e)))?;
        serde_json::from_slice(&json)
            .map_err(|e| Error::InvalidInput(format!("Invalid invitation token: {}", e)))
    }
}

/// Plaintext of an invitation.
#[derive(Serialize, Deserialize)]
struct InvitationPayload {
    sender: Username,
    grant: AccessPointer,
}

/// Bytes covered by an invitation signature.
fn signed_message(sender: &Username, recipient: &Username, ciphertext: &[u8]) -> Label {
    Label::new("invitation")
        .part(sender.as_str())
        .part(recipient.as_str())
        .part(ciphertext)
}

impl User {
    /// Mint the pointer of a new grant record for `recipient`.
    fn mint_grant(&self, filename: &str, recipient: &Username) -> Result<AccessPointer> {
        let epoch: [u8; 16] = random_bytes();
        let label = Label::new("grant")
            .part(filename)
            .part(self.username().as_str())
            .part(recipient.as_str())
            .part(epoch);

        let keys = derive_seal_keys(self.root(), &label)?;
        let locator = derive_subkey(self.root(), &label.part("location"))?;
        let location = locate(locator.as_bytes(), recipient.as_str().as_bytes())?;
        Ok(AccessPointer::new(location, keys))
    }

    /// Give `recipient` access to a file.
    ///
    /// The owner creates (or reuses) a grant record for the recipient. A
    /// recipient sharing further forwards their own grant, so the new user
    /// loses access whenever the forwarder does.
    ///
    /// # Errors
    /// - [`Error::UnknownUser`] if the recipient has no published keys
    /// - [`Error::InvalidInput`] when sharing with oneself
    /// - [`Error::FileNotFound`] if the file does not exist or access to it
    ///   was revoked
    pub async fn share_file(&self, filename: &str, recipient: &str) -> Result<Invitation> {
        let recipient = Username::new(recipient)?;
        debug!(user = %self.username(), file = filename, recipient = %recipient, "Sharing file");

        if &recipient == self.username() {
            return Err(Error::InvalidInput("Cannot share a file with oneself".to_string()));
        }
        let recipient_key = self.lookup_encryption_key(&recipient).await?;

        let grant = match self.resolve(filename)? {
            Access::Shared(grant) => {
                self.follow_grant(&grant, filename).await?;
                grant
            }
            Access::Owned(anchor_pointer) => {
                let mut anchor = self.load_anchor(&anchor_pointer, filename).await?;
                match anchor.grants.get(&recipient) {
                    Some(grant) => grant.clone(),
                    None => {
                        let grant = self.mint_grant(filename, &recipient)?;
                        let record = GrantRecord {
                            header: anchor.header.clone(),
                        };
                        grant.store(self.datastore(), &record).await?;
                        anchor.grants.insert(recipient.clone(), grant.clone());
                        if let Err(e) = anchor_pointer.store(self.datastore(), &anchor).await {
                            if let Err(cleanup) = self.datastore().delete(&grant.location).await {
                                warn!(recipient = %recipient, error = %cleanup, "Failed to erase unused grant");
                            }
                            return Err(e);
                        }
                        grant
                    }
                }
            }
        };

        let payload = InvitationPayload {
            sender: self.username().clone(),
            grant,
        };
        let plaintext = Zeroizing::new(
            serde_json::to_vec(&payload).map_err(|e| Error::Serialization(e.to_string()))?,
        );
        let ciphertext = recipient_key.encrypt(&plaintext)?;
        let signature = self
            .signing_keys()
            .sign(signed_message(self.username(), &recipient, &ciphertext).as_bytes())
            .to_vec();

        info!(user = %self.username(), file = filename, recipient = %recipient, "File shared");
        Ok(Invitation {
            ciphertext,
            signature,
        })
    }

    /// Accept an invitation from `sender`, making the file available as
    /// `filename`.
    ///
    /// Nothing is changed unless every check passes.
    ///
    /// # Errors
    /// - [`Error::UnknownUser`] if the sender has no published keys
    /// - [`Error::Forgery`] if the invitation was not signed by `sender`
    ///   for this user
    /// - [`Error::Integrity`] if the invitation cannot be decrypted
    /// - [`Error::AlreadyExists`] if `filename` is already in use
    /// - [`Error::FileNotFound`] if access was revoked before receipt
    pub async fn receive_file(
        &mut self,
        filename: &str,
        sender: &str,
        invitation: &Invitation,
    ) -> Result<()> {
        let sender = Username::new(sender)?;
        debug!(user = %self.username(), file = filename, sender = %sender, "Receiving file");

        let sender_key = self.lookup_signature_key(&sender).await?;
        let message = signed_message(&sender, self.username(), &invitation.ciphertext);
        if sender_key
            .verify(message.as_bytes(), &invitation.signature)
            .is_err()
        {
            warn!(user = %self.username(), sender = %sender, "Invitation signature rejected");
            return Err(Error::Forgery(sender.to_string()));
        }

        let plaintext = Zeroizing::new(self.encryption_keys().decrypt(&invitation.ciphertext)?);
        let payload: InvitationPayload = serde_json::from_slice(&plaintext)
            .map_err(|_| Error::Integrity("Malformed invitation".to_string()))?;
        if payload.sender != sender {
            warn!(user = %self.username(), sender = %sender, "Invitation sender mismatch");
            return Err(Error::Forgery(sender.to_string()));
        }

        self.reload().await?;
        if self.shared_pointer(filename).is_some() || self.owns(filename).await? {
            return Err(Error::AlreadyExists(filename.to_string()));
        }
        self.follow_grant(&payload.grant, filename).await?;

        self.insert_shared(filename, payload.grant);
        if let Err(e) = self.save_profile().await {
            self.remove_shared(filename);
            return Err(e);
        }

        info!(user = %self.username(), file = filename, sender = %sender, "File received");
        Ok(())
    }

    /// Revoke every user's access to an owned file.
    ///
    /// # Errors
    /// - [`Error::NotPermitted`] if the caller does not own the file
    /// - [`Error::FileNotFound`] if the file does not exist
    /// - [`Error::Integrity`] if any record of the file was tampered with
    pub async fn revoke_file(&self, filename: &str) -> Result<()> {
        debug!(user = %self.username(), file = filename, "Revoking all access");
        self.rotate(filename, |_| false).await
    }

    /// Revoke one direct recipient's access to an owned file, along with
    /// everyone they shared it with. Other recipients keep access.
    ///
    /// # Errors
    /// - [`Error::InvalidInput`] if the file was never shared with `recipient`
    /// - [`Error::NotPermitted`] if the caller does not own the file
    pub async fn revoke_user(&self, filename: &str, recipient: &str) -> Result<()> {
        let recipient = Username::new(recipient)?;
        debug!(user = %self.username(), file = filename, recipient = %recipient, "Revoking access");

        if let Access::Owned(anchor_pointer) = self.resolve(filename)? {
            let anchor = self.load_anchor(&anchor_pointer, filename).await?;
            if !anchor.grants.contains_key(&recipient) {
                return Err(Error::InvalidInput(format!(
                    "{} was not shared with {}",
                    filename, recipient
                )));
            }
        }
        self.rotate(filename, |user| user != &recipient).await
    }

    /// Move an owned file to a new key epoch, keeping the grants `keep`
    /// accepts and erasing the rest.
    ///
    /// All content is re-verified and re-sealed, so a tampered block aborts
    /// the rotation before anything is changed. Revoked grants are erased
    /// only once the rotated anchor is stored; failing to erase them is
    /// logged and does not fail the revocation.
    async fn rotate<F>(&self, filename: &str, keep: F) -> Result<()>
    where
        F: Fn(&Username) -> bool,
    {
        let anchor_pointer = match self.resolve(filename)? {
            Access::Owned(pointer) => pointer,
            Access::Shared(_) => {
                return Err(Error::NotPermitted(format!(
                    "{} is shared with {}, only its owner can revoke",
                    filename,
                    self.username()
                )));
            }
        };
        let anchor = self.load_anchor(&anchor_pointer, filename).await?;
        let old_header = self.load_header(&anchor.header, filename).await?;

        let mut contents = Vec::with_capacity(old_header.blocks.len());
        for location in &old_header.blocks {
            contents.push(Zeroizing::new(
                self.read_block(&old_header.content_keys, location).await?,
            ));
        }

        let (pointer, content_keys) = self.mint_epoch(filename)?;
        let slices: Vec<&[u8]> = contents.iter().map(|data| data.as_slice()).collect();
        let header = self.write_header(&pointer, content_keys, &slices).await?;

        let (kept, revoked): (BTreeMap<_, _>, BTreeMap<_, _>) =
            anchor.grants.into_iter().partition(|(user, _)| keep(user));
        let rotated = FileAnchor {
            header: pointer,
            grants: kept,
        };
        self.commit_anchor(&anchor_pointer, &rotated, header, Some(&anchor.header))
            .await?;

        // Revoked grants still lead to the old header, which goes next
        for (user, grant) in &revoked {
            if let Err(e) = self.datastore().delete(&grant.location).await {
                warn!(revoked = %user, error = %e, "Failed to erase revoked grant");
            }
            info!(user = %self.username(), file = filename, revoked = %user, "Access revoked");
        }
        self.discard_header(&anchor.header, Some(old_header)).await;

        info!(
            user = %self.username(),
            file = filename,
            remaining = rotated.grants.len(),
            "File keys rotated"
        );
        Ok(())
    }
}
