//! Logged-in user sessions.
//!
//! A session holds the user's root secret and private keys in memory. The
//! durable half of the session, the profile, is sealed in the Datastore
//! under keys derived from the root, so any number of sessions for the same
//! user can run on different devices and pick up each other's changes with
//! [`User::reload`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use zeroize::Zeroize;

use crate::records::AccessPointer;
use sealvault_common::{Error, Result, Username};
use sealvault_crypto::{
    derive_root, derive_seal_keys, locate, EncryptionKeyPair, EncryptionPublicKey, KdfParams,
    Label, RootSecret, SignaturePublicKey, SigningKeyPair,
};
use sealvault_storage::{Datastore, Keystore};

/// Secrets derived from a username and password.
pub(crate) struct Credentials {
    root: RootSecret,
    profile: AccessPointer,
}

impl Credentials {
    /// Run the password KDF and derive where the profile lives.
    ///
    /// # Errors
    /// - Returns error if the password is empty
    pub(crate) fn derive(username: &Username, password: &str, params: &KdfParams) -> Result<Self> {
        let root = derive_root(password.as_bytes(), username.as_str(), params)?;
        let keys = derive_seal_keys(&root, &Label::new("profile").part(username.as_str()))?;
        let location = locate(root.as_bytes(), username.as_str().as_bytes())?;
        Ok(Self {
            root,
            profile: AccessPointer::new(location, keys),
        })
    }

    /// Pointer to the sealed profile record.
    pub(crate) fn profile(&self) -> &AccessPointer {
        &self.profile
    }
}

/// Durable per-user state, sealed at the profile location.
#[derive(Serialize, Deserialize)]
pub(crate) struct ProfileRecord {
    pub username: Username,
    pub encryption_secret: [u8; 32],
    pub signing_seed: [u8; 32],
    /// Received files by local name.
    pub shared: HashMap<String, AccessPointer>,
}

impl Drop for ProfileRecord {
    fn drop(&mut self) {
        self.encryption_secret.zeroize();
        self.signing_seed.zeroize();
    }
}

/// Read the profile designated by `credentials`.
///
/// # Returns
/// `None` if no profile exists there.
pub(crate) async fn fetch_profile(
    datastore: &dyn Datastore,
    credentials: &Credentials,
) -> Result<Option<ProfileRecord>> {
    credentials.profile().fetch(datastore).await
}

/// A logged-in user.
///
/// Private keys are zeroized when the session is dropped.
pub struct User {
    username: Username,
    credentials: Credentials,
    encryption: EncryptionKeyPair,
    signing: SigningKeyPair,
    shared: HashMap<String, AccessPointer>,
    datastore: Arc<dyn Datastore>,
    keystore: Arc<dyn Keystore>,
}

impl User {
    /// Assemble a session around freshly generated or loaded keys.
    pub(crate) fn new(
        username: Username,
        credentials: Credentials,
        encryption: EncryptionKeyPair,
        signing: SigningKeyPair,
        shared: HashMap<String, AccessPointer>,
        datastore: Arc<dyn Datastore>,
        keystore: Arc<dyn Keystore>,
    ) -> Self {
        Self {
            username,
            credentials,
            encryption,
            signing,
            shared,
            datastore,
            keystore,
        }
    }

    /// Assemble a session from a verified profile record.
    pub(crate) fn from_profile(
        credentials: Credentials,
        mut profile: ProfileRecord,
        datastore: Arc<dyn Datastore>,
        keystore: Arc<dyn Keystore>,
    ) -> Self {
        let encryption = EncryptionKeyPair::from_secret_bytes(profile.encryption_secret);
        let signing = SigningKeyPair::from_seed(profile.signing_seed);
        let shared = std::mem::take(&mut profile.shared);
        Self::new(
            profile.username.clone(),
            credentials,
            encryption,
            signing,
            shared,
            datastore,
            keystore,
        )
    }

    /// Get the username.
    pub fn username(&self) -> &Username {
        &self.username
    }

    /// Local names of the files shared with this user, sorted.
    ///
    /// These are the names chosen when receiving, kept in this user's own
    /// profile. Owned files sit at locations derived from their names and
    /// cannot be enumerated.
    pub fn shared_files(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.shared.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Public half of this user's encryption key.
    pub fn encryption_public_key(&self) -> EncryptionPublicKey {
        self.encryption.public_key()
    }

    /// Public half of this user's signing key.
    pub fn signature_public_key(&self) -> SignaturePublicKey {
        self.signing.public_key()
    }

    /// Re-read the profile, picking up files received by other sessions of
    /// the same user.
    ///
    /// # Errors
    /// - [`Error::Integrity`] if the profile was removed or tampered with
    pub async fn reload(&mut self) -> Result<()> {
        let mut profile = fetch_profile(self.datastore.as_ref(), &self.credentials)
            .await?
            .ok_or_else(|| Error::Integrity("Profile record missing".to_string()))?;
        if profile.username != self.username {
            return Err(Error::Integrity("Profile belongs to another user".to_string()));
        }

        self.shared = std::mem::take(&mut profile.shared);
        debug!(user = %self.username, shared = self.shared.len(), "Profile reloaded");
        Ok(())
    }

    /// Seal and write the profile.
    pub(crate) async fn save_profile(&self) -> Result<()> {
        let profile = ProfileRecord {
            username: self.username.clone(),
            encryption_secret: *self.encryption.secret_bytes(),
            signing_seed: *self.signing.seed(),
            shared: self.shared.clone(),
        };
        self.credentials
            .profile()
            .store(self.datastore.as_ref(), &profile)
            .await
    }

    pub(crate) fn root(&self) -> &RootSecret {
        &self.credentials.root
    }

    pub(crate) fn datastore(&self) -> &dyn Datastore {
        self.datastore.as_ref()
    }

    pub(crate) fn encryption_keys(&self) -> &EncryptionKeyPair {
        &self.encryption
    }

    pub(crate) fn signing_keys(&self) -> &SigningKeyPair {
        &self.signing
    }

    pub(crate) fn shared_pointer(&self, name: &str) -> Option<&AccessPointer> {
        self.shared.get(name)
    }

    pub(crate) fn insert_shared(&mut self, name: &str, pointer: AccessPointer) {
        self.shared.insert(name.to_string(), pointer);
    }

    pub(crate) fn remove_shared(&mut self, name: &str) {
        self.shared.remove(name);
    }

    /// Look up another user's published encryption key.
    ///
    /// # Errors
    /// - [`Error::UnknownUser`] if nothing is published for `user`
    pub(crate) async fn lookup_encryption_key(&self, user: &Username) -> Result<EncryptionPublicKey> {
        let bytes = self
            .keystore
            .get(&user.encryption_key_id())
            .await?
            .ok_or_else(|| Error::UnknownUser(user.to_string()))?;
        EncryptionPublicKey::from_bytes(&bytes)
    }

    /// Look up another user's published signature key.
    ///
    /// # Errors
    /// - [`Error::UnknownUser`] if nothing is published for `user`
    pub(crate) async fn lookup_signature_key(&self, user: &Username) -> Result<SignaturePublicKey> {
        let bytes = self
            .keystore
            .get(&user.signature_key_id())
            .await?
            .ok_or_else(|| Error::UnknownUser(user.to_string()))?;
        SignaturePublicKey::from_bytes(&bytes)
    }
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("username", &self.username)
            .field("shared", &self.shared.len())
            .finish_non_exhaustive()
    }
}
