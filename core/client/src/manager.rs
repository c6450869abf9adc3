//! Account creation and login.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::session::{fetch_profile, Credentials, User};
use sealvault_common::{Error, Result, Username};
use sealvault_crypto::{EncryptionKeyPair, SigningKeyPair};
use sealvault_storage::{Datastore, Keystore};

/// Entry point for creating accounts and logging in.
pub struct Client {
    datastore: Arc<dyn Datastore>,
    keystore: Arc<dyn Keystore>,
    config: ClientConfig,
}

impl Client {
    /// Create a client over the given stores.
    pub fn new(
        datastore: Arc<dyn Datastore>,
        keystore: Arc<dyn Keystore>,
        config: ClientConfig,
    ) -> Self {
        Self {
            datastore,
            keystore,
            config,
        }
    }

    /// Get the client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Create a new account.
    ///
    /// # Preconditions
    /// - Username and password must not be empty
    ///
    /// # Postconditions
    /// - Both public keys are published in the Keystore
    /// - The sealed profile is written to the Datastore
    /// - Returns a logged-in session
    ///
    /// # Errors
    /// - [`Error::AccountExists`] if the username is taken
    /// - [`Error::KeyConflict`] if a Keystore slot was claimed concurrently
    /// - [`Error::InvalidInput`] for an empty username or password
    ///
    /// The Keystore is write-once, so a failure after the encryption key is
    /// published cannot be undone: the name stays taken and a retry fails
    /// with [`Error::AccountExists`].
    pub async fn init_user(&self, username: &str, password: &str) -> Result<User> {
        let username = Username::new(username)?;
        debug!(user = %username, "Creating account");

        let credentials = Credentials::derive(&username, password, &self.config.kdf_params)?;

        if self
            .keystore
            .get(&username.encryption_key_id())
            .await?
            .is_some()
        {
            return Err(Error::AccountExists(username.to_string()));
        }

        let encryption = EncryptionKeyPair::generate();
        let signing = SigningKeyPair::generate();

        self.keystore
            .set(
                &username.encryption_key_id(),
                encryption.public_key().to_bytes().to_vec(),
            )
            .await?;
        self.keystore
            .set(
                &username.signature_key_id(),
                signing.public_key().to_bytes().to_vec(),
            )
            .await?;

        let user = User::new(
            username,
            credentials,
            encryption,
            signing,
            HashMap::new(),
            Arc::clone(&self.datastore),
            Arc::clone(&self.keystore),
        );
        user.save_profile().await?;

        info!(user = %user.username(), "Account created");
        Ok(user)
    }

    /// Log in to an existing account.
    ///
    /// # Postconditions
    /// - The returned session's keys match those published in the Keystore
    ///
    /// # Errors
    /// - [`Error::InvalidCredentials`] for a wrong password, an unknown
    ///   user, or a missing or tampered profile
    /// - [`Error::Integrity`] if the Keystore no longer holds this user's
    ///   public keys
    pub async fn get_user(&self, username: &str, password: &str) -> Result<User> {
        let username = Username::new(username)?;
        debug!(user = %username, "Logging in");

        let credentials = Credentials::derive(&username, password, &self.config.kdf_params)?;

        let profile = match fetch_profile(self.datastore.as_ref(), &credentials).await {
            Ok(Some(profile)) => profile,
            Ok(None) | Err(Error::Integrity(_)) | Err(Error::Serialization(_)) => {
                warn!(user = %username, "Login rejected");
                return Err(Error::InvalidCredentials);
            }
            Err(e) => return Err(e),
        };
        if profile.username != username {
            warn!(user = %username, "Profile belongs to another user");
            return Err(Error::InvalidCredentials);
        }

        let user = User::from_profile(
            credentials,
            profile,
            Arc::clone(&self.datastore),
            Arc::clone(&self.keystore),
        );
        self.verify_published_keys(&user).await?;

        info!(user = %username, "Logged in");
        Ok(user)
    }

    /// Check that the Keystore still publishes this user's public keys.
    async fn verify_published_keys(&self, user: &User) -> Result<()> {
        let username = user.username();

        let encryption = self
            .keystore
            .get(&username.encryption_key_id())
            .await?
            .ok_or_else(|| Error::Integrity(format!("Encryption key of {} missing", username)))?;
        if encryption != user.encryption_public_key().to_bytes() {
            return Err(Error::Integrity(format!(
                "Encryption key of {} was replaced",
                username
            )));
        }

        let signature = self
            .keystore
            .get(&username.signature_key_id())
            .await?
            .ok_or_else(|| Error::Integrity(format!("Signature key of {} missing", username)))?;
        if signature != user.signature_public_key().to_bytes() {
            return Err(Error::Integrity(format!(
                "Signature key of {} was replaced",
                username
            )));
        }

        Ok(())
    }
}
