//! Shared fixtures for client tests.

use std::sync::Arc;

use crate::config::ClientConfig;
use crate::manager::Client;
use crate::session::{Credentials, User};
use sealvault_common::{Location, Username};
use sealvault_crypto::KdfParams;
use sealvault_storage::{FaultyDatastore, MemoryDatastore, MemoryKeystore};

/// Argon2id parameters cheap enough for unit tests.
pub(crate) fn cheap_kdf() -> KdfParams {
    KdfParams {
        memory_cost: 1024,
        time_cost: 1,
        parallelism: 1,
    }
}

pub(crate) fn password_of(username: &str) -> String {
    format!("{}-password", username)
}

/// Where the profile of an account created by [`TestEnv::user`] lives.
pub(crate) fn profile_location(username: &str) -> Location {
    let name = Username::new(username).unwrap();
    Credentials::derive(&name, &password_of(username), &cheap_kdf())
        .unwrap()
        .profile()
        .location
}

/// A client over in-memory stores, with handles kept for inspection.
///
/// The client writes through `faults`, which passes everything on to
/// `datastore` until a fault is injected.
pub(crate) struct TestEnv {
    pub datastore: MemoryDatastore,
    pub faults: FaultyDatastore,
    pub keystore: MemoryKeystore,
    pub client: Client,
}

impl TestEnv {
    pub(crate) fn new() -> Self {
        let datastore = MemoryDatastore::new();
        let faults = FaultyDatastore::new(datastore.clone());
        let keystore = MemoryKeystore::new();
        let client = Client::new(
            Arc::new(faults.clone()),
            Arc::new(keystore.clone()),
            ClientConfig::new(cheap_kdf()),
        );
        Self {
            datastore,
            faults,
            keystore,
            client,
        }
    }

    /// Create an account whose password is [`password_of`] its name.
    pub(crate) async fn user(&self, username: &str) -> User {
        self.client
            .init_user(username, &password_of(username))
            .await
            .unwrap()
    }

    /// Open a new session for an existing account.
    pub(crate) async fn login(&self, username: &str) -> User {
        self.client
            .get_user(username, &password_of(username))
            .await
            .unwrap()
    }
}
