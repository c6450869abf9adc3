//! Client library for sealvault.
//!
//! This module provides:
//! - Account creation and password login (`Client`)
//! - Owner and recipient file operations on a logged-in `User`
//! - Sharing through signed invitations, and revocation by key rotation
//!
//! # Architecture
//! The client holds no state of its own between logins. Everything durable
//! is sealed and written to the Datastore at locations derived from the
//! user's root secret; public keys are published in the Keystore.

pub mod config;
pub mod files;
pub mod manager;
pub mod records;
pub mod session;
pub mod sharing;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{ClientConfig, FormatVersion};
pub use manager::Client;
pub use records::AccessPointer;
pub use session::User;
pub use sharing::Invitation;
