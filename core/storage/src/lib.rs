//! Storage interfaces for sealvault.
//!
//! sealvault keeps all durable state in two untrusted services:
//! - a Datastore mapping [`Location`](sealvault_common::Location)s to opaque bytes
//! - a Keystore publishing write-once public keys under string keys
//!
//! # Design Principles
//! - Nothing read from a store is trusted: integrity is enforced by the
//!   sealed record codec in the client, never here
//! - Async operations: all I/O operations are async
//! - Unified error semantics: consistent error types across backends

pub mod local;
pub mod memory;
pub mod provider;

#[cfg(feature = "fault-injection")]
pub mod adversary;

pub use local::{LocalDatastore, LocalKeystore};
pub use memory::{MemoryDatastore, MemoryKeystore};
pub use provider::{Datastore, Keystore};

#[cfg(feature = "fault-injection")]
pub use adversary::{DatastoreAdversary, FaultyDatastore, KeystoreAdversary};
