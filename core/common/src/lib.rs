//! Common utilities and types shared across sealvault crates.
//!
//! This module provides the error taxonomy every component reports through
//! and the identifier types used to address the untrusted stores.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{Location, Username, LOCATION_LENGTH};
