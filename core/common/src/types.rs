//! Common types used throughout sealvault.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Length of a Datastore location in bytes (128-bit).
pub const LOCATION_LENGTH: usize = 16;

/// Address of a record in the Datastore.
///
/// Locations are either truncated MAC outputs or fresh random values. They
/// never contain a filename or username in the clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Location(Uuid);

impl Location {
    /// Build a location from the leading bytes of a digest.
    ///
    /// # Errors
    /// - Returns error if `digest` is shorter than [`LOCATION_LENGTH`]
    pub fn from_digest(digest: &[u8]) -> crate::Result<Self> {
        let prefix: [u8; LOCATION_LENGTH] = digest
            .get(..LOCATION_LENGTH)
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or_else(|| {
                crate::Error::InvalidInput(format!(
                    "Location digest too short: {} bytes",
                    digest.len()
                ))
            })?;
        Ok(Self(Uuid::from_bytes(prefix)))
    }

    /// Create a location from raw bytes.
    pub fn from_bytes(bytes: [u8; LOCATION_LENGTH]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Generate a fresh, unpredictable location.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the location bytes.
    pub fn as_bytes(&self) -> &[u8; LOCATION_LENGTH] {
        self.0.as_bytes()
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.as_simple())
    }
}

impl FromStr for Location {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| crate::Error::InvalidInput(format!("Invalid location '{}': {}", s, e)))
    }
}

/// Name of an account.
///
/// The username doubles as the KDF salt input and as the Keystore key
/// prefix, so it must be non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Username(String);

impl Username {
    /// Create a new Username.
    ///
    /// # Errors
    /// - Returns error if `name` is empty
    pub fn new(name: impl Into<String>) -> crate::Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(crate::Error::InvalidInput(
                "Username cannot be empty".to_string(),
            ));
        }
        Ok(Self(name))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Keystore key of this user's encryption public key.
    pub fn encryption_key_id(&self) -> String {
        format!("{}enc", self.0)
    }

    /// Keystore key of this user's signature public key.
    pub fn signature_key_id(&self) -> String {
        format!("{}sig", self.0)
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_from_digest_truncates() {
        let digest = [7u8; 32];
        let location = Location::from_digest(&digest).unwrap();
        assert_eq!(location.as_bytes(), &[7u8; LOCATION_LENGTH]);
    }

    #[test]
    fn test_location_from_short_digest_fails() {
        assert!(Location::from_digest(&[1u8; 8]).is_err());
    }

    #[test]
    fn test_location_display_parse() {
        let location = Location::random();
        let parsed: Location = location.to_string().parse().unwrap();
        assert_eq!(parsed, location);
        assert!("not-a-location".parse::<Location>().is_err());
    }

    #[test]
    fn test_random_locations_differ() {
        assert_ne!(Location::random(), Location::random());
    }

    #[test]
    fn test_location_serialization() {
        let location = Location::from_bytes([3u8; LOCATION_LENGTH]);
        let json = serde_json::to_string(&location).unwrap();
        let back: Location = serde_json::from_str(&json).unwrap();
        assert_eq!(back, location);
    }

    #[test]
    fn test_username_empty_fails() {
        assert!(Username::new("").is_err());
    }

    #[test]
    fn test_username_key_ids() {
        let alice = Username::new("alice").unwrap();
        assert_eq!(alice.encryption_key_id(), "aliceenc");
        assert_eq!(alice.signature_key_id(), "alicesig");
    }
}
