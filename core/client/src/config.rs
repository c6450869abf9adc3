//! Client configuration.

use serde::{Deserialize, Serialize};

use sealvault_common::{Error, Result};
use sealvault_crypto::KdfParams;

/// Format version of sealed records, for migration support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatVersion {
    pub major: u32,
    pub minor: u32,
}

impl FormatVersion {
    /// Current record format version.
    pub const CURRENT: Self = Self { major: 1, minor: 0 };

    /// Check if this version is compatible with the current version.
    pub fn is_compatible(&self) -> bool {
        self.major == Self::CURRENT.major
    }
}

impl Default for FormatVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}

/// Deployment-wide client settings.
///
/// Every login must use the KDF parameters the account was created with:
/// they are not stored per user, so changing them locks existing users out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Record format version.
    pub version: FormatVersion,
    /// Argon2id parameters for root key derivation.
    pub kdf_params: KdfParams,
}

impl ClientConfig {
    /// Create a configuration with the given KDF parameters.
    pub fn new(kdf_params: KdfParams) -> Self {
        Self {
            version: FormatVersion::CURRENT,
            kdf_params,
        }
    }

    /// Serialize configuration to JSON bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize configuration from JSON bytes.
    ///
    /// # Errors
    /// - Malformed JSON
    /// - Incompatible format version
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let config: Self =
            serde_json::from_slice(bytes).map_err(|e| Error::Serialization(e.to_string()))?;
        if !config.version.is_compatible() {
            return Err(Error::InvalidInput(format!(
                "Incompatible format version: {:?}",
                config.version
            )));
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_roundtrip() {
        let config = ClientConfig::new(KdfParams::interactive());
        let bytes = config.to_bytes().unwrap();

        assert_eq!(ClientConfig::from_bytes(&bytes).unwrap(), config);
    }

    #[test]
    fn test_default_uses_moderate_kdf() {
        assert_eq!(ClientConfig::default().kdf_params, KdfParams::moderate());
    }

    #[test]
    fn test_incompatible_version_rejected() {
        let mut config = ClientConfig::default();
        config.version = FormatVersion { major: 2, minor: 0 };
        let bytes = config.to_bytes().unwrap();

        assert!(matches!(
            ClientConfig::from_bytes(&bytes),
            Err(Error::InvalidInput(_))
        ));
    }
}
