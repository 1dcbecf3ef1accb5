//! Vault configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use filevault_core::SchemeVersion;

/// Configuration for a [`Vault`](crate::Vault).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Scheme for new uploads, grants and rotations. Existing data keeps
    /// whatever scheme it was written with.
    pub scheme: SchemeVersion,

    /// Lock the session this long after unlock. `None` keeps it unlocked
    /// until [`Vault::lock`](crate::Vault::lock) is called.
    pub session_ttl: Option<Duration>,

    /// Delete the ciphertext blob of a version once a rotation supersedes it.
    pub delete_superseded_blobs: bool,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            scheme: SchemeVersion::default(),
            session_ttl: Some(Duration::from_secs(15 * 60)),
            delete_superseded_blobs: true,
        }
    }
}

impl VaultConfig {
    /// Set the scheme for new data.
    pub fn with_scheme(mut self, scheme: SchemeVersion) -> Self {
        self.scheme = scheme;
        self
    }

    /// Set (or remove) the session TTL.
    pub fn with_session_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// Set whether superseded blobs are deleted after rotation.
    pub fn with_blob_cleanup(mut self, enabled: bool) -> Self {
        self.delete_superseded_blobs = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = VaultConfig::default();
        assert_eq!(config.scheme, SchemeVersion::Aes256Gcm);
        assert_eq!(config.session_ttl, Some(Duration::from_secs(900)));
        assert!(config.delete_superseded_blobs);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: VaultConfig = serde_json::from_str(r#"{"scheme": 2}"#).unwrap();
        assert_eq!(config.scheme, SchemeVersion::ChaCha20Poly1305);
        assert!(config.delete_superseded_blobs);

        let rejected = serde_json::from_str::<VaultConfig>(r#"{"scheme": 3}"#);
        assert!(rejected.is_err());
    }
}
