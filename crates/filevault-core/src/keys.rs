//! Owned symmetric key types.
//!
//! Every key type here wipes its bytes on drop and prints as `[REDACTED]`.
//! None of them implement `Serialize`: raw keys never leave process memory.

use std::fmt;

use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{CoreError, Result};

/// Length of every symmetric key in bytes (256 bits).
pub const KEY_LEN: usize = 32;

fn random_key() -> [u8; KEY_LEN] {
    let mut bytes = [0u8; KEY_LEN];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

fn key_from_slice(bytes: &[u8], what: &str) -> Result<[u8; KEY_LEN]> {
    bytes.try_into().map_err(|_| {
        CoreError::CorruptMetadata(format!(
            "invalid {what} length: expected {KEY_LEN}, got {}",
            bytes.len()
        ))
    })
}

/// Per-file-version data encryption key.
///
/// Generated exactly once per file version. Cloning is allowed so a grant
/// can wrap a copy; every copy is wiped when dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DataEncryptionKey([u8; KEY_LEN]);

impl DataEncryptionKey {
    /// Generate a fresh random DEK from the OS CSPRNG.
    pub fn generate() -> Self {
        Self(random_key())
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Create from a slice, rejecting anything that is not exactly 32 bytes.
    pub fn try_from_slice(bytes: &[u8]) -> Result<Self> {
        key_from_slice(bytes, "DEK").map(Self)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for DataEncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DataEncryptionKey([REDACTED])")
    }
}

/// Key-encrypting key. Only ever used to wrap or unwrap a DEK.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyEncryptingKey([u8; KEY_LEN]);

impl KeyEncryptingKey {
    /// Generate a random KEK.
    pub fn generate() -> Self {
        Self(random_key())
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Create from a slice, rejecting anything that is not exactly 32 bytes.
    pub fn try_from_slice(bytes: &[u8]) -> Result<Self> {
        key_from_slice(bytes, "KEK").map(Self)
    }

    /// Use the viewer's master key as a KEK for the duration of one operation.
    ///
    /// The returned copy is wiped when it goes out of scope.
    pub fn from_master(master: &MasterKeyMaterial) -> Self {
        Self(master.0)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for KeyEncryptingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeyEncryptingKey([REDACTED])")
    }
}

/// The viewer's unwrapped master key.
///
/// Deliberately not `Clone`: the session key cache owns the only copy.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct MasterKeyMaterial([u8; KEY_LEN]);

impl MasterKeyMaterial {
    /// Create from raw bytes produced by the external key derivation.
    pub const fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Generate a random master key.
    pub fn generate() -> Self {
        Self(random_key())
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for MasterKeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterKeyMaterial([REDACTED])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_keys_differ() {
        let a = DataEncryptionKey::generate();
        let b = DataEncryptionKey::generate();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_debug_is_redacted() {
        let dek = DataEncryptionKey::from_bytes([0x41; KEY_LEN]);
        let kek = KeyEncryptingKey::from_bytes([0x41; KEY_LEN]);
        let master = MasterKeyMaterial::from_bytes([0x41; KEY_LEN]);

        for rendered in [
            format!("{dek:?}"),
            format!("{kek:?}"),
            format!("{master:?}"),
        ] {
            assert!(rendered.contains("REDACTED"));
            assert!(!rendered.contains("41"));
            assert!(!rendered.contains("65"));
        }
    }

    #[test]
    fn test_try_from_slice_length() {
        assert!(DataEncryptionKey::try_from_slice(&[0u8; 32]).is_ok());
        assert!(matches!(
            DataEncryptionKey::try_from_slice(&[0u8; 31]),
            Err(CoreError::CorruptMetadata(_))
        ));
        assert!(KeyEncryptingKey::try_from_slice(&[0u8; 33]).is_err());
    }

    #[test]
    fn test_zeroize_clears_bytes() {
        let mut dek = DataEncryptionKey::from_bytes([0xff; KEY_LEN]);
        dek.zeroize();
        assert_eq!(dek.as_bytes(), &[0u8; KEY_LEN]);
    }

    #[test]
    fn test_kek_from_master_copies_bytes() {
        let master = MasterKeyMaterial::from_bytes([7u8; KEY_LEN]);
        let kek = KeyEncryptingKey::from_master(&master);
        assert_eq!(kek.as_bytes(), master.as_bytes());
    }
}
