//! The AEAD engine.
//!
//! Authenticated encryption of arbitrary byte buffers under a 256-bit key and
//! a 96-bit nonce. Nonces are drawn from the OS CSPRNG inside [`seal`]; no
//! public function accepts a caller-chosen nonce for sealing, so a nonce can
//! never be reused by accident.
//!
//! Two algorithms are registered, identified by their scheme version:
//!
//! | Version | Algorithm | Key | Nonce | Tag |
//! |---|---|---|---|---|
//! | 1 | AES-256-GCM | 32 | 12 | 16 |
//! | 2 | ChaCha20-Poly1305 | 32 | 12 | 16 |

use aes_gcm::Aes256Gcm;
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305,
};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::keys::KEY_LEN;

/// Nonce length in bytes (96 bits).
pub const NONCE_LEN: usize = 12;

/// Authentication tag length in bytes.
pub const TAG_LEN: usize = 16;

/// Algorithm revision recorded in every envelope and bundle.
///
/// Serializes as its numeric form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum SchemeVersion {
    /// AES-256-GCM.
    #[default]
    Aes256Gcm,
    /// ChaCha20-Poly1305.
    ChaCha20Poly1305,
}

impl SchemeVersion {
    /// Highest scheme version this build understands.
    pub const LATEST: u32 = 2;

    /// Numeric form stored in records.
    pub const fn as_u32(self) -> u32 {
        match self {
            SchemeVersion::Aes256Gcm => 1,
            SchemeVersion::ChaCha20Poly1305 => 2,
        }
    }

    /// Parse the numeric form stored in a record.
    ///
    /// Zero is never written by any version and is treated as corruption;
    /// anything above [`Self::LATEST`] was written by a newer implementation.
    pub fn from_u32(version: u32) -> Result<Self> {
        match version {
            1 => Ok(SchemeVersion::Aes256Gcm),
            2 => Ok(SchemeVersion::ChaCha20Poly1305),
            0 => Err(CoreError::CorruptMetadata(
                "scheme version 0 is not a valid record".into(),
            )),
            found => Err(CoreError::UnsupportedSchemeVersion {
                found,
                supported: Self::LATEST,
            }),
        }
    }
}

impl TryFrom<u32> for SchemeVersion {
    type Error = CoreError;

    fn try_from(version: u32) -> Result<Self> {
        Self::from_u32(version)
    }
}

impl From<SchemeVersion> for u32 {
    fn from(scheme: SchemeVersion) -> Self {
        scheme.as_u32()
    }
}

/// A 96-bit AEAD nonce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Nonce([u8; NONCE_LEN]);

impl Nonce {
    /// Draw a fresh nonce from the OS CSPRNG.
    pub(crate) fn generate() -> Self {
        let mut bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes read back from a record.
    pub const fn from_bytes(bytes: [u8; NONCE_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse a nonce read from a record, rejecting wrong lengths.
    pub fn try_from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; NONCE_LEN] = bytes.try_into().map_err(|_| {
            CoreError::CorruptMetadata(format!(
                "invalid nonce length: expected {NONCE_LEN}, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(arr))
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; NONCE_LEN] {
        &self.0
    }
}

/// Output of [`seal`]: the nonce that was used and `ciphertext || tag`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    /// The freshly generated nonce. Must be stored alongside the ciphertext.
    pub nonce: Nonce,
    /// Ciphertext with the 16-byte tag appended.
    pub ciphertext: Vec<u8>,
}

/// Encrypt and authenticate `plaintext`, binding `aad`.
pub fn seal(
    scheme: SchemeVersion,
    key: &[u8; KEY_LEN],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<Sealed> {
    let nonce = Nonce::generate();
    let payload = Payload {
        msg: plaintext,
        aad,
    };

    let ciphertext = match scheme {
        SchemeVersion::Aes256Gcm => Aes256Gcm::new_from_slice(key)
            .map_err(|e| CoreError::EncryptionError(e.to_string()))?
            .encrypt(aes_gcm::Nonce::from_slice(nonce.as_bytes()), payload),
        SchemeVersion::ChaCha20Poly1305 => ChaCha20Poly1305::new_from_slice(key)
            .map_err(|e| CoreError::EncryptionError(e.to_string()))?
            .encrypt(chacha20poly1305::Nonce::from_slice(nonce.as_bytes()), payload),
    }
    .map_err(|e| CoreError::EncryptionError(e.to_string()))?;

    Ok(Sealed { nonce, ciphertext })
}

/// Verify and decrypt `ciphertext || tag`.
///
/// Fails closed: a truncated input, a tag mismatch, a wrong key, a wrong
/// nonce or different `aad` all return [`CoreError::AuthenticationFailure`].
pub fn open(
    scheme: SchemeVersion,
    key: &[u8; KEY_LEN],
    nonce: &Nonce,
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>> {
    if ciphertext.len() < TAG_LEN {
        return Err(CoreError::AuthenticationFailure);
    }

    let payload = Payload {
        msg: ciphertext,
        aad,
    };

    let opened = match scheme {
        SchemeVersion::Aes256Gcm => Aes256Gcm::new_from_slice(key)
            .map_err(|_| CoreError::AuthenticationFailure)?
            .decrypt(aes_gcm::Nonce::from_slice(nonce.as_bytes()), payload),
        SchemeVersion::ChaCha20Poly1305 => ChaCha20Poly1305::new_from_slice(key)
            .map_err(|_| CoreError::AuthenticationFailure)?
            .decrypt(chacha20poly1305::Nonce::from_slice(nonce.as_bytes()), payload),
    };

    opened.map_err(|_| CoreError::AuthenticationFailure)
}

/// Build associated data from a domain label, the scheme version and a list
/// of length-prefixed fields.
///
/// Length prefixes keep `("ab", "c")` and `("a", "bc")` distinct.
pub(crate) fn associated_data(label: &str, scheme: SchemeVersion, fields: &[&[u8]]) -> Vec<u8> {
    let capacity = label.len() + 4 + fields.iter().map(|f| f.len() + 4).sum::<usize>();
    let mut aad = Vec::with_capacity(capacity);
    aad.extend_from_slice(label.as_bytes());
    aad.extend_from_slice(&scheme.as_u32().to_be_bytes());
    for field in fields {
        aad.extend_from_slice(&(field.len() as u32).to_be_bytes());
        aad.extend_from_slice(field);
    }
    aad
}
