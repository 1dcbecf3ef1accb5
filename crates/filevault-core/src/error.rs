//! Error types for FileVault Core.

use thiserror::Error;

/// Errors produced by the cryptographic primitives.
///
/// None of the variants carry key material or plaintext.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Tag mismatch: the ciphertext or wrapped key was corrupted, tampered
    /// with, relabelled, or opened with the wrong key.
    #[error("authentication failed")]
    AuthenticationFailure,

    /// The record was produced by a newer scheme than this build supports.
    #[error("unsupported scheme version {found} (highest supported: {supported})")]
    UnsupportedSchemeVersion { found: u32, supported: u32 },

    /// The record is structurally malformed.
    #[error("corrupt metadata: {0}")]
    CorruptMetadata(String),

    /// Encryption could not be performed.
    #[error("encryption error: {0}")]
    EncryptionError(String),

    /// Record encoding error.
    #[error("encoding error: {0}")]
    EncodingError(String),
}

impl CoreError {
    /// Whether this error indicates damaged or tampered data.
    pub fn is_integrity_failure(&self) -> bool {
        matches!(
            self,
            CoreError::AuthenticationFailure | CoreError::CorruptMetadata(_)
        )
    }
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
