//! Error types for the vault.

use filevault_core::CoreError;
use filevault_grants::GrantError;
use filevault_store::StoreError;
use thiserror::Error;

use crate::session::SessionError;

/// Errors that can occur during vault operations.
#[derive(Debug, Error)]
pub enum VaultError {
    /// The session is locked or expired.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Grant, rotation or key supply error.
    #[error("grant error: {0}")]
    Grant(#[from] GrantError),

    /// Cryptographic or metadata error.
    #[error("crypto error: {0}")]
    Crypto(#[from] CoreError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// The operation is reserved for the file's owner.
    #[error("{identity} is not the owner of file {file_id}")]
    NotOwner { file_id: String, identity: String },
}

impl VaultError {
    /// Whether the caller simply has no access right now: locked session,
    /// no envelope, no such file, no KEK for the recipient, or not the owner.
    ///
    /// A missing file is reported the same way as a missing grant so callers
    /// cannot probe for the existence of files they were never shared.
    pub fn is_access_denied(&self) -> bool {
        matches!(
            self,
            VaultError::Session(SessionError::Locked)
                | VaultError::Grant(
                    GrantError::EnvelopeNotFound { .. }
                        | GrantError::FileNotFound(_)
                        | GrantError::KeySupply(_)
                )
                | VaultError::NotOwner { .. }
        )
    }

    /// Whether data failed authentication or is malformed.
    pub fn is_integrity_failure(&self) -> bool {
        match self {
            VaultError::Crypto(e) => e.is_integrity_failure(),
            VaultError::Grant(e) => e.is_integrity_failure(),
            _ => false,
        }
    }

    /// Whether a concurrent change won an optimistic-concurrency race.
    pub fn is_conflict(&self) -> bool {
        match self {
            VaultError::Grant(e) => e.is_conflict(),
            VaultError::Store(e) => matches!(e, StoreError::Conflict { .. }),
            _ => false,
        }
    }
}

/// Result type for vault operations.
pub type Result<T> = std::result::Result<T, VaultError>;
