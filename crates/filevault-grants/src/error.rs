//! Error types for the grants module.

use filevault_core::CoreError;
use filevault_store::StoreError;
use thiserror::Error;

/// Errors that can occur during grant, rotation and key supply operations.
#[derive(Debug, Error)]
pub enum GrantError {
    /// No envelope exists for the (file, recipient) pair.
    #[error("no envelope for recipient {recipient_id} on file {file_id}")]
    EnvelopeNotFound {
        file_id: String,
        recipient_id: String,
    },

    /// The file has no bundle.
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// A bundle already exists for the file.
    #[error("file already exists: {0}")]
    FileExists(String),

    /// Revoking the owner would leave the file unreadable.
    #[error("cannot revoke owner {owner_id} from file {file_id}")]
    CannotRevokeOwner { file_id: String, owner_id: String },

    /// A new envelope set does not include the owner.
    #[error("envelope set for file {file_id} does not include owner {owner_id}")]
    MissingOwnerGrant { file_id: String, owner_id: String },

    /// The same recipient appears twice in a grantee list.
    #[error("duplicate grantee: {0}")]
    DuplicateGrantee(String),

    /// The recipient KEK could not be produced.
    #[error("key supply error: {0}")]
    KeySupply(String),

    /// Cryptographic or metadata error from the core.
    #[error("crypto error: {0}")]
    Crypto(#[from] CoreError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

impl GrantError {
    /// Whether this error is a lost optimistic-concurrency race.
    pub fn is_conflict(&self) -> bool {
        matches!(self, GrantError::Store(StoreError::Conflict { .. }))
    }

    /// Whether this error means the data failed authentication or is malformed.
    pub fn is_integrity_failure(&self) -> bool {
        matches!(self, GrantError::Crypto(e) if e.is_integrity_failure())
    }
}

/// Result type for grant operations.
pub type Result<T> = std::result::Result<T, GrantError>;
