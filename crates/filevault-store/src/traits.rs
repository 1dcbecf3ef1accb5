//! Store traits: the abstract interface for key material and blob persistence.
//!
//! The grant manager is storage-agnostic. Implementations include SQLite
//! (primary) and in-memory (for tests).

use async_trait::async_trait;
use bytes::Bytes;
use filevault_core::{BlobRef, Envelope, FileCipherBundle, FileId, RecipientId};

use crate::error::Result;

/// Result of storing an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutResult {
    /// No envelope existed for the pair.
    Inserted,
    /// An earlier envelope for the same pair was replaced.
    Superseded,
}

/// Persistence for envelopes and file cipher bundles.
///
/// # Design Notes
///
/// - **Pair uniqueness**: there is at most one envelope per (file, recipient).
/// - **Bundle first**: envelopes can only be stored for a file that has a
///   bundle; [`KeyStore::put_envelope`] returns `NotFound` otherwise.
/// - **Version-conditional grants**: [`KeyStore::put_envelope`] names the
///   file version its DEK belongs to and fails with `Conflict` once a newer
///   version is published, so a late writer cannot leave a stale envelope.
/// - **Atomic versions**: [`KeyStore::publish_version`] swaps the bundle and
///   the complete envelope set together. Readers never observe a new bundle
///   with old envelopes or the reverse.
#[async_trait]
pub trait KeyStore: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Envelope Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Get the envelope for a (file, recipient) pair.
    async fn get_envelope(
        &self,
        file_id: &FileId,
        recipient_id: &RecipientId,
    ) -> Result<Option<Envelope>>;

    /// Store an envelope, replacing any existing one for the same pair.
    ///
    /// `version` is the file version whose DEK the envelope wraps. The write
    /// fails with `Conflict` if the stored bundle has a different version.
    async fn put_envelope(&self, envelope: &Envelope, version: u64) -> Result<PutResult>;

    /// Delete the envelope for a pair. Returns whether one existed.
    ///
    /// Unconditional: removing access is never stale.
    async fn delete_envelope(&self, file_id: &FileId, recipient_id: &RecipientId)
        -> Result<bool>;

    /// List every envelope of a file, ordered by recipient id.
    async fn list_envelopes(&self, file_id: &FileId) -> Result<Vec<Envelope>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Bundle Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Get the current bundle of a file.
    async fn get_bundle(&self, file_id: &FileId) -> Result<Option<FileCipherBundle>>;

    /// Overwrite the current bundle without changing the version.
    ///
    /// Used for renames. Fails with `NotFound` if the file does not exist and
    /// with `Conflict` if the stored version differs from `bundle.version`.
    async fn update_bundle(&self, bundle: &FileCipherBundle) -> Result<()>;

    /// Publish a new file version: replace the bundle and the whole envelope
    /// set in a single atomic step.
    ///
    /// `bundle.version` must be exactly one more than the stored version
    /// (or 1 for a new file). Every envelope must belong to `bundle.file_id`.
    ///
    /// # Returns
    /// The bundle that was superseded, if any.
    async fn publish_version(
        &self,
        bundle: &FileCipherBundle,
        envelopes: &[Envelope],
    ) -> Result<Option<FileCipherBundle>>;

    /// Delete a file's bundle and all its envelopes.
    ///
    /// # Returns
    /// The bundle that was removed, if the file existed.
    async fn delete_file(&self, file_id: &FileId) -> Result<Option<FileCipherBundle>>;

    /// List every file with a bundle, ordered by id.
    async fn list_files(&self) -> Result<Vec<FileId>>;
}

/// Content-addressed storage for ciphertext blobs.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store a blob, returning its content address. Idempotent.
    async fn put_blob(&self, data: Bytes) -> Result<BlobRef>;

    /// Fetch a blob. Returns `NotFound` if it does not exist.
    async fn get_blob(&self, blob_ref: &BlobRef) -> Result<Bytes>;

    /// Delete a blob. Returns whether it existed.
    async fn delete_blob(&self, blob_ref: &BlobRef) -> Result<bool>;
}

/// Check the version step and envelope ownership of a publication.
///
/// Shared by every [`KeyStore`] implementation so they reject the same inputs.
pub(crate) fn check_publication(
    current: Option<u64>,
    bundle: &FileCipherBundle,
    envelopes: &[Envelope],
) -> Result<()> {
    use crate::error::StoreError;

    let found = current.unwrap_or(0);
    let expected = bundle.version.checked_sub(1).ok_or_else(|| {
        StoreError::InvalidData("file versions start at 1".into())
    })?;
    if found != expected {
        return Err(StoreError::Conflict {
            file_id: bundle.file_id.to_string(),
            expected,
            found,
        });
    }

    if let Some(stray) = envelopes.iter().find(|e| e.file_id != bundle.file_id) {
        return Err(StoreError::InvalidData(format!(
            "envelope for {} published with {}",
            stray.file_id, bundle.file_id
        )));
    }

    for (i, envelope) in envelopes.iter().enumerate() {
        if envelopes[..i]
            .iter()
            .any(|e| e.recipient_id == envelope.recipient_id)
        {
            return Err(StoreError::InvalidData(format!(
                "duplicate envelope for {}",
                envelope.recipient_id
            )));
        }
    }

    Ok(())
}
