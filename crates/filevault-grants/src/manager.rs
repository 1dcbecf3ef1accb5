//! The grant manager.
//!
//! Owns every structural change to a file's key material: publishing a new
//! upload, granting and revoking access, rotating the DEK, renaming and
//! deleting. Each of these holds the file's lock from [`FileLocks`] for its
//! whole duration, so two changes to one file through this manager never
//! interleave. Managers sharing a store are kept apart by the store itself:
//! versions only advance one at a time and grants are tied to the version
//! they wrap.
//!
//! DEKs exist here only as locals of a single call. They are never cached,
//! logged or returned.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use filevault_core::{
    decrypt_file, rename, unwrap, wrap, BlobRef, CoreError, DataEncryptionKey, EncryptedFile,
    Envelope, FileCipherBundle, FileId, KeyEncryptingKey, RecipientId, SchemeVersion,
};
use filevault_store::{BlobStore, KeyStore, PutResult, StoreError};

use crate::error::{GrantError, Result};
use crate::locks::FileLocks;
use crate::rotation::{plan_rotation, Grantee, RotationPlan};

/// Attempts for a read or grant that keeps losing races with rotations.
const MAX_ATTEMPTS: usize = 4;

/// Outcome of a successful rotation.
#[derive(Debug, Clone)]
pub struct Rotation {
    /// The newly published bundle.
    pub bundle: FileCipherBundle,
    /// The complete new envelope set.
    pub envelopes: Vec<Envelope>,
    /// The bundle that was superseded.
    pub previous: FileCipherBundle,
}

/// A consistent view of one file for one recipient.
#[derive(Clone)]
pub struct FileSnapshot {
    pub bundle: FileCipherBundle,
    pub envelope: Envelope,
    pub ciphertext: Bytes,
}

impl fmt::Debug for FileSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileSnapshot")
            .field("bundle", &self.bundle)
            .field("envelope", &self.envelope)
            .field("ciphertext_len", &self.ciphertext.len())
            .finish()
    }
}

/// Coordinates envelopes, bundles and blobs for every file.
pub struct GrantManager<K: KeyStore, B: BlobStore> {
    keys: Arc<K>,
    blobs: Arc<B>,
    locks: FileLocks,
    scheme: SchemeVersion,
    delete_superseded_blobs: bool,
}

impl<K: KeyStore, B: BlobStore> GrantManager<K, B> {
    /// Create a manager over the given stores.
    ///
    /// New wraps use the default scheme and superseded blobs are deleted.
    pub fn new(keys: Arc<K>, blobs: Arc<B>) -> Self {
        Self {
            keys,
            blobs,
            locks: FileLocks::new(),
            scheme: SchemeVersion::default(),
            delete_superseded_blobs: true,
        }
    }

    /// Set the scheme used for new wraps and rotations.
    pub fn with_scheme(mut self, scheme: SchemeVersion) -> Self {
        self.scheme = scheme;
        self
    }

    /// Set whether blobs of superseded versions are deleted.
    pub fn with_blob_cleanup(mut self, enabled: bool) -> Self {
        self.delete_superseded_blobs = enabled;
        self
    }

    /// The scheme used for new wraps.
    pub fn scheme(&self) -> SchemeVersion {
        self.scheme
    }

    /// The key store.
    pub fn keys(&self) -> &K {
        &self.keys
    }

    /// The blob store.
    pub fn blobs(&self) -> &B {
        &self.blobs
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    /// Get the current bundle of a file.
    pub async fn bundle(&self, file_id: &FileId) -> Result<FileCipherBundle> {
        self.keys
            .get_bundle(file_id)
            .await?
            .ok_or_else(|| GrantError::FileNotFound(file_id.to_string()))
    }

    /// Get the envelope for a (file, recipient) pair.
    pub async fn envelope_for(
        &self,
        file_id: &FileId,
        recipient_id: &RecipientId,
    ) -> Result<Envelope> {
        self.keys
            .get_envelope(file_id, recipient_id)
            .await?
            .ok_or_else(|| envelope_not_found(file_id, recipient_id))
    }

    /// Every recipient that currently holds an envelope for the file.
    pub async fn list_grantees(&self, file_id: &FileId) -> Result<BTreeSet<RecipientId>> {
        self.bundle(file_id).await?;
        let envelopes = self.keys.list_envelopes(file_id).await?;
        Ok(envelopes.into_iter().map(|e| e.recipient_id).collect())
    }

    /// Read the bundle, the recipient's envelope and the ciphertext together.
    ///
    /// The three always belong to the same version, even while a rotation
    /// from another manager over the same stores is in flight. The reads are
    /// optimistic: if the bundle version moved while they ran (or the blob
    /// was collected underneath them) the whole read is retried.
    pub async fn snapshot(
        &self,
        file_id: &FileId,
        recipient_id: &RecipientId,
    ) -> Result<FileSnapshot> {
        let mut attempt = 1;
        loop {
            let bundle = self.bundle(file_id).await?;
            let envelope = self.envelope_for(file_id, recipient_id).await;
            let ciphertext = self.blobs.get_blob(&bundle.blob_ref).await;

            let settled = self.keys.get_bundle(file_id).await?;
            if settled.as_ref().map(|b| b.version) == Some(bundle.version) {
                return Ok(FileSnapshot {
                    bundle,
                    envelope: envelope?,
                    ciphertext: ciphertext?,
                });
            }

            if attempt == MAX_ATTEMPTS {
                return Err(GrantError::Store(StoreError::Conflict {
                    file_id: file_id.to_string(),
                    expected: bundle.version,
                    found: settled.map_or(0, |b| b.version),
                }));
            }
            tracing::debug!(file_id = %file_id, version = bundle.version, attempt, "snapshot raced a rotation");
            attempt += 1;
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Structural changes
    // ─────────────────────────────────────────────────────────────────────────

    /// Publish version 1 of a new file: its blob, bundle and owner envelope.
    ///
    /// # Errors
    /// - [`GrantError::FileExists`] if the file already has a bundle
    /// - [`GrantError::MissingOwnerGrant`] if `owner_envelope` is not the
    ///   owner's envelope for this file
    pub async fn publish_upload(
        &self,
        encrypted: EncryptedFile,
        owner_envelope: Envelope,
    ) -> Result<()> {
        let EncryptedFile { bundle, ciphertext } = encrypted;
        if !owner_envelope.is_for(&bundle.file_id, &bundle.owner_id) {
            return Err(GrantError::MissingOwnerGrant {
                file_id: bundle.file_id.to_string(),
                owner_id: bundle.owner_id.to_string(),
            });
        }

        let _guard = self.locks.acquire(&bundle.file_id).await;

        if self.keys.get_bundle(&bundle.file_id).await?.is_some() {
            return Err(GrantError::FileExists(bundle.file_id.to_string()));
        }

        let stored = self.store_blob(&bundle, ciphertext).await?;
        if let Err(e) = self.keys.publish_version(&bundle, &[owner_envelope]).await {
            self.discard_blob(&bundle.file_id, &stored).await;
            return Err(e.into());
        }

        tracing::info!(
            file_id = %bundle.file_id,
            owner = %bundle.owner_id,
            version = bundle.version,
            "published upload"
        );
        Ok(())
    }

    /// Give `recipient_id` access by wrapping the file's DEK under their KEK.
    ///
    /// The DEK is recovered from `owner_id`'s envelope with `owner_kek`. Any
    /// earlier envelope for the recipient is superseded. Granting to the owner
    /// itself returns the existing owner envelope unchanged.
    ///
    /// The new envelope is written only if the file is still at the version
    /// its DEK was read from. A rotation published by another manager in
    /// between makes the write conflict, and the grant starts over against
    /// the new version.
    ///
    /// # Errors
    /// - [`GrantError::EnvelopeNotFound`] if `owner_id` has no envelope
    /// - [`GrantError::Crypto`] with `AuthenticationFailure` for a wrong or
    ///   stale `owner_kek`
    pub async fn grant_access(
        &self,
        file_id: &FileId,
        owner_id: &RecipientId,
        owner_kek: &KeyEncryptingKey,
        recipient_id: &RecipientId,
        recipient_kek: &KeyEncryptingKey,
    ) -> Result<Envelope> {
        let _guard = self.locks.acquire(file_id).await;

        let mut attempt = 1;
        loop {
            let version = self.bundle(file_id).await?.version;
            let source = self.envelope_for(file_id, owner_id).await?;
            let dek = unwrap(&source, owner_kek)?;
            if recipient_id == owner_id {
                return Ok(source);
            }

            let envelope = wrap(file_id, recipient_id, &dek, recipient_kek, self.scheme)?;
            drop(dek);

            match self.keys.put_envelope(&envelope, version).await {
                Ok(put) => {
                    let superseded = put == PutResult::Superseded;
                    tracing::info!(file_id = %file_id, recipient = %recipient_id, version, superseded, "granted access");
                    return Ok(envelope);
                }
                Err(StoreError::Conflict { .. }) if attempt < MAX_ATTEMPTS => {
                    tracing::debug!(file_id = %file_id, recipient = %recipient_id, attempt, "grant raced a rotation");
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Remove a recipient's envelope. The DEK is not rotated.
    ///
    /// Returns whether an envelope was removed.
    ///
    /// # Errors
    /// - [`GrantError::FileNotFound`] if the file does not exist
    /// - [`GrantError::CannotRevokeOwner`] for the file's owner
    pub async fn revoke_access(
        &self,
        file_id: &FileId,
        recipient_id: &RecipientId,
    ) -> Result<bool> {
        let _guard = self.locks.acquire(file_id).await;

        let bundle = self.bundle(file_id).await?;
        if &bundle.owner_id == recipient_id {
            return Err(GrantError::CannotRevokeOwner {
                file_id: file_id.to_string(),
                owner_id: recipient_id.to_string(),
            });
        }

        let removed = self.keys.delete_envelope(file_id, recipient_id).await?;
        tracing::info!(file_id = %file_id, recipient = %recipient_id, removed, "revoked access");
        Ok(removed)
    }

    /// Re-encrypt a file under `new_dek` for an explicit grantee list.
    ///
    /// The grantee list replaces the current envelope set and must include
    /// the owner. Encryption and every wrap complete before anything is
    /// written; publication is a single store transaction.
    pub async fn rotate_key(
        &self,
        file_id: &FileId,
        plaintext: &[u8],
        filename: &str,
        new_dek: &DataEncryptionKey,
        grantees: &[Grantee],
    ) -> Result<Rotation> {
        let _guard = self.locks.acquire(file_id).await;

        let current = self.bundle(file_id).await?;
        let plan = plan_rotation(&current, plaintext, filename, new_dek, grantees, self.scheme)?;
        self.publish_rotation(current, plan).await
    }

    /// Rotate a file's DEK while keeping its content, name and grantees.
    ///
    /// The current version is decrypted with the owner's envelope and
    /// `owner_kek`; every current grantee's KEK comes from `kek_of`. The
    /// grantee set is read under the file lock, so a grant that completed
    /// earlier is always carried over.
    pub async fn rotate_in_place<F>(
        &self,
        file_id: &FileId,
        owner_kek: &KeyEncryptingKey,
        kek_of: F,
    ) -> Result<Rotation>
    where
        F: Fn(&RecipientId) -> Result<KeyEncryptingKey> + Send + Sync,
    {
        let _guard = self.locks.acquire(file_id).await;

        let current = self.bundle(file_id).await?;
        let owner_envelope = self.envelope_for(file_id, &current.owner_id).await?;
        let ciphertext = self.blobs.get_blob(&current.blob_ref).await?;
        let decrypted = {
            let dek = unwrap(&owner_envelope, owner_kek)?;
            decrypt_file(&current, &ciphertext, &dek)?
        };

        let grantees = self
            .keys
            .list_envelopes(file_id)
            .await?
            .into_iter()
            .map(|e| -> Result<Grantee> {
                let kek = if e.recipient_id == current.owner_id {
                    owner_kek.clone()
                } else {
                    kek_of(&e.recipient_id)?
                };
                Ok(Grantee::new(e.recipient_id, kek))
            })
            .collect::<Result<Vec<_>>>()?;

        let new_dek = DataEncryptionKey::generate();
        let plan = plan_rotation(
            &current,
            &decrypted.content,
            &decrypted.filename,
            &new_dek,
            &grantees,
            self.scheme,
        )?;
        drop(new_dek);
        drop(decrypted);

        self.publish_rotation(current, plan).await
    }

    /// Re-seal a file's name. Content, version and envelopes are unchanged.
    pub async fn rename(
        &self,
        file_id: &FileId,
        recipient_id: &RecipientId,
        kek: &KeyEncryptingKey,
        new_name: &str,
    ) -> Result<FileCipherBundle> {
        let _guard = self.locks.acquire(file_id).await;

        let current = self.bundle(file_id).await?;
        let envelope = self.envelope_for(file_id, recipient_id).await?;
        let renamed = {
            let dek = unwrap(&envelope, kek)?;
            rename(&current, new_name, &dek)?
        };

        self.keys.update_bundle(&renamed).await?;
        tracing::debug!(file_id = %file_id, version = renamed.version, "renamed file");
        Ok(renamed)
    }

    /// Delete a file's bundle, every envelope and its blob.
    ///
    /// Returns the removed bundle.
    pub async fn delete_file(&self, file_id: &FileId) -> Result<FileCipherBundle> {
        let _guard = self.locks.acquire(file_id).await;

        let removed = self
            .keys
            .delete_file(file_id)
            .await?
            .ok_or_else(|| GrantError::FileNotFound(file_id.to_string()))?;
        self.discard_blob(file_id, &removed.blob_ref).await;
        tracing::info!(file_id = %file_id, version = removed.version, "deleted file");
        Ok(removed)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────────

    async fn publish_rotation(
        &self,
        current: FileCipherBundle,
        plan: RotationPlan,
    ) -> Result<Rotation> {
        let RotationPlan {
            bundle,
            ciphertext,
            envelopes,
        } = plan;

        let stored = self.store_blob(&bundle, ciphertext).await?;
        if let Err(e) = self.keys.publish_version(&bundle, &envelopes).await {
            self.discard_blob(&bundle.file_id, &stored).await;
            return Err(e.into());
        }

        if self.delete_superseded_blobs && current.blob_ref != bundle.blob_ref {
            self.discard_blob(&bundle.file_id, &current.blob_ref).await;
        }

        tracing::info!(
            file_id = %bundle.file_id,
            version = bundle.version,
            grantees = envelopes.len(),
            "rotated file key"
        );

        Ok(Rotation {
            bundle,
            envelopes,
            previous: current,
        })
    }

    async fn store_blob(&self, bundle: &FileCipherBundle, ciphertext: Vec<u8>) -> Result<BlobRef> {
        let stored = self.blobs.put_blob(Bytes::from(ciphertext)).await?;
        if stored != bundle.blob_ref {
            self.discard_blob(&bundle.file_id, &stored).await;
            return Err(CoreError::CorruptMetadata(format!(
                "blob store returned {stored} for bundle blob {}",
                bundle.blob_ref
            ))
            .into());
        }
        Ok(stored)
    }

    /// Best-effort blob removal; failures are logged, not returned.
    async fn discard_blob(&self, file_id: &FileId, blob_ref: &BlobRef) {
        if let Err(e) = self.blobs.delete_blob(blob_ref).await {
            tracing::warn!(file_id = %file_id, blob = %blob_ref, error = %e, "failed to delete blob");
        }
    }
}

fn envelope_not_found(file_id: &FileId, recipient_id: &RecipientId) -> GrantError {
    GrantError::EnvelopeNotFound {
        file_id: file_id.to_string(),
        recipient_id: recipient_id.to_string(),
    }
}
