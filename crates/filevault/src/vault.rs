//! The Vault: the upload, download and sharing flow for one identity.
//!
//! A vault pairs a local identity and its session key cache with the grant
//! manager and a key supply. Cryptographic work happens in short synchronous
//! scopes that borrow the master key; the key is never held across an await.

use std::collections::BTreeSet;
use std::sync::Arc;

use filevault_core::{
    decrypt_file, encrypt_file, unwrap, wrap, DataEncryptionKey, DecryptedFile, Envelope,
    FileCipherBundle, FileId, KeyEncryptingKey, MasterKeyMaterial, RecipientId,
};
use filevault_grants::{kek_for, GrantError, GrantManager, KekRequest, KeySupply};
use filevault_store::{BlobStore, KeyStore};

use crate::config::VaultConfig;
use crate::error::{Result, VaultError};
use crate::session::{SessionKeyCache, SessionState};

/// The main Vault struct.
///
/// Provides a unified API for:
/// - Unlocking and locking the session
/// - Uploading and downloading files
/// - Sharing, revoking and rotating keys
/// - Renaming and deleting files
pub struct Vault<K: KeyStore, B: BlobStore> {
    /// The local identity.
    identity: RecipientId,
    /// Master key holder.
    session: SessionKeyCache,
    /// Envelope, bundle and blob coordination.
    grants: GrantManager<K, B>,
    /// Recipient KEK derivation.
    supply: Arc<dyn KeySupply>,
    /// Configuration.
    config: VaultConfig,
}

impl<K: KeyStore, B: BlobStore> Vault<K, B> {
    /// Create a vault for `identity`. The session starts locked.
    pub fn new(
        identity: RecipientId,
        keys: Arc<K>,
        blobs: Arc<B>,
        supply: Arc<dyn KeySupply>,
        config: VaultConfig,
    ) -> Self {
        let grants = GrantManager::new(keys, blobs)
            .with_scheme(config.scheme)
            .with_blob_cleanup(config.delete_superseded_blobs);

        Self {
            identity,
            session: SessionKeyCache::new(config.session_ttl),
            grants,
            supply,
            config,
        }
    }

    /// The local identity.
    pub fn identity(&self) -> &RecipientId {
        &self.identity
    }

    /// The configuration.
    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    /// The grant manager.
    pub fn grants(&self) -> &GrantManager<K, B> {
        &self.grants
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Session
    // ─────────────────────────────────────────────────────────────────────────

    /// Unlock the session with the identity's master key.
    pub fn unlock(&self, master: MasterKeyMaterial) {
        self.session.unlock(master);
    }

    /// Wipe the master key.
    pub fn lock(&self) {
        self.session.clear();
    }

    /// Whether the session is currently unlocked.
    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Files
    // ─────────────────────────────────────────────────────────────────────────

    /// Encrypt and publish a new file owned by this identity.
    ///
    /// A fresh DEK is generated, wrapped under the master key as the owner
    /// envelope and dropped before the upload is published.
    pub async fn upload(
        &self,
        file_id: &FileId,
        plaintext: &[u8],
        filename: &str,
    ) -> Result<FileCipherBundle> {
        let scheme = self.config.scheme;
        let (encrypted, owner_envelope) = self.session.with_key(|master| -> Result<_> {
            let dek = DataEncryptionKey::generate();
            let encrypted =
                encrypt_file(file_id, &self.identity, 1, plaintext, filename, &dek, scheme)?;
            let envelope = wrap(
                file_id,
                &self.identity,
                &dek,
                &KeyEncryptingKey::from_master(master),
                scheme,
            )?;
            Ok((encrypted, envelope))
        })??;

        let bundle = encrypted.bundle.clone();
        self.grants.publish_upload(encrypted, owner_envelope).await?;
        tracing::debug!(file_id = %file_id, scheme = scheme.as_u32(), "uploaded file");
        Ok(bundle)
    }

    /// Decrypt the current version of a file with this identity's envelope.
    ///
    /// # Errors
    /// - `EnvelopeNotFound` (access denied) if the identity holds no envelope
    /// - `Locked` if the session is locked or expired
    /// - `AuthenticationFailure` if the KEK is wrong or anything was tampered with
    pub async fn download(&self, file_id: &FileId) -> Result<DecryptedFile> {
        let snapshot = self.grants.snapshot(file_id, &self.identity).await?;
        let kek = self.kek(file_id, &snapshot.bundle.owner_id, &self.identity)?;

        let dek = unwrap(&snapshot.envelope, &kek)?;
        Ok(decrypt_file(&snapshot.bundle, &snapshot.ciphertext, &dek)?)
    }

    /// Grant `recipient` access to a file this identity owns.
    pub async fn share(&self, file_id: &FileId, recipient: &RecipientId) -> Result<Envelope> {
        self.require_owner(file_id).await?;

        let owner_kek = self.kek(file_id, &self.identity, &self.identity)?;
        let recipient_kek = self.kek(file_id, &self.identity, recipient)?;

        Ok(self
            .grants
            .grant_access(file_id, &self.identity, &owner_kek, recipient, &recipient_kek)
            .await?)
    }

    /// Remove `recipient`'s envelope. Returns whether one existed.
    ///
    /// The file is not re-keyed; follow with [`rotate`](Self::rotate) to
    /// stop a revoked recipient who kept an old envelope.
    pub async fn revoke(&self, file_id: &FileId, recipient: &RecipientId) -> Result<bool> {
        self.require_owner(file_id).await?;
        Ok(self.grants.revoke_access(file_id, recipient).await?)
    }

    /// Re-encrypt a file under a fresh DEK for its current grantees.
    pub async fn rotate(&self, file_id: &FileId) -> Result<FileCipherBundle> {
        self.require_owner(file_id).await?;
        let owner_kek = self.kek(file_id, &self.identity, &self.identity)?;

        let rotation = self
            .grants
            .rotate_in_place(file_id, &owner_kek, |recipient| {
                self.kek(file_id, &self.identity, recipient)
                    .map_err(|e| match e {
                        VaultError::Grant(inner) => inner,
                        other => GrantError::KeySupply(other.to_string()),
                    })
            })
            .await?;

        tracing::debug!(
            file_id = %file_id,
            version = rotation.bundle.version,
            grantees = rotation.envelopes.len(),
            "rotated file key"
        );
        Ok(rotation.bundle)
    }

    /// Change a file's name. Any identity holding an envelope may rename.
    pub async fn rename(&self, file_id: &FileId, new_name: &str) -> Result<FileCipherBundle> {
        let bundle = self.grants.bundle(file_id).await?;
        let kek = self.kek(file_id, &bundle.owner_id, &self.identity)?;
        Ok(self.grants.rename(file_id, &self.identity, &kek, new_name).await?)
    }

    /// Delete a file this identity owns, with every envelope and its blob.
    pub async fn delete(&self, file_id: &FileId) -> Result<()> {
        self.require_owner(file_id).await?;
        self.grants.delete_file(file_id).await?;
        Ok(())
    }

    /// Every recipient holding an envelope for the file.
    pub async fn list_grantees(&self, file_id: &FileId) -> Result<BTreeSet<RecipientId>> {
        Ok(self.grants.list_grantees(file_id).await?)
    }

    /// Every file known to the key store.
    pub async fn list_files(&self) -> Result<Vec<FileId>> {
        Ok(self.grants.keys().list_files().await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────────

    fn kek(
        &self,
        file_id: &FileId,
        owner_id: &RecipientId,
        recipient_id: &RecipientId,
    ) -> Result<KeyEncryptingKey> {
        let request = KekRequest {
            file_id,
            owner_id,
            recipient_id,
            local_id: &self.identity,
        };
        Ok(self
            .session
            .with_key(|master| kek_for(self.supply.as_ref(), master, &request))??)
    }

    async fn require_owner(&self, file_id: &FileId) -> Result<FileCipherBundle> {
        let bundle = self.grants.bundle(file_id).await?;
        if bundle.owner_id != self.identity {
            tracing::debug!(
                file_id = %file_id,
                identity = %self.identity,
                "refused owner-only operation"
            );
            return Err(VaultError::NotOwner {
                file_id: file_id.to_string(),
                identity: self.identity.to_string(),
            });
        }
        Ok(bundle)
    }
}
