//! In-memory implementations of the store traits.
//!
//! These are primarily for testing. They have the same semantics as SQLite
//! but keep everything in memory with no persistence.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use bytes::Bytes;

use filevault_core::{BlobRef, Envelope, FileCipherBundle, FileId, RecipientId};

use crate::error::{Result, StoreError};
use crate::traits::{check_publication, BlobStore, KeyStore, PutResult};

/// In-memory key store.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Current bundle per file.
    bundles: BTreeMap<FileId, FileCipherBundle>,

    /// Envelopes per file, keyed by recipient.
    envelopes: HashMap<FileId, BTreeMap<RecipientId, Envelope>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner.read().map_err(|_| StoreError::Poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner.write().map_err(|_| StoreError::Poisoned)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyStore for MemoryStore {
    async fn get_envelope(
        &self,
        file_id: &FileId,
        recipient_id: &RecipientId,
    ) -> Result<Option<Envelope>> {
        let inner = self.read()?;
        Ok(inner
            .envelopes
            .get(file_id)
            .and_then(|by_recipient| by_recipient.get(recipient_id))
            .cloned())
    }

    async fn put_envelope(&self, envelope: &Envelope, version: u64) -> Result<PutResult> {
        let mut inner = self.write()?;

        let found = inner
            .bundles
            .get(&envelope.file_id)
            .map(|b| b.version)
            .ok_or_else(|| StoreError::NotFound(format!("file {}", envelope.file_id)))?;
        if found != version {
            return Err(StoreError::Conflict {
                file_id: envelope.file_id.to_string(),
                expected: version,
                found,
            });
        }

        let previous = inner
            .envelopes
            .entry(envelope.file_id.clone())
            .or_default()
            .insert(envelope.recipient_id.clone(), envelope.clone());

        Ok(match previous {
            Some(_) => PutResult::Superseded,
            None => PutResult::Inserted,
        })
    }

    async fn delete_envelope(
        &self,
        file_id: &FileId,
        recipient_id: &RecipientId,
    ) -> Result<bool> {
        let mut inner = self.write()?;
        let Some(by_recipient) = inner.envelopes.get_mut(file_id) else {
            return Ok(false);
        };

        let removed = by_recipient.remove(recipient_id).is_some();
        if by_recipient.is_empty() {
            inner.envelopes.remove(file_id);
        }
        Ok(removed)
    }

    async fn list_envelopes(&self, file_id: &FileId) -> Result<Vec<Envelope>> {
        let inner = self.read()?;
        Ok(inner
            .envelopes
            .get(file_id)
            .map(|by_recipient| by_recipient.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn get_bundle(&self, file_id: &FileId) -> Result<Option<FileCipherBundle>> {
        let inner = self.read()?;
        Ok(inner.bundles.get(file_id).cloned())
    }

    async fn update_bundle(&self, bundle: &FileCipherBundle) -> Result<()> {
        let mut inner = self.write()?;

        let current = inner
            .bundles
            .get_mut(&bundle.file_id)
            .ok_or_else(|| StoreError::NotFound(format!("file {}", bundle.file_id)))?;

        if current.version != bundle.version {
            return Err(StoreError::Conflict {
                file_id: bundle.file_id.to_string(),
                expected: bundle.version,
                found: current.version,
            });
        }

        *current = bundle.clone();
        Ok(())
    }

    async fn publish_version(
        &self,
        bundle: &FileCipherBundle,
        envelopes: &[Envelope],
    ) -> Result<Option<FileCipherBundle>> {
        let mut inner = self.write()?;

        let current = inner.bundles.get(&bundle.file_id).map(|b| b.version);
        check_publication(current, bundle, envelopes)?;

        // Validation is complete; nothing below can fail.
        let set = envelopes
            .iter()
            .map(|e| (e.recipient_id.clone(), e.clone()))
            .collect();
        inner.envelopes.insert(bundle.file_id.clone(), set);
        Ok(inner.bundles.insert(bundle.file_id.clone(), bundle.clone()))
    }

    async fn delete_file(&self, file_id: &FileId) -> Result<Option<FileCipherBundle>> {
        let mut inner = self.write()?;
        inner.envelopes.remove(file_id);
        Ok(inner.bundles.remove(file_id))
    }

    async fn list_files(&self) -> Result<Vec<FileId>> {
        let inner = self.read()?;
        Ok(inner.bundles.keys().cloned().collect())
    }
}

/// In-memory blob store.
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<BlobRef, Bytes>>,
}

impl MemoryBlobStore {
    /// Create a new empty blob store.
    pub fn new() -> Self {
        Self {
            blobs: RwLock::new(HashMap::new()),
        }
    }

    /// Number of blobs currently held.
    pub fn len(&self) -> usize {
        self.blobs.read().map(|b| b.len()).unwrap_or(0)
    }

    /// Whether the store holds no blobs.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put_blob(&self, data: Bytes) -> Result<BlobRef> {
        let blob_ref = BlobRef::for_ciphertext(&data);
        let mut blobs = self.blobs.write().map_err(|_| StoreError::Poisoned)?;
        blobs.entry(blob_ref).or_insert(data);
        Ok(blob_ref)
    }

    async fn get_blob(&self, blob_ref: &BlobRef) -> Result<Bytes> {
        let blobs = self.blobs.read().map_err(|_| StoreError::Poisoned)?;
        blobs
            .get(blob_ref)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("blob {blob_ref}")))
    }

    async fn delete_blob(&self, blob_ref: &BlobRef) -> Result<bool> {
        let mut blobs = self.blobs.write().map_err(|_| StoreError::Poisoned)?;
        Ok(blobs.remove(blob_ref).is_some())
    }
}
