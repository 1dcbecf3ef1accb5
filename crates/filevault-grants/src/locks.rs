//! Per-file serialization of structural changes.
//!
//! Grants, revocations, rotations, renames and deletes of one file run one
//! at a time; different files proceed in parallel. A file only has a
//! registry entry while someone holds or waits on its lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use filevault_core::FileId;

type Registry = HashMap<FileId, Arc<AsyncMutex<()>>>;

/// Registry of async locks keyed by file id.
#[derive(Debug, Default)]
pub struct FileLocks {
    locks: Mutex<Registry>,
}

/// Exclusive access to one file. Releases the file when dropped.
#[derive(Debug)]
pub struct FileGuard<'a> {
    registry: &'a FileLocks,
    file_id: FileId,
    held: Option<OwnedMutexGuard<()>>,
}

impl FileLocks {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.locks.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Wait for exclusive access to `file_id`.
    pub async fn acquire(&self, file_id: &FileId) -> FileGuard<'_> {
        // Built first so a cancelled wait still cleans up the entry.
        let mut guard = FileGuard {
            registry: self,
            file_id: file_id.clone(),
            held: None,
        };
        let lock = self.registry().entry(file_id.clone()).or_default().clone();
        guard.held = Some(lock.lock_owned().await);
        guard
    }

    /// Number of files with a registry entry.
    pub fn len(&self) -> usize {
        self.registry().len()
    }

    /// Whether the registry has no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for FileGuard<'_> {
    fn drop(&mut self) {
        // Unlock before inspecting the count; waiters clone under the
        // registry mutex, so a count of one means nobody else wants it.
        drop(self.held.take());

        let mut locks = self.registry.registry();
        if locks
            .get(&self.file_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.file_id);
        }
    }
}
