//! SQLite implementation of the store traits.
//!
//! This is the primary storage backend. It uses rusqlite with bundled
//! SQLite, wrapped in async via `tokio::task::spawn_blocking`.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use rusqlite::{params, Connection, OptionalExtension, Transaction};

use filevault_core::{BlobRef, Envelope, FileCipherBundle, FileId, RecipientId};

use crate::error::{Result, StoreError};
use crate::migration::{self, now_millis};
use crate::traits::{check_publication, BlobStore, KeyStore, PutResult};

/// SQLite-based store implementing both [`KeyStore`] and [`BlobStore`].
///
/// Thread-safe via internal Mutex. Every operation runs on the blocking
/// pool so the async runtime is never stalled by disk I/O.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().map_err(|_| StoreError::Poisoned)?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

fn invalid_column(index: usize, name: &str) -> rusqlite::Error {
    rusqlite::Error::InvalidColumnType(index, name.into(), rusqlite::types::Type::Blob)
}

fn row_to_bundle(row: &rusqlite::Row<'_>) -> rusqlite::Result<FileCipherBundle> {
    let blob_ref: Vec<u8> = row.get("blob_ref")?;
    let version: i64 = row.get("version")?;

    Ok(FileCipherBundle {
        file_id: FileId::new(row.get::<_, String>("file_id")?),
        owner_id: RecipientId::new(row.get::<_, String>("owner_id")?),
        version: u64::try_from(version).map_err(|_| invalid_column(2, "version"))?,
        content_iv: row.get("content_iv")?,
        name_iv: row.get("name_iv")?,
        encrypted_name: row.get("encrypted_name")?,
        scheme_version: row.get("scheme_version")?,
        blob_ref: BlobRef::from_bytes(
            blob_ref
                .try_into()
                .map_err(|_| invalid_column(7, "blob_ref"))?,
        ),
    })
}

fn row_to_envelope(row: &rusqlite::Row<'_>) -> rusqlite::Result<Envelope> {
    Ok(Envelope {
        file_id: FileId::new(row.get::<_, String>("file_id")?),
        recipient_id: RecipientId::new(row.get::<_, String>("recipient_id")?),
        wrapped_key: row.get("wrapped_key")?,
        wrap_iv: row.get("wrap_iv")?,
        wrap_alg_version: row.get("wrap_alg_version")?,
    })
}

const BUNDLE_COLUMNS: &str = "file_id, owner_id, version, content_iv, name_iv, \
                              encrypted_name, scheme_version, blob_ref";

const ENVELOPE_COLUMNS: &str = "file_id, recipient_id, wrapped_key, wrap_iv, wrap_alg_version";

fn current_version(tx: &Transaction<'_>, file_id: &FileId) -> Result<Option<u64>> {
    let version: Option<i64> = tx
        .query_row(
            "SELECT version FROM bundles WHERE file_id = ?1",
            params![file_id.as_str()],
            |row| row.get(0),
        )
        .optional()?;

    version
        .map(|v| u64::try_from(v).map_err(|_| StoreError::InvalidData(format!("negative version for {file_id}"))))
        .transpose()
}

fn insert_envelope(tx: &Transaction<'_>, envelope: &Envelope, now: i64) -> Result<()> {
    tx.execute(
        "INSERT OR REPLACE INTO envelopes (
            file_id, recipient_id, wrapped_key, wrap_iv, wrap_alg_version, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            envelope.file_id.as_str(),
            envelope.recipient_id.as_str(),
            envelope.wrapped_key,
            envelope.wrap_iv,
            envelope.wrap_alg_version,
            now,
        ],
    )?;
    Ok(())
}

#[async_trait]
impl KeyStore for SqliteStore {
    async fn get_envelope(
        &self,
        file_id: &FileId,
        recipient_id: &RecipientId,
    ) -> Result<Option<Envelope>> {
        let file_id = file_id.clone();
        let recipient_id = recipient_id.clone();

        self.run(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {ENVELOPE_COLUMNS} FROM envelopes WHERE file_id = ?1 AND recipient_id = ?2"
                ),
                params![file_id.as_str(), recipient_id.as_str()],
                row_to_envelope,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn put_envelope(&self, envelope: &Envelope, version: u64) -> Result<PutResult> {
        let envelope = envelope.clone();

        self.run(move |conn| {
            let tx = conn.transaction()?;

            let found = current_version(&tx, &envelope.file_id)?
                .ok_or_else(|| StoreError::NotFound(format!("file {}", envelope.file_id)))?;
            if found != version {
                return Err(StoreError::Conflict {
                    file_id: envelope.file_id.to_string(),
                    expected: version,
                    found,
                });
            }

            let existing: Option<i64> = tx
                .query_row(
                    "SELECT 1 FROM envelopes WHERE file_id = ?1 AND recipient_id = ?2",
                    params![envelope.file_id.as_str(), envelope.recipient_id.as_str()],
                    |row| row.get(0),
                )
                .optional()?;

            insert_envelope(&tx, &envelope, now_millis())?;
            tx.commit()?;

            Ok(match existing {
                Some(_) => PutResult::Superseded,
                None => PutResult::Inserted,
            })
        })
        .await
    }

    async fn delete_envelope(
        &self,
        file_id: &FileId,
        recipient_id: &RecipientId,
    ) -> Result<bool> {
        let file_id = file_id.clone();
        let recipient_id = recipient_id.clone();

        self.run(move |conn| {
            let removed = conn.execute(
                "DELETE FROM envelopes WHERE file_id = ?1 AND recipient_id = ?2",
                params![file_id.as_str(), recipient_id.as_str()],
            )?;
            Ok(removed > 0)
        })
        .await
    }

    async fn list_envelopes(&self, file_id: &FileId) -> Result<Vec<Envelope>> {
        let file_id = file_id.clone();

        self.run(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ENVELOPE_COLUMNS} FROM envelopes WHERE file_id = ?1 ORDER BY recipient_id"
            ))?;
            let envelopes = stmt
                .query_map(params![file_id.as_str()], row_to_envelope)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(envelopes)
        })
        .await
    }

    async fn get_bundle(&self, file_id: &FileId) -> Result<Option<FileCipherBundle>> {
        let file_id = file_id.clone();

        self.run(move |conn| {
            conn.query_row(
                &format!("SELECT {BUNDLE_COLUMNS} FROM bundles WHERE file_id = ?1"),
                params![file_id.as_str()],
                row_to_bundle,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn update_bundle(&self, bundle: &FileCipherBundle) -> Result<()> {
        let bundle = bundle.clone();

        self.run(move |conn| {
            let tx = conn.transaction()?;

            let found = current_version(&tx, &bundle.file_id)?
                .ok_or_else(|| StoreError::NotFound(format!("file {}", bundle.file_id)))?;
            if found != bundle.version {
                return Err(StoreError::Conflict {
                    file_id: bundle.file_id.to_string(),
                    expected: bundle.version,
                    found,
                });
            }

            tx.execute(
                "UPDATE bundles SET owner_id = ?2, content_iv = ?3, name_iv = ?4,
                    encrypted_name = ?5, scheme_version = ?6, blob_ref = ?7, updated_at = ?8
                 WHERE file_id = ?1",
                params![
                    bundle.file_id.as_str(),
                    bundle.owner_id.as_str(),
                    bundle.content_iv,
                    bundle.name_iv,
                    bundle.encrypted_name,
                    bundle.scheme_version,
                    bundle.blob_ref.as_bytes().as_slice(),
                    now_millis(),
                ],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn publish_version(
        &self,
        bundle: &FileCipherBundle,
        envelopes: &[Envelope],
    ) -> Result<Option<FileCipherBundle>> {
        let bundle = bundle.clone();
        let envelopes = envelopes.to_vec();

        self.run(move |conn| {
            let tx = conn.transaction()?;

            let previous = tx
                .query_row(
                    &format!("SELECT {BUNDLE_COLUMNS} FROM bundles WHERE file_id = ?1"),
                    params![bundle.file_id.as_str()],
                    row_to_bundle,
                )
                .optional()?;
            check_publication(previous.as_ref().map(|b| b.version), &bundle, &envelopes)?;

            let version = i64::try_from(bundle.version)
                .map_err(|_| StoreError::InvalidData("version out of range".into()))?;
            let now = now_millis();

            tx.execute(
                "INSERT OR REPLACE INTO bundles (
                    file_id, owner_id, version, content_iv, name_iv,
                    encrypted_name, scheme_version, blob_ref, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    bundle.file_id.as_str(),
                    bundle.owner_id.as_str(),
                    version,
                    bundle.content_iv,
                    bundle.name_iv,
                    bundle.encrypted_name,
                    bundle.scheme_version,
                    bundle.blob_ref.as_bytes().as_slice(),
                    now,
                ],
            )?;

            tx.execute(
                "DELETE FROM envelopes WHERE file_id = ?1",
                params![bundle.file_id.as_str()],
            )?;
            for envelope in &envelopes {
                insert_envelope(&tx, envelope, now)?;
            }

            // Dropping the transaction on any error above rolls everything back.
            tx.commit()?;
            Ok(previous)
        })
        .await
    }

    async fn delete_file(&self, file_id: &FileId) -> Result<Option<FileCipherBundle>> {
        let file_id = file_id.clone();

        self.run(move |conn| {
            let tx = conn.transaction()?;

            let previous = tx
                .query_row(
                    &format!("SELECT {BUNDLE_COLUMNS} FROM bundles WHERE file_id = ?1"),
                    params![file_id.as_str()],
                    row_to_bundle,
                )
                .optional()?;

            tx.execute("DELETE FROM envelopes WHERE file_id = ?1", params![file_id.as_str()])?;
            tx.execute("DELETE FROM bundles WHERE file_id = ?1", params![file_id.as_str()])?;
            tx.commit()?;

            Ok(previous)
        })
        .await
    }

    async fn list_files(&self) -> Result<Vec<FileId>> {
        self.run(|conn| {
            let mut stmt = conn.prepare("SELECT file_id FROM bundles ORDER BY file_id")?;
            let files = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .map(|r| r.map(FileId::new))
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(files)
        })
        .await
    }
}

#[async_trait]
impl BlobStore for SqliteStore {
    async fn put_blob(&self, data: Bytes) -> Result<BlobRef> {
        self.run(move |conn| {
            let blob_ref = BlobRef::for_ciphertext(&data);
            conn.execute(
                "INSERT OR IGNORE INTO blobs (blob_ref, data, size, stored_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    blob_ref.as_bytes().as_slice(),
                    data.as_ref(),
                    data.len() as i64,
                    now_millis(),
                ],
            )?;
            Ok(blob_ref)
        })
        .await
    }

    async fn get_blob(&self, blob_ref: &BlobRef) -> Result<Bytes> {
        let blob_ref = *blob_ref;

        self.run(move |conn| {
            let data: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT data FROM blobs WHERE blob_ref = ?1",
                    params![blob_ref.as_bytes().as_slice()],
                    |row| row.get(0),
                )
                .optional()?;
            data.map(Bytes::from)
                .ok_or_else(|| StoreError::NotFound(format!("blob {blob_ref}")))
        })
        .await
    }

    async fn delete_blob(&self, blob_ref: &BlobRef) -> Result<bool> {
        let blob_ref = *blob_ref;

        self.run(move |conn| {
            let removed = conn.execute(
                "DELETE FROM blobs WHERE blob_ref = ?1",
                params![blob_ref.as_bytes().as_slice()],
            )?;
            Ok(removed > 0)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{bundle, envelope};

    #[tokio::test]
    async fn test_publish_and_read_back() {
        let store = SqliteStore::open_memory().unwrap();
        let file = FileId::from("f1");
        let published = bundle("f1", 1);

        store
            .publish_version(&published, &[envelope("f1", "bob"), envelope("f1", "alice")])
            .await
            .unwrap();

        assert_eq!(store.get_bundle(&file).await.unwrap().unwrap(), published);
        let recipients: Vec<_> = store
            .list_envelopes(&file)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.recipient_id)
            .collect();
        assert_eq!(recipients, vec![RecipientId::from("alice"), RecipientId::from("bob")]);

        let alice = store.get_envelope(&file, &RecipientId::from("alice")).await.unwrap();
        assert_eq!(alice.unwrap(), envelope("f1", "alice"));
    }

    #[tokio::test]
    async fn test_put_envelope_supersedes() {
        let store = SqliteStore::open_memory().unwrap();
        store.publish_version(&bundle("f1", 1), &[]).await.unwrap();

        assert_eq!(store.put_envelope(&envelope("f1", "carol"), 1).await.unwrap(), PutResult::Inserted);
        assert_eq!(store.put_envelope(&envelope("f1", "carol"), 1).await.unwrap(), PutResult::Superseded);
        assert_eq!(store.list_envelopes(&FileId::from("f1")).await.unwrap().len(), 1);

        let orphan = store.put_envelope(&envelope("ghost", "carol"), 1).await;
        assert!(matches!(orphan, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_put_envelope_for_superseded_version_conflicts() {
        let store = SqliteStore::open_memory().unwrap();
        let file = FileId::from("f1");
        store.publish_version(&bundle("f1", 1), &[envelope("f1", "alice")]).await.unwrap();
        store.publish_version(&bundle("f1", 2), &[envelope("f1", "alice")]).await.unwrap();

        let late = store.put_envelope(&envelope("f1", "bob"), 1).await;
        assert!(matches!(late, Err(StoreError::Conflict { expected: 1, found: 2, .. })));
        assert!(store.get_envelope(&file, &RecipientId::from("bob")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_publication_rolls_back() {
        let store = SqliteStore::open_memory().unwrap();
        let file = FileId::from("f1");
        store
            .publish_version(&bundle("f1", 1), &[envelope("f1", "alice"), envelope("f1", "bob")])
            .await
            .unwrap();

        let conflict = store.publish_version(&bundle("f1", 1), &[envelope("f1", "alice")]).await;
        assert!(matches!(conflict, Err(StoreError::Conflict { expected: 0, found: 1, .. })));

        let foreign = store.publish_version(&bundle("f1", 2), &[envelope("f9", "alice")]).await;
        assert!(matches!(foreign, Err(StoreError::InvalidData(_))));

        assert_eq!(store.get_bundle(&file).await.unwrap().unwrap().version, 1);
        assert_eq!(store.list_envelopes(&file).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_publish_replaces_envelope_set() {
        let store = SqliteStore::open_memory().unwrap();
        let file = FileId::from("f1");
        store
            .publish_version(&bundle("f1", 1), &[envelope("f1", "alice"), envelope("f1", "bob")])
            .await
            .unwrap();

        let previous = store
            .publish_version(&bundle("f1", 2), &[envelope("f1", "alice")])
            .await
            .unwrap();
        assert_eq!(previous.unwrap().version, 1);
        assert!(store.get_envelope(&file, &RecipientId::from("bob")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_bundle_and_delete_file() {
        let store = SqliteStore::open_memory().unwrap();
        let file = FileId::from("f1");
        store.publish_version(&bundle("f1", 1), &[envelope("f1", "alice")]).await.unwrap();

        let mut renamed = bundle("f1", 1);
        renamed.name_iv = vec![8; 12];
        store.update_bundle(&renamed).await.unwrap();
        assert_eq!(store.get_bundle(&file).await.unwrap().unwrap().name_iv, vec![8; 12]);

        let stale = store.update_bundle(&bundle("f1", 2)).await;
        assert!(matches!(stale, Err(StoreError::Conflict { .. })));

        assert_eq!(store.list_files().await.unwrap(), vec![file.clone()]);
        assert!(store.delete_file(&file).await.unwrap().is_some());
        assert!(store.list_envelopes(&file).await.unwrap().is_empty());
        assert!(store.get_bundle(&file).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_blobs() {
        let store = SqliteStore::open_memory().unwrap();
        let data = Bytes::from(vec![0xab; 4096]);

        let blob_ref = store.put_blob(data.clone()).await.unwrap();
        assert_eq!(store.put_blob(data.clone()).await.unwrap(), blob_ref);
        assert_eq!(store.get_blob(&blob_ref).await.unwrap(), data);

        assert!(store.delete_blob(&blob_ref).await.unwrap());
        assert!(matches!(store.get_blob(&blob_ref).await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            store.publish_version(&bundle("f1", 1), &[envelope("f1", "alice")]).await.unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        let file = FileId::from("f1");
        assert_eq!(store.get_bundle(&file).await.unwrap().unwrap().version, 1);
        assert!(store.get_envelope(&file, &RecipientId::from("alice")).await.unwrap().is_some());
    }
}
