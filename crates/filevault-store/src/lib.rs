//! # FileVault Store
//!
//! Storage abstraction for FileVault. The core never touches persistence
//! directly; it talks to the surrounding system through two traits:
//!
//! - [`KeyStore`] - envelope records and file cipher bundles
//! - [`BlobStore`] - opaque ciphertext blobs
//!
//! Implementations:
//!
//! - [`SqliteStore`] - SQLite-backed persistence for both traits
//! - [`MemoryStore`] / [`MemoryBlobStore`] - in-memory stores for tests
//!
//! ## Usage
//!
//! ```rust,no_run
//! use filevault_store::{KeyStore, SqliteStore};
//! use filevault_core::FileId;
//!
//! async fn example() {
//!     let store = SqliteStore::open("vault.db").unwrap();
//!     let bundle = store.get_bundle(&FileId::from("file-1")).await.unwrap();
//!     assert!(bundle.is_none());
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **One envelope per pair**: putting an envelope for an existing
//!   (file, recipient) pair supersedes the old one
//! - **Atomic publication**: [`KeyStore::publish_version`] replaces a file's
//!   bundle and its whole envelope set in one step, or changes nothing
//! - **Optimistic versioning**: a publication must advance the file version
//!   by exactly one, so two concurrent rotations cannot both win
//! - **Content addressing**: blobs are keyed by the Blake3 hash of their bytes

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

#[cfg(test)]
mod testutil;

pub use error::{Result, StoreError};
pub use memory::{MemoryBlobStore, MemoryStore};
pub use sqlite::SqliteStore;
pub use traits::{BlobStore, KeyStore, PutResult};
