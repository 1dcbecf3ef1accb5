//! # FileVault
//!
//! Envelope encryption and key distribution for shared files.
//!
//! ## Overview
//!
//! Every file version is encrypted under its own random DEK. The DEK is
//! never stored; instead each recipient gets an envelope holding the DEK
//! wrapped under a key only they (and the owner) can derive. Sharing adds an
//! envelope, revoking removes one, and rotating re-encrypts the file under a
//! fresh DEK so that old envelopes stop working.
//!
//! ## Key Concepts
//!
//! - **Session**: the viewer's master key, held in memory between unlock and lock
//! - **Owner envelope**: the DEK wrapped directly under the owner's master key
//! - **Recipient envelope**: the DEK wrapped under a KEK from the [`KeySupply`](grants::KeySupply)
//! - **Rotation**: new DEK, new content ciphertext, new envelope set, one transaction
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use filevault::{Vault, VaultConfig};
//! use filevault::core::{FileId, MasterKeyMaterial, RecipientId};
//! use filevault::grants::PairwiseKeySupply;
//! use filevault::store::SqliteStore;
//!
//! async fn example() {
//!     let store = Arc::new(SqliteStore::open("vault.db").unwrap());
//!     let supply = Arc::new(PairwiseKeySupply::new());
//!     let vault = Vault::new(
//!         RecipientId::from("alice"),
//!         store.clone(),
//!         store,
//!         supply,
//!         VaultConfig::default(),
//!     );
//!
//!     vault.unlock(MasterKeyMaterial::generate());
//!     let file = FileId::from("report");
//!     vault.upload(&file, b"quarterly numbers", "report.pdf").await.unwrap();
//!     let decrypted = vault.download(&file).await.unwrap();
//!     assert_eq!(decrypted.filename, "report.pdf");
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `filevault::core` - AEAD engine, envelopes, file cipher
//! - `filevault::store` - Storage traits, SQLite and in-memory stores
//! - `filevault::grants` - Grant manager, rotation, key supply

pub mod config;
pub mod error;
pub mod session;
pub mod vault;

pub use filevault_core as core;
pub use filevault_grants as grants;
pub use filevault_store as store;

pub use config::VaultConfig;
pub use error::{Result, VaultError};
pub use session::{SessionError, SessionGuard, SessionKeyCache, SessionState};
pub use vault::Vault;

pub use filevault_core::{
    DecryptedFile, Envelope, FileCipherBundle, FileId, MasterKeyMaterial, RecipientId,
    SchemeVersion,
};
