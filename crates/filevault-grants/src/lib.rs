//! # FileVault Grants
//!
//! Access control over encrypted files, expressed as key envelopes.
//!
//! ## Overview
//!
//! A file's DEK is never stored in the clear. Access is the existence of an
//! envelope: the DEK wrapped under one recipient's KEK. Granting access
//! unwraps the DEK with the owner's KEK and wraps it again for the
//! recipient; revoking deletes the recipient's envelope.
//!
//! Revocation alone stops future downloads through the system, but a
//! recipient who kept an old envelope and KEK can still open the current
//! ciphertext. [`GrantManager::rotate_key`] closes that gap by
//! re-encrypting the file under a fresh DEK and publishing a complete new
//! envelope set in one transaction.
//!
//! ## Key Types
//!
//! - [`GrantManager`] - Serialized, per-file structural changes
//! - [`Grantee`] / [`RotationPlan`] - In-memory preparation of a rotation
//! - [`KeySupply`] - Where recipient KEKs come from
//! - [`PairwiseKeySupply`] - Per-member KEKs from X25519 agreement
//! - [`TeamKeySupply`] - KEKs from a shared team secret
//! - [`FileLocks`] - Per-file async lock registry
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use filevault_grants::GrantManager;
//! use filevault_store::{MemoryBlobStore, MemoryStore};
//! use filevault_core::{FileId, KeyEncryptingKey, RecipientId};
//!
//! async fn share(owner_kek: KeyEncryptingKey, bob_kek: KeyEncryptingKey) {
//!     let manager = GrantManager::new(Arc::new(MemoryStore::new()), Arc::new(MemoryBlobStore::new()));
//!     let file = FileId::from("report");
//!     let (alice, bob) = (RecipientId::from("alice"), RecipientId::from("bob"));
//!
//!     manager.grant_access(&file, &alice, &owner_kek, &bob, &bob_kek).await.unwrap();
//!     manager.revoke_access(&file, &bob).await.unwrap();
//! }
//! ```

pub mod agreement;
pub mod error;
pub mod locks;
pub mod manager;
pub mod rotation;
pub mod supply;

pub use agreement::{IdentitySecret, SharedKey, X25519PublicKey};
pub use error::{GrantError, Result};
pub use locks::{FileGuard, FileLocks};
pub use manager::{FileSnapshot, GrantManager, Rotation};
pub use rotation::{plan_rotation, Grantee, RotationPlan};
pub use supply::{kek_for, KekRequest, KeySupply, PairwiseKeySupply, TeamKeySupply};
