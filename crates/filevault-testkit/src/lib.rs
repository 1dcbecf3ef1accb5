//! # Filevault Testkit
//!
//! Testing utilities for filevault.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Known-answer vectors**: published AEAD test cases checked against the engine
//! - **Generators**: Proptest strategies for identifiers, keys and file contents
//! - **Fixtures**: Deterministic parties and a shared in-memory deployment
//!
//! ## Known-Answer Vectors
//!
//! ```rust
//! use filevault_testkit::vectors::{aead_vectors, verify_aead_vectors};
//!
//! assert!(!aead_vectors().is_empty());
//! for (name, ok) in verify_aead_vectors() {
//!     assert!(ok, "{name}");
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use filevault_testkit::generators::{encrypted_from_params, UploadParams};
//!
//! proptest! {
//!     #[test]
//!     fn blob_ref_matches_ciphertext(params: UploadParams) {
//!         let (encrypted, _dek) = encrypted_from_params(&params);
//!         prop_assert!(encrypted.bundle.blob_ref.matches(&encrypted.ciphertext));
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use filevault_testkit::fixtures::{multi_party_fixtures, TestDeployment};
//!
//! # async fn demo() -> filevault::Result<()> {
//! let deployment = TestDeployment::new();
//! let parties = multi_party_fixtures(2);
//! let alice = deployment.join(&parties[0]);
//! let bob = deployment.join(&parties[1]);
//!
//! let file = filevault::FileId::from("notes");
//! alice.upload(&file, b"hello", "notes.txt").await?;
//! alice.share(&file, &parties[1].id).await?;
//! assert_eq!(bob.download(&file).await?.content, b"hello");
//! # Ok(())
//! # }
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{multi_party_fixtures, Party, TestDeployment, TestVault};
pub use generators::{encrypted_from_params, UploadParams};
pub use vectors::{aead_vectors, verify_aead_vectors, verify_blob_ref_vector, AeadVector, EMPTY_BLOB_REF};
