//! # FileVault Core
//!
//! Pure primitives for FileVault: the AEAD engine, key envelopes and the
//! file cipher.
//!
//! This crate contains no I/O, no storage, no networking. Every operation is
//! parameterized purely by its explicit inputs, so all of it is safe to call
//! concurrently across independent files and recipients.
//!
//! ## Key Types
//!
//! - [`DataEncryptionKey`] - Per-file-version key that encrypts content and name
//! - [`KeyEncryptingKey`] - Key that only ever wraps and unwraps DEKs
//! - [`MasterKeyMaterial`] - The viewer's unwrapped master key
//! - [`Envelope`] - A DEK wrapped for exactly one (file, recipient) pair
//! - [`FileCipherBundle`] - Nonces, encrypted name and blob reference of a file version
//!
//! ## Encryption Model
//!
//! ```text
//!   master key / recipient KEK
//!              │ wrap (AAD = file id + recipient id)
//!              ▼
//!          Envelope ──unwrap──▶ DEK ──seal──▶ content ciphertext + encrypted name
//! ```
//!
//! All key types clear their memory on drop and redact themselves in `Debug`
//! output. Binary values are raw bytes throughout; base64 only appears in the
//! [`transport`] module.

pub mod aead;
pub mod cipher;
pub mod codec;
pub mod envelope;
pub mod error;
pub mod keys;
pub mod transport;
pub mod types;

pub use aead::{open, seal, Nonce, SchemeVersion, Sealed, NONCE_LEN, TAG_LEN};
pub use cipher::{decrypt_file, encrypt_file, rename, DecryptedFile, EncryptedFile, FileCipherBundle};
pub use envelope::{rewrap, unwrap, wrap, Envelope};
pub use error::{CoreError, Result};
pub use keys::{DataEncryptionKey, KeyEncryptingKey, MasterKeyMaterial, KEY_LEN};
pub use transport::{BundleRecord, EnvelopeRecord};
pub use types::{BlobRef, FileId, RecipientId};
