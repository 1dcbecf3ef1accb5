//! File cipher: content and filename encryption under a DEK.
//!
//! Content and name are sealed as two independent AEAD operations with
//! independently generated nonces, so a rename never touches the content
//! ciphertext and a content update never reuses the name nonce.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::aead::{self, associated_data, Nonce, SchemeVersion};
use crate::error::{CoreError, Result};
use crate::keys::DataEncryptionKey;
use crate::types::{BlobRef, FileId, RecipientId};

const CONTENT_LABEL: &str = "filevault/content";
const NAME_LABEL: &str = "filevault/name";

/// Durable cipher metadata for one version of a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileCipherBundle {
    /// The file this bundle describes.
    pub file_id: FileId,

    /// Identity whose master key wraps the owner envelope. Authenticated
    /// together with the file id and version.
    pub owner_id: RecipientId,

    /// File version, starting at 1. Incremented on every key rotation.
    pub version: u64,

    /// Nonce of the content seal.
    pub content_iv: Vec<u8>,

    /// Nonce of the filename seal.
    pub name_iv: Vec<u8>,

    /// Sealed UTF-8 filename.
    pub encrypted_name: Vec<u8>,

    /// Scheme revision used for both content and name.
    pub scheme_version: u32,

    /// Where the external storage layer keeps the content ciphertext.
    pub blob_ref: BlobRef,
}

impl FileCipherBundle {
    /// Serialize to CBOR bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| CoreError::EncodingError(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize from CBOR bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes).map_err(|e| CoreError::CorruptMetadata(e.to_string()))
    }
}

/// Output of [`encrypt_file`]: the bundle and the ciphertext blob to store.
#[derive(Debug, Clone)]
pub struct EncryptedFile {
    pub bundle: FileCipherBundle,
    pub ciphertext: Vec<u8>,
}

/// Output of [`decrypt_file`].
#[derive(Clone, PartialEq, Eq)]
pub struct DecryptedFile {
    pub content: Vec<u8>,
    pub filename: String,
}

impl fmt::Debug for DecryptedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecryptedFile")
            .field("content_len", &self.content.len())
            .finish_non_exhaustive()
    }
}

/// Fields every content and name seal is bound to.
fn bound_fields<'a>(file_id: &'a FileId, owner_id: &'a RecipientId, version: &'a [u8; 8]) -> [&'a [u8]; 3] {
    [file_id.as_str().as_bytes(), owner_id.as_str().as_bytes(), version.as_slice()]
}

fn content_aad(scheme: SchemeVersion, file_id: &FileId, owner_id: &RecipientId, version: u64) -> Vec<u8> {
    associated_data(CONTENT_LABEL, scheme, &bound_fields(file_id, owner_id, &version.to_be_bytes()))
}

fn name_aad(scheme: SchemeVersion, file_id: &FileId, owner_id: &RecipientId, version: u64) -> Vec<u8> {
    associated_data(NAME_LABEL, scheme, &bound_fields(file_id, owner_id, &version.to_be_bytes()))
}

/// Encrypt a file's content and name under `dek`.
pub fn encrypt_file(
    file_id: &FileId,
    owner_id: &RecipientId,
    version: u64,
    plaintext: &[u8],
    filename: &str,
    dek: &DataEncryptionKey,
    scheme: SchemeVersion,
) -> Result<EncryptedFile> {
    let content = aead::seal(
        scheme,
        dek.as_bytes(),
        plaintext,
        &content_aad(scheme, file_id, owner_id, version),
    )?;
    let name = aead::seal(
        scheme,
        dek.as_bytes(),
        filename.as_bytes(),
        &name_aad(scheme, file_id, owner_id, version),
    )?;

    let bundle = FileCipherBundle {
        file_id: file_id.clone(),
        owner_id: owner_id.clone(),
        version,
        content_iv: content.nonce.as_bytes().to_vec(),
        name_iv: name.nonce.as_bytes().to_vec(),
        encrypted_name: name.ciphertext,
        scheme_version: scheme.as_u32(),
        blob_ref: BlobRef::for_ciphertext(&content.ciphertext),
    };

    Ok(EncryptedFile {
        bundle,
        ciphertext: content.ciphertext,
    })
}

fn open_name(bundle: &FileCipherBundle, scheme: SchemeVersion, dek: &DataEncryptionKey) -> Result<String> {
    let name_iv = Nonce::try_from_slice(&bundle.name_iv)?;
    let name_bytes = aead::open(
        scheme,
        dek.as_bytes(),
        &name_iv,
        &bundle.encrypted_name,
        &name_aad(scheme, &bundle.file_id, &bundle.owner_id, bundle.version),
    )?;
    String::from_utf8(name_bytes)
        .map_err(|_| CoreError::CorruptMetadata("filename is not valid UTF-8".into()))
}

/// Decrypt a file version's content and name.
///
/// # Errors
/// - [`CoreError::UnsupportedSchemeVersion`] before any decryption is tried
/// - [`CoreError::CorruptMetadata`] for malformed nonces or a non-UTF-8 name
/// - [`CoreError::AuthenticationFailure`] for a wrong DEK or any tampering
pub fn decrypt_file(
    bundle: &FileCipherBundle,
    ciphertext: &[u8],
    dek: &DataEncryptionKey,
) -> Result<DecryptedFile> {
    let scheme = SchemeVersion::from_u32(bundle.scheme_version)?;
    let content_iv = Nonce::try_from_slice(&bundle.content_iv)?;

    let content = aead::open(
        scheme,
        dek.as_bytes(),
        &content_iv,
        ciphertext,
        &content_aad(scheme, &bundle.file_id, &bundle.owner_id, bundle.version),
    )?;
    let filename = open_name(bundle, scheme, dek)?;

    Ok(DecryptedFile { content, filename })
}

/// Re-seal only the filename, with a fresh name nonce.
///
/// The current name is opened first, so a wrong DEK fails with
/// [`CoreError::AuthenticationFailure`] instead of producing an unreadable
/// name. Content, content nonce and blob reference are unchanged.
pub fn rename(
    bundle: &FileCipherBundle,
    new_name: &str,
    dek: &DataEncryptionKey,
) -> Result<FileCipherBundle> {
    let scheme = SchemeVersion::from_u32(bundle.scheme_version)?;
    open_name(bundle, scheme, dek)?;

    let name = aead::seal(
        scheme,
        dek.as_bytes(),
        new_name.as_bytes(),
        &name_aad(scheme, &bundle.file_id, &bundle.owner_id, bundle.version),
    )?;

    Ok(FileCipherBundle {
        name_iv: name.nonce.as_bytes().to_vec(),
        encrypted_name: name.ciphertext,
        ..bundle.clone()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encrypt(plaintext: &[u8], name: &str, dek: &DataEncryptionKey) -> EncryptedFile {
        encrypt_file(
            &FileId::from("f1"),
            &RecipientId::from("owner"),
            1,
            plaintext,
            name,
            dek,
            SchemeVersion::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let dek = DataEncryptionKey::generate();
        let encrypted = encrypt(b"quarterly numbers", "report.pdf", &dek);

        assert_ne!(encrypted.ciphertext, b"quarterly numbers");
        assert!(encrypted.bundle.blob_ref.matches(&encrypted.ciphertext));

        let decrypted = decrypt_file(&encrypted.bundle, &encrypted.ciphertext, &dek).unwrap();
        assert_eq!(decrypted.content, b"quarterly numbers");
        assert_eq!(decrypted.filename, "report.pdf");
    }

    #[test]
    fn test_content_and_name_nonces_independent() {
        let dek = DataEncryptionKey::generate();
        let encrypted = encrypt(b"data", "a.txt", &dek);
        assert_ne!(encrypted.bundle.content_iv, encrypted.bundle.name_iv);
    }

    #[test]
    fn test_wrong_dek_fails() {
        let encrypted = encrypt(b"data", "a.txt", &DataEncryptionKey::generate());
        let result = decrypt_file(&encrypted.bundle, &encrypted.ciphertext, &DataEncryptionKey::generate());
        assert!(matches!(result, Err(CoreError::AuthenticationFailure)));
    }

    #[test]
    fn test_name_swapped_into_content_fails() {
        let dek = DataEncryptionKey::generate();
        let encrypted = encrypt(b"data", "a.txt", &dek);

        let mut bundle = encrypted.bundle.clone();
        bundle.content_iv = bundle.name_iv.clone();
        let result = decrypt_file(&bundle, &encrypted.bundle.encrypted_name, &dek);
        assert!(matches!(result, Err(CoreError::AuthenticationFailure)));
    }

    #[test]
    fn test_bundle_moved_to_other_file_fails() {
        let dek = DataEncryptionKey::generate();
        let encrypted = encrypt(b"data", "a.txt", &dek);

        let mut bundle = encrypted.bundle.clone();
        bundle.file_id = FileId::from("f2");
        let result = decrypt_file(&bundle, &encrypted.ciphertext, &dek);
        assert!(matches!(result, Err(CoreError::AuthenticationFailure)));
    }

    #[test]
    fn test_bundle_relabelled_owner_fails() {
        let dek = DataEncryptionKey::generate();
        let encrypted = encrypt(b"data", "a.txt", &dek);

        let mut bundle = encrypted.bundle.clone();
        bundle.owner_id = RecipientId::from("mallory");
        let result = decrypt_file(&bundle, &encrypted.ciphertext, &dek);
        assert!(matches!(result, Err(CoreError::AuthenticationFailure)));

        let renamed = rename(&bundle, "b.txt", &dek);
        assert!(matches!(renamed, Err(CoreError::AuthenticationFailure)));
    }

    #[test]
    fn test_unsupported_scheme_rejected_first() {
        let dek = DataEncryptionKey::generate();
        let encrypted = encrypt(b"data", "a.txt", &dek);

        let mut bundle = encrypted.bundle.clone();
        bundle.scheme_version = SchemeVersion::LATEST + 1;
        bundle.content_iv.clear();
        let result = decrypt_file(&bundle, &encrypted.ciphertext, &dek);
        assert!(matches!(result, Err(CoreError::UnsupportedSchemeVersion { .. })));
    }

    #[test]
    fn test_invalid_utf8_name_is_corrupt_metadata() {
        let dek = DataEncryptionKey::generate();
        let file_id = FileId::from("f1");
        let encrypted = encrypt(b"data", "a.txt", &dek);

        let scheme = SchemeVersion::default();
        let bad = aead::seal(scheme, dek.as_bytes(), &[0xff, 0xfe, 0xfd], &name_aad(scheme, &file_id, &RecipientId::from("owner"), 1)).unwrap();
        let mut bundle = encrypted.bundle.clone();
        bundle.name_iv = bad.nonce.as_bytes().to_vec();
        bundle.encrypted_name = bad.ciphertext;

        let result = decrypt_file(&bundle, &encrypted.ciphertext, &dek);
        assert!(matches!(result, Err(CoreError::CorruptMetadata(_))));
    }

    #[test]
    fn test_rename_keeps_content() {
        let dek = DataEncryptionKey::generate();
        let encrypted = encrypt(b"payload", "old.txt", &dek);

        let renamed = rename(&encrypted.bundle, "new.txt", &dek).unwrap();
        assert_eq!(renamed.content_iv, encrypted.bundle.content_iv);
        assert_eq!(renamed.blob_ref, encrypted.bundle.blob_ref);
        assert_ne!(renamed.name_iv, encrypted.bundle.name_iv);

        let decrypted = decrypt_file(&renamed, &encrypted.ciphertext, &dek).unwrap();
        assert_eq!(decrypted.filename, "new.txt");
        assert_eq!(decrypted.content, b"payload");
    }

    #[test]
    fn test_rename_with_wrong_dek_fails() {
        let encrypted = encrypt(b"payload", "old.txt", &DataEncryptionKey::generate());
        let result = rename(&encrypted.bundle, "new.txt", &DataEncryptionKey::generate());
        assert!(matches!(result, Err(CoreError::AuthenticationFailure)));
    }

    #[test]
    fn test_bundle_cbor_roundtrip() {
        let encrypted = encrypt(b"x", "x", &DataEncryptionKey::generate());
        let bytes = encrypted.bundle.to_bytes().unwrap();
        assert_eq!(FileCipherBundle::from_bytes(&bytes).unwrap(), encrypted.bundle);
    }
}
