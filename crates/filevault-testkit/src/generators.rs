//! Proptest generators for property-based testing.

use proptest::prelude::*;

use filevault_core::{
    encrypt_file, DataEncryptionKey, EncryptedFile, FileId, KeyEncryptingKey, RecipientId,
    SchemeVersion,
};

/// Generate a file id.
pub fn file_id() -> impl Strategy<Value = FileId> {
    "[a-z0-9][a-z0-9-]{0,23}".prop_map(FileId::new)
}

/// Generate a recipient id.
pub fn recipient_id() -> impl Strategy<Value = RecipientId> {
    "[a-z][a-z0-9_]{0,15}".prop_map(RecipientId::new)
}

/// Generate a set of distinct recipient ids.
pub fn recipient_ids(max: usize) -> impl Strategy<Value = Vec<RecipientId>> {
    prop::collection::btree_set("[a-z][a-z0-9_]{0,15}", 1..=max)
        .prop_map(|names| names.into_iter().map(RecipientId::new).collect())
}

/// Generate a supported scheme.
pub fn scheme() -> impl Strategy<Value = SchemeVersion> {
    prop_oneof![
        Just(SchemeVersion::Aes256Gcm),
        Just(SchemeVersion::ChaCha20Poly1305),
    ]
}

/// Generate a data encryption key.
pub fn data_key() -> impl Strategy<Value = DataEncryptionKey> {
    any::<[u8; 32]>().prop_map(DataEncryptionKey::from_bytes)
}

/// Generate a key-encrypting key.
pub fn kek() -> impl Strategy<Value = KeyEncryptingKey> {
    any::<[u8; 32]>().prop_map(KeyEncryptingKey::from_bytes)
}

/// Generate file content of at most `max_len` bytes.
pub fn content(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// Generate a filename, including non-ASCII names.
pub fn filename() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-zA-Z0-9_ -]{1,24}\\.[a-z]{1,4}",
        "\\PC{0,32}",
    ]
}

/// Parameters for one encrypted upload.
#[derive(Debug, Clone)]
pub struct UploadParams {
    pub file_id: FileId,
    pub owner_id: RecipientId,
    pub version: u64,
    pub content: Vec<u8>,
    pub filename: String,
    pub scheme: SchemeVersion,
    pub dek_bytes: [u8; 32],
}

impl Arbitrary for UploadParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (
            file_id(),
            recipient_id(),
            1u64..=1000,
            content(4096),
            filename(),
            scheme(),
            any::<[u8; 32]>(),
        )
            .prop_map(
                |(file_id, owner_id, version, content, filename, scheme, dek_bytes)| UploadParams {
                    file_id,
                    owner_id,
                    version,
                    content,
                    filename,
                    scheme,
                    dek_bytes,
                },
            )
            .boxed()
    }
}

/// Encrypt the upload described by `params`, returning the DEK used.
pub fn encrypted_from_params(params: &UploadParams) -> (EncryptedFile, DataEncryptionKey) {
    let dek = DataEncryptionKey::from_bytes(params.dek_bytes);
    let encrypted = encrypt_file(
        &params.file_id,
        &params.owner_id,
        params.version,
        &params.content,
        &params.filename,
        &dek,
        params.scheme,
    )
    .expect("encryption of generated params");
    (encrypted, dek)
}
