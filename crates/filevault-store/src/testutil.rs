//! Record builders shared by the backend tests.

use filevault_core::{BlobRef, Envelope, FileCipherBundle, FileId, RecipientId};

pub(crate) fn bundle(file: &str, version: u64) -> FileCipherBundle {
    FileCipherBundle {
        file_id: FileId::from(file),
        owner_id: RecipientId::from("alice"),
        version,
        content_iv: vec![1; 12],
        name_iv: vec![2; 12],
        encrypted_name: vec![3; 26],
        scheme_version: 1,
        blob_ref: BlobRef::for_ciphertext(&version.to_be_bytes()),
    }
}

pub(crate) fn envelope(file: &str, recipient: &str) -> Envelope {
    Envelope {
        file_id: FileId::from(file),
        recipient_id: RecipientId::from(recipient),
        wrapped_key: vec![4; 48],
        wrap_iv: vec![5; 12],
        wrap_alg_version: 1,
    }
}
