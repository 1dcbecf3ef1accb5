//! Key envelopes.
//!
//! An [`Envelope`] is a DEK sealed under one recipient's KEK. The file id,
//! the recipient id and the wrap algorithm version are bound into the AEAD
//! associated data, so an envelope relabelled to another file or recipient
//! no longer opens.

use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::aead::{self, associated_data, Nonce, SchemeVersion};
use crate::error::{CoreError, Result};
use crate::keys::{DataEncryptionKey, KeyEncryptingKey};
use crate::types::{FileId, RecipientId};

const ENVELOPE_LABEL: &str = "filevault/envelope";

/// "`recipient_id` can unwrap this file's DEK using their own KEK."
///
/// At most one envelope is active per (file, recipient) pair.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// The file whose DEK is wrapped.
    pub file_id: FileId,

    /// Who can unwrap it.
    pub recipient_id: RecipientId,

    /// The sealed DEK (ciphertext with tag).
    pub wrapped_key: Vec<u8>,

    /// Nonce used for the wrap. Validated to be 12 bytes on unwrap.
    pub wrap_iv: Vec<u8>,

    /// Scheme revision of the wrap.
    pub wrap_alg_version: u32,
}

impl Envelope {
    /// Whether this envelope is addressed to the given pair.
    pub fn is_for(&self, file_id: &FileId, recipient_id: &RecipientId) -> bool {
        &self.file_id == file_id && &self.recipient_id == recipient_id
    }

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

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("file_id", &self.file_id)
            .field("recipient_id", &self.recipient_id)
            .field("wrapped_key_len", &self.wrapped_key.len())
            .field("wrap_alg_version", &self.wrap_alg_version)
            .finish()
    }
}

fn binding(scheme: SchemeVersion, file_id: &FileId, recipient_id: &RecipientId) -> Vec<u8> {
    associated_data(
        ENVELOPE_LABEL,
        scheme,
        &[file_id.as_str().as_bytes(), recipient_id.as_str().as_bytes()],
    )
}

/// Wrap `dek` under `kek` for the given file and recipient.
pub fn wrap(
    file_id: &FileId,
    recipient_id: &RecipientId,
    dek: &DataEncryptionKey,
    kek: &KeyEncryptingKey,
    scheme: SchemeVersion,
) -> Result<Envelope> {
    let aad = binding(scheme, file_id, recipient_id);
    let sealed = aead::seal(scheme, kek.as_bytes(), dek.as_bytes(), &aad)?;

    Ok(Envelope {
        file_id: file_id.clone(),
        recipient_id: recipient_id.clone(),
        wrapped_key: sealed.ciphertext,
        wrap_iv: sealed.nonce.as_bytes().to_vec(),
        wrap_alg_version: scheme.as_u32(),
    })
}

/// Recover the DEK from an envelope with the recipient's KEK.
///
/// # Errors
/// - [`CoreError::UnsupportedSchemeVersion`] for envelopes from a newer build
/// - [`CoreError::CorruptMetadata`] for a malformed nonce or payload length
/// - [`CoreError::AuthenticationFailure`] for a wrong KEK or any tampering,
///   including relabelling the file or recipient id
pub fn unwrap(envelope: &Envelope, kek: &KeyEncryptingKey) -> Result<DataEncryptionKey> {
    let scheme = SchemeVersion::from_u32(envelope.wrap_alg_version)?;
    let nonce = Nonce::try_from_slice(&envelope.wrap_iv)?;
    let aad = binding(scheme, &envelope.file_id, &envelope.recipient_id);

    let mut plaintext = aead::open(scheme, kek.as_bytes(), &nonce, &envelope.wrapped_key, &aad)?;
    let dek = DataEncryptionKey::try_from_slice(&plaintext);
    plaintext.zeroize();
    dek
}

/// Unwrap `source` and wrap the same DEK for another recipient of the file.
///
/// The intermediate DEK is wiped before this function returns.
pub fn rewrap(
    source: &Envelope,
    source_kek: &KeyEncryptingKey,
    recipient_id: &RecipientId,
    recipient_kek: &KeyEncryptingKey,
    scheme: SchemeVersion,
) -> Result<Envelope> {
    let dek = unwrap(source, source_kek)?;
    wrap(&source.file_id, recipient_id, &dek, recipient_kek, scheme)
}
