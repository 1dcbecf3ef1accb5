//! JSON transport records.
//!
//! The surrounding system moves envelopes and bundles as JSON with base64
//! binary fields. These records are the only place that encoding exists;
//! converting into [`Envelope`] or [`FileCipherBundle`] validates nonce
//! lengths and blob references so malformed payloads surface as
//! [`CoreError::CorruptMetadata`] at the boundary.

use serde::{Deserialize, Serialize};

use crate::aead::NONCE_LEN;
use crate::cipher::FileCipherBundle;
use crate::codec::base64_bytes;
use crate::envelope::Envelope;
use crate::error::{CoreError, Result};
use crate::types::{BlobRef, FileId, RecipientId};

/// Wire form of an [`Envelope`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeRecord {
    pub file_id: String,
    pub recipient_id: String,
    #[serde(with = "base64_bytes")]
    pub wrapped_key: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub wrap_iv: Vec<u8>,
    pub wrap_alg_version: u32,
}

/// Wire form of a [`FileCipherBundle`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleRecord {
    pub file_id: String,
    pub owner_id: String,
    pub version: u64,
    #[serde(with = "base64_bytes")]
    pub content_iv: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub name_iv: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub encrypted_name: Vec<u8>,
    pub scheme_version: u32,
    /// Hex blob reference.
    pub blob_ref: String,
}

fn check_nonce(field: &str, bytes: &[u8]) -> Result<()> {
    if bytes.len() != NONCE_LEN {
        return Err(CoreError::CorruptMetadata(format!(
            "{field}: expected {NONCE_LEN} bytes, got {}",
            bytes.len()
        )));
    }
    Ok(())
}

impl EnvelopeRecord {
    /// Serialize to a JSON string.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| CoreError::EncodingError(e.to_string()))
    }

    /// Parse from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| CoreError::CorruptMetadata(e.to_string()))
    }
}

impl From<&Envelope> for EnvelopeRecord {
    fn from(envelope: &Envelope) -> Self {
        Self {
            file_id: envelope.file_id.as_str().to_string(),
            recipient_id: envelope.recipient_id.as_str().to_string(),
            wrapped_key: envelope.wrapped_key.clone(),
            wrap_iv: envelope.wrap_iv.clone(),
            wrap_alg_version: envelope.wrap_alg_version,
        }
    }
}

impl TryFrom<EnvelopeRecord> for Envelope {
    type Error = CoreError;

    fn try_from(record: EnvelopeRecord) -> Result<Self> {
        check_nonce("wrapIv", &record.wrap_iv)?;
        Ok(Envelope {
            file_id: FileId::new(record.file_id),
            recipient_id: RecipientId::new(record.recipient_id),
            wrapped_key: record.wrapped_key,
            wrap_iv: record.wrap_iv,
            wrap_alg_version: record.wrap_alg_version,
        })
    }
}

impl BundleRecord {
    /// Serialize to a JSON string.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| CoreError::EncodingError(e.to_string()))
    }

    /// Parse from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| CoreError::CorruptMetadata(e.to_string()))
    }
}

impl From<&FileCipherBundle> for BundleRecord {
    fn from(bundle: &FileCipherBundle) -> Self {
        Self {
            file_id: bundle.file_id.as_str().to_string(),
            owner_id: bundle.owner_id.as_str().to_string(),
            version: bundle.version,
            content_iv: bundle.content_iv.clone(),
            name_iv: bundle.name_iv.clone(),
            encrypted_name: bundle.encrypted_name.clone(),
            scheme_version: bundle.scheme_version,
            blob_ref: bundle.blob_ref.to_hex(),
        }
    }
}

impl TryFrom<BundleRecord> for FileCipherBundle {
    type Error = CoreError;

    fn try_from(record: BundleRecord) -> Result<Self> {
        check_nonce("contentIv", &record.content_iv)?;
        check_nonce("nameIv", &record.name_iv)?;
        let blob_ref = BlobRef::from_hex(&record.blob_ref)
            .map_err(|e| CoreError::CorruptMetadata(format!("blobRef: {e}")))?;

        Ok(FileCipherBundle {
            file_id: FileId::new(record.file_id),
            owner_id: RecipientId::new(record.owner_id),
            version: record.version,
            content_iv: record.content_iv,
            name_iv: record.name_iv,
            encrypted_name: record.encrypted_name,
            scheme_version: record.scheme_version,
            blob_ref,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aead::SchemeVersion;
    use crate::cipher::{decrypt_file, encrypt_file};
    use crate::envelope::{unwrap, wrap};
    use crate::keys::{DataEncryptionKey, KeyEncryptingKey};

    #[test]
    fn test_envelope_record_json_roundtrip_unwraps() {
        let dek = DataEncryptionKey::generate();
        let kek = KeyEncryptingKey::generate();
        let envelope = wrap(&FileId::from("f"), &RecipientId::from("r"), &dek, &kek, SchemeVersion::default()).unwrap();

        let json = EnvelopeRecord::from(&envelope).to_json().unwrap();
        assert!(json.contains("\"wrappedKey\""));
        assert!(json.contains("\"wrapAlgVersion\":1"));

        let parsed = Envelope::try_from(EnvelopeRecord::from_json(&json).unwrap()).unwrap();
        assert_eq!(parsed, envelope);
        assert_eq!(unwrap(&parsed, &kek).unwrap().as_bytes(), dek.as_bytes());
    }

    #[test]
    fn test_short_wrap_iv_rejected() {
        let record = EnvelopeRecord {
            file_id: "f".into(),
            recipient_id: "r".into(),
            wrapped_key: vec![0; 48],
            wrap_iv: vec![0; 8],
            wrap_alg_version: 1,
        };
        assert!(matches!(Envelope::try_from(record), Err(CoreError::CorruptMetadata(_))));
    }

    #[test]
    fn test_bad_base64_rejected() {
        let json = r#"{"fileId":"f","recipientId":"r","wrappedKey":"@@@","wrapIv":"AAAAAAAAAAAAAAAA","wrapAlgVersion":1}"#;
        assert!(matches!(EnvelopeRecord::from_json(json), Err(CoreError::CorruptMetadata(_))));
    }

    #[test]
    fn test_bundle_record_roundtrip_decrypts() {
        let dek = DataEncryptionKey::generate();
        let encrypted = encrypt_file(
            &FileId::from("f"),
            &RecipientId::from("owner"),
            1,
            &[0, 0, 0, 7],
            "zeros.bin",
            &dek,
            SchemeVersion::ChaCha20Poly1305,
        )
        .unwrap();

        let json = BundleRecord::from(&encrypted.bundle).to_json().unwrap();
        let bundle = FileCipherBundle::try_from(BundleRecord::from_json(&json).unwrap()).unwrap();
        assert_eq!(bundle, encrypted.bundle);

        let decrypted = decrypt_file(&bundle, &encrypted.ciphertext, &dek).unwrap();
        assert_eq!(decrypted.content, vec![0, 0, 0, 7]);
    }

    #[test]
    fn test_bad_blob_ref_rejected() {
        let mut record = BundleRecord {
            file_id: "f".into(),
            owner_id: "o".into(),
            version: 1,
            content_iv: vec![0; 12],
            name_iv: vec![1; 12],
            encrypted_name: vec![],
            scheme_version: 1,
            blob_ref: "nothex".into(),
        };
        assert!(matches!(FileCipherBundle::try_from(record.clone()), Err(CoreError::CorruptMetadata(_))));

        record.blob_ref = BlobRef::for_ciphertext(b"x").to_hex();
        record.name_iv = vec![1; 13];
        assert!(matches!(FileCipherBundle::try_from(record), Err(CoreError::CorruptMetadata(_))));
    }
}
