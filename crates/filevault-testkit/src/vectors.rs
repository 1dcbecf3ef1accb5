//! Known-answer vectors.
//!
//! Published AES-256-GCM test cases (McGrew and Viega, "The Galois/Counter
//! Mode of Operation", test cases 13 and 14) and the BLAKE3 digest that
//! content addressing relies on. Another implementation reading the same
//! records must reproduce these exactly.

use filevault_core::{open, BlobRef, Nonce, SchemeVersion};

/// A published AEAD test case, stored as hex.
#[derive(Debug, Clone)]
pub struct AeadVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    pub scheme: SchemeVersion,
    pub key: &'static str,
    pub nonce: &'static str,
    pub aad: &'static str,
    pub plaintext: &'static str,
    /// Ciphertext followed by the 16-byte tag.
    pub sealed: &'static str,
}

/// Get all AEAD vectors.
pub fn aead_vectors() -> Vec<AeadVector> {
    const ZERO_KEY: &str = "0000000000000000000000000000000000000000000000000000000000000000";
    const ZERO_NONCE: &str = "000000000000000000000000";

    vec![
        AeadVector {
            name: "AES-256-GCM test case 13 (empty plaintext)",
            scheme: SchemeVersion::Aes256Gcm,
            key: ZERO_KEY,
            nonce: ZERO_NONCE,
            aad: "",
            plaintext: "",
            sealed: "530f8afbc74536b9a963b4f1c4cb738b",
        },
        AeadVector {
            name: "AES-256-GCM test case 14 (one zero block)",
            scheme: SchemeVersion::Aes256Gcm,
            key: ZERO_KEY,
            nonce: ZERO_NONCE,
            aad: "",
            plaintext: "00000000000000000000000000000000",
            sealed: "cea7403d4d606b6e074ec5d3baf39d18d0d1c8a799996bf0265b98b5d48ab919",
        },
    ]
}

/// Decode a vector's fields. Panics on malformed hex in the table.
fn decode(vector: &AeadVector) -> ([u8; 32], Nonce, Vec<u8>, Vec<u8>, Vec<u8>) {
    let key: [u8; 32] = hex::decode(vector.key)
        .expect("vector key hex")
        .try_into()
        .expect("vector key length");
    let nonce: [u8; 12] = hex::decode(vector.nonce)
        .expect("vector nonce hex")
        .try_into()
        .expect("vector nonce length");
    (
        key,
        Nonce::from_bytes(nonce),
        hex::decode(vector.aad).expect("vector aad hex"),
        hex::decode(vector.plaintext).expect("vector plaintext hex"),
        hex::decode(vector.sealed).expect("vector sealed hex"),
    )
}

/// Open every vector with the engine and compare against the expected
/// plaintext. Returns `(name, matches)` for each.
pub fn verify_aead_vectors() -> Vec<(String, bool)> {
    aead_vectors()
        .iter()
        .map(|v| {
            let (key, nonce, aad, plaintext, sealed) = decode(v);
            let matches = open(v.scheme, &key, &nonce, &sealed, &aad)
                .map(|opened| opened == plaintext)
                .unwrap_or(false);
            (v.name.to_string(), matches)
        })
        .collect()
}

/// BLAKE3 of the empty input, the blob reference of an empty blob.
pub const EMPTY_BLOB_REF: &str = "af1349b9f5f9a1a6a0404dea36dcc9499bcb25c9adc112b7cc9a93cae41f3262";

/// Check that content addressing is plain BLAKE3 of the ciphertext.
pub fn verify_blob_ref_vector() -> bool {
    BlobRef::for_ciphertext(b"").to_hex() == EMPTY_BLOB_REF
}

#[cfg(test)]
mod tests {
    use super::*;
    use filevault_core::{CoreError, TAG_LEN};

    #[test]
    fn test_aead_vectors_open() {
        for (name, ok) in verify_aead_vectors() {
            assert!(ok, "vector '{name}' did not open to its plaintext");
        }
    }

    #[test]
    fn test_aead_vectors_reject_flipped_tag() {
        for vector in aead_vectors() {
            let (key, nonce, aad, _, mut sealed) = decode(&vector);
            let last = sealed.len() - 1;
            sealed[last] ^= 0x80;

            assert_eq!(
                open(vector.scheme, &key, &nonce, &sealed, &aad),
                Err(CoreError::AuthenticationFailure),
                "vector '{}'",
                vector.name
            );
        }
    }

    #[test]
    fn test_aead_vectors_reject_foreign_aad() {
        for vector in aead_vectors() {
            let (key, nonce, _, _, sealed) = decode(&vector);
            assert!(open(vector.scheme, &key, &nonce, &sealed, b"filevault").is_err());
        }
    }

    #[test]
    fn test_vector_shapes() {
        for vector in aead_vectors() {
            let (_, _, _, plaintext, sealed) = decode(&vector);
            assert_eq!(sealed.len(), plaintext.len() + TAG_LEN);
        }
    }

    #[test]
    fn test_blob_ref_vector() {
        assert!(verify_blob_ref_vector());
    }
}
