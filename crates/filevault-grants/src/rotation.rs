//! Key rotation planning.
//!
//! A rotation re-encrypts the file under a fresh DEK and re-wraps that DEK
//! for every grantee. All of that happens in memory here; nothing is written
//! until the finished plan is published as one store transaction.

use std::collections::BTreeSet;
use std::fmt;

use filevault_core::{
    encrypt_file, wrap, DataEncryptionKey, Envelope, FileCipherBundle, KeyEncryptingKey,
    RecipientId, SchemeVersion,
};

use crate::error::{GrantError, Result};

/// A recipient to include in the rotated envelope set.
#[derive(Debug, Clone)]
pub struct Grantee {
    pub recipient_id: RecipientId,
    pub kek: KeyEncryptingKey,
}

impl Grantee {
    /// Create a grantee entry.
    pub fn new(recipient_id: RecipientId, kek: KeyEncryptingKey) -> Self {
        Self { recipient_id, kek }
    }
}

/// The complete result of a rotation, ready to publish.
#[derive(Clone)]
pub struct RotationPlan {
    /// Bundle of the new version (`current.version + 1`).
    pub bundle: FileCipherBundle,
    /// Content ciphertext of the new version.
    pub ciphertext: Vec<u8>,
    /// One envelope per grantee, in grantee order.
    pub envelopes: Vec<Envelope>,
}

impl fmt::Debug for RotationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RotationPlan")
            .field("bundle", &self.bundle)
            .field("ciphertext_len", &self.ciphertext.len())
            .field("envelopes", &self.envelopes.len())
            .finish()
    }
}

/// Build the next version of a file under `new_dek`.
///
/// # Errors
/// - [`GrantError::MissingOwnerGrant`] if the owner is not among `grantees`
/// - [`GrantError::DuplicateGrantee`] if a recipient appears twice
/// - [`GrantError::Crypto`] if any encryption or wrap fails
pub fn plan_rotation(
    current: &FileCipherBundle,
    plaintext: &[u8],
    filename: &str,
    new_dek: &DataEncryptionKey,
    grantees: &[Grantee],
    scheme: SchemeVersion,
) -> Result<RotationPlan> {
    let mut seen = BTreeSet::new();
    for grantee in grantees {
        if !seen.insert(&grantee.recipient_id) {
            return Err(GrantError::DuplicateGrantee(grantee.recipient_id.to_string()));
        }
    }
    if !seen.contains(&current.owner_id) {
        return Err(GrantError::MissingOwnerGrant {
            file_id: current.file_id.to_string(),
            owner_id: current.owner_id.to_string(),
        });
    }

    let encrypted = encrypt_file(
        &current.file_id,
        &current.owner_id,
        current.version + 1,
        plaintext,
        filename,
        new_dek,
        scheme,
    )?;

    let envelopes = grantees
        .iter()
        .map(|g| wrap(&current.file_id, &g.recipient_id, new_dek, &g.kek, scheme))
        .collect::<filevault_core::Result<Vec<_>>>()?;

    Ok(RotationPlan {
        bundle: encrypted.bundle,
        ciphertext: encrypted.ciphertext,
        envelopes,
    })
}
