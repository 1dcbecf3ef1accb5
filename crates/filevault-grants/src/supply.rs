//! Key supply: where recipient KEKs come from.
//!
//! The grant manager only moves DEKs between KEKs; it does not decide how a
//! recipient's KEK is obtained. That decision sits behind [`KeySupply`].
//!
//! ## Strategies
//!
//! - [`PairwiseKeySupply`] - every (file, owner, recipient) triple gets its own
//!   KEK from an X25519 agreement between owner and recipient. Revoking one
//!   member reveals nothing about any other member's KEK.
//! - [`TeamKeySupply`] - every member holds one team secret and the KEK is a
//!   keyed hash of (file, recipient) under it. Simpler to provision, but a
//!   revoked member who kept the secret can still derive other members' KEKs.
//!
//! The owner's own envelope never goes through a supply; it is always wrapped
//! directly under the master key (see [`kek_for`]).

use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

use zeroize::{Zeroize, ZeroizeOnDrop};

use filevault_core::{FileId, KeyEncryptingKey, MasterKeyMaterial, RecipientId};

use crate::agreement::{update_prefixed, IdentitySecret, X25519PublicKey};
use crate::error::{GrantError, Result};

const TEAM_KEK_LABEL: &[u8] = b"filevault/team-kek";

/// Which KEK is being asked for, and by whom.
#[derive(Debug, Clone, Copy)]
pub struct KekRequest<'a> {
    /// The file the KEK protects.
    pub file_id: &'a FileId,
    /// The file's owner.
    pub owner_id: &'a RecipientId,
    /// The envelope's recipient.
    pub recipient_id: &'a RecipientId,
    /// The identity whose master key is supplied.
    pub local_id: &'a RecipientId,
}

/// Produces the KEK shared by a file's owner and one recipient.
pub trait KeySupply: Send + Sync {
    /// Derive the KEK for `request` using the local identity's master key.
    fn recipient_kek(
        &self,
        master: &MasterKeyMaterial,
        request: &KekRequest<'_>,
    ) -> Result<KeyEncryptingKey>;
}

/// Resolve the KEK for any envelope of a file.
///
/// The owner's own envelope uses the master key directly; every other
/// recipient goes through `supply`.
pub fn kek_for(
    supply: &dyn KeySupply,
    master: &MasterKeyMaterial,
    request: &KekRequest<'_>,
) -> Result<KeyEncryptingKey> {
    if request.recipient_id == request.owner_id {
        if request.local_id != request.owner_id {
            return Err(GrantError::KeySupply(format!(
                "only {} can open the owner envelope",
                request.owner_id
            )));
        }
        return Ok(KeyEncryptingKey::from_master(master));
    }
    supply.recipient_kek(master, request)
}

/// Per-member KEKs from X25519 agreement.
///
/// Holds a directory of published identity public keys. Register every
/// identity with [`PairwiseKeySupply::register`] before sharing with it.
#[derive(Default)]
pub struct PairwiseKeySupply {
    directory: RwLock<HashMap<RecipientId, X25519PublicKey>>,
}

impl PairwiseKeySupply {
    /// Create a supply with an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// The public key an identity should publish for its master key.
    pub fn public_key_for(master: &MasterKeyMaterial) -> X25519PublicKey {
        IdentitySecret::from_master(master).public_key()
    }

    /// Publish (or replace) an identity's public key.
    pub fn register(&self, identity: RecipientId, public_key: X25519PublicKey) {
        let mut directory = self
            .directory
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        directory.insert(identity, public_key);
    }

    /// Look up a published public key.
    pub fn public_key(&self, identity: &RecipientId) -> Option<X25519PublicKey> {
        let directory = self
            .directory
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        directory.get(identity).copied()
    }
}

impl fmt::Debug for PairwiseKeySupply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self.directory.read().map(|d| d.len()).unwrap_or(0);
        f.debug_struct("PairwiseKeySupply")
            .field("identities", &count)
            .finish()
    }
}

impl KeySupply for PairwiseKeySupply {
    fn recipient_kek(
        &self,
        master: &MasterKeyMaterial,
        request: &KekRequest<'_>,
    ) -> Result<KeyEncryptingKey> {
        let peer_id = if request.local_id == request.owner_id {
            request.recipient_id
        } else if request.local_id == request.recipient_id {
            request.owner_id
        } else {
            return Err(GrantError::KeySupply(format!(
                "{} is neither owner nor recipient of this envelope",
                request.local_id
            )));
        };

        let peer = self.public_key(peer_id).ok_or_else(|| {
            GrantError::KeySupply(format!("no public key registered for {peer_id}"))
        })?;

        let shared = IdentitySecret::from_master(master).agree(&peer);
        Ok(shared.derive_kek(request.file_id, request.owner_id, request.recipient_id))
    }
}

/// Team-wide KEKs from one shared secret.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct TeamKeySupply {
    secret: [u8; 32],
}

impl TeamKeySupply {
    /// Create a supply from the team secret.
    pub fn new(secret: [u8; 32]) -> Self {
        Self { secret }
    }
}

impl fmt::Debug for TeamKeySupply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TeamKeySupply(..)")
    }
}

impl KeySupply for TeamKeySupply {
    fn recipient_kek(
        &self,
        _master: &MasterKeyMaterial,
        request: &KekRequest<'_>,
    ) -> Result<KeyEncryptingKey> {
        let mut hasher = blake3::Hasher::new_keyed(&self.secret);
        hasher.update(TEAM_KEK_LABEL);
        update_prefixed(&mut hasher, request.file_id.as_str().as_bytes());
        update_prefixed(&mut hasher, request.recipient_id.as_str().as_bytes());
        Ok(KeyEncryptingKey::from_bytes(*hasher.finalize().as_bytes()))
    }
}
