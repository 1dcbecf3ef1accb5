//! X25519 key agreement for pairwise recipient KEKs.
//!
//! Every identity has a static X25519 secret derived deterministically from
//! its master key, so nothing beyond the master key has to be stored. The
//! public half is published through a directory. An owner and a recipient
//! that run [`IdentitySecret::agree`] against each other's public keys reach
//! the same [`SharedKey`], and from it the same per-file KEK.

use std::fmt;

use blake3::Hasher;
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

use filevault_core::{FileId, KeyEncryptingKey, MasterKeyMaterial, RecipientId};

const IDENTITY_CONTEXT: &str = "filevault 2026-10-01 identity secret";
const PAIRWISE_KEK_CONTEXT: &str = "filevault 2026-10-01 pairwise kek";

/// An X25519 public key (32 bytes).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct X25519PublicKey(pub [u8; 32]);

impl X25519PublicKey {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    fn to_dalek(self) -> PublicKey {
        PublicKey::from(self.0)
    }
}

impl fmt::Debug for X25519PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "X25519PublicKey({})", &self.to_hex()[..16])
    }
}

impl From<PublicKey> for X25519PublicKey {
    fn from(pk: PublicKey) -> Self {
        Self(*pk.as_bytes())
    }
}

/// An identity's static X25519 secret.
pub struct IdentitySecret(StaticSecret);

impl IdentitySecret {
    /// Derive the identity secret from a master key.
    pub fn from_master(master: &MasterKeyMaterial) -> Self {
        let mut seed = blake3::derive_key(IDENTITY_CONTEXT, master.as_bytes());
        let secret = StaticSecret::from(seed);
        seed.zeroize();
        Self(secret)
    }

    /// The public key to publish for this identity.
    pub fn public_key(&self) -> X25519PublicKey {
        X25519PublicKey::from(PublicKey::from(&self.0))
    }

    /// Perform key agreement with a peer's public key.
    pub fn agree(&self, peer: &X25519PublicKey) -> SharedKey {
        let shared = self.0.diffie_hellman(&peer.to_dalek());
        SharedKey(*shared.as_bytes())
    }
}

impl fmt::Debug for IdentitySecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("IdentitySecret").field(&self.public_key()).finish()
    }
}

/// A shared secret from X25519 key agreement.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SharedKey([u8; 32]);

impl SharedKey {
    /// Derive the KEK for one (file, owner, recipient) triple.
    ///
    /// Both sides must pass the same owner and recipient; the roles are not
    /// interchangeable.
    pub fn derive_kek(
        &self,
        file_id: &FileId,
        owner_id: &RecipientId,
        recipient_id: &RecipientId,
    ) -> KeyEncryptingKey {
        let mut hasher = Hasher::new_derive_key(PAIRWISE_KEK_CONTEXT);
        hasher.update(&self.0);
        update_prefixed(&mut hasher, file_id.as_str().as_bytes());
        update_prefixed(&mut hasher, owner_id.as_str().as_bytes());
        update_prefixed(&mut hasher, recipient_id.as_str().as_bytes());
        KeyEncryptingKey::from_bytes(*hasher.finalize().as_bytes())
    }
}

impl fmt::Debug for SharedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedKey(..)")
    }
}

/// Feed a length-prefixed field to a hasher.
pub(crate) fn update_prefixed(hasher: &mut Hasher, field: &[u8]) {
    hasher.update(&(field.len() as u64).to_be_bytes());
    hasher.update(field);
}
