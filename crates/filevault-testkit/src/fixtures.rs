//! Test fixtures and helpers.
//!
//! Deterministic parties and a shared in-memory deployment for
//! multi-party integration tests.

use std::fmt;
use std::sync::Arc;

use filevault::{Vault, VaultConfig};
use filevault_core::{FileId, KeyEncryptingKey, MasterKeyMaterial, RecipientId, KEY_LEN};
use filevault_grants::{kek_for, KekRequest, KeySupply, PairwiseKeySupply, X25519PublicKey};
use filevault_store::{MemoryBlobStore, MemoryStore};

/// A vault over the in-memory stores.
pub type TestVault = Vault<MemoryStore, MemoryBlobStore>;

/// An identity with a reproducible master key.
#[derive(Clone)]
pub struct Party {
    pub id: RecipientId,
    seed: [u8; KEY_LEN],
}

impl Party {
    /// Create a party with a random master key.
    pub fn new(name: &str) -> Self {
        Self::with_seed(name, *MasterKeyMaterial::generate().as_bytes())
    }

    /// Create with a deterministic master key.
    pub fn with_seed(name: &str, seed: [u8; KEY_LEN]) -> Self {
        Self {
            id: RecipientId::from(name),
            seed,
        }
    }

    /// A fresh copy of the master key, ready to unlock a session.
    pub fn master(&self) -> MasterKeyMaterial {
        MasterKeyMaterial::from_bytes(self.seed)
    }

    /// The party's X25519 identity key.
    pub fn public_key(&self) -> X25519PublicKey {
        PairwiseKeySupply::public_key_for(&self.master())
    }

    /// Derive the KEK this party uses for its own envelope of `file_id`.
    pub fn own_kek(
        &self,
        supply: &dyn KeySupply,
        file_id: &FileId,
        owner_id: &RecipientId,
    ) -> filevault_grants::Result<KeyEncryptingKey> {
        kek_for(
            supply,
            &self.master(),
            &KekRequest {
                file_id,
                owner_id,
                recipient_id: &self.id,
                local_id: &self.id,
            },
        )
    }
}

impl fmt::Debug for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Party").field("id", &self.id).finish_non_exhaustive()
    }
}

/// Shared stores and a pairwise key directory that several vaults join.
pub struct TestDeployment {
    pub keys: Arc<MemoryStore>,
    pub blobs: Arc<MemoryBlobStore>,
    pub supply: Arc<PairwiseKeySupply>,
    pub config: VaultConfig,
}

impl TestDeployment {
    /// Create an empty deployment with the default configuration.
    pub fn new() -> Self {
        Self::with_config(VaultConfig::default())
    }

    /// Create an empty deployment whose vaults use `config`.
    pub fn with_config(config: VaultConfig) -> Self {
        Self {
            keys: Arc::new(MemoryStore::new()),
            blobs: Arc::new(MemoryBlobStore::new()),
            supply: Arc::new(PairwiseKeySupply::new()),
            config,
        }
    }

    /// Register `party` in the directory and return its unlocked vault.
    pub fn join(&self, party: &Party) -> TestVault {
        self.supply.register(party.id.clone(), party.public_key());

        let vault = Vault::new(
            party.id.clone(),
            self.keys.clone(),
            self.blobs.clone(),
            self.supply.clone(),
            self.config.clone(),
        );
        vault.unlock(party.master());
        vault
    }
}

impl Default for TestDeployment {
    fn default() -> Self {
        Self::new()
    }
}

/// Create multiple parties with distinct deterministic seeds.
pub fn multi_party_fixtures(count: usize) -> Vec<Party> {
    (0..count)
        .map(|i| {
            let mut seed = [0u8; KEY_LEN];
            seed[0] = i as u8;
            seed[1] = 0xfa;
            Party::with_seed(&format!("party-{i}"), seed)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use filevault_core::unwrap;

    #[test]
    fn test_multi_party_keys_distinct() {
        let parties = multi_party_fixtures(3);

        let pks: Vec<_> = parties.iter().map(|p| p.public_key()).collect();
        assert_ne!(pks[0], pks[1]);
        assert_ne!(pks[1], pks[2]);
        assert_ne!(pks[0], pks[2]);
        assert_eq!(parties[2].id, RecipientId::from("party-2"));
    }

    #[test]
    fn test_seeded_party_is_reproducible() {
        let a = Party::with_seed("a", [7; KEY_LEN]);
        let b = Party::with_seed("a", [7; KEY_LEN]);
        assert_eq!(a.public_key(), b.public_key());
    }

    #[tokio::test]
    async fn test_deployment_share_and_download() {
        let deployment = TestDeployment::new();
        let parties = multi_party_fixtures(2);
        let owner = deployment.join(&parties[0]);
        let reader = deployment.join(&parties[1]);
        let file = FileId::from("fixture-file");

        owner.upload(&file, b"fixture", "f.txt").await.unwrap();
        let envelope = owner.share(&file, &parties[1].id).await.unwrap();
        assert_eq!(reader.download(&file).await.unwrap().content, b"fixture");

        let kek = parties[1]
            .own_kek(deployment.supply.as_ref(), &file, &parties[0].id)
            .unwrap();
        assert!(unwrap(&envelope, &kek).is_ok());
    }
}
