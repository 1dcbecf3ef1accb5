//! End-to-end flows through the vault.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use filevault::core::{decrypt_file, unwrap, CoreError, KeyEncryptingKey, KEY_LEN};
use filevault::grants::{kek_for, KekRequest, KeySupply, PairwiseKeySupply, TeamKeySupply};
use filevault::store::{BlobStore, KeyStore, MemoryBlobStore, MemoryStore, SqliteStore};
use filevault::{
    FileId, MasterKeyMaterial, RecipientId, SchemeVersion, SessionState, Vault, VaultConfig,
    VaultError,
};

const REPORT: &[u8; 37] = b"Quarterly revenue grew 12% in Q3 2026";

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

struct Party<K: KeyStore, B: BlobStore> {
    id: RecipientId,
    seed: [u8; KEY_LEN],
    vault: Vault<K, B>,
}

impl<K: KeyStore, B: BlobStore> Party<K, B> {
    fn master(&self) -> MasterKeyMaterial {
        MasterKeyMaterial::from_bytes(self.seed)
    }
}

fn party<K: KeyStore, B: BlobStore>(
    name: &str,
    keys: &Arc<K>,
    blobs: &Arc<B>,
    supply: Arc<dyn KeySupply>,
    config: VaultConfig,
) -> Party<K, B> {
    let id = RecipientId::from(name);
    let seed = *MasterKeyMaterial::generate().as_bytes();
    let vault = Vault::new(id.clone(), keys.clone(), blobs.clone(), supply, config);
    vault.unlock(MasterKeyMaterial::from_bytes(seed));
    Party { id, seed, vault }
}

type MemParty = Party<MemoryStore, MemoryBlobStore>;

/// Parties sharing one memory store and a pairwise directory.
fn pairwise_parties(names: &[&str]) -> Vec<MemParty> {
    let keys = Arc::new(MemoryStore::new());
    let blobs = Arc::new(MemoryBlobStore::new());
    let supply = Arc::new(PairwiseKeySupply::new());

    names
        .iter()
        .map(|name| {
            let p = party(name, &keys, &blobs, supply.clone(), VaultConfig::default());
            supply.register(p.id.clone(), PairwiseKeySupply::public_key_for(&p.master()));
            p
        })
        .collect()
}

/// The KEK `recipient` derives for their own envelope of `file`.
fn recipient_kek<K: KeyStore, B: BlobStore>(
    supply: &dyn KeySupply,
    recipient: &Party<K, B>,
    owner: &RecipientId,
    file: &FileId,
) -> KeyEncryptingKey {
    kek_for(
        supply,
        &recipient.master(),
        &KekRequest {
            file_id: file,
            owner_id: owner,
            recipient_id: &recipient.id,
            local_id: &recipient.id,
        },
    )
    .unwrap()
}

#[tokio::test]
async fn report_upload_share_revoke_rotate() -> Result<()> {
    init_tracing();

    let keys = Arc::new(MemoryStore::new());
    let blobs = Arc::new(MemoryBlobStore::new());
    let supply = Arc::new(PairwiseKeySupply::new());
    let owner = party("owner", &keys, &blobs, supply.clone(), VaultConfig::default());
    let reader = party("reader", &keys, &blobs, supply.clone(), VaultConfig::default());
    supply.register(owner.id.clone(), PairwiseKeySupply::public_key_for(&owner.master()));
    supply.register(reader.id.clone(), PairwiseKeySupply::public_key_for(&reader.master()));

    let file = FileId::from("report-1");
    assert_eq!(REPORT.len(), 37);

    // Upload: DEK1, bundle 1, owner envelope.
    let bundle_1 = owner.vault.upload(&file, REPORT, "report.pdf").await?;
    assert_eq!(bundle_1.version, 1);
    assert_eq!(owner.vault.list_grantees(&file).await?.len(), 1);

    // Grant: the reader's envelope wraps the same DEK1.
    let reader_envelope = owner.vault.share(&file, &reader.id).await?;
    let downloaded = reader.vault.download(&file).await?;
    assert_eq!(downloaded.content, REPORT);
    assert_eq!(downloaded.filename, "report.pdf");

    let kek = recipient_kek(supply.as_ref(), &reader, &owner.id, &file);
    let dek_1 = unwrap(&reader_envelope, &kek)?;

    // Revoke and rotate: DEK2, bundle 2, only the owner envelope remains.
    assert!(owner.vault.revoke(&file, &reader.id).await?);
    let bundle_2 = owner.vault.rotate(&file).await?;
    assert_eq!(bundle_2.version, 2);
    assert_eq!(
        owner.vault.list_grantees(&file).await?.into_iter().collect::<Vec<_>>(),
        vec![owner.id.clone()]
    );

    let denied = reader.vault.download(&file).await.unwrap_err();
    assert!(denied.is_access_denied(), "{denied}");

    // The reader's retained DEK1 does not open version 2.
    let ciphertext_2 = blobs.get_blob(&bundle_2.blob_ref).await?;
    let stale = decrypt_file(&bundle_2, &ciphertext_2, &dek_1).unwrap_err();
    assert_eq!(stale, CoreError::AuthenticationFailure);

    // Version 1's blob is gone and the owner still reads the same content.
    assert!(blobs.get_blob(&bundle_1.blob_ref).await.is_err());
    let current = owner.vault.download(&file).await?;
    assert_eq!(current.content, REPORT);
    assert_eq!(current.filename, "report.pdf");
    Ok(())
}

#[tokio::test]
async fn revoking_one_recipient_leaves_others() -> Result<()> {
    let parties = pairwise_parties(&["owner", "x", "y"]);
    let (owner, x, y) = (&parties[0], &parties[1], &parties[2]);
    let file = FileId::from("shared");

    owner.vault.upload(&file, b"team notes", "notes.md").await?;
    owner.vault.share(&file, &x.id).await?;
    owner.vault.share(&file, &y.id).await?;

    assert!(owner.vault.revoke(&file, &y.id).await?);

    assert_eq!(x.vault.download(&file).await?.content, b"team notes");
    assert!(y.vault.download(&file).await.unwrap_err().is_access_denied());
    Ok(())
}

#[tokio::test]
async fn rotation_rekeys_every_grantee() -> Result<()> {
    let parties = pairwise_parties(&["owner", "x", "y"]);
    let (owner, x, y) = (&parties[0], &parties[1], &parties[2]);
    let file = FileId::from("rotating");

    owner.vault.upload(&file, b"rotate me", "r.bin").await?;
    let old_x = owner.vault.share(&file, &x.id).await?;
    let old_y = owner.vault.share(&file, &y.id).await?;

    let bundle = owner.vault.rotate(&file).await?;
    let ciphertext = owner.vault.grants().blobs().get_blob(&bundle.blob_ref).await?;

    let supply = PairwiseKeySupply::new();
    for p in &parties {
        supply.register(p.id.clone(), PairwiseKeySupply::public_key_for(&p.master()));
    }

    for (party, old) in [(x, old_x), (y, old_y)] {
        let kek = recipient_kek(&supply, party, &owner.id, &file);
        let old_dek = unwrap(&old, &kek)?;
        assert!(decrypt_file(&bundle, &ciphertext, &old_dek).is_err());

        let new_envelope = owner.vault.grants().envelope_for(&file, &party.id).await?;
        assert_ne!(new_envelope.wrapped_key, old.wrapped_key);
        assert_eq!(party.vault.download(&file).await?.content, b"rotate me");
    }
    Ok(())
}

#[tokio::test]
async fn only_the_owner_changes_grants() -> Result<()> {
    let parties = pairwise_parties(&["owner", "x", "y"]);
    let (owner, x, y) = (&parties[0], &parties[1], &parties[2]);
    let file = FileId::from("owned");

    owner.vault.upload(&file, b"mine", "mine.txt").await?;
    owner.vault.share(&file, &x.id).await?;

    for result in [
        x.vault.share(&file, &y.id).await.map(|_| ()),
        x.vault.revoke(&file, &owner.id).await.map(|_| ()),
        x.vault.rotate(&file).await.map(|_| ()),
        x.vault.delete(&file).await,
    ] {
        assert!(matches!(result, Err(VaultError::NotOwner { .. })));
    }

    let owner_revoke = owner.vault.revoke(&file, &owner.id).await.unwrap_err();
    assert!(matches!(owner_revoke, VaultError::Grant(_)));
    Ok(())
}

#[tokio::test]
async fn locked_session_denies_access() -> Result<()> {
    let parties = pairwise_parties(&["owner"]);
    let owner = &parties[0];
    let file = FileId::from("locked");

    owner.vault.upload(&file, b"secret", "s.txt").await?;
    owner.vault.lock();
    assert_eq!(owner.vault.session_state(), SessionState::Locked);

    let download = owner.vault.download(&file).await.unwrap_err();
    assert!(download.is_access_denied());
    let upload = owner.vault.upload(&FileId::from("other"), b"x", "x").await.unwrap_err();
    assert!(upload.is_access_denied());

    owner.vault.unlock(owner.master());
    assert_eq!(owner.vault.download(&file).await?.content, b"secret");
    Ok(())
}

#[tokio::test]
async fn session_ttl_locks_vault() -> Result<()> {
    let keys = Arc::new(MemoryStore::new());
    let blobs = Arc::new(MemoryBlobStore::new());
    let config = VaultConfig::default().with_session_ttl(Some(Duration::from_millis(200)));
    let owner = party("owner", &keys, &blobs, Arc::new(PairwiseKeySupply::new()), config);
    let file = FileId::from("ttl");

    owner.vault.upload(&file, b"short lived", "t.txt").await?;
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert_eq!(owner.vault.session_state(), SessionState::Locked);
    assert!(owner.vault.download(&file).await.unwrap_err().is_access_denied());
    Ok(())
}

#[tokio::test]
async fn tampered_name_is_integrity_failure() -> Result<()> {
    let parties = pairwise_parties(&["owner"]);
    let owner = &parties[0];
    let file = FileId::from("tampered");

    let mut bundle = owner.vault.upload(&file, b"content", "name.txt").await?;
    bundle.encrypted_name[0] ^= 0x01;
    owner.vault.grants().keys().update_bundle(&bundle).await?;

    let err = owner.vault.download(&file).await.unwrap_err();
    assert!(err.is_integrity_failure(), "{err}");
    assert!(!err.is_access_denied());
    Ok(())
}

#[tokio::test]
async fn recipient_can_rename() -> Result<()> {
    let parties = pairwise_parties(&["owner", "x"]);
    let (owner, x) = (&parties[0], &parties[1]);
    let file = FileId::from("renamed");

    owner.vault.upload(&file, b"body", "draft.txt").await?;
    owner.vault.share(&file, &x.id).await?;

    let renamed = x.vault.rename(&file, "final.txt").await?;
    assert_eq!(renamed.version, 1);
    assert_eq!(owner.vault.download(&file).await?.filename, "final.txt");
    Ok(())
}

#[tokio::test]
async fn team_key_supply_flow() -> Result<()> {
    let keys = Arc::new(MemoryStore::new());
    let blobs = Arc::new(MemoryBlobStore::new());
    let team: Arc<dyn KeySupply> = Arc::new(TeamKeySupply::new([42; 32]));
    let config = VaultConfig::default().with_scheme(SchemeVersion::ChaCha20Poly1305);

    let owner = party("owner", &keys, &blobs, team.clone(), config.clone());
    let member = party("member", &keys, &blobs, team, config);
    let file = FileId::from("team-file");

    let bundle = owner.vault.upload(&file, b"team data", "team.txt").await?;
    assert_eq!(bundle.scheme_version, 2);

    owner.vault.share(&file, &member.id).await?;
    assert_eq!(member.vault.download(&file).await?.content, b"team data");

    owner.vault.rotate(&file).await?;
    assert_eq!(member.vault.download(&file).await?.content, b"team data");
    Ok(())
}

#[tokio::test]
async fn sqlite_backed_vault_survives_reopen() -> Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("vault.db");
    let file = FileId::from("persisted");
    let supply: Arc<dyn KeySupply> = Arc::new(PairwiseKeySupply::new());
    let seed = [3u8; KEY_LEN];

    {
        let store = Arc::new(SqliteStore::open(&path)?);
        let vault = Vault::new(RecipientId::from("owner"), store.clone(), store, supply.clone(), VaultConfig::default());
        vault.unlock(MasterKeyMaterial::from_bytes(seed));
        vault.upload(&file, b"on disk", "disk.txt").await?;
        vault.rotate(&file).await?;
    }

    let store = Arc::new(SqliteStore::open(&path)?);
    let vault = Vault::new(RecipientId::from("owner"), store.clone(), store, supply, VaultConfig::default());
    vault.unlock(MasterKeyMaterial::from_bytes(seed));

    assert_eq!(vault.list_files().await?, vec![file.clone()]);
    let decrypted = vault.download(&file).await?;
    assert_eq!(decrypted.content, b"on disk");
    assert_eq!(vault.grants().bundle(&file).await?.version, 2);

    vault.delete(&file).await?;
    assert!(vault.list_files().await?.is_empty());
    Ok(())
}
