// Copyright 2019 The Notary Project Authors. All Rights Reserved.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests for the repository client: initialize, stage, publish, rotate, witness.

mod test_utils;

use notary_client::changelist::{Action, Change};
use notary_client::client::{Repository, Settings};
use notary_client::error::Error;
use notary_client::keystore::MemoryKeyStore;
use notary_client::passphrase::ConstantRetriever;
use notary_client::schema::{RoleName, Target};
use notary_client::service::CryptoService;
use notary_client::sign::KeyAlgorithm;
use notary_client::storage::MetadataStore;
use notary_client::trustpin::TrustPinConfig;
use std::sync::Arc;
use tempfile::TempDir;
use test_utils::{clone_key, RepoFixture, TestServerStore, GUN};

fn settings(trust_dir: &TempDir) -> Settings {
    Settings {
        gun: GUN.to_owned(),
        trust_dir: trust_dir.path().to_owned(),
        server_url: None,
        client: Default::default(),
        trust_pin: TrustPinConfig::default(),
        legacy_versions: 0,
    }
}

fn open_client(
    trust_dir: &TempDir,
    remote: TestServerStore,
) -> (Repository, CryptoService) {
    let crypto = CryptoService::new(vec![Arc::new(MemoryKeyStore::new())]);
    let repo = Repository::open(settings(trust_dir), crypto.clone())
        .unwrap()
        .with_remote(Box::new(remote));
    (repo, crypto)
}

/// initialize, add a target, publish, list: the happy path end to end.
#[test]
fn initialize_add_publish_list() {
    let trust_dir = TempDir::new().unwrap();
    let (mut repo, crypto) = open_client(&trust_dir, TestServerStore::new());
    let retriever = ConstantRetriever::new("");

    let root_key = crypto
        .create(RoleName::Root, None, KeyAlgorithm::Ecdsa, &retriever)
        .unwrap();
    let root_id = root_key.key_id().unwrap().to_string();
    repo.initialize(&[root_id], &[], &[], &retriever).unwrap();

    repo.add_target("hello", Target::describe(b"hello world"), &[])
        .unwrap();
    assert_eq!(repo.changelist().list().unwrap().len(), 1);

    repo.publish(&retriever).unwrap();

    let listing = repo.list_targets(&[]).unwrap();
    assert_eq!(listing.len(), 1);
    assert_eq!(listing[0].name, "hello");
    assert_eq!(listing[0].role, RoleName::Targets);
    assert_eq!(listing[0].target.length, 11);

    // The cache holds all four canonical roles, and the changelist is empty again.
    let metadata = trust_dir.path().join("tuf").join(GUN).join("metadata");
    for role in ["root", "targets", "snapshot", "timestamp"] {
        assert!(
            metadata.join(format!("{}.json", role)).is_file(),
            "missing cached {}",
            role
        );
    }
    assert!(repo.changelist().list().unwrap().is_empty());
}

/// Adding a target by length and digest alone, without the content.
#[test]
fn add_target_by_hash() {
    let trust_dir = TempDir::new().unwrap();
    let (mut repo, crypto) = open_client(&trust_dir, TestServerStore::new());
    let retriever = ConstantRetriever::new("");

    let root_id = crypto
        .create(RoleName::Root, None, KeyAlgorithm::Ecdsa, &retriever)
        .unwrap()
        .key_id()
        .unwrap()
        .to_string();
    repo.initialize(&[root_id], &[], &[], &retriever).unwrap();

    // The digest of "abc", supplied out of band.
    let sha256 =
        hex::decode("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad").unwrap();
    repo.add_target("t1", Target::new(3, sha256.clone()), &[])
        .unwrap();
    repo.publish(&retriever).unwrap();

    let found = repo.get_target("t1").unwrap();
    assert_eq!(found.target.length, 3);
    assert_eq!(found.target.hashes.sha256.as_ref(), sha256.as_slice());
}

/// Initializing twice fails, and a target without a sha256 is refused.
#[test]
fn initialize_guards() {
    let trust_dir = TempDir::new().unwrap();
    let (mut repo, crypto) = open_client(&trust_dir, TestServerStore::new());
    let retriever = ConstantRetriever::new("");

    let root_id = crypto
        .create(RoleName::Root, None, KeyAlgorithm::Ecdsa, &retriever)
        .unwrap()
        .key_id()
        .unwrap()
        .to_string();
    repo.initialize(&[root_id.clone()], &[], &[], &retriever)
        .unwrap();
    assert!(matches!(
        repo.initialize(&[root_id], &[], &[], &retriever),
        Err(Error::RepoAlreadyExists { .. })
    ));

    assert!(matches!(
        repo.initialize(&[], &[], &[RoleName::Targets], &retriever),
        Err(Error::InvalidRemoteRole { .. })
    ));
}

/// Rotating the snapshot key to server management: the root version bumps, the local snapshot
/// key disappears, and later publishes succeed without the client signing the snapshot.
#[test]
fn rotate_snapshot_to_server_managed() {
    let trust_dir = TempDir::new().unwrap();
    let (mut repo, crypto) = open_client(&trust_dir, TestServerStore::new());
    let retriever = ConstantRetriever::new("");

    let root_id = crypto
        .create(RoleName::Root, None, KeyAlgorithm::Ecdsa, &retriever)
        .unwrap()
        .key_id()
        .unwrap()
        .to_string();
    repo.initialize(&[root_id], &[], &[], &retriever).unwrap();
    repo.add_target("first", Target::describe(b"one"), &[])
        .unwrap();
    repo.publish(&retriever).unwrap();
    assert_eq!(crypto.list_keys(&RoleName::Snapshot).len(), 1);

    let root_version_before = repo.current().unwrap().root.signed.version.get();
    repo.rotate_key(RoleName::Snapshot, true, &[], &retriever)
        .unwrap();

    assert_eq!(
        repo.current().unwrap().root.signed.version.get(),
        root_version_before + 1
    );
    assert!(crypto.list_keys(&RoleName::Snapshot).is_empty());

    repo.add_target("second", Target::describe(b"two"), &[])
        .unwrap();
    repo.publish(&retriever).unwrap();
    let names: Vec<String> = repo
        .list_targets(&[])
        .unwrap()
        .into_iter()
        .map(|t| t.name)
        .collect();
    assert!(names.contains(&"second".to_owned()));
}

/// Timestamp rotation must be server-managed and root rotation must not be.
#[test]
fn rotation_role_constraints() {
    let trust_dir = TempDir::new().unwrap();
    let (mut repo, _) = open_client(&trust_dir, TestServerStore::new());
    let retriever = ConstantRetriever::new("");

    assert!(matches!(
        repo.rotate_key(RoleName::Timestamp, false, &[], &retriever),
        Err(Error::InvalidLocalRole { .. })
    ));
    assert!(matches!(
        repo.rotate_key(RoleName::Root, true, &[], &retriever),
        Err(Error::InvalidRemoteRole { .. })
    ));
    assert!(matches!(
        repo.rotate_key(
            RoleName::Delegation("targets/qa".to_owned()),
            false,
            &[],
            &retriever
        ),
        Err(Error::InvalidRole { .. })
    ));
}

/// An expired timestamp fails the update and leaves the previous state untouched.
#[test]
fn expired_timestamp_keeps_previous_state() {
    let trust_dir = TempDir::new().unwrap();
    let fixture = RepoFixture::new().with_target("app", b"app contents");
    let server = TestServerStore::seeded(&fixture);
    let (mut repo, _) = open_client(&trust_dir, server);

    repo.update().unwrap();
    assert_eq!(repo.list_targets(&[]).unwrap().len(), 1);

    // Re-seed the remote with an expired timestamp over the same chain of keys.
    let mut expired = RepoFixture::new()
        .with_target("app", b"app contents")
        .with_timestamp_expires(chrono::Utc::now() - chrono::Duration::hours(1));
    expired.root_key = clone_key(&fixture.root_key);
    expired.targets_key = clone_key(&fixture.targets_key);
    expired.snapshot_key = clone_key(&fixture.snapshot_key);
    expired.timestamp_key = clone_key(&fixture.timestamp_key);
    let replacement = expired.build();
    let new_remote = TestServerStore::new();
    for name in replacement.list().unwrap() {
        new_remote
            .set(&name, &replacement.get_sized(&name, -1).unwrap())
            .unwrap();
    }
    let mut repo = repo.with_remote(Box::new(new_remote));

    let err = repo.update().unwrap_err();
    match err {
        Error::ExpiredMetadata { role } => assert_eq!(role, RoleName::Timestamp),
        other => panic!("expected ExpiredMetadata, got {:?}", other),
    }
    // The previously validated repository is still there and still serves reads.
    assert_eq!(repo.list_targets(&[]).unwrap().len(), 1);
}

/// A delegation with a bad signature is quarantined by update and revived by witness+publish.
#[test]
fn witness_revives_an_invalid_delegation() {
    let trust_dir = TempDir::new().unwrap();
    let fixture = RepoFixture::new()
        .with_delegation("targets/good", &[""])
        .with_bad_delegation("targets/bad", &[""]);
    let server = TestServerStore::seeded(&fixture);

    let crypto = fixture.crypto_with_delegation_key("targets/bad");
    let mut repo = Repository::open(settings(&trust_dir), crypto)
        .unwrap()
        .with_remote(Box::new(server));
    let retriever = ConstantRetriever::new("");

    repo.update().unwrap();
    let bad = RoleName::Delegation("targets/bad".to_owned());
    assert!(repo.current().unwrap().role_body(&bad).is_none());
    assert!(repo.invalid().delegations.contains_key("targets/bad"));
    assert!(repo.list_targets(&[bad.clone()]).unwrap().is_empty());

    let witnessed = repo.witness(&[bad.clone()]).unwrap();
    assert_eq!(witnessed, vec![bad.clone()]);
    repo.publish(&retriever).unwrap();

    // The published body must now verify against the keys the parent advertises.
    let published = repo.current().unwrap();
    let body = published.role_body(&bad).expect("revived role body");
    let parent = published
        .targets
        .signed
        .parent_of("targets/bad")
        .expect("parent delegations");
    parent.verify_role(body, "targets/bad").unwrap();
    assert!(body.signed.version.get() > 1);
}

/// Witnessing the root or timestamp is refused outright.
#[test]
fn witness_rejects_unwitnessable_roles() {
    let trust_dir = TempDir::new().unwrap();
    let (repo, _) = open_client(&trust_dir, TestServerStore::new());
    assert!(matches!(
        repo.witness(&[RoleName::Root]),
        Err(Error::InvalidRole { .. })
    ));
    assert!(matches!(
        repo.witness(&[RoleName::Timestamp]),
        Err(Error::InvalidRole { .. })
    ));
}

/// A failed publish preserves the changelist; a successful one clears it.
#[test]
fn publish_failure_preserves_the_changelist() {
    let trust_dir = TempDir::new().unwrap();
    let (mut repo, crypto) = open_client(&trust_dir, TestServerStore::new());
    let retriever = ConstantRetriever::new("");

    let root_id = crypto
        .create(RoleName::Root, None, KeyAlgorithm::Ecdsa, &retriever)
        .unwrap()
        .key_id()
        .unwrap()
        .to_string();
    repo.initialize(&[root_id], &[], &[], &retriever).unwrap();

    // Stage a change scoped to a delegation role that does not exist: replay must fail and
    // leave the changelist intact.
    repo.add_target(
        "qa/tool",
        Target::describe(b"tool"),
        &[RoleName::Delegation("targets/qa".to_owned())],
    )
    .unwrap();
    repo.add_target("ok", Target::describe(b"fine"), &[])
        .unwrap();
    let staged_before = repo.changelist().list().unwrap();
    assert_eq!(staged_before.len(), 2);

    let err = repo.publish(&retriever).unwrap_err();
    assert!(matches!(err, Error::InvalidRole { .. }));
    assert_eq!(repo.changelist().list().unwrap(), staged_before);

    // Dropping the bad entry lets the rest go through.
    repo.changelist().remove(&[0]).unwrap();
    repo.publish(&retriever).unwrap();
    assert!(repo.changelist().list().unwrap().is_empty());
    assert_eq!(repo.list_targets(&[]).unwrap().len(), 1);
}

/// Deleting trust data clears cache, changelist, and in-memory state.
#[test]
fn delete_trust_data() {
    let trust_dir = TempDir::new().unwrap();
    let (mut repo, crypto) = open_client(&trust_dir, TestServerStore::new());
    let retriever = ConstantRetriever::new("");

    let root_id = crypto
        .create(RoleName::Root, None, KeyAlgorithm::Ecdsa, &retriever)
        .unwrap()
        .key_id()
        .unwrap()
        .to_string();
    repo.initialize(&[root_id], &[], &[], &retriever).unwrap();
    repo.add_target("hello", Target::describe(b"hello world"), &[])
        .unwrap();
    repo.publish(&retriever).unwrap();

    repo.delete_trust_data(false).unwrap();
    assert!(repo.current().is_none());
    assert!(repo.changelist().list().unwrap().is_empty());
    assert!(matches!(
        repo.list_targets(&[]),
        Err(Error::RepoNotInitialized { .. })
    ));
}

/// Removing a staged target produces a delete change that publish applies.
#[test]
fn remove_target_round_trip() {
    let trust_dir = TempDir::new().unwrap();
    let (mut repo, crypto) = open_client(&trust_dir, TestServerStore::new());
    let retriever = ConstantRetriever::new("");

    let root_id = crypto
        .create(RoleName::Root, None, KeyAlgorithm::Ecdsa, &retriever)
        .unwrap()
        .key_id()
        .unwrap()
        .to_string();
    repo.initialize(&[root_id], &[], &[], &retriever).unwrap();
    repo.add_target("keep", Target::describe(b"keep"), &[])
        .unwrap();
    repo.add_target("drop", Target::describe(b"drop"), &[])
        .unwrap();
    repo.publish(&retriever).unwrap();
    assert_eq!(repo.list_targets(&[]).unwrap().len(), 2);

    repo.remove_target("drop", &[]).unwrap();
    let staged = repo.changelist().list().unwrap();
    assert_eq!(staged.len(), 1);
    assert_eq!(staged[0].action, Action::Delete);
    repo.publish(&retriever).unwrap();

    let names: Vec<String> = repo
        .list_targets(&[])
        .unwrap()
        .into_iter()
        .map(|t| t.name)
        .collect();
    assert_eq!(names, vec!["keep".to_owned()]);
}

/// The staged change wire shape is what the changelist documents.
#[test]
fn staged_change_shape_is_stable() {
    let change = Change::target(
        Action::Create,
        RoleName::Targets,
        "hello",
        serde_json::to_vec(&Target::describe(b"hello world")).unwrap(),
    );
    let json = serde_json::to_value(&change).unwrap();
    assert_eq!(json["role"], "targets");
    assert_eq!(json["type"], "target");
    assert_eq!(json["action"], "create");
    let round_tripped: Change = serde_json::from_value(json).unwrap();
    assert_eq!(round_tripped, change);
}
