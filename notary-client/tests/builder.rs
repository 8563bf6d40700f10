// Copyright 2019 The Notary Project Authors. All Rights Reserved.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tests for the repository builder: the dependency-ordered validation of raw metadata.

mod test_utils;

use chrono::{Duration, Utc};
use notary_client::build::load_repo_from_store;
use notary_client::error::Error;
use notary_client::schema::RoleName;
use notary_client::storage::MetadataStore;
use notary_client::trustpin::TrustPinConfig;
use test_utils::{RepoFixture, GUN};

fn pin() -> TrustPinConfig {
    TrustPinConfig::default()
}

#[test]
fn valid_chain_loads() {
    let fixture = RepoFixture::new().with_target("app.tar.gz", b"app contents");
    let store = fixture.build();

    let (repo, invalid) = load_repo_from_store(GUN, &pin(), &store, None, false).unwrap();
    assert!(invalid.is_empty());
    assert_eq!(repo.targets.signed.targets.len(), 1);
    assert!(repo.targets.signed.targets.contains_key("app.tar.gz"));
    assert_eq!(repo.version_of(&RoleName::Root), Some(1));
}

#[test]
fn expired_timestamp_is_rejected() {
    let fixture = RepoFixture::new()
        .with_timestamp_expires(Utc::now() - Duration::hours(1));
    let store = fixture.build();

    let err = load_repo_from_store(GUN, &pin(), &store, None, false).unwrap_err();
    match err {
        Error::ExpiredMetadata { role } => assert_eq!(role, RoleName::Timestamp),
        other => panic!("expected ExpiredMetadata, got {:?}", other),
    }
}

#[test]
fn expired_timestamp_is_accepted_when_allowed() {
    let fixture = RepoFixture::new()
        .with_timestamp_expires(Utc::now() - Duration::hours(1));
    let store = fixture.build();
    load_repo_from_store(GUN, &pin(), &store, None, true).unwrap();
}

#[test]
fn tampered_snapshot_fails_the_checksum() {
    let fixture = RepoFixture::new();
    let store = fixture.build();

    // Corrupt one byte of the stored snapshot; the timestamp's digest no longer matches.
    let mut snapshot = store.get_sized("snapshot", -1).unwrap();
    let last = snapshot.len() - 2;
    snapshot[last] ^= 0x01;
    store.set("snapshot", &snapshot).unwrap();

    let err = load_repo_from_store(GUN, &pin(), &store, None, false).unwrap_err();
    assert!(matches!(
        err,
        Error::ChecksumMismatch { role: RoleName::Snapshot }
    ));
}

#[test]
fn unsigned_root_is_rejected() {
    let fixture = RepoFixture::new();
    let store = fixture.build();

    // Replace the root with one signed by a key the body does not declare.
    let other = RepoFixture::new();
    let foreign_root = other.build().get_sized("root", -1).unwrap();
    store.set("root", &foreign_root).unwrap();

    let err = load_repo_from_store(GUN, &pin(), &store, None, false).unwrap_err();
    // The foreign root verifies against itself, so the failure surfaces once its keys cannot
    // validate the rest of the chain.
    assert!(matches!(
        err,
        Error::InsufficientSignatures { .. } | Error::ChecksumMismatch { .. }
    ));
}

#[test]
fn root_rotation_requires_old_keys() {
    let fixture = RepoFixture::new();
    let store = fixture.build();
    let (repo, _) = load_repo_from_store(GUN, &pin(), &store, None, false).unwrap();

    // A brand-new root not signed by the previously trusted keys must be rejected.
    let unrelated = RepoFixture::new().with_version("root", 2);
    let unrelated_store = unrelated.build();

    let err =
        load_repo_from_store(GUN, &pin(), &unrelated_store, Some(repo.root.clone()), false)
            .unwrap_err();
    assert!(matches!(err, Error::RootRotationFailed { .. }));
}

#[test]
fn version_rollback_is_rejected() {
    let fixture = RepoFixture::new().with_version("root", 3);
    let store = fixture.build();
    let (repo, _) = load_repo_from_store(GUN, &pin(), &store, None, false).unwrap();
    assert_eq!(repo.version_of(&RoleName::Root), Some(3));

    // The same trusted state must refuse a root that went backward. Reusing the fixture keys,
    // build version 2 of the same repository.
    let older = {
        let mut older = RepoFixture::new();
        older.root_key = fixture.root_key;
        older.targets_key = fixture.targets_key;
        older.snapshot_key = fixture.snapshot_key;
        older.timestamp_key = fixture.timestamp_key;
        older.with_version("root", 2)
    };
    let older_store = older.build();

    let pin_binding = pin();
    let mut builder = notary_client::build::RepoBuilder::new(GUN, &pin_binding, Utc::now());
    builder = builder.with_trusted_root(repo.root.clone());
    let err = builder
        .load(
            &RoleName::Root,
            &older_store.get_sized("root", -1).unwrap(),
            3,
            false,
        )
        .unwrap_err();
    match err {
        Error::BadVersion { role, got, wanted } => {
            assert_eq!(role, RoleName::Root);
            assert_eq!(got, 2);
            assert_eq!(wanted, 3);
        }
        other => panic!("expected BadVersion, got {:?}", other),
    }
}

#[test]
fn valid_delegations_are_stitched_into_the_tree() {
    let fixture = RepoFixture::new().with_delegation("targets/releases", &["releases/"]);
    let store = fixture.build();

    let (repo, invalid) = load_repo_from_store(GUN, &pin(), &store, None, false).unwrap();
    assert!(invalid.is_empty());
    let body = repo.role_body(&RoleName::Delegation("targets/releases".to_owned()));
    assert!(body.is_some());
}

#[test]
fn bad_delegation_lands_in_the_invalid_repo() {
    let fixture = RepoFixture::new()
        .with_delegation("targets/good", &["good/"])
        .with_bad_delegation("targets/bad", &["bad/"]);
    let store = fixture.build();

    let (repo, invalid) = load_repo_from_store(GUN, &pin(), &store, None, false).unwrap();

    // The build succeeds; the good delegation is present and the bad one is quarantined.
    assert!(repo
        .role_body(&RoleName::Delegation("targets/good".to_owned()))
        .is_some());
    assert!(repo
        .role_body(&RoleName::Delegation("targets/bad".to_owned()))
        .is_none());
    assert!(invalid.delegations.contains_key("targets/bad"));
}

#[test]
fn pinned_key_ids_constrain_the_bootstrap() {
    use std::collections::BTreeMap;

    let fixture = RepoFixture::new();
    let store = fixture.build();

    // Pinning an unrelated key ID must reject the root.
    let mut certs = BTreeMap::new();
    certs.insert(GUN.to_owned(), vec!["ab".repeat(32)]);
    let config = TrustPinConfig {
        certs,
        ..TrustPinConfig::default()
    };
    let err = load_repo_from_store(GUN, &config, &store, None, false).unwrap_err();
    assert!(matches!(err, Error::TrustPinningFailure { .. }));

    // Pinning the fixture's actual root key must succeed.
    let root_id = fixture.root_key.key_id().unwrap().to_string();
    let mut certs = BTreeMap::new();
    certs.insert(GUN.to_owned(), vec![root_id]);
    let config = TrustPinConfig {
        certs,
        ..TrustPinConfig::default()
    };
    load_repo_from_store(GUN, &config, &store, None, false).unwrap();
}

#[test]
fn pinned_key_ids_constrain_rotations_too() {
    use std::collections::BTreeMap;

    let fixture = RepoFixture::new();
    let store = fixture.build();
    let (repo, _) = load_repo_from_store(GUN, &pin(), &store, None, false).unwrap();

    // A previously trusted root must not override the pin: even a root the old keys would
    // happily authorize is rejected when it matches no pinned key ID.
    let mut certs = BTreeMap::new();
    certs.insert(GUN.to_owned(), vec!["ab".repeat(32)]);
    let config = TrustPinConfig {
        certs,
        ..TrustPinConfig::default()
    };
    let err = load_repo_from_store(GUN, &config, &store, Some(repo.root.clone()), false)
        .unwrap_err();
    assert!(matches!(err, Error::TrustPinningFailure { .. }));

    // With the real key pinned, the same previously trusted state loads fine.
    let root_id = fixture.root_key.key_id().unwrap().to_string();
    let mut certs = BTreeMap::new();
    certs.insert(GUN.to_owned(), vec![root_id]);
    let config = TrustPinConfig {
        certs,
        ..TrustPinConfig::default()
    };
    load_repo_from_store(GUN, &config, &store, Some(repo.root.clone()), false).unwrap();
}
