// Copyright 2019 The Notary Project Authors. All Rights Reserved.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tests for CA-based trust pinning over certificate-form root keys.

use chrono::Utc;
use notary_client::error::Error;
use notary_client::schema::key::{Key, KeyVal};
use notary_client::schema::{RoleKeys, RoleType, Root};
use notary_client::trustpin::{TrustPinConfig, TrustPinPolicy};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

const GUN: &str = "example/repo";

fn data(file: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(file)
}

/// A minimal root declaring one certificate-form root key.
fn root_with_cert(cert_file: &str) -> (Root, String) {
    let pem = std::fs::read(data(cert_file)).unwrap();
    let key = Key::EcdsaX509 {
        keyval: KeyVal::new(pem),
    };
    let id = key.key_id().unwrap();
    let mut keys = HashMap::new();
    keys.insert(id.clone(), key);
    let mut roles = HashMap::new();
    roles.insert(RoleType::Root, RoleKeys::new(vec![id.clone()], 1));
    (
        Root {
            consistent_snapshot: false,
            version: std::num::NonZeroU64::new(1).unwrap(),
            expires: Utc::now() + chrono::Duration::days(365),
            keys,
            roles,
            _extra: HashMap::new(),
        },
        id.to_string(),
    )
}

fn ca_config() -> TrustPinConfig {
    let mut ca = BTreeMap::new();
    ca.insert("example/".to_owned(), data("ca.pem"));
    TrustPinConfig {
        ca,
        ..TrustPinConfig::default()
    }
}

#[test]
fn ca_issued_root_key_is_trusted() {
    let config = ca_config();
    let policy = config.policy_for(GUN).unwrap();
    assert!(matches!(policy, TrustPinPolicy::Ca(_)));

    let (root, id) = root_with_cert("leaf.pem");
    let trusted = policy.trusted_keyids(GUN, &root, Utc::now()).unwrap();
    assert_eq!(trusted.len(), 1);
    assert_eq!(trusted[0].to_string(), id);
}

#[test]
fn unrelated_certificate_is_rejected() {
    let policy = ca_config().policy_for(GUN).unwrap();
    let (root, _) = root_with_cert("self-signed.pem");
    assert!(matches!(
        policy.trusted_keyids(GUN, &root, Utc::now()),
        Err(Error::TrustPinningFailure { .. })
    ));
}

#[test]
fn non_certificate_keys_cannot_satisfy_a_pinned_ca() {
    let policy = ca_config().policy_for(GUN).unwrap();

    // A plain key can never chain to a CA, even if it is otherwise fine.
    let key = Key::Ed25519 {
        keyval: KeyVal::new(vec![0xaa; 32]),
    };
    let id = key.key_id().unwrap();
    let mut keys = HashMap::new();
    keys.insert(id.clone(), key);
    let mut roles = HashMap::new();
    roles.insert(RoleType::Root, RoleKeys::new(vec![id], 1));
    let root = Root {
        consistent_snapshot: false,
        version: std::num::NonZeroU64::new(1).unwrap(),
        expires: Utc::now() + chrono::Duration::days(365),
        keys,
        roles,
        _extra: HashMap::new(),
    };
    assert!(matches!(
        policy.trusted_keyids(GUN, &root, Utc::now()),
        Err(Error::TrustPinningFailure { .. })
    ));
}

#[test]
fn guns_outside_the_prefix_fall_back_to_tofu() {
    let policy = ca_config().policy_for("other/repo").unwrap();
    assert!(matches!(policy, TrustPinPolicy::Tofu));
}
