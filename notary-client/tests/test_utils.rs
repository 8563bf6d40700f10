// Copyright 2019 The Notary Project Authors. All Rights Reserved.
// SPDX-License-Identifier: MIT OR Apache-2.0

// An integration test might want to use some, but not all of, the symbols herein. To do so
// would cause compiler warnings for unused code, so we suppress them.
#![allow(unused)]

use chrono::{DateTime, Duration, Utc};
use notary_client::keystore::{KeyInfo, KeyStore, MemoryKeyStore};
use notary_client::passphrase::ConstantRetriever;
use notary_client::schema::decoded::{Decoded, Hex};
use notary_client::schema::key::Key;
use notary_client::schema::{
    DelegatedRole, Delegations, FileMeta, Role, RoleKeys, RoleName, RoleType, Root, Signature,
    Signed, Snapshot, Target, Targets, Timestamp,
};
use notary_client::service::CryptoService;
use notary_client::sign::{KeyAlgorithm, Sign, SigningKey};
use notary_client::storage::{MemoryStore, MetadataStore};
use ring::rand::SystemRandom;
use std::collections::HashMap;
use std::num::NonZeroU64;
use std::sync::{Arc, Mutex};

pub const GUN: &str = "example/repo";

pub fn one() -> NonZeroU64 {
    NonZeroU64::new(1).unwrap()
}

pub fn generate_key() -> SigningKey {
    SigningKey::generate(KeyAlgorithm::Ecdsa, &SystemRandom::new()).unwrap()
}

/// `SigningKey` is deliberately not `Clone`; tests copy one through its PKCS#8 form.
pub fn clone_key(key: &SigningKey) -> SigningKey {
    SigningKey::from_pkcs8(key.pkcs8()).unwrap()
}

/// Signs a role body with each key, producing the signature list of its envelope.
pub fn sign_body<T: Role>(body: &T, keys: &[&SigningKey]) -> Vec<Signature> {
    let canonical = body.canonical_form().unwrap();
    let rng = SystemRandom::new();
    keys.iter()
        .map(|key| Signature {
            keyid: key.key_id().unwrap(),
            method: key.scheme(),
            sig: key.sign(&canonical, &rng).unwrap().into(),
        })
        .collect()
}

/// Serializes a signed role the way the client stores and uploads metadata.
pub fn serialize<T: serde::Serialize>(signed: &Signed<T>) -> Vec<u8> {
    let mut bytes = serde_json::to_vec_pretty(signed).unwrap();
    bytes.push(b'\n');
    bytes
}

/// Builds complete, signed repositories for tests: four canonical roles plus any number of
/// delegations, serialized into a [`MemoryStore`] that can stand in for a remote.
pub struct RepoFixture {
    pub root_key: SigningKey,
    pub targets_key: SigningKey,
    pub snapshot_key: SigningKey,
    pub timestamp_key: SigningKey,
    pub targets_entries: Vec<(String, Target)>,
    /// (name, key that signs the body, key the parent advertises, paths)
    delegations: Vec<(String, SigningKey, SigningKey, Vec<String>)>,
    pub versions: HashMap<String, u64>,
    pub timestamp_expires: DateTime<Utc>,
    pub expires: DateTime<Utc>,
}

impl RepoFixture {
    pub fn new() -> Self {
        Self {
            root_key: generate_key(),
            targets_key: generate_key(),
            snapshot_key: generate_key(),
            timestamp_key: generate_key(),
            targets_entries: Vec::new(),
            delegations: Vec::new(),
            versions: HashMap::new(),
            timestamp_expires: Utc::now() + Duration::days(14),
            expires: Utc::now() + Duration::days(365),
        }
    }

    pub fn with_target(mut self, name: &str, content: &[u8]) -> Self {
        self.targets_entries
            .push((name.to_owned(), Target::describe(content)));
        self
    }

    /// Declares a delegation whose body is correctly signed by the advertised key.
    pub fn with_delegation(mut self, name: &str, paths: &[&str]) -> Self {
        let key = generate_key();
        let signer = clone_key(&key);
        self.delegations.push((
            name.to_owned(),
            signer,
            key,
            paths.iter().map(|p| (*p).to_owned()).collect(),
        ));
        self
    }

    /// Declares a delegation whose body is signed by a key other than the advertised one, so
    /// that its signature can never verify.
    pub fn with_bad_delegation(mut self, name: &str, paths: &[&str]) -> Self {
        self.delegations.push((
            name.to_owned(),
            generate_key(),
            generate_key(),
            paths.iter().map(|p| (*p).to_owned()).collect(),
        ));
        self
    }

    pub fn with_timestamp_expires(mut self, expires: DateTime<Utc>) -> Self {
        self.timestamp_expires = expires;
        self
    }

    pub fn with_version(mut self, role: &str, version: u64) -> Self {
        self.versions.insert(role.to_owned(), version);
        self
    }

    fn version(&self, role: &str) -> NonZeroU64 {
        NonZeroU64::new(*self.versions.get(role).unwrap_or(&1)).unwrap()
    }

    pub fn root_body(&self) -> Root {
        let mut keys = HashMap::new();
        let mut roles = HashMap::new();
        for (role, key) in [
            (RoleType::Root, &self.root_key),
            (RoleType::Targets, &self.targets_key),
            (RoleType::Snapshot, &self.snapshot_key),
            (RoleType::Timestamp, &self.timestamp_key),
        ] {
            let tuf_key = key.tuf_key();
            let id = tuf_key.key_id().unwrap();
            keys.insert(id.clone(), tuf_key);
            roles.insert(role, RoleKeys::new(vec![id], 1));
        }
        Root {
            consistent_snapshot: false,
            version: self.version("root"),
            expires: self.expires,
            keys,
            roles,
            _extra: HashMap::new(),
        }
    }

    /// Signs everything bottom-up and serializes it into a store.
    pub fn build(&self) -> MemoryStore {
        let store = MemoryStore::new();

        // Delegation bodies first, so the snapshot can describe them.
        let mut delegation_bytes: HashMap<String, Vec<u8>> = HashMap::new();
        for (name, signing_key, _, _) in &self.delegations {
            let body = Targets::new(self.version(name), self.expires);
            let signed = Signed {
                signatures: sign_body(&body, &[signing_key]),
                signed: body,
            };
            delegation_bytes.insert(name.clone(), serialize(&signed));
        }

        // The top-level targets declares the delegations.
        let mut targets_body = Targets::new(self.version("targets"), self.expires);
        for (name, target) in &self.targets_entries {
            targets_body.add_target(name, target.clone());
        }
        if !self.delegations.is_empty() {
            let mut delegations = Delegations::new();
            for (name, _, advertised, paths) in &self.delegations {
                let advertised = advertised.tuf_key();
                let id = advertised.key_id().unwrap();
                delegations.keys.insert(id.clone(), advertised);
                delegations.roles.push(DelegatedRole {
                    name: name.clone(),
                    keyids: vec![id],
                    threshold: one(),
                    paths: paths.clone(),
                    targets: None,
                });
            }
            targets_body.delegations = Some(delegations);
        }
        let targets = Signed {
            signatures: sign_body(&targets_body, &[&self.targets_key]),
            signed: targets_body,
        };
        let targets_bytes = serialize(&targets);

        let root = Signed {
            signatures: sign_body(&self.root_body(), &[&self.root_key]),
            signed: self.root_body(),
        };
        let root_bytes = serialize(&root);

        let mut snapshot_body = Snapshot::new(self.version("snapshot"), self.expires);
        snapshot_body
            .meta
            .insert("root".to_owned(), FileMeta::describe(&root_bytes));
        snapshot_body
            .meta
            .insert("targets".to_owned(), FileMeta::describe(&targets_bytes));
        for (name, bytes) in &delegation_bytes {
            snapshot_body
                .meta
                .insert(name.clone(), FileMeta::describe(bytes));
        }
        let snapshot = Signed {
            signatures: sign_body(&snapshot_body, &[&self.snapshot_key]),
            signed: snapshot_body,
        };
        let snapshot_bytes = serialize(&snapshot);

        let timestamp_body = Timestamp::new(
            self.version("timestamp"),
            self.timestamp_expires,
            &snapshot_bytes,
        );
        let timestamp = Signed {
            signatures: sign_body(&timestamp_body, &[&self.timestamp_key]),
            signed: timestamp_body,
        };

        store.set("root", &root_bytes).unwrap();
        store.set("targets", &targets_bytes).unwrap();
        store.set("snapshot", &snapshot_bytes).unwrap();
        store.set("timestamp", &serialize(&timestamp)).unwrap();
        for (name, bytes) in &delegation_bytes {
            store.set(name, bytes).unwrap();
        }
        store
    }

    /// A cryptoservice holding the key the parent advertises for delegation `name`, so that a
    /// witness can re-sign the role.
    pub fn crypto_with_delegation_key(&self, name: &str) -> CryptoService {
        let store = MemoryKeyStore::new();
        let retriever = ConstantRetriever::new("");
        for (delegation, _, advertised, _) in &self.delegations {
            if delegation == name {
                let copy = clone_key(advertised);
                store
                    .add(
                        &KeyInfo::new(
                            RoleName::Delegation(name.to_owned()),
                            Some(GUN.to_owned()),
                        ),
                        copy,
                        &retriever,
                    )
                    .unwrap();
            }
        }
        CryptoService::new(vec![Arc::new(store)])
    }
}

/// A remote store double that also plays the server's key-management part: `rotate_key`
/// generates a key and remembers it, the way a trust server manages timestamp (and optionally
/// snapshot) keys.
#[derive(Debug, Default)]
pub struct TestServerStore {
    inner: MemoryStore,
    pub server_keys: Mutex<HashMap<String, Vec<u8>>>,
}

impl TestServerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the server with a fixture's serialized repository.
    pub fn seeded(fixture: &RepoFixture) -> Self {
        let store = Self::new();
        let built = fixture.build();
        for name in built.list().unwrap() {
            store
                .inner
                .set(&name, &built.get_sized(&name, -1).unwrap())
                .unwrap();
        }
        store
    }
}

impl MetadataStore for TestServerStore {
    fn get_sized(&self, name: &str, max_bytes: i64) -> notary_client::Result<Vec<u8>> {
        self.inner.get_sized(name, max_bytes)
    }

    fn set(&self, name: &str, data: &[u8]) -> notary_client::Result<()> {
        self.inner.set(name, data)
    }

    fn set_multi(
        &self,
        metas: &HashMap<String, Vec<u8>>,
    ) -> notary_client::Result<()> {
        self.inner.set_multi(metas)
    }

    fn remove(&self, name: &str) -> notary_client::Result<()> {
        self.inner.remove(name)
    }

    fn remove_all(&self) -> notary_client::Result<()> {
        self.inner.remove_all()
    }

    fn list(&self) -> notary_client::Result<Vec<String>> {
        self.inner.list()
    }

    fn location(&self) -> String {
        "test server".to_owned()
    }

    fn rotate_key(&self, role: &RoleName) -> notary_client::Result<Key> {
        let key = generate_key();
        let public = key.tuf_key();
        self.server_keys
            .lock()
            .unwrap()
            .insert(role.to_string(), key.pkcs8().to_vec());
        Ok(public)
    }
}
