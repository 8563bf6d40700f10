// Copyright 2019 The Notary Project Authors. All Rights Reserved.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The cryptoservice: an ordered composition of key stores behind one signing interface.
//!
//! Lookups probe stores in order and the first hit wins; new keys go to the highest-priority
//! store that accepts them; removal touches every store, since a key may be mirrored. The
//! service takes no lock of its own (each store synchronizes its own state) and it never
//! caches private material.

use crate::error::{self, Result};
use crate::keystore::{KeyInfo, KeyStore};
use crate::passphrase::PassphraseRetriever;
use crate::schema::decoded::{Decoded, Hex};
use crate::schema::key::Key;
use crate::schema::RoleName;
use crate::sign::{KeyAlgorithm, Sign, SigningKey};
use log::warn;
use std::collections::HashMap;
use std::sync::Arc;

/// Signing and key management over an ordered set of key stores.
#[derive(Clone)]
pub struct CryptoService {
    stores: Vec<Arc<dyn KeyStore>>,
}

impl std::fmt::Debug for CryptoService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoService")
            .field(
                "stores",
                &self.stores.iter().map(|s| s.name().to_owned()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl CryptoService {
    /// Creates a cryptoservice over `stores`, ordered by priority.
    pub fn new(stores: Vec<Arc<dyn KeyStore>>) -> Self {
        Self { stores }
    }

    /// Appends a store at the lowest priority.
    pub fn add_store(&mut self, store: Arc<dyn KeyStore>) {
        self.stores.push(store);
    }

    /// The stores this service composes, in priority order.
    pub fn stores(&self) -> &[Arc<dyn KeyStore>] {
        &self.stores
    }

    /// Generates a key for `role` in the highest-priority store that supports generation and
    /// returns its public descriptor.
    pub fn create(
        &self,
        role: RoleName,
        gun: Option<String>,
        algorithm: KeyAlgorithm,
        retriever: &dyn PassphraseRetriever,
    ) -> Result<Key> {
        let info = KeyInfo::new(role, gun);
        let mut last = None;
        for store in &self.stores {
            match store.create(&info, algorithm, retriever) {
                Ok(key) => return Ok(key),
                Err(err) => {
                    warn!("store {} could not generate key: {}", store.name(), err);
                    last = Some(err);
                }
            }
        }
        Err(last.unwrap_or_else(no_stores))
    }

    /// Imports an existing private key into the highest-priority store.
    pub fn add_key(
        &self,
        info: &KeyInfo,
        key: SigningKey,
        retriever: &dyn PassphraseRetriever,
    ) -> Result<()> {
        let store = self.stores.first().ok_or_else(no_stores)?;
        store.add(info, key, retriever)
    }

    /// Retrieves the signing capability for a key, probing stores in priority order.
    pub fn private_key(
        &self,
        key_id: &str,
        retriever: &dyn PassphraseRetriever,
    ) -> Result<(Box<dyn Sign>, RoleName)> {
        for store in &self.stores {
            match store.get(key_id, retriever) {
                Ok(found) => return Ok(found),
                Err(err) if err.is_key_not_found() => continue,
                Err(err) => {
                    // An unhealthy store should not hide a key held by a lower-priority one.
                    warn!("store {} failed retrieving {}: {}", store.name(), key_id, err);
                    continue;
                }
            }
        }
        error::KeyNotFoundSnafu { key_id }.fail()
    }

    /// What is known about a key, without unlocking it.
    pub fn get_key_info(&self, key_id: &str) -> Result<KeyInfo> {
        for store in &self.stores {
            if let Ok(info) = store.get_info(key_id) {
                return Ok(info);
            }
        }
        error::KeyNotFoundSnafu { key_id }.fail()
    }

    /// Lists the IDs of every key bound to `role` across all stores.
    pub fn list_keys(&self, role: &RoleName) -> Vec<String> {
        let mut ids: Vec<String> = self
            .list_all()
            .into_iter()
            .filter(|(_, info)| &info.role == role)
            .map(|(key_id, _)| key_id)
            .collect();
        ids.sort();
        ids
    }

    /// Lists every key across all stores. For mirrored keys the highest-priority store's
    /// binding wins.
    pub fn list_all(&self) -> HashMap<String, KeyInfo> {
        let mut all = HashMap::new();
        for store in &self.stores {
            for (key_id, info) in store.list() {
                all.entry(key_id).or_insert(info);
            }
        }
        all
    }

    /// Removes a key from every store that holds it.
    pub fn remove_key(&self, key_id: &str) -> Result<()> {
        let mut removed = false;
        for store in &self.stores {
            match store.remove(key_id) {
                Ok(()) => removed = true,
                Err(err) if err.is_key_not_found() => {}
                Err(err) => return Err(err),
            }
        }
        if removed {
            Ok(())
        } else {
            error::KeyNotFoundSnafu { key_id }.fail()
        }
    }

    /// Resolves as many of `keyids` to signing capabilities as possible. Used when re-signing a
    /// role: every resolvable key signs, and the caller checks the result against the role's
    /// threshold.
    pub fn signers_for(
        &self,
        keyids: &[Decoded<Hex>],
        retriever: &dyn PassphraseRetriever,
    ) -> Vec<(Decoded<Hex>, Box<dyn Sign>)> {
        let mut signers = Vec::new();
        for keyid in keyids {
            match self.private_key(&keyid.to_string(), retriever) {
                Ok((signer, _)) => signers.push((keyid.clone(), signer)),
                Err(_) => continue,
            }
        }
        signers
    }
}


fn no_stores() -> crate::error::Error {
    crate::error::Error::KeyStore {
        store: "cryptoservice".to_owned(),
        source: "no key stores configured".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::CryptoService;
    use crate::error::Error;
    use crate::keystore::{KeyInfo, KeyStore, MemoryKeyStore};
    use crate::passphrase::ConstantRetriever;
    use crate::schema::RoleName;
    use crate::sign::{KeyAlgorithm, SigningKey};
    use ring::rand::SystemRandom;
    use std::sync::Arc;

    fn service_with_two_stores() -> (CryptoService, Arc<MemoryKeyStore>, Arc<MemoryKeyStore>) {
        let first = Arc::new(MemoryKeyStore::new());
        let second = Arc::new(MemoryKeyStore::new());
        let service = CryptoService::new(vec![first.clone(), second.clone()]);
        (service, first, second)
    }

    #[test]
    fn create_goes_to_highest_priority_store() {
        let (service, first, second) = service_with_two_stores();
        let retriever = ConstantRetriever::new("");
        let key = service
            .create(RoleName::Targets, None, KeyAlgorithm::Ecdsa, &retriever)
            .unwrap();
        let key_id = key.key_id().unwrap().to_string();
        assert!(first.list().contains_key(&key_id));
        assert!(!second.list().contains_key(&key_id));
    }

    #[test]
    fn probe_finds_keys_in_lower_priority_stores() {
        let (service, _first, second) = service_with_two_stores();
        let retriever = ConstantRetriever::new("");
        let key = SigningKey::generate(KeyAlgorithm::Ed25519, &SystemRandom::new()).unwrap();
        let key_id = key.key_id().unwrap().to_string();
        second
            .add(&KeyInfo::new(RoleName::Snapshot, None), key, &retriever)
            .unwrap();

        let (_, role) = service.private_key(&key_id, &retriever).unwrap();
        assert_eq!(role, RoleName::Snapshot);
    }

    #[test]
    fn remove_touches_every_store() {
        let (service, first, second) = service_with_two_stores();
        let retriever = ConstantRetriever::new("");
        let key = SigningKey::generate(KeyAlgorithm::Ecdsa, &SystemRandom::new()).unwrap();
        let key_id = key.key_id().unwrap().to_string();
        let info = KeyInfo::new(RoleName::Root, None);

        // mirror the key into both stores
        let copy = SigningKey::from_pkcs8(key.pkcs8()).unwrap();
        first.add(&info, key, &retriever).unwrap();
        second.add(&info, copy, &retriever).unwrap();

        service.remove_key(&key_id).unwrap();
        assert!(first.list().is_empty());
        assert!(second.list().is_empty());
        assert!(matches!(
            service.remove_key(&key_id),
            Err(Error::KeyNotFound { .. })
        ));
    }

    #[test]
    fn list_keys_filters_by_role() {
        let (service, first, _) = service_with_two_stores();
        let retriever = ConstantRetriever::new("");
        for role in [RoleName::Root, RoleName::Targets] {
            let key = SigningKey::generate(KeyAlgorithm::Ecdsa, &SystemRandom::new()).unwrap();
            first
                .add(&KeyInfo::new(role, None), key, &retriever)
                .unwrap();
        }
        assert_eq!(service.list_keys(&RoleName::Root).len(), 1);
        assert_eq!(service.list_keys(&RoleName::Snapshot).len(), 0);
    }
}
