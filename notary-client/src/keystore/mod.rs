// Copyright 2019 The Notary Project Authors. All Rights Reserved.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Private key stores.
//!
//! A key store owns persistent key material and binds each key to the role (and optionally the
//! collection) it signs for. Stores are composed into an ordered set by
//! [`CryptoService`](crate::service::CryptoService); lookups probe stores in order and
//! additions go to the first store that accepts them.
//!
//! Backend availability is decided at runtime: [`available_stores`] probes each built-in
//! backend and keeps the ones that work on this platform. Backends that live outside this crate
//! (a remote signer, a hardware token) implement [`KeyStore`] and are appended by the caller.

mod file;
mod memory;

pub use self::file::FileKeyStore;
pub use self::memory::MemoryKeyStore;

use crate::error::Result;
use crate::passphrase::PassphraseRetriever;
use crate::schema::key::Key;
use crate::schema::RoleName;
use crate::sign::{KeyAlgorithm, Sign, SigningKey};
use log::debug;
use std::collections::HashMap;
use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;

/// What a store knows about a key besides its material: the role it signs for and, for
/// delegation and non-root keys, the collection it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyInfo {
    /// The role this key signs for.
    pub role: RoleName,
    /// The collection this key belongs to, if it is scoped to one. Root keys are shared across
    /// collections and carry no GUN.
    pub gun: Option<String>,
}

impl KeyInfo {
    /// Creates a `KeyInfo` for a role within a collection.
    pub fn new(role: RoleName, gun: Option<String>) -> Self {
        Self { role, gun }
    }
}

/// A private key store backend.
pub trait KeyStore: Debug + Send + Sync {
    /// A short name identifying the backend kind, e.g. `file`.
    fn name(&self) -> &str;

    /// Where this store keeps its keys, for display.
    fn location(&self) -> String;

    /// Adds a key to the store. The retriever supplies the passphrase used to encrypt the
    /// material at rest, where the backend encrypts.
    fn add(
        &self,
        info: &KeyInfo,
        key: SigningKey,
        retriever: &dyn PassphraseRetriever,
    ) -> Result<()>;

    /// Retrieves the signing capability and role for a key. Fails with `KeyNotFound` when the
    /// store does not hold the key; other failures mean the store itself is unhealthy.
    fn get(
        &self,
        key_id: &str,
        retriever: &dyn PassphraseRetriever,
    ) -> Result<(Box<dyn Sign>, RoleName)>;

    /// Retrieves what is known about a key without unlocking it.
    fn get_info(&self, key_id: &str) -> Result<KeyInfo>;

    /// Lists every key in the store.
    fn list(&self) -> HashMap<String, KeyInfo>;

    /// Removes a key from the store. Removing an absent key fails with `KeyNotFound`.
    fn remove(&self, key_id: &str) -> Result<()>;

    /// Generates a new key bound to `info` and returns its public descriptor. The default
    /// generates locally and stores through [`KeyStore::add`]; backends that generate
    /// server-side override this.
    fn create(
        &self,
        info: &KeyInfo,
        algorithm: KeyAlgorithm,
        retriever: &dyn PassphraseRetriever,
    ) -> Result<Key> {
        let rng = ring::rand::SystemRandom::new();
        let key = SigningKey::generate(algorithm, &rng)?;
        let public = key.tuf_key();
        self.add(info, key, retriever)?;
        Ok(public)
    }
}

/// Probes the built-in backends and returns the ones available on this platform, ordered by
/// priority. The encrypted-file store under `<trust_dir>/private` is always available; probes
/// that fail are logged and skipped rather than surfaced.
pub fn available_stores(trust_dir: &Path) -> Vec<Arc<dyn KeyStore>> {
    let mut stores: Vec<Arc<dyn KeyStore>> = Vec::new();
    match FileKeyStore::open(trust_dir.join("private")) {
        Ok(store) => stores.push(Arc::new(store)),
        Err(err) => debug!("file key store unavailable: {}", err),
    }
    stores
}
