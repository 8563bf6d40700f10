// Copyright 2019 The Notary Project Authors. All Rights Reserved.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! An in-memory key store. Nothing is encrypted and nothing survives the process; it backs
//! tests and short-lived operations like an import that is re-exported immediately.

use crate::error::{self, Result};
use crate::keystore::{KeyInfo, KeyStore};
use crate::passphrase::PassphraseRetriever;
use crate::schema::RoleName;
use crate::sign::{Sign, SigningKey};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// A [`KeyStore`] backed by a mutex-guarded map of PKCS#8 documents.
#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    keys: Mutex<HashMap<String, (KeyInfo, Vec<u8>)>>,
}

impl MemoryKeyStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> std::sync::MutexGuard<'_, HashMap<String, (KeyInfo, Vec<u8>)>> {
        self.keys.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl KeyStore for MemoryKeyStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn location(&self) -> String {
        "memory".to_owned()
    }

    fn add(
        &self,
        info: &KeyInfo,
        key: SigningKey,
        _retriever: &dyn PassphraseRetriever,
    ) -> Result<()> {
        let key_id = key.key_id()?.to_string();
        self.guard()
            .insert(key_id, (info.clone(), key.pkcs8().to_vec()));
        Ok(())
    }

    fn get(
        &self,
        key_id: &str,
        _retriever: &dyn PassphraseRetriever,
    ) -> Result<(Box<dyn Sign>, RoleName)> {
        let (info, pkcs8) = self
            .guard()
            .get(key_id)
            .cloned()
            .ok_or_else(|| error::KeyNotFoundSnafu { key_id }.build())?;
        let key = SigningKey::from_pkcs8(&pkcs8)?;
        Ok((Box::new(key), info.role))
    }

    fn get_info(&self, key_id: &str) -> Result<KeyInfo> {
        self.guard()
            .get(key_id)
            .map(|(info, _)| info.clone())
            .ok_or_else(|| error::KeyNotFoundSnafu { key_id }.build())
    }

    fn list(&self) -> HashMap<String, KeyInfo> {
        self.guard()
            .iter()
            .map(|(key_id, (info, _))| (key_id.clone(), info.clone()))
            .collect()
    }

    fn remove(&self, key_id: &str) -> Result<()> {
        if self.guard().remove(key_id).is_none() {
            return error::KeyNotFoundSnafu { key_id }.fail();
        }
        Ok(())
    }
}
