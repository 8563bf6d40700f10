// Copyright 2019 The Notary Project Authors. All Rights Reserved.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! An in-memory metadata store, used for tests and for assembling publish payloads.

use crate::error::{self, Result};
use crate::storage::{check_size, MetadataStore};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// A [`MetadataStore`] backed by a mutex-guarded map.
#[derive(Debug, Default)]
pub struct MemoryStore {
    metas: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>> {
        // The data is plain bytes; a poisoned lock cannot leave it inconsistent.
        self.metas.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MetadataStore for MemoryStore {
    fn get_sized(&self, name: &str, max_bytes: i64) -> Result<Vec<u8>> {
        let metas = self.guard();
        let data = metas
            .get(name)
            .ok_or_else(|| error::Error::MetaNotFound {
                resource: name.to_owned(),
            })?
            .clone();
        check_size(name, &data, max_bytes)?;
        Ok(data)
    }

    fn set(&self, name: &str, data: &[u8]) -> Result<()> {
        self.guard().insert(name.to_owned(), data.to_vec());
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<()> {
        self.guard().remove(name);
        Ok(())
    }

    fn remove_all(&self) -> Result<()> {
        self.guard().clear();
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.guard().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn location(&self) -> String {
        "memory".to_owned()
    }
}
