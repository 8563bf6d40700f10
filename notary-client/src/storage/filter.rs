// Copyright 2019 The Notary Project Authors. All Rights Reserved.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A wrapper store that restricts which role names pass through to an inner store.
//!
//! Reads of a name outside the allowlist fail with `MetaNotFound`; writes of such a name are
//! silently dropped (and `set_multi` filters its input). This asymmetry is deliberate: the
//! wrapper is used to scope a shared cache to the roles a caller may touch, and dropping an
//! out-of-scope write keeps bulk operations usable without leaking data through reads.

use crate::error::{self, Result};
use crate::storage::MetadataStore;
use log::debug;
use std::collections::{HashMap, HashSet};

/// A [`MetadataStore`] that forwards only allowlisted role names.
#[derive(Debug)]
pub struct RoleFilterStore<S> {
    inner: S,
    roles: HashSet<String>,
}

impl<S: MetadataStore> RoleFilterStore<S> {
    /// Wraps `inner`, allowing only the given role names through.
    pub fn new<I, T>(inner: S, roles: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            inner,
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    fn allowed(&self, name: &str) -> bool {
        self.roles.contains(name)
    }
}

impl<S: MetadataStore> MetadataStore for RoleFilterStore<S> {
    fn get_sized(&self, name: &str, max_bytes: i64) -> Result<Vec<u8>> {
        if !self.allowed(name) {
            return error::MetaNotFoundSnafu { resource: name }.fail();
        }
        self.inner.get_sized(name, max_bytes)
    }

    fn set(&self, name: &str, data: &[u8]) -> Result<()> {
        if !self.allowed(name) {
            debug!("dropping write of filtered role {}", name);
            return Ok(());
        }
        self.inner.set(name, data)
    }

    fn set_multi(&self, metas: &HashMap<String, Vec<u8>>) -> Result<()> {
        let filtered: HashMap<String, Vec<u8>> = metas
            .iter()
            .filter(|(name, _)| self.allowed(name))
            .map(|(name, data)| (name.clone(), data.clone()))
            .collect();
        if filtered.is_empty() {
            return Ok(());
        }
        self.inner.set_multi(&filtered)
    }

    fn remove(&self, name: &str) -> Result<()> {
        if !self.allowed(name) {
            return Ok(());
        }
        self.inner.remove(name)
    }

    fn remove_all(&self) -> Result<()> {
        self.inner.remove_all()
    }

    fn list(&self) -> Result<Vec<String>> {
        Ok(self
            .inner
            .list()?
            .into_iter()
            .filter(|name| self.allowed(name))
            .collect())
    }

    fn location(&self) -> String {
        self.inner.location()
    }
}
