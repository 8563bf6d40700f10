// Copyright 2019 The Notary Project Authors. All Rights Reserved.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The stand-in remote store used when no trust server URL is configured. Every operation
//! fails with `OfflineStore`, which callers treat as "work from the cache only".

use crate::error::{self, Result};
use crate::schema::key::Key;
use crate::schema::RoleName;
use crate::storage::MetadataStore;
use std::collections::HashMap;

/// A [`MetadataStore`] for offline operation.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineStore;

impl MetadataStore for OfflineStore {
    fn get_sized(&self, _name: &str, _max_bytes: i64) -> Result<Vec<u8>> {
        error::OfflineStoreSnafu.fail()
    }

    fn set(&self, _name: &str, _data: &[u8]) -> Result<()> {
        error::OfflineStoreSnafu.fail()
    }

    fn set_multi(&self, _metas: &HashMap<String, Vec<u8>>) -> Result<()> {
        error::OfflineStoreSnafu.fail()
    }

    fn remove(&self, _name: &str) -> Result<()> {
        error::OfflineStoreSnafu.fail()
    }

    fn remove_all(&self) -> Result<()> {
        error::OfflineStoreSnafu.fail()
    }

    fn list(&self) -> Result<Vec<String>> {
        error::OfflineStoreSnafu.fail()
    }

    fn location(&self) -> String {
        "offline".to_owned()
    }

    fn rotate_key(&self, _role: &RoleName) -> Result<Key> {
        error::OfflineStoreSnafu.fail()
    }
}
