// Copyright 2019 The Notary Project Authors. All Rights Reserved.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Byte-blob storage for TUF metadata, keyed by role name.
//!
//! The same interface fronts the on-disk cache, the HTTP mirror, and the test doubles, so the
//! repository client does not care where metadata comes from. Names are role names (`root`,
//! `targets/releases`); the `.json` extension and any transport details are each store's own
//! business.

mod filesystem;
mod filter;
mod http;
mod memory;
mod offline;

pub use self::filesystem::FilesystemStore;
pub use self::filter::RoleFilterStore;
pub use self::http::{ClientSettings, HttpMirrorStore};
pub use self::memory::MemoryStore;
pub use self::offline::OfflineStore;

use crate::error::{self, Result};
use crate::schema::key::Key;
use crate::schema::RoleName;
use std::collections::HashMap;
use std::fmt::Debug;

/// A byte-blob store for TUF metadata.
pub trait MetadataStore: Debug + Send + Sync {
    /// Retrieves the metadata named `name`, reading at most `max_bytes` bytes. A negative
    /// `max_bytes` means unlimited. A store must fail with `MaxSizeExceeded` rather than return
    /// a truncated blob.
    fn get_sized(&self, name: &str, max_bytes: i64) -> Result<Vec<u8>>;

    /// Stores `data` under `name`.
    fn set(&self, name: &str, data: &[u8]) -> Result<()>;

    /// Stores several blobs. Remote stores apply the whole set as one transaction.
    fn set_multi(&self, metas: &HashMap<String, Vec<u8>>) -> Result<()> {
        for (name, data) in metas {
            self.set(name, data)?;
        }
        Ok(())
    }

    /// Removes the metadata named `name`. Removing a name that does not exist is not an error.
    fn remove(&self, name: &str) -> Result<()>;

    /// Removes all metadata held by this store.
    fn remove_all(&self) -> Result<()>;

    /// Lists the names this store holds.
    fn list(&self) -> Result<Vec<String>>;

    /// A human-readable description of where this store keeps its data, for error messages.
    fn location(&self) -> String;

    /// Asks the store to generate and manage the private key for `role`, returning the public
    /// key. Only stores backed by a trust server support this.
    fn rotate_key(&self, role: &RoleName) -> Result<Key> {
        let _ = role;
        error::InvalidOperationSnafu {
            detail: Some(format!("{} does not manage keys", self.location())),
        }
        .fail()
    }
}

impl<S: MetadataStore + ?Sized> MetadataStore for Box<S> {
    fn get_sized(&self, name: &str, max_bytes: i64) -> Result<Vec<u8>> {
        (**self).get_sized(name, max_bytes)
    }

    fn set(&self, name: &str, data: &[u8]) -> Result<()> {
        (**self).set(name, data)
    }

    fn set_multi(&self, metas: &HashMap<String, Vec<u8>>) -> Result<()> {
        (**self).set_multi(metas)
    }

    fn remove(&self, name: &str) -> Result<()> {
        (**self).remove(name)
    }

    fn remove_all(&self) -> Result<()> {
        (**self).remove_all()
    }

    fn list(&self) -> Result<Vec<String>> {
        (**self).list()
    }

    fn location(&self) -> String {
        (**self).location()
    }

    fn rotate_key(&self, role: &RoleName) -> Result<Key> {
        (**self).rotate_key(role)
    }
}

/// Enforces a size bound over an in-memory blob.
pub(crate) fn check_size(name: &str, data: &[u8], max_bytes: i64) -> Result<()> {
    if max_bytes >= 0 && data.len() as u64 > max_bytes as u64 {
        return error::MaxSizeExceededSnafu {
            resource: name,
            max_size: max_bytes as u64,
        }
        .fail();
    }
    Ok(())
}
