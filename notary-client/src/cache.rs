// Copyright 2019 The Notary Project Authors. All Rights Reserved.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! On-disk layout of the trust directory, and the single-writer lock over a collection's slice
//! of it.
//!
//! ```text
//! <trust_dir>/tuf/<gun>/metadata/<role>.json   validated signed bodies
//! <trust_dir>/tuf/<gun>/changelist/            pending changes
//! <trust_dir>/private/<key_id>.key             key material
//! ```

use crate::error::{self, Result};
use log::warn;
use snafu::ResultExt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// The directory holding everything for one collection.
pub(crate) fn gun_dir(trust_dir: &Path, gun: &str) -> PathBuf {
    trust_dir.join("tuf").join(gun)
}

/// The metadata cache directory for one collection.
pub(crate) fn metadata_dir(trust_dir: &Path, gun: &str) -> PathBuf {
    gun_dir(trust_dir, gun).join("metadata")
}

/// The changelist directory for one collection.
pub(crate) fn changelist_dir(trust_dir: &Path, gun: &str) -> PathBuf {
    gun_dir(trust_dir, gun).join("changelist")
}

/// A held single-writer lock over one collection's cache directory.
///
/// The cache supports exactly one writer per collection; a second open of the same collection
/// fails with `CacheLocked` rather than corrupting state. The lock is a sentinel file created
/// exclusively and removed on drop.
#[derive(Debug)]
pub(crate) struct CacheLock {
    path: PathBuf,
}

impl CacheLock {
    pub(crate) fn acquire(trust_dir: &Path, gun: &str) -> Result<Self> {
        let dir = gun_dir(trust_dir, gun);
        fs::create_dir_all(&dir).context(error::DirCreateSnafu { path: &dir })?;
        let path = dir.join(".lock");
        match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => Ok(Self { path }),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                error::CacheLockedSnafu { path }.fail()
            }
            Err(err) => Err(err).context(error::FileWriteSnafu { path }),
        }
    }
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            if err.kind() != ErrorKind::NotFound {
                warn!("failed to release cache lock {}: {}", self.path.display(), err);
            }
        }
    }
}
