// Copyright 2019 The Notary Project Authors. All Rights Reserved.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The on-disk metadata cache. Each role is one JSON file beneath the store's root; delegation
//! role names contain slashes and map to subdirectories.

use crate::error::{self, Result};
use crate::storage::{check_size, MetadataStore};
use log::debug;
use snafu::ResultExt;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A [`MetadataStore`] over a directory of `<name>.json` files.
#[derive(Debug, Clone)]
pub struct FilesystemStore {
    root: PathBuf,
}

impl FilesystemStore {
    /// Creates a store rooted at `root`. The directory is created on first write.
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_owned(),
        }
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.json", name))
    }
}

impl MetadataStore for FilesystemStore {
    fn get_sized(&self, name: &str, max_bytes: i64) -> Result<Vec<u8>> {
        let path = self.path_for(name);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return error::MetaNotFoundSnafu { resource: name }.fail();
            }
            Err(err) => return Err(err).context(error::FileReadSnafu { path }),
        };
        check_size(name, &data, max_bytes)?;
        Ok(data)
    }

    fn set(&self, name: &str, data: &[u8]) -> Result<()> {
        let path = self.path_for(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context(error::DirCreateSnafu { path: parent })?;
        }
        debug!("writing metadata for {} to {}", name, path.display());
        fs::write(&path, data).context(error::FileWriteSnafu { path })
    }

    fn remove(&self, name: &str) -> Result<()> {
        let path = self.path_for(name);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).context(error::FileRemoveSnafu { path }),
        }
    }

    fn remove_all(&self) -> Result<()> {
        match fs::remove_dir_all(&self.root) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).context(error::FileRemoveSnafu { path: &self.root }),
        }
    }

    fn list(&self) -> Result<Vec<String>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in WalkDir::new(&self.root) {
            let entry = entry.context(error::WalkDirSnafu {
                directory: &self.root,
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = match entry.path().strip_prefix(&self.root) {
                Ok(relative) => relative,
                Err(_) => continue,
            };
            if let Some(name) = relative.to_str().and_then(|s| s.strip_suffix(".json")) {
                names.push(name.replace(std::path::MAIN_SEPARATOR, "/"));
            }
        }
        names.sort();
        Ok(names)
    }

    fn location(&self) -> String {
        self.root.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::FilesystemStore;
    use crate::error::Error;
    use crate::storage::MetadataStore;
    use tempfile::TempDir;

    #[test]
    fn set_get_list_remove() {
        let dir = TempDir::new().unwrap();
        let store = FilesystemStore::new(dir.path());
        store.set("root", b"root data").unwrap();
        store.set("targets/releases", b"delegation data").unwrap();

        assert_eq!(store.get_sized("root", -1).unwrap(), b"root data");
        assert_eq!(
            store.list().unwrap(),
            vec!["root".to_owned(), "targets/releases".to_owned()]
        );

        store.remove("root").unwrap();
        assert!(matches!(
            store.get_sized("root", -1),
            Err(Error::MetaNotFound { .. })
        ));
        // removing again is not an error
        store.remove("root").unwrap();
    }

    #[test]
    fn size_bound_is_enforced() {
        let dir = TempDir::new().unwrap();
        let store = FilesystemStore::new(dir.path());
        store.set("timestamp", &[0u8; 64]).unwrap();
        assert!(matches!(
            store.get_sized("timestamp", 63),
            Err(Error::MaxSizeExceeded { .. })
        ));
        assert!(store.get_sized("timestamp", 64).is_ok());
    }
}
