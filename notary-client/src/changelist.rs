// Copyright 2019 The Notary Project Authors. All Rights Reserved.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The changelist: a durable, append-only log of pending local mutations.
//!
//! User-facing operations never touch validated metadata directly; they append changes here,
//! and `publish` replays the log against the latest validated repository. Each change is one
//! immutable JSON file named `NNNNNNNN_<action>` under the collection's cache directory, so
//! enumeration is a directory listing and ordering is the numeric index.

use crate::error::{self, Result};
use crate::schema::decoded::{Base64, Decoded};
use crate::schema::RoleName;
use chrono::Utc;
use log::debug;
use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// What a change does to its subject.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Create the subject (or replace it wholesale).
    Create,
    /// Update the subject in place.
    Update,
    /// Delete the subject.
    Delete,
}

serde_plain::forward_display_to_serde!(Action);
serde_plain::forward_from_str_to_serde!(Action);

/// What kind of subject a change addresses.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    /// A target within a role.
    Target,
    /// A delegation declared by a role.
    Delegation,
    /// A witness marker: re-sign the role on publish even if nothing changed.
    Witness,
}

/// One pending mutation.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Change {
    /// What to do.
    pub action: Action,
    /// The role the change applies to.
    pub role: RoleName,
    /// The kind of subject.
    #[serde(rename = "type")]
    pub change_type: ChangeType,
    /// The target path, for target changes; empty otherwise.
    #[serde(default)]
    pub path: String,
    /// The serialized payload (a target description or a delegation edit), base64 in JSON.
    #[serde(default)]
    pub data: Decoded<Base64>,
}

impl Change {
    /// Creates a target-scoped change.
    pub fn target(action: Action, role: RoleName, path: &str, data: Vec<u8>) -> Self {
        Self {
            action,
            role,
            change_type: ChangeType::Target,
            path: path.to_owned(),
            data: data.into(),
        }
    }

    /// Creates a delegation-scoped change.
    pub fn delegation(action: Action, role: RoleName, data: Vec<u8>) -> Self {
        Self {
            action,
            role,
            change_type: ChangeType::Delegation,
            path: String::new(),
            data: data.into(),
        }
    }

    /// Creates a witness marker for a role.
    pub fn witness(role: RoleName) -> Self {
        Self {
            action: Action::Update,
            role,
            change_type: ChangeType::Witness,
            path: String::new(),
            data: Vec::new().into(),
        }
    }
}

/// The payload of a delegation change: an edit to one delegated role's keys, paths, and
/// threshold. Applied on publish against the delegating parent.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct TufDelegation {
    /// Replace the role's signature threshold.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_threshold: Option<u64>,

    /// Public keys to authorize for the role.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub add_keys: Vec<crate::schema::key::Key>,

    /// Key IDs to deauthorize.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remove_keys: Vec<String>,

    /// Path prefixes to grant.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub add_paths: Vec<String>,

    /// Path prefixes to revoke.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remove_paths: Vec<String>,

    /// Revoke every path before applying `add_paths`.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub clear_all_paths: bool,
}

/// A directory-backed changelist.
#[derive(Debug)]
pub struct ChangeList {
    dir: PathBuf,
}

impl ChangeList {
    /// Opens (creating if necessary) the changelist at `dir`.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_owned();
        fs::create_dir_all(&dir).context(error::DirCreateSnafu { path: &dir })?;
        Ok(Self { dir })
    }

    /// Where this changelist keeps its entries.
    pub fn location(&self) -> &Path {
        &self.dir
    }

    /// Entry files in index order, with their indices.
    fn entries(&self) -> Result<Vec<(u64, PathBuf)>> {
        let mut entries = Vec::new();
        let dir = match fs::read_dir(&self.dir) {
            Ok(dir) => dir,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(entries),
            Err(err) => return Err(err).context(error::FileReadSnafu { path: &self.dir }),
        };
        for entry in dir {
            let entry = entry.context(error::FileReadSnafu { path: &self.dir })?;
            let path = entry.path();
            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name,
                None => continue,
            };
            // Filenames are NNNNNNNN_<action>; anything else in the directory is not ours.
            let index = match name.split('_').next().and_then(|n| n.parse::<u64>().ok()) {
                Some(index) => index,
                None => continue,
            };
            entries.push((index, path));
        }
        entries.sort_by_key(|(index, _)| *index);
        Ok(entries)
    }

    /// Appends a change to the log.
    pub fn add(&self, change: &Change) -> Result<()> {
        let next = self
            .entries()?
            .last()
            .map(|(index, _)| index + 1)
            .unwrap_or(0);
        let path = self.dir.join(format!("{:08}_{}", next, change.action));
        let data =
            serde_json::to_vec_pretty(change).context(error::SerializeMetadataSnafu {
                what: "changelist entry",
            })?;
        debug!("staging change {} at {}", next, path.display());
        fs::write(&path, data).context(error::FileWriteSnafu { path })
    }

    /// Returns every pending change in order. A file that fails to parse poisons the whole
    /// list: publishing from a log we cannot fully read would apply an unknown subset.
    pub fn list(&self) -> Result<Vec<Change>> {
        let mut changes = Vec::new();
        for (index, path) in self.entries()? {
            let data = fs::read(&path).context(error::FileReadSnafu { path: &path })?;
            let change = serde_json::from_slice(&data)
                .context(error::MalformedChangelistSnafu { index })?;
            changes.push(change);
        }
        Ok(changes)
    }

    /// Removes the changes at the given positions in the current ordering.
    pub fn remove(&self, positions: &[u64]) -> Result<()> {
        for (position, (_, path)) in self.entries()?.into_iter().enumerate() {
            if positions.contains(&(position as u64)) {
                fs::remove_file(&path).context(error::FileRemoveSnafu { path })?;
            }
        }
        Ok(())
    }

    /// Clears the log. With `archive`, the directory is atomically renamed to
    /// `changelist-<timestamp>` beside itself instead of deleted, so a publish-time reset is
    /// recoverable.
    pub fn clear(&self, archive: bool) -> Result<()> {
        if archive && self.dir.exists() {
            let archived = self.dir.with_file_name(format!(
                "changelist-{}",
                Utc::now().timestamp_millis()
            ));
            fs::rename(&self.dir, &archived).context(error::FileRenameSnafu {
                from: &self.dir,
                to: &archived,
            })?;
        } else if self.dir.exists() {
            fs::remove_dir_all(&self.dir).context(error::FileRemoveSnafu { path: &self.dir })?;
        }
        fs::create_dir_all(&self.dir).context(error::DirCreateSnafu { path: &self.dir })
    }

    /// Releases the changelist. Present for symmetry with stores that hold resources; the
    /// directory-backed implementation has nothing to release.
    pub fn close(self) {}
}
