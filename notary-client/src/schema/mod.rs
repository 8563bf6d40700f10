// Copyright 2019 The Notary Project Authors. All Rights Reserved.
// SPDX-License-Identifier: MIT OR Apache-2.0

#![allow(clippy::used_underscore_binding)]

//! Provides the metadata schema objects: the four canonical role bodies, delegations, and the
//! signed envelope that wraps them all.

mod cert;
mod de;
pub mod decoded;
mod error;
mod iter;
pub mod key;
pub mod spki;
mod verify;

pub use crate::schema::cert::{CertSignatureAlg, Certificate};
pub use crate::schema::error::{Error, Result};
pub(crate) use crate::schema::verify::verify_signed;

use crate::schema::decoded::{Decoded, Hex};
use crate::schema::iter::KeysIter;
use crate::schema::key::{Key, SignatureScheme};
use olpc_cjson::CanonicalFormatter;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use serde_plain::{forward_display_to_serde, forward_from_str_to_serde};
use snafu::ResultExt;
use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroU64;
use std::str::FromStr;

/// The type of a canonical metadata role.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RoleType {
    /// The root role delegates trust to specific keys trusted for all other top-level roles.
    Root,
    /// The targets role's signature indicates which target files are trusted by clients.
    Targets,
    /// The snapshot role signs a manifest of the current version of every other metadata file.
    Snapshot,
    /// The timestamp role pins the current snapshot and is re-signed frequently.
    Timestamp,
}

forward_display_to_serde!(RoleType);
forward_from_str_to_serde!(RoleType);

impl RoleType {
    /// All four canonical roles, in load order.
    pub const ALL: [RoleType; 4] = [
        RoleType::Root,
        RoleType::Timestamp,
        RoleType::Snapshot,
        RoleType::Targets,
    ];
}

/// The name of a signing role: one of the four canonical roles, or a delegation role whose
/// slash-separated name is rooted at `targets/`.
///
/// The two kinds have different structural invariants (the canonical set is fixed; delegations
/// form a tree), so they are kept distinct rather than passed around as bare strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RoleName {
    /// The `root` role.
    Root,
    /// The `targets` role.
    Targets,
    /// The `snapshot` role.
    Snapshot,
    /// The `timestamp` role.
    Timestamp,
    /// A delegation role, e.g. `targets/releases`.
    Delegation(String),
}

impl RoleName {
    /// Returns the canonical role type, or `None` for delegations.
    pub fn canonical(&self) -> Option<RoleType> {
        match self {
            RoleName::Root => Some(RoleType::Root),
            RoleName::Targets => Some(RoleType::Targets),
            RoleName::Snapshot => Some(RoleType::Snapshot),
            RoleName::Timestamp => Some(RoleType::Timestamp),
            RoleName::Delegation(_) => None,
        }
    }

    /// Whether this is a delegation role.
    pub fn is_delegation(&self) -> bool {
        matches!(self, RoleName::Delegation(_))
    }

    /// Whether metadata for this role is described by the snapshot (everything but root and
    /// timestamp... and snapshot itself, which is described by the timestamp).
    pub fn in_snapshot(&self) -> bool {
        matches!(self, RoleName::Targets | RoleName::Delegation(_))
    }

    /// Checks that `name` is a well-formed delegation role name.
    pub fn validate_delegation(name: &str) -> Result<()> {
        let ok = name.starts_with("targets/")
            && name.len() > "targets/".len()
            && !name.ends_with('/')
            && !name.contains("//")
            && !name.split('/').any(|part| part == "." || part == "..")
            && name.bytes().all(|b| (0x21..=0x7e).contains(&b));
        if ok {
            Ok(())
        } else {
            error::InvalidRoleNameSnafu { name }.fail()
        }
    }
}

impl From<RoleType> for RoleName {
    fn from(t: RoleType) -> Self {
        match t {
            RoleType::Root => RoleName::Root,
            RoleType::Targets => RoleName::Targets,
            RoleType::Snapshot => RoleName::Snapshot,
            RoleType::Timestamp => RoleName::Timestamp,
        }
    }
}

impl fmt::Display for RoleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoleName::Root => f.write_str("root"),
            RoleName::Targets => f.write_str("targets"),
            RoleName::Snapshot => f.write_str("snapshot"),
            RoleName::Timestamp => f.write_str("timestamp"),
            RoleName::Delegation(name) => f.write_str(name),
        }
    }
}

impl FromStr for RoleName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "root" => Ok(RoleName::Root),
            "targets" => Ok(RoleName::Targets),
            "snapshot" => Ok(RoleName::Snapshot),
            "timestamp" => Ok(RoleName::Timestamp),
            name => {
                RoleName::validate_delegation(name)?;
                Ok(RoleName::Delegation(name.to_owned()))
            }
        }
    }
}

impl Serialize for RoleName {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for RoleName {
    fn deserialize<D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        use serde::de::Error as _;
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

/// Common trait implemented by the canonical role bodies.
pub trait Role: Serialize {
    /// The canonical role this body represents.
    const TYPE: RoleType;

    /// Determines when metadata should be considered expired and no longer trusted by clients.
    fn expires(&self) -> DateTime<Utc>;

    /// An integer that is greater than 0. Clients MUST NOT replace a metadata file with a
    /// version number less than the one currently trusted.
    fn version(&self) -> NonZeroU64;

    /// A deterministic JSON serialization used when signing and digesting a metadata object.
    fn canonical_form(&self) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        let mut ser = serde_json::Serializer::with_formatter(&mut data, CanonicalFormatter::new());
        self.serialize(&mut ser)
            .context(error::JsonSerializationSnafu { what: "role" })?;
        Ok(data)
    }
}

/// A signed metadata object.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Signed<T> {
    /// The role that is signed.
    pub signed: T,
    /// A list of signatures and their key IDs.
    pub signatures: Vec<Signature>,
}

/// A signature and the key ID that made it.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Signature {
    /// The key ID (listed in root.json or a delegating role) that made this signature.
    pub keyid: Decoded<Hex>,
    /// The signature method used.
    pub method: SignatureScheme,
    /// A base64-encoded signature of the canonical JSON form of the role.
    pub sig: Decoded<decoded::Base64>,
}

// =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=

/// The root.json body. It indicates which keys are authorized for all top-level roles, including
/// the root role itself; key rotation for any role is done by publishing a new root.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "_type")]
#[serde(rename = "root")]
pub struct Root {
    /// Whether the repository uses consistent-snapshot naming. This implementation neither
    /// produces nor accepts `true`.
    pub consistent_snapshot: bool,

    /// An integer that is greater than 0. Clients MUST NOT replace a metadata file with a
    /// version number less than the one currently trusted.
    pub version: NonZeroU64,

    /// Determines when metadata should be considered expired and no longer trusted by clients.
    pub expires: DateTime<Utc>,

    /// All keys referenced by any top-level role, indexed by key ID. Key IDs are recomputed and
    /// checked during deserialization.
    #[serde(deserialize_with = "de::checked_key_map")]
    pub keys: HashMap<Decoded<Hex>, Key>,

    /// The key IDs and signature threshold for each of the four canonical roles.
    pub roles: HashMap<RoleType, RoleKeys>,

    /// Extra arguments found during deserialization.
    ///
    /// We must store these to correctly verify signatures for this object.
    ///
    /// If you're instantiating this struct, you should make this `HashMap::new()`.
    #[serde(flatten)]
    #[serde(deserialize_with = "de::extra_skip_type")]
    pub _extra: HashMap<String, Value>,
}

/// The key IDs used for a role and the threshold of signatures required to validate it.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RoleKeys {
    /// The key IDs used for the role.
    pub keyids: Vec<Decoded<Hex>>,

    /// The threshold of signatures required to validate the role.
    pub threshold: NonZeroU64,

    /// Extra arguments found during deserialization.
    #[serde(flatten)]
    pub _extra: HashMap<String, Value>,
}

impl RoleKeys {
    /// Creates a `RoleKeys` with the given key IDs and threshold.
    pub fn new(keyids: Vec<Decoded<Hex>>, threshold: u64) -> Self {
        Self {
            keyids,
            threshold: NonZeroU64::new(threshold.max(1)).unwrap_or_else(|| {
                // max(1) above makes this unreachable
                NonZeroU64::new(1).unwrap()
            }),
            _extra: HashMap::new(),
        }
    }
}

impl Root {
    /// An iterator over the defined keys for a given role.
    pub fn keys(&self, role: RoleType) -> impl Iterator<Item = &Key> {
        KeysIter {
            keyids_iter: match self.roles.get(&role) {
                Some(role_keys) => role_keys.keyids.iter(),
                None => [].iter(),
            },
            keys: &self.keys,
        }
    }

    /// Checks the structural invariants of a root body: all four canonical roles must be
    /// defined, every key ID any role references must be defined in the key map, and the
    /// repository must not use consistent-snapshot naming.
    pub fn validate(&self) -> Result<()> {
        for role in &RoleType::ALL {
            let keys = self
                .roles
                .get(role)
                .ok_or_else(|| Error::RoleNotFound {
                    name: role.to_string(),
                })?;
            for keyid in &keys.keyids {
                if !self.keys.contains_key(keyid) {
                    return error::KeyUndefinedSnafu {
                        role: role.to_string(),
                        keyid: keyid.to_string(),
                    }
                    .fail();
                }
            }
        }
        Ok(())
    }

    /// Verifies that `role` carries at least a threshold of valid signatures from the keys this
    /// root lists for `T::TYPE`.
    pub fn verify_role<T: Role>(&self, role: &Signed<T>) -> Result<()> {
        let role_keys = self.roles.get(&T::TYPE).ok_or_else(|| Error::RoleNotFound {
            name: T::TYPE.to_string(),
        })?;
        verify::verify_signed(
            role,
            &self.keys,
            &role_keys.keyids,
            role_keys.threshold,
            &T::TYPE.to_string(),
        )
    }

    /// Given a public key, return the corresponding key ID if this root references it.
    pub fn key_id(&self, key: &Key) -> Option<Decoded<Hex>> {
        for (key_id, candidate) in &self.keys {
            if candidate == key {
                return Some(key_id.clone());
            }
        }
        None
    }
}

impl Role for Root {
    const TYPE: RoleType = RoleType::Root;

    fn expires(&self) -> DateTime<Utc> {
        self.expires
    }

    fn version(&self) -> NonZeroU64 {
        self.version
    }
}

// =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=

/// The digests of a metadata or target file. A sha256 digest is always required; other
/// algorithms are carried if present.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Hashes {
    /// The SHA-256 digest.
    pub sha256: Decoded<Hex>,

    /// The SHA-512 digest, if one was recorded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha512: Option<Decoded<Hex>>,

    /// Extra arguments found during deserialization.
    #[serde(flatten)]
    pub _extra: HashMap<String, Value>,
}

impl Hashes {
    /// Creates a `Hashes` from a sha256 digest.
    pub fn from_sha256(sha256: Vec<u8>) -> Self {
        Self {
            sha256: sha256.into(),
            sha512: None,
            _extra: HashMap::new(),
        }
    }
}

/// Describes the current signed metadata file for a role, as recorded in a snapshot or
/// timestamp body.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct FileMeta {
    /// The length in bytes of the metadata file.
    pub length: u64,

    /// The digests of the metadata file.
    pub hashes: Hashes,

    /// Extra arguments found during deserialization.
    #[serde(flatten)]
    pub _extra: HashMap<String, Value>,
}

impl FileMeta {
    /// Describes a serialized metadata file.
    pub fn describe(data: &[u8]) -> Self {
        use ring::digest::{digest, SHA256};
        Self {
            length: data.len() as u64,
            hashes: Hashes::from_sha256(digest(&SHA256, data).as_ref().to_vec()),
            _extra: HashMap::new(),
        }
    }

    /// Checks `data` against the recorded length and digests, in constant time for the digest
    /// comparison.
    pub fn check(&self, data: &[u8]) -> bool {
        use ring::constant_time::verify_slices_are_equal;
        use ring::digest::{digest, SHA256, SHA512};
        if data.len() as u64 != self.length {
            return false;
        }
        let sha256 = digest(&SHA256, data);
        if verify_slices_are_equal(sha256.as_ref(), &self.hashes.sha256).is_err() {
            return false;
        }
        if let Some(sha512) = &self.hashes.sha512 {
            let calculated = digest(&SHA512, data);
            if verify_slices_are_equal(calculated.as_ref(), sha512).is_err() {
                return false;
            }
        }
        true
    }
}

/// The snapshot.json body: a manifest recording the current metadata file for every role other
/// than timestamp (including delegations), keyed by role name.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "_type")]
#[serde(rename = "snapshot")]
pub struct Snapshot {
    /// An integer that is greater than 0. Clients MUST NOT replace a metadata file with a
    /// version number less than the one currently trusted.
    pub version: NonZeroU64,

    /// Determines when metadata should be considered expired and no longer trusted by clients.
    pub expires: DateTime<Utc>,

    /// Role name to file description.
    pub meta: HashMap<String, FileMeta>,

    /// Extra arguments found during deserialization.
    #[serde(flatten)]
    #[serde(deserialize_with = "de::extra_skip_type")]
    pub _extra: HashMap<String, Value>,
}

impl Snapshot {
    /// Creates a new `Snapshot` with an empty manifest.
    pub fn new(version: NonZeroU64, expires: DateTime<Utc>) -> Self {
        Snapshot {
            version,
            expires,
            meta: HashMap::new(),
            _extra: HashMap::new(),
        }
    }
}

impl Role for Snapshot {
    const TYPE: RoleType = RoleType::Snapshot;

    fn expires(&self) -> DateTime<Utc> {
        self.expires
    }

    fn version(&self) -> NonZeroU64 {
        self.version
    }
}

/// The timestamp.json body. Its manifest contains exactly one entry, describing the snapshot.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "_type")]
#[serde(rename = "timestamp")]
pub struct Timestamp {
    /// An integer that is greater than 0. Clients MUST NOT replace a metadata file with a
    /// version number less than the one currently trusted.
    pub version: NonZeroU64,

    /// Determines when metadata should be considered expired and no longer trusted by clients.
    pub expires: DateTime<Utc>,

    /// Role name to file description; must contain exactly `snapshot`.
    pub meta: HashMap<String, FileMeta>,

    /// Extra arguments found during deserialization.
    #[serde(flatten)]
    #[serde(deserialize_with = "de::extra_skip_type")]
    pub _extra: HashMap<String, Value>,
}

impl Timestamp {
    /// Creates a new `Timestamp` describing the given serialized snapshot.
    pub fn new(version: NonZeroU64, expires: DateTime<Utc>, snapshot_bytes: &[u8]) -> Self {
        let mut meta = HashMap::new();
        meta.insert("snapshot".to_owned(), FileMeta::describe(snapshot_bytes));
        Timestamp {
            version,
            expires,
            meta,
            _extra: HashMap::new(),
        }
    }

    /// The file description of the current snapshot.
    pub fn snapshot_meta(&self) -> Option<&FileMeta> {
        self.meta.get("snapshot")
    }
}

impl Role for Timestamp {
    const TYPE: RoleType = RoleType::Timestamp;

    fn expires(&self) -> DateTime<Utc> {
        self.expires
    }

    fn version(&self) -> NonZeroU64 {
        self.version
    }
}

// =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=

/// A target as recorded in a targets body: the length and digests of the content, plus any
/// opaque custom data the publisher attached.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Target {
    /// The length in bytes of the target content.
    pub length: u64,

    /// The digests of the target content.
    pub hashes: Hashes,

    /// Opaque data made available to client applications, e.g. dependency information.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom: Option<Value>,

    /// Extra arguments found during deserialization.
    #[serde(flatten)]
    pub _extra: HashMap<String, Value>,
}

impl Target {
    /// Creates a `Target` from the content's length and sha256 digest.
    pub fn new(length: u64, sha256: Vec<u8>) -> Self {
        Self {
            length,
            hashes: Hashes::from_sha256(sha256),
            custom: None,
            _extra: HashMap::new(),
        }
    }

    /// Creates a `Target` describing a byte string.
    pub fn describe(data: &[u8]) -> Self {
        use ring::digest::{digest, SHA256};
        Self::new(data.len() as u64, digest(&SHA256, data).as_ref().to_vec())
    }

    /// Whether two targets describe the same content: name aside, targets are equivalent iff
    /// length and hashes all match.
    pub fn equivalent(&self, other: &Target) -> bool {
        self.length == other.length && self.hashes == other.hashes
    }
}

/// A targets body (the top-level `targets` role or any delegation role).
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "_type")]
#[serde(rename = "targets")]
pub struct Targets {
    /// An integer that is greater than 0. Clients MUST NOT replace a metadata file with a
    /// version number less than the one currently trusted.
    pub version: NonZeroU64,

    /// Determines when metadata should be considered expired and no longer trusted by clients.
    pub expires: DateTime<Utc>,

    /// Target path to target description.
    pub targets: HashMap<String, Target>,

    /// Subsets of the targets for which responsibility is delegated to other roles.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delegations: Option<Delegations>,

    /// Extra arguments found during deserialization.
    #[serde(flatten)]
    #[serde(deserialize_with = "de::extra_skip_type")]
    pub _extra: HashMap<String, Value>,
}

impl Targets {
    /// Creates a new, empty `Targets`.
    pub fn new(version: NonZeroU64, expires: DateTime<Utc>) -> Self {
        Targets {
            version,
            expires,
            targets: HashMap::new(),
            delegations: Some(Delegations::new()),
            _extra: HashMap::new(),
        }
    }

    /// Adds a target, replacing any previous entry for the same path.
    pub fn add_target(&mut self, name: &str, target: Target) {
        self.targets.insert(name.to_owned(), target);
    }

    /// Removes a target.
    pub fn remove_target(&mut self, name: &str) -> Option<Target> {
        self.targets.remove(name)
    }

    /// Finds the delegated role `name` anywhere beneath this body.
    pub fn delegated_role(&self, name: &str) -> Option<&DelegatedRole> {
        let delegations = self.delegations.as_ref()?;
        for role in &delegations.roles {
            if role.name == name {
                return Some(role);
            }
            if let Some(targets) = &role.targets {
                if let Some(found) = targets.signed.delegated_role(name) {
                    return Some(found);
                }
            }
        }
        None
    }

    /// Finds the delegated role `name` anywhere beneath this body, mutably.
    pub fn delegated_role_mut(&mut self, name: &str) -> Option<&mut DelegatedRole> {
        let delegations = self.delegations.as_mut()?;
        for role in &mut delegations.roles {
            if role.name == name {
                return Some(role);
            }
            if let Some(targets) = &mut role.targets {
                if let Some(found) = targets.signed.delegated_role_mut(name) {
                    return Some(found);
                }
            }
        }
        None
    }

    /// Finds the body of role `name` (this body for `targets`, or the loaded body of a
    /// delegation anywhere beneath it).
    pub fn role_body(&self, name: &str) -> Option<&Signed<Targets>> {
        self.delegated_role(name)
            .and_then(|role| role.targets.as_ref())
    }

    /// Finds the body of delegation role `name` mutably.
    pub fn role_body_mut(&mut self, name: &str) -> Option<&mut Signed<Targets>> {
        self.delegated_role_mut(name)
            .and_then(|role| role.targets.as_mut())
    }

    /// Returns the delegations object that directly delegates to `name`.
    pub fn parent_of(&self, name: &str) -> Option<&Delegations> {
        let delegations = self.delegations.as_ref()?;
        for role in &delegations.roles {
            if role.name == name {
                return Some(delegations);
            }
            if let Some(targets) = &role.targets {
                if let Some(found) = targets.signed.parent_of(name) {
                    return Some(found);
                }
            }
        }
        None
    }

    /// All delegation role names reachable beneath this body, depth-first.
    pub fn role_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        if let Some(delegations) = &self.delegations {
            for role in &delegations.roles {
                names.push(role.name.as_str());
                if let Some(targets) = &role.targets {
                    names.extend(targets.signed.role_names());
                }
            }
        }
        names
    }
}

impl Role for Targets {
    const TYPE: RoleType = RoleType::Targets;

    fn expires(&self) -> DateTime<Utc> {
        self.expires
    }

    fn version(&self) -> NonZeroU64 {
        self.version
    }
}

/// The delegations of a targets body: keys for verifying delegated roles, and the list of
/// delegated roles with the path subsets they are trusted for.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Delegations {
    /// The public keys used to verify signatures of delegated targets roles.
    #[serde(deserialize_with = "de::checked_key_map")]
    pub keys: HashMap<Decoded<Hex>, Key>,

    /// The list of delegated roles.
    pub roles: Vec<DelegatedRole>,
}

impl Delegations {
    /// Creates an empty `Delegations`.
    pub fn new() -> Self {
        Delegations {
            keys: HashMap::new(),
            roles: Vec::new(),
        }
    }

    /// Returns the directly delegated role `name`, if present.
    pub fn role(&self, name: &str) -> Option<&DelegatedRole> {
        self.roles.iter().find(|role| role.name == name)
    }

    /// Verifies that `body` carries a threshold of valid signatures from the keys delegated to
    /// `name`.
    pub fn verify_role(&self, body: &Signed<Targets>, name: &str) -> Result<()> {
        let role = self.role(name).ok_or_else(|| Error::RoleNotFound {
            name: name.to_owned(),
        })?;
        verify::verify_signed(body, &self.keys, &role.keyids, role.threshold, name)
    }
}

impl Default for Delegations {
    fn default() -> Self {
        Self::new()
    }
}

/// A role delegated in a targets body.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct DelegatedRole {
    /// The delegation role name, rooted at `targets/`.
    pub name: String,

    /// The key IDs this role signs with.
    pub keyids: Vec<Decoded<Hex>>,

    /// The threshold of signatures required to validate the role.
    pub threshold: NonZeroU64,

    /// The path prefixes this role is trusted to sign for. An empty prefix matches every path.
    pub paths: Vec<String>,

    /// The validated body of this role, populated while assembling a repository. Never
    /// serialized; each role's body is its own metadata file.
    #[serde(skip)]
    pub targets: Option<Signed<Targets>>,
}

impl DelegatedRole {
    /// Whether this role's path prefixes cover `path`.
    pub fn covers_path(&self, path: &str) -> bool {
        self.paths.iter().any(|prefix| path.starts_with(prefix.as_str()))
    }

    /// Checks that every one of `paths` is covered by this role, i.e. that this role may
    /// delegate them onward.
    pub fn verify_paths(&self, paths: &[String]) -> Result<()> {
        for path in paths {
            if !self.covers_path(path) {
                return error::UnmatchedPathSnafu {
                    path: path.clone(),
                    role: self.name.clone(),
                }
                .fail();
            }
        }
        Ok(())
    }

    /// Returns a `RoleKeys` representation of this role.
    pub fn keys(&self) -> RoleKeys {
        RoleKeys {
            keyids: self.keyids.clone(),
            threshold: self.threshold,
            _extra: HashMap::new(),
        }
    }
}
