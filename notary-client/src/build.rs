// Copyright 2019 The Notary Project Authors. All Rights Reserved.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The repository builder: consumes raw signed metadata in dependency order (root, timestamp,
//! snapshot, targets, delegations) and produces a validated in-memory repository.
//!
//! A builder is created per update attempt and discarded afterward, so a failed update never
//! disturbs the previously validated state. Delegation roles that fail validation are recorded
//! separately rather than failing the build; the client surfaces them as the "invalid"
//! repository so that a witness operation can revive them.

use crate::error::{self, Error, Result};
use crate::schema::{
    Role, RoleName, RoleType, Root, Signed, Snapshot, Targets, Timestamp,
};
use crate::trustpin::{TrustPinConfig, TrustPinPolicy};
use chrono::{DateTime, Utc};
use log::{debug, warn};
use snafu::{ensure, ResultExt};
use std::collections::{HashMap, HashSet};

/// A validated repository: the four canonical roles, with every validated delegation body
/// stitched into the targets tree.
#[derive(Debug, Clone)]
pub struct Repo {
    /// The validated root.
    pub root: Signed<Root>,
    /// The validated timestamp.
    pub timestamp: Signed<Timestamp>,
    /// The validated snapshot.
    pub snapshot: Signed<Snapshot>,
    /// The validated targets tree, delegation bodies included.
    pub targets: Signed<Targets>,
}

impl Repo {
    /// The body of a targets-type role: the top-level `targets`, or a delegation by name.
    pub fn role_body(&self, role: &RoleName) -> Option<&Signed<Targets>> {
        match role {
            RoleName::Targets => Some(&self.targets),
            RoleName::Delegation(name) => self.targets.signed.role_body(name),
            _ => None,
        }
    }

    /// The version of a role currently trusted, if the role is present.
    pub fn version_of(&self, role: &RoleName) -> Option<u64> {
        match role {
            RoleName::Root => Some(self.root.signed.version.get()),
            RoleName::Timestamp => Some(self.timestamp.signed.version.get()),
            RoleName::Snapshot => Some(self.snapshot.signed.version.get()),
            _ => self.role_body(role).map(|body| body.signed.version.get()),
        }
    }

    /// Every targets-type role name in the repository: `targets` plus all loaded delegations.
    pub fn targets_role_names(&self) -> Vec<RoleName> {
        let mut names = vec![RoleName::Targets];
        for name in self.targets.signed.role_names() {
            names.push(RoleName::Delegation(name.to_owned()));
        }
        names
    }
}

/// Delegation bodies that parsed but failed validation (bad signature, expired, version
/// rollback, checksum mismatch). Kept so that a witness can re-sign and revive them.
#[derive(Debug, Clone, Default)]
pub struct InvalidRepo {
    /// Role name to the body that failed.
    pub delegations: HashMap<String, Signed<Targets>>,
}

impl InvalidRepo {
    /// Whether anything failed validation.
    pub fn is_empty(&self) -> bool {
        self.delegations.is_empty()
    }
}

/// Assembles and validates one repository from raw metadata blobs.
#[derive(Debug)]
pub struct RepoBuilder<'a> {
    gun: &'a str,
    trust_pin: &'a TrustPinConfig,
    now: DateTime<Utc>,
    /// The previously trusted root, used to validate a rotation. When absent, the root is
    /// bootstrapped through the trust pinning policy.
    prev_root: Option<Signed<Root>>,

    root: Option<Signed<Root>>,
    timestamp: Option<Signed<Timestamp>>,
    snapshot: Option<Signed<Snapshot>>,
    targets: Option<Signed<Targets>>,
    invalid: HashMap<String, Signed<Targets>>,
    /// Delegation names we have already attempted, successfully or not.
    attempted: HashSet<String>,
}

impl<'a> RepoBuilder<'a> {
    /// Creates a builder for `gun` under the given pinning policy. `now` is sampled once so
    /// that all expiry checks within one build agree.
    pub fn new(gun: &'a str, trust_pin: &'a TrustPinConfig, now: DateTime<Utc>) -> Self {
        Self {
            gun,
            trust_pin,
            now,
            prev_root: None,
            root: None,
            timestamp: None,
            snapshot: None,
            targets: None,
            invalid: HashMap::new(),
            attempted: HashSet::new(),
        }
    }

    /// Seeds the builder with the previously trusted root, enabling root rotation validation.
    pub fn with_trusted_root(mut self, root: Signed<Root>) -> Self {
        self.prev_root = Some(root);
        self
    }

    /// The root loaded so far, if any.
    pub fn root(&self) -> Option<&Signed<Root>> {
        self.root.as_ref()
    }

    /// The timestamp loaded so far, if any.
    pub fn timestamp(&self) -> Option<&Signed<Timestamp>> {
        self.timestamp.as_ref()
    }

    /// The snapshot loaded so far, if any.
    pub fn snapshot(&self) -> Option<&Signed<Snapshot>> {
        self.snapshot.as_ref()
    }

    /// Marks a delegation as attempted without loading it, so that an unreachable role does
    /// not keep reappearing in [`RepoBuilder::unloaded_delegations`].
    pub fn skip_delegation(&mut self, name: &str) {
        self.attempted.insert(name.to_owned());
    }

    /// Loads and validates one role's raw metadata. Canonical roles must be loaded in
    /// dependency order; failures are terminal for the build. Delegation failures are recorded
    /// and do not fail the build.
    pub fn load(
        &mut self,
        role: &RoleName,
        raw: &[u8],
        min_version: u64,
        allow_expired: bool,
    ) -> Result<()> {
        match role {
            RoleName::Root => self.load_root(raw, min_version, allow_expired),
            RoleName::Timestamp => self.load_timestamp(raw, min_version, allow_expired),
            RoleName::Snapshot => self.load_snapshot(raw, min_version, allow_expired),
            RoleName::Targets => self.load_targets(raw, min_version, allow_expired),
            RoleName::Delegation(name) => {
                self.load_delegation(&name.clone(), raw, min_version, allow_expired)
            }
        }
    }

    fn check_expiry<T: Role>(&self, body: &T, role: RoleName, allow_expired: bool) -> Result<()> {
        if !allow_expired {
            ensure!(body.expires() > self.now, error::ExpiredMetadataSnafu { role });
        }
        Ok(())
    }

    fn check_version<T: Role>(&self, body: &T, role: RoleName, min_version: u64) -> Result<()> {
        ensure!(
            body.version().get() >= min_version,
            error::BadVersionSnafu {
                role,
                got: body.version().get(),
                wanted: min_version,
            }
        );
        Ok(())
    }

    fn load_root(&mut self, raw: &[u8], min_version: u64, allow_expired: bool) -> Result<()> {
        let root: Signed<Root> = serde_json::from_slice(raw).context(error::ParseMetadataSnafu {
            role: RoleName::Root,
        })?;
        root.signed.validate().context(error::BadRootSnafu)?;
        ensure!(
            !root.signed.consistent_snapshot,
            error::InvalidRoleSnafu {
                role: "root",
                reason: "consistent snapshots are not supported",
            }
        );

        // Pinned keys take precedence over everything, rotations included: a pin constrains
        // which of the declared root keys may anchor trust for as long as the pin is
        // configured. Only without a pin does a previously trusted root authorize its
        // successor, and only without either does the first-seen root authorize itself.
        let policy = self.trust_pin.policy_for(self.gun)?;
        match (&policy, &self.prev_root) {
            (TrustPinPolicy::Tofu, Some(prev)) => {
                // A rotation must satisfy both the previously trusted keys and the new body's
                // own declaration.
                prev.signed.verify_role(&root).map_err(|source| {
                    Error::RootRotationFailed {
                        source: Box::new(Error::InsufficientSignatures {
                            role: RoleName::Root,
                            source: Box::new(source),
                        }),
                    }
                })?;
                root.signed.verify_role(&root).map_err(|source| {
                    Error::RootRotationFailed {
                        source: Box::new(Error::InsufficientSignatures {
                            role: RoleName::Root,
                            source: Box::new(source),
                        }),
                    }
                })?;
            }
            (TrustPinPolicy::Tofu, None) => {
                // First-ever root for this collection with trust-on-first-use: the root
                // anchors itself.
                root.signed
                    .verify_role(&root)
                    .map_err(|source| Error::InsufficientSignatures {
                        role: RoleName::Root,
                        source: Box::new(source),
                    })?;
            }
            (pinned, _) => {
                let trusted = pinned.trusted_keyids(self.gun, &root.signed, self.now)?;
                let threshold = root
                    .signed
                    .roles
                    .get(&RoleType::Root)
                    .map(|keys| keys.threshold)
                    .ok_or_else(|| Error::BadRoot {
                        source: Box::new(crate::schema::Error::RoleNotFound {
                            name: "root".to_owned(),
                        }),
                    })?;
                crate::schema::verify_signed(
                    &root,
                    &root.signed.keys,
                    &trusted,
                    threshold,
                    "root",
                )
                .map_err(|source| Error::InsufficientSignatures {
                    role: RoleName::Root,
                    source: Box::new(source),
                })?;
                // The new root must also stand on its own declaration.
                root.signed
                    .verify_role(&root)
                    .map_err(|source| Error::InsufficientSignatures {
                        role: RoleName::Root,
                        source: Box::new(source),
                    })?;
            }
        }

        self.check_version(&root.signed, RoleName::Root, min_version)?;
        self.check_expiry(&root.signed, RoleName::Root, allow_expired)?;

        debug!("loaded root v{} for {}", root.signed.version, self.gun);
        self.root = Some(root);
        Ok(())
    }

    fn load_timestamp(&mut self, raw: &[u8], min_version: u64, allow_expired: bool) -> Result<()> {
        let root = self.root.as_ref().ok_or_else(load_order("timestamp"))?;
        let timestamp: Signed<Timestamp> =
            serde_json::from_slice(raw).context(error::ParseMetadataSnafu {
                role: RoleName::Timestamp,
            })?;

        root.signed
            .verify_role(&timestamp)
            .map_err(|source| Error::InsufficientSignatures {
                role: RoleName::Timestamp,
                source: Box::new(source),
            })?;
        self.check_version(&timestamp.signed, RoleName::Timestamp, min_version)?;
        self.check_expiry(&timestamp.signed, RoleName::Timestamp, allow_expired)?;
        ensure!(
            timestamp.signed.snapshot_meta().is_some(),
            error::InvalidRoleSnafu {
                role: "timestamp",
                reason: "timestamp does not describe a snapshot",
            }
        );

        self.timestamp = Some(timestamp);
        Ok(())
    }

    fn load_snapshot(&mut self, raw: &[u8], min_version: u64, allow_expired: bool) -> Result<()> {
        let root = self.root.as_ref().ok_or_else(load_order("snapshot"))?;
        let timestamp = self.timestamp.as_ref().ok_or_else(load_order("snapshot"))?;

        // The timestamp pins the snapshot by digest; check before even parsing.
        let meta = timestamp
            .signed
            .snapshot_meta()
            .ok_or_else(load_order("snapshot"))?;
        ensure!(
            meta.check(raw),
            error::ChecksumMismatchSnafu {
                role: RoleName::Snapshot,
            }
        );

        let snapshot: Signed<Snapshot> =
            serde_json::from_slice(raw).context(error::ParseMetadataSnafu {
                role: RoleName::Snapshot,
            })?;
        root.signed
            .verify_role(&snapshot)
            .map_err(|source| Error::InsufficientSignatures {
                role: RoleName::Snapshot,
                source: Box::new(source),
            })?;
        self.check_version(&snapshot.signed, RoleName::Snapshot, min_version)?;
        self.check_expiry(&snapshot.signed, RoleName::Snapshot, allow_expired)?;
        for required in &["root", "targets"] {
            ensure!(
                snapshot.signed.meta.contains_key(*required),
                error::InvalidRoleSnafu {
                    role: "snapshot",
                    reason: format!("snapshot does not describe {}", required),
                }
            );
        }

        self.snapshot = Some(snapshot);
        Ok(())
    }

    fn load_targets(&mut self, raw: &[u8], min_version: u64, allow_expired: bool) -> Result<()> {
        let root = self.root.as_ref().ok_or_else(load_order("targets"))?;
        let snapshot = self.snapshot.as_ref().ok_or_else(load_order("targets"))?;

        let meta = snapshot
            .signed
            .meta
            .get("targets")
            .ok_or_else(load_order("targets"))?;
        ensure!(
            meta.check(raw),
            error::ChecksumMismatchSnafu {
                role: RoleName::Targets,
            }
        );

        let targets: Signed<Targets> =
            serde_json::from_slice(raw).context(error::ParseMetadataSnafu {
                role: RoleName::Targets,
            })?;
        root.signed
            .verify_role(&targets)
            .map_err(|source| Error::InsufficientSignatures {
                role: RoleName::Targets,
                source: Box::new(source),
            })?;
        self.check_version(&targets.signed, RoleName::Targets, min_version)?;
        self.check_expiry(&targets.signed, RoleName::Targets, allow_expired)?;

        self.targets = Some(targets);
        Ok(())
    }

    /// Loads a delegation role. Unlike the canonical roles, a delegation that fails validation
    /// is recorded as invalid and the build continues; the rest of the tree is still usable.
    fn load_delegation(
        &mut self,
        name: &str,
        raw: &[u8],
        min_version: u64,
        allow_expired: bool,
    ) -> Result<()> {
        self.attempted.insert(name.to_owned());

        let body: Signed<Targets> = match serde_json::from_slice(raw) {
            Ok(body) => body,
            Err(err) => {
                warn!("delegation {} failed to parse, skipping: {}", name, err);
                return Ok(());
            }
        };

        if let Err(err) = self.validate_delegation(name, raw, &body, min_version, allow_expired) {
            warn!("delegation {} failed validation: {}", name, err);
            self.invalid.insert(name.to_owned(), body);
            return Ok(());
        }

        let targets = self.targets.as_mut().ok_or_else(load_order(name))?;
        match targets.signed.delegated_role_mut(name) {
            Some(role) => role.targets = Some(body),
            None => {
                warn!("delegation {} is not declared by any loaded role", name);
            }
        }
        Ok(())
    }

    fn validate_delegation(
        &self,
        name: &str,
        raw: &[u8],
        body: &Signed<Targets>,
        min_version: u64,
        allow_expired: bool,
    ) -> Result<()> {
        let targets = self.targets.as_ref().ok_or_else(load_order(name))?;
        let snapshot = self.snapshot.as_ref().ok_or_else(load_order(name))?;

        let meta = snapshot
            .signed
            .meta
            .get(name)
            .ok_or_else(|| Error::MetaNotFound {
                resource: name.to_owned(),
            })?;
        ensure!(
            meta.check(raw),
            error::ChecksumMismatchSnafu {
                role: RoleName::Delegation(name.to_owned()),
            }
        );

        let parent = targets
            .signed
            .parent_of(name)
            .ok_or_else(|| Error::InvalidRole {
                role: name.to_owned(),
                reason: "no loaded role delegates to it".to_owned(),
            })?;
        parent
            .verify_role(body, name)
            .map_err(|source| Error::InsufficientSignatures {
                role: RoleName::Delegation(name.to_owned()),
                source: Box::new(source),
            })?;

        let role_name = RoleName::Delegation(name.to_owned());
        self.check_version(&body.signed, role_name.clone(), min_version)?;
        self.check_expiry(&body.signed, role_name, allow_expired)?;

        // A delegation may only re-delegate paths it holds itself.
        if let (Some(declared), Some(delegations)) =
            (targets.signed.delegated_role(name), &body.signed.delegations)
        {
            for child in &delegations.roles {
                declared
                    .verify_paths(&child.paths)
                    .context(error::SchemaSnafu)?;
            }
        }
        Ok(())
    }

    /// Delegation role names that are declared by loaded bodies but have not been attempted
    /// yet. The caller fetches these and feeds them back through [`RepoBuilder::load`].
    pub fn unloaded_delegations(&self) -> Vec<String> {
        let targets = match &self.targets {
            Some(targets) => targets,
            None => return Vec::new(),
        };
        targets
            .signed
            .role_names()
            .into_iter()
            .filter(|name| !self.attempted.contains(*name))
            .map(str::to_owned)
            .collect()
    }

    /// Produces the validated repository and whatever failed along the way.
    pub fn finish(self) -> Result<(Repo, InvalidRepo)> {
        let repo = Repo {
            root: self.root.ok_or_else(load_order("root"))?,
            timestamp: self.timestamp.ok_or_else(load_order("timestamp"))?,
            snapshot: self.snapshot.ok_or_else(load_order("snapshot"))?,
            targets: self.targets.ok_or_else(load_order("targets"))?,
        };
        Ok((
            repo,
            InvalidRepo {
                delegations: self.invalid,
            },
        ))
    }
}

/// Assembles a repository entirely from one metadata store, e.g. to materialize a historical
/// state that a checksum-addressed store serves, or a test fixture. The store must hold a
/// complete, internally consistent set of roles.
pub fn load_repo_from_store(
    gun: &str,
    trust_pin: &TrustPinConfig,
    store: &dyn crate::storage::MetadataStore,
    prev_root: Option<Signed<Root>>,
    allow_expired: bool,
) -> Result<(Repo, InvalidRepo)> {
    let mut builder = RepoBuilder::new(gun, trust_pin, Utc::now());
    if let Some(root) = prev_root {
        builder = builder.with_trusted_root(root);
    }

    let root_raw = store.get_sized("root", -1)?;
    builder.load(&RoleName::Root, &root_raw, 1, allow_expired)?;
    let timestamp_raw = store.get_sized("timestamp", -1)?;
    builder.load(&RoleName::Timestamp, &timestamp_raw, 1, allow_expired)?;
    let snapshot_raw = store.get_sized("snapshot", -1)?;
    builder.load(&RoleName::Snapshot, &snapshot_raw, 1, allow_expired)?;
    let targets_raw = store.get_sized("targets", -1)?;
    builder.load(&RoleName::Targets, &targets_raw, 1, allow_expired)?;

    loop {
        let pending = builder.unloaded_delegations();
        if pending.is_empty() {
            break;
        }
        for name in pending {
            match store.get_sized(&name, -1) {
                Ok(raw) => {
                    builder.load(
                        &RoleName::Delegation(name.clone()),
                        &raw,
                        1,
                        allow_expired,
                    )?;
                }
                Err(err) => {
                    warn!("could not fetch delegation {}: {}", name, err);
                    builder.skip_delegation(&name);
                }
            }
        }
    }

    builder.finish()
}

/// The error for loading roles out of dependency order, or finishing an incomplete build.
fn load_order(role: &str) -> impl FnOnce() -> Error + '_ {
    move || Error::InvalidOperation {
        detail: Some(format!(
            "cannot load {} before its dependencies are loaded",
            role
        )),
    }
}
