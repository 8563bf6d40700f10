// Copyright 2019 The Notary Project Authors. All Rights Reserved.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The repository client: the high-level verbs over one trusted collection.
//!
//! A `Repository` owns the metadata cache, the remote mirror store, the changelist, and the
//! cryptoservice for its collection. Read verbs (`list_targets`, `get_target`) work from the
//! last validated repository; write verbs (`add_target`, `remove_target`, `add_delegation`,
//! `witness`) only append to the changelist, and `publish` replays the changelist against the
//! latest validated state, re-signs what changed, and uploads the result as one transaction.

use crate::build::{InvalidRepo, Repo, RepoBuilder};
use crate::cache::{self, CacheLock};
use crate::changelist::{Action, Change, ChangeList, ChangeType, TufDelegation};
use crate::diff::TargetWithRole;
use crate::error::{self, Error, Result};
use crate::passphrase::PassphraseRetriever;
use crate::schema::decoded::{Decoded, Hex};
use crate::schema::key::Key;
use crate::schema::{
    FileMeta, Role, RoleKeys, RoleName, RoleType, Root, Signature, Signed, Snapshot, Target,
    Targets, Timestamp,
};
use crate::service::CryptoService;
use crate::sign::KeyAlgorithm;
use crate::storage::{
    ClientSettings, FilesystemStore, HttpMirrorStore, MetadataStore, OfflineStore,
};
use crate::trustpin::TrustPinConfig;
use crate::walk::{walk_targets, VisitorOutcome};
use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use serde::Serialize;
use snafu::{ensure, ResultExt};
use std::collections::{HashMap, HashSet};
use std::num::NonZeroU64;
use std::path::PathBuf;

/// The largest timestamp we will download, since nothing vouches for its size.
const TIMESTAMP_MAX_SIZE: i64 = 1024 * 1024;
/// The largest root we will download; roots carry certificates and can be sizable.
const ROOT_MAX_SIZE: i64 = 5 * 1024 * 1024;

/// How far in the future newly signed metadata expires, per role.
fn default_expires(role: &RoleName) -> DateTime<Utc> {
    let now = Utc::now();
    match role {
        RoleName::Root => now + Duration::days(3650),
        RoleName::Timestamp => now + Duration::days(14),
        RoleName::Snapshot => now + Duration::days(1095),
        RoleName::Targets | RoleName::Delegation(_) => now + Duration::days(1095),
    }
}

/// Settings for opening a [`Repository`].
#[derive(Debug, Clone)]
pub struct Settings {
    /// The collection this repository manages.
    pub gun: String,
    /// The trust directory holding caches and keys.
    pub trust_dir: PathBuf,
    /// The trust server base URL. `None` means offline: remote operations fail with
    /// `OfflineStore` and everything else works from the cache.
    pub server_url: Option<String>,
    /// HTTP client settings for the remote store.
    pub client: ClientSettings,
    /// The trust pinning policy consulted when bootstrapping the root.
    pub trust_pin: TrustPinConfig,
    /// When rotating the root key, how many previous root versions to also satisfy with
    /// signatures, for clients that have not caught up.
    pub legacy_versions: u32,
}

/// A client for one trusted collection.
#[derive(Debug)]
pub struct Repository {
    gun: String,
    trust_dir: PathBuf,
    cache: FilesystemStore,
    remote: Box<dyn MetadataStore>,
    crypto: CryptoService,
    trust_pin: TrustPinConfig,
    changelist: ChangeList,
    legacy_versions: u32,
    current: Option<Repo>,
    invalid: InvalidRepo,
    _lock: CacheLock,
}

impl Repository {
    /// Opens a repository client, taking the single-writer lock for the collection's cache.
    pub fn open(settings: Settings, crypto: CryptoService) -> Result<Self> {
        let lock = CacheLock::acquire(&settings.trust_dir, &settings.gun)?;
        let cache = FilesystemStore::new(cache::metadata_dir(&settings.trust_dir, &settings.gun));
        let changelist =
            ChangeList::open(cache::changelist_dir(&settings.trust_dir, &settings.gun))?;
        let remote: Box<dyn MetadataStore> = match &settings.server_url {
            Some(url) => Box::new(HttpMirrorStore::new(url, &settings.gun, settings.client)?),
            None => Box::new(OfflineStore),
        };
        Ok(Self {
            gun: settings.gun,
            trust_dir: settings.trust_dir,
            cache,
            remote,
            crypto,
            trust_pin: settings.trust_pin,
            changelist,
            legacy_versions: settings.legacy_versions,
            current: None,
            invalid: InvalidRepo::default(),
            _lock: lock,
        })
    }

    /// Replaces the remote store. Used by tests and by callers that bring their own transport.
    pub fn with_remote(mut self, remote: Box<dyn MetadataStore>) -> Self {
        self.remote = remote;
        self
    }

    /// The collection this client manages.
    pub fn gun(&self) -> &str {
        &self.gun
    }

    /// The trust directory this client works under.
    pub fn trust_dir(&self) -> &std::path::Path {
        &self.trust_dir
    }

    /// The last validated repository, if an update or publish has succeeded.
    pub fn current(&self) -> Option<&Repo> {
        self.current.as_ref()
    }

    /// Delegation bodies that failed validation during the last update. A role here can be
    /// revived with [`Repository::witness`] followed by [`Repository::publish`].
    pub fn invalid(&self) -> &InvalidRepo {
        &self.invalid
    }

    /// The cryptoservice backing this repository.
    pub fn crypto(&self) -> &CryptoService {
        &self.crypto
    }

    /// Pending changes staged for the next publish.
    pub fn changelist(&self) -> &ChangeList {
        &self.changelist
    }

    // =^..^= initialize =^..^=

    /// Creates the initial metadata for a brand-new collection.
    ///
    /// The root role uses the keys named by `root_key_ids` (resolved through the
    /// cryptoservice) plus any public `root_certs` supplied out of band. Keys for targets and
    /// snapshot are generated locally unless the role is listed in `server_managed_roles`, in
    /// which case the server provides the public key. The timestamp key always comes from the
    /// server. All four roles are written to the cache; nothing is uploaded until
    /// [`Repository::publish`].
    pub fn initialize(
        &mut self,
        root_key_ids: &[String],
        root_certs: &[Key],
        server_managed_roles: &[RoleName],
        retriever: &dyn PassphraseRetriever,
    ) -> Result<()> {
        if self.cache.get_sized("root", -1).is_ok() {
            return error::RepoAlreadyExistsSnafu { gun: &self.gun }.fail();
        }
        for role in server_managed_roles {
            match role {
                RoleName::Snapshot | RoleName::Timestamp => {}
                other => {
                    return error::InvalidRemoteRoleSnafu { role: other.clone() }.fail();
                }
            }
        }
        ensure!(
            !root_key_ids.is_empty() || !root_certs.is_empty(),
            error::InvalidOperationSnafu {
                detail: Some("initialization requires at least one root key".to_owned()),
            }
        );

        // Assemble the root key set.
        let mut keys: HashMap<Decoded<Hex>, Key> = HashMap::new();
        let mut root_ids = Vec::new();
        for key_id in root_key_ids {
            let (signer, _) = self.crypto.private_key(key_id, retriever)?;
            let key = signer.tuf_key();
            let id = key.key_id().context(error::SchemaSnafu)?;
            root_ids.push(id.clone());
            keys.insert(id, key);
        }
        for key in root_certs {
            let id = key.key_id().context(error::SchemaSnafu)?;
            root_ids.push(id.clone());
            keys.insert(id, key.clone());
        }

        let server_managed = |role: &RoleName| server_managed_roles.contains(role);
        let mut roles: HashMap<RoleType, RoleKeys> = HashMap::new();
        roles.insert(RoleType::Root, RoleKeys::new(root_ids.clone(), 1));

        for role in [RoleName::Targets, RoleName::Snapshot] {
            let key = if server_managed(&role) {
                self.remote.rotate_key(&role)?
            } else {
                self.crypto.create(
                    role.clone(),
                    Some(self.gun.clone()),
                    KeyAlgorithm::Ecdsa,
                    retriever,
                )?
            };
            let id = key.key_id().context(error::SchemaSnafu)?;
            let role_type = role.canonical().unwrap_or(RoleType::Targets);
            roles.insert(role_type, RoleKeys::new(vec![id.clone()], 1));
            keys.insert(id, key);
        }

        // The timestamp key is always server-managed.
        let timestamp_key = self.remote.rotate_key(&RoleName::Timestamp)?;
        let timestamp_id = timestamp_key.key_id().context(error::SchemaSnafu)?;
        roles.insert(RoleType::Timestamp, RoleKeys::new(vec![timestamp_id.clone()], 1));
        keys.insert(timestamp_id, timestamp_key);

        let root_body = Root {
            consistent_snapshot: false,
            version: one(),
            expires: default_expires(&RoleName::Root),
            keys,
            roles,
            _extra: HashMap::new(),
        };

        // Sign and serialize, bottom-up so each parent can record its children's digests.
        let targets_body = Targets::new(one(), default_expires(&RoleName::Targets));
        let signed_targets =
            self.sign_canonical_role(&root_body, targets_body, RoleName::Targets, retriever)?;
        let targets_bytes = serialize_signed(&signed_targets, "targets")?;

        let root = self.sign_root(&root_body, root_body.clone(), &[], retriever)?;
        let root_bytes = serialize_signed(&root, "root")?;

        let mut snapshot_body = Snapshot::new(one(), default_expires(&RoleName::Snapshot));
        snapshot_body
            .meta
            .insert("root".to_owned(), FileMeta::describe(&root_bytes));
        snapshot_body
            .meta
            .insert("targets".to_owned(), FileMeta::describe(&targets_bytes));
        let (snapshot, snapshot_bytes) = if server_managed(&RoleName::Snapshot) {
            // The server holds the snapshot key; stage the body unsigned and let the server
            // complete it on first publish.
            let unsigned = Signed {
                signed: snapshot_body,
                signatures: Vec::new(),
            };
            let bytes = serialize_signed(&unsigned, "snapshot")?;
            (unsigned, bytes)
        } else {
            let signed = self.sign_canonical_role(
                &root.signed,
                snapshot_body,
                RoleName::Snapshot,
                retriever,
            )?;
            let bytes = serialize_signed(&signed, "snapshot")?;
            (signed, bytes)
        };

        // The timestamp is staged unsigned: its key lives on the server, which signs it at
        // publish time.
        let timestamp = Signed {
            signed: Timestamp::new(one(), default_expires(&RoleName::Timestamp), &snapshot_bytes),
            signatures: Vec::new(),
        };
        let timestamp_bytes = serialize_signed(&timestamp, "timestamp")?;

        self.cache.set("root", &root_bytes)?;
        self.cache
            .set(&format!("{}.root", root.signed.version), &root_bytes)?;
        self.cache.set("targets", &targets_bytes)?;
        self.cache.set("snapshot", &snapshot_bytes)?;
        self.cache.set("timestamp", &timestamp_bytes)?;

        info!("initialized trust data for {}", self.gun);
        self.current = Some(Repo {
            root,
            timestamp,
            snapshot,
            targets: signed_targets,
        });
        Ok(())
    }

    // =^..^= update =^..^=

    /// Pulls and validates the collection's metadata from the remote, replacing the current
    /// repository on success. On any failure the previous state is retained. The changelist is
    /// never touched.
    pub fn update(&mut self) -> Result<()> {
        let timestamp_raw = match self.remote.get_sized("timestamp", TIMESTAMP_MAX_SIZE) {
            Ok(raw) => raw,
            Err(Error::MetaNotFound { .. }) => {
                return error::RepositoryNotExistSnafu {
                    remote: self.remote.location(),
                    gun: &self.gun,
                }
                .fail();
            }
            Err(err) => return Err(err),
        };

        let now = Utc::now();
        let mut builder = RepoBuilder::new(&self.gun, &self.trust_pin, now);

        // The previously trusted root anchors rotation; absent one, trust pinning governs.
        let cached_root = self.read_cached_root()?;
        let mut root_floor = 1;
        if let Some(cached) = &cached_root {
            root_floor = cached.signed.version.get();
            builder = builder.with_trusted_root(cached.clone());
        }
        if let Some(current) = &self.current {
            root_floor = root_floor.max(current.root.signed.version.get());
        }

        let mut writes: Vec<(String, Vec<u8>)> = Vec::new();

        let root_raw = match self.remote.get_sized("root", ROOT_MAX_SIZE) {
            Ok(raw) => raw,
            Err(Error::MetaNotFound { .. }) => match &cached_root {
                Some(_) => self.cache.get_sized("root", -1)?,
                None => {
                    return error::RepositoryNotExistSnafu {
                        remote: self.remote.location(),
                        gun: &self.gun,
                    }
                    .fail()
                }
            },
            Err(err) => return Err(err),
        };
        builder.load(&RoleName::Root, &root_raw, root_floor, false)?;
        writes.push(("root".to_owned(), root_raw.clone()));

        let floor = |current: &Option<Repo>, role: &RoleName| -> u64 {
            current
                .as_ref()
                .and_then(|repo| repo.version_of(role))
                .unwrap_or(1)
        };

        builder.load(
            &RoleName::Timestamp,
            &timestamp_raw,
            floor(&self.current, &RoleName::Timestamp),
            false,
        )?;
        writes.push(("timestamp".to_owned(), timestamp_raw));

        // Prefer cached bytes when they still match the digest the parent records; otherwise
        // fetch from the remote, bounded by the recorded length.
        let snapshot_meta = builder
            .timestamp()
            .and_then(|ts| ts.signed.snapshot_meta())
            .cloned()
            .ok_or_else(|| Error::InvalidRole {
                role: "timestamp".to_owned(),
                reason: "timestamp does not describe a snapshot".to_owned(),
            })?;
        let snapshot_raw = self.cached_or_remote("snapshot", &snapshot_meta)?;
        builder.load(
            &RoleName::Snapshot,
            &snapshot_raw,
            floor(&self.current, &RoleName::Snapshot),
            false,
        )?;
        writes.push(("snapshot".to_owned(), snapshot_raw));

        let targets_meta = builder
            .snapshot()
            .and_then(|snapshot| snapshot.signed.meta.get("targets"))
            .cloned()
            .ok_or_else(|| Error::InvalidRole {
                role: "snapshot".to_owned(),
                reason: "snapshot does not describe targets".to_owned(),
            })?;
        let targets_raw = self.cached_or_remote("targets", &targets_meta)?;
        builder.load(
            &RoleName::Targets,
            &targets_raw,
            floor(&self.current, &RoleName::Targets),
            false,
        )?;
        writes.push(("targets".to_owned(), targets_raw));

        // Walk delegations breadth-first: loading one role can reveal more.
        loop {
            let pending = builder.unloaded_delegations();
            if pending.is_empty() {
                break;
            }
            for name in pending {
                let role = RoleName::Delegation(name.clone());
                let meta = match builder
                    .snapshot()
                    .and_then(|snapshot| snapshot.signed.meta.get(&name))
                    .cloned()
                {
                    Some(meta) => meta,
                    None => {
                        warn!("delegation {} is not described by the snapshot, skipping", name);
                        builder.skip_delegation(&name);
                        continue;
                    }
                };
                let raw = match self.cached_or_remote(&name, &meta) {
                    Ok(raw) => raw,
                    Err(err) => {
                        warn!("could not fetch delegation {}: {}", name, err);
                        builder.skip_delegation(&name);
                        continue;
                    }
                };
                builder.load(&role, &raw, floor(&self.current, &role), false)?;
                writes.push((name, raw));
            }
        }

        let (repo, invalid) = builder.finish()?;

        for (name, raw) in &writes {
            self.cache.set(name, raw)?;
        }
        self.cache
            .set(&format!("{}.root", repo.root.signed.version), &root_raw)?;

        debug!(
            "updated {}: root v{}, targets v{}",
            self.gun, repo.root.signed.version, repo.targets.signed.version
        );
        self.current = Some(repo);
        self.invalid = invalid;
        Ok(())
    }

    fn read_cached_root(&self) -> Result<Option<Signed<Root>>> {
        match self.cache.get_sized("root", -1) {
            Ok(raw) => {
                let root = serde_json::from_slice(&raw).context(error::CacheCorruptSnafu {
                    role: RoleName::Root,
                })?;
                Ok(Some(root))
            }
            Err(Error::MetaNotFound { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn cached_or_remote(&self, name: &str, meta: &FileMeta) -> Result<Vec<u8>> {
        if let Ok(cached) = self.cache.get_sized(name, -1) {
            if meta.check(&cached) {
                return Ok(cached);
            }
        }
        self.remote.get_sized(name, meta.length as i64)
    }

    // =^..^= staging verbs =^..^=

    /// Stages the addition of a target to each of `roles` (the top-level targets role when
    /// empty). Unknown delegation roles are accepted here and validated at publish, so a
    /// delegate can stage work before its role is visible locally.
    pub fn add_target(
        &self,
        name: &str,
        target: Target,
        roles: &[RoleName],
    ) -> Result<()> {
        ensure!(
            target.hashes.sha256.len() == 32,
            error::InvalidOperationSnafu {
                detail: Some(format!("target {} must carry a sha256 digest", name)),
            }
        );
        let data = serde_json::to_vec(&target).context(error::SerializeMetadataSnafu {
            what: "target",
        })?;
        for role in targets_roles_or_default(roles)? {
            if let Some(current) = &self.current {
                // Validate the path eagerly when the role is already known.
                if let RoleName::Delegation(delegation) = &role {
                    if let Some(declared) =
                        current.targets.signed.delegated_role(delegation)
                    {
                        ensure!(
                            declared.covers_path(name),
                            error::InvalidRoleSnafu {
                                role: delegation.clone(),
                                reason: format!("path {} is not delegated to it", name),
                            }
                        );
                    }
                }
            }
            self.changelist
                .add(&Change::target(Action::Create, role, name, data.clone()))?;
        }
        Ok(())
    }

    /// Stages the removal of a target from each of `roles`.
    pub fn remove_target(&self, name: &str, roles: &[RoleName]) -> Result<()> {
        for role in targets_roles_or_default(roles)? {
            self.changelist
                .add(&Change::target(Action::Delete, role, name, Vec::new()))?;
        }
        Ok(())
    }

    /// Stages creation of (or edits to) a delegation role.
    pub fn add_delegation(&self, role: RoleName, delegation: &TufDelegation) -> Result<()> {
        ensure!(
            role.is_delegation(),
            error::InvalidRoleSnafu {
                role: role.to_string(),
                reason: "only delegation roles can be delegated".to_owned(),
            }
        );
        let data = serde_json::to_vec(delegation).context(error::SerializeMetadataSnafu {
            what: "delegation",
        })?;
        self.changelist
            .add(&Change::delegation(Action::Create, role, data))
    }

    /// Stages removal of a delegation role.
    pub fn remove_delegation(&self, role: RoleName) -> Result<()> {
        ensure!(
            role.is_delegation(),
            error::InvalidRoleSnafu {
                role: role.to_string(),
                reason: "only delegation roles can be removed".to_owned(),
            }
        );
        self.changelist
            .add(&Change::delegation(Action::Delete, role, Vec::new()))
    }

    /// Marks roles for re-signing on the next publish even if their content has not changed.
    /// Returns the roles actually staged. Witnessing can revive a role that failed validation,
    /// since publishing re-signs it with locally held keys.
    pub fn witness(&self, roles: &[RoleName]) -> Result<Vec<RoleName>> {
        let mut witnessed = Vec::new();
        for role in roles {
            match role {
                RoleName::Root | RoleName::Timestamp => {
                    return error::InvalidRoleSnafu {
                        role: role.to_string(),
                        reason: "cannot witness".to_owned(),
                    }
                    .fail();
                }
                _ => {}
            }
            self.changelist.add(&Change::witness(role.clone()))?;
            witnessed.push(role.clone());
        }
        Ok(witnessed)
    }

    // =^..^= read verbs =^..^=

    /// Lists every resolvable target reachable from `roles` (the whole tree when empty). When
    /// several roles bind the same name, the deeper role's binding wins.
    pub fn list_targets(&self, roles: &[RoleName]) -> Result<Vec<TargetWithRole>> {
        let repo = self.require_current()?;
        let starts = if roles.is_empty() {
            vec![RoleName::Targets]
        } else {
            roles.to_vec()
        };
        let mut resolved: HashMap<String, TargetWithRole> = HashMap::new();
        for start in &starts {
            walk_targets(repo, None, start, &mut |walked| {
                for (name, target) in &walked.body.signed.targets {
                    if let Some(paths) = walked.paths {
                        if !paths.iter().any(|p| name.starts_with(p.as_str())) {
                            continue;
                        }
                    }
                    // Pre-order puts parents first; a later (deeper) binding shadows.
                    resolved.insert(
                        name.clone(),
                        TargetWithRole {
                            name: name.clone(),
                            target: target.clone(),
                            role: walked.role.clone(),
                        },
                    );
                }
                Ok(VisitorOutcome::Continue)
            })?;
        }
        let mut listing: Vec<TargetWithRole> = resolved.into_values().collect();
        listing.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(listing)
    }

    /// Returns the first binding for `name` in a depth-first walk of the delegation tree.
    pub fn get_target(&self, name: &str) -> Result<TargetWithRole> {
        let repo = self.require_current()?;
        let mut found: Option<TargetWithRole> = None;
        walk_targets(repo, Some(name), &RoleName::Targets, &mut |walked| {
            if let Some(target) = walked.body.signed.targets.get(name) {
                if walked
                    .paths
                    .map_or(true, |paths| paths.iter().any(|p| name.starts_with(p.as_str())))
                {
                    found = Some(TargetWithRole {
                        name: name.to_owned(),
                        target: target.clone(),
                        role: walked.role.clone(),
                    });
                    return Ok(VisitorOutcome::StopAll);
                }
            }
            Ok(VisitorOutcome::Continue)
        })?;
        found.ok_or_else(|| error::NoSuchTargetSnafu { name }.build())
    }

    /// Computes the difference between this repository's current state and `other`.
    pub fn diff_against(&self, other: &Repo) -> Result<crate::diff::RepoDiff> {
        let repo = self.require_current()?;
        Ok(crate::diff::diff(repo, other))
    }

    fn require_current(&self) -> Result<&Repo> {
        self.current
            .as_ref()
            .ok_or_else(|| error::RepoNotInitializedSnafu { gun: &self.gun }.build())
    }

    // =^..^= key rotation =^..^=

    /// Rotates the key for a canonical role and publishes the new root immediately.
    ///
    /// The new root is always signed with the previous root keys (which must still be
    /// available) as well as the new ones; with `legacy_versions` set, signatures satisfying
    /// that many prior root versions are added when the cached copies can be found.
    pub fn rotate_key(
        &mut self,
        role: RoleName,
        server_managed: bool,
        new_key_ids: &[String],
        retriever: &dyn PassphraseRetriever,
    ) -> Result<()> {
        match (&role, server_managed) {
            (RoleName::Root, true) | (RoleName::Targets, true) => {
                return error::InvalidRemoteRoleSnafu { role }.fail();
            }
            (RoleName::Timestamp, false) => {
                return error::InvalidLocalRoleSnafu { role }.fail();
            }
            (RoleName::Delegation(_), _) => {
                return error::InvalidRoleSnafu {
                    role: role.to_string(),
                    reason: "delegation keys rotate through their delegating role".to_owned(),
                }
                .fail();
            }
            _ => {}
        }

        self.ensure_current()?;
        let repo = self.require_current()?.clone();
        let old_root_body = repo.root.signed.clone();
        let role_type = role.canonical().unwrap_or(RoleType::Root);
        let old_keyids = old_root_body
            .roles
            .get(&role_type)
            .map(|keys| keys.keyids.clone())
            .unwrap_or_default();

        // Obtain the replacement key set.
        let mut new_keys = Vec::new();
        if !new_key_ids.is_empty() {
            for key_id in new_key_ids {
                let (signer, _) = self.crypto.private_key(key_id, retriever)?;
                new_keys.push(signer.tuf_key());
            }
        } else if server_managed {
            new_keys.push(self.remote.rotate_key(&role)?);
        } else {
            new_keys.push(self.crypto.create(
                role.clone(),
                Some(self.gun.clone()),
                KeyAlgorithm::Ecdsa,
                retriever,
            )?);
        }

        // Rewrite the root body: swap the role's key set, prune unreferenced keys.
        let mut root_body = old_root_body.clone();
        let mut new_ids = Vec::new();
        for key in &new_keys {
            let id = key.key_id().context(error::SchemaSnafu)?;
            root_body.keys.insert(id.clone(), key.clone());
            new_ids.push(id);
        }
        root_body.roles.insert(role_type, RoleKeys::new(new_ids, 1));
        prune_unreferenced_keys(&mut root_body);
        root_body.version = bump(root_body.version);
        root_body.expires = default_expires(&RoleName::Root);

        let root = self.sign_root(&old_root_body, root_body, &old_keyids, retriever)?;
        let root_bytes = serialize_signed(&root, "root")?;

        let mut payload: HashMap<String, Vec<u8>> = HashMap::new();
        payload.insert("root".to_owned(), root_bytes.clone());

        // Rotating the targets key obsoletes the targets signature; re-sign it with the new
        // key so the published state verifies against the new root.
        let mut new_targets = None;
        if role == RoleName::Targets {
            let role_keys = root
                .signed
                .roles
                .get(&RoleType::Targets)
                .cloned()
                .ok_or_else(|| Error::InvalidRole {
                    role: "targets".to_owned(),
                    reason: "root does not define the targets role".to_owned(),
                })?;
            let mut targets_body = repo.targets.signed.clone();
            targets_body.version = bump(targets_body.version);
            targets_body.expires = default_expires(&RoleName::Targets);
            let signed = self.sign_body(
                targets_body,
                &role_keys.keyids,
                role_keys.threshold.get(),
                RoleName::Targets,
                retriever,
            )?;
            let bytes = serialize_signed(&signed, "targets")?;
            payload.insert("targets".to_owned(), bytes);
            new_targets = Some(signed);
        }

        // Where we hold the snapshot key, refresh the snapshot's record of the re-signed
        // roles so the published state stays internally consistent; a server-managed snapshot
        // is the server's to refresh.
        let mut new_snapshot = None;
        let snapshot_keys = repo
            .root
            .signed
            .roles
            .get(&RoleType::Snapshot)
            .cloned()
            .map(|keys| RoleKeys {
                keyids: if role == RoleName::Snapshot {
                    root.signed
                        .roles
                        .get(&RoleType::Snapshot)
                        .map(|k| k.keyids.clone())
                        .unwrap_or_default()
                } else {
                    keys.keyids
                },
                ..keys
            });
        if let Some(role_keys) = snapshot_keys {
            let mut snapshot_body = repo.snapshot.signed.clone();
            snapshot_body
                .meta
                .insert("root".to_owned(), FileMeta::describe(&root_bytes));
            if let Some(bytes) = payload.get("targets") {
                snapshot_body
                    .meta
                    .insert("targets".to_owned(), FileMeta::describe(bytes));
            }
            snapshot_body.version = bump(snapshot_body.version);
            snapshot_body.expires = default_expires(&RoleName::Snapshot);
            match self.sign_body(
                snapshot_body,
                &role_keys.keyids,
                role_keys.threshold.get(),
                RoleName::Snapshot,
                retriever,
            ) {
                Ok(signed) => {
                    let bytes = serialize_signed(&signed, "snapshot")?;
                    payload.insert("snapshot".to_owned(), bytes);
                    new_snapshot = Some(signed);
                }
                Err(Error::InsufficientSignatures { .. }) => {
                    debug!("no local snapshot key; the server will refresh the snapshot");
                }
                Err(err) => return Err(err),
            }
        }

        self.remote.set_multi(&payload)?;

        for (name, bytes) in &payload {
            self.cache.set(name, bytes)?;
        }
        self.cache
            .set(&format!("{}.root", root.signed.version), &root_bytes)?;

        // Old keys for a non-root role have no further use locally.
        if role != RoleName::Root {
            for keyid in &old_keyids {
                if let Err(err) = self.crypto.remove_key(&keyid.to_string()) {
                    if !err.is_key_not_found() {
                        warn!("could not remove rotated key {}: {}", keyid, err);
                    }
                }
            }
        }

        if let Some(current) = &mut self.current {
            current.root = root;
            if let Some(targets) = new_targets {
                current.targets = targets;
            }
            if let Some(snapshot) = new_snapshot {
                current.snapshot = snapshot;
            }
        }
        info!("rotated {} key for {}", role, self.gun);
        Ok(())
    }

    // =^..^= publish =^..^=

    /// Replays the changelist against the latest validated repository, re-signs every role
    /// that changed (cascading into the snapshot), uploads the result as one transaction, and
    /// clears the changelist.
    ///
    /// On any failure before the upload succeeds, the changelist and local cache are left
    /// exactly as they were.
    pub fn publish(&mut self, retriever: &dyn PassphraseRetriever) -> Result<()> {
        let mut first_publish = false;
        if self.current.is_none() {
            match self.update() {
                Ok(()) => {}
                Err(Error::RepositoryNotExist { .. }) => {
                    // The remote has nothing yet; publish whatever was initialized locally.
                    self.bootstrap_from_cache()?;
                    first_publish = true;
                }
                Err(err) => return Err(err),
            }
        }

        let changes = self.changelist.list()?;
        if changes.is_empty() && !first_publish {
            debug!("nothing staged for {}, skipping publish", self.gun);
            return Ok(());
        }

        let mut working = self.require_current()?.clone();
        let outcome = apply_changelist(&mut working, &self.invalid, &changes)?;

        let mut payload: HashMap<String, Vec<u8>> = HashMap::new();

        // Re-sign each dirty targets-type role.
        for role in &outcome.dirty {
            let (keyids, threshold) = signing_set(&working, role)?;
            let mut body = working
                .role_body(role)
                .ok_or_else(|| Error::InvalidRole {
                    role: role.to_string(),
                    reason: "role disappeared while publishing".to_owned(),
                })?
                .signed
                .clone();
            body.version = bump(body.version);
            body.expires = default_expires(role);
            let signed = self.sign_body(body, &keyids, threshold, role.clone(), retriever)?;
            let bytes = serialize_signed(&signed, &role.to_string())?;
            replace_role_body(&mut working, role, signed);
            payload.insert(role.to_string(), bytes);
        }

        // A change to any targets-type role (or an explicit snapshot witness) obsoletes the
        // snapshot. The timestamp is the server's to refresh.
        if !payload.is_empty() || outcome.snapshot_dirty || first_publish {
            let mut snapshot_body = working.snapshot.signed.clone();
            for (name, bytes) in &payload {
                snapshot_body
                    .meta
                    .insert(name.clone(), FileMeta::describe(bytes));
            }
            for removed in &outcome.removed {
                snapshot_body.meta.remove(removed);
            }
            if first_publish {
                let root_bytes = serialize_signed(&working.root, "root")?;
                snapshot_body
                    .meta
                    .insert("root".to_owned(), FileMeta::describe(&root_bytes));
                payload.insert("root".to_owned(), root_bytes);
                if !payload.contains_key("targets") {
                    let targets_bytes = serialize_signed(&working.targets, "targets")?;
                    snapshot_body
                        .meta
                        .insert("targets".to_owned(), FileMeta::describe(&targets_bytes));
                    payload.insert("targets".to_owned(), targets_bytes);
                }
            }
            snapshot_body.version = bump(snapshot_body.version);
            snapshot_body.expires = default_expires(&RoleName::Snapshot);

            let role_keys = working
                .root
                .signed
                .roles
                .get(&RoleType::Snapshot)
                .cloned()
                .ok_or_else(|| Error::InvalidRole {
                    role: "snapshot".to_owned(),
                    reason: "root does not define the snapshot role".to_owned(),
                })?;
            match self.sign_body(
                snapshot_body,
                &role_keys.keyids,
                role_keys.threshold.get(),
                RoleName::Snapshot,
                retriever,
            ) {
                Ok(signed) => {
                    let bytes = serialize_signed(&signed, "snapshot")?;
                    payload.insert("snapshot".to_owned(), bytes);
                    working.snapshot = signed;
                }
                Err(Error::InsufficientSignatures { .. }) => {
                    // Server-managed snapshot: send the rest and let the server complete the
                    // transaction.
                    debug!("no local snapshot key; the server will sign the snapshot");
                }
                Err(err) => return Err(err),
            }
        }

        self.remote.set_multi(&payload)?;

        // The upload is committed; bring the cache and in-memory state along. A failure here
        // must not resurrect the changelist, so cache errors are surfaced only after the
        // changelist is cleared.
        for (name, bytes) in &payload {
            self.cache.set(name, bytes)?;
        }
        for removed in &outcome.removed {
            self.cache.remove(removed)?;
        }
        self.changelist.clear(true)?;
        self.current = Some(working);
        info!("published {} role(s) for {}", payload.len(), self.gun);
        Ok(())
    }

    /// Removes all local trust data for the collection, and optionally the remote's too.
    pub fn delete_trust_data(&mut self, delete_remote: bool) -> Result<()> {
        if delete_remote {
            self.remote.remove_all()?;
        }
        self.cache.remove_all()?;
        self.changelist.clear(false)?;
        self.current = None;
        self.invalid = InvalidRepo::default();
        info!("deleted trust data for {}", self.gun);
        Ok(())
    }

    // =^..^= internals =^..^=

    fn ensure_current(&mut self) -> Result<()> {
        if self.current.is_some() {
            return Ok(());
        }
        match self.update() {
            Ok(()) => Ok(()),
            Err(Error::RepositoryNotExist { .. }) => self.bootstrap_from_cache(),
            Err(err) => Err(err),
        }
    }

    /// Rebuilds a repository view from the local cache alone, used when the remote has no data
    /// yet (between initialize and the first publish).
    fn bootstrap_from_cache(&mut self) -> Result<()> {
        let root_raw = match self.cache.get_sized("root", -1) {
            Ok(raw) => raw,
            Err(Error::MetaNotFound { .. }) => {
                return error::RepoNotInitializedSnafu { gun: &self.gun }.fail();
            }
            Err(err) => return Err(err),
        };

        let now = Utc::now();
        let mut builder = RepoBuilder::new(&self.gun, &self.trust_pin, now);
        if let Some(cached) = self.read_cached_root()? {
            builder = builder.with_trusted_root(cached);
        }
        builder.load(&RoleName::Root, &root_raw, 1, true)?;
        let root = builder
            .root()
            .cloned()
            .ok_or_else(|| error::RepoNotInitializedSnafu { gun: &self.gun }.build())?;

        let targets_raw = self.cache.get_sized("targets", -1).map_err(|_| {
            error::RepoNotInitializedSnafu { gun: &self.gun }.build()
        })?;
        let targets: Signed<Targets> =
            serde_json::from_slice(&targets_raw).context(error::CacheCorruptSnafu {
                role: RoleName::Targets,
            })?;
        root.signed
            .verify_role(&targets)
            .map_err(|source| Error::InsufficientSignatures {
                role: RoleName::Targets,
                source: Box::new(source),
            })?;

        let snapshot_raw = self.cache.get_sized("snapshot", -1).map_err(|_| {
            error::RepoNotInitializedSnafu { gun: &self.gun }.build()
        })?;
        let snapshot: Signed<Snapshot> =
            serde_json::from_slice(&snapshot_raw).context(error::CacheCorruptSnafu {
                role: RoleName::Snapshot,
            })?;
        // A server-managed snapshot is staged unsigned; verify only when signatures exist.
        if !snapshot.signatures.is_empty() {
            root.signed
                .verify_role(&snapshot)
                .map_err(|source| Error::InsufficientSignatures {
                    role: RoleName::Snapshot,
                    source: Box::new(source),
                })?;
        }

        // The timestamp is staged unsigned pending the server's signature.
        let timestamp_raw = self.cache.get_sized("timestamp", -1).map_err(|_| {
            error::RepoNotInitializedSnafu { gun: &self.gun }.build()
        })?;
        let timestamp: Signed<Timestamp> =
            serde_json::from_slice(&timestamp_raw).context(error::CacheCorruptSnafu {
                role: RoleName::Timestamp,
            })?;

        self.current = Some(Repo {
            root,
            timestamp,
            snapshot,
            targets,
        });
        Ok(())
    }

    /// Signs `body` with every resolvable key among `keyids`, requiring at least `threshold`
    /// distinct signatures.
    fn sign_body<T: Role + Clone + Serialize>(
        &self,
        body: T,
        keyids: &[Decoded<Hex>],
        threshold: u64,
        role: RoleName,
        retriever: &dyn PassphraseRetriever,
    ) -> Result<Signed<T>> {
        let canonical = body.canonical_form().context(error::SchemaSnafu)?;
        let rng = ring::rand::SystemRandom::new();
        let mut signatures = Vec::new();
        for (keyid, signer) in self.crypto.signers_for(keyids, retriever) {
            let sig = signer
                .sign(&canonical, &rng)
                .map_err(|source| Error::Sign {
                    role: role.clone(),
                    source,
                })?;
            signatures.push(Signature {
                keyid,
                method: signer.scheme(),
                sig: sig.into(),
            });
        }
        if (signatures.len() as u64) < threshold {
            return Err(Error::InsufficientSignatures {
                role: role.clone(),
                source: Box::new(crate::schema::Error::SignatureThreshold {
                    role: role.to_string(),
                    threshold,
                    valid: signatures.len() as u64,
                }),
            });
        }
        Ok(Signed {
            signed: body,
            signatures,
        })
    }

    /// Signs a canonical role with the key set the root defines for it.
    fn sign_canonical_role<T: Role + Clone + Serialize>(
        &self,
        root: &Root,
        body: T,
        role: RoleName,
        retriever: &dyn PassphraseRetriever,
    ) -> Result<Signed<T>> {
        let role_keys = root
            .roles
            .get(&T::TYPE)
            .ok_or_else(|| Error::InvalidRole {
                role: role.to_string(),
                reason: "root does not define the role".to_owned(),
            })?;
        self.sign_body(
            body,
            &role_keys.keyids,
            role_keys.threshold.get(),
            role,
            retriever,
        )
    }

    /// Signs a (possibly rotated) root body: with the new body's own root keys, with the
    /// previous root keys (mandatory for rotation), and with keys from up to
    /// `legacy_versions` earlier roots found in the cache.
    fn sign_root(
        &self,
        old_root: &Root,
        body: Root,
        old_keyids: &[Decoded<Hex>],
        retriever: &dyn PassphraseRetriever,
    ) -> Result<Signed<Root>> {
        let canonical = body.canonical_form().context(error::SchemaSnafu)?;
        let rng = ring::rand::SystemRandom::new();
        let mut signatures: Vec<Signature> = Vec::new();
        let mut signed_ids: HashSet<String> = HashSet::new();

        let mut sign_with = |keyids: &[Decoded<Hex>],
                             signatures: &mut Vec<Signature>,
                             signed_ids: &mut HashSet<String>|
         -> Result<usize> {
            let mut produced = 0;
            for (keyid, signer) in self.crypto.signers_for(keyids, retriever) {
                if !signed_ids.insert(keyid.to_string()) {
                    produced += 1;
                    continue;
                }
                let sig = signer
                    .sign(&canonical, &rng)
                    .map_err(|source| Error::Sign {
                        role: RoleName::Root,
                        source,
                    })?;
                signatures.push(Signature {
                    keyid,
                    method: signer.scheme(),
                    sig: sig.into(),
                });
                produced += 1;
            }
            Ok(produced)
        };

        // The new root's own keys.
        let new_keyids = body
            .roles
            .get(&RoleType::Root)
            .map(|keys| keys.keyids.clone())
            .unwrap_or_default();
        let threshold = body
            .roles
            .get(&RoleType::Root)
            .map(|keys| keys.threshold.get())
            .unwrap_or(1);
        let own = sign_with(&new_keyids, &mut signatures, &mut signed_ids)?;
        if (own as u64) < threshold {
            return Err(Error::InsufficientSignatures {
                role: RoleName::Root,
                source: Box::new(crate::schema::Error::SignatureThreshold {
                    role: "root".to_owned(),
                    threshold,
                    valid: own as u64,
                }),
            });
        }

        // The previous root keys, when this is a rotation.
        if !old_keyids.is_empty() && old_keyids != new_keyids.as_slice() {
            let old_root_keys = old_root
                .roles
                .get(&RoleType::Root)
                .map(|keys| keys.keyids.clone())
                .unwrap_or_default();
            let produced = sign_with(&old_root_keys, &mut signatures, &mut signed_ids)?;
            if produced == 0 {
                return Err(Error::InsufficientSignatures {
                    role: RoleName::Root,
                    source: Box::new(crate::schema::Error::SignatureThreshold {
                        role: "root (previous keys)".to_owned(),
                        threshold: 1,
                        valid: 0,
                    }),
                });
            }
        }

        // Best-effort signatures for clients pinned to older roots.
        for back in 0..self.legacy_versions {
            let version = body
                .version
                .get()
                .saturating_sub(u64::from(back) + 2);
            if version == 0 {
                break;
            }
            match self.cache.get_sized(&format!("{}.root", version), -1) {
                Ok(raw) => {
                    if let Ok(old) = serde_json::from_slice::<Signed<Root>>(&raw) {
                        let keyids = old
                            .signed
                            .roles
                            .get(&RoleType::Root)
                            .map(|keys| keys.keyids.clone())
                            .unwrap_or_default();
                        let _ = sign_with(&keyids, &mut signatures, &mut signed_ids)?;
                    }
                }
                Err(_) => {
                    debug!("no cached root v{} for legacy signing", version);
                }
            }
        }

        Ok(Signed {
            signed: body,
            signatures,
        })
    }
}

/// What replaying the changelist did to the working copy.
#[derive(Debug, Default)]
struct ApplyOutcome {
    /// Targets-type roles whose bodies changed and need re-signing.
    dirty: HashSet<RoleName>,
    /// An explicit snapshot refresh was requested (snapshot witness).
    snapshot_dirty: bool,
    /// Delegation role names removed entirely.
    removed: Vec<String>,
}

/// Replays changes against a working copy of the repository. Fails without side effects
/// beyond the working copy on the first invalid change.
fn apply_changelist(
    working: &mut Repo,
    invalid: &InvalidRepo,
    changes: &[Change],
) -> Result<ApplyOutcome> {
    let mut outcome = ApplyOutcome::default();
    for change in changes {
        match change.change_type {
            ChangeType::Target => apply_target_change(working, change, &mut outcome)?,
            ChangeType::Delegation => apply_delegation_change(working, change, &mut outcome)?,
            ChangeType::Witness => apply_witness(working, invalid, change, &mut outcome)?,
        }
    }
    Ok(outcome)
}

fn apply_target_change(
    working: &mut Repo,
    change: &Change,
    outcome: &mut ApplyOutcome,
) -> Result<()> {
    // Path restrictions were checked eagerly where possible; check again now that the role is
    // guaranteed to be resolvable.
    if let RoleName::Delegation(name) = &change.role {
        let declared = working
            .targets
            .signed
            .delegated_role(name)
            .ok_or_else(|| Error::InvalidRole {
                role: name.clone(),
                reason: "role does not exist in the current repository".to_owned(),
            })?;
        if change.action != Action::Delete {
            ensure!(
                declared.covers_path(&change.path),
                error::InvalidRoleSnafu {
                    role: name.clone(),
                    reason: format!("path {} is not delegated to it", change.path),
                }
            );
        }
    }

    let body = match &change.role {
        RoleName::Targets => &mut working.targets,
        RoleName::Delegation(name) => working
            .targets
            .signed
            .role_body_mut(name)
            .ok_or_else(|| Error::InvalidRole {
                role: name.clone(),
                reason: "role has no validated body to modify".to_owned(),
            })?,
        other => {
            return error::InvalidRoleSnafu {
                role: other.to_string(),
                reason: "targets can only live in targets-type roles".to_owned(),
            }
            .fail();
        }
    };

    match change.action {
        Action::Create | Action::Update => {
            let target: Target =
                serde_json::from_slice(&change.data).context(error::ParseMetadataSnafu {
                    role: change.role.clone(),
                })?;
            body.signed.add_target(&change.path, target);
        }
        Action::Delete => {
            body.signed.remove_target(&change.path);
        }
    }
    outcome.dirty.insert(change.role.clone());
    Ok(())
}

fn apply_delegation_change(
    working: &mut Repo,
    change: &Change,
    outcome: &mut ApplyOutcome,
) -> Result<()> {
    let name = match &change.role {
        RoleName::Delegation(name) => name.clone(),
        other => {
            return error::InvalidRoleSnafu {
                role: other.to_string(),
                reason: "only delegation roles can be delegated".to_owned(),
            }
            .fail();
        }
    };
    let (parent_role, parent_body) = parent_body_mut(working, &name)?;

    match change.action {
        Action::Create | Action::Update => {
            let edit: TufDelegation =
                serde_json::from_slice(&change.data).context(error::ParseMetadataSnafu {
                    role: change.role.clone(),
                })?;
            let delegations = parent_body
                .signed
                .delegations
                .get_or_insert_with(Default::default);

            // Register any new keys with the parent.
            let mut added_ids = Vec::new();
            for key in &edit.add_keys {
                let id = key.key_id().context(error::SchemaSnafu)?;
                delegations.keys.insert(id.clone(), key.clone());
                added_ids.push(id);
            }

            let position = delegations.roles.iter().position(|role| role.name == name);
            match position {
                None => {
                    ensure!(
                        !added_ids.is_empty(),
                        error::InvalidRoleSnafu {
                            role: name.clone(),
                            reason: "a new delegation needs at least one key".to_owned(),
                        }
                    );
                    delegations.roles.push(crate::schema::DelegatedRole {
                        name: name.clone(),
                        keyids: added_ids,
                        threshold: NonZeroU64::new(edit.new_threshold.unwrap_or(1).max(1))
                            .unwrap_or_else(one),
                        paths: edit.add_paths.clone(),
                        targets: None,
                    });
                }
                Some(position) => {
                    let role = &mut delegations.roles[position];
                    for id in added_ids {
                        if !role.keyids.contains(&id) {
                            role.keyids.push(id);
                        }
                    }
                    role.keyids
                        .retain(|id| !edit.remove_keys.contains(&id.to_string()));
                    if let Some(threshold) = edit.new_threshold {
                        role.threshold =
                            NonZeroU64::new(threshold.max(1)).unwrap_or_else(one);
                    }
                    if edit.clear_all_paths {
                        role.paths.clear();
                    }
                    role.paths.retain(|p| !edit.remove_paths.contains(p));
                    for path in &edit.add_paths {
                        if !role.paths.contains(path) {
                            role.paths.push(path.clone());
                        }
                    }
                    ensure!(
                        !role.keyids.is_empty(),
                        error::InvalidRoleSnafu {
                            role: name.clone(),
                            reason: "a delegation cannot be left without keys".to_owned(),
                        }
                    );
                }
            }
            prune_delegation_keys(delegations);
        }
        Action::Delete => {
            let delegations = parent_body
                .signed
                .delegations
                .get_or_insert_with(Default::default);
            let before = delegations.roles.len();
            delegations.roles.retain(|role| role.name != name);
            if before != delegations.roles.len() {
                outcome.removed.push(name.clone());
            }
            prune_delegation_keys(delegations);
        }
    }

    outcome.dirty.insert(parent_role);
    Ok(())
}

fn apply_witness(
    working: &mut Repo,
    invalid: &InvalidRepo,
    change: &Change,
    outcome: &mut ApplyOutcome,
) -> Result<()> {
    match &change.role {
        RoleName::Snapshot => {
            outcome.snapshot_dirty = true;
            Ok(())
        }
        RoleName::Targets => {
            outcome.dirty.insert(RoleName::Targets);
            Ok(())
        }
        RoleName::Delegation(name) => {
            if working.targets.signed.role_body(name).is_some() {
                outcome.dirty.insert(change.role.clone());
                return Ok(());
            }
            // The role failed validation during update; revive its body so publish can
            // re-sign it.
            if let Some(body) = invalid.delegations.get(name) {
                if let Some(declared) = working.targets.signed.delegated_role_mut(name) {
                    declared.targets = Some(body.clone());
                    outcome.dirty.insert(change.role.clone());
                    return Ok(());
                }
            }
            error::InvalidRoleSnafu {
                role: name.clone(),
                reason: "role is not present in the current or invalid repository".to_owned(),
            }
            .fail()
        }
        other => error::InvalidRoleSnafu {
            role: other.to_string(),
            reason: "cannot witness".to_owned(),
        }
        .fail(),
    }
}

/// The delegating parent of `name` within the working copy, mutably.
fn parent_body_mut<'a>(
    working: &'a mut Repo,
    name: &str,
) -> Result<(RoleName, &'a mut Signed<Targets>)> {
    let parent_name = match name.rfind('/') {
        Some(split) => &name[..split],
        None => "targets",
    };
    if parent_name == "targets" {
        return Ok((RoleName::Targets, &mut working.targets));
    }
    let body = working
        .targets
        .signed
        .role_body_mut(parent_name)
        .ok_or_else(|| Error::InvalidRole {
            role: parent_name.to_owned(),
            reason: format!("delegating parent of {} is not available", name),
        })?;
    Ok((RoleName::Delegation(parent_name.to_owned()), body))
}

/// The key IDs and threshold that govern signing `role` in the working copy.
fn signing_set(working: &Repo, role: &RoleName) -> Result<(Vec<Decoded<Hex>>, u64)> {
    match role {
        RoleName::Targets => {
            let keys = working
                .root
                .signed
                .roles
                .get(&RoleType::Targets)
                .ok_or_else(|| Error::InvalidRole {
                    role: "targets".to_owned(),
                    reason: "root does not define the targets role".to_owned(),
                })?;
            Ok((keys.keyids.clone(), keys.threshold.get()))
        }
        RoleName::Delegation(name) => {
            let declared = working
                .targets
                .signed
                .delegated_role(name)
                .ok_or_else(|| Error::InvalidRole {
                    role: name.clone(),
                    reason: "no role delegates to it".to_owned(),
                })?;
            Ok((declared.keyids.clone(), declared.threshold.get()))
        }
        other => error::InvalidRoleSnafu {
            role: other.to_string(),
            reason: "not a targets-type role".to_owned(),
        }
        .fail(),
    }
}

/// Swaps in a newly signed body for a targets-type role.
fn replace_role_body(working: &mut Repo, role: &RoleName, signed: Signed<Targets>) {
    match role {
        RoleName::Targets => working.targets = signed,
        RoleName::Delegation(name) => {
            if let Some(body) = working.targets.signed.role_body_mut(name) {
                *body = signed;
            } else if let Some(declared) = working.targets.signed.delegated_role_mut(name) {
                declared.targets = Some(signed);
            }
        }
        _ => {}
    }
}

/// Removes keys from a root's key map that no role references anymore.
fn prune_unreferenced_keys(root: &mut Root) {
    let referenced: HashSet<Decoded<Hex>> = root
        .roles
        .values()
        .flat_map(|keys| keys.keyids.iter().cloned())
        .collect();
    root.keys.retain(|keyid, _| referenced.contains(keyid));
}

/// Removes keys from a delegations key map that no delegated role references anymore.
fn prune_delegation_keys(delegations: &mut crate::schema::Delegations) {
    let referenced: HashSet<Decoded<Hex>> = delegations
        .roles
        .iter()
        .flat_map(|role| role.keyids.iter().cloned())
        .collect();
    delegations.keys.retain(|keyid, _| referenced.contains(keyid));
}

/// The default role set for target operations: just the top-level targets role.
fn targets_roles_or_default(roles: &[RoleName]) -> Result<Vec<RoleName>> {
    if roles.is_empty() {
        return Ok(vec![RoleName::Targets]);
    }
    let mut out = Vec::new();
    for role in roles {
        match role {
            RoleName::Targets | RoleName::Delegation(_) => out.push(role.clone()),
            other => {
                return error::InvalidRoleSnafu {
                    role: other.to_string(),
                    reason: "targets can only live in targets-type roles".to_owned(),
                }
                .fail();
            }
        }
    }
    Ok(out)
}

/// Serializes a signed role the way it is stored and uploaded. The digest recorded by parents
/// is over exactly these bytes.
pub(crate) fn serialize_signed<T: Serialize>(signed: &Signed<T>, what: &str) -> Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec_pretty(signed).context(error::SerializeMetadataSnafu {
        what: what.to_owned(),
    })?;
    bytes.push(b'\n');
    Ok(bytes)
}

fn bump(version: NonZeroU64) -> NonZeroU64 {
    NonZeroU64::new(version.get().saturating_add(1)).unwrap_or(version)
}

fn one() -> NonZeroU64 {
    // 1 is self-evidently non-zero
    NonZeroU64::new(1).unwrap()
}
