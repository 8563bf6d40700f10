// Copyright 2019 The Notary Project Authors. All Rights Reserved.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The diff engine: the symmetric difference between two validated repositories, over targets
//! and over roles.
//!
//! Role equivalence deliberately ignores versions and signatures: two repositories that
//! delegate the same keys, thresholds, and paths are the same shape even if one has been
//! re-signed. Target equivalence is name, length, and hashes.

use crate::build::Repo;
use crate::schema::{RoleName, Target};
use crate::walk::{walk_targets, VisitorOutcome};
use std::collections::HashMap;

/// A target with the role that resolved it.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetWithRole {
    /// The target name.
    pub name: String,
    /// The target description.
    pub target: Target,
    /// The role whose body bound this name.
    pub role: RoleName,
}

/// The structural definition of a role, as compared by the diff: keys, threshold, and paths,
/// never versions or signatures.
#[derive(Debug, Clone, PartialEq)]
pub struct RoleShape {
    keyids: Vec<String>,
    threshold: u64,
    paths: Option<Vec<String>>,
}

/// The symmetric difference between two repositories.
#[derive(Debug, Default)]
pub struct RepoDiff {
    /// Targets present in `b` but not `a`.
    pub targets_added: Vec<TargetWithRole>,
    /// Targets present in `a` but not `b`.
    pub targets_removed: Vec<TargetWithRole>,
    /// Targets present in both but not equivalent; carries the `b` side.
    pub targets_updated: Vec<TargetWithRole>,
    /// Role names present in `b` but not `a`.
    pub roles_added: Vec<RoleName>,
    /// Role names present in `a` but not `b`.
    pub roles_removed: Vec<RoleName>,
    /// Roles present in both whose shape differs.
    pub roles_updated: Vec<RoleName>,
}

impl RepoDiff {
    /// Whether the two repositories are equivalent under the diff's notion of equality.
    pub fn is_empty(&self) -> bool {
        self.targets_added.is_empty()
            && self.targets_removed.is_empty()
            && self.targets_updated.is_empty()
            && self.roles_added.is_empty()
            && self.roles_removed.is_empty()
            && self.roles_updated.is_empty()
    }
}

/// Every resolvable target in the repository, with the role that bound it. A name bound by
/// several roles resolves to the deepest binding (a child shadows its ancestors).
fn resolved_targets(repo: &Repo) -> HashMap<String, TargetWithRole> {
    let mut resolved: HashMap<String, TargetWithRole> = HashMap::new();
    // The walk is pre-order, parents before children, so a later binding for the same name is
    // deeper and wins.
    let _ = walk_targets(repo, None, &RoleName::Targets, &mut |walked| {
        for (name, target) in &walked.body.signed.targets {
            if let Some(paths) = walked.paths {
                // A delegation binds only names inside its path restriction.
                if !paths.iter().any(|prefix| name.starts_with(prefix.as_str())) {
                    continue;
                }
            }
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
    });
    resolved
}

/// Every role's shape, keyed by name.
fn role_shapes(repo: &Repo) -> HashMap<RoleName, RoleShape> {
    let mut shapes = HashMap::new();
    for (role_type, keys) in &repo.root.signed.roles {
        shapes.insert(
            RoleName::from(*role_type),
            RoleShape {
                keyids: keys.keyids.iter().map(ToString::to_string).collect(),
                threshold: keys.threshold.get(),
                paths: None,
            },
        );
    }
    let _ = walk_targets(repo, None, &RoleName::Targets, &mut |walked| {
        if let Some(delegations) = &walked.body.signed.delegations {
            for child in &delegations.roles {
                shapes.insert(
                    RoleName::Delegation(child.name.clone()),
                    RoleShape {
                        keyids: child.keyids.iter().map(ToString::to_string).collect(),
                        threshold: child.threshold.get(),
                        paths: Some(child.paths.clone()),
                    },
                );
            }
        }
        Ok(VisitorOutcome::Continue)
    });
    shapes
}

/// Computes the difference from `a` to `b`.
pub fn diff(a: &Repo, b: &Repo) -> RepoDiff {
    let targets_a = resolved_targets(a);
    let targets_b = resolved_targets(b);
    let roles_a = role_shapes(a);
    let roles_b = role_shapes(b);

    let mut out = RepoDiff::default();

    for (name, entry) in &targets_b {
        match targets_a.get(name) {
            None => out.targets_added.push(entry.clone()),
            Some(old) if !old.target.equivalent(&entry.target) => {
                out.targets_updated.push(entry.clone());
            }
            Some(_) => {}
        }
    }
    for (name, entry) in &targets_a {
        if !targets_b.contains_key(name) {
            out.targets_removed.push(entry.clone());
        }
    }

    for (name, shape) in &roles_b {
        match roles_a.get(name) {
            None => out.roles_added.push(name.clone()),
            Some(old) if old != shape => out.roles_updated.push(name.clone()),
            Some(_) => {}
        }
    }
    for name in roles_a.keys() {
        if !roles_b.contains_key(name) {
            out.roles_removed.push(name.clone());
        }
    }

    out.targets_added.sort_by(|x, y| x.name.cmp(&y.name));
    out.targets_removed.sort_by(|x, y| x.name.cmp(&y.name));
    out.targets_updated.sort_by(|x, y| x.name.cmp(&y.name));
    out.roles_added.sort();
    out.roles_removed.sort();
    out.roles_updated.sort();
    out
}
