// Copyright 2019 The Notary Project Authors. All Rights Reserved.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Depth-first traversal of the targets delegation tree.
//!
//! The walker drives list, lookup, add, remove, and diff without any of them duplicating tree
//! logic. A visitor sees each reachable role body in pre-order and steers the walk with a
//! three-valued outcome; unresolvable branches (delegations whose bodies failed validation and
//! were never loaded) are skipped.

use crate::build::Repo;
use crate::error::Result;
use crate::schema::{RoleName, Signed, Targets};
use std::collections::HashSet;

/// What a visitor tells the walker to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitorOutcome {
    /// Keep walking into this role's delegations.
    Continue,
    /// Skip this role's delegations but keep walking siblings.
    StopBranch,
    /// Stop the entire walk.
    StopAll,
}

/// One role as seen during a walk.
#[derive(Debug)]
pub struct WalkedRole<'a> {
    /// The role's name.
    pub role: RoleName,
    /// The role's validated body.
    pub body: &'a Signed<Targets>,
    /// The path prefixes the role is restricted to. `None` for the top-level targets role,
    /// which is unrestricted.
    pub paths: Option<&'a [String]>,
}

/// Walks the delegation tree of `repo` depth-first, starting at `start` (pass
/// [`RoleName::Targets`] for the whole tree). When `target_name` is given, branches whose path
/// prefixes cannot cover it are pruned.
pub fn walk_targets<F>(
    repo: &Repo,
    target_name: Option<&str>,
    start: &RoleName,
    visitor: &mut F,
) -> Result<()>
where
    F: FnMut(&WalkedRole<'_>) -> Result<VisitorOutcome>,
{
    let body = match repo.role_body(start) {
        Some(body) => body,
        None => return Ok(()),
    };
    let paths = match start {
        RoleName::Delegation(name) => repo
            .targets
            .signed
            .delegated_role(name)
            .map(|role| role.paths.as_slice()),
        _ => None,
    };
    let mut visited = HashSet::new();
    visited.insert(start.to_string());
    walk_node(
        &WalkedRole {
            role: start.clone(),
            body,
            paths,
        },
        target_name,
        visitor,
        &mut visited,
    )?;
    Ok(())
}

fn walk_node<F>(
    node: &WalkedRole<'_>,
    target_name: Option<&str>,
    visitor: &mut F,
    visited: &mut HashSet<String>,
) -> Result<VisitorOutcome>
where
    F: FnMut(&WalkedRole<'_>) -> Result<VisitorOutcome>,
{
    match visitor(node)? {
        VisitorOutcome::Continue => {}
        VisitorOutcome::StopBranch => return Ok(VisitorOutcome::Continue),
        VisitorOutcome::StopAll => return Ok(VisitorOutcome::StopAll),
    }

    let delegations = match &node.body.signed.delegations {
        Some(delegations) => delegations,
        None => return Ok(VisitorOutcome::Continue),
    };

    for child in &delegations.roles {
        // Roles form a tree, but names could be maliciously repeated to force a cycle.
        if !visited.insert(child.name.clone()) {
            continue;
        }
        if let Some(name) = target_name {
            if !child.covers_path(name) {
                continue;
            }
        }
        let body = match &child.targets {
            Some(body) => body,
            // Never loaded (invalid or unreachable); skip the branch.
            None => continue,
        };
        let outcome = walk_node(
            &WalkedRole {
                role: RoleName::Delegation(child.name.clone()),
                body,
                paths: Some(&child.paths),
            },
            target_name,
            visitor,
            visited,
        )?;
        if outcome == VisitorOutcome::StopAll {
            return Ok(VisitorOutcome::StopAll);
        }
    }
    Ok(VisitorOutcome::Continue)
}
