// Copyright 2019 The Notary Project Authors. All Rights Reserved.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tests for the diff engine and the delegation walker it is built on.

mod test_utils;

use notary_client::build::load_repo_from_store;
use notary_client::diff::diff;
use notary_client::schema::RoleName;
use notary_client::trustpin::TrustPinConfig;
use notary_client::walk::{walk_targets, VisitorOutcome};
use test_utils::{RepoFixture, GUN};

fn load(fixture: &RepoFixture) -> notary_client::Repo {
    let store = fixture.build();
    load_repo_from_store(GUN, &TrustPinConfig::default(), &store, None, false)
        .unwrap()
        .0
}

#[test]
fn added_and_removed_targets_are_symmetric() {
    let a = load(&RepoFixture::new().with_target("shared", b"same"));
    let b = load(
        &RepoFixture::new()
            .with_target("shared", b"same")
            .with_target("extra", b"new stuff"),
    );

    let forward = diff(&a, &b);
    assert_eq!(forward.targets_added.len(), 1);
    assert_eq!(forward.targets_added[0].name, "extra");
    assert!(forward.targets_removed.is_empty());

    let backward = diff(&b, &a);
    assert!(backward.targets_added.is_empty());
    assert_eq!(backward.targets_removed.len(), 1);
    assert_eq!(backward.targets_removed[0].name, "extra");

    // added(a→b) and removed(b→a) agree on names.
    let added: Vec<&str> = forward.targets_added.iter().map(|t| t.name.as_str()).collect();
    let removed: Vec<&str> = backward.targets_removed.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(added, removed);
}

#[test]
fn changed_content_shows_as_updated() {
    let a = load(&RepoFixture::new().with_target("app", b"version one"));
    let b = load(&RepoFixture::new().with_target("app", b"version two"));

    let result = diff(&a, &b);
    assert!(result.targets_added.is_empty());
    assert!(result.targets_removed.is_empty());
    assert_eq!(result.targets_updated.len(), 1);
    assert_eq!(result.targets_updated[0].name, "app");
}

#[test]
fn role_equivalence_ignores_versions_and_signatures() {
    // The same shape at different versions, signed by different runs of the same keys.
    let mut older = RepoFixture::new().with_target("app", b"contents");
    let newer = RepoFixture::new()
        .with_target("app", b"contents")
        .with_version("targets", 4)
        .with_version("snapshot", 7);
    older.root_key = test_utils::clone_key(&newer.root_key);
    older.targets_key = test_utils::clone_key(&newer.targets_key);
    older.snapshot_key = test_utils::clone_key(&newer.snapshot_key);
    older.timestamp_key = test_utils::clone_key(&newer.timestamp_key);

    let result = diff(&load(&older), &load(&newer));
    assert!(result.is_empty(), "expected no difference: {:?}", result);
}

#[test]
fn role_changes_are_reported() {
    let a = load(&RepoFixture::new());
    let b = load(&RepoFixture::new().with_delegation("targets/releases", &["releases/"]));

    let result = diff(&a, &b);
    assert_eq!(
        result.roles_added,
        vec![RoleName::Delegation("targets/releases".to_owned())]
    );
    // Different fixtures have different canonical role keys.
    assert!(!result.roles_updated.is_empty());

    let reverse = diff(&b, &a);
    assert_eq!(
        reverse.roles_removed,
        vec![RoleName::Delegation("targets/releases".to_owned())]
    );
}

#[test]
fn walker_prunes_branches_that_cannot_match() {
    let repo = load(
        &RepoFixture::new()
            .with_delegation("targets/releases", &["releases/"])
            .with_delegation("targets/nightly", &["nightly/"]),
    );

    let mut seen = Vec::new();
    walk_targets(
        &repo,
        Some("releases/v1"),
        &RoleName::Targets,
        &mut |walked| {
            seen.push(walked.role.to_string());
            Ok(VisitorOutcome::Continue)
        },
    )
    .unwrap();
    assert_eq!(seen, vec!["targets", "targets/releases"]);
}

#[test]
fn walker_stop_all_halts_the_walk() {
    let repo = load(
        &RepoFixture::new()
            .with_delegation("targets/a", &[""])
            .with_delegation("targets/b", &[""]),
    );

    let mut seen = Vec::new();
    walk_targets(&repo, None, &RoleName::Targets, &mut |walked| {
        seen.push(walked.role.to_string());
        if walked.role.is_delegation() {
            Ok(VisitorOutcome::StopAll)
        } else {
            Ok(VisitorOutcome::Continue)
        }
    })
    .unwrap();
    // The walk ends at the first delegation it visits.
    assert_eq!(seen.len(), 2);
}
