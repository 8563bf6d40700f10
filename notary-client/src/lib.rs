// Copyright 2019 The Notary Project Authors. All Rights Reserved.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! notary-client is the client core of Notary, a system that applies [The Update Framework
//! (TUF)][tuf] to arbitrary content collections so that publishers can sign named targets
//! offline and consumers can verify them through an untrusted mirror.
//!
//! The crate assembles and validates a TUF repository for a collection (a GUN, globally unique
//! name) from remote and cached metadata, stages local modifications through a durable
//! changelist, produces new signed repository states on publish, and manages signing keys
//! across an ordered set of pluggable key stores.
//!
//! The pieces compose bottom-up:
//!
//! * [`schema`]: the metadata types and signature verification
//! * [`sign`] / [`keystore`] / [`service`]: signing keys and the stores that hold them
//! * [`storage`]: byte-blob stores for metadata, from the filesystem cache to the HTTP mirror
//! * [`build`]: the builder that validates raw metadata into a repository
//! * [`client`]: the high-level verbs, from initialize and update through publish and rotate
//!
//! This crate speaks to two external collaborators through narrow interfaces: a notary server
//! (the TUF mirror protocol over HTTP) and, optionally, a remote signer reached through a key
//! store backend.
//!
//! [tuf]: https://theupdateframework.github.io/
//!
//! # Testing
//!
//! Unit tests are run in the usual manner: `cargo test`. Integration tests live under
//! `tests/` and exercise the client against in-memory and `httptest`-backed servers.

#![forbid(missing_debug_implementations, missing_copy_implementations)]
#![deny(rust_2018_idioms)]
// missing_docs is on its own line to make it easy to comment out when making changes.
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc
)]

pub mod build;
mod cache;
pub mod changelist;
pub mod client;
pub mod diff;
pub mod error;
pub mod keystore;
pub mod passphrase;
pub mod schema;
pub mod service;
pub mod sign;
pub mod storage;
pub mod trustpin;
pub mod walk;

pub use crate::build::{InvalidRepo, Repo};
pub use crate::client::{Repository, Settings};
pub use crate::diff::{diff, RepoDiff, TargetWithRole};
pub use crate::error::{Error, Result};
pub use crate::schema::{RoleName, RoleType};
pub use crate::service::CryptoService;
pub use crate::storage::{ClientSettings, MetadataStore};
pub use crate::trustpin::TrustPinConfig;
