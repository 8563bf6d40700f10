// Copyright 2019 The Notary Project Authors. All Rights Reserved.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The error taxonomy surfaced by the repository client.
//!
//! Every public operation returns exactly one of these kinds; lower-level causes from the
//! schema, storage, and key store layers are preserved as `source` fields so that callers can
//! pattern-match without string inspection.

#![allow(clippy::default_trait_access)]

use crate::schema::RoleName;
use snafu::{Backtrace, Snafu};
use std::path::PathBuf;

/// Alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for repository client operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
#[non_exhaustive]
pub enum Error {
    // =^..^= trust failures =^..^=
    /// A role's version went backward, or did not reach the version we required.
    #[snafu(display("Bad version for role {}: got {}, wanted at least {}", role, got, wanted))]
    BadVersion {
        /// The role whose version regressed.
        role: RoleName,
        /// The version that was encountered.
        got: u64,
        /// The minimum acceptable version.
        wanted: u64,
    },

    /// The root metadata failed a structural check.
    #[snafu(display("Invalid root metadata: {}", source))]
    BadRoot {
        /// The underlying schema error.
        #[snafu(source(from(crate::schema::Error, Box::new)))]
        source: Box<crate::schema::Error>,
    },

    /// A role's metadata is expired.
    #[snafu(display("Metadata for role {} is expired", role))]
    ExpiredMetadata {
        /// The role whose metadata is expired.
        role: RoleName,
    },

    /// A role did not carry enough valid signatures to meet its threshold.
    #[snafu(display("Could not validate signatures for role {}: {}", role, source))]
    InsufficientSignatures {
        /// The role whose signatures could not be validated.
        role: RoleName,
        /// The underlying schema error.
        #[snafu(source(from(crate::schema::Error, Box::new)))]
        source: Box<crate::schema::Error>,
    },

    /// A newer root could not be validated against the previously trusted root.
    #[snafu(display("Root rotation failed: {}", source))]
    RootRotationFailed {
        /// The underlying error that caused rotation to fail.
        #[snafu(source(from(Error, Box::new)))]
        source: Box<Error>,
    },

    /// The root's keys were rejected by the trust pinning policy.
    #[snafu(display("Trust pinning rejected root keys for {}: {}", gun, reason))]
    TrustPinningFailure {
        /// The globally unique name of the collection.
        gun: String,
        /// Why the keys were rejected.
        reason: String,
    },

    /// A metadata file's content did not match the digest its parent recorded.
    #[snafu(display("Checksum mismatch for role {}", role))]
    ChecksumMismatch {
        /// The role whose checksum did not match.
        role: RoleName,
    },

    // =^..^= key failures =^..^=
    /// No key store holds the requested key.
    #[snafu(display("No key found with ID {}", key_id))]
    KeyNotFound {
        /// The ID of the key that could not be found.
        key_id: String,
    },

    /// A passphrase failed to unlock key material.
    #[snafu(display("Invalid passphrase for key {}", key_id))]
    PasswordInvalid {
        /// The ID of the key the passphrase was for.
        key_id: String,
    },

    /// The passphrase retriever gave up or refused too many times.
    #[snafu(display("Too many passphrase attempts for key {}", key_id))]
    AttemptsExceeded {
        /// The ID of the key passphrase attempts were made against.
        key_id: String,
    },

    /// A key store could not mirror a key to its backup store; the original write was rolled
    /// back.
    #[snafu(display("Failed to back up key {}: {}", key_id, source))]
    BackupFailed {
        /// The ID of the key that failed to back up.
        key_id: String,
        /// The underlying backend error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A role that cannot be server-managed was requested as such.
    #[snafu(display("Invalid server-managed role: {}", role))]
    InvalidRemoteRole {
        /// The role that cannot be server-managed.
        role: RoleName,
    },

    /// A role that must be server-managed was requested as locally managed.
    #[snafu(display("Role {} cannot be managed locally", role))]
    InvalidLocalRole {
        /// The role that cannot be managed locally.
        role: RoleName,
    },

    /// Key material failed to parse as any supported type.
    #[snafu(display("Unrecognized key material"))]
    KeyUnrecognized,

    /// Key material parsed but was rejected.
    #[snafu(display("Key rejected: {}", source))]
    KeyRejected {
        /// The underlying rejection from the crypto library.
        source: ring::error::KeyRejected,
        /// Backtrace captured at the error site.
        backtrace: Backtrace,
    },

    /// Failed to decrypt a private key (typically a wrong passphrase).
    #[snafu(display("Failed to decrypt private key: {}", source))]
    KeyDecrypt {
        /// The underlying decryption error.
        source: pkcs8::Error,
    },

    /// Failed to encrypt a private key for storage.
    #[snafu(display("Failed to encrypt private key: {}", source))]
    KeyEncrypt {
        /// The underlying encryption error.
        source: pkcs8::Error,
    },

    /// A signing operation failed.
    #[snafu(display("Failed to sign message for role {}: {}", role, source))]
    Sign {
        /// The role the signature was for.
        role: RoleName,
        /// The underlying signing error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A key store backend failed.
    #[snafu(display("Key store {} failed: {}", store, source))]
    KeyStore {
        /// The name of the key store that failed.
        store: String,
        /// The underlying backend error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Key generation failed.
    #[snafu(display("Failed to generate key: {}", source))]
    KeyGenerate {
        /// The underlying error from the crypto library.
        source: ring::error::Unspecified,
    },

    // =^..^= repo failures =^..^=
    /// `initialize` was called but the cache already holds a root for this collection.
    #[snafu(display("Repository for {} already exists", gun))]
    RepoAlreadyExists {
        /// The globally unique name of the collection.
        gun: String,
    },

    /// An operation that needs trust data ran before `initialize` or a successful `update`.
    #[snafu(display("Repository for {} has not been initialized", gun))]
    RepoNotInitialized {
        /// The globally unique name of the collection.
        gun: String,
    },

    /// The remote has no trust data for this collection.
    #[snafu(display("Repository {} does not exist at {}", gun, remote))]
    RepositoryNotExist {
        /// The remote URL that was queried.
        remote: String,
        /// The globally unique name of the collection.
        gun: String,
    },

    /// The named target is not present in any resolvable role.
    #[snafu(display("No such target: {}", name))]
    NoSuchTarget {
        /// The name of the target that could not be found.
        name: String,
    },

    /// A role name is invalid for the requested operation.
    #[snafu(display("Invalid role {}: {}", role, reason))]
    InvalidRole {
        /// The invalid role name.
        role: String,
        /// Why the role is invalid.
        reason: String,
    },

    /// The server or client rejected the operation.
    #[snafu(display("Invalid operation{}", detail.as_ref().map(|d| format!(": {}", d)).unwrap_or_default()))]
    InvalidOperation {
        /// Additional detail about why the operation was rejected.
        detail: Option<String>,
    },

    // =^..^= remote failures =^..^=
    /// The requested metadata does not exist on the remote.
    #[snafu(display("{} does not exist", resource))]
    MetaNotFound {
        /// The resource that does not exist.
        resource: String,
    },

    /// The trust server could not be reached or returned a server error.
    #[snafu(display("{}", server_unavailable_message(*code)))]
    ServerUnavailable {
        /// The HTTP status code returned by the server.
        code: u16,
    },

    /// No remote store is configured.
    #[snafu(display("Repository is offline: no remote trust server is configured"))]
    OfflineStore,

    /// A network operation exceeded its deadline.
    #[snafu(display("Network operation timed out contacting {}", url))]
    NetworkTimeout {
        /// The URL that timed out.
        url: String,
    },

    /// An HTTP request failed in transport.
    #[snafu(display("Failed to reach {}: {}", url, source))]
    Transport {
        /// The URL that could not be reached.
        url: String,
        /// The underlying transport error.
        source: reqwest::Error,
    },

    /// A response exceeded the size we were willing to read.
    #[snafu(display(
        "Metadata for {} exceeded the maximum size of {} bytes",
        resource,
        max_size
    ))]
    MaxSizeExceeded {
        /// The resource whose response was too large.
        resource: String,
        /// The maximum size that was allowed.
        max_size: u64,
    },

    // =^..^= local failures =^..^=
    /// Another process holds the cache for this collection.
    #[snafu(display("Trust data cache at {} is locked by another process", path.display()))]
    CacheLocked {
        /// The path to the locked cache.
        path: PathBuf,
    },

    /// A cached metadata file failed to parse or validate.
    #[snafu(display("Cached metadata for role {} is corrupt: {}", role, source))]
    CacheCorrupt {
        /// The role whose cached metadata is corrupt.
        role: RoleName,
        /// The underlying parse error.
        source: serde_json::Error,
    },

    /// A changelist entry could not be parsed; publishing is refused until it is removed.
    #[snafu(display("Malformed changelist entry at index {}", index))]
    MalformedChangelist {
        /// The index of the malformed entry.
        index: u64,
        /// The underlying parse error.
        source: serde_json::Error,
    },

    // =^..^= plumbing =^..^=
    /// Failed to create a directory.
    #[snafu(display("Failed to create directory {}: {}", path.display(), source))]
    DirCreate {
        /// The path of the directory that could not be created.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
        /// Backtrace captured at the error site.
        backtrace: Backtrace,
    },

    /// Failed to read a file.
    #[snafu(display("Failed to read {}: {}", path.display(), source))]
    FileRead {
        /// The path of the file that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
        /// Backtrace captured at the error site.
        backtrace: Backtrace,
    },

    /// Failed to write a file.
    #[snafu(display("Failed to write {}: {}", path.display(), source))]
    FileWrite {
        /// The path of the file that could not be written.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
        /// Backtrace captured at the error site.
        backtrace: Backtrace,
    },

    /// Failed to remove a file or directory.
    #[snafu(display("Failed to remove {}: {}", path.display(), source))]
    FileRemove {
        /// The path of the file or directory that could not be removed.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
        /// Backtrace captured at the error site.
        backtrace: Backtrace,
    },

    /// Failed to rename a file or directory.
    #[snafu(display("Failed to rename {} to {}: {}", from.display(), to.display(), source))]
    FileRename {
        /// The original path.
        from: PathBuf,
        /// The destination path.
        to: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
        /// Backtrace captured at the error site.
        backtrace: Backtrace,
    },

    /// Failed to walk a directory tree.
    #[snafu(display("Failed to walk directory {}: {}", directory.display(), source))]
    WalkDir {
        /// The directory that could not be walked.
        directory: PathBuf,
        /// The underlying walk error.
        source: walkdir::Error,
    },

    /// Failed to parse metadata.
    #[snafu(display("Failed to parse {} metadata: {}", role, source))]
    ParseMetadata {
        /// The role whose metadata could not be parsed.
        role: RoleName,
        /// The underlying parse error.
        source: serde_json::Error,
    },

    /// Failed to serialize metadata.
    #[snafu(display("Failed to serialize {}: {}", what, source))]
    SerializeMetadata {
        /// What was being serialized.
        what: String,
        /// The underlying serialization error.
        source: serde_json::Error,
    },

    /// A schema-level failure outside signature verification.
    #[snafu(display("Metadata schema error: {}", source))]
    Schema {
        /// The underlying schema error.
        #[snafu(source(from(crate::schema::Error, Box::new)))]
        source: Box<crate::schema::Error>,
    },

    /// Failed to parse a URL.
    #[snafu(display("Failed to parse URL {}: {}", url, source))]
    ParseUrl {
        /// The URL string that failed to parse.
        url: String,
        /// The underlying parse error.
        source: url::ParseError,
    },
}

impl Error {
    /// Builds a `KeyNotFound` error. Exposed for external key store backends, which cannot name
    /// variants of this non-exhaustive enum directly.
    pub fn key_not_found<S: Into<String>>(key_id: S) -> Self {
        Error::KeyNotFound {
            key_id: key_id.into(),
        }
    }

    /// Builds a `KeyStore` backend error. Exposed for external key store backends.
    pub fn key_store<S, E>(store: S, source: E) -> Self
    where
        S: Into<String>,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Error::KeyStore {
            store: store.into(),
            source: source.into(),
        }
    }

    /// Builds a `ServerUnavailable` error. Exposed for external backends that speak to a trust
    /// server or signer.
    pub fn server_unavailable(code: u16) -> Self {
        Error::ServerUnavailable { code }
    }

    /// Whether this error means "the key simply is not in that store", as opposed to the store
    /// being broken. Store probing continues past the former.
    pub fn is_key_not_found(&self) -> bool {
        matches!(self, Error::KeyNotFound { .. })
    }
}

fn server_unavailable_message(code: u16) -> String {
    if code == 401 {
        "not authorized".to_owned()
    } else {
        format!("unable to reach trust server ({})", code)
    }
}

#[cfg(test)]
mod tests {
    use super::Error;

    #[test]
    fn unauthorized_message() {
        let err = Error::ServerUnavailable { code: 401 };
        assert_eq!(err.to_string(), "not authorized");
    }

    #[test]
    fn server_error_message() {
        let err = Error::ServerUnavailable { code: 503 };
        assert_eq!(err.to_string(), "unable to reach trust server (503)");
    }
}
