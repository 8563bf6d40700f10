// Copyright 2019 The Notary Project Authors. All Rights Reserved.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for metadata schema validation and signature verification.

use snafu::{Backtrace, Snafu};

/// Alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for metadata schema operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
#[non_exhaustive]
pub enum Error {
    /// A base64 string failed to decode.
    #[snafu(display("Invalid base64 string '{}': {}", s, source))]
    Base64Decode {
        /// The string that failed to decode.
        s: String,
        /// The underlying decode error.
        source: base64::DecodeError,
        /// Backtrace captured at the error site.
        backtrace: Backtrace,
    },

    /// A certificate failed to parse.
    #[snafu(display("Malformed certificate: {}", reason))]
    CertificateParse {
        /// The reason parsing failed.
        reason: &'static str,
    },

    /// A certificate is outside its validity window.
    #[snafu(display(
        "Certificate is not valid at {}: valid from {} until {}",
        now,
        not_before,
        not_after
    ))]
    CertificateWindow {
        /// The time the certificate was checked against.
        now: chrono::DateTime<chrono::Utc>,
        /// The start of the certificate's validity window.
        not_before: chrono::DateTime<chrono::Utc>,
        /// The end of the certificate's validity window.
        not_after: chrono::DateTime<chrono::Utc>,
    },

    /// A hex string failed to decode.
    #[snafu(display("Invalid hex string '{}': {}", s, source))]
    HexDecode {
        /// The string that failed to decode.
        s: String,
        /// The underlying decode error.
        source: hex::FromHexError,
        /// Backtrace captured at the error site.
        backtrace: Backtrace,
    },

    /// A role's metadata did not list a sha256 digest.
    #[snafu(display("Hashes for {} are missing the required sha256 digest", name))]
    HashMissingSha256 {
        /// The name of the file whose hashes are missing sha256.
        name: String,
    },

    /// A stated key ID did not match the key contents.
    #[snafu(display("Invalid key ID {}: calculated {}", keyid, calculated))]
    InvalidKeyId {
        /// The key ID as stated.
        keyid: String,
        /// The key ID calculated from the key contents.
        calculated: String,
    },

    /// A delegation role name is not rooted at `targets/`.
    #[snafu(display("Invalid delegation role name '{}'", name))]
    InvalidRoleName {
        /// The offending role name.
        name: String,
    },

    /// Failed to serialize a value as canonical JSON.
    #[snafu(display("Failed to serialize {} as canonical JSON: {}", what, source))]
    JsonSerialization {
        /// What was being serialized.
        what: String,
        /// The underlying serialization error.
        source: serde_json::Error,
        /// Backtrace captured at the error site.
        backtrace: Backtrace,
    },

    /// A role or delegation references a key ID that is not defined in the key map.
    #[snafu(display("Role {} references undefined key ID {}", role, keyid))]
    KeyUndefined {
        /// The role that references the undefined key.
        role: String,
        /// The undefined key ID.
        keyid: String,
    },

    /// The key is not of a type we can verify with.
    #[snafu(display("Unsupported key: {}", reason))]
    KeyUnsupported {
        /// The reason the key is unsupported.
        reason: &'static str,
    },

    /// Not enough signatures verified to meet the role's threshold.
    #[snafu(display(
        "Signature threshold of {} not met for role {} ({} valid signatures)",
        threshold,
        role,
        valid
    ))]
    SignatureThreshold {
        /// The role whose threshold was not met.
        role: String,
        /// The required signature threshold.
        threshold: u64,
        /// The number of valid signatures found.
        valid: u64,
    },

    /// A DER structure could not be read.
    #[snafu(display("Malformed DER in {}", what))]
    SpkiDecode {
        /// What DER structure failed to decode.
        what: &'static str,
    },

    /// A delegated role was not found.
    #[snafu(display("Role {} not found", name))]
    RoleNotFound {
        /// The role name that was not found.
        name: String,
    },

    /// A target was not found.
    #[snafu(display("Target {} not found", name))]
    TargetNotFound {
        /// The target name that was not found.
        name: String,
    },

    /// A delegation's paths are not a subset of the paths delegated to its parent.
    #[snafu(display("Path '{}' is not delegated to role {}", path, role))]
    UnmatchedPath {
        /// The path that is not delegated.
        path: String,
        /// The role the path was expected to be delegated to.
        role: String,
    },
}
