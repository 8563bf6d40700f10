// Copyright 2019 The Notary Project Authors. All Rights Reserved.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the remote signer backend.

use snafu::Snafu;

/// Alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for signer API calls.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
#[non_exhaustive]
pub enum Error {
    /// The signer URL could not be parsed.
    #[snafu(display("Failed to parse signer URL {}: {}", url, source))]
    ParseUrl {
        /// The URL string that failed to parse.
        url: String,
        /// The underlying parse error.
        source: url::ParseError,
    },

    /// The request could not be sent.
    #[snafu(display("Failed to reach signer at {}: {}", url, source))]
    Request {
        /// The signer URL that could not be reached.
        url: String,
        /// The underlying transport error.
        source: reqwest::Error,
    },

    /// The signer rejected the request.
    #[snafu(display("Signer returned status {} for {}", code, url))]
    Api {
        /// The HTTP status code returned by the signer.
        code: u16,
        /// The URL that was requested.
        url: String,
    },

    /// The signer does not know the key.
    #[snafu(display("Signer has no key with ID {}", key_id))]
    KeyNotFound {
        /// The ID of the key that could not be found.
        key_id: String,
    },

    /// The response body was not what we expected.
    #[snafu(display("Failed to parse signer response from {}: {}", url, source))]
    ParseResponse {
        /// The signer URL the response came from.
        url: String,
        /// The underlying parse error.
        source: reqwest::Error,
    },

    /// The response carried an invalid base64 payload.
    #[snafu(display("Signer returned invalid base64 from {}: {}", url, source))]
    DecodeResponse {
        /// The signer URL the response came from.
        url: String,
        /// The underlying decode error.
        source: base64::DecodeError,
    },

    /// The backend cannot import key material: private bytes never leave the signer.
    #[snafu(display("The remote signer store cannot import local key material"))]
    ImportUnsupported,
}

impl Error {
    /// Translates into the client's error taxonomy, preserving this error as the cause.
    pub(crate) fn into_client(self, store: &str) -> notary_client::Error {
        match self {
            Error::KeyNotFound { key_id } => notary_client::Error::key_not_found(key_id),
            Error::Api { code, .. } if code >= 500 || code == 401 => {
                notary_client::Error::server_unavailable(code)
            }
            other => notary_client::Error::key_store(store, other),
        }
    }
}
