// Copyright 2019 The Notary Project Authors. All Rights Reserved.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The low-level HTTP client for the Notary signer's key management and signing API.
//!
//! The API is a small JSON-over-HTTP surface:
//!
//! * `POST   /keys`: generate a key, returning its ID and public half
//! * `POST   /keys/<id>/associate`: bind a generated key to a role and collection
//! * `POST   /keys/<id>/sign`: sign a message with a key
//! * `GET    /keys/<id>`: look up a key's binding and public half
//! * `GET    /keys`: enumerate keys
//! * `DELETE /keys/<id>`: destroy a key

use crate::error::{self, Error, Result};
use notary_client::schema::key::Key;
use reqwest::blocking::{Client, ClientBuilder};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Timeouts for signer calls.
#[derive(Debug, Clone, Copy)]
pub struct SignerSettings {
    /// Deadline for a whole call, including the server-side signing operation.
    pub timeout: Duration,
    /// Deadline for establishing a connection.
    pub connect_timeout: Duration,
}

impl Default for SignerSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// A key as the signer describes it.
#[derive(Debug, Clone, Deserialize)]
pub struct SignerKey {
    /// The key's ID, as derived by the signer.
    #[serde(rename = "keyID")]
    pub key_id: String,
    /// The public half, in metadata form.
    #[serde(rename = "publicKey")]
    pub public_key: Key,
    /// The role the key is bound to, once associated.
    #[serde(default)]
    pub role: Option<String>,
    /// The collection the key is bound to, once associated.
    #[serde(default)]
    pub gun: Option<String>,
}

#[derive(Debug, Serialize)]
struct AssociateRequest<'a> {
    role: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    gun: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct SignRequest<'a> {
    message: &'a str,
}

#[derive(Debug, Deserialize)]
struct SignResponse {
    signature: String,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    keys: Vec<SignerKey>,
}

/// The HTTP client for one signer endpoint.
#[derive(Debug, Clone)]
pub struct SignerClient {
    base: Url,
    client: Client,
}

impl SignerClient {
    /// Creates a client for the signer at `base_url`.
    pub fn new(base_url: &str, settings: SignerSettings) -> Result<Self> {
        let mut url = base_url.to_owned();
        if !url.ends_with('/') {
            url.push('/');
        }
        let base = Url::parse(&url).map_err(|source| Error::ParseUrl { url, source })?;
        let client = ClientBuilder::new()
            .timeout(settings.timeout)
            .connect_timeout(settings.connect_timeout)
            .build()
            .map_err(|source| Error::Request {
                url: base_url.to_owned(),
                source,
            })?;
        Ok(Self { base, client })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .map_err(|source| Error::ParseUrl {
                url: path.to_owned(),
                source,
            })
    }

    fn check(url: &Url, status: StatusCode, key_id: Option<&str>) -> Result<()> {
        if status.is_success() {
            return Ok(());
        }
        if status == StatusCode::NOT_FOUND {
            if let Some(key_id) = key_id {
                return error::KeyNotFoundSnafu { key_id }.fail();
            }
        }
        error::ApiSnafu {
            code: status.as_u16(),
            url: url.to_string(),
        }
        .fail()
    }

    /// Generates a new key of the given algorithm. The key is not yet bound to a role.
    pub fn generate(&self, algorithm: &str) -> Result<SignerKey> {
        let url = self.url(&format!("keys?algorithm={}", algorithm))?;
        let response = self
            .client
            .post(url.clone())
            .send()
            .map_err(|source| Error::Request {
                url: url.to_string(),
                source,
            })?;
        Self::check(&url, response.status(), None)?;
        response.json().map_err(|source| Error::ParseResponse {
            url: url.to_string(),
            source,
        })
    }

    /// Binds a generated key to a role (and optionally a collection).
    pub fn associate(&self, key_id: &str, role: &str, gun: Option<&str>) -> Result<()> {
        let url = self.url(&format!("keys/{}/associate", key_id))?;
        let response = self
            .client
            .post(url.clone())
            .json(&AssociateRequest { role, gun })
            .send()
            .map_err(|source| Error::Request {
                url: url.to_string(),
                source,
            })?;
        Self::check(&url, response.status(), Some(key_id))
    }

    /// Signs `message` with the named key, returning the raw signature bytes.
    pub fn sign(&self, key_id: &str, message: &[u8]) -> Result<Vec<u8>> {
        let url = self.url(&format!("keys/{}/sign", key_id))?;
        let encoded = base64::encode(message);
        let response = self
            .client
            .post(url.clone())
            .json(&SignRequest { message: &encoded })
            .send()
            .map_err(|source| Error::Request {
                url: url.to_string(),
                source,
            })?;
        Self::check(&url, response.status(), Some(key_id))?;
        let body: SignResponse = response.json().map_err(|source| Error::ParseResponse {
            url: url.to_string(),
            source,
        })?;
        base64::decode(&body.signature).map_err(|source| Error::DecodeResponse {
            url: url.to_string(),
            source,
        })
    }

    /// Looks up one key.
    pub fn get(&self, key_id: &str) -> Result<SignerKey> {
        let url = self.url(&format!("keys/{}", key_id))?;
        let response = self
            .client
            .get(url.clone())
            .send()
            .map_err(|source| Error::Request {
                url: url.to_string(),
                source,
            })?;
        Self::check(&url, response.status(), Some(key_id))?;
        response.json().map_err(|source| Error::ParseResponse {
            url: url.to_string(),
            source,
        })
    }

    /// Enumerates every key the signer will admit to holding for this client.
    pub fn list(&self) -> Result<Vec<SignerKey>> {
        let url = self.url("keys")?;
        let response = self
            .client
            .get(url.clone())
            .send()
            .map_err(|source| Error::Request {
                url: url.to_string(),
                source,
            })?;
        Self::check(&url, response.status(), None)?;
        let body: ListResponse = response.json().map_err(|source| Error::ParseResponse {
            url: url.to_string(),
            source,
        })?;
        Ok(body.keys)
    }

    /// Destroys a key.
    pub fn delete(&self, key_id: &str) -> Result<()> {
        let url = self.url(&format!("keys/{}", key_id))?;
        let response = self
            .client
            .delete(url.clone())
            .send()
            .map_err(|source| Error::Request {
                url: url.to_string(),
                source,
            })?;
        Self::check(&url, response.status(), Some(key_id))
    }

    /// Where this client points, for display.
    pub fn location(&self) -> String {
        self.base.to_string()
    }
}
