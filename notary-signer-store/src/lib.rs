// Copyright 2019 The Notary Project Authors. All Rights Reserved.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! notary-signer-store implements the `KeyStore` trait found in the Notary client for keys
//! that live in a remote Notary signer.
//!
//! Private material never exists on the machine running this code: generation happens
//! server-side, and every signature is a round trip. Creating a key is two server calls
//! (generate, then associate with a role), and a key whose association fails is deleted rather
//! than left dangling.
//!
//! # Testing
//!
//! Unit tests are run in the usual manner: `cargo test`; they use an `httptest` server in
//! place of a real signer.

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

mod client;
pub mod error;

pub use crate::client::{SignerClient, SignerSettings};

use crate::error::Error;
use log::{debug, warn};
use notary_client::keystore::{KeyInfo, KeyStore};
use notary_client::passphrase::PassphraseRetriever;
use notary_client::schema::key::Key;
use notary_client::schema::RoleName;
use notary_client::sign::{KeyAlgorithm, Sign, SigningKey};
use ring::rand::SecureRandom;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

const STORE_NAME: &str = "signer";

/// A [`KeyStore`] whose keys live in a remote Notary signer.
#[derive(Debug)]
pub struct RemoteKeyStore {
    client: SignerClient,
}

impl RemoteKeyStore {
    /// Creates a store talking to the signer at `base_url`.
    pub fn new(base_url: &str, settings: SignerSettings) -> error::Result<Self> {
        Ok(Self {
            client: SignerClient::new(base_url, settings)?,
        })
    }

    /// Wraps an existing [`SignerClient`].
    pub fn with_client(client: SignerClient) -> Self {
        Self { client }
    }
}

impl KeyStore for RemoteKeyStore {
    fn name(&self) -> &str {
        STORE_NAME
    }

    fn location(&self) -> String {
        self.client.location()
    }

    /// The signer cannot import local material; keys must be created server-side.
    fn add(
        &self,
        _info: &KeyInfo,
        _key: SigningKey,
        _retriever: &dyn PassphraseRetriever,
    ) -> notary_client::Result<()> {
        Err(Error::ImportUnsupported.into_client(STORE_NAME))
    }

    fn get(
        &self,
        key_id: &str,
        _retriever: &dyn PassphraseRetriever,
    ) -> notary_client::Result<(Box<dyn Sign>, RoleName)> {
        let found = self
            .client
            .get(key_id)
            .map_err(|err| err.into_client(STORE_NAME))?;
        let role = parse_role(found.role.as_deref())
            .map_err(|err| err.into_client(STORE_NAME))?;
        Ok((
            Box::new(RemoteKey {
                client: self.client.clone(),
                key_id: found.key_id,
                public_key: found.public_key,
            }),
            role,
        ))
    }

    fn get_info(&self, key_id: &str) -> notary_client::Result<KeyInfo> {
        let found = self
            .client
            .get(key_id)
            .map_err(|err| err.into_client(STORE_NAME))?;
        let role = parse_role(found.role.as_deref())
            .map_err(|err| err.into_client(STORE_NAME))?;
        Ok(KeyInfo::new(role, found.gun))
    }

    fn list(&self) -> HashMap<String, KeyInfo> {
        let keys = match self.client.list() {
            Ok(keys) => keys,
            Err(err) => {
                warn!("could not list signer keys: {}", err);
                return HashMap::new();
            }
        };
        keys.into_iter()
            .filter_map(|key| {
                let role = parse_role(key.role.as_deref()).ok()?;
                Some((key.key_id, KeyInfo::new(role, key.gun)))
            })
            .collect()
    }

    fn remove(&self, key_id: &str) -> notary_client::Result<()> {
        self.client
            .delete(key_id)
            .map_err(|err| err.into_client(STORE_NAME))
    }

    /// Creates a key server-side: generate, then associate. A key whose association fails is
    /// deleted before the error is surfaced, so the signer is not left holding an orphan.
    fn create(
        &self,
        info: &KeyInfo,
        algorithm: KeyAlgorithm,
        _retriever: &dyn PassphraseRetriever,
    ) -> notary_client::Result<Key> {
        let generated = self
            .client
            .generate(&algorithm.to_string())
            .map_err(|err| err.into_client(STORE_NAME))?;
        debug!("signer generated key {}", generated.key_id);

        let role = info.role.to_string();
        if let Err(err) = self
            .client
            .associate(&generated.key_id, &role, info.gun.as_deref())
        {
            // Best effort: do not leave a dangling unassociated key behind.
            if let Err(cleanup) = self.client.delete(&generated.key_id) {
                warn!(
                    "could not delete orphaned signer key {}: {}",
                    generated.key_id, cleanup
                );
            }
            return Err(err.into_client(STORE_NAME));
        }
        Ok(generated.public_key)
    }
}

/// A signing capability whose private half lives in the signer.
pub struct RemoteKey {
    client: SignerClient,
    key_id: String,
    public_key: Key,
}

impl fmt::Debug for RemoteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteKey")
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

impl Sign for RemoteKey {
    fn tuf_key(&self) -> Key {
        self.public_key.clone()
    }

    fn sign(
        &self,
        msg: &[u8],
        _rng: &dyn SecureRandom,
    ) -> std::result::Result<Vec<u8>, Box<dyn std::error::Error + Send + Sync + 'static>> {
        Ok(self.client.sign(&self.key_id, msg)?)
    }
}

fn parse_role(role: Option<&str>) -> error::Result<RoleName> {
    let role = role.ok_or(Error::KeyNotFound {
        key_id: "<unassociated>".to_owned(),
    })?;
    RoleName::from_str(role).map_err(|_| Error::KeyNotFound {
        key_id: role.to_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::{RemoteKeyStore, SignerSettings};
    use httptest::{matchers::*, responders::*, Expectation, Server};
    use notary_client::keystore::{KeyInfo, KeyStore};
    use notary_client::passphrase::ConstantRetriever;
    use notary_client::schema::RoleName;
    use notary_client::sign::KeyAlgorithm;
    use serde_json::json;

    fn key_json(key_id: &str) -> serde_json::Value {
        json!({
            "keyID": key_id,
            "publicKey": {
                "keytype": "ed25519",
                "keyval": { "public": base64::encode([0u8; 32]), "private": null }
            },
            "role": "snapshot",
            "gun": "example/repo"
        })
    }

    #[test]
    fn create_generates_then_associates() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/keys"))
                .respond_with(json_encoded(key_json("abc123"))),
        );
        server.expect(
            Expectation::matching(request::method_path("POST", "/keys/abc123/associate"))
                .respond_with(status_code(200)),
        );

        let store =
            RemoteKeyStore::new(&server.url_str("/"), SignerSettings::default()).unwrap();
        let key = store
            .create(
                &KeyInfo::new(RoleName::Snapshot, Some("example/repo".to_owned())),
                KeyAlgorithm::Ecdsa,
                &ConstantRetriever::new(""),
            )
            .unwrap();
        assert!(key.key_id().is_ok());
    }

    #[test]
    fn failed_association_deletes_the_orphan() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/keys"))
                .respond_with(json_encoded(key_json("abc123"))),
        );
        server.expect(
            Expectation::matching(request::method_path("POST", "/keys/abc123/associate"))
                .respond_with(status_code(500)),
        );
        server.expect(
            Expectation::matching(request::method_path("DELETE", "/keys/abc123"))
                .respond_with(status_code(200)),
        );

        let store =
            RemoteKeyStore::new(&server.url_str("/"), SignerSettings::default()).unwrap();
        let result = store.create(
            &KeyInfo::new(RoleName::Snapshot, None),
            KeyAlgorithm::Ecdsa,
            &ConstantRetriever::new(""),
        );
        assert!(result.is_err());
    }

    #[test]
    fn get_returns_remote_signing_capability() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/keys/abc123"))
                .respond_with(json_encoded(key_json("abc123"))),
        );

        let store =
            RemoteKeyStore::new(&server.url_str("/"), SignerSettings::default()).unwrap();
        let (signer, role) = store
            .get("abc123", &ConstantRetriever::new(""))
            .unwrap();
        assert_eq!(role, RoleName::Snapshot);
        assert_eq!(signer.tuf_key().public().len(), 32);
    }
}
