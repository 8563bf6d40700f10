// Copyright 2019 The Notary Project Authors. All Rights Reserved.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The HTTP mirror store, which maps the [`MetadataStore`] interface onto a trust server
//! speaking the TUF mirror protocol:
//!
//! * `GET  <base>/v2/<gun>/_trust/tuf/<role>.json`: fetch metadata
//! * `POST <base>/v2/<gun>/_trust/tuf/`: multipart upload, applied atomically
//! * `DELETE <base>/v2/<gun>/_trust/tuf/`: remove all metadata for the collection
//! * `POST <base>/v2/<gun>/_trust/tuf/key/<role>`: server-side key rotation
//!
//! Server errors are translated into the client's error taxonomy; requests are retried with
//! exponential backoff on server errors and transport failures.

use crate::error::{self, Error, Result};
use crate::schema::key::Key;
use crate::schema::RoleName;
use crate::storage::{check_size, MetadataStore};
use log::{debug, warn};
use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::{Client, ClientBuilder, RequestBuilder, Response};
use reqwest::StatusCode;
use serde::Deserialize;
use snafu::ResultExt;
use std::collections::HashMap;
use std::io::Read;
use std::time::Duration;
use url::Url;

/// Settings for the HTTP client, including timeouts and retry strategy.
#[derive(Debug, Clone, Copy)]
pub struct ClientSettings {
    /// Deadline for a whole request, including reading the body.
    pub timeout: Duration,
    /// Deadline for establishing a connection.
    pub connect_timeout: Duration,
    /// The total number of times we will try to get a response.
    pub tries: u32,
    /// The pause between the first and second try.
    pub initial_backoff: Duration,
    /// The factor by which the pause grows after each try.
    pub backoff_factor: f32,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
            tries: 3,
            initial_backoff: Duration::from_millis(100),
            backoff_factor: 2.0,
        }
    }
}

/// A [`MetadataStore`] over a remote trust server.
#[derive(Debug)]
pub struct HttpMirrorStore {
    base: Url,
    gun: String,
    client: Client,
    settings: ClientSettings,
}

impl HttpMirrorStore {
    /// Creates a mirror store for `gun` rooted at `server_url`.
    pub fn new(server_url: &str, gun: &str, settings: ClientSettings) -> Result<Self> {
        let mut url = server_url.to_owned();
        if !url.ends_with('/') {
            url.push('/');
        }
        let base = Url::parse(&url).context(error::ParseUrlSnafu { url })?;
        let client = ClientBuilder::new()
            .timeout(settings.timeout)
            .connect_timeout(settings.connect_timeout)
            .build()
            .map_err(|source| Error::Transport {
                url: server_url.to_owned(),
                source,
            })?;
        Ok(Self {
            base,
            gun: gun.to_owned(),
            client,
            settings,
        })
    }

    fn collection_url(&self) -> Result<Url> {
        let path = format!("v2/{}/_trust/tuf/", self.gun);
        self.base.join(&path).context(error::ParseUrlSnafu { url: path })
    }

    fn metadata_url(&self, name: &str) -> Result<Url> {
        let path = format!("v2/{}/_trust/tuf/{}.json", self.gun, name);
        self.base.join(&path).context(error::ParseUrlSnafu { url: path })
    }

    fn key_url(&self, role: &RoleName) -> Result<Url> {
        let path = format!("v2/{}/_trust/tuf/key/{}", self.gun, role);
        self.base.join(&path).context(error::ParseUrlSnafu { url: path })
    }

    /// Sends a request, retrying on server errors and transport failures, and translates the
    /// final status into the error taxonomy. Client errors (4xx) are never retried.
    fn send(&self, resource: &str, build: impl Fn() -> RequestBuilder) -> Result<Response> {
        let mut wait = self.settings.initial_backoff;
        let mut last: Option<Error> = None;
        for attempt in 0..self.settings.tries {
            if attempt > 0 {
                std::thread::sleep(wait);
                wait = wait.mul_f32(self.settings.backoff_factor);
            }
            match build().send() {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }
                    if status.is_server_error() {
                        warn!("server error {} for {}, may retry", status, resource);
                        last = Some(Error::ServerUnavailable {
                            code: status.as_u16(),
                        });
                        continue;
                    }
                    return Err(client_error(resource, status, response));
                }
                Err(err) if err.is_timeout() => {
                    return error::NetworkTimeoutSnafu {
                        url: resource.to_owned(),
                    }
                    .fail();
                }
                Err(err) => {
                    warn!("transport error for {}: {}, may retry", resource, err);
                    last = Some(Error::Transport {
                        url: resource.to_owned(),
                        source: err,
                    });
                }
            }
        }
        // tries is always >= 1, so `last` is set by the time we get here
        Err(last.unwrap_or(Error::ServerUnavailable { code: 0 }))
    }
}

impl MetadataStore for HttpMirrorStore {
    fn get_sized(&self, name: &str, max_bytes: i64) -> Result<Vec<u8>> {
        let url = self.metadata_url(name)?;
        debug!("fetching {}", url);
        let mut response = self.send(name, || self.client.get(url.clone()))?;

        let mut data = Vec::new();
        if max_bytes < 0 {
            response
                .read_to_end(&mut data)
                .map_err(|_| Error::ServerUnavailable { code: 0 })?;
        } else {
            let cap = max_bytes as u64;
            response
                .by_ref()
                .take(cap + 1)
                .read_to_end(&mut data)
                .map_err(|_| Error::ServerUnavailable { code: 0 })?;
            check_size(name, &data, max_bytes)?;
        }
        Ok(data)
    }

    fn set(&self, name: &str, data: &[u8]) -> Result<()> {
        let mut metas = HashMap::new();
        metas.insert(name.to_owned(), data.to_vec());
        self.set_multi(&metas)
    }

    /// Uploads every blob in one multipart request; the server applies them as a single
    /// transaction.
    fn set_multi(&self, metas: &HashMap<String, Vec<u8>>) -> Result<()> {
        let url = self.collection_url()?;
        self.send("metadata update", || {
            let mut form = Form::new();
            for (name, data) in metas {
                let part = Part::bytes(data.clone())
                    .file_name(format!("{}.json", name))
                    .mime_str("application/json")
                    // the mime string is a constant; this cannot fail
                    .unwrap_or_else(|_| Part::bytes(data.clone()));
                form = form.part("files", part);
            }
            self.client.post(url.clone()).multipart(form)
        })?;
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<()> {
        // The mirror protocol has no single-file delete; this store only supports wholesale
        // removal.
        error::InvalidOperationSnafu {
            detail: Some(format!("cannot remove single file {} from remote", name)),
        }
        .fail()
    }

    fn remove_all(&self) -> Result<()> {
        let url = self.collection_url()?;
        self.send("trust data removal", || self.client.delete(url.clone()))?;
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>> {
        error::InvalidOperationSnafu {
            detail: Some("remote store does not support listing".to_owned()),
        }
        .fail()
    }

    fn location(&self) -> String {
        format!("{} (collection {})", self.base, self.gun)
    }

    fn rotate_key(&self, role: &RoleName) -> Result<Key> {
        let url = self.key_url(role)?;
        debug!("requesting server-managed key for {} from {}", role, url);
        let response = self.send("key rotation", || self.client.post(url.clone()))?;
        let data = response
            .bytes()
            .map_err(|_| Error::ServerUnavailable { code: 0 })?;
        serde_json::from_slice(&data).context(error::ParseMetadataSnafu { role: role.clone() })
    }
}

/// The error body the trust server sends with 4xx responses.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    errors: Vec<ServerError>,
}

#[derive(Debug, Deserialize)]
struct ServerError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    detail: serde_json::Value,
}

/// Translates a non-retriable HTTP status into the error taxonomy.
fn client_error(resource: &str, status: StatusCode, response: Response) -> Error {
    match status {
        StatusCode::UNAUTHORIZED => Error::ServerUnavailable { code: 401 },
        StatusCode::NOT_FOUND => Error::MetaNotFound {
            resource: resource.to_owned(),
        },
        StatusCode::BAD_REQUEST => {
            // Try to recognize a structured error; otherwise this is a generic bad operation.
            if let Ok(body) = response.json::<ErrorBody>() {
                for err in &body.errors {
                    if err.code == "METADATA_NOT_FOUND" {
                        return Error::MetaNotFound {
                            resource: resource.to_owned(),
                        };
                    }
                }
                if let Some(first) = body.errors.first() {
                    let detail = if first.message.is_empty() {
                        first.detail.to_string()
                    } else {
                        first.message.clone()
                    };
                    return Error::InvalidOperation {
                        detail: Some(detail),
                    };
                }
            }
            Error::InvalidOperation { detail: None }
        }
        _ => Error::InvalidOperation {
            detail: Some(format!("unexpected status {}", status)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::{ClientSettings, HttpMirrorStore};

    #[test]
    fn urls_are_rooted_at_the_collection() {
        let store =
            HttpMirrorStore::new("https://notary.example.com", "docker.io/library/alpine", ClientSettings::default())
                .unwrap();
        assert_eq!(
            store.metadata_url("targets/releases").unwrap().as_str(),
            "https://notary.example.com/v2/docker.io/library/alpine/_trust/tuf/targets/releases.json"
        );
        assert_eq!(
            store.key_url(&crate::schema::RoleName::Timestamp).unwrap().as_str(),
            "https://notary.example.com/v2/docker.io/library/alpine/_trust/tuf/key/timestamp"
        );
    }
}
