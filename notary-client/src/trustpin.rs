// Copyright 2019 The Notary Project Authors. All Rights Reserved.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trust pinning: policy constraining which root keys are acceptable for a collection.
//!
//! Without pinning, the first root observed for a collection is trusted (TOFU). A pinning
//! configuration overrides that: specific key IDs can be pinned per GUN, or a CA can be pinned
//! per GUN prefix so that only certificate-form root keys issued by that CA are trusted.
//! Precedence is pinned key IDs, then CA, then TOFU (unless disabled).

use crate::error::{self, Result};
use crate::schema::decoded::{Decoded, Hex};
use crate::schema::{Certificate, Root, RoleType};
use chrono::{DateTime, Utc};
use log::debug;
use snafu::ResultExt;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Trust pinning configuration, typically assembled from the client's configuration file by the
/// CLI layer.
#[derive(Debug, Clone, Default)]
pub struct TrustPinConfig {
    /// Disables trust-on-first-use. With this set, a collection matching neither `certs` nor
    /// `ca` cannot be bootstrapped.
    pub disable_tofu: bool,

    /// GUN prefix to CA certificate bundle (PEM). The longest matching prefix wins.
    pub ca: BTreeMap<String, PathBuf>,

    /// GUN (exact, or wildcard entry ending in `*`) to pinned root key IDs.
    pub certs: BTreeMap<String, Vec<String>>,
}

/// The pinning policy resolved for one collection.
#[derive(Debug)]
pub enum TrustPinPolicy {
    /// Only these root key IDs are trusted.
    Certs(Vec<String>),
    /// Only certificate-form root keys issued by one of these CA certificates are trusted.
    Ca(Vec<Certificate>),
    /// Trust the keys the first observed root declares.
    Tofu,
}

impl TrustPinConfig {
    /// Resolves the policy for `gun`.
    pub fn policy_for(&self, gun: &str) -> Result<TrustPinPolicy> {
        // Pinned key IDs take precedence: exact entry first, then wildcard entries.
        if let Some(ids) = self.certs.get(gun) {
            return Ok(TrustPinPolicy::Certs(ids.clone()));
        }
        let mut wildcard: Option<(&str, &Vec<String>)> = None;
        for (pattern, ids) in &self.certs {
            if let Some(prefix) = pattern.strip_suffix('*') {
                if gun.starts_with(prefix)
                    && wildcard.map_or(true, |(best, _)| prefix.len() > best.len())
                {
                    wildcard = Some((prefix, ids));
                }
            }
        }
        if let Some((_, ids)) = wildcard {
            return Ok(TrustPinPolicy::Certs(ids.clone()));
        }

        // Then a pinned CA, by longest matching GUN prefix.
        let mut ca_match: Option<(&str, &PathBuf)> = None;
        for (prefix, path) in &self.ca {
            if gun.starts_with(prefix.as_str())
                && ca_match.map_or(true, |(best, _)| prefix.len() > best.len())
            {
                ca_match = Some((prefix, path));
            }
        }
        if let Some((prefix, path)) = ca_match {
            debug!("using pinned CA {} for {}", path.display(), gun);
            let data = std::fs::read(path).context(error::FileReadSnafu { path })?;
            let blocks = pem::parse_many(&data).map_err(|_| {
                error::TrustPinningFailureSnafu {
                    gun,
                    reason: format!("CA file {} is not valid PEM", path.display()),
                }
                .build()
            })?;
            let mut cas = Vec::new();
            for block in &blocks {
                if block.tag() != "CERTIFICATE" {
                    continue;
                }
                let cert = Certificate::parse(block.contents()).map_err(|err| {
                    error::TrustPinningFailureSnafu {
                        gun,
                        reason: format!("bad certificate in CA file for {}: {}", prefix, err),
                    }
                    .build()
                })?;
                cas.push(cert);
            }
            if cas.is_empty() {
                return error::TrustPinningFailureSnafu {
                    gun,
                    reason: format!("CA file {} contains no certificates", path.display()),
                }
                .fail();
            }
            return Ok(TrustPinPolicy::Ca(cas));
        }

        if self.disable_tofu {
            return error::TrustPinningFailureSnafu {
                gun,
                reason: "trust-on-first-use is disabled and no pinning entry matches".to_owned(),
            }
            .fail();
        }
        Ok(TrustPinPolicy::Tofu)
    }
}

impl TrustPinPolicy {
    /// Filters the root role's key IDs down to the ones this policy trusts for bootstrapping.
    /// Fails when the policy rules out every key.
    pub fn trusted_keyids(
        &self,
        gun: &str,
        root: &Root,
        now: DateTime<Utc>,
    ) -> Result<Vec<Decoded<Hex>>> {
        let role_keys = root
            .roles
            .get(&RoleType::Root)
            .map(|keys| keys.keyids.clone())
            .unwrap_or_default();

        match self {
            TrustPinPolicy::Tofu => Ok(role_keys),
            TrustPinPolicy::Certs(pinned) => {
                let trusted: Vec<Decoded<Hex>> = role_keys
                    .into_iter()
                    .filter(|keyid| pinned.iter().any(|p| p == &keyid.to_string()))
                    .collect();
                if trusted.is_empty() {
                    return error::TrustPinningFailureSnafu {
                        gun,
                        reason: "no root key matches the pinned key IDs".to_owned(),
                    }
                    .fail();
                }
                Ok(trusted)
            }
            TrustPinPolicy::Ca(cas) => {
                let mut trusted = Vec::new();
                for keyid in role_keys {
                    let key = match root.keys.get(&keyid) {
                        Some(key) => key,
                        None => continue,
                    };
                    let cert = match key.certificate() {
                        Ok(Some(cert)) => cert,
                        // A non-certificate key can never chain to a CA.
                        _ => continue,
                    };
                    if cert.check_window(now).is_err() {
                        debug!("root key {} certificate outside validity window", keyid);
                        continue;
                    }
                    if cas.iter().any(|ca| cert.signed_by(&ca.spki)) {
                        trusted.push(keyid);
                    }
                }
                if trusted.is_empty() {
                    return error::TrustPinningFailureSnafu {
                        gun,
                        reason: "no root key certificate was issued by the pinned CA".to_owned(),
                    }
                    .fail();
                }
                Ok(trusted)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{TrustPinConfig, TrustPinPolicy};
    use crate::error::Error;
    use std::collections::BTreeMap;

    #[test]
    fn certs_beat_ca_and_tofu() {
        let mut certs = BTreeMap::new();
        certs.insert("example/repo".to_owned(), vec!["abcd".to_owned()]);
        let config = TrustPinConfig {
            certs,
            ..TrustPinConfig::default()
        };
        assert!(matches!(
            config.policy_for("example/repo").unwrap(),
            TrustPinPolicy::Certs(_)
        ));
        assert!(matches!(
            config.policy_for("other/repo").unwrap(),
            TrustPinPolicy::Tofu
        ));
    }

    #[test]
    fn wildcard_certs_entries_match_prefixes() {
        let mut certs = BTreeMap::new();
        certs.insert("docker.io/*".to_owned(), vec!["abcd".to_owned()]);
        let config = TrustPinConfig {
            certs,
            ..TrustPinConfig::default()
        };
        assert!(matches!(
            config.policy_for("docker.io/library/alpine").unwrap(),
            TrustPinPolicy::Certs(_)
        ));
        assert!(matches!(
            config.policy_for("quay.io/thing").unwrap(),
            TrustPinPolicy::Tofu
        ));
    }

    #[test]
    fn disabled_tofu_with_no_match_fails() {
        let config = TrustPinConfig {
            disable_tofu: true,
            ..TrustPinConfig::default()
        };
        assert!(matches!(
            config.policy_for("example/repo"),
            Err(Error::TrustPinningFailure { .. })
        ));
    }
}
