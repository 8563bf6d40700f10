// Copyright 2019 The Notary Project Authors. All Rights Reserved.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Threshold signature verification over the canonical form of a signed body.

use crate::schema::decoded::{Decoded, Hex};
use crate::schema::error::{self, Result};
use crate::schema::key::Key;
use olpc_cjson::CanonicalFormatter;
use serde::Serialize;
use snafu::{ensure, ResultExt};
use std::collections::{HashMap, HashSet};
use std::num::NonZeroU64;

use crate::schema::Signed;

/// Verifies that `role` carries at least `threshold` valid signatures from distinct keys among
/// `keyids`, resolving key material through `keys`.
///
/// Signatures from keys outside the trust set are ignored, as are second signatures from a key
/// that has already counted; only distinct approved keys count toward the threshold.
pub(crate) fn verify_signed<T: Serialize>(
    role: &Signed<T>,
    keys: &HashMap<Decoded<Hex>, Key>,
    keyids: &[Decoded<Hex>],
    threshold: NonZeroU64,
    role_name: &str,
) -> Result<()> {
    let mut data = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut data, CanonicalFormatter::new());
    role.signed
        .serialize(&mut ser)
        .context(error::JsonSerializationSnafu {
            what: format!("{} role", role_name),
        })?;

    let mut valid = HashSet::new();
    for signature in &role.signatures {
        if !keyids.contains(&signature.keyid) {
            continue;
        }
        if let Some(key) = keys.get(&signature.keyid) {
            if key.verify(&data, &signature.sig, signature.method) {
                valid.insert(signature.keyid.clone());
            }
        }
    }

    ensure!(
        valid.len() as u64 >= u64::from(threshold),
        error::SignatureThresholdSnafu {
            role: role_name,
            threshold: u64::from(threshold),
            valid: valid.len() as u64,
        }
    );
    Ok(())
}
