// Copyright 2019 The Notary Project Authors. All Rights Reserved.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deserialization helpers for the schema types.

use crate::schema::decoded::{Decoded, Hex};
use crate::schema::error;
use crate::schema::key::Key;
use serde::{de::Error as _, Deserialize, Deserializer};
use serde_json::Value;
use std::collections::HashMap;

/// Deserializes a key map, recomputing every key ID from its key material and rejecting the
/// map if any stated ID does not match.
///
/// This is what makes a key ID trustworthy as a handle: trust pinning and role definitions
/// reference keys by ID, so a map entry whose ID and material disagree would let a signature
/// from one key count toward another's ID. A duplicated ID simply collapses in the map; both
/// entries must hash to the same ID, so whichever survives is the same key.
pub(super) fn checked_key_map<'de, D>(
    deserializer: D,
) -> Result<HashMap<Decoded<Hex>, Key>, D::Error>
where
    D: Deserializer<'de>,
{
    let keys = HashMap::<Decoded<Hex>, Key>::deserialize(deserializer)?;
    for (keyid, key) in &keys {
        let calculated = key.key_id().map_err(D::Error::custom)?;
        if *keyid != calculated {
            return Err(D::Error::custom(
                error::InvalidKeyIdSnafu {
                    keyid: keyid.to_string(),
                    calculated: calculated.to_string(),
                }
                .build(),
            ));
        }
    }
    Ok(keys)
}

/// Deserializes the remainder of a tagged body into an extra-fields map, dropping the `_type`
/// tag itself (serde's flatten would otherwise capture it and it would be serialized twice).
pub(super) fn extra_skip_type<'de, D>(
    deserializer: D,
) -> Result<HashMap<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    let mut extra = HashMap::deserialize(deserializer)?;
    extra.remove("_type");
    Ok(extra)
}
