// Copyright 2019 The Notary Project Authors. All Rights Reserved.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provides the `Decoded<T>` type, which represents bytes that are encoded as a string in
//! metadata (hex for key IDs and digests, base64 for public keys and signatures). The original
//! string form is kept so that re-serialization is byte-for-byte stable, which matters when the
//! canonical form of a role is signed.

use crate::schema::error::{self, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use snafu::ResultExt;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::ops::Deref;

/// A string encoding scheme for byte strings.
pub trait Encoding {
    /// Encode bytes into their string form.
    fn encode(b: &[u8]) -> String;
    /// Decode the string form into bytes.
    fn decode(s: &str) -> Result<Vec<u8>>;
}

/// [`Encoding`] for lowercase hexadecimal, used for key IDs and digests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Hex;

impl Encoding for Hex {
    fn encode(b: &[u8]) -> String {
        hex::encode(b)
    }

    fn decode(s: &str) -> Result<Vec<u8>> {
        hex::decode(s).context(error::HexDecodeSnafu { s })
    }
}

/// [`Encoding`] for standard base64, used for public key material and signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Base64;

impl Encoding for Base64 {
    fn encode(b: &[u8]) -> String {
        base64::encode(b)
    }

    fn decode(s: &str) -> Result<Vec<u8>> {
        base64::decode(s).context(error::Base64DecodeSnafu { s })
    }
}

/// A byte string that is encoded as a string in JSON.
///
/// Equality, ordering, and hashing are all on the decoded bytes, so two values that differ only
/// in string representation compare equal.
#[derive(Clone)]
pub struct Decoded<T> {
    bytes: Vec<u8>,
    original: String,
    spec: PhantomData<T>,
}

// Not derived: the encoding marker type has no `Default` of its own.
impl<T> Default for Decoded<T> {
    fn default() -> Self {
        Self {
            bytes: Vec::new(),
            original: String::new(),
            spec: PhantomData,
        }
    }
}

impl<T: Encoding> Decoded<T> {
    /// Consumes this object and returns the decoded bytes.
    pub fn into_vec(self) -> Vec<u8> {
        self.bytes
    }
}

impl<T: Encoding> From<Vec<u8>> for Decoded<T> {
    fn from(bytes: Vec<u8>) -> Self {
        let original = T::encode(&bytes);
        Self {
            bytes,
            original,
            spec: PhantomData,
        }
    }
}

impl<T: Encoding> std::str::FromStr for Decoded<T> {
    type Err = crate::schema::Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(Self {
            bytes: T::decode(s)?,
            original: s.to_owned(),
            spec: PhantomData,
        })
    }
}

impl<T> AsRef<[u8]> for Decoded<T> {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl<T> Deref for Decoded<T> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.bytes
    }
}

impl<T> fmt::Debug for Decoded<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.original, f)
    }
}

impl<T> fmt::Display for Decoded<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.original, f)
    }
}

impl<T> PartialEq for Decoded<T> {
    fn eq(&self, other: &Self) -> bool {
        self.bytes.eq(&other.bytes)
    }
}

impl<T> Eq for Decoded<T> {}

impl<T> PartialEq<[u8]> for Decoded<T> {
    fn eq(&self, other: &[u8]) -> bool {
        self.bytes.eq(&other)
    }
}

impl<T> PartialEq<Vec<u8>> for Decoded<T> {
    fn eq(&self, other: &Vec<u8>) -> bool {
        self.bytes.eq(other)
    }
}

impl<T> PartialOrd for Decoded<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Decoded<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.bytes.cmp(&other.bytes)
    }
}

#[allow(clippy::derive_hash_xor_eq)]
impl<T> Hash for Decoded<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bytes.hash(state);
    }
}

impl<'de, T: Encoding> Deserialize<'de> for Decoded<T> {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error as _;
        let original = String::deserialize(deserializer)?;
        Ok(Self {
            bytes: T::decode(&original).map_err(D::Error::custom)?,
            original,
            spec: PhantomData,
        })
    }
}

impl<T> Serialize for Decoded<T> {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.original)
    }
}
