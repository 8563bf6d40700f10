// Copyright 2019 The Notary Project Authors. All Rights Reserved.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Passphrase retrieval for unlocking and encrypting private key material.
//!
//! Retrievers are passed explicitly to every key store operation that may need one; there is no
//! ambient prompt. Interactive prompting belongs to the CLI layer, which supplies its own
//! implementation of this trait.

use crate::error::{self, Result};
use std::collections::HashMap;
use std::sync::Mutex;

/// Retrieves a passphrase for a key.
///
/// `alias` is a human-meaningful name for the key (usually its role); `create_new` is true when
/// the passphrase will encrypt new material rather than unlock existing material; `attempts` is
/// the number of failed attempts so far for this key. A retriever that cannot or will not
/// produce a passphrase fails with `AttemptsExceeded`.
pub trait PassphraseRetriever: Send + Sync {
    /// Returns the passphrase for the given key. An empty string means "store unencrypted".
    fn passphrase(&self, key_id: &str, alias: &str, create_new: bool, attempts: u32)
        -> Result<String>;
}

/// A retriever that always returns the same passphrase. Useful for tests and for callers that
/// obtained the passphrase elsewhere.
#[derive(Clone)]
pub struct ConstantRetriever {
    passphrase: String,
}

impl std::fmt::Debug for ConstantRetriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print the passphrase itself.
        f.debug_struct("ConstantRetriever").finish_non_exhaustive()
    }
}

impl ConstantRetriever {
    /// Creates a retriever returning `passphrase` for every key.
    pub fn new<S: Into<String>>(passphrase: S) -> Self {
        Self {
            passphrase: passphrase.into(),
        }
    }
}

impl PassphraseRetriever for ConstantRetriever {
    fn passphrase(
        &self,
        key_id: &str,
        _alias: &str,
        _create_new: bool,
        attempts: u32,
    ) -> Result<String> {
        // A constant retriever can never produce a different answer, so a second attempt is
        // already hopeless.
        if attempts > 0 {
            return error::AttemptsExceededSnafu { key_id }.fail();
        }
        Ok(self.passphrase.clone())
    }
}

/// A retriever that reads the passphrase from an environment variable.
#[derive(Debug, Clone)]
pub struct EnvRetriever {
    var: String,
}

impl EnvRetriever {
    /// Creates a retriever reading from the environment variable `var`.
    pub fn new<S: Into<String>>(var: S) -> Self {
        Self { var: var.into() }
    }
}

impl PassphraseRetriever for EnvRetriever {
    fn passphrase(
        &self,
        key_id: &str,
        _alias: &str,
        _create_new: bool,
        attempts: u32,
    ) -> Result<String> {
        if attempts > 0 {
            return error::AttemptsExceededSnafu { key_id }.fail();
        }
        std::env::var(&self.var)
            .map_err(|_| error::AttemptsExceededSnafu { key_id }.build())
    }
}

/// Wraps another retriever, caching the first successful answer per alias so that one unlock
/// serves a whole publish.
pub struct CachingRetriever<R> {
    inner: R,
    cache: Mutex<HashMap<String, String>>,
}

impl<R: std::fmt::Debug> std::fmt::Debug for CachingRetriever<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The cache holds passphrases; print only the inner retriever.
        f.debug_struct("CachingRetriever")
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

impl<R: PassphraseRetriever> CachingRetriever<R> {
    /// Wraps `inner` with an alias-keyed cache.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            cache: Mutex::new(HashMap::new()),
        }
    }
}

impl<R: PassphraseRetriever> PassphraseRetriever for CachingRetriever<R> {
    fn passphrase(
        &self,
        key_id: &str,
        alias: &str,
        create_new: bool,
        attempts: u32,
    ) -> Result<String> {
        if attempts == 0 {
            if let Some(cached) = self
                .cache
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .get(alias)
            {
                return Ok(cached.clone());
            }
        }
        let passphrase = self.inner.passphrase(key_id, alias, create_new, attempts)?;
        self.cache
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(alias.to_owned(), passphrase.clone());
        Ok(passphrase)
    }
}
