// Copyright 2019 The Notary Project Authors. All Rights Reserved.
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::schema::decoded::{Decoded, Hex};
use crate::schema::key::Key;
use std::collections::HashMap;

/// Iterates over the keys a role definition references, resolving each key ID against a key map
/// and silently skipping IDs with no definition (those are caught by validation elsewhere).
pub(super) struct KeysIter<'a> {
    pub(super) keyids_iter: std::slice::Iter<'a, Decoded<Hex>>,
    pub(super) keys: &'a HashMap<Decoded<Hex>, Key>,
}

impl<'a> Iterator for KeysIter<'a> {
    type Item = &'a Key;

    fn next(&mut self) -> Option<Self::Item> {
        self.keyids_iter.next().and_then(|id| self.keys.get(id))
    }
}
