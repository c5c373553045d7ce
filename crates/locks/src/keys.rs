// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Shahzad A. Bhatti <bhatti@plexobject.com>
//
// This file is part of ConfigCenter.
//
// ConfigCenter is free software: you can redistribute it and/or modify
// it under the terms of the GNU Lesser General Public License as published by
// the Free Software Foundation, either version 2.1 of the License, or
// (at your option) any later version.
//
// ConfigCenter is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public License
// along with ConfigCenter. If not, see <https://www.gnu.org/licenses/>.

//! Store key layout for lock records and relation indexes.
//!
//! ```text
//! {prefix}:lock:pre:name:{resource}      lock record, pre namespace
//! {prefix}:lock:detail:name:{resource}   lock record, detail namespace
//! {prefix}:lock:pre:id:{txn_id}          relation index hash, pre namespace
//! {prefix}:lock:detail:id:{txn_id}       relation index hash, detail namespace
//! ```
//!
//! The engine and the compensation worker hold clones of the same
//! [`KeyScheme`], so both always derive identical keys.

use crate::LockNamespace;

const RECORD_SEGMENT: &str = "name";
const RELATION_SEGMENT: &str = "id";

/// Build a store key.
///
/// `is_pre` selects the pre namespace and `is_index` selects the relation
/// index hash (where `name` is a transaction id) over the lock record (where
/// `name` is a resource name).
pub fn fmt_key(prefix: &str, name: &str, is_pre: bool, is_index: bool) -> String {
    let namespace = if is_pre {
        LockNamespace::Pre
    } else {
        LockNamespace::Detail
    };
    format!("{}{}", base(prefix, namespace, is_index), name)
}

fn base(prefix: &str, namespace: LockNamespace, is_index: bool) -> String {
    let segment = if is_index {
        RELATION_SEGMENT
    } else {
        RECORD_SEGMENT
    };
    format!("{}:lock:{}:{}:", prefix, namespace.as_str(), segment)
}

/// Escape Redis glob metacharacters so a literal prefix can head a pattern.
fn escape_glob(literal: &str) -> String {
    let mut escaped = String::with_capacity(literal.len());
    for c in literal.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Key scheme bound to one engine prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyScheme {
    prefix: String,
}

impl KeyScheme {
    /// Scheme for `prefix` (e.g. "cc").
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Configured prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Lock record key for `resource`.
    pub fn record_key(&self, namespace: LockNamespace, resource: &str) -> String {
        fmt_key(&self.prefix, resource, namespace.is_pre(), false)
    }

    /// Relation index hash key for `txn_id`.
    pub fn relation_key(&self, namespace: LockNamespace, txn_id: &str) -> String {
        fmt_key(&self.prefix, txn_id, namespace.is_pre(), true)
    }

    /// Scan pattern matching every lock record in `namespace`.
    pub fn record_pattern(&self, namespace: LockNamespace) -> String {
        format!("{}*", escape_glob(&base(&self.prefix, namespace, false)))
    }

    /// Scan pattern matching every relation index in `namespace`.
    pub fn relation_pattern(&self, namespace: LockNamespace) -> String {
        format!("{}*", escape_glob(&base(&self.prefix, namespace, true)))
    }

    /// Resource name of a lock record key, if `key` is one.
    pub fn resource_of<'a>(&self, namespace: LockNamespace, key: &'a str) -> Option<&'a str> {
        key.strip_prefix(base(&self.prefix, namespace, false).as_str())
    }

    /// Transaction id of a relation index key, if `key` is one.
    pub fn txn_of<'a>(&self, namespace: LockNamespace, key: &'a str) -> Option<&'a str> {
        key.strip_prefix(base(&self.prefix, namespace, true).as_str())
    }
}
