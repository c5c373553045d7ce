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

//! In-memory KeyValue store implementation.
//!
//! ## Purpose
//! Provides a map-based implementation with Redis semantics for testing and
//! single-process scenarios.
//!
//! ## Features
//! - String and hash values with `WRONGTYPE` checks
//! - Atomic set-if-absent and compare-and-delete
//! - Stable scan cursors (ordered keys, resumable after concurrent writes)
//!
//! ## Limitations
//! - Not persistent (data lost on restart)
//! - Not distributed (single process only)

use crate::pattern::glob_match;
use crate::{KVError, KVResult, KeyValueStore, ScanPage};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Upper bound on scans left open by callers that stopped early.
const MAX_OPEN_SCANS: usize = 1024;

/// Batch size used when a caller passes `count == 0`.
const DEFAULT_SCAN_COUNT: usize = 10;

/// Stored value.
#[derive(Debug, Clone)]
enum Value {
    String(Vec<u8>),
    Hash(HashMap<String, Vec<u8>>),
}

#[derive(Debug, Default)]
struct Inner {
    data: BTreeMap<String, Value>,
    /// Open scan cursors → last key examined
    cursors: HashMap<u64, String>,
    next_cursor: u64,
}

impl Inner {
    fn open_cursor(&mut self, last_key: String) -> u64 {
        if self.cursors.len() >= MAX_OPEN_SCANS {
            if let Some(oldest) = self.cursors.keys().min().copied() {
                self.cursors.remove(&oldest);
                debug!(cursor = oldest, "Evicted abandoned scan cursor");
            }
        }
        self.next_cursor += 1;
        let id = self.next_cursor;
        self.cursors.insert(id, last_key);
        id
    }
}

/// In-memory KeyValue store implementation.
///
/// ## Example
/// ```rust
/// use configcenter_keyvalue::{KeyValueStore, InMemoryKVStore};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let kv = InMemoryKVStore::new();
///
/// kv.put("key", b"value".to_vec()).await?;
/// let value = kv.get("key").await?;
/// assert_eq!(value, Some(b"value".to_vec()));
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default)]
pub struct InMemoryKVStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryKVStore {
    /// Create a new in-memory KeyValue store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys of any type.
    pub async fn len(&self) -> usize {
        self.inner.read().await.data.len()
    }

    /// True when the store holds no keys.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.data.is_empty()
    }

    fn wrong_type(key: &str) -> KVError {
        KVError::WrongType(key.to_string())
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKVStore {
    async fn get(&self, key: &str) -> KVResult<Option<Vec<u8>>> {
        let inner = self.inner.read().await;
        match inner.data.get(key) {
            Some(Value::String(v)) => Ok(Some(v.clone())),
            Some(Value::Hash(_)) => Err(Self::wrong_type(key)),
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> KVResult<()> {
        let mut inner = self.inner.write().await;
        inner.data.insert(key.to_string(), Value::String(value));
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: Vec<u8>) -> KVResult<bool> {
        let mut inner = self.inner.write().await;
        if inner.data.contains_key(key) {
            return Ok(false);
        }
        inner.data.insert(key.to_string(), Value::String(value));
        Ok(true)
    }

    async fn delete(&self, key: &str) -> KVResult<bool> {
        let mut inner = self.inner.write().await;
        Ok(inner.data.remove(key).is_some())
    }

    async fn delete_if_value(&self, key: &str, expected: &[u8]) -> KVResult<bool> {
        let mut inner = self.inner.write().await;
        let matches = matches!(inner.data.get(key), Some(Value::String(v)) if v.as_slice() == expected);
        if matches {
            inner.data.remove(key);
        }
        Ok(matches)
    }

    async fn exists(&self, key: &str) -> KVResult<bool> {
        let inner = self.inner.read().await;
        Ok(inner.data.contains_key(key))
    }

    async fn hset(&self, key: &str, field: &str, value: Vec<u8>) -> KVResult<()> {
        let mut inner = self.inner.write().await;
        let entry = inner
            .data
            .entry(key.to_string())
            .or_insert_with(|| Value::Hash(HashMap::new()));
        match entry {
            Value::Hash(fields) => {
                fields.insert(field.to_string(), value);
                Ok(())
            }
            Value::String(_) => Err(Self::wrong_type(key)),
        }
    }

    async fn hget(&self, key: &str, field: &str) -> KVResult<Option<Vec<u8>>> {
        let inner = self.inner.read().await;
        match inner.data.get(key) {
            Some(Value::Hash(fields)) => Ok(fields.get(field).cloned()),
            Some(Value::String(_)) => Err(Self::wrong_type(key)),
            None => Ok(None),
        }
    }

    async fn hget_all(&self, key: &str) -> KVResult<HashMap<String, Vec<u8>>> {
        let inner = self.inner.read().await;
        match inner.data.get(key) {
            Some(Value::Hash(fields)) => Ok(fields.clone()),
            Some(Value::String(_)) => Err(Self::wrong_type(key)),
            None => Ok(HashMap::new()),
        }
    }

    async fn hdel(&self, key: &str, field: &str) -> KVResult<bool> {
        let mut inner = self.inner.write().await;
        let (removed, now_empty) = match inner.data.get_mut(key) {
            Some(Value::Hash(fields)) => {
                let removed = fields.remove(field).is_some();
                (removed, fields.is_empty())
            }
            Some(Value::String(_)) => return Err(Self::wrong_type(key)),
            None => return Ok(false),
        };
        if now_empty {
            inner.data.remove(key);
        }
        Ok(removed)
    }

    async fn hdel_if_value(&self, key: &str, field: &str, expected: &[u8]) -> KVResult<bool> {
        let mut inner = self.inner.write().await;
        let (removed, now_empty) = match inner.data.get_mut(key) {
            Some(Value::Hash(fields)) => {
                let matches = fields.get(field).is_some_and(|v| v.as_slice() == expected);
                if matches {
                    fields.remove(field);
                }
                (matches, fields.is_empty())
            }
            Some(Value::String(_)) => return Err(Self::wrong_type(key)),
            None => return Ok(false),
        };
        if now_empty {
            inner.data.remove(key);
        }
        Ok(removed)
    }

    async fn hlen(&self, key: &str) -> KVResult<usize> {
        let inner = self.inner.read().await;
        match inner.data.get(key) {
            Some(Value::Hash(fields)) => Ok(fields.len()),
            Some(Value::String(_)) => Err(Self::wrong_type(key)),
            None => Ok(0),
        }
    }

    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> KVResult<ScanPage> {
        let count = if count == 0 { DEFAULT_SCAN_COUNT } else { count };
        let mut inner = self.inner.write().await;

        let start = if cursor == 0 {
            Bound::Unbounded
        } else {
            let last = inner
                .cursors
                .remove(&cursor)
                .ok_or_else(|| KVError::InvalidKey(format!("unknown scan cursor {}", cursor)))?;
            Bound::Excluded(last)
        };

        let mut examined = inner.data.range((start, Bound::Unbounded)).map(|(k, _)| k);
        let mut keys = Vec::new();
        let mut last_examined = None;
        for key in examined.by_ref().take(count) {
            if glob_match(pattern, key) {
                keys.push(key.clone());
            }
            last_examined = Some(key.clone());
        }
        let more = examined.next().is_some();

        let next = match (more, last_examined) {
            (true, Some(last)) => inner.open_cursor(last),
            _ => 0,
        };
        Ok(ScanPage { cursor: next, keys })
    }
}
