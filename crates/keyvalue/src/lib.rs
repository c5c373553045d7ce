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

//! # ConfigCenter KeyValue Store
//!
//! ## Purpose
//! The shared key-value store boundary used by cross-service coordination in
//! ConfigCenter. Service instances never talk to each other directly to agree
//! on resource ownership; they all go through one shared store, and this crate
//! is the thin adapter over it.
//!
//! ## Architecture Context
//! - **Lock coordinator** (`configcenter-locks`): lock records are plain string
//!   keys created with [`KeyValueStore::set_if_absent`], relation indexes are
//!   hashes, and the compensation sweep walks both with [`KeyValueStore::scan`].
//! - **Operators** (`cclock` CLI): inspect and repair lock state.
//!
//! ## Design Decisions
//! - **Redis data model**: two value kinds (string, hash). A string operation
//!   against a hash key fails with [`KVError::WrongType`], as in Redis.
//! - **Single-key atomicity only**: the trait has no multi-key transaction;
//!   callers that touch two keys must tolerate a failure between the writes.
//! - **Empty hashes vanish**: removing the last field of a hash removes the key.
//! - **Cursor scans**: [`KeyValueStore::scan`] returns bounded batches so a
//!   sweep over a large key space never loads every key at once.
//!
//! ## Backend Support
//!
//! - **InMemory**: BTreeMap-based (always available, for tests and single-process use)
//! - **Redis**: Distributed, shared between service instances (feature: `redis-backend`)
//!
//! ## Examples
//!
//! ```rust
//! use configcenter_keyvalue::{InMemoryKVStore, KeyValueStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let kv = InMemoryKVStore::new();
//!
//! // Exclusive create
//! assert!(kv.set_if_absent("cc:lock:detail:name:host-1", b"owner".to_vec()).await?);
//! assert!(!kv.set_if_absent("cc:lock:detail:name:host-1", b"other".to_vec()).await?);
//!
//! // Hash bookkeeping
//! kv.hset("cc:lock:detail:id:txn-1", "host-1", b"owner".to_vec()).await?;
//! assert_eq!(kv.hlen("cc:lock:detail:id:txn-1").await?, 1);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};

pub mod config;
pub mod error;
pub mod memory;
pub mod pattern;

#[cfg(feature = "redis-backend")]
pub mod redis;

pub use config::{create_keyvalue_from_config, create_keyvalue_from_env, BackendType, KVConfig};
pub use error::{KVError, KVResult};
pub use memory::InMemoryKVStore;
pub use pattern::glob_match;

#[cfg(feature = "redis-backend")]
pub use redis::RedisKVStore;

/// One batch of a cursor-based key scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanPage {
    /// Cursor to pass to the next call; `0` means the scan is complete.
    pub cursor: u64,
    /// Keys in this batch. May repeat keys returned by an earlier batch.
    pub keys: Vec<String>,
}

/// KeyValue store trait defining the primitives the coordinator needs.
///
/// ## Operations Grouped by Purpose
///
/// ### String keys (lock records)
/// - `get()`, `put()`, `set_if_absent()`, `delete()`, `delete_if_value()`, `exists()`
///
/// ### Hash keys (relation indexes)
/// - `hset()`, `hget()`, `hget_all()`, `hdel()`, `hdel_if_value()`, `hlen()`
///
/// ### Key space
/// - `scan()`
///
/// ## Atomicity
/// Every method is atomic with respect to the single key it touches. Nothing
/// spans two keys.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    // =========================================================================
    // String keys
    // =========================================================================

    /// Get a string value.
    ///
    /// ## Returns
    /// - `Ok(Some(value))` if key exists
    /// - `Ok(None)` if key does not exist
    /// - `Err(KVError::WrongType)` if key holds a hash
    async fn get(&self, key: &str) -> KVResult<Option<Vec<u8>>>;

    /// Unconditionally store a string value, replacing any existing value.
    async fn put(&self, key: &str, value: Vec<u8>) -> KVResult<()>;

    /// Store a string value only if the key does not exist (Redis `SET NX`).
    ///
    /// ## Returns
    /// - `Ok(true)` if this call created the key
    /// - `Ok(false)` if the key already existed (of any type); nothing changed
    ///
    /// ## Examples
    /// ```rust
    /// # use configcenter_keyvalue::{KeyValueStore, InMemoryKVStore};
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let kv = InMemoryKVStore::new();
    /// assert!(kv.set_if_absent("lock:resource", b"node1".to_vec()).await?);
    /// assert!(!kv.set_if_absent("lock:resource", b"node2".to_vec()).await?);
    /// # Ok(())
    /// # }
    /// ```
    async fn set_if_absent(&self, key: &str, value: Vec<u8>) -> KVResult<bool>;

    /// Delete a key of any type.
    ///
    /// ## Returns
    /// `Ok(true)` if a key was removed, `Ok(false)` if it did not exist.
    async fn delete(&self, key: &str) -> KVResult<bool>;

    /// Delete a string key only if it still holds `expected`.
    ///
    /// ## Returns
    /// `Ok(true)` if the key held `expected` and was removed, `Ok(false)`
    /// otherwise (absent, changed, or not a string).
    async fn delete_if_value(&self, key: &str, expected: &[u8]) -> KVResult<bool>;

    /// Check if a key of any type exists.
    async fn exists(&self, key: &str) -> KVResult<bool>;

    // =========================================================================
    // Hash keys
    // =========================================================================

    /// Set one field of a hash, creating the hash if needed.
    async fn hset(&self, key: &str, field: &str, value: Vec<u8>) -> KVResult<()>;

    /// Get one field of a hash.
    async fn hget(&self, key: &str, field: &str) -> KVResult<Option<Vec<u8>>>;

    /// Get every field of a hash. Empty map if the key does not exist.
    async fn hget_all(&self, key: &str) -> KVResult<HashMap<String, Vec<u8>>>;

    /// Remove one field of a hash.
    ///
    /// ## Behavior
    /// - Removing the last field removes the hash key itself
    ///
    /// ## Returns
    /// `Ok(true)` if the field existed.
    async fn hdel(&self, key: &str, field: &str) -> KVResult<bool>;

    /// Remove one field of a hash only if it still holds `expected`.
    async fn hdel_if_value(&self, key: &str, field: &str, expected: &[u8]) -> KVResult<bool>;

    /// Number of fields in a hash (0 if the key does not exist).
    async fn hlen(&self, key: &str) -> KVResult<usize>;

    // =========================================================================
    // Key space
    // =========================================================================

    /// Scan keys matching a glob `pattern` in bounded batches.
    ///
    /// ## Arguments
    /// - `cursor`: `0` to start, then the cursor from the previous page
    /// - `pattern`: Redis glob (`*`, `?`, `[..]`, `\`)
    /// - `count`: batch size hint
    ///
    /// ## Guarantees
    /// Keys present for the whole scan are returned at least once. Keys
    /// created or removed during the scan may or may not be returned.
    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> KVResult<ScanPage>;
}

/// Drive [`KeyValueStore::scan`] to completion and return each matching key once.
///
/// ## Examples
/// ```rust
/// # use configcenter_keyvalue::{scan_all, KeyValueStore, InMemoryKVStore};
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let kv = InMemoryKVStore::new();
/// kv.put("cc:lock:pre:name:a", b"1".to_vec()).await?;
/// kv.put("cc:lock:pre:name:b", b"2".to_vec()).await?;
/// let keys = scan_all(&kv, "cc:lock:pre:name:*", 1).await?;
/// assert_eq!(keys.len(), 2);
/// # Ok(())
/// # }
/// ```
pub async fn scan_all<S>(store: &S, pattern: &str, count: usize) -> KVResult<Vec<String>>
where
    S: KeyValueStore + ?Sized,
{
    let mut seen = HashSet::new();
    let mut keys = Vec::new();
    let mut cursor = 0u64;
    loop {
        let page = store.scan(cursor, pattern, count).await?;
        for key in page.keys {
            if seen.insert(key.clone()) {
                keys.push(key);
            }
        }
        if page.cursor == 0 {
            break;
        }
        cursor = page.cursor;
    }
    Ok(keys)
}
