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

//! Redis-based KeyValueStore implementation
//!
//! ## Purpose
//! The production backend: one Redis shared by every service instance that
//! coordinates through the lock engine.
//!
//! ## Command Mapping
//! | Trait method | Redis |
//! |---|---|
//! | `set_if_absent` | `SET key value NX` |
//! | `delete_if_value` | Lua: `GET` + `DEL` |
//! | `hset` / `hget` / `hget_all` / `hdel` / `hlen` | `HSET` / `HGET` / `HGETALL` / `HDEL` / `HLEN` |
//! | `hdel_if_value` | Lua: `HGET` + `HDEL` |
//! | `scan` | `SCAN cursor MATCH pattern COUNT n` |
//!
//! ## Usage
//! ```rust,no_run
//! use configcenter_keyvalue::{KeyValueStore, RedisKVStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = RedisKVStore::new("redis://localhost:6379").await?;
//! store.put("key", b"value".to_vec()).await?;
//! let value = store.get("key").await?;
//! assert_eq!(value, Some(b"value".to_vec()));
//! # Ok(())
//! # }
//! ```

use crate::{KVError, KVResult, KeyValueStore, ScanPage};
use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client, Script};
use std::collections::HashMap;
use tracing::debug;

const DELETE_IF_VALUE_LUA: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
"#;

const HDEL_IF_VALUE_LUA: &str = r#"
if redis.call('HGET', KEYS[1], ARGV[1]) == ARGV[2] then
    return redis.call('HDEL', KEYS[1], ARGV[1])
end
return 0
"#;

/// Redis-based KeyValueStore implementation
///
/// ## Architecture
/// - Uses `redis` crate with async ConnectionManager
/// - Connection pooling via ConnectionManager (automatic reconnection)
/// - Compare-and-delete via cached Lua scripts (`EVALSHA`, falling back to `EVAL`)
///
/// ## Design Decisions
/// - **No key namespace of its own**: callers already prefix every key (the
///   lock engine's key prefix), so the store passes keys through unchanged and
///   scan results need no rewriting.
#[derive(Clone)]
pub struct RedisKVStore {
    /// Redis connection manager (async, pooled)
    manager: ConnectionManager,
    delete_if_value: Script,
    hdel_if_value: Script,
}

impl RedisKVStore {
    /// Create a new Redis-backed KeyValueStore
    ///
    /// ## Arguments
    /// * `url` - Redis connection URL (e.g., "redis://localhost:6379")
    ///
    /// ## Errors
    /// - [`KVError::BackendError`]: If the Redis connection fails
    pub async fn new(url: &str) -> KVResult<Self> {
        let client = Client::open(url)?;
        let manager = ConnectionManager::new(client).await?;
        debug!("Connected to Redis KeyValue store");

        Ok(Self {
            manager,
            delete_if_value: Script::new(DELETE_IF_VALUE_LUA),
            hdel_if_value: Script::new(HDEL_IF_VALUE_LUA),
        })
    }

    fn backend(op: &str, e: redis::RedisError) -> KVError {
        if e.code() == Some("WRONGTYPE") {
            KVError::WrongType(format!("Redis {} failed: {}", op, e))
        } else {
            KVError::BackendError(format!("Redis {} failed: {}", op, e))
        }
    }
}

#[async_trait]
impl KeyValueStore for RedisKVStore {
    async fn get(&self, key: &str) -> KVResult<Option<Vec<u8>>> {
        let mut conn = self.manager.clone();
        conn.get(key).await.map_err(|e| Self::backend("GET", e))
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> KVResult<()> {
        let mut conn = self.manager.clone();
        conn.set::<_, _, ()>(key, value)
            .await
            .map_err(|e| Self::backend("SET", e))
    }

    async fn set_if_absent(&self, key: &str, value: Vec<u8>) -> KVResult<bool> {
        let mut conn = self.manager.clone();
        conn.set_nx(key, value)
            .await
            .map_err(|e| Self::backend("SETNX", e))
    }

    async fn delete(&self, key: &str) -> KVResult<bool> {
        let mut conn = self.manager.clone();
        let removed: i64 = conn.del(key).await.map_err(|e| Self::backend("DEL", e))?;
        Ok(removed > 0)
    }

    async fn delete_if_value(&self, key: &str, expected: &[u8]) -> KVResult<bool> {
        let mut conn = self.manager.clone();
        let removed: i64 = self
            .delete_if_value
            .key(key)
            .arg(expected)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| Self::backend("EVAL(delete_if_value)", e))?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> KVResult<bool> {
        let mut conn = self.manager.clone();
        conn.exists(key).await.map_err(|e| Self::backend("EXISTS", e))
    }

    async fn hset(&self, key: &str, field: &str, value: Vec<u8>) -> KVResult<()> {
        let mut conn = self.manager.clone();
        conn.hset::<_, _, _, ()>(key, field, value)
            .await
            .map_err(|e| Self::backend("HSET", e))
    }

    async fn hget(&self, key: &str, field: &str) -> KVResult<Option<Vec<u8>>> {
        let mut conn = self.manager.clone();
        conn.hget(key, field).await.map_err(|e| Self::backend("HGET", e))
    }

    async fn hget_all(&self, key: &str) -> KVResult<HashMap<String, Vec<u8>>> {
        let mut conn = self.manager.clone();
        conn.hgetall(key).await.map_err(|e| Self::backend("HGETALL", e))
    }

    async fn hdel(&self, key: &str, field: &str) -> KVResult<bool> {
        let mut conn = self.manager.clone();
        let removed: i64 = conn.hdel(key, field).await.map_err(|e| Self::backend("HDEL", e))?;
        Ok(removed > 0)
    }

    async fn hdel_if_value(&self, key: &str, field: &str, expected: &[u8]) -> KVResult<bool> {
        let mut conn = self.manager.clone();
        let removed: i64 = self
            .hdel_if_value
            .key(key)
            .arg(field)
            .arg(expected)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| Self::backend("EVAL(hdel_if_value)", e))?;
        Ok(removed > 0)
    }

    async fn hlen(&self, key: &str) -> KVResult<usize> {
        let mut conn = self.manager.clone();
        conn.hlen(key).await.map_err(|e| Self::backend("HLEN", e))
    }

    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> KVResult<ScanPage> {
        let mut conn = self.manager.clone();
        let (cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(count.max(1))
            .query_async(&mut conn)
            .await
            .map_err(|e| Self::backend("SCAN", e))?;
        Ok(ScanPage { cursor, keys })
    }
}

// ============================================================================
// TESTS (require a running Redis instance)
// ============================================================================
