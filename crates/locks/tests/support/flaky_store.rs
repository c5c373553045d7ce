// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Shahzad A. Bhatti <bhatti@plexobject.com>

//! Failure-injecting KeyValueStore for lock engine tests.

#![allow(dead_code)]

use async_trait::async_trait;
use configcenter_keyvalue::{InMemoryKVStore, KVError, KVResult, KeyValueStore, ScanPage};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// In-memory store whose individual operations can be made to fail.
#[derive(Default)]
pub struct FlakyStore {
    inner: InMemoryKVStore,
    /// Every `hset` fails
    pub fail_hset: AtomicBool,
    /// Every `hdel` and `hdel_if_value` fails
    pub fail_hdel: AtomicBool,
    /// Every `set_if_absent` fails
    pub fail_set_if_absent: AtomicBool,
    transient_gets: AtomicUsize,
    gets: AtomicUsize,
    interleaved: Mutex<Option<Interleaved>>,
}

/// Writes applied right after the next successful `delete_if_value`, as a
/// concurrent acquisition landing between the two steps of a release would.
struct Interleaved {
    record_key: String,
    relation_key: String,
    field: String,
    value: Vec<u8>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `n` calls to `get` fail with a transient error.
    pub fn fail_next_gets(&self, n: usize) {
        self.transient_gets.store(n, Ordering::SeqCst);
    }

    /// After the next successful `delete_if_value`, create `record_key` and
    /// the `relation_key`/`field` entry with `value`.
    pub fn acquire_after_next_release(
        &self,
        record_key: &str,
        relation_key: &str,
        field: &str,
        value: Vec<u8>,
    ) {
        if let Ok(mut slot) = self.interleaved.lock() {
            *slot = Some(Interleaved {
                record_key: record_key.to_string(),
                relation_key: relation_key.to_string(),
                field: field.to_string(),
                value,
            });
        }
    }

    /// Number of `get` calls seen, failed ones included.
    pub fn get_calls(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    fn injected(op: &str) -> KVError {
        KVError::BackendError(format!("injected {} failure", op))
    }
}

#[async_trait]
impl KeyValueStore for FlakyStore {
    async fn get(&self, key: &str) -> KVResult<Option<Vec<u8>>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .transient_gets
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(Self::injected("GET"));
        }
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> KVResult<()> {
        self.inner.put(key, value).await
    }

    async fn set_if_absent(&self, key: &str, value: Vec<u8>) -> KVResult<bool> {
        if self.fail_set_if_absent.load(Ordering::SeqCst) {
            return Err(Self::injected("SETNX"));
        }
        self.inner.set_if_absent(key, value).await
    }

    async fn delete(&self, key: &str) -> KVResult<bool> {
        self.inner.delete(key).await
    }

    async fn delete_if_value(&self, key: &str, expected: &[u8]) -> KVResult<bool> {
        let removed = self.inner.delete_if_value(key, expected).await?;
        if removed {
            let pending = self.interleaved.lock().ok().and_then(|mut slot| slot.take());
            if let Some(w) = pending {
                self.inner.set_if_absent(&w.record_key, w.value.clone()).await?;
                self.inner.hset(&w.relation_key, &w.field, w.value).await?;
            }
        }
        Ok(removed)
    }

    async fn exists(&self, key: &str) -> KVResult<bool> {
        self.inner.exists(key).await
    }

    async fn hset(&self, key: &str, field: &str, value: Vec<u8>) -> KVResult<()> {
        if self.fail_hset.load(Ordering::SeqCst) {
            return Err(Self::injected("HSET"));
        }
        self.inner.hset(key, field, value).await
    }

    async fn hget(&self, key: &str, field: &str) -> KVResult<Option<Vec<u8>>> {
        self.inner.hget(key, field).await
    }

    async fn hget_all(&self, key: &str) -> KVResult<HashMap<String, Vec<u8>>> {
        self.inner.hget_all(key).await
    }

    async fn hdel(&self, key: &str, field: &str) -> KVResult<bool> {
        if self.fail_hdel.load(Ordering::SeqCst) {
            return Err(Self::injected("HDEL"));
        }
        self.inner.hdel(key, field).await
    }

    async fn hdel_if_value(&self, key: &str, field: &str, expected: &[u8]) -> KVResult<bool> {
        if self.fail_hdel.load(Ordering::SeqCst) {
            return Err(Self::injected("HDEL"));
        }
        self.inner.hdel_if_value(key, field, expected).await
    }

    async fn hlen(&self, key: &str) -> KVResult<usize> {
        self.inner.hlen(key).await
    }

    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> KVResult<ScanPage> {
        self.inner.scan(cursor, pattern, count).await
    }
}

/// Wait until `key` is gone, polling every 20ms. False on timeout.
pub async fn wait_until_absent(store: &dyn KeyValueStore, key: &str, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if !store.exists(key).await.unwrap_or(true) {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
