// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Shahzad A. Bhatti <bhatti@plexobject.com>

//! Compensation worker integration tests.
//!
//! These tests verify:
//! - Targeted repair after a failed relation write or relation cleanup
//! - Repair of records found without a relation entry on contention
//! - Values that change before the re-check survive
//! - The full sweep removes orphans and is idempotent
//! - Transient store errors are retried on the background path

#[path = "support/flaky_store.rs"]
mod flaky_store;

use configcenter_keyvalue::{InMemoryKVStore, KeyValueStore};
use configcenter_locks::{
    default_policy, Lock, LockEngine, LockEngineConfig, LockNamespace, Notification, RepairReason,
    TxnLockManager,
};
use flaky_store::{wait_until_absent, FlakyStore};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(3);

fn test_config() -> LockEngineConfig {
    LockEngineConfig {
        repair_delay_ms: 50,
        ..Default::default()
    }
}

fn engine_over(store: Arc<dyn KeyValueStore>) -> LockEngine {
    LockEngine::with_config(store, test_config(), default_policy(), default_policy()).unwrap()
}

#[tokio::test]
async fn test_failed_relation_write_is_repaired() {
    let store = Arc::new(FlakyStore::new());
    let engine = engine_over(store.clone());
    let record_key = engine.keys().record_key(LockNamespace::Detail, "r");

    store.fail_hset.store(true, Ordering::SeqCst);
    let outcome = engine.lock(&Lock::new("t1", "r")).await.unwrap();
    assert!(outcome.locked);
    store.fail_hset.store(false, Ordering::SeqCst);

    assert!(wait_until_absent(store.as_ref(), &record_key, WAIT).await);
    assert!(engine.lock(&Lock::new("t2", "r")).await.unwrap().locked);
}

#[tokio::test]
async fn test_failed_relation_cleanup_is_repaired() {
    let store = Arc::new(FlakyStore::new());
    let engine = engine_over(store.clone());
    let relation_key = engine.keys().relation_key(LockNamespace::Pre, "t1");

    assert!(engine.pre_lock(&Lock::new("t1", "r")).await.unwrap());

    store.fail_hdel.store(true, Ordering::SeqCst);
    engine.pre_unlock(&Lock::new("t1", "r")).await.unwrap();
    store.fail_hdel.store(false, Ordering::SeqCst);

    // Record is gone at once; the dangling entry goes after the repair delay
    assert!(engine.get_lock(LockNamespace::Pre, "r").await.unwrap().is_none());
    assert!(wait_until_absent(store.as_ref(), &relation_key, WAIT).await);
}

#[tokio::test]
async fn test_contention_on_orphan_triggers_repair() {
    let store = Arc::new(InMemoryKVStore::new());
    let engine = engine_over(store.clone());
    let record_key = engine.keys().record_key(LockNamespace::Detail, "r");

    // A record whose writer crashed before indexing it
    let orphan = Lock::new("crashed", "r").with_sub_txn_id("s");
    store.put(&record_key, orphan.to_bytes().unwrap()).await.unwrap();

    let blocked = engine.lock(&Lock::new("t2", "r")).await.unwrap();
    assert!(!blocked.locked);
    assert_eq!(blocked.lock_sub_txn_id, "s");

    assert!(wait_until_absent(store.as_ref(), &record_key, WAIT).await);
    assert!(engine.lock(&Lock::new("t2", "r")).await.unwrap().locked);
}

#[tokio::test]
async fn test_contention_on_indexed_lock_leaves_it_alone() {
    let store = Arc::new(InMemoryKVStore::new());
    let engine = engine_over(store.clone());

    assert!(engine.lock(&Lock::new("t1", "r")).await.unwrap().locked);
    assert!(!engine.lock(&Lock::new("t2", "r")).await.unwrap().locked);

    tokio::time::sleep(Duration::from_millis(300)).await;
    let held = engine.get_lock(LockNamespace::Detail, "r").await.unwrap().unwrap();
    assert_eq!(held.txn_id, "t1");
}

#[tokio::test]
async fn test_changed_value_survives_targeted_repair() {
    let store = Arc::new(InMemoryKVStore::new());
    let engine = engine_over(store.clone());
    let keys = engine.keys().clone();
    let record_key = keys.record_key(LockNamespace::Detail, "r");

    let stale = Lock::new("t1", "r").with_sub_txn_id("a");
    let stale_bytes = stale.to_bytes().unwrap();
    store.put(&record_key, stale_bytes.clone()).await.unwrap();

    assert!(engine.notifier().notify(Notification::record(
        &keys,
        RepairReason::LockCollision,
        LockNamespace::Detail,
        &stale,
        stale_bytes,
    )));

    // Re-acquired before the worker re-checks
    let fresh = Lock::new("t2", "r").with_sub_txn_id("b");
    store.put(&record_key, fresh.to_bytes().unwrap()).await.unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    let held = engine.get_lock(LockNamespace::Detail, "r").await.unwrap().unwrap();
    assert_eq!(held, fresh);
}

#[tokio::test]
async fn test_sweep_removes_orphan_and_is_idempotent() {
    let store = Arc::new(InMemoryKVStore::new());
    let engine = engine_over(store.clone());
    let keys = engine.keys().clone();

    // One healthy lock, one orphan record, one stale entry
    assert!(engine.lock(&Lock::new("t1", "healthy")).await.unwrap().locked);
    store
        .put(
            &keys.record_key(LockNamespace::Pre, "orphan"),
            Lock::new("t9", "orphan").to_bytes().unwrap(),
        )
        .await
        .unwrap();
    store
        .hset(
            &keys.relation_key(LockNamespace::Detail, "t3"),
            "missing",
            Lock::new("t3", "missing").to_bytes().unwrap(),
        )
        .await
        .unwrap();

    let report = engine.run_sweep().await.unwrap();
    assert_eq!(report.removed_records, 1);
    assert_eq!(report.removed_entries, 1);
    assert_eq!(report.failed, 0);

    let again = engine.run_sweep().await.unwrap();
    assert_eq!(again.removed(), 0);
    assert_eq!(again.suspects, 0);

    let held = engine.get_lock(LockNamespace::Detail, "healthy").await.unwrap();
    assert!(held.is_some());
    assert_eq!(engine.held_locks(LockNamespace::Detail, "t1").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_sweep_retries_transient_errors() {
    let store = Arc::new(FlakyStore::new());
    let engine = engine_over(store.clone());
    let record_key = engine.keys().record_key(LockNamespace::Detail, "orphan");
    store
        .put(&record_key, Lock::new("t", "orphan").to_bytes().unwrap())
        .await
        .unwrap();

    store.fail_next_gets(2);
    let report = engine.run_sweep().await.unwrap();

    assert_eq!(report.removed_records, 1);
    assert!(store.get_calls() >= 3);
    assert!(!store.exists(&record_key).await.unwrap());
}

#[tokio::test]
async fn test_sweep_over_many_keys() {
    let store = Arc::new(InMemoryKVStore::new());
    let config = LockEngineConfig {
        repair_delay_ms: 10,
        scan_batch_size: 7,
        ..Default::default()
    };
    let engine =
        LockEngine::with_config(store.clone(), config, default_policy(), default_policy()).unwrap();

    for i in 0..40 {
        let name = format!("res-{}", i);
        if i % 2 == 0 {
            assert!(engine.lock(&Lock::new("t", name.as_str())).await.unwrap().locked);
        } else {
            store
                .put(
                    &engine.keys().record_key(LockNamespace::Detail, &name),
                    Lock::new("lost", name.as_str()).to_bytes().unwrap(),
                )
                .await
                .unwrap();
        }
    }

    let report = engine.run_sweep().await.unwrap();
    assert_eq!(report.scanned_records, 40);
    assert_eq!(report.removed_records, 20);
    assert_eq!(engine.held_locks(LockNamespace::Detail, "t").await.unwrap().len(), 20);
}
