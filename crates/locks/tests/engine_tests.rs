// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Shahzad A. Bhatti <bhatti@plexobject.com>

//! Lock engine integration tests.
//!
//! These tests verify:
//! - Mutual exclusion between transactions, including concurrent callers
//! - Re-entrant acquisition and sub-transaction ids
//! - Release permissions and round trips
//! - Bulk release across both namespaces
//! - Custom ownership policies
//! - Store errors on the critical path

#[path = "support/flaky_store.rs"]
mod flaky_store;

use configcenter_keyvalue::{InMemoryKVStore, KeyValueStore};
use configcenter_locks::{
    default_policy, Lock, LockEngine, LockEngineConfig, LockError, LockNamespace, SharedPolicy,
    TxnLockManager,
};
use flaky_store::FlakyStore;
use std::sync::atomic::Ordering;
use std::sync::Arc;

fn test_config() -> LockEngineConfig {
    LockEngineConfig {
        repair_delay_ms: 50,
        ..Default::default()
    }
}

fn create_engine() -> (Arc<InMemoryKVStore>, LockEngine) {
    let store = Arc::new(InMemoryKVStore::new());
    let engine =
        LockEngine::with_config(store.clone(), test_config(), default_policy(), default_policy())
            .unwrap();
    (store, engine)
}

#[tokio::test]
async fn test_lock_excludes_other_transactions() {
    let (_, engine) = create_engine();

    let first = engine.lock(&Lock::new("t1", "host:1")).await.unwrap();
    assert!(first.locked);

    let second = engine.lock(&Lock::new("t2", "host:1")).await.unwrap();
    assert!(!second.locked);
    assert_eq!(second.lock_sub_txn_id, first.sub_txn_id);

    // Different resource is unaffected
    assert!(engine.lock(&Lock::new("t2", "host:2")).await.unwrap().locked);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_lock_has_single_winner() {
    let (_, engine) = create_engine();
    let engine = Arc::new(engine);

    let mut handles = Vec::new();
    for i in 0..16 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine
                .lock(&Lock::new(format!("txn-{}", i), "contended"))
                .await
                .unwrap()
                .locked
        }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}

#[tokio::test]
async fn test_reentrant_lock_reports_original_sub_txn_id() {
    let (_, engine) = create_engine();

    let first = engine.lock(&Lock::new("t", "r")).await.unwrap();
    assert!(first.locked);
    assert!(first.is_owner());

    for _ in 0..3 {
        let again = engine.lock(&Lock::new("t", "r")).await.unwrap();
        assert!(again.locked);
        assert!(!again.is_owner());
        assert_eq!(again.lock_sub_txn_id, first.sub_txn_id);
        assert_ne!(again.sub_txn_id, first.sub_txn_id);
    }
}

#[tokio::test]
async fn test_lock_unlock_round_trip() {
    let (store, engine) = create_engine();

    assert!(engine.lock(&Lock::new("t1", "r")).await.unwrap().locked);
    engine.unlock(&Lock::new("t1", "r")).await.unwrap();
    assert!(store.is_empty().await);

    assert!(engine.lock(&Lock::new("t2", "r")).await.unwrap().locked);
}

#[tokio::test]
async fn test_unlock_by_other_transaction_is_denied() {
    let (_, engine) = create_engine();
    engine.lock(&Lock::new("t1", "r")).await.unwrap();

    let err = engine.unlock(&Lock::new("t2", "r")).await.unwrap_err();
    assert!(err.is_permission_denied());
    assert!(matches!(err, LockError::PermissionDenied(_)));

    // Nothing changed
    let held = engine.get_lock(LockNamespace::Detail, "r").await.unwrap().unwrap();
    assert_eq!(held.txn_id, "t1");

    engine.unlock(&Lock::new("t1", "r")).await.unwrap();
    assert!(engine.get_lock(LockNamespace::Detail, "r").await.unwrap().is_none());
}

#[tokio::test]
async fn test_pre_lock_namespace_is_separate() {
    let (_, engine) = create_engine();

    assert!(engine.pre_lock(&Lock::new("t1", "r")).await.unwrap());
    assert!(!engine.pre_lock(&Lock::new("t2", "r")).await.unwrap());
    assert!(engine.pre_lock(&Lock::new("t1", "r")).await.unwrap());

    // Full lock on the same name by another transaction is independent
    assert!(engine.lock(&Lock::new("t2", "r")).await.unwrap().locked);

    let err = engine.pre_unlock(&Lock::new("t2", "r")).await.unwrap_err();
    assert!(err.is_permission_denied());
    engine.pre_unlock(&Lock::new("t1", "r")).await.unwrap();
    assert!(engine.pre_lock(&Lock::new("t2", "r")).await.unwrap());
}

#[tokio::test]
async fn test_unlock_all_frees_both_namespaces() {
    let (store, engine) = create_engine();

    assert!(engine.lock(&Lock::new("t1", "r")).await.unwrap().locked);
    assert!(engine.pre_lock(&Lock::new("t1", "r")).await.unwrap());
    assert!(engine.lock(&Lock::new("t1", "s")).await.unwrap().locked);

    engine.unlock_all("t1").await.unwrap();
    assert!(store.is_empty().await);

    assert!(engine.lock(&Lock::new("t2", "r")).await.unwrap().locked);
    assert!(engine.pre_lock(&Lock::new("t2", "r")).await.unwrap());
    assert!(engine.lock(&Lock::new("t2", "s")).await.unwrap().locked);
}

#[tokio::test]
async fn test_unlock_all_skips_entries_owned_elsewhere() {
    let (store, engine) = create_engine();

    // t1's index still names "r" but t2 now holds it
    let stale = Lock::new("t1", "r").with_sub_txn_id("old");
    store
        .hset(
            &engine.keys().relation_key(LockNamespace::Detail, "t1"),
            "r",
            stale.to_bytes().unwrap(),
        )
        .await
        .unwrap();
    assert!(engine.lock(&Lock::new("t2", "r")).await.unwrap().locked);
    // ... and one entry points at nothing at all
    store
        .hset(
            &engine.keys().relation_key(LockNamespace::Detail, "t1"),
            "gone",
            Lock::new("t1", "gone").to_bytes().unwrap(),
        )
        .await
        .unwrap();

    engine.unlock_all("t1").await.unwrap();

    let held = engine.get_lock(LockNamespace::Detail, "r").await.unwrap().unwrap();
    assert_eq!(held.txn_id, "t2");
    assert!(!store
        .exists(&engine.keys().relation_key(LockNamespace::Detail, "t1"))
        .await
        .unwrap());
}

#[tokio::test]
async fn test_unlock_all_unknown_transaction_is_noop() {
    let (_, engine) = create_engine();
    engine.unlock_all("nobody").await.unwrap();
}

#[tokio::test]
async fn test_unlock_all_stops_on_store_error() {
    let store = Arc::new(FlakyStore::new());
    let engine =
        LockEngine::with_config(store.clone(), test_config(), default_policy(), default_policy())
            .unwrap();
    let relation_key = engine.keys().relation_key(LockNamespace::Detail, "t1");

    assert!(engine.lock(&Lock::new("t1", "r")).await.unwrap().locked);

    store.fail_next_gets(1);
    let err = engine.unlock_all("t1").await.unwrap_err();
    assert!(matches!(err, LockError::Store(_)));

    // Nothing released, index kept for the next attempt
    assert!(store.exists(&relation_key).await.unwrap());
    assert!(engine.get_lock(LockNamespace::Detail, "r").await.unwrap().is_some());

    engine.unlock_all("t1").await.unwrap();
    assert!(!store.exists(&relation_key).await.unwrap());
}

#[tokio::test]
async fn test_release_keeps_entry_of_concurrent_reacquire() {
    let store = Arc::new(FlakyStore::new());
    let engine =
        LockEngine::with_config(store.clone(), test_config(), default_policy(), default_policy())
            .unwrap();
    let keys = engine.keys().clone();

    assert!(engine
        .lock(&Lock::new("1", "x").with_sub_txn_id("s1"))
        .await
        .unwrap()
        .locked);

    // Another call of txn 1 takes "x" between the record delete and the
    // relation cleanup of this release
    let next = Lock::new("1", "x").with_sub_txn_id("s2");
    store.acquire_after_next_release(
        &keys.record_key(LockNamespace::Detail, "x"),
        &keys.relation_key(LockNamespace::Detail, "1"),
        "x",
        next.to_bytes().unwrap(),
    );
    engine
        .unlock(&Lock::new("1", "x").with_sub_txn_id("s1"))
        .await
        .unwrap();

    let held = engine.get_lock(LockNamespace::Detail, "x").await.unwrap().unwrap();
    assert_eq!(held.sub_txn_id, "s2");
    assert_eq!(engine.held_locks(LockNamespace::Detail, "1").await.unwrap().len(), 1);

    let report = engine.run_sweep().await.unwrap();
    assert_eq!(report.removed_records, 0);
    assert!(!engine.lock(&Lock::new("2", "x")).await.unwrap().locked);
}

#[tokio::test]
async fn test_scenario_two_transactions() {
    let (_, engine) = create_engine();

    let first = engine
        .lock(&Lock::new("1", "x").with_sub_txn_id("1"))
        .await
        .unwrap();
    assert!(first.locked);
    assert_eq!(first.sub_txn_id, "1");
    assert_eq!(first.lock_sub_txn_id, "1");

    let blocked = engine.lock(&Lock::new("2", "x")).await.unwrap();
    assert!(!blocked.locked);
    assert_eq!(blocked.lock_sub_txn_id, "1");

    engine.unlock(&Lock::new("1", "x")).await.unwrap();

    let second = engine.lock(&Lock::new("2", "x")).await.unwrap();
    assert!(second.locked);
}

#[tokio::test]
async fn test_timeout_is_stored_not_enforced() {
    let (_, engine) = create_engine();
    let request = Lock::new("t1", "r").with_timeout(std::time::Duration::from_millis(1));
    engine.lock(&request).await.unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    let held = engine.get_lock(LockNamespace::Detail, "r").await.unwrap().unwrap();
    assert_eq!(held.timeout, std::time::Duration::from_millis(1));
    assert!(!engine.lock(&Lock::new("t2", "r")).await.unwrap().locked);
}

#[tokio::test]
async fn test_custom_policy_per_namespace() {
    let store = Arc::new(InMemoryKVStore::new());
    let strict: SharedPolicy = Arc::new(|req: &Lock, stored: &Lock| req.same_holder(stored));
    let engine =
        LockEngine::with_config(store, test_config(), strict, default_policy()).unwrap();

    let first = engine
        .lock(&Lock::new("t", "r").with_sub_txn_id("a"))
        .await
        .unwrap();
    assert!(first.locked);

    // Same txn, other sub id: refused for full locks under the strict policy
    let other = engine
        .lock(&Lock::new("t", "r").with_sub_txn_id("b"))
        .await
        .unwrap();
    assert!(!other.locked);
    let err = engine
        .unlock(&Lock::new("t", "r").with_sub_txn_id("b"))
        .await
        .unwrap_err();
    assert!(err.is_permission_denied());

    // Pre-locks still use the transaction id policy
    assert!(engine.pre_lock(&Lock::new("t", "r").with_sub_txn_id("a")).await.unwrap());
    assert!(engine.pre_lock(&Lock::new("t", "r").with_sub_txn_id("b")).await.unwrap());

    engine
        .unlock(&Lock::new("t", "r").with_sub_txn_id("a"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_store_error_on_acquire_propagates() {
    let store = Arc::new(FlakyStore::new());
    let engine =
        LockEngine::with_config(store.clone(), test_config(), default_policy(), default_policy())
            .unwrap();

    store.fail_set_if_absent.store(true, Ordering::SeqCst);
    let err = engine.lock(&Lock::new("t1", "r")).await.unwrap_err();
    assert!(matches!(err, LockError::Store(_)));

    store.fail_set_if_absent.store(false, Ordering::SeqCst);
    assert!(engine.lock(&Lock::new("t1", "r")).await.unwrap().locked);
}

#[tokio::test]
async fn test_store_error_on_release_propagates() {
    let store = Arc::new(FlakyStore::new());
    let engine =
        LockEngine::with_config(store.clone(), test_config(), default_policy(), default_policy())
            .unwrap();
    engine.lock(&Lock::new("t1", "r")).await.unwrap();

    store.fail_next_gets(1);
    let err = engine.unlock(&Lock::new("t1", "r")).await.unwrap_err();
    assert!(matches!(err, LockError::Store(_)));

    engine.unlock(&Lock::new("t1", "r")).await.unwrap();
}
