// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Shahzad A. Bhatti <bhatti@plexobject.com>

//! End-to-end lock coordination tests.
//!
//! Several engines share one store, the way separate service processes share
//! one Redis. These tests verify:
//! - Exclusion holds across engine instances
//! - Any instance's worker repairs state left by another
//! - Key prefixes isolate deployments
//! - Engines and stores build from environment configuration

use configcenter::keyvalue::config::ENV_BACKEND;
use configcenter::locks::config::{ENV_PREFIX, ENV_REPAIR_DELAY_MS};
use configcenter::{
    create_keyvalue_from_env, default_policy, InMemoryKVStore, KeyValueStore, Lock, LockEngine,
    LockEngineConfig, LockNamespace, TxnLockManager,
};
use serial_test::serial;
use std::sync::Arc;
use std::time::Duration;

fn engine_over(store: Arc<dyn KeyValueStore>, prefix: &str) -> LockEngine {
    let config = LockEngineConfig {
        key_prefix: prefix.to_string(),
        repair_delay_ms: 20,
        ..Default::default()
    };
    LockEngine::with_config(store, config, default_policy(), default_policy()).unwrap()
}

#[tokio::test]
async fn test_exclusion_across_instances() {
    let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryKVStore::new());
    let topology = engine_over(store.clone(), "cc");
    let task = engine_over(store.clone(), "cc");

    assert!(topology.lock(&Lock::new("deploy-7", "set:12")).await.unwrap().locked);
    assert!(!task.lock(&Lock::new("task-3", "set:12")).await.unwrap().locked);

    // The same transaction may continue on the other instance
    let joined = task.lock(&Lock::new("deploy-7", "set:12")).await.unwrap();
    assert!(joined.locked);

    task.unlock_all("deploy-7").await.unwrap();
    assert!(topology.lock(&Lock::new("task-3", "set:12")).await.unwrap().locked);
}

#[tokio::test]
async fn test_reserve_then_lock_workflow() {
    let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryKVStore::new());
    let engine = engine_over(store.clone(), "cc");
    let hosts = ["host:1", "host:2", "host:3"];

    for host in hosts {
        assert!(engine.pre_lock(&Lock::new("txn-a", host)).await.unwrap());
    }
    // A competing transaction cannot reserve any of them
    for host in hosts {
        assert!(!engine.pre_lock(&Lock::new("txn-b", host)).await.unwrap());
    }
    for host in hosts {
        assert!(engine.lock(&Lock::new("txn-a", host)).await.unwrap().locked);
    }

    assert_eq!(engine.held_locks(LockNamespace::Pre, "txn-a").await.unwrap().len(), 3);
    assert_eq!(engine.held_locks(LockNamespace::Detail, "txn-a").await.unwrap().len(), 3);

    engine.unlock_all("txn-a").await.unwrap();

    for host in hosts {
        assert!(engine.pre_lock(&Lock::new("txn-b", host)).await.unwrap());
        assert!(engine.lock(&Lock::new("txn-b", host)).await.unwrap().locked);
    }
}

#[tokio::test]
async fn test_other_instance_repairs_orphan() {
    let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryKVStore::new());
    let survivor = engine_over(store.clone(), "cc");

    // An instance crashed between writing the record and indexing it
    let record_key = survivor.keys().record_key(LockNamespace::Detail, "object:9");
    store
        .put(&record_key, Lock::new("crashed", "object:9").to_bytes().unwrap())
        .await
        .unwrap();

    let report = survivor.run_sweep().await.unwrap();
    assert_eq!(report.removed_records, 1);
    assert!(survivor.lock(&Lock::new("fresh", "object:9")).await.unwrap().locked);

    tokio::time::sleep(Duration::from_millis(100)).await;
    let held = survivor
        .get_lock(LockNamespace::Detail, "object:9")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(held.txn_id, "fresh");
}

#[tokio::test]
async fn test_prefixes_isolate_deployments() {
    let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryKVStore::new());
    let staging = engine_over(store.clone(), "staging");
    let prod = engine_over(store.clone(), "prod");

    assert!(staging.lock(&Lock::new("t1", "r")).await.unwrap().locked);
    assert!(prod.lock(&Lock::new("t2", "r")).await.unwrap().locked);

    // A sweep under one prefix never touches the other
    let report = prod.run_sweep().await.unwrap();
    assert_eq!(report.scanned_records, 1);
    assert_eq!(report.removed(), 0);
    assert!(staging.get_lock(LockNamespace::Detail, "r").await.unwrap().is_some());
}

#[tokio::test]
#[serial]
async fn test_engine_from_environment() {
    std::env::set_var(ENV_BACKEND, "in-memory");
    std::env::set_var(ENV_PREFIX, "envtest");
    std::env::set_var(ENV_REPAIR_DELAY_MS, "10");
    let config = LockEngineConfig::from_env();
    let store = create_keyvalue_from_env().await;
    std::env::remove_var(ENV_BACKEND);
    std::env::remove_var(ENV_PREFIX);
    std::env::remove_var(ENV_REPAIR_DELAY_MS);

    let config = config.unwrap();
    assert_eq!(config.key_prefix, "envtest");
    let store = store.unwrap();

    let engine =
        LockEngine::with_config(store.clone(), config, default_policy(), default_policy()).unwrap();
    assert!(engine.lock(&Lock::new("t", "r")).await.unwrap().locked);
    assert!(store.exists("envtest:lock:detail:name:r").await.unwrap());
}
