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

//! KeyValue-backed lock engine.
//!
//! ## Storage
//! Acquisition is `SET NX` on the resource's lock record followed by `HSET`
//! of the relation entry under the owner's transaction. Release is a
//! compare-and-delete of the record followed by `HDEL` of the entry. The
//! second step of either pair may fail; the engine then hands the leftover
//! to the compensation worker instead of failing the call.

use crate::compensation::{
    notification_channel, spawn_repair_consumer, spawn_sweeper, CompensationNotifier, Compensator,
    Notification, RepairReason, SweepReport,
};
use crate::policy::SharedPolicy;
use crate::types::new_sub_txn_id;
use crate::{
    KeyScheme, Lock, LockEngineConfig, LockError, LockNamespace, LockOutcome, LockResult,
    TxnLockManager,
};
use async_trait::async_trait;
use chrono::Utc;
use configcenter_keyvalue::KeyValueStore;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

/// Rounds of set-if-absent / read when the record disappears in between.
const ACQUIRE_ATTEMPTS: usize = 3;
/// Rounds of read / compare-and-delete when the record changes in between.
const RELEASE_ATTEMPTS: usize = 3;

/// Lock engine over a shared [`KeyValueStore`].
///
/// Construction starts the compensation worker (notification consumer and
/// periodic sweeper) on the current Tokio runtime. Both tasks stop when the
/// engine is dropped.
pub struct LockEngine {
    store: Arc<dyn KeyValueStore>,
    keys: KeyScheme,
    config: LockEngineConfig,
    lock_policy: SharedPolicy,
    pre_lock_policy: SharedPolicy,
    notifier: CompensationNotifier,
    compensator: Compensator,
    workers: Vec<JoinHandle<()>>,
}

impl LockEngine {
    /// Create an engine with default worker tuning.
    ///
    /// ## Arguments
    /// * `key_prefix` - prefix of every key the engine touches (e.g. "cc")
    /// * `retry_count` - attempts per store call on the compensation path
    /// * `sweep_interval_secs` - period of the full sweep
    /// * `lock_policy` / `pre_lock_policy` - ownership policies for full and pre locks
    ///
    /// ## Errors
    /// - [`LockError::ConfigError`]: invalid settings, or no Tokio runtime
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        key_prefix: impl Into<String>,
        retry_count: u32,
        sweep_interval_secs: u64,
        lock_policy: SharedPolicy,
        pre_lock_policy: SharedPolicy,
    ) -> LockResult<Self> {
        let config = LockEngineConfig {
            key_prefix: key_prefix.into(),
            retry_count,
            sweep_interval_secs,
            ..Default::default()
        };
        Self::with_config(store, config, lock_policy, pre_lock_policy)
    }

    /// Create an engine from a full configuration.
    pub fn with_config(
        store: Arc<dyn KeyValueStore>,
        config: LockEngineConfig,
        lock_policy: SharedPolicy,
        pre_lock_policy: SharedPolicy,
    ) -> LockResult<Self> {
        config.validate()?;
        tokio::runtime::Handle::try_current().map_err(|_| {
            LockError::ConfigError("LockEngine must be created inside a Tokio runtime".to_string())
        })?;

        let keys = KeyScheme::new(config.key_prefix.clone());
        let compensator = Compensator::new(store.clone(), &config);
        let (notifier, rx) = notification_channel(config.notify_queue_capacity);
        let workers = vec![
            spawn_repair_consumer(compensator.clone(), rx),
            spawn_sweeper(compensator.clone(), config.sweep_interval()),
        ];

        debug!(
            prefix = %config.key_prefix,
            sweep_interval_secs = config.sweep_interval_secs,
            "Lock engine started"
        );

        Ok(Self {
            store,
            keys,
            config,
            lock_policy,
            pre_lock_policy,
            notifier,
            compensator,
            workers,
        })
    }

    /// Key scheme in use.
    pub fn keys(&self) -> &KeyScheme {
        &self.keys
    }

    /// Effective configuration.
    pub fn config(&self) -> &LockEngineConfig {
        &self.config
    }

    /// Handle for queueing targeted repairs.
    pub fn notifier(&self) -> CompensationNotifier {
        self.notifier.clone()
    }

    /// Run one full sweep now, outside the periodic schedule.
    pub async fn run_sweep(&self) -> LockResult<SweepReport> {
        self.compensator.sweep().await
    }

    /// Stored record for `lock_name`, if any.
    pub async fn get_lock(&self, namespace: LockNamespace, lock_name: &str) -> LockResult<Option<Lock>> {
        let key = self.keys.record_key(namespace, lock_name);
        match self.store.get(&key).await? {
            Some(raw) => Ok(Some(Lock::from_bytes(&raw)?)),
            None => Ok(None),
        }
    }

    /// Relation entries indexed under `txn_id`, ordered by lock name.
    pub async fn held_locks(&self, namespace: LockNamespace, txn_id: &str) -> LockResult<Vec<Lock>> {
        let key = self.keys.relation_key(namespace, txn_id);
        let mut locks = self
            .store
            .hget_all(&key)
            .await?
            .into_iter()
            .map(|(field, raw)| {
                let mut lock = Lock::from_bytes(&raw)?;
                lock.lock_name = field;
                Ok(lock)
            })
            .collect::<LockResult<Vec<_>>>()?;
        locks.sort_by(|a, b| a.lock_name.cmp(&b.lock_name));
        Ok(locks)
    }

    fn policy(&self, namespace: LockNamespace) -> &SharedPolicy {
        match namespace {
            LockNamespace::Pre => &self.pre_lock_policy,
            LockNamespace::Detail => &self.lock_policy,
        }
    }

    #[instrument(
        skip(self, request),
        fields(namespace = %namespace, txn_id = %request.txn_id, lock_name = %request.lock_name)
    )]
    async fn acquire(&self, namespace: LockNamespace, request: &Lock) -> LockResult<LockOutcome> {
        request.validate()?;
        let start_time = Instant::now();

        let mut lock = request.clone();
        if lock.sub_txn_id.is_empty() {
            lock.sub_txn_id = new_sub_txn_id();
        }
        if lock.create_time.is_none() {
            lock.create_time = Some(Utc::now());
        }
        let key = self.keys.record_key(namespace, &lock.lock_name);
        let value = lock.to_bytes()?;

        for attempt in 1..=ACQUIRE_ATTEMPTS {
            if self.store.set_if_absent(&key, value.clone()).await? {
                self.write_entry(namespace, &lock, &lock.txn_id, value).await;
                record_acquire(namespace, "acquired", start_time);
                let sub_txn_id = lock.sub_txn_id;
                return Ok(LockOutcome {
                    lock_sub_txn_id: sub_txn_id.clone(),
                    sub_txn_id,
                    locked: true,
                });
            }

            let Some(raw) = self.store.get(&key).await? else {
                debug!(attempt, "Lock record released during acquisition, retrying");
                continue;
            };
            let holder = match Lock::from_bytes(&raw) {
                Ok(holder) => holder,
                Err(e) => {
                    warn!(key = %key, error = %e, "Undecodable lock record blocks acquisition");
                    self.notifier.notify(Notification::record(
                        &self.keys,
                        RepairReason::LockCollision,
                        namespace,
                        &lock,
                        raw,
                    ));
                    record_acquire(namespace, "held", start_time);
                    return Ok(LockOutcome {
                        sub_txn_id: lock.sub_txn_id,
                        locked: false,
                        lock_sub_txn_id: String::new(),
                    });
                }
            };

            if self.policy(namespace).is_owner(&lock, &holder) {
                // Index the holder's record, not this call's, so the entry
                // keeps matching the record it describes.
                self.write_entry(namespace, &lock, &holder.txn_id, raw).await;
                record_acquire(namespace, "reentrant", start_time);
                return Ok(LockOutcome {
                    sub_txn_id: lock.sub_txn_id,
                    locked: true,
                    lock_sub_txn_id: holder.sub_txn_id,
                });
            }

            self.check_holder_entry(namespace, &lock, &holder, raw).await;
            record_acquire(namespace, "held", start_time);
            return Ok(LockOutcome {
                sub_txn_id: lock.sub_txn_id,
                locked: false,
                lock_sub_txn_id: holder.sub_txn_id,
            });
        }

        warn!(key = %key, "Lock record kept changing during acquisition");
        record_acquire(namespace, "contended", start_time);
        Ok(LockOutcome {
            sub_txn_id: lock.sub_txn_id,
            locked: false,
            lock_sub_txn_id: String::new(),
        })
    }

    /// Write the relation entry for `request.lock_name` under `owner_txn_id`.
    async fn write_entry(
        &self,
        namespace: LockNamespace,
        request: &Lock,
        owner_txn_id: &str,
        record: Vec<u8>,
    ) {
        let relation_key = self.keys.relation_key(namespace, owner_txn_id);
        if let Err(e) = self
            .store
            .hset(&relation_key, &request.lock_name, record.clone())
            .await
        {
            warn!(
                relation_key = %relation_key,
                error = %e,
                "Failed to write relation entry, leaving lock record to compensation"
            );
            metrics::counter!(
                "configcenter_locks_index_errors_total",
                "namespace" => namespace.as_str(),
                "op" => "write"
            )
            .increment(1);
            self.notifier.notify(Notification::record(
                &self.keys,
                RepairReason::LockIndexWriteFailed,
                namespace,
                request,
                record,
            ));
        }
    }

    /// Queue a repair if the holder's record is not indexed under its
    /// transaction. Read-only.
    async fn check_holder_entry(
        &self,
        namespace: LockNamespace,
        request: &Lock,
        holder: &Lock,
        raw: Vec<u8>,
    ) {
        let relation_key = self.keys.relation_key(namespace, &holder.txn_id);
        match self.store.hget(&relation_key, &request.lock_name).await {
            Ok(Some(entry)) if Lock::from_bytes(&entry).is_ok_and(|e| e.same_holder(holder)) => {}
            Ok(_) => {
                debug!(holder_txn_id = %holder.txn_id, "Held lock has no matching relation entry");
                self.notifier.notify(Notification::record(
                    &self.keys,
                    RepairReason::LockCollision,
                    namespace,
                    request,
                    raw,
                ));
            }
            Err(e) => debug!(error = %e, "Failed to read holder relation entry"),
        }
    }

    /// Release; reports [`LockError::LockNotFound`] when nothing is stored.
    #[instrument(
        skip(self, request),
        fields(namespace = %namespace, txn_id = %request.txn_id, lock_name = %request.lock_name)
    )]
    async fn release(&self, namespace: LockNamespace, request: &Lock) -> LockResult<()> {
        request.validate()?;
        let key = self.keys.record_key(namespace, &request.lock_name);

        for attempt in 1..=RELEASE_ATTEMPTS {
            let Some(raw) = self.store.get(&key).await? else {
                return Err(LockError::LockNotFound(request.lock_name.clone()));
            };
            let holder = Lock::from_bytes(&raw)?;
            if !self.policy(namespace).is_owner(request, &holder) {
                record_release(namespace, "denied");
                return Err(LockError::PermissionDenied(format!(
                    "{} is held by transaction {}",
                    request.lock_name, holder.txn_id
                )));
            }
            if !self.store.delete_if_value(&key, &raw).await? {
                debug!(attempt, "Lock record changed during release, retrying");
                continue;
            }
            self.remove_entry(namespace, request, &holder.txn_id, &raw).await;
            record_release(namespace, "released");
            return Ok(());
        }

        Err(LockError::Conflict(format!(
            "lock record for {} kept changing during release",
            request.lock_name
        )))
    }

    /// Remove the relation entry for `request.lock_name` under `owner_txn_id`,
    /// only while it still mirrors the released `record`. An entry written by
    /// a newer acquisition in the same transaction is left alone.
    async fn remove_entry(
        &self,
        namespace: LockNamespace,
        request: &Lock,
        owner_txn_id: &str,
        record: &[u8],
    ) {
        let relation_key = self.keys.relation_key(namespace, owner_txn_id);
        match self
            .store
            .hdel_if_value(&relation_key, &request.lock_name, record)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                debug!(relation_key = %relation_key, "Relation entry no longer matches released record");
                return;
            }
            Err(e) => {
                warn!(
                    relation_key = %relation_key,
                    error = %e,
                    "Failed to remove relation entry, leaving it to compensation"
                );
                metrics::counter!(
                    "configcenter_locks_index_errors_total",
                    "namespace" => namespace.as_str(),
                    "op" => "remove"
                )
                .increment(1);
                self.notifier.notify(Notification::relation_entry(
                    &self.keys,
                    namespace,
                    owner_txn_id,
                    &request.lock_name,
                ));
                return;
            }
        }

        // Stores that drop empty hashes make this a no-op. The delete itself
        // is left to the worker so it cannot race a concurrent HSET.
        let empty = match self.store.hlen(&relation_key).await {
            Ok(0) => self.store.exists(&relation_key).await.unwrap_or(true),
            Ok(_) => false,
            Err(_) => true,
        };
        if empty {
            self.notifier
                .notify(Notification::relation_index(&self.keys, namespace, owner_txn_id));
        }
    }
}

impl Drop for LockEngine {
    fn drop(&mut self) {
        for handle in &self.workers {
            handle.abort();
        }
    }
}

fn record_acquire(namespace: LockNamespace, result: &'static str, start_time: Instant) {
    metrics::histogram!(
        "configcenter_locks_acquire_duration_seconds",
        "namespace" => namespace.as_str()
    )
    .record(start_time.elapsed().as_secs_f64());
    metrics::counter!(
        "configcenter_locks_acquire_total",
        "namespace" => namespace.as_str(),
        "result" => result
    )
    .increment(1);
}

fn record_release(namespace: LockNamespace, result: &'static str) {
    metrics::counter!(
        "configcenter_locks_release_total",
        "namespace" => namespace.as_str(),
        "result" => result
    )
    .increment(1);
}

#[async_trait]
impl TxnLockManager for LockEngine {
    async fn pre_lock(&self, request: &Lock) -> LockResult<bool> {
        Ok(self.acquire(LockNamespace::Pre, request).await?.locked)
    }

    async fn pre_unlock(&self, request: &Lock) -> LockResult<()> {
        match self.release(LockNamespace::Pre, request).await {
            Err(LockError::LockNotFound(name)) => {
                debug!(lock_name = %name, "Pre-unlock of a resource that is not locked");
                Ok(())
            }
            other => other,
        }
    }

    async fn lock(&self, request: &Lock) -> LockResult<LockOutcome> {
        self.acquire(LockNamespace::Detail, request).await
    }

    async fn unlock(&self, request: &Lock) -> LockResult<()> {
        match self.release(LockNamespace::Detail, request).await {
            Err(LockError::LockNotFound(name)) => {
                debug!(lock_name = %name, "Unlock of a resource that is not locked");
                Ok(())
            }
            other => other,
        }
    }

    #[instrument(skip(self))]
    async fn unlock_all(&self, txn_id: &str) -> LockResult<()> {
        if txn_id.is_empty() {
            return Err(LockError::InvalidRequest("txn_id is empty".to_string()));
        }

        for namespace in LockNamespace::ALL {
            let relation_key = self.keys.relation_key(namespace, txn_id);
            let entries = self.store.hget_all(&relation_key).await?;

            for (field, raw) in entries {
                let mut request = match Lock::from_bytes(&raw) {
                    Ok(request) => request,
                    Err(e) => {
                        warn!(field = %field, error = %e, "Skipping undecodable relation entry");
                        continue;
                    }
                };
                request.lock_name = field;
                match self.release(namespace, &request).await {
                    Ok(()) => {}
                    Err(e) if e.is_not_found() || e.is_permission_denied() => {
                        debug!(lock_name = %request.lock_name, error = %e, "Skipping relation entry");
                    }
                    Err(e) => return Err(e),
                }
            }

            if let Err(e) = self.store.delete(&relation_key).await {
                warn!(relation_key = %relation_key, error = %e, "Failed to delete relation index");
            }
        }
        Ok(())
    }
}
