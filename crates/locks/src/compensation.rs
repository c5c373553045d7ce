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

//! Compensation worker: converges lock records and relation indexes.
//!
//! ## Purpose
//! Acquisition writes the lock record and then the relation entry; release
//! deletes them in the same order. Neither pair is atomic, so the store can
//! be left with an orphaned record, a stale relation entry, or an empty
//! relation hash. This module repairs all three.
//!
//! ## Repair Paths
//! - **Targeted**: the engine pushes a [`Notification`] onto a bounded queue.
//!   A single consumer waits until `repair_delay` has passed since the
//!   notification was queued, re-reads the target and removes it only if it
//!   still holds the captured value and is still inconsistent.
//! - **Sweep**: a timer task scans both namespaces in batches, collects
//!   suspects, waits `repair_delay` once, then re-verifies each suspect and
//!   removes it with a compare-and-delete.
//!
//! ## Consistency Rules
//! - A lock record is consistent when the owner's relation index holds an
//!   entry for the resource with the same `txn_id` and `sub_txn_id`.
//! - A relation entry is consistent when it belongs to the hash's
//!   transaction and the resource's current record has the same
//!   `txn_id` and `sub_txn_id`.
//! - A relation hash with no fields is removed.
//!
//! ## Failure Handling
//! Store calls are retried up to `retry_count` attempts with linear backoff
//! when the error is transient. Exhaustion is logged; the next sweep picks up
//! whatever is left.

use crate::{KeyScheme, Lock, LockEngineConfig, LockNamespace, LockResult};
use configcenter_keyvalue::{KVResult, KeyValueStore};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

const RETRY_BACKOFF: Duration = Duration::from_millis(50);

/// Why a notification was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepairReason {
    /// Lock record written, relation entry write failed
    LockIndexWriteFailed,
    /// Acquisition hit a record whose relation entry is missing or mismatched
    LockCollision,
    /// Lock record deleted, relation entry delete failed
    UnlockIndexCleanupFailed,
    /// Relation hash may be left without fields
    EmptyRelationIndex,
}

impl RepairReason {
    /// Metric / log label.
    pub fn as_str(&self) -> &'static str {
        match self {
            RepairReason::LockIndexWriteFailed => "lock_index_write_failed",
            RepairReason::LockCollision => "lock_collision",
            RepairReason::UnlockIndexCleanupFailed => "unlock_index_cleanup_failed",
            RepairReason::EmptyRelationIndex => "empty_relation_index",
        }
    }
}

/// Targeted repair job.
#[derive(Debug, Clone)]
pub struct Notification {
    /// Why the job was raised
    pub reason: RepairReason,
    /// Namespace of the target
    pub namespace: LockNamespace,
    /// Lock record key or relation hash key
    pub key: String,
    /// Relation field, when `key` is a relation hash
    pub field: Option<String>,
    /// Transaction involved
    pub txn_id: String,
    /// Resource involved
    pub lock_name: String,
    /// Value observed when the job was raised. Repair is skipped if the
    /// target no longer holds it.
    pub captured: Option<Vec<u8>>,
    enqueued_at: Instant,
}

impl Notification {
    /// Job targeting the lock record of `lock.lock_name`.
    pub fn record(
        keys: &KeyScheme,
        reason: RepairReason,
        namespace: LockNamespace,
        lock: &Lock,
        captured: Vec<u8>,
    ) -> Self {
        Self {
            reason,
            namespace,
            key: keys.record_key(namespace, &lock.lock_name),
            field: None,
            txn_id: lock.txn_id.clone(),
            lock_name: lock.lock_name.clone(),
            captured: Some(captured),
            enqueued_at: Instant::now(),
        }
    }

    /// Job targeting the relation entry of `lock_name` under `txn_id`.
    pub fn relation_entry(
        keys: &KeyScheme,
        namespace: LockNamespace,
        txn_id: &str,
        lock_name: &str,
    ) -> Self {
        Self {
            reason: RepairReason::UnlockIndexCleanupFailed,
            namespace,
            key: keys.relation_key(namespace, txn_id),
            field: Some(lock_name.to_string()),
            txn_id: txn_id.to_string(),
            lock_name: lock_name.to_string(),
            captured: None,
            enqueued_at: Instant::now(),
        }
    }

    /// Job targeting the relation hash of `txn_id`.
    pub fn relation_index(keys: &KeyScheme, namespace: LockNamespace, txn_id: &str) -> Self {
        Self {
            reason: RepairReason::EmptyRelationIndex,
            namespace,
            key: keys.relation_key(namespace, txn_id),
            field: None,
            txn_id: txn_id.to_string(),
            lock_name: String::new(),
            captured: None,
            enqueued_at: Instant::now(),
        }
    }

    /// When the job was created.
    pub fn enqueued_at(&self) -> Instant {
        self.enqueued_at
    }
}

/// Sending half of the notification queue. Never blocks.
#[derive(Debug, Clone)]
pub struct CompensationNotifier {
    tx: mpsc::Sender<Notification>,
}

impl CompensationNotifier {
    /// Queue a job. Returns false when it was dropped (queue full or worker gone).
    pub fn notify(&self, notification: Notification) -> bool {
        let reason = notification.reason.as_str();
        match self.tx.try_send(notification) {
            Ok(()) => {
                metrics::counter!(
                    "configcenter_locks_compensation_notifications_total",
                    "reason" => reason,
                    "result" => "enqueued"
                )
                .increment(1);
                true
            }
            Err(TrySendError::Full(dropped)) => {
                debug!(key = %dropped.key, reason, "Compensation queue full, dropping notification");
                metrics::counter!(
                    "configcenter_locks_compensation_notifications_total",
                    "reason" => reason,
                    "result" => "dropped"
                )
                .increment(1);
                false
            }
            Err(TrySendError::Closed(dropped)) => {
                debug!(key = %dropped.key, reason, "Compensation worker stopped, dropping notification");
                false
            }
        }
    }
}

/// Bounded notification queue.
pub(crate) fn notification_channel(
    capacity: usize,
) -> (CompensationNotifier, mpsc::Receiver<Notification>) {
    let (tx, rx) = mpsc::channel(capacity);
    (CompensationNotifier { tx }, rx)
}

/// Result of a single repair attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairOutcome {
    /// Target was inconsistent and has been removed
    Removed,
    /// Target no longer holds the observed value; left alone
    Changed,
    /// Target is consistent; left alone
    Consistent,
    /// Target no longer exists
    Missing,
}

impl RepairOutcome {
    /// Metric / log label.
    pub fn as_str(&self) -> &'static str {
        match self {
            RepairOutcome::Removed => "removed",
            RepairOutcome::Changed => "changed",
            RepairOutcome::Consistent => "consistent",
            RepairOutcome::Missing => "missing",
        }
    }
}

/// Counters of one sweep cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Lock record keys inspected
    pub scanned_records: usize,
    /// Relation hash keys inspected
    pub scanned_indexes: usize,
    /// Targets that looked inconsistent on the first pass
    pub suspects: usize,
    /// Orphaned lock records removed
    pub removed_records: usize,
    /// Stale relation entries removed
    pub removed_entries: usize,
    /// Empty relation hashes removed
    pub removed_indexes: usize,
    /// Suspects that changed or healed before removal
    pub skipped: usize,
    /// Suspects whose repair failed
    pub failed: usize,
}

impl SweepReport {
    /// Total keys and fields removed.
    pub fn removed(&self) -> usize {
        self.removed_records + self.removed_entries + self.removed_indexes
    }
}

enum Suspect {
    Record {
        namespace: LockNamespace,
        key: String,
        resource: String,
        value: Vec<u8>,
    },
    Entry {
        namespace: LockNamespace,
        key: String,
        txn_id: String,
        field: String,
        value: Vec<u8>,
    },
    EmptyIndex {
        key: String,
    },
}

impl Suspect {
    fn key(&self) -> &str {
        match self {
            Suspect::Record { key, .. } | Suspect::Entry { key, .. } | Suspect::EmptyIndex { key } => key,
        }
    }
}

/// Repair logic shared by the notification consumer and the sweeper.
#[derive(Clone)]
pub struct Compensator {
    store: Arc<dyn KeyValueStore>,
    keys: KeyScheme,
    retry_count: u32,
    repair_delay: Duration,
    scan_batch_size: usize,
}

impl Compensator {
    /// Compensator over `store` using the keys and timings of `config`.
    pub fn new(store: Arc<dyn KeyValueStore>, config: &LockEngineConfig) -> Self {
        Self {
            store,
            keys: KeyScheme::new(config.key_prefix.clone()),
            retry_count: config.retry_count,
            repair_delay: config.repair_delay(),
            scan_batch_size: config.scan_batch_size,
        }
    }

    /// Key scheme in use.
    pub fn keys(&self) -> &KeyScheme {
        &self.keys
    }

    /// Pause applied before a suspect is re-checked.
    pub fn repair_delay(&self) -> Duration {
        self.repair_delay
    }

    async fn retry<T, F, Fut>(&self, op: &'static str, mut call: F) -> LockResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = KVResult<T>>,
    {
        let attempts = self.retry_count.max(1);
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < attempts => {
                    warn!(op, attempt, error = %e, "Transient store error, retrying");
                    metrics::counter!(
                        "configcenter_locks_compensation_retries_total",
                        "op" => op
                    )
                    .increment(1);
                    sleep(RETRY_BACKOFF * attempt).await;
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Apply a targeted repair right away (no delay).
    #[instrument(skip(self, notification), fields(reason = notification.reason.as_str(), key = %notification.key))]
    pub async fn repair(&self, notification: &Notification) -> LockResult<RepairOutcome> {
        let captured = notification.captured.as_deref();
        let outcome = match notification.reason {
            RepairReason::LockIndexWriteFailed | RepairReason::LockCollision => {
                self.repair_record(
                    notification.namespace,
                    &notification.key,
                    &notification.lock_name,
                    captured,
                )
                .await?
            }
            RepairReason::UnlockIndexCleanupFailed => {
                let field = notification
                    .field
                    .as_deref()
                    .unwrap_or(&notification.lock_name);
                let outcome = self
                    .repair_entry(
                        notification.namespace,
                        &notification.key,
                        &notification.txn_id,
                        field,
                        captured,
                    )
                    .await?;
                self.remove_empty_index(&notification.key).await?;
                outcome
            }
            RepairReason::EmptyRelationIndex => self.remove_empty_index(&notification.key).await?,
        };
        metrics::counter!(
            "configcenter_locks_compensation_repairs_total",
            "reason" => notification.reason.as_str(),
            "outcome" => outcome.as_str()
        )
        .increment(1);
        debug!(outcome = outcome.as_str(), "Targeted repair finished");
        Ok(outcome)
    }

    /// Whether a stored record lacks a matching relation entry.
    async fn record_is_orphan(
        &self,
        namespace: LockNamespace,
        resource: &str,
        raw: &[u8],
    ) -> LockResult<bool> {
        let record = match Lock::from_bytes(raw) {
            Ok(record) => record,
            Err(e) => {
                warn!(resource, error = %e, "Undecodable lock record");
                return Ok(true);
            }
        };
        let relation_key = self.keys.relation_key(namespace, &record.txn_id);
        let entry = self
            .retry("HGET", || self.store.hget(&relation_key, resource))
            .await?;
        Ok(match entry {
            None => true,
            Some(entry) => match Lock::from_bytes(&entry) {
                Ok(entry) => !entry.same_holder(&record),
                Err(_) => true,
            },
        })
    }

    /// Whether a relation entry no longer describes the resource's record.
    async fn entry_is_stale(
        &self,
        namespace: LockNamespace,
        txn_id: &str,
        resource: &str,
        raw: &[u8],
    ) -> LockResult<bool> {
        let entry = match Lock::from_bytes(raw) {
            Ok(entry) => entry,
            Err(_) => return Ok(true),
        };
        if entry.txn_id != txn_id {
            return Ok(true);
        }
        let record_key = self.keys.record_key(namespace, resource);
        let record = self.retry("GET", || self.store.get(&record_key)).await?;
        Ok(match record {
            None => true,
            Some(record) => match Lock::from_bytes(&record) {
                Ok(record) => !record.same_holder(&entry),
                Err(_) => true,
            },
        })
    }

    async fn repair_record(
        &self,
        namespace: LockNamespace,
        key: &str,
        resource: &str,
        captured: Option<&[u8]>,
    ) -> LockResult<RepairOutcome> {
        let Some(current) = self.retry("GET", || self.store.get(key)).await? else {
            return Ok(RepairOutcome::Missing);
        };
        if captured.is_some_and(|captured| captured != current.as_slice()) {
            return Ok(RepairOutcome::Changed);
        }
        if !self.record_is_orphan(namespace, resource, &current).await? {
            return Ok(RepairOutcome::Consistent);
        }
        if self
            .retry("DEL", || self.store.delete_if_value(key, &current))
            .await?
        {
            info!(key, "Removed orphaned lock record");
            Ok(RepairOutcome::Removed)
        } else {
            Ok(RepairOutcome::Changed)
        }
    }

    async fn repair_entry(
        &self,
        namespace: LockNamespace,
        key: &str,
        txn_id: &str,
        field: &str,
        captured: Option<&[u8]>,
    ) -> LockResult<RepairOutcome> {
        let Some(current) = self.retry("HGET", || self.store.hget(key, field)).await? else {
            return Ok(RepairOutcome::Missing);
        };
        if captured.is_some_and(|captured| captured != current.as_slice()) {
            return Ok(RepairOutcome::Changed);
        }
        if !self.entry_is_stale(namespace, txn_id, field, &current).await? {
            return Ok(RepairOutcome::Consistent);
        }
        if self
            .retry("HDEL", || self.store.hdel_if_value(key, field, &current))
            .await?
        {
            info!(key, field, "Removed stale relation entry");
            Ok(RepairOutcome::Removed)
        } else {
            Ok(RepairOutcome::Changed)
        }
    }

    /// Delete a relation hash that exists with no fields.
    pub(crate) async fn remove_empty_index(&self, key: &str) -> LockResult<RepairOutcome> {
        if !self.retry("EXISTS", || self.store.exists(key)).await? {
            return Ok(RepairOutcome::Missing);
        }
        if self.retry("HLEN", || self.store.hlen(key)).await? > 0 {
            return Ok(RepairOutcome::Consistent);
        }
        self.retry("DEL", || self.store.delete(key)).await?;
        info!(key, "Removed empty relation index");
        Ok(RepairOutcome::Removed)
    }

    /// Run one full reconciliation pass over both namespaces.
    #[instrument(skip(self), fields(prefix = %self.keys.prefix()))]
    pub async fn sweep(&self) -> LockResult<SweepReport> {
        let start_time = std::time::Instant::now();
        let mut report = SweepReport::default();
        let mut suspects = Vec::new();

        for namespace in LockNamespace::ALL {
            self.collect_records(namespace, &mut suspects, &mut report).await?;
            self.collect_entries(namespace, &mut suspects, &mut report).await?;
        }
        report.suspects = suspects.len();

        if !suspects.is_empty() {
            sleep(self.repair_delay).await;
        }

        for suspect in &suspects {
            let outcome = match suspect {
                Suspect::Record {
                    namespace,
                    key,
                    resource,
                    value,
                } => {
                    self.repair_record(*namespace, key, resource, Some(value.as_slice()))
                        .await
                }
                Suspect::Entry {
                    namespace,
                    key,
                    txn_id,
                    field,
                    value,
                } => {
                    self.repair_entry(*namespace, key, txn_id, field, Some(value.as_slice()))
                        .await
                }
                Suspect::EmptyIndex { key } => self.remove_empty_index(key).await,
            };
            match outcome {
                Ok(RepairOutcome::Removed) => match suspect {
                    Suspect::Record { .. } => report.removed_records += 1,
                    Suspect::Entry { .. } => report.removed_entries += 1,
                    Suspect::EmptyIndex { .. } => report.removed_indexes += 1,
                },
                Ok(_) => report.skipped += 1,
                Err(e) => {
                    warn!(key = suspect.key(), error = %e, "Sweep repair failed");
                    report.failed += 1;
                }
            }
        }

        metrics::histogram!("configcenter_locks_compensation_sweep_duration_seconds")
            .record(start_time.elapsed().as_secs_f64());
        metrics::counter!("configcenter_locks_compensation_sweep_removed_total", "kind" => "record")
            .increment(report.removed_records as u64);
        metrics::counter!("configcenter_locks_compensation_sweep_removed_total", "kind" => "entry")
            .increment(report.removed_entries as u64);
        metrics::counter!("configcenter_locks_compensation_sweep_removed_total", "kind" => "index")
            .increment(report.removed_indexes as u64);

        if report.removed() > 0 || report.failed > 0 {
            info!(
                removed_records = report.removed_records,
                removed_entries = report.removed_entries,
                removed_indexes = report.removed_indexes,
                failed = report.failed,
                "Compensation sweep repaired lock state"
            );
        } else {
            debug!(
                scanned_records = report.scanned_records,
                scanned_indexes = report.scanned_indexes,
                "Compensation sweep found nothing to repair"
            );
        }
        Ok(report)
    }

    async fn collect_records(
        &self,
        namespace: LockNamespace,
        suspects: &mut Vec<Suspect>,
        report: &mut SweepReport,
    ) -> LockResult<()> {
        let pattern = self.keys.record_pattern(namespace);
        let mut seen = HashSet::new();
        let mut cursor = 0u64;
        loop {
            let page = self
                .retry("SCAN", || {
                    self.store.scan(cursor, &pattern, self.scan_batch_size)
                })
                .await?;
            for key in page.keys {
                let Some(resource) = self.keys.resource_of(namespace, &key) else {
                    continue;
                };
                if !seen.insert(key.clone()) {
                    continue;
                }
                report.scanned_records += 1;
                let resource = resource.to_string();
                let inspected = self.inspect_record(namespace, &key, &resource).await;
                match inspected {
                    Ok(Some(value)) => suspects.push(Suspect::Record {
                        namespace,
                        key,
                        resource,
                        value,
                    }),
                    Ok(None) => {}
                    Err(e) => warn!(key = %key, error = %e, "Failed to inspect lock record"),
                }
            }
            if page.cursor == 0 {
                return Ok(());
            }
            cursor = page.cursor;
        }
    }

    /// Current value of an orphaned record, `None` if absent or consistent.
    async fn inspect_record(
        &self,
        namespace: LockNamespace,
        key: &str,
        resource: &str,
    ) -> LockResult<Option<Vec<u8>>> {
        let Some(value) = self.retry("GET", || self.store.get(key)).await? else {
            return Ok(None);
        };
        if self.record_is_orphan(namespace, resource, &value).await? {
            Ok(Some(value))
        } else {
            Ok(None)
        }
    }

    async fn collect_entries(
        &self,
        namespace: LockNamespace,
        suspects: &mut Vec<Suspect>,
        report: &mut SweepReport,
    ) -> LockResult<()> {
        let pattern = self.keys.relation_pattern(namespace);
        let mut seen = HashSet::new();
        let mut cursor = 0u64;
        loop {
            let page = self
                .retry("SCAN", || {
                    self.store.scan(cursor, &pattern, self.scan_batch_size)
                })
                .await?;
            for key in page.keys {
                let Some(txn_id) = self.keys.txn_of(namespace, &key) else {
                    continue;
                };
                if !seen.insert(key.clone()) {
                    continue;
                }
                report.scanned_indexes += 1;
                let txn_id = txn_id.to_string();
                if let Err(e) = self
                    .inspect_index(namespace, &key, &txn_id, suspects)
                    .await
                {
                    warn!(key = %key, error = %e, "Failed to inspect relation index");
                }
            }
            if page.cursor == 0 {
                return Ok(());
            }
            cursor = page.cursor;
        }
    }

    async fn inspect_index(
        &self,
        namespace: LockNamespace,
        key: &str,
        txn_id: &str,
        suspects: &mut Vec<Suspect>,
    ) -> LockResult<()> {
        let entries = self.retry("HGETALL", || self.store.hget_all(key)).await?;
        if entries.is_empty() {
            suspects.push(Suspect::EmptyIndex {
                key: key.to_string(),
            });
            return Ok(());
        }
        for (field, value) in entries {
            if self.entry_is_stale(namespace, txn_id, &field, &value).await? {
                suspects.push(Suspect::Entry {
                    namespace,
                    key: key.to_string(),
                    txn_id: txn_id.to_string(),
                    field,
                    value,
                });
            }
        }
        Ok(())
    }
}

/// Drain the notification queue until every sender is gone.
pub(crate) fn spawn_repair_consumer(
    compensator: Compensator,
    mut rx: mpsc::Receiver<Notification>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(notification) = rx.recv().await {
            sleep_until(notification.enqueued_at() + compensator.repair_delay()).await;
            if let Err(e) = compensator.repair(&notification).await {
                error!(
                    key = %notification.key,
                    reason = notification.reason.as_str(),
                    error = %e,
                    "Targeted repair failed"
                );
                metrics::counter!(
                    "configcenter_locks_compensation_repairs_total",
                    "reason" => notification.reason.as_str(),
                    "outcome" => "failed"
                )
                .increment(1);
            }
        }
        debug!("Compensation queue closed");
    })
}

/// Run [`Compensator::sweep`] every `period`, starting one period from now.
pub(crate) fn spawn_sweeper(compensator: Compensator, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(e) = compensator.sweep().await {
                error!(error = %e, "Compensation sweep failed");
            }
        }
    })
}
