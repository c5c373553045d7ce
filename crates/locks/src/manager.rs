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

//! Lock manager trait for transaction-scoped resource locks.

use crate::{Lock, LockOutcome, LockResult};
use async_trait::async_trait;

/// Trait for transaction-scoped distributed locks.
///
/// ## Purpose
/// Lets independent service instances agree on exclusive ownership of named
/// resources for the length of a multi-step business transaction.
///
/// ## Design
/// - **Non-blocking**: every acquisition is a single attempt; a held resource
///   returns `false` / `locked == false` immediately
/// - **Re-entrant per transaction**: a request the ownership policy accepts
///   as owner joins the existing lock instead of being refused
/// - **Two namespaces**: pre-locks and full locks never conflict with each other
/// - **Transaction grouping**: every lock is indexed under its transaction so
///   [`TxnLockManager::unlock_all`] can release them together
///
/// ## Example
/// ```rust,ignore
/// use configcenter_locks::{Lock, TxnLockManager};
///
/// let outcome = manager.lock(&Lock::new("txn-1", "host:42")).await?;
/// if outcome.locked {
///     // ... work ...
///     manager.unlock_all("txn-1").await?;
/// }
/// ```
#[async_trait]
pub trait TxnLockManager: Send + Sync {
    /// Acquire a pre-lock (reservation).
    ///
    /// ## Returns
    /// - `Ok(true)`: held by this transaction (new or re-entrant)
    /// - `Ok(false)`: held by another transaction
    /// - `Err(LockError::InvalidRequest)`: empty `txn_id` or `lock_name`
    /// - `Err(LockError::Store)`: store error
    async fn pre_lock(&self, request: &Lock) -> LockResult<bool>;

    /// Release a pre-lock.
    ///
    /// ## Returns
    /// - `Ok(())`: released, or nothing was held
    /// - `Err(LockError::PermissionDenied)`: held by another transaction
    /// - `Err(LockError::Conflict)`: the stored record kept changing between
    ///   read and delete
    async fn pre_unlock(&self, request: &Lock) -> LockResult<()>;

    /// Acquire a full lock.
    ///
    /// ## Returns
    /// - `Ok(LockOutcome)`: `locked` tells whether this call holds the lock;
    ///   `lock_sub_txn_id` names the call that created the stored record
    /// - `Err(LockError::InvalidRequest)`: empty `txn_id` or `lock_name`
    /// - `Err(LockError::Store)`: store error
    async fn lock(&self, request: &Lock) -> LockResult<LockOutcome>;

    /// Release a full lock.
    ///
    /// ## Returns
    /// - `Ok(())`: released, or nothing was held
    /// - `Err(LockError::PermissionDenied)`: held by another transaction
    /// - `Err(LockError::Conflict)`: the stored record kept changing between
    ///   read and delete
    async fn unlock(&self, request: &Lock) -> LockResult<()>;

    /// Release every pre-lock and full lock indexed under `txn_id`.
    ///
    /// Entries that are already gone or now belong to someone else are
    /// skipped. Any other error stops the release and is returned.
    async fn unlock_all(&self, txn_id: &str) -> LockResult<()>;
}
