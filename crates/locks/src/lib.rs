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

//! # ConfigCenter Distributed Locks
//!
//! ## Purpose
//! Lets independent service instances agree on exclusive ownership of named
//! resources across a multi-step business transaction, using nothing but a
//! shared key-value store with single-key atomicity.
//!
//! ## Architecture Context
//! - **[`LockEngine`]**: pre-locks, full locks, release and bulk release per transaction
//! - **[`keys`]**: the key layout shared by the engine and the compensation worker
//! - **[`compensation`]**: background repair of the two-key write pattern
//!
//! ## Design Decisions
//! - **Record + relation index**: each lock is a string key per resource plus
//!   a field in a hash per transaction. The two writes are not atomic.
//! - **Compensation over transactions**: partial failures are repaired by a
//!   notification queue and a periodic sweep rather than by a multi-key transaction
//! - **Non-blocking**: acquisition never waits; callers retry
//! - **Pluggable ownership**: [`OwnershipPolicy`] decides re-entrancy and
//!   release rights, separately for pre-locks and full locks
//!
//! ## Examples
//!
//! ### Basic Usage
//! ```rust,no_run
//! use configcenter_keyvalue::InMemoryKVStore;
//! use configcenter_locks::{default_policy, Lock, LockEngine, TxnLockManager};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(InMemoryKVStore::new());
//! let engine = LockEngine::new(store, "cc", 10, 120, default_policy(), default_policy())?;
//!
//! // Reserve, then lock
//! assert!(engine.pre_lock(&Lock::new("txn-1", "host:42")).await?);
//! let outcome = engine.lock(&Lock::new("txn-1", "host:42")).await?;
//! assert!(outcome.locked);
//!
//! // Another transaction is refused without waiting
//! let other = engine.lock(&Lock::new("txn-2", "host:42")).await?;
//! assert!(!other.locked);
//!
//! // Release everything txn-1 holds
//! engine.unlock_all("txn-1").await?;
//! # Ok(())
//! # }
//! ```

pub mod compensation;
pub mod config;
pub mod engine;
pub mod error;
pub mod keys;
pub mod manager;
pub mod policy;
pub mod types;

pub use compensation::{
    CompensationNotifier, Compensator, Notification, RepairOutcome, RepairReason, SweepReport,
};
pub use config::LockEngineConfig;
pub use engine::LockEngine;
pub use error::{LockError, LockResult};
pub use keys::{fmt_key, KeyScheme};
pub use manager::TxnLockManager;
pub use policy::{default_policy, lock_compare, OwnershipPolicy, SharedPolicy, TxnIdPolicy};
pub use types::{new_sub_txn_id, Lock, LockNamespace, LockOutcome, SUB_TXN_ID_PREFIX};
