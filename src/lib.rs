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

//! ConfigCenter: distributed lock coordination for configuration services
//!
//! Independent service instances (topology, object, event, task servers)
//! agree on exclusive ownership of named resources for the length of a
//! business transaction through one shared key-value store.
//!
//! Building blocks:
//! 1. KeyValue store adapter (in-memory, Redis)
//! 2. Lock engine with pre-locks, full locks and per-transaction bulk release
//! 3. Compensation worker that repairs the non-atomic two-key writes

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

// Independent crates - re-export them here
pub use configcenter_keyvalue as keyvalue;
pub use configcenter_locks as locks;

// Re-export core types for convenience
pub use keyvalue::{
    create_keyvalue_from_config, create_keyvalue_from_env, BackendType, InMemoryKVStore, KVConfig,
    KVError, KeyValueStore,
};
pub use locks::{
    default_policy, Lock, LockEngine, LockEngineConfig, LockError, LockNamespace, LockOutcome,
    LockResult, OwnershipPolicy, SweepReport, TxnLockManager,
};
