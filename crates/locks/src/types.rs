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

//! Lock request, outcome and namespace types.
//!
//! A [`Lock`] is both the caller's request and, serialized as JSON, the value
//! stored at a resource's lock key and inside the owning transaction's
//! relation index.

use crate::{LockError, LockResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use ulid::Ulid;

/// Prefix of generated sub-transaction ids.
pub const SUB_TXN_ID_PREFIX: &str = "sub-";

/// Generate a globally unique sub-transaction id.
pub fn new_sub_txn_id() -> String {
    format!("{}{}", SUB_TXN_ID_PREFIX, Ulid::new())
}

/// Lock namespace. Pre-locks (reservations) and full locks never see each
/// other's records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockNamespace {
    /// Reservation locks (`PreLock` / `PreUnlock`)
    Pre,
    /// Transaction-tracked full locks (`Lock` / `Unlock`)
    Detail,
}

impl LockNamespace {
    /// Both namespaces, pre first.
    pub const ALL: [LockNamespace; 2] = [LockNamespace::Pre, LockNamespace::Detail];

    /// Key segment for this namespace.
    pub fn as_str(&self) -> &'static str {
        match self {
            LockNamespace::Pre => "pre",
            LockNamespace::Detail => "detail",
        }
    }

    /// True for [`LockNamespace::Pre`].
    pub fn is_pre(&self) -> bool {
        matches!(self, LockNamespace::Pre)
    }
}

impl fmt::Display for LockNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lock request and stored lock record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lock {
    /// Owning business transaction
    pub txn_id: String,
    /// This acquisition call; generated when empty
    #[serde(default)]
    pub sub_txn_id: String,
    /// Protected resource
    pub lock_name: String,
    /// Advisory validity window for the owning workflow. Never enforced as a
    /// store expiry.
    #[serde(default)]
    pub timeout: Duration,
    /// Stamped on acquisition when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<DateTime<Utc>>,
}

impl Lock {
    /// Request for `lock_name` under transaction `txn_id`.
    pub fn new(txn_id: impl Into<String>, lock_name: impl Into<String>) -> Self {
        Self {
            txn_id: txn_id.into(),
            sub_txn_id: String::new(),
            lock_name: lock_name.into(),
            timeout: Duration::ZERO,
            create_time: None,
        }
    }

    /// Set an explicit sub-transaction id.
    pub fn with_sub_txn_id(mut self, sub_txn_id: impl Into<String>) -> Self {
        self.sub_txn_id = sub_txn_id.into();
        self
    }

    /// Set the advisory timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Reject requests the engine cannot key.
    pub fn validate(&self) -> LockResult<()> {
        if self.txn_id.is_empty() {
            return Err(LockError::InvalidRequest("txn_id is empty".to_string()));
        }
        if self.lock_name.is_empty() {
            return Err(LockError::InvalidRequest("lock_name is empty".to_string()));
        }
        Ok(())
    }

    /// Same transaction and same acquisition call.
    ///
    /// This is how a relation entry is matched against the lock record it
    /// indexes.
    pub fn same_holder(&self, other: &Lock) -> bool {
        self.txn_id == other.txn_id && self.sub_txn_id == other.sub_txn_id
    }

    /// Serialize for storage.
    pub fn to_bytes(&self) -> LockResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserialize a stored record or relation entry.
    pub fn from_bytes(bytes: &[u8]) -> LockResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Result of a full `lock` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockOutcome {
    /// This call's sub-transaction id (generated if the request had none)
    pub sub_txn_id: String,
    /// Whether this call holds the lock (as owner or re-entrant participant)
    pub locked: bool,
    /// Sub-transaction id of the call that created the stored record
    pub lock_sub_txn_id: String,
}

impl LockOutcome {
    /// True when this call created the stored record.
    pub fn is_owner(&self) -> bool {
        self.locked && self.sub_txn_id == self.lock_sub_txn_id
    }
}
