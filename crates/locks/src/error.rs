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

//! Error types for distributed lock operations.

use configcenter_keyvalue::KVError;
use thiserror::Error;

/// Result type for lock operations.
pub type LockResult<T> = Result<T, LockError>;

/// Errors that can occur during lock operations.
#[derive(Error, Debug)]
pub enum LockError {
    /// Malformed request (missing transaction id or lock name)
    #[error("Invalid lock request: {0}")]
    InvalidRequest(String),

    /// Release attempted on a resource with no stored record
    #[error("Lock not found: {0}")]
    LockNotFound(String),

    /// Release attempted by a transaction that does not own the record
    #[error("Lock permission denied: {0}")]
    PermissionDenied(String),

    /// Record kept changing underneath a release
    #[error("Lock conflict: {0}")]
    Conflict(String),

    /// Store error (network, server, wrong value type)
    #[error("Store error: {0}")]
    Store(#[from] KVError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl LockError {
    /// True for [`LockError::LockNotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, LockError::LockNotFound(_))
    }

    /// True for [`LockError::PermissionDenied`].
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, LockError::PermissionDenied(_))
    }
}

impl From<serde_json::Error> for LockError {
    fn from(err: serde_json::Error) -> Self {
        LockError::SerializationError(err.to_string())
    }
}
