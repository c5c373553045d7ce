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

//! Error types for KeyValue operations.

use thiserror::Error;

/// Result type for KeyValue operations.
pub type KVResult<T> = Result<T, KVError>;

/// Errors that can occur during KeyValue operations.
#[derive(Error, Debug)]
pub enum KVError {
    /// Key not found
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// Invalid key format
    #[error("Invalid key format: {0}")]
    InvalidKey(String),

    /// Operation against a key holding the wrong kind of value
    /// (string operation on a hash or the reverse)
    #[error("Wrong value type for key: {0}")]
    WrongType(String),

    /// Invalid scan pattern
    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    /// Backend error (network, server, etc.)
    #[error("Backend error: {0}")]
    BackendError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// IO error
    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),
}

impl KVError {
    /// Whether retrying the same operation may succeed.
    ///
    /// Only backend and IO failures are transient; type and key errors will
    /// fail the same way every time.
    pub fn is_transient(&self) -> bool {
        matches!(self, KVError::BackendError(_) | KVError::IOError(_))
    }
}

impl From<serde_json::Error> for KVError {
    fn from(err: serde_json::Error) -> Self {
        KVError::SerializationError(err.to_string())
    }
}

#[cfg(feature = "redis-backend")]
impl From<redis::RedisError> for KVError {
    fn from(err: redis::RedisError) -> Self {
        if err.code() == Some("WRONGTYPE") {
            KVError::WrongType(err.to_string())
        } else {
            KVError::BackendError(format!("Redis error: {}", err))
        }
    }
}
