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

//! Configuration support for KeyValue store backends.
//!
//! ## Purpose
//! Provides environment-based configuration for selecting and configuring
//! the KeyValue store backend (InMemory, Redis).
//!
//! ## Environment Variables
//!
//! ### Backend Selection
//! - `CONFIGCENTER_KV_BACKEND`: Backend type (default: "in-memory")
//!   - "in-memory" | "memory" → InMemoryKVStore
//!   - "redis" → RedisKVStore
//!
//! ### Redis Configuration
//! - `CONFIGCENTER_KV_REDIS_URL`: Redis server URL (default: "redis://localhost:6379")
//!
//! ## Examples
//!
//! ### In-Memory (Default)
//! ```bash
//! # No environment variables needed
//! cclock show --name host-1
//! ```
//!
//! ### Redis
//! ```bash
//! export CONFIGCENTER_KV_BACKEND=redis
//! export CONFIGCENTER_KV_REDIS_URL=redis://localhost:6379
//! cclock sweep
//! ```

use crate::{InMemoryKVStore, KVError, KVResult, KeyValueStore};
use std::sync::Arc;

/// Environment variable selecting the backend.
pub const ENV_BACKEND: &str = "CONFIGCENTER_KV_BACKEND";
/// Environment variable holding the Redis URL.
pub const ENV_REDIS_URL: &str = "CONFIGCENTER_KV_REDIS_URL";

const DEFAULT_REDIS_URL: &str = "redis://localhost:6379";

/// Backend type configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum BackendType {
    /// In-memory map backend (default, always available)
    #[default]
    InMemory,
    /// Redis backend (requires redis-backend feature)
    Redis {
        /// Redis server URL
        url: String,
    },
}

/// KeyValue store configuration.
#[derive(Debug, Clone, Default)]
pub struct KVConfig {
    /// Backend type
    pub backend: BackendType,
}

impl KVConfig {
    /// Create configuration from environment variables.
    ///
    /// ## Examples
    /// ```rust
    /// use configcenter_keyvalue::KVConfig;
    ///
    /// # fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let config = KVConfig::from_env()?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_env() -> KVResult<Self> {
        let backend_str = std::env::var(ENV_BACKEND)
            .unwrap_or_else(|_| "in-memory".to_string())
            .to_lowercase();

        let backend = match backend_str.as_str() {
            "in-memory" | "memory" => BackendType::InMemory,

            "redis" => {
                let url = std::env::var(ENV_REDIS_URL)
                    .unwrap_or_else(|_| DEFAULT_REDIS_URL.to_string());
                BackendType::Redis { url }
            }

            other => {
                return Err(KVError::ConfigError(format!(
                    "Unknown backend type: {}. Valid options: in-memory, redis",
                    other
                )));
            }
        };

        Ok(Self { backend })
    }

    /// Create configuration with explicit backend.
    pub fn new(backend: BackendType) -> Self {
        Self { backend }
    }
}

/// Create a KeyValue store from environment configuration.
pub async fn create_keyvalue_from_env() -> KVResult<Arc<dyn KeyValueStore>> {
    let config = KVConfig::from_env()?;
    create_keyvalue_from_config(config).await
}

/// Create a KeyValue store from explicit configuration.
///
/// ## Examples
/// ```rust
/// use configcenter_keyvalue::{create_keyvalue_from_config, KVConfig, BackendType};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = KVConfig::new(BackendType::InMemory);
/// let kv = create_keyvalue_from_config(config).await?;
/// # Ok(())
/// # }
/// ```
pub async fn create_keyvalue_from_config(config: KVConfig) -> KVResult<Arc<dyn KeyValueStore>> {
    match config.backend {
        BackendType::InMemory => Ok(Arc::new(InMemoryKVStore::new())),

        #[cfg(feature = "redis-backend")]
        BackendType::Redis { url } => {
            use crate::redis::RedisKVStore;
            let store = RedisKVStore::new(&url).await?;
            Ok(Arc::new(store))
        }

        #[cfg(not(feature = "redis-backend"))]
        BackendType::Redis { .. } => Err(KVError::ConfigError(
            "Redis backend requires 'redis-backend' feature".to_string(),
        )),
    }
}
