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

//! Lock engine configuration.
//!
//! ## Environment Variables
//! - `CONFIGCENTER_LOCK_PREFIX`: key prefix (default: "cc")
//! - `CONFIGCENTER_LOCK_RETRY_COUNT`: background retry attempts (default: 10)
//! - `CONFIGCENTER_LOCK_SWEEP_INTERVAL_SECS`: full sweep period (default: 120)
//! - `CONFIGCENTER_LOCK_REPAIR_DELAY_MS`: pause before re-checking a suspect (default: 1000)
//! - `CONFIGCENTER_LOCK_QUEUE_CAPACITY`: notification queue bound (default: 500)
//! - `CONFIGCENTER_LOCK_SCAN_BATCH`: keys per scan batch (default: 100)

use crate::{LockError, LockResult};
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;

/// Environment variable for [`LockEngineConfig::key_prefix`].
pub const ENV_PREFIX: &str = "CONFIGCENTER_LOCK_PREFIX";
/// Environment variable for [`LockEngineConfig::retry_count`].
pub const ENV_RETRY_COUNT: &str = "CONFIGCENTER_LOCK_RETRY_COUNT";
/// Environment variable for [`LockEngineConfig::sweep_interval_secs`].
pub const ENV_SWEEP_INTERVAL_SECS: &str = "CONFIGCENTER_LOCK_SWEEP_INTERVAL_SECS";
/// Environment variable for [`LockEngineConfig::repair_delay_ms`].
pub const ENV_REPAIR_DELAY_MS: &str = "CONFIGCENTER_LOCK_REPAIR_DELAY_MS";
/// Environment variable for [`LockEngineConfig::notify_queue_capacity`].
pub const ENV_QUEUE_CAPACITY: &str = "CONFIGCENTER_LOCK_QUEUE_CAPACITY";
/// Environment variable for [`LockEngineConfig::scan_batch_size`].
pub const ENV_SCAN_BATCH: &str = "CONFIGCENTER_LOCK_SCAN_BATCH";

/// Settings for a [`crate::LockEngine`] and its compensation worker.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LockEngineConfig {
    /// Prefix of every store key the engine touches
    pub key_prefix: String,
    /// Attempts per store operation on the background path
    pub retry_count: u32,
    /// Period of the full reconciliation sweep
    pub sweep_interval_secs: u64,
    /// Pause before a suspect key is re-checked and repaired
    pub repair_delay_ms: u64,
    /// Bound of the notification queue; notifications beyond it are dropped
    pub notify_queue_capacity: usize,
    /// Keys requested per scan batch
    pub scan_batch_size: usize,
}

impl Default for LockEngineConfig {
    fn default() -> Self {
        Self {
            key_prefix: "cc".to_string(),
            retry_count: 10,
            sweep_interval_secs: 120,
            repair_delay_ms: 1000,
            notify_queue_capacity: 500,
            scan_batch_size: 100,
        }
    }
}

impl LockEngineConfig {
    /// Read overrides from the environment on top of the defaults.
    pub fn from_env() -> LockResult<Self> {
        let mut config = Self::default();
        if let Ok(prefix) = std::env::var(ENV_PREFIX) {
            config.key_prefix = prefix;
        }
        if let Some(v) = env_parse(ENV_RETRY_COUNT)? {
            config.retry_count = v;
        }
        if let Some(v) = env_parse(ENV_SWEEP_INTERVAL_SECS)? {
            config.sweep_interval_secs = v;
        }
        if let Some(v) = env_parse(ENV_REPAIR_DELAY_MS)? {
            config.repair_delay_ms = v;
        }
        if let Some(v) = env_parse(ENV_QUEUE_CAPACITY)? {
            config.notify_queue_capacity = v;
        }
        if let Some(v) = env_parse(ENV_SCAN_BATCH)? {
            config.scan_batch_size = v;
        }
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the worker cannot run with.
    pub fn validate(&self) -> LockResult<()> {
        if self.key_prefix.is_empty() {
            return Err(LockError::ConfigError("key_prefix must not be empty".to_string()));
        }
        // A ':' would let one deployment's scan patterns match another's keys
        if self.key_prefix.contains(':') {
            return Err(LockError::ConfigError(format!(
                "key_prefix '{}' must not contain ':'",
                self.key_prefix
            )));
        }
        if self.sweep_interval_secs == 0 {
            return Err(LockError::ConfigError(
                "sweep_interval_secs must be positive".to_string(),
            ));
        }
        if self.notify_queue_capacity == 0 {
            return Err(LockError::ConfigError(
                "notify_queue_capacity must be positive".to_string(),
            ));
        }
        if self.scan_batch_size == 0 {
            return Err(LockError::ConfigError(
                "scan_batch_size must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Sweep period.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Repair delay.
    pub fn repair_delay(&self) -> Duration {
        Duration::from_millis(self.repair_delay_ms)
    }
}

fn env_parse<T: FromStr>(name: &str) -> LockResult<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| LockError::ConfigError(format!("{} has invalid value '{}'", name, raw))),
        Err(_) => Ok(None),
    }
}
