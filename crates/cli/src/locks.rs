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

//! Lock, release, inspection and compensation commands

use anyhow::{bail, Context, Result};
use clap::Args;
use configcenter_keyvalue::create_keyvalue_from_env;
use configcenter_locks::{
    default_policy, Lock, LockEngine, LockEngineConfig, LockNamespace, TxnLockManager,
};
use std::time::Duration;
use tokio::signal;
use tracing::info;

/// Resource and transaction a command acts on.
#[derive(Args, Debug)]
pub struct LockArgs {
    /// Transaction ID
    #[arg(short, long)]
    pub txn: String,

    /// Resource name
    #[arg(short, long)]
    pub name: String,

    /// Sub-transaction ID (generated when omitted)
    #[arg(short, long)]
    pub sub: Option<String>,

    /// Advisory timeout stored with the lock, in seconds
    #[arg(long, default_value_t = 0)]
    pub timeout_secs: u64,
}

impl LockArgs {
    fn request(&self) -> Lock {
        let mut request = Lock::new(self.txn.as_str(), self.name.as_str())
            .with_timeout(Duration::from_secs(self.timeout_secs));
        if let Some(sub) = &self.sub {
            request = request.with_sub_txn_id(sub.as_str());
        }
        request
    }
}

/// Build the engine from the environment.
pub async fn create_engine(prefix: Option<&str>) -> Result<LockEngine> {
    let mut config = LockEngineConfig::from_env().context("Invalid lock engine configuration")?;
    if let Some(prefix) = prefix {
        config.key_prefix = prefix.to_string();
    }
    let store = create_keyvalue_from_env()
        .await
        .context("Failed to create KeyValue store")?;
    let engine = LockEngine::with_config(store, config, default_policy(), default_policy())
        .context("Failed to start lock engine")?;
    Ok(engine)
}

pub async fn lock(engine: &LockEngine, args: &LockArgs) -> Result<()> {
    let outcome = engine
        .lock(&args.request())
        .await
        .context("Lock failed")?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

pub async fn pre_lock(engine: &LockEngine, args: &LockArgs) -> Result<()> {
    let locked = engine
        .pre_lock(&args.request())
        .await
        .context("Pre-lock failed")?;
    println!("{}", serde_json::json!({ "locked": locked }));
    Ok(())
}

pub async fn unlock(engine: &LockEngine, args: &LockArgs) -> Result<()> {
    engine
        .unlock(&args.request())
        .await
        .context("Unlock failed")?;
    println!("released {}", args.name);
    Ok(())
}

pub async fn pre_unlock(engine: &LockEngine, args: &LockArgs) -> Result<()> {
    engine
        .pre_unlock(&args.request())
        .await
        .context("Pre-unlock failed")?;
    println!("released pre-lock {}", args.name);
    Ok(())
}

pub async fn unlock_all(engine: &LockEngine, txn_id: &str) -> Result<()> {
    engine
        .unlock_all(txn_id)
        .await
        .context("Unlock-all failed")?;
    println!("released all locks of {}", txn_id);
    Ok(())
}

pub async fn show(
    engine: &LockEngine,
    name: Option<&str>,
    txn_id: Option<&str>,
    pre: bool,
) -> Result<()> {
    let namespace = if pre {
        LockNamespace::Pre
    } else {
        LockNamespace::Detail
    };
    match (name, txn_id) {
        (Some(name), _) => match engine.get_lock(namespace, name).await? {
            Some(lock) => println!("{}", serde_json::to_string_pretty(&lock)?),
            None => println!("{} is not locked ({})", name, namespace),
        },
        (None, Some(txn_id)) => {
            let held = engine.held_locks(namespace, txn_id).await?;
            println!("{}", serde_json::to_string_pretty(&held)?);
        }
        (None, None) => bail!("either --name or --txn is required"),
    }
    Ok(())
}

pub async fn sweep(engine: &LockEngine) -> Result<()> {
    let report = engine.run_sweep().await.context("Sweep failed")?;
    println!("Scanned records:  {}", report.scanned_records);
    println!("Scanned indexes:  {}", report.scanned_indexes);
    println!("Suspects:         {}", report.suspects);
    println!("Removed records:  {}", report.removed_records);
    println!("Removed entries:  {}", report.removed_entries);
    println!("Removed indexes:  {}", report.removed_indexes);
    println!("Skipped:          {}", report.skipped);
    println!("Failed:           {}", report.failed);
    Ok(())
}

pub async fn worker(engine: &LockEngine) -> Result<()> {
    info!(
        prefix = %engine.config().key_prefix,
        sweep_interval_secs = engine.config().sweep_interval_secs,
        "Compensation worker running, press Ctrl-C to stop"
    );
    signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;
    info!("Compensation worker stopped");
    Ok(())
}
