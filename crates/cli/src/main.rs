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

//! ConfigCenter lock CLI
//!
//! ## Purpose
//! Command-line tool for operating the distributed lock coordinator:
//! - Acquire and release pre-locks and full locks by hand
//! - Inspect which transaction holds a resource
//! - Run the compensation sweep once, or keep the worker running
//!
//! ## Configuration
//! The store backend comes from `CONFIGCENTER_KV_*` and the engine settings
//! from `CONFIGCENTER_LOCK_*` environment variables. `RUST_LOG` controls
//! logging (default: info).

use anyhow::Result;
use clap::{Parser, Subcommand};

mod locks;

#[derive(Parser)]
#[command(name = "cclock")]
#[command(about = "ConfigCenter lock coordinator CLI", long_about = None)]
struct Cli {
    /// Key prefix (overrides CONFIGCENTER_LOCK_PREFIX)
    #[arg(long, global = true)]
    prefix: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Acquire a full lock
    Lock {
        #[command(flatten)]
        target: locks::LockArgs,
    },

    /// Acquire a pre-lock (reservation)
    PreLock {
        #[command(flatten)]
        target: locks::LockArgs,
    },

    /// Release a full lock
    Unlock {
        #[command(flatten)]
        target: locks::LockArgs,
    },

    /// Release a pre-lock
    PreUnlock {
        #[command(flatten)]
        target: locks::LockArgs,
    },

    /// Release every lock held by a transaction
    UnlockAll {
        /// Transaction ID
        #[arg(short, long)]
        txn: String,
    },

    /// Show the holder of a resource, or the locks of a transaction
    Show {
        /// Resource name
        #[arg(short, long, conflicts_with = "txn")]
        name: Option<String>,

        /// Transaction ID
        #[arg(short, long)]
        txn: Option<String>,

        /// Look in the pre-lock namespace
        #[arg(long)]
        pre: bool,
    },

    /// Run one compensation sweep and print the report
    Sweep,

    /// Keep the compensation worker running until Ctrl-C
    Worker,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let engine = locks::create_engine(cli.prefix.as_deref()).await?;

    match cli.command {
        Commands::Lock { target } => locks::lock(&engine, &target).await,
        Commands::PreLock { target } => locks::pre_lock(&engine, &target).await,
        Commands::Unlock { target } => locks::unlock(&engine, &target).await,
        Commands::PreUnlock { target } => locks::pre_unlock(&engine, &target).await,
        Commands::UnlockAll { txn } => locks::unlock_all(&engine, &txn).await,
        Commands::Show { name, txn, pre } => {
            locks::show(&engine, name.as_deref(), txn.as_deref(), pre).await
        }
        Commands::Sweep => locks::sweep(&engine).await,
        Commands::Worker => locks::worker(&engine).await,
    }
}
