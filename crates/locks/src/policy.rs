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

//! Ownership comparison policies.

use crate::Lock;
use std::sync::Arc;

/// Decides whether a request may act as owner of a stored record.
///
/// Used for re-entrant acquisition and for release. The engine takes one
/// policy for pre-locks and one for full locks.
pub trait OwnershipPolicy: Send + Sync {
    /// True if `requested` may act as owner of `stored`.
    fn is_owner(&self, requested: &Lock, stored: &Lock) -> bool;
}

impl<F> OwnershipPolicy for F
where
    F: Fn(&Lock, &Lock) -> bool + Send + Sync,
{
    fn is_owner(&self, requested: &Lock, stored: &Lock) -> bool {
        self(requested, stored)
    }
}

/// Shared policy handle.
pub type SharedPolicy = Arc<dyn OwnershipPolicy>;

/// Default policy: same transaction id, regardless of lock name or
/// sub-transaction id.
#[derive(Debug, Clone, Copy, Default)]
pub struct TxnIdPolicy;

impl OwnershipPolicy for TxnIdPolicy {
    fn is_owner(&self, requested: &Lock, stored: &Lock) -> bool {
        lock_compare(requested, stored)
    }
}

/// Function form of [`TxnIdPolicy`].
pub fn lock_compare(requested: &Lock, stored: &Lock) -> bool {
    requested.txn_id == stored.txn_id
}

/// [`TxnIdPolicy`] behind a shared handle.
pub fn default_policy() -> SharedPolicy {
    Arc::new(TxnIdPolicy)
}
