// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Ledger configuration.
//!
//! Both knobs default to the behavior callers get without asking for
//! stronger guarantees. The CLI exposes them as flags; embedding
//! applications can deserialize [`LedgerConfig`] from their own settings.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// How the ledger writes the book and borrow documents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum WritePolicy {
    /// Blind last-write-wins writes. Two borrowers racing on one book can
    /// both succeed.
    #[default]
    Unguarded,
    /// Borrows claim the book with a compare-and-set on `available` and
    /// returns require the record to still be outstanding.
    Conditional,
}

/// How `borrowCount` is derived when a book is borrowed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum CountPolicy {
    /// Stored `borrowCount` plus one.
    #[default]
    Cumulative,
    /// Outstanding borrow records of the book (counted after the new record
    /// is written) plus one. Conflates "currently out" with "ever borrowed",
    /// so the counter can go down.
    Outstanding,
    /// Every borrow record of the book, returned or not, including the new one.
    Historical,
}

/// Settings for a [`Ledger`](crate::Ledger).
///
/// # Example
///
/// ```
/// use borrow_ledger_rs::{CountPolicy, LedgerConfig, WritePolicy};
///
/// let config: LedgerConfig = serde_json::from_str(r#"{"write_policy": "conditional"}"#).unwrap();
/// assert_eq!(config.write_policy, WritePolicy::Conditional);
/// assert_eq!(config.count_policy, CountPolicy::Cumulative);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub write_policy: WritePolicy,
    pub count_policy: CountPolicy,
}

impl LedgerConfig {
    pub fn new(write_policy: WritePolicy, count_policy: CountPolicy) -> Self {
        Self {
            write_policy,
            count_policy,
        }
    }
}
