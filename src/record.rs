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

//! Borrow records: one borrow-to-return cycle of a book by a user.
//!
//! ```text
//!  {nonexistent} ──borrow──► Borrowed ──return──► Returned
//! ```
//!
//! `Returned` is terminal. Records are never deleted.

use crate::base::{BookId, BorrowId, UserId};
use crate::document::{Document, Fields};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Status of a borrow record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BorrowStatus {
    Borrowed,
    Returned,
}

impl BorrowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BorrowStatus::Borrowed => "borrowed",
            BorrowStatus::Returned => "returned",
        }
    }
}

impl fmt::Display for BorrowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A document of the `borrows` collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BorrowRecord {
    pub id: BorrowId,
    pub book_id: BookId,
    pub user_id: UserId,
    pub borrow_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
    pub status: BorrowStatus,
}

/// Stored shape of a borrow record. Timestamps are epoch microseconds.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredBorrow {
    book_id: BookId,
    user_id: UserId,
    #[serde(with = "chrono::serde::ts_microseconds")]
    borrow_date: DateTime<Utc>,
    #[serde(default, with = "chrono::serde::ts_microseconds_option")]
    return_date: Option<DateTime<Utc>>,
    status: BorrowStatus,
}

impl BorrowRecord {
    pub const COLLECTION: &'static str = "borrows";

    pub const BOOK_ID: &'static str = "bookId";
    pub const USER_ID: &'static str = "userId";
    pub const BORROW_DATE: &'static str = "borrowDate";
    pub const RETURN_DATE: &'static str = "returnDate";
    pub const STATUS: &'static str = "status";

    /// Fields of a freshly opened record.
    pub(crate) fn open_fields(book_id: &BookId, user_id: &UserId, now: DateTime<Utc>) -> Fields {
        let mut fields = Fields::new();
        fields.insert(Self::BOOK_ID.into(), Value::from(book_id.as_str()));
        fields.insert(Self::USER_ID.into(), Value::from(user_id.as_str()));
        fields.insert(Self::BORROW_DATE.into(), Value::from(now.timestamp_micros()));
        fields.insert(Self::RETURN_DATE.into(), Value::Null);
        fields.insert(
            Self::STATUS.into(),
            Value::from(BorrowStatus::Borrowed.as_str()),
        );
        fields
    }

    /// Partial update closing a record.
    pub(crate) fn close_fields(now: DateTime<Utc>) -> Fields {
        let mut fields = Fields::new();
        fields.insert(Self::RETURN_DATE.into(), Value::from(now.timestamp_micros()));
        fields.insert(
            Self::STATUS.into(),
            Value::from(BorrowStatus::Returned.as_str()),
        );
        fields
    }

    pub fn from_document(document: &Document) -> Result<Self, serde_json::Error> {
        let stored: StoredBorrow = document.decode()?;
        Ok(Self {
            id: BorrowId(document.id.clone()),
            book_id: stored.book_id,
            user_id: stored.user_id,
            borrow_date: stored.borrow_date,
            return_date: stored.return_date,
            status: stored.status,
        })
    }

    pub fn is_outstanding(&self) -> bool {
        self.status == BorrowStatus::Borrowed
    }
}
