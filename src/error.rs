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

//! Error types for store access, ledger operations and catalog operations.

use crate::base::{BookId, BorrowId};
use thiserror::Error;

/// Failures reported by a [`DocumentStore`](crate::DocumentStore).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backend could not serve the request (network, permission, ...)
    #[error("document store unavailable: {0}")]
    Unavailable(String),

    /// An update or delete targeted a document that does not exist
    #[error("no document {id} in collection {collection}")]
    NotFound { collection: String, id: String },
}

/// Borrow ledger errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// A store call failed; earlier steps of the same operation are not undone
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A stored borrow record or book counter could not be decoded
    #[error("malformed stored document: {0}")]
    Decode(String),

    /// The book is already claimed by another borrow (conditional writes only)
    #[error("book {0} is not available")]
    BookUnavailable(BookId),

    /// The borrow record is not outstanding (conditional writes only)
    #[error("borrow {0} is already returned")]
    AlreadyReturned(BorrowId),
}

/// Catalog errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A stored book could not be decoded
    #[error("malformed book: {0}")]
    Decode(String),

    #[error("book {0} not found")]
    BookNotFound(BookId),
}
