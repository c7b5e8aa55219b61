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

//! # Borrow Ledger
//!
//! Borrow/return accounting for a library catalog kept in a document store.
//!
//! ## Core Components
//!
//! - [`Ledger`]: lends and takes back books, keeping each book's
//!   `available` flag and `borrowCount` in step with its borrow records
//! - [`Catalog`]: book create/read/update/delete
//! - [`LibraryReport`]: availability totals and most borrowed books
//! - [`DocumentStore`]: the store contract, with [`MemoryStore`] as the
//!   in-process implementation
//!
//! ## Example
//!
//! ```
//! use borrow_ledger_rs::{Catalog, Ledger, MemoryStore, NewBook, UserId};
//! use std::sync::Arc;
//!
//! let store = Arc::new(MemoryStore::new());
//! let catalog = Catalog::new(Arc::clone(&store));
//! let ledger = Ledger::new(Arc::clone(&store));
//!
//! let book_id = catalog
//!     .create_book(NewBook {
//!         title: "Dune".into(),
//!         author: "Frank Herbert".into(),
//!         isbn: "9780441013593".into(),
//!         category: "Science Fiction".into(),
//!         available: None,
//!     })
//!     .unwrap();
//!
//! let borrow = ledger.borrow_book(&book_id, &UserId::from("U1")).unwrap();
//! assert!(!catalog.get_book(&book_id).unwrap().unwrap().available);
//!
//! ledger.return_book(&book_id, &borrow.id).unwrap();
//! let book = catalog.get_book(&book_id).unwrap().unwrap();
//! assert!(book.available);
//! assert_eq!(book.borrow_count, Some(1));
//! ```
//!
//! ## Consistency
//!
//! Store calls are independent writes with no multi-document transaction.
//! With the default [`WritePolicy::Unguarded`] two borrowers racing on one
//! book can both succeed; [`WritePolicy::Conditional`] turns the loser into
//! a [`LedgerError::BookUnavailable`].

mod base;
pub mod book;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod document;
pub mod error;
mod ledger;
pub mod record;
pub mod report;
pub mod store;

pub use base::{BookId, BorrowId, UserId};
pub use book::Book;
pub use catalog::{BookPatch, Catalog, NewBook};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CountPolicy, LedgerConfig, WritePolicy};
pub use document::{Direction, Document, Fields, Filter, Query};
pub use error::{CatalogError, LedgerError, StoreError};
pub use ledger::Ledger;
pub use record::{BorrowRecord, BorrowStatus};
pub use report::LibraryReport;
pub use store::{DocumentStore, MemoryStore, Operation, StoreOp};
