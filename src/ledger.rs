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

//! The borrow ledger.
//!
//! Keeps borrow records and the `available`/`borrowCount` fields of the
//! borrowed book in step. Every operation is a fixed sequence of
//! independent store calls; nothing is retried and nothing is rolled back
//! when a later step fails, so a failure can leave a borrow record and its
//! book disagreeing (for example an outstanding record on a book still
//! marked available). The error of the failing step is returned.

use crate::base::{BookId, BorrowId, UserId};
use crate::book::Book;
use crate::clock::{self, Clock, SystemClock};
use crate::config::{CountPolicy, LedgerConfig, WritePolicy};
use crate::document::{Direction, Document, Filter, Query};
use crate::error::{LedgerError, StoreError};
use crate::record::{BorrowRecord, BorrowStatus};
use crate::store::DocumentStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub struct Ledger<S> {
    store: S,
    config: LedgerConfig,
    clock: Arc<dyn Clock>,
}

impl<S: DocumentStore> Ledger<S> {
    /// Creates a ledger with the default configuration and the wall clock.
    pub fn new(store: S) -> Self {
        Self::with_config(store, LedgerConfig::default())
    }

    pub fn with_config(store: S, config: LedgerConfig) -> Self {
        Ledger {
            store,
            config,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the time source used for borrow and return dates.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Lends a book to a user.
    ///
    /// The caller is expected to have checked that the book is available;
    /// neither id is verified here.
    ///
    /// | Policy | Store calls |
    /// |--------|-------------|
    /// | Unguarded | insert record, derive counter, update book (`available = false`, `borrowCount`) |
    /// | Conditional | claim book (`available: true -> false`), insert record, derive counter, update book (`borrowCount`) |
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Store`] - a store call failed. Steps already taken
    ///   stay in place, except that a conditional claim is released when the
    ///   record insert fails.
    /// - [`LedgerError::BookUnavailable`] - conditional writes only: the
    ///   book was already claimed. Nothing was written.
    pub fn borrow_book(
        &self,
        book_id: &BookId,
        user_id: &UserId,
    ) -> Result<BorrowRecord, LedgerError> {
        match self.config.write_policy {
            WritePolicy::Unguarded => self.borrow_unguarded(book_id, user_id),
            WritePolicy::Conditional => self.borrow_conditional(book_id, user_id),
        }
    }

    fn borrow_unguarded(
        &self,
        book_id: &BookId,
        user_id: &UserId,
    ) -> Result<BorrowRecord, LedgerError> {
        let record = self.open_record(book_id, user_id)?;

        let borrow_count = self.next_borrow_count(book_id)?;
        let mut fields = Book::availability_fields(false);
        fields.extend(Book::borrow_count_fields(borrow_count));
        self.store
            .update(Book::COLLECTION, book_id.as_str(), fields)?;

        Ok(record)
    }

    fn borrow_conditional(
        &self,
        book_id: &BookId,
        user_id: &UserId,
    ) -> Result<BorrowRecord, LedgerError> {
        let claimed = self.store.update_if(
            Book::COLLECTION,
            book_id.as_str(),
            &[Filter::eq(Book::AVAILABLE, true)],
            Book::availability_fields(false),
        )?;
        if !claimed {
            return Err(LedgerError::BookUnavailable(book_id.clone()));
        }

        let record = match self.open_record(book_id, user_id) {
            Ok(record) => record,
            Err(error) => {
                // If the release fails too, the book stays claimed and the
                // insert error is still the one reported.
                if let Err(release) = self.store.update(
                    Book::COLLECTION,
                    book_id.as_str(),
                    Book::availability_fields(true),
                ) {
                    tracing::warn!(
                        book = %book_id,
                        error = %release,
                        "failed to release book claim after borrow insert failed"
                    );
                }
                return Err(error);
            }
        };

        // The claim keeps other conditional borrowers out, so the counter
        // read and write below cannot interleave with theirs.
        let borrow_count = self.next_borrow_count(book_id)?;
        self.store.update(
            Book::COLLECTION,
            book_id.as_str(),
            Book::borrow_count_fields(borrow_count),
        )?;

        Ok(record)
    }

    /// Closes a specific borrow record and marks its book available.
    ///
    /// Under [`WritePolicy::Unguarded`] the record is not re-checked: closing
    /// an already returned record overwrites its return date.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Store`] - a store call failed. A record closed
    ///   before the failure stays closed while its book stays unavailable.
    /// - [`LedgerError::AlreadyReturned`] - conditional writes only: the
    ///   record was not outstanding. Nothing was written.
    pub fn return_book(&self, book_id: &BookId, borrow_id: &BorrowId) -> Result<(), LedgerError> {
        let closed = self.close_record(borrow_id, self.now())?;
        if !closed {
            return Err(LedgerError::AlreadyReturned(borrow_id.clone()));
        }

        self.store.update(
            Book::COLLECTION,
            book_id.as_str(),
            Book::availability_fields(true),
        )?;
        Ok(())
    }

    /// Marks a book available, then closes its newest outstanding record.
    ///
    /// Used when the caller knows the book but not the borrow. The book
    /// flips first so it can be lent again right away even if closing the
    /// record fails afterwards.
    ///
    /// With conditional writes, records opened after the book flipped belong
    /// to a new borrower and are never closed here.
    ///
    /// Returns the closed record, or `None` when the book had no outstanding
    /// record (or, with conditional writes, when it was closed concurrently).
    pub fn return_most_recent(&self, book_id: &BookId) -> Result<Option<BorrowRecord>, LedgerError> {
        let now = self.now();
        self.store.update(
            Book::COLLECTION,
            book_id.as_str(),
            Book::availability_fields(true),
        )?;

        let query = Self::outstanding_query(book_id)
            .order_by(BorrowRecord::BORROW_DATE, Direction::Descending);
        let candidate = match self.config.write_policy {
            WritePolicy::Unguarded => self
                .store
                .query(BorrowRecord::COLLECTION, &query.limit(1))?
                .first()
                .map(decode_record)
                .transpose()?,
            WritePolicy::Conditional => self
                .store
                .query(BorrowRecord::COLLECTION, &query)?
                .iter()
                .map(decode_record)
                .find(|record| match record {
                    Ok(record) => record.borrow_date <= now,
                    Err(_) => true,
                })
                .transpose()?,
        };
        let Some(mut record) = candidate else {
            return Ok(None);
        };

        if !self.close_record(&record.id, now)? {
            return Ok(None);
        }

        record.status = BorrowStatus::Returned;
        record.return_date = Some(now);
        Ok(Some(record))
    }

    /// Number of outstanding borrow records of a book.
    ///
    /// Under [`WritePolicy::Unguarded`] this can exceed one when two
    /// borrowers raced on the same book.
    pub fn borrow_count(&self, book_id: &BookId) -> Result<u64, LedgerError> {
        let outstanding = self
            .store
            .query(BorrowRecord::COLLECTION, &Self::outstanding_query(book_id))?;
        Ok(outstanding.len() as u64)
    }

    pub fn get_borrow(&self, borrow_id: &BorrowId) -> Result<Option<BorrowRecord>, LedgerError> {
        self.store
            .get(BorrowRecord::COLLECTION, borrow_id.as_str())?
            .as_ref()
            .map(decode_record)
            .transpose()
    }

    /// Outstanding borrows of a user, newest first.
    pub fn outstanding_for_user(&self, user_id: &UserId) -> Result<Vec<BorrowRecord>, LedgerError> {
        let query = Query::new()
            .filter(BorrowRecord::USER_ID, user_id.as_str())
            .filter(BorrowRecord::STATUS, BorrowStatus::Borrowed.as_str())
            .order_by(BorrowRecord::BORROW_DATE, Direction::Descending);
        self.fetch(&query)
    }

    /// Every borrow of a book, returned or not, newest first.
    pub fn history_for_book(&self, book_id: &BookId) -> Result<Vec<BorrowRecord>, LedgerError> {
        let query = Query::new()
            .filter(BorrowRecord::BOOK_ID, book_id.as_str())
            .order_by(BorrowRecord::BORROW_DATE, Direction::Descending);
        self.fetch(&query)
    }

    fn open_record(&self, book_id: &BookId, user_id: &UserId) -> Result<BorrowRecord, LedgerError> {
        let now = self.now();
        let id = self.store.insert(
            BorrowRecord::COLLECTION,
            BorrowRecord::open_fields(book_id, user_id, now),
        )?;

        Ok(BorrowRecord {
            id: BorrowId(id),
            book_id: book_id.clone(),
            user_id: user_id.clone(),
            borrow_date: now,
            return_date: None,
            status: BorrowStatus::Borrowed,
        })
    }

    /// Writes the returned state. `false` means a conditional write found the
    /// record no longer outstanding.
    fn close_record(&self, borrow_id: &BorrowId, now: DateTime<Utc>) -> Result<bool, LedgerError> {
        let fields = BorrowRecord::close_fields(now);
        match self.config.write_policy {
            WritePolicy::Unguarded => {
                self.store
                    .update(BorrowRecord::COLLECTION, borrow_id.as_str(), fields)?;
                Ok(true)
            }
            WritePolicy::Conditional => Ok(self.store.update_if(
                BorrowRecord::COLLECTION,
                borrow_id.as_str(),
                &[Filter::eq(
                    BorrowRecord::STATUS,
                    BorrowStatus::Borrowed.as_str(),
                )],
                fields,
            )?),
        }
    }

    /// Counter value to store for a borrow whose record is already written.
    fn next_borrow_count(&self, book_id: &BookId) -> Result<u64, LedgerError> {
        match self.config.count_policy {
            CountPolicy::Cumulative => {
                let book = self
                    .store
                    .get(Book::COLLECTION, book_id.as_str())?
                    .ok_or_else(|| StoreError::NotFound {
                        collection: Book::COLLECTION.to_owned(),
                        id: book_id.to_string(),
                    })?;
                let stored = Book::stored_borrow_count(&book).map_err(LedgerError::Decode)?;
                Ok(stored + 1)
            }
            CountPolicy::Outstanding => Ok(self.borrow_count(book_id)? + 1),
            CountPolicy::Historical => {
                let query = Query::new().filter(BorrowRecord::BOOK_ID, book_id.as_str());
                let records = self.store.query(BorrowRecord::COLLECTION, &query)?;
                Ok(records.len() as u64)
            }
        }
    }

    fn outstanding_query(book_id: &BookId) -> Query {
        Query::new()
            .filter(BorrowRecord::BOOK_ID, book_id.as_str())
            .filter(BorrowRecord::STATUS, BorrowStatus::Borrowed.as_str())
    }

    fn fetch(&self, query: &Query) -> Result<Vec<BorrowRecord>, LedgerError> {
        self.store
            .query(BorrowRecord::COLLECTION, query)?
            .iter()
            .map(decode_record)
            .collect()
    }

    fn now(&self) -> DateTime<Utc> {
        clock::stored_now(self.clock.as_ref())
    }
}

fn decode_record(document: &Document) -> Result<BorrowRecord, LedgerError> {
    BorrowRecord::from_document(document).map_err(|e| LedgerError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, Operation};
    use serde_json::json;

    fn seed_book(store: &MemoryStore, borrow_count: Option<u64>) -> BookId {
        let mut fields = crate::document::to_fields(&json!({
            "title": "Dune",
            "author": "Frank Herbert",
            "isbn": "9780441013593",
            "category": "Science Fiction",
            "available": true
        }))
        .unwrap();
        if let Some(count) = borrow_count {
            fields.extend(Book::borrow_count_fields(count));
        }
        BookId(store.insert(Book::COLLECTION, fields).unwrap())
    }

    #[test]
    fn unguarded_borrow_issues_two_writes_around_one_read() {
        let store = Arc::new(MemoryStore::new());
        let book = seed_book(&store, Some(3));
        store.take_journal();
        let ledger = Ledger::new(Arc::clone(&store));

        ledger.borrow_book(&book, &UserId::from("U1")).unwrap();

        let ops: Vec<_> = store
            .take_journal()
            .into_iter()
            .map(|op| (op.operation, op.collection))
            .collect();
        assert_eq!(
            ops,
            vec![
                (Operation::Insert, "borrows".to_string()),
                (Operation::Get, "books".to_string()),
                (Operation::Update, "books".to_string()),
            ]
        );
    }

    #[test]
    fn outstanding_policy_issues_a_query() {
        let store = Arc::new(MemoryStore::new());
        let book = seed_book(&store, None);
        store.take_journal();
        let config = LedgerConfig::new(WritePolicy::Unguarded, CountPolicy::Outstanding);
        let ledger = Ledger::with_config(Arc::clone(&store), config);

        ledger.borrow_book(&book, &UserId::from("U1")).unwrap();

        let ops: Vec<_> = store.take_journal().into_iter().map(|op| op.operation).collect();
        assert_eq!(ops, vec![Operation::Insert, Operation::Query, Operation::Update]);
    }

    #[test]
    fn conditional_release_on_insert_failure() {
        let store = Arc::new(MemoryStore::new());
        let book = seed_book(&store, Some(0));
        let config = LedgerConfig::new(WritePolicy::Conditional, CountPolicy::Cumulative);
        let ledger = Ledger::with_config(Arc::clone(&store), config);
        store.fail_next(Operation::Insert, BorrowRecord::COLLECTION);

        let result = ledger.borrow_book(&book, &UserId::from("U1"));

        assert!(matches!(result, Err(LedgerError::Store(StoreError::Unavailable(_)))));
        let doc = store.get(Book::COLLECTION, book.as_str()).unwrap().unwrap();
        assert_eq!(doc.get(Book::AVAILABLE), Some(&json!(true)));
        assert_eq!(store.count(BorrowRecord::COLLECTION), 0);
    }

    #[test]
    fn cumulative_count_on_missing_book_is_not_found() {
        let store = MemoryStore::new();
        let ledger = Ledger::new(store);

        let result = ledger.borrow_book(&BookId::from("ghost"), &UserId::from("U1"));

        assert_eq!(
            result.unwrap_err(),
            LedgerError::Store(StoreError::NotFound {
                collection: "books".into(),
                id: "ghost".into()
            })
        );
        // The record insert already happened.
        assert_eq!(ledger.store().count(BorrowRecord::COLLECTION), 1);
    }

    #[test]
    fn malformed_record_surfaces_as_decode_error() {
        let store = MemoryStore::new();
        let id = store
            .insert(
                BorrowRecord::COLLECTION,
                crate::document::to_fields(&json!({"bookId": "B1", "status": "borrowed"})).unwrap(),
            )
            .unwrap();
        let ledger = Ledger::new(store);

        let result = ledger.get_borrow(&BorrowId(id));
        assert!(matches!(result, Err(LedgerError::Decode(_))));
    }
}
