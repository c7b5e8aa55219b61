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

//! Book catalog: create, read, update and delete books.

use crate::base::BookId;
use crate::book::Book;
use crate::clock::{self, Clock, SystemClock};
use crate::document::{Document, Fields, Query};
use crate::error::{CatalogError, StoreError};
use crate::store::DocumentStore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Input for [`Catalog::create_book`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub category: String,
    /// Defaults to `true`.
    #[serde(default)]
    pub available: Option<bool>,
}

/// Partial update of a book. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BookPatch {
    pub title: Option<String>,
    pub author: Option<String>,
    pub isbn: Option<String>,
    pub category: Option<String>,
    pub available: Option<bool>,
}

impl BookPatch {
    fn into_fields(self) -> Fields {
        let mut fields = Fields::new();
        let text = [
            ("title", self.title),
            ("author", self.author),
            (Book::ISBN, self.isbn),
            ("category", self.category),
        ];
        for (name, value) in text {
            if let Some(value) = value {
                fields.insert(name.into(), Value::String(value));
            }
        }
        if let Some(available) = self.available {
            fields.extend(Book::availability_fields(available));
        }
        fields
    }
}

pub struct Catalog<S> {
    store: S,
    clock: Arc<dyn Clock>,
}

impl<S: DocumentStore> Catalog<S> {
    pub fn new(store: S) -> Self {
        Catalog {
            store,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Adds a book and returns its generated id. `createdAt` is stamped now.
    pub fn create_book(&self, book: NewBook) -> Result<BookId, CatalogError> {
        let mut fields = Fields::new();
        fields.insert("title".into(), Value::String(book.title));
        fields.insert("author".into(), Value::String(book.author));
        fields.insert(Book::ISBN.into(), Value::String(book.isbn));
        fields.insert("category".into(), Value::String(book.category));
        fields.extend(Book::availability_fields(book.available.unwrap_or(true)));
        fields.insert(
            Book::CREATED_AT.into(),
            Value::from(clock::stored_now(self.clock.as_ref()).timestamp_micros()),
        );

        let id = self.store.insert(Book::COLLECTION, fields)?;
        tracing::debug!(book = %id, "book created");
        Ok(BookId(id))
    }

    pub fn get_book(&self, id: &BookId) -> Result<Option<Book>, CatalogError> {
        self.store
            .get(Book::COLLECTION, id.as_str())?
            .as_ref()
            .map(decode_book)
            .transpose()
    }

    /// All books in creation order.
    pub fn list_books(&self) -> Result<Vec<Book>, CatalogError> {
        self.fetch(&Query::new())
    }

    /// Books with the given ISBN, in creation order.
    pub fn find_by_isbn(&self, isbn: &str) -> Result<Vec<Book>, CatalogError> {
        self.fetch(&Query::new().filter(Book::ISBN, isbn))
    }

    /// # Errors
    ///
    /// [`CatalogError::BookNotFound`] if there is no such book.
    pub fn update_book(&self, id: &BookId, patch: BookPatch) -> Result<(), CatalogError> {
        self.store
            .update(Book::COLLECTION, id.as_str(), patch.into_fields())
            .map_err(|e| not_found_as_missing_book(e, id))
    }

    /// Removes a book. Its borrow records are left in place.
    ///
    /// # Errors
    ///
    /// [`CatalogError::BookNotFound`] if there is no such book.
    pub fn delete_book(&self, id: &BookId) -> Result<(), CatalogError> {
        self.store
            .delete(Book::COLLECTION, id.as_str())
            .map_err(|e| not_found_as_missing_book(e, id))?;
        tracing::debug!(book = %id, "book deleted");
        Ok(())
    }

    fn fetch(&self, query: &Query) -> Result<Vec<Book>, CatalogError> {
        self.store
            .query(Book::COLLECTION, query)?
            .iter()
            .map(decode_book)
            .collect()
    }
}

fn decode_book(document: &Document) -> Result<Book, CatalogError> {
    Book::from_document(document).map_err(|e| CatalogError::Decode(e.to_string()))
}

fn not_found_as_missing_book(error: StoreError, id: &BookId) -> CatalogError {
    match error {
        StoreError::NotFound { .. } => CatalogError::BookNotFound(id.clone()),
        other => CatalogError::Store(other),
    }
}
