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

//! Catalog-wide borrowing statistics.

use crate::book::Book;
use crate::catalog::Catalog;
use crate::error::CatalogError;
use crate::store::DocumentStore;
use serde::Serialize;

/// Availability totals plus the most borrowed books.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LibraryReport {
    pub total_books: usize,
    pub available_books: usize,
    pub unavailable_books: usize,
    /// Books with a recorded `borrowCount`, highest first.
    pub top_borrowed: Vec<Book>,
}

impl LibraryReport {
    /// Length of [`top_borrowed`](Self::top_borrowed).
    pub const TOP_BORROWED: usize = 5;

    pub fn from_books(books: &[Book]) -> Self {
        let available_books = books.iter().filter(|book| book.available).count();

        let mut ranked: Vec<Book> = books
            .iter()
            .filter(|book| book.borrow_count.is_some())
            .cloned()
            .collect();
        // Stable: equal counts keep catalog order.
        ranked.sort_by(|a, b| b.borrow_count.cmp(&a.borrow_count));
        ranked.truncate(Self::TOP_BORROWED);

        Self {
            total_books: books.len(),
            available_books,
            unavailable_books: books.len() - available_books,
            top_borrowed: ranked,
        }
    }

    /// Builds the report from the current catalog contents.
    pub fn generate<S: DocumentStore>(catalog: &Catalog<S>) -> Result<Self, CatalogError> {
        Ok(Self::from_books(&catalog.list_books()?))
    }
}
