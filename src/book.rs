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

//! Books as stored in the `books` collection.

use crate::base::BookId;
use crate::document::{Document, Fields};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// A catalog entry.
///
/// `borrow_count` stays `None` until the book is borrowed for the first
/// time; reports skip such books when ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Book {
    pub id: BookId,
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub category: String,
    pub available: bool,
    pub borrow_count: Option<u64>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredBook {
    title: String,
    author: String,
    isbn: String,
    category: String,
    #[serde(default)]
    available: bool,
    #[serde(default, deserialize_with = "deserialize_borrow_count")]
    borrow_count: Option<u64>,
    #[serde(default, with = "chrono::serde::ts_microseconds_option")]
    created_at: Option<DateTime<Utc>>,
}

impl Book {
    pub const COLLECTION: &'static str = "books";

    pub const AVAILABLE: &'static str = "available";
    pub const BORROW_COUNT: &'static str = "borrowCount";
    pub const ISBN: &'static str = "isbn";
    pub const CREATED_AT: &'static str = "createdAt";

    pub fn from_document(document: &Document) -> Result<Self, serde_json::Error> {
        let stored: StoredBook = document.decode()?;
        Ok(Self {
            id: BookId(document.id.clone()),
            title: stored.title,
            author: stored.author,
            isbn: stored.isbn,
            category: stored.category,
            available: stored.available,
            borrow_count: stored.borrow_count,
            created_at: stored.created_at,
        })
    }

    /// Partial update setting only the availability flag.
    pub(crate) fn availability_fields(available: bool) -> Fields {
        let mut fields = Fields::new();
        fields.insert(Self::AVAILABLE.into(), Value::Bool(available));
        fields
    }

    pub(crate) fn borrow_count_fields(borrow_count: u64) -> Fields {
        let mut fields = Fields::new();
        fields.insert(Self::BORROW_COUNT.into(), Value::from(borrow_count));
        fields
    }

    /// Stored `borrowCount` of a raw book document, zero when absent or null.
    ///
    /// Fails when the field holds anything but a non-negative whole number.
    pub(crate) fn stored_borrow_count(document: &Document) -> Result<u64, String> {
        match document.get(Self::BORROW_COUNT) {
            None | Some(Value::Null) => Ok(0),
            Some(value) => borrow_count_from_value(value),
        }
    }
}

/// Reads a counter written by any client. Whole floats such as `3.0` are
/// accepted since JavaScript clients do not distinguish them from integers.
fn borrow_count_from_value(value: &Value) -> Result<u64, String> {
    value
        .as_u64()
        .or_else(|| {
            value
                .as_f64()
                .filter(|f| *f >= 0.0 && f.fract() == 0.0 && *f <= u64::MAX as f64)
                .map(|f| f as u64)
        })
        .ok_or_else(|| format!("borrowCount {value} is not a non-negative whole number"))
}

fn deserialize_borrow_count<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(value) => borrow_count_from_value(&value)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn document(value: Value) -> Document {
        Document::new("B1", crate::document::to_fields(&value).unwrap())
    }

    #[test]
    fn decodes_full_book() {
        let book = Book::from_document(&document(json!({
            "title": "Dune",
            "author": "Frank Herbert",
            "isbn": "9780441013593",
            "category": "Science Fiction",
            "available": false,
            "borrowCount": 4,
            "createdAt": 1_000_000
        })))
        .unwrap();

        assert_eq!(book.id, BookId::from("B1"));
        assert!(!book.available);
        assert_eq!(book.borrow_count, Some(4));
        assert_eq!(book.created_at.map(|t| t.timestamp()), Some(1));
    }

    #[test]
    fn optional_fields_default() {
        let book = Book::from_document(&document(json!({
            "title": "Dune",
            "author": "Frank Herbert",
            "isbn": "9780441013593",
            "category": "Science Fiction"
        })))
        .unwrap();

        assert!(!book.available);
        assert_eq!(book.borrow_count, None);
        assert_eq!(book.created_at, None);
    }

    #[test]
    fn missing_title_is_rejected() {
        let result = Book::from_document(&document(json!({"author": "Anonymous"})));
        assert!(result.is_err());
    }

    #[test]
    fn stored_borrow_count_reads_raw_field() {
        assert_eq!(Book::stored_borrow_count(&document(json!({"borrowCount": 3}))), Ok(3));
        assert_eq!(Book::stored_borrow_count(&document(json!({}))), Ok(0));
        assert_eq!(Book::stored_borrow_count(&document(json!({"borrowCount": null}))), Ok(0));
    }

    #[test]
    fn stored_borrow_count_accepts_whole_floats() {
        assert_eq!(Book::stored_borrow_count(&document(json!({"borrowCount": 3.0}))), Ok(3));
    }

    #[test]
    fn stored_borrow_count_rejects_unreadable_values() {
        for bad in [json!(-1), json!(2.5), json!("3"), json!(true)] {
            let result = Book::stored_borrow_count(&document(json!({"borrowCount": bad})));
            assert!(result.is_err(), "accepted {bad}");
        }
    }

    #[test]
    fn decoding_agrees_with_raw_counter() {
        let book = Book::from_document(&document(json!({
            "title": "Dune",
            "author": "Frank Herbert",
            "isbn": "9780441013593",
            "category": "Science Fiction",
            "borrowCount": 3.0
        })))
        .unwrap();
        assert_eq!(book.borrow_count, Some(3));

        let negative = Book::from_document(&document(json!({
            "title": "Dune",
            "author": "Frank Herbert",
            "isbn": "9780441013593",
            "category": "Science Fiction",
            "borrowCount": -1
        })));
        assert!(negative.is_err());
    }
}
