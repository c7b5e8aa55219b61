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

//! Schemaless documents and the query model understood by a document store.
//!
//! A document is a flat JSON object keyed by field name. Queries are a
//! conjunction of equality filters with an optional single-field ordering
//! and an optional limit.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::cmp::Ordering;

/// Field map of a stored document.
pub type Fields = serde_json::Map<String, Value>;

/// A document as returned by a store: its generated id plus its fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Decodes the document fields into a typed view.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(Value::Object(self.fields.clone()))
    }
}

/// Encodes a serializable struct as document fields.
///
/// Fails if `value` does not serialize to a JSON object.
pub fn to_fields<T: Serialize>(value: &T) -> Result<Fields, serde_json::Error> {
    match serde_json::to_value(value)? {
        Value::Object(fields) => Ok(fields),
        other => Err(serde::ser::Error::custom(format!(
            "expected an object, got {other}"
        ))),
    }
}

/// Equality predicate on a single field.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub value: Value,
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn matches(&self, fields: &Fields) -> bool {
        fields.get(&self.field) == Some(&self.value)
    }
}

/// Sort direction of an ordered query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

/// Filtered, optionally ordered and limited read of one collection.
///
/// # Example
///
/// ```
/// use borrow_ledger_rs::{Direction, Query};
///
/// let query = Query::new()
///     .filter("bookId", "B1")
///     .filter("status", "borrowed")
///     .order_by("borrowDate", Direction::Descending)
///     .limit(1);
/// assert_eq!(query.filters.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::eq(field, value));
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, fields: &Fields) -> bool {
        self.filters.iter().all(|filter| filter.matches(fields))
    }

    /// Evaluates the query over documents given in their natural order.
    ///
    /// Documents lacking the order-by field are excluded, as hosted
    /// document databases do. The sort is stable, so ties keep their
    /// natural order.
    pub fn apply(&self, documents: impl IntoIterator<Item = Document>) -> Vec<Document> {
        let mut matched: Vec<Document> = documents
            .into_iter()
            .filter(|doc| self.matches(&doc.fields))
            .collect();

        if let Some(order) = &self.order_by {
            matched.retain(|doc| doc.fields.contains_key(&order.field));
            matched.sort_by(|a, b| {
                let ordering = compare_values(&a.fields[&order.field], &b.fields[&order.field]);
                match order.direction {
                    Direction::Ascending => ordering,
                    Direction::Descending => ordering.reverse(),
                }
            });
        }

        if let Some(limit) = self.limit {
            matched.truncate(limit);
        }
        matched
    }
}

/// Total order over field values: null < bool < number < string < other.
fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(value: &Value) -> u8 {
        match value {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => {
                let x = x.as_f64().unwrap_or(f64::NAN);
                let y = y.as_f64().unwrap_or(f64::NAN);
                x.partial_cmp(&y).unwrap_or(Ordering::Equal)
            }
        },
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(id: &str, value: Value) -> Document {
        match value {
            Value::Object(fields) => Document::new(id, fields),
            _ => panic!("test documents must be objects"),
        }
    }

    #[test]
    fn filters_are_conjunctive() {
        let docs = vec![
            doc("a", json!({"bookId": "B1", "status": "borrowed"})),
            doc("b", json!({"bookId": "B1", "status": "returned"})),
            doc("c", json!({"bookId": "B2", "status": "borrowed"})),
        ];
        let query = Query::new().filter("bookId", "B1").filter("status", "borrowed");

        let ids: Vec<_> = query.apply(docs).into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["a"]);
    }

    #[test]
    fn descending_order_with_limit() {
        let docs = vec![
            doc("old", json!({"borrowDate": 10})),
            doc("new", json!({"borrowDate": 30})),
            doc("mid", json!({"borrowDate": 20})),
        ];
        let query = Query::new()
            .order_by("borrowDate", Direction::Descending)
            .limit(2);

        let ids: Vec<_> = query.apply(docs).into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["new", "mid"]);
    }

    #[test]
    fn ordering_drops_documents_without_the_field() {
        let docs = vec![
            doc("dated", json!({"borrowDate": 1})),
            doc("undated", json!({"status": "borrowed"})),
        ];
        let query = Query::new().order_by("borrowDate", Direction::Ascending);

        assert_eq!(query.apply(docs).len(), 1);
    }

    #[test]
    fn ties_keep_natural_order() {
        let docs = vec![
            doc("first", json!({"n": 1})),
            doc("second", json!({"n": 1})),
        ];
        let query = Query::new().order_by("n", Direction::Descending);

        let ids: Vec<_> = query.apply(docs).into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["first", "second"]);
    }

    #[test]
    fn to_fields_rejects_non_objects() {
        assert!(to_fields(&42).is_err());
        let fields = to_fields(&json!({"available": true})).unwrap();
        assert_eq!(fields["available"], json!(true));
    }

    #[test]
    fn mixed_types_order_by_rank() {
        assert_eq!(compare_values(&json!(null), &json!(false)), Ordering::Less);
        assert_eq!(compare_values(&json!(5), &json!("5")), Ordering::Less);
        assert_eq!(compare_values(&json!(2.5), &json!(2)), Ordering::Greater);
    }
}
