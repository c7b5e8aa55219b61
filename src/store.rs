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

//! The document store contract and its in-process implementation.
//!
//! [`DocumentStore`] is the only way the ledger and the catalog touch
//! persistent state. Every call is an independent operation: there are no
//! multi-document transactions, and the only atomic read-modify-write is
//! [`DocumentStore::update_if`] on a single document.

use crate::document::{Document, Fields, Filter, Query};
use crate::error::StoreError;
use crossbeam::queue::SegQueue;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Collection-oriented document database.
pub trait DocumentStore: Send + Sync {
    /// Stores a new document and returns its generated id.
    fn insert(&self, collection: &str, fields: Fields) -> Result<String, StoreError>;

    /// Merges `fields` into an existing document.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] if the document does not exist.
    fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<(), StoreError>;

    /// Merges `fields` into an existing document only if every precondition
    /// holds on its current fields, atomically with respect to other writes
    /// to the same document. Returns whether the write was applied.
    fn update_if(
        &self,
        collection: &str,
        id: &str,
        preconditions: &[Filter],
        fields: Fields,
    ) -> Result<bool, StoreError>;

    fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;

    fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>, StoreError>;

    /// Removes a document.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] if the document does not exist.
    fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError>;
}

impl<S: DocumentStore + ?Sized> DocumentStore for Arc<S> {
    fn insert(&self, collection: &str, fields: Fields) -> Result<String, StoreError> {
        (**self).insert(collection, fields)
    }

    fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<(), StoreError> {
        (**self).update(collection, id, fields)
    }

    fn update_if(
        &self,
        collection: &str,
        id: &str,
        preconditions: &[Filter],
        fields: Fields,
    ) -> Result<bool, StoreError> {
        (**self).update_if(collection, id, preconditions, fields)
    }

    fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        (**self).get(collection, id)
    }

    fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>, StoreError> {
        (**self).query(collection, query)
    }

    fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        (**self).delete(collection, id)
    }
}

/// Kind of store call, used by the journal and by failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Insert,
    /// Plain and conditional updates.
    Update,
    Get,
    Query,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Insert => "insert",
            Operation::Update => "update",
            Operation::Get => "get",
            Operation::Query => "query",
            Operation::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// One completed store call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOp {
    pub operation: Operation,
    pub collection: String,
    /// Target document, absent for queries.
    pub id: Option<String>,
}

#[derive(Debug)]
struct StoredDocument {
    /// Insertion sequence, the natural order of query results.
    seq: u64,
    fields: Fields,
}

#[derive(Debug)]
struct FailPoint {
    operation: Operation,
    collection: String,
}

/// In-memory [`DocumentStore`] with last-write-wins documents.
///
/// Besides serving the contract, the store keeps a journal of completed
/// calls ([`take_journal`](Self::take_journal)) and can be armed to fail a
/// future call ([`fail_next`](Self::fail_next)), which is how partial
/// failures of multi-step operations are reproduced.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: DashMap<String, DashMap<String, StoredDocument>>,
    sequence: AtomicU64,
    journal: SegQueue<StoreOp>,
    fail_points: Mutex<Vec<FailPoint>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms a one-shot failure: the next `operation` on `collection` returns
    /// [`StoreError::Unavailable`] without touching any document.
    pub fn fail_next(&self, operation: Operation, collection: &str) {
        self.fail_points.lock().push(FailPoint {
            operation,
            collection: collection.to_owned(),
        });
    }

    /// Drains the journal of completed calls, oldest first.
    pub fn take_journal(&self) -> Vec<StoreOp> {
        let mut ops = Vec::with_capacity(self.journal.len());
        while let Some(op) = self.journal.pop() {
            ops.push(op);
        }
        ops
    }

    /// Number of documents in a collection.
    pub fn count(&self, collection: &str) -> usize {
        self.collections
            .get(collection)
            .map(|documents| documents.len())
            .unwrap_or(0)
    }

    fn check_fail_point(&self, operation: Operation, collection: &str) -> Result<(), StoreError> {
        let mut fail_points = self.fail_points.lock();
        let armed = fail_points
            .iter()
            .position(|p| p.operation == operation && p.collection == collection);
        match armed {
            Some(index) => {
                fail_points.remove(index);
                tracing::debug!(%operation, collection, "injected store failure");
                Err(StoreError::Unavailable(format!(
                    "injected {operation} failure on {collection}"
                )))
            }
            None => Ok(()),
        }
    }

    fn record(&self, operation: Operation, collection: &str, id: Option<&str>) {
        self.journal.push(StoreOp {
            operation,
            collection: collection.to_owned(),
            id: id.map(str::to_owned),
        });
    }

    fn not_found(collection: &str, id: &str) -> StoreError {
        StoreError::NotFound {
            collection: collection.to_owned(),
            id: id.to_owned(),
        }
    }
}

impl DocumentStore for MemoryStore {
    fn insert(&self, collection: &str, fields: Fields) -> Result<String, StoreError> {
        self.check_fail_point(Operation::Insert, collection)?;

        let id = Uuid::new_v4().simple().to_string();
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        self.collections
            .entry(collection.to_owned())
            .or_default()
            .insert(id.clone(), StoredDocument { seq, fields });

        tracing::trace!(collection, id = %id, "insert");
        self.record(Operation::Insert, collection, Some(&id));
        Ok(id)
    }

    fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<(), StoreError> {
        self.check_fail_point(Operation::Update, collection)?;

        {
            let documents = self
                .collections
                .get(collection)
                .ok_or_else(|| Self::not_found(collection, id))?;
            let mut document = documents
                .get_mut(id)
                .ok_or_else(|| Self::not_found(collection, id))?;
            document.fields.extend(fields);
        }

        tracing::trace!(collection, id, "update");
        self.record(Operation::Update, collection, Some(id));
        Ok(())
    }

    fn update_if(
        &self,
        collection: &str,
        id: &str,
        preconditions: &[Filter],
        fields: Fields,
    ) -> Result<bool, StoreError> {
        self.check_fail_point(Operation::Update, collection)?;

        let applied = {
            let documents = self
                .collections
                .get(collection)
                .ok_or_else(|| Self::not_found(collection, id))?;
            // The shard write lock is held from the check through the merge.
            let mut document = documents
                .get_mut(id)
                .ok_or_else(|| Self::not_found(collection, id))?;
            let holds = preconditions.iter().all(|p| p.matches(&document.fields));
            if holds {
                document.fields.extend(fields);
            }
            holds
        };

        tracing::trace!(collection, id, applied, "conditional update");
        self.record(Operation::Update, collection, Some(id));
        Ok(applied)
    }

    fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        self.check_fail_point(Operation::Get, collection)?;

        let document = self.collections.get(collection).and_then(|documents| {
            documents
                .get(id)
                .map(|stored| Document::new(id, stored.fields.clone()))
        });

        tracing::trace!(collection, id, found = document.is_some(), "get");
        self.record(Operation::Get, collection, Some(id));
        Ok(document)
    }

    fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>, StoreError> {
        self.check_fail_point(Operation::Query, collection)?;

        let mut snapshot: Vec<(u64, Document)> = match self.collections.get(collection) {
            Some(documents) => documents
                .iter()
                .filter(|entry| query.matches(&entry.value().fields))
                .map(|entry| {
                    let stored = entry.value();
                    (stored.seq, Document::new(entry.key().clone(), stored.fields.clone()))
                })
                .collect(),
            None => Vec::new(),
        };
        snapshot.sort_by_key(|(seq, _)| *seq);
        let results = query.apply(snapshot.into_iter().map(|(_, doc)| doc));

        tracing::trace!(collection, matched = results.len(), "query");
        self.record(Operation::Query, collection, None);
        Ok(results)
    }

    fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        self.check_fail_point(Operation::Delete, collection)?;

        self.collections
            .get(collection)
            .and_then(|documents| documents.remove(id))
            .ok_or_else(|| Self::not_found(collection, id))?;

        tracing::trace!(collection, id, "delete");
        self.record(Operation::Delete, collection, Some(id));
        Ok(())
    }
}
