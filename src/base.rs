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

//! Core identifier types for books, users and borrow records.
//!
//! Identifiers are opaque strings. Book and borrow ids are assigned by the
//! document store; user ids come from the caller.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! document_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

document_id!(
    /// Identifier of a document in the `books` collection.
    BookId
);

document_id!(
    /// Identifier of a library user. Never resolved by the ledger.
    UserId
);

document_id!(
    /// Identifier of a document in the `borrows` collection.
    BorrowId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_display_their_inner_value() {
        assert_eq!(BookId::from("B1").to_string(), "B1");
        assert_eq!(UserId::from("U1".to_string()).as_str(), "U1");
    }

    #[test]
    fn ids_serialize_transparently() {
        let json = serde_json::to_string(&BorrowId::from("R1")).unwrap();
        assert_eq!(json, "\"R1\"");
    }
}
