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

use borrow_ledger_rs::{
    BookId, BorrowId, Catalog, CatalogError, CountPolicy, DocumentStore, Ledger, LedgerConfig,
    LedgerError, LibraryReport, MemoryStore, NewBook, UserId, WritePolicy,
};
use clap::Parser;
use csv::{ReaderBuilder, Trim, Writer};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use thiserror::Error;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Borrow Ledger - Replay library borrow/return events
///
/// Loads a catalog CSV into an in-memory document store, replays an events
/// CSV through the borrow ledger and writes the resulting book states to
/// stdout.
#[derive(Parser, Debug)]
#[command(name = "borrow-ledger-rs")]
#[command(about = "Replays borrow/return events against a book catalog", long_about = None)]
struct Args {
    /// Path to the catalog CSV
    ///
    /// Expected format: title,author,isbn,category[,available]
    #[arg(long, value_name = "FILE")]
    catalog: PathBuf,

    /// Path to the events CSV
    ///
    /// Expected format: type,isbn,user
    /// Types: borrow, return, return_latest
    #[arg(value_name = "FILE")]
    events: PathBuf,

    /// How book and borrow documents are written
    #[arg(long, value_enum, default_value_t = WritePolicy::Unguarded)]
    write_policy: WritePolicy,

    /// How a book's borrow counter is derived on each borrow
    #[arg(long, value_enum, default_value_t = CountPolicy::Cumulative)]
    count_policy: CountPolicy,

    /// Print the library report as JSON instead of the book CSV
    #[arg(long)]
    report: bool,
}

#[derive(Error, Debug)]
enum AppError {
    #[error("cannot open '{path}': {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    if let Err(e) = run(&args) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), AppError> {
    let store = Arc::new(MemoryStore::new());
    let catalog = Catalog::new(Arc::clone(&store));
    let config = LedgerConfig::new(args.write_policy, args.count_policy);
    let ledger = Ledger::with_config(Arc::clone(&store), config);

    let loaded = load_catalog(open(&args.catalog)?, &catalog)?;
    tracing::info!(books = loaded, "catalog loaded");

    let stats = replay_events(open(&args.events)?, &catalog, &ledger)?;
    tracing::info!(applied = stats.applied, skipped = stats.skipped, "events replayed");

    let stdout = std::io::stdout();
    if args.report {
        let report = LibraryReport::generate(&catalog)?;
        serde_json::to_writer_pretty(stdout.lock(), &report)?;
        println!();
    } else {
        write_books(&catalog, stdout.lock())?;
    }
    Ok(())
}

fn open(path: &Path) -> Result<BufReader<File>, AppError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| AppError::Open {
            path: path.to_path_buf(),
            source,
        })
}

/// Raw catalog CSV record.
#[derive(Debug, Deserialize)]
struct CatalogRecord {
    title: String,
    author: String,
    isbn: String,
    category: String,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    available: Option<bool>,
}

/// Loads catalog rows as new books. Malformed rows are skipped.
///
/// Returns the number of books created.
fn load_catalog<R: Read, S: DocumentStore>(
    reader: R,
    catalog: &Catalog<S>,
) -> Result<usize, AppError> {
    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);

    let mut created = 0;
    for result in rdr.deserialize::<CatalogRecord>() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed catalog row");
                continue;
            }
        };
        catalog.create_book(NewBook {
            title: record.title,
            author: record.author,
            isbn: record.isbn,
            category: record.category,
            available: record.available,
        })?;
        created += 1;
    }
    Ok(created)
}

/// Raw events CSV record.
///
/// Fields: `type, isbn, user`
#[derive(Debug, Deserialize)]
struct EventRecord {
    #[serde(rename = "type")]
    event_type: String,
    isbn: String,
    #[serde(default)]
    user: Option<String>,
}

#[derive(Debug, Default, PartialEq, Eq)]
struct ReplayStats {
    applied: usize,
    skipped: usize,
}

/// Replays events through the ledger.
///
/// Each event acts like a librarian's tap in the app: a borrow is only
/// attempted on a book the catalog shows as available, and a `return`
/// closes the user's outstanding borrow of that book. Events that cannot be
/// applied are logged and skipped.
///
/// # Errors
///
/// Only a failure to read the CSV or the catalog stops the replay.
fn replay_events<R: Read, S: DocumentStore>(
    reader: R,
    catalog: &Catalog<S>,
    ledger: &Ledger<S>,
) -> Result<ReplayStats, AppError> {
    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);

    let mut stats = ReplayStats::default();
    for result in rdr.deserialize::<EventRecord>() {
        let event = match result {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed event row");
                stats.skipped += 1;
                continue;
            }
        };

        match apply_event(&event, catalog, ledger)? {
            Outcome::Applied => stats.applied += 1,
            Outcome::Skipped(reason) => {
                tracing::warn!(
                    event = %event.event_type,
                    isbn = %event.isbn,
                    reason = %reason,
                    "skipping event"
                );
                stats.skipped += 1;
            }
        }
    }
    Ok(stats)
}

enum Outcome {
    Applied,
    Skipped(String),
}

fn apply_event<S: DocumentStore>(
    event: &EventRecord,
    catalog: &Catalog<S>,
    ledger: &Ledger<S>,
) -> Result<Outcome, AppError> {
    let Some(book) = catalog.find_by_isbn(&event.isbn)?.into_iter().next() else {
        return Ok(Outcome::Skipped("unknown isbn".into()));
    };
    let user = event
        .user
        .as_deref()
        .filter(|user| !user.is_empty())
        .map(UserId::from);

    let result = match (event.event_type.to_lowercase().as_str(), user) {
        ("borrow", Some(user)) => {
            if !book.available {
                return Ok(Outcome::Skipped("book not available".into()));
            }
            ledger.borrow_book(&book.id, &user).map(|_| ())
        }
        ("return", Some(user)) => match outstanding_borrow(ledger, &book.id, &user) {
            Ok(Some(borrow)) => ledger.return_book(&book.id, &borrow),
            Ok(None) => return Ok(Outcome::Skipped("no outstanding borrow for user".into())),
            Err(e) => Err(e),
        },
        ("return_latest", _) => ledger.return_most_recent(&book.id).map(|_| ()),
        ("borrow" | "return", None) => return Ok(Outcome::Skipped("missing user".into())),
        _ => return Ok(Outcome::Skipped("unknown event type".into())),
    };

    Ok(match result {
        Ok(()) => Outcome::Applied,
        Err(e) => Outcome::Skipped(e.to_string()),
    })
}

fn outstanding_borrow<S: DocumentStore>(
    ledger: &Ledger<S>,
    book_id: &BookId,
    user: &UserId,
) -> Result<Option<BorrowId>, LedgerError> {
    Ok(ledger
        .outstanding_for_user(user)?
        .into_iter()
        .find(|borrow| &borrow.book_id == book_id)
        .map(|borrow| borrow.id))
}

/// Book state CSV row.
#[derive(Debug, Serialize)]
struct BookRow<'a> {
    isbn: &'a str,
    title: &'a str,
    available: bool,
    borrow_count: Option<u64>,
}

/// Writes every book in catalog order.
///
/// # CSV Format
///
/// Columns: `isbn, title, available, borrow_count`
///
/// ```csv
/// isbn,title,available,borrow_count
/// 9780441013593,Dune,false,4
/// 9780547928227,The Hobbit,true,
/// ```
fn write_books<W: Write, S: DocumentStore>(
    catalog: &Catalog<S>,
    writer: W,
) -> Result<(), AppError> {
    let mut wtr = Writer::from_writer(writer);
    for book in catalog.list_books()? {
        wtr.serialize(BookRow {
            isbn: &book.isbn,
            title: &book.title,
            available: book.available,
            borrow_count: book.borrow_count,
        })?;
    }
    wtr.flush().map_err(csv::Error::from)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use borrow_ledger_rs::Operation;
    use std::io::Cursor;

    const CATALOG: &str = "title,author,isbn,category\n\
                           Dune,Frank Herbert,111,Science Fiction\n\
                           The Hobbit,J. R. R. Tolkien,222,Fantasy\n";

    fn library(config: LedgerConfig) -> (Catalog<Arc<MemoryStore>>, Ledger<Arc<MemoryStore>>) {
        let store = Arc::new(MemoryStore::new());
        let catalog = Catalog::new(Arc::clone(&store));
        let ledger = Ledger::with_config(store, config);
        load_catalog(Cursor::new(CATALOG), &catalog).unwrap();
        (catalog, ledger)
    }

    fn book(catalog: &Catalog<Arc<MemoryStore>>, isbn: &str) -> borrow_ledger_rs::Book {
        catalog.find_by_isbn(isbn).unwrap().remove(0)
    }

    #[test]
    fn load_catalog_creates_available_books() {
        let (catalog, _) = library(LedgerConfig::default());

        let books = catalog.list_books().unwrap();
        assert_eq!(books.len(), 2);
        assert!(books.iter().all(|b| b.available));
        assert!(books.iter().all(|b| b.borrow_count.is_none()));
    }

    #[test]
    fn load_catalog_honours_available_column() {
        let store = Arc::new(MemoryStore::new());
        let catalog = Catalog::new(store);
        let csv = "title,author,isbn,category,available\nDune,Frank Herbert,111,SF,false\n";

        load_catalog(Cursor::new(csv), &catalog).unwrap();

        assert!(!book(&catalog, "111").available);
    }

    #[test]
    fn borrow_then_return() {
        let (catalog, ledger) = library(LedgerConfig::default());
        let events = "type,isbn,user\n\
                      borrow,111,U1\n\
                      return,111,U1\n";

        let stats = replay_events(Cursor::new(events), &catalog, &ledger).unwrap();

        assert_eq!(stats, ReplayStats { applied: 2, skipped: 0 });
        let dune = book(&catalog, "111");
        assert!(dune.available);
        assert_eq!(dune.borrow_count, Some(1));
    }

    #[test]
    fn borrow_of_unavailable_book_is_skipped() {
        let (catalog, ledger) = library(LedgerConfig::default());
        let events = "type,isbn,user\n\
                      borrow,111,U1\n\
                      borrow,111,U2\n";

        let stats = replay_events(Cursor::new(events), &catalog, &ledger).unwrap();

        assert_eq!(stats, ReplayStats { applied: 1, skipped: 1 });
        assert_eq!(ledger.borrow_count(&book(&catalog, "111").id).unwrap(), 1);
    }

    #[test]
    fn return_latest_without_user() {
        let (catalog, ledger) = library(LedgerConfig::default());
        let events = "type,isbn,user\n\
                      borrow,222,U1\n\
                      return_latest,222,\n";

        let stats = replay_events(Cursor::new(events), &catalog, &ledger).unwrap();

        assert_eq!(stats.applied, 2);
        let hobbit = book(&catalog, "222");
        assert!(hobbit.available);
        assert_eq!(ledger.borrow_count(&hobbit.id).unwrap(), 0);
    }

    #[test]
    fn return_by_wrong_user_is_skipped() {
        let (catalog, ledger) = library(LedgerConfig::default());
        let events = "type,isbn,user\n\
                      borrow,111,U1\n\
                      return,111,U2\n";

        let stats = replay_events(Cursor::new(events), &catalog, &ledger).unwrap();

        assert_eq!(stats, ReplayStats { applied: 1, skipped: 1 });
        assert!(!book(&catalog, "111").available);
    }

    #[test]
    fn failed_borrow_lookup_is_reported_as_the_store_error() {
        let (catalog, ledger) = library(LedgerConfig::default());
        replay_events(Cursor::new("type,isbn,user\nborrow,111,U1\n"), &catalog, &ledger).unwrap();
        ledger.store().fail_next(Operation::Query, "borrows");
        let event = EventRecord {
            event_type: "return".into(),
            isbn: "111".into(),
            user: Some("U1".into()),
        };

        let outcome = apply_event(&event, &catalog, &ledger).unwrap();

        match outcome {
            Outcome::Skipped(reason) => {
                assert!(reason.contains("injected query failure"), "unexpected reason: {reason}")
            }
            Outcome::Applied => panic!("return applied despite the failed lookup"),
        }
        assert!(!book(&catalog, "111").available);
        assert_eq!(ledger.borrow_count(&book(&catalog, "111").id).unwrap(), 1);
    }

    #[test]
    fn skips_unknown_types_isbns_and_missing_users() {
        let (catalog, ledger) = library(LedgerConfig::default());
        let events = "type,isbn,user\n\
                      renew,111,U1\n\
                      borrow,999,U1\n\
                      borrow,111,\n";

        let stats = replay_events(Cursor::new(events), &catalog, &ledger).unwrap();

        assert_eq!(stats, ReplayStats { applied: 0, skipped: 3 });
    }

    #[test]
    fn parse_with_whitespace() {
        let (catalog, ledger) = library(LedgerConfig::default());
        let events = "type,isbn,user\n Borrow , 111 , U1 \n";

        let stats = replay_events(Cursor::new(events), &catalog, &ledger).unwrap();

        assert_eq!(stats.applied, 1);
    }

    #[test]
    fn write_books_to_csv() {
        let (catalog, ledger) = library(LedgerConfig::default());
        replay_events(Cursor::new("type,isbn,user\nborrow,111,U1\n"), &catalog, &ledger).unwrap();

        let mut output = Vec::new();
        write_books(&catalog, &mut output).unwrap();

        let output = String::from_utf8(output).unwrap();
        assert_eq!(
            output,
            "isbn,title,available,borrow_count\n\
             111,Dune,false,1\n\
             222,The Hobbit,true,\n"
        );
    }

    #[test]
    fn conditional_policy_from_flags() {
        let args = Args::parse_from([
            "borrow-ledger-rs",
            "--catalog",
            "books.csv",
            "--write-policy",
            "conditional",
            "--count-policy",
            "historical",
            "events.csv",
        ]);

        assert_eq!(args.write_policy, WritePolicy::Conditional);
        assert_eq!(args.count_policy, CountPolicy::Historical);
        assert!(!args.report);
    }
}
