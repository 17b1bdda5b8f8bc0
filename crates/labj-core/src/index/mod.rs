//! SQLite query index over the journal.
//!
//! The markdown daily files are the source of truth; this index is a
//! rebuildable derivative that backs structured queries, full-text search,
//! and grouped aggregation. It lives at `{journal}/.index.db` with WAL mode
//! and a 5-second busy timeout, one connection per engine instance.
//!
//! # Invariants
//!
//! - For every entry present in any daily file, either an index row exists
//!   or a parse error was reported during rebuild.
//! - Rebuild is idempotent.
//! - The FTS mirror and the main row agree after any single operation
//!   (enforced by triggers, so one upsert statement updates both).

mod fts;
mod store;

#[cfg(test)]
mod tests;

pub use fts::escape_fts_query;
pub use store::{
    AggregateRequest, JournalIndex, QueryParams, QueryResult, RebuildReport, SCHEMA_VERSION,
};
