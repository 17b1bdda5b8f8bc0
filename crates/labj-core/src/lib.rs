//! Append-only lab journal engine.
//!
//! `labj-core` persists a stream of timestamped, attributed, immutable
//! records — journal entries, amendments, archived configuration files,
//! preserved logs, and whole-system state snapshots — and serves structured
//! queries, full-text search, causality traversal, and aggregated statistics
//! over that stream.
//!
//! # Architecture
//!
//! Markdown daily files (`journal/YYYY-MM-DD.md`) are the source of truth.
//! A SQLite index (`journal/.index.db`, WAL mode, FTS5 mirror of the
//! narrative fields) is a rebuildable derivative that backs queries.
//! Artifacts live in `configs/`, `logs/`, and `snapshots/` trees with
//! human-readable `INDEX.md` files that are likewise regenerable from disk.
//!
//! Writes are append-only: persisted entries never change, corrections are
//! new amendment entries referencing the original, and every file mutation
//! goes through an advisory lock plus temp-file-and-rename atomic
//! replacement.
//!
//! # Example
//!
//! ```rust,no_run
//! use labj_core::engine::{JournalEngine, NewEntry};
//! use labj_core::models::Narrative;
//!
//! # fn example() -> Result<(), labj_core::error::JournalError> {
//! let engine = JournalEngine::open("/path/to/project")?;
//! let entry = engine.append(NewEntry {
//!     author: "claude".into(),
//!     narrative: Narrative {
//!         context: Some("Investigating build failure".into()),
//!         ..Narrative::default()
//!     },
//!     ..NewEntry::default()
//! })?;
//! println!("persisted {}", entry.id);
//! # Ok(())
//! # }
//! ```

pub mod artifact;
pub mod clock;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod fsio;
pub mod hooks;
pub mod index;
pub mod models;
pub mod template;
pub mod tools;

pub use engine::JournalEngine;
pub use error::{JournalError, Result};
