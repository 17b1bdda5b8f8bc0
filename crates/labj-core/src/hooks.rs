//! Lifecycle hooks.
//!
//! Projects can observe or adjust engine operations at named points by
//! supplying a [`JournalHooks`] implementation at engine construction. Every
//! method has a no-op default, so implementors override only the points they
//! care about. A hook returning an error aborts the in-flight operation and
//! leaves no trace of it.

use std::collections::BTreeMap;

use crate::error::Result;
use crate::models::{ConfigArchive, Entry, LogRecord};

/// Named hook points invoked by the engine.
pub trait JournalHooks: Send + Sync {
    /// Runs before an entry is persisted. May replace the draft by returning
    /// a modified entry, or reject the append by returning an error.
    ///
    /// # Errors
    ///
    /// An error aborts the append; nothing is written.
    fn pre_append(&self, entry: Entry) -> Result<Entry> {
        Ok(entry)
    }

    /// Runs after an entry has been persisted and indexed.
    ///
    /// # Errors
    ///
    /// An error surfaces to the caller; the entry is already durable.
    fn post_append(&self, _entry: &Entry) -> Result<()> {
        Ok(())
    }

    /// Runs before a config file is archived.
    ///
    /// # Errors
    ///
    /// An error aborts the archival.
    fn pre_archive(&self, _file_path: &str, _reason: &str) -> Result<()> {
        Ok(())
    }

    /// Runs after a config archive has been written and indexed.
    ///
    /// # Errors
    ///
    /// An error surfaces to the caller; the archive is already durable.
    fn post_archive(&self, _record: &ConfigArchive) -> Result<()> {
        Ok(())
    }

    /// Runs before a log file is preserved.
    ///
    /// # Errors
    ///
    /// An error aborts the preservation.
    fn pre_preserve(&self, _file_path: &str) -> Result<()> {
        Ok(())
    }

    /// Runs after a log file has been preserved and indexed.
    ///
    /// # Errors
    ///
    /// An error surfaces to the caller; the log is already moved.
    fn post_preserve(&self, _record: &LogRecord) -> Result<()> {
        Ok(())
    }

    /// Extends the version map captured during a state snapshot.
    ///
    /// # Errors
    ///
    /// An error aborts the snapshot.
    fn capture_versions(&self) -> Result<BTreeMap<String, String>> {
        Ok(BTreeMap::new())
    }

    /// Appends custom sections to a markdown session handoff.
    ///
    /// # Errors
    ///
    /// An error aborts the handoff.
    fn custom_handoff(&self) -> Result<Option<String>> {
        Ok(None)
    }
}

/// The default hook registry: every point is a no-op.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl JournalHooks for NoHooks {}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use chrono::Utc;

    use super::*;
    use crate::models::{Diagnostics, EntryKind, Narrative};

    #[test]
    fn test_no_hooks_passes_entry_through() {
        let entry = Entry {
            id: "2026-01-17-001".parse().unwrap(),
            timestamp: Utc.with_ymd_and_hms(2026, 1, 17, 9, 0, 0).unwrap(),
            author: "a".into(),
            kind: EntryKind::Entry {
                narrative: Narrative::default(),
            },
            outcome: None,
            template: None,
            caused_by: vec![],
            references: vec![],
            config_used: None,
            log_produced: None,
            diagnostics: Diagnostics::default(),
        };
        let out = NoHooks.pre_append(entry.clone()).unwrap();
        assert_eq!(out, entry);
        assert!(NoHooks.capture_versions().unwrap().is_empty());
        assert!(NoHooks.custom_handoff().unwrap().is_none());
    }
}
