//! Timeline events reconstructed from artifact trees.
//!
//! The artifact filenames carry enough metadata (timestamp, outcome, name)
//! to rebuild timeline events without any database, the same way the INDEX
//! rebuild works.

use chrono::NaiveDate;

use super::index_md::{
    file_name_of, parse_log_outcome, skip_artifact_file, snapshot_name_of, sorted_dir,
};
use super::{ArtifactManager, parse_artifact_timestamp, relative_to_root};
use crate::error::Result;
use crate::models::{TimelineEvent, TimelineEventKind};

impl ArtifactManager {
    /// Config archive events within the date window.
    ///
    /// # Errors
    ///
    /// Returns an error if a present tree cannot be listed.
    pub fn config_events(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<TimelineEvent>> {
        let root = self.config().configs_path();
        let mut events = Vec::new();
        if !root.exists() {
            return Ok(events);
        }
        for basename_dir in sorted_dir(&root)? {
            if !basename_dir.is_dir() {
                continue;
            }
            let basename = file_name_of(&basename_dir);
            for file in sorted_dir(&basename_dir)? {
                let name = file_name_of(&file);
                if skip_artifact_file(&name) {
                    continue;
                }
                let Some(ts) = parse_artifact_timestamp(&name) else {
                    continue;
                };
                if outside_window(ts.date_naive(), from, to) {
                    continue;
                }
                events.push(TimelineEvent {
                    timestamp: ts,
                    event_type: TimelineEventKind::Config,
                    summary: format!("Config archived: {basename}/{name}"),
                    entry_id: None,
                    path: Some(relative_to_root(&file, &self.config().project_root)),
                    author: None,
                    outcome: None,
                });
            }
        }
        Ok(events)
    }

    /// Log preservation events within the date window.
    ///
    /// # Errors
    ///
    /// Returns an error if a present tree cannot be listed.
    pub fn log_events(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<TimelineEvent>> {
        let root = self.config().logs_path();
        let mut events = Vec::new();
        if !root.exists() {
            return Ok(events);
        }
        for category_dir in sorted_dir(&root)? {
            if !category_dir.is_dir() {
                continue;
            }
            for file in sorted_dir(&category_dir)? {
                let name = file_name_of(&file);
                if skip_artifact_file(&name) || !name.ends_with(".log") {
                    continue;
                }
                let Some(ts) = parse_artifact_timestamp(&name) else {
                    continue;
                };
                if outside_window(ts.date_naive(), from, to) {
                    continue;
                }
                events.push(TimelineEvent {
                    timestamp: ts,
                    event_type: TimelineEventKind::Log,
                    summary: format!("Log preserved: {name}"),
                    entry_id: None,
                    path: Some(relative_to_root(&file, &self.config().project_root)),
                    author: None,
                    outcome: Some(parse_log_outcome(&name).to_string()),
                });
            }
        }
        Ok(events)
    }

    /// Snapshot events within the date window.
    ///
    /// # Errors
    ///
    /// Returns an error if a present tree cannot be listed.
    pub fn snapshot_events(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<TimelineEvent>> {
        let root = self.config().snapshots_path();
        let mut events = Vec::new();
        if !root.exists() {
            return Ok(events);
        }
        for file in sorted_dir(&root)? {
            let name = file_name_of(&file);
            if skip_artifact_file(&name) || !name.ends_with(".json") {
                continue;
            }
            let Some(ts) = parse_artifact_timestamp(&name) else {
                continue;
            };
            if outside_window(ts.date_naive(), from, to) {
                continue;
            }
            events.push(TimelineEvent {
                timestamp: ts,
                event_type: TimelineEventKind::Snapshot,
                summary: format!("Snapshot: {}", snapshot_name_of(&name)),
                entry_id: None,
                path: Some(relative_to_root(&file, &self.config().project_root)),
                author: None,
                outcome: None,
            });
        }
        Ok(events)
    }
}

fn outside_window(date: NaiveDate, from: Option<NaiveDate>, to: Option<NaiveDate>) -> bool {
    from.is_some_and(|f| date < f) || to.is_some_and(|t| date > t)
}
