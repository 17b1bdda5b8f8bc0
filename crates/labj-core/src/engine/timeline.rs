//! Unified timeline across entries and artifacts.

use chrono::NaiveDate;

use super::JournalEngine;
use crate::error::Result;
use crate::index::QueryParams;
use crate::models::{TimelineEvent, TimelineEventKind};

impl JournalEngine {
    /// Interleaves journal entries, amendments, config archives, preserved
    /// logs, and snapshots into one stream, sorted by timestamp descending
    /// and capped at `limit`.
    ///
    /// `event_types` restricts the union to the named kinds; within the date
    /// window no other filtering applies.
    ///
    /// # Errors
    ///
    /// Returns an error on index failure or unreadable artifact trees.
    pub fn timeline(
        &self,
        date_from: Option<&str>,
        date_to: Option<&str>,
        event_types: Option<&[TimelineEventKind]>,
        limit: usize,
    ) -> Result<Vec<TimelineEvent>> {
        let from = date_from.map(|d| self.resolve_date_token(d));
        let to = date_to.map(|d| self.resolve_date_token(d));
        let window_from = from.as_deref().and_then(parse_date_opt);
        let window_to = to.as_deref().and_then(parse_date_opt);

        let wanted = |kind: TimelineEventKind| -> bool {
            event_types.is_none_or(|kinds| kinds.contains(&kind))
        };

        let mut events: Vec<TimelineEvent> = Vec::new();

        if wanted(TimelineEventKind::Entry) || wanted(TimelineEventKind::Amendment) {
            let result = self.query(QueryParams {
                date_from: from.clone(),
                date_to: to.clone(),
                limit: 1000,
                ..QueryParams::default()
            })?;
            for row in result.entries {
                let kind = if row["entry_type"] == "amendment" {
                    TimelineEventKind::Amendment
                } else {
                    TimelineEventKind::Entry
                };
                if !wanted(kind) {
                    continue;
                }
                let Some(timestamp) = row["timestamp"]
                    .as_str()
                    .and_then(|t| chrono::DateTime::parse_from_rfc3339(t).ok())
                else {
                    continue;
                };
                let summary = row["context"]
                    .as_str()
                    .or_else(|| row["correction"].as_str())
                    .unwrap_or_default();
                events.push(TimelineEvent {
                    timestamp: timestamp.with_timezone(&chrono::Utc),
                    event_type: kind,
                    summary: truncate(summary, 100),
                    entry_id: row["entry_id"].as_str().map(str::to_string),
                    path: None,
                    author: row["author"].as_str().map(str::to_string),
                    outcome: row["outcome"].as_str().map(str::to_string),
                });
            }
        }

        if wanted(TimelineEventKind::Config) {
            events.extend(self.artifacts().config_events(window_from, window_to)?);
        }
        if wanted(TimelineEventKind::Log) {
            events.extend(self.artifacts().log_events(window_from, window_to)?);
        }
        if wanted(TimelineEventKind::Snapshot) {
            events.extend(self.artifacts().snapshot_events(window_from, window_to)?);
        }

        events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        events.truncate(limit);
        Ok(events)
    }
}

fn parse_date_opt(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect()
    }
}
