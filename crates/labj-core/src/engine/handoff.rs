//! Session handoff summaries.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde_json::{Value, json};

use super::{JournalEngine, ReadSelector};
use crate::error::{JournalError, Result};
use crate::models::TimelineEvent;

/// Output format of a session handoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandoffFormat {
    /// Fixed-section markdown document.
    Markdown,
    /// The same information as structured data.
    Json,
}

impl FromStr for HandoffFormat {
    type Err = JournalError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "markdown" => Ok(Self::Markdown),
            "json" => Ok(Self::Json),
            other => Err(JournalError::invalid(format!(
                "format must be markdown or json; got '{other}'"
            ))),
        }
    }
}

/// What a handoff covers.
#[derive(Debug, Clone)]
pub struct HandoffOptions {
    /// Start of the session window; defaults to today.
    pub date_from: Option<String>,
    /// End of the session window; defaults to today.
    pub date_to: Option<String>,
    /// Include the configuration-change section.
    pub include_configs: bool,
    /// Include the preserved-log section.
    pub include_logs: bool,
    /// Output format.
    pub format: HandoffFormat,
}

impl Default for HandoffOptions {
    fn default() -> Self {
        Self {
            date_from: None,
            date_to: None,
            include_configs: true,
            include_logs: true,
            format: HandoffFormat::Markdown,
        }
    }
}

impl JournalEngine {
    /// Computes a session summary document for context transfer.
    ///
    /// # Errors
    ///
    /// Returns an error on read or index failure, or when a hook's custom
    /// handoff section fails.
    pub fn session_handoff(&self, options: &HandoffOptions) -> Result<Value> {
        let today = self.clock().today().format("%Y-%m-%d").to_string();
        let date_from = options
            .date_from
            .as_deref()
            .map_or_else(|| today.clone(), |d| self.resolve_date_token(d));
        let date_to = options
            .date_to
            .as_deref()
            .map_or_else(|| today.clone(), |d| self.resolve_date_token(d));

        let all = self.read(
            &ReadSelector::ByRange {
                date_from: Some(date_from.clone()),
                date_to: Some(date_to.clone()),
            },
            true,
        )?;
        let (entries, amendments): (Vec<Value>, Vec<Value>) = all
            .into_iter()
            .partition(|e| e["entry_type"] != "amendment");

        let mut outcomes: BTreeMap<&str, u64> =
            [("success", 0), ("failure", 0), ("partial", 0), ("unknown", 0)]
                .into_iter()
                .collect();
        for entry in &entries {
            let key = entry["outcome"].as_str().unwrap_or("unknown");
            if let Some(count) = outcomes.get_mut(key) {
                *count += 1;
            }
        }

        let window_from = chrono::NaiveDate::parse_from_str(&date_from, "%Y-%m-%d").ok();
        let window_to = chrono::NaiveDate::parse_from_str(&date_to, "%Y-%m-%d").ok();
        let config_events = if options.include_configs {
            self.artifacts().config_events(window_from, window_to)?
        } else {
            Vec::new()
        };
        let log_events = if options.include_logs {
            self.artifacts().log_events(window_from, window_to)?
        } else {
            Vec::new()
        };

        let key_decisions: Vec<&Value> = entries
            .iter()
            .filter(|e| e["analysis"].as_str().is_some_and(|a| !a.trim().is_empty()))
            .collect();
        let open_items: Vec<&Value> = entries
            .iter()
            .filter(|e| e["next_steps"].as_str().is_some_and(|n| !n.trim().is_empty()))
            .collect();
        let recommendation = entries
            .last()
            .and_then(|e| e["next_steps"].as_str())
            .filter(|n| !n.trim().is_empty())
            .map(str::to_string);

        let content = match options.format {
            HandoffFormat::Markdown => json!(self.render_markdown(
                &date_from,
                &date_to,
                &entries,
                &amendments,
                &outcomes,
                &config_events,
                &log_events,
                &key_decisions,
                &open_items,
                recommendation.as_deref(),
            )?),
            HandoffFormat::Json => json!({
                "period": { "from": date_from, "to": date_to },
                "summary": {
                    "entry_count": entries.len(),
                    "amendment_count": amendments.len(),
                    "config_changes": config_events.len(),
                    "log_count": log_events.len(),
                    "outcomes": outcomes,
                    "log_outcomes": log_outcome_counts(&log_events),
                },
                "entries": entries,
                "amendments": amendments,
                "key_decisions": key_decisions,
                "open_items": open_items,
                "config_events": config_events,
                "log_events": log_events,
                "recommendation": recommendation,
            }),
        };

        Ok(json!({
            "format": match options.format {
                HandoffFormat::Markdown => "markdown",
                HandoffFormat::Json => "json",
            },
            "date_from": date_from,
            "date_to": date_to,
            "content": content,
        }))
    }

    #[allow(clippy::too_many_arguments)]
    fn render_markdown(
        &self,
        date_from: &str,
        date_to: &str,
        entries: &[Value],
        amendments: &[Value],
        outcomes: &BTreeMap<&str, u64>,
        config_events: &[TimelineEvent],
        log_events: &[TimelineEvent],
        key_decisions: &[&Value],
        open_items: &[&Value],
        recommendation: Option<&str>,
    ) -> Result<String> {
        let mut lines: Vec<String> = vec![
            "# Session Handoff".into(),
            format!("**Period**: {date_from} to {date_to}"),
            format!("**Project**: {}", self.config().project_name),
            String::new(),
            "## Summary".into(),
            format!("- Journal entries: {}", entries.len()),
            format!("- Amendments: {}", amendments.len()),
            format!("- Config changes: {}", config_events.len()),
            format!("- Logs preserved: {}", log_events.len()),
            format!(
                "- Outcomes: {} success, {} failure, {} partial",
                outcomes["success"], outcomes["failure"], outcomes["partial"]
            ),
            String::new(),
        ];

        lines.push("## Key Decisions".into());
        if key_decisions.is_empty() {
            lines.push("(none recorded)".into());
        }
        for entry in key_decisions {
            lines.push(format!(
                "- `{}`: {}",
                entry["entry_id"].as_str().unwrap_or_default(),
                first_line(entry["analysis"].as_str().unwrap_or_default(), 120),
            ));
        }
        lines.push(String::new());

        lines.push("## Journal Entries".into());
        for entry in entries {
            let outcome = entry["outcome"]
                .as_str()
                .map(|o| format!(" [{o}]"))
                .unwrap_or_default();
            lines.push(format!(
                "- **{}** ({}){}: {}",
                entry["timestamp"].as_str().unwrap_or_default().get(..16).unwrap_or_default(),
                entry["entry_id"].as_str().unwrap_or_default(),
                outcome,
                first_line(entry["context"].as_str().unwrap_or_default(), 80),
            ));
        }
        lines.push(String::new());

        lines.push("## Configuration Changes".into());
        if config_events.is_empty() {
            lines.push("(none)".into());
        }
        for (basename, reason) in latest_config_changes(config_events) {
            lines.push(format!("- {basename}: {reason}"));
        }
        lines.push(String::new());

        lines.push("## Preserved Logs".into());
        if log_events.is_empty() {
            lines.push("(none)".into());
        }
        for (category, counts) in log_counts_by_category(log_events) {
            let summary = counts
                .iter()
                .map(|(outcome, n)| format!("{n} {outcome}"))
                .collect::<Vec<_>>()
                .join(", ");
            lines.push(format!("- {category}: {summary}"));
        }
        lines.push(String::new());

        lines.push("## Open Items".into());
        if open_items.is_empty() {
            lines.push("(none)".into());
        }
        for entry in open_items {
            lines.push(format!(
                "- `{}`: {}",
                entry["entry_id"].as_str().unwrap_or_default(),
                first_line(entry["next_steps"].as_str().unwrap_or_default(), 120),
            ));
        }
        lines.push(String::new());

        lines.push("## Recommendations".into());
        match recommendation {
            Some(text) => lines.push(text.to_string()),
            None => lines.push("(none)".into()),
        }
        lines.push(String::new());

        if let Some(custom) = self.hooks.custom_handoff()? {
            lines.push(custom);
            lines.push(String::new());
        }

        Ok(lines.join("\n"))
    }
}

/// `configs/{basename}/{ts}_{reason-slug}{ext}` → basename → latest reason.
fn latest_config_changes(events: &[TimelineEvent]) -> BTreeMap<String, String> {
    let mut latest: BTreeMap<String, (chrono::DateTime<chrono::Utc>, String)> = BTreeMap::new();
    for event in events {
        let Some(path) = &event.path else { continue };
        let parts: Vec<&str> = path.split('/').collect();
        if parts.len() < 3 {
            continue;
        }
        let basename = parts[parts.len() - 2].to_string();
        let file = parts[parts.len() - 1];
        let stem = file.split('.').next().unwrap_or(file);
        let reason = stem.get(20..).unwrap_or("").replace('-', " ");
        let keep = latest
            .get(&basename)
            .is_none_or(|(ts, _)| event.timestamp > *ts);
        if keep {
            latest.insert(basename, (event.timestamp, reason));
        }
    }
    latest
        .into_iter()
        .map(|(basename, (_, reason))| (basename, reason))
        .collect()
}

fn log_counts_by_category(events: &[TimelineEvent]) -> BTreeMap<String, BTreeMap<String, u64>> {
    let mut by_category: BTreeMap<String, BTreeMap<String, u64>> = BTreeMap::new();
    for event in events {
        let category = event
            .path
            .as_deref()
            .and_then(|p| p.split('/').rev().nth(1))
            .unwrap_or("uncategorized")
            .to_string();
        let outcome = event.outcome.clone().unwrap_or_else(|| "unknown".into());
        *by_category.entry(category).or_default().entry(outcome).or_default() += 1;
    }
    by_category
}

fn log_outcome_counts(events: &[TimelineEvent]) -> BTreeMap<String, u64> {
    let mut counts: BTreeMap<String, u64> = BTreeMap::new();
    for event in events {
        let outcome = event.outcome.clone().unwrap_or_else(|| "unknown".into());
        *counts.entry(outcome).or_default() += 1;
    }
    counts
}

fn first_line(text: &str, max_chars: usize) -> String {
    let line = text.lines().next().unwrap_or_default();
    line.chars().take(max_chars).collect()
}
