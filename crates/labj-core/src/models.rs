//! Data model for journal entries, config archives, preserved logs, and
//! state snapshots.
//!
//! An [`Entry`] is the atomic unit of record. Entries are immutable once
//! persisted: corrections are new entries of the amendment variant that
//! reference the original. The amendment-specific triad (`correction`,
//! `actual`, `impact`) only exists on [`EntryKind::Amendment`], so an
//! ordinary entry cannot carry amendment fields by construction.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::JournalError;

/// Exact shape of an entry id: `YYYY-MM-DD-NNN` with `NNN` at least three
/// digits and no ceiling.
static ENTRY_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4}-\d{2}-\d{2})-(\d{3,})$").expect("static regex"));

/// Identifier of a journal entry: date plus per-day sequence number.
///
/// Renders as `YYYY-MM-DD-NNN`, zero-padded to a minimum of three digits.
/// Sequence numbers beyond `999` extend naturally (`1000`, `1001`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId {
    date: NaiveDate,
    sequence: u32,
}

impl EntryId {
    /// Builds an id from its parts.
    #[must_use]
    pub const fn new(date: NaiveDate, sequence: u32) -> Self {
        Self { date, sequence }
    }

    /// The UTC date component.
    #[must_use]
    pub const fn date(&self) -> NaiveDate {
        self.date
    }

    /// The per-day sequence number.
    #[must_use]
    pub const fn sequence(&self) -> u32 {
        self.sequence
    }

    /// Whether `s` matches the entry id shape without allocating.
    #[must_use]
    pub fn is_valid(s: &str) -> bool {
        ENTRY_ID_RE.is_match(s)
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:03}", self.date.format("%Y-%m-%d"), self.sequence)
    }
}

impl FromStr for EntryId {
    type Err = JournalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = ENTRY_ID_RE
            .captures(s)
            .ok_or_else(|| JournalError::invalid(format!("malformed entry id '{s}'")))?;
        let date = NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d")
            .map_err(|e| JournalError::invalid(format!("entry id '{s}': {e}")))?;
        let sequence: u32 = caps[2]
            .parse()
            .map_err(|e| JournalError::invalid(format!("entry id '{s}': {e}")))?;
        Ok(Self { date, sequence })
    }
}

impl Serialize for EntryId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EntryId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Classification of how the recorded work turned out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// The work achieved its goal.
    Success,
    /// The work failed.
    Failure,
    /// The work partially succeeded.
    Partial,
}

impl Outcome {
    /// Canonical lowercase string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Partial => "partial",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Outcome {
    type Err = JournalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "failure" => Ok(Self::Failure),
            "partial" => Ok(Self::Partial),
            other => Err(JournalError::invalid(format!("unknown outcome '{other}'"))),
        }
    }
}

/// Outcome classification of a preserved log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutcome {
    /// The logged operation succeeded.
    Success,
    /// The logged operation failed.
    Failure,
    /// The logged operation was interrupted.
    Interrupted,
    /// The outcome could not be determined.
    #[default]
    Unknown,
}

impl LogOutcome {
    /// Canonical lowercase string form, used in preserved filenames.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Interrupted => "interrupted",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for LogOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogOutcome {
    type Err = JournalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "failure" => Ok(Self::Failure),
            "interrupted" => Ok(Self::Interrupted),
            "unknown" => Ok(Self::Unknown),
            other => Err(JournalError::invalid(format!(
                "unknown log outcome '{other}'"
            ))),
        }
    }
}

/// The six optional narrative body fields of an ordinary entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Narrative {
    /// Current state; what we are trying to accomplish.
    pub context: Option<String>,
    /// What action we are about to take and why.
    pub intent: Option<String>,
    /// Commands executed, files modified.
    pub action: Option<String>,
    /// What happened; output received.
    pub observation: Option<String>,
    /// What it means; what we learned.
    pub analysis: Option<String>,
    /// What should happen next.
    pub next_steps: Option<String>,
}

impl Narrative {
    /// Whether every narrative field is absent.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.context.is_none()
            && self.intent.is_none()
            && self.action.is_none()
            && self.observation.is_none()
            && self.analysis.is_none()
            && self.next_steps.is_none()
    }
}

/// Diagnostic metadata for tool-call tracking.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostics {
    /// Tool name (`bash`, `read_file`, ...).
    pub tool: Option<String>,
    /// Command executed.
    pub command: Option<String>,
    /// Duration in milliseconds.
    pub duration_ms: Option<u64>,
    /// Exit code for commands; any signed integer.
    pub exit_code: Option<i64>,
    /// Error classification when the operation failed.
    pub error_type: Option<String>,
}

/// Variant-specific payload of an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    /// An ordinary journal entry with narrative body fields.
    Entry {
        /// The narrative body.
        narrative: Narrative,
    },
    /// A correction of a previous entry. The original is never modified.
    Amendment {
        /// Id of the entry being corrected.
        amends: EntryId,
        /// What was incorrect in the original.
        correction: String,
        /// What is actually true.
        actual: String,
        /// How this changes understanding.
        impact: String,
    },
}

impl EntryKind {
    /// Wire name of the variant: `entry` or `amendment`.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Entry { .. } => "entry",
            Self::Amendment { .. } => "amendment",
        }
    }
}

/// A single immutable journal entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Entry identifier, unique across the journal.
    pub id: EntryId,
    /// UTC instant the entry was created, microsecond precision.
    pub timestamp: DateTime<Utc>,
    /// Who or what made the entry. Never empty.
    pub author: String,
    /// Ordinary entry or amendment, with variant-specific fields.
    pub kind: EntryKind,
    /// How the recorded work turned out.
    pub outcome: Option<Outcome>,
    /// Template the entry was constructed from.
    pub template: Option<String>,
    /// Entry ids that led to this entry.
    pub caused_by: Vec<String>,
    /// Cross-references to entries or files.
    pub references: Vec<String>,
    /// Config archive path used during the work.
    pub config_used: Option<String>,
    /// Log path produced by the work.
    pub log_produced: Option<String>,
    /// Diagnostic metadata for tool-call tracking.
    pub diagnostics: Diagnostics,
}

impl Entry {
    /// Timestamp rendered as RFC 3339 with microsecond precision and an
    /// explicit offset, the form persisted in daily files.
    #[must_use]
    pub fn timestamp_str(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Micros, false)
    }

    /// Narrative body, when this is an ordinary entry.
    #[must_use]
    pub const fn narrative(&self) -> Option<&Narrative> {
        match &self.kind {
            EntryKind::Entry { narrative } => Some(narrative),
            EntryKind::Amendment { .. } => None,
        }
    }

    /// The corrected entry's id, when this is an amendment.
    #[must_use]
    pub const fn amends(&self) -> Option<&EntryId> {
        match &self.kind {
            EntryKind::Amendment { amends, .. } => Some(amends),
            EntryKind::Entry { .. } => None,
        }
    }

    /// Flat JSON representation used by the tool-dispatch surface.
    ///
    /// Absent fields serialize as `null` so the shape is stable across
    /// entries and amendments.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let mut m = Map::new();
        m.insert("entry_id".into(), json!(self.id.to_string()));
        m.insert("timestamp".into(), json!(self.timestamp_str()));
        m.insert("author".into(), json!(self.author));
        m.insert("entry_type".into(), json!(self.kind.type_name()));

        let narrative = self.narrative().cloned().unwrap_or_default();
        m.insert("context".into(), json!(narrative.context));
        m.insert("intent".into(), json!(narrative.intent));
        m.insert("action".into(), json!(narrative.action));
        m.insert("observation".into(), json!(narrative.observation));
        m.insert("analysis".into(), json!(narrative.analysis));
        m.insert("next_steps".into(), json!(narrative.next_steps));

        match &self.kind {
            EntryKind::Amendment {
                amends,
                correction,
                actual,
                impact,
            } => {
                m.insert("references_entry".into(), json!(amends.to_string()));
                m.insert("correction".into(), json!(correction));
                m.insert("actual".into(), json!(actual));
                m.insert("impact".into(), json!(impact));
            }
            EntryKind::Entry { .. } => {
                m.insert("references_entry".into(), Value::Null);
                m.insert("correction".into(), Value::Null);
                m.insert("actual".into(), Value::Null);
                m.insert("impact".into(), Value::Null);
            }
        }

        m.insert("outcome".into(), json!(self.outcome.map(Outcome::as_str)));
        m.insert("template".into(), json!(self.template));
        m.insert("caused_by".into(), json!(self.caused_by));
        m.insert("references".into(), json!(self.references));
        m.insert("config_used".into(), json!(self.config_used));
        m.insert("log_produced".into(), json!(self.log_produced));
        m.insert("tool".into(), json!(self.diagnostics.tool));
        m.insert("command".into(), json!(self.diagnostics.command));
        m.insert("duration_ms".into(), json!(self.diagnostics.duration_ms));
        m.insert("exit_code".into(), json!(self.diagnostics.exit_code));
        m.insert("error_type".into(), json!(self.diagnostics.error_type));
        Value::Object(m)
    }
}

/// Record of an archived configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigArchive {
    /// Path of the file that was archived, as supplied by the caller.
    pub original_path: String,
    /// Archive location, relative to the project root.
    pub archive_path: String,
    /// UTC instant of the archival.
    pub timestamp: DateTime<Utc>,
    /// SHA-256 of the archived bytes, hex-encoded.
    pub content_hash: String,
    /// Why the file was archived. Never empty.
    pub reason: String,
    /// Journal entry documenting the change, when linked.
    pub journal_entry: Option<String>,
    /// Build stage, when the project uses stages.
    pub stage: Option<String>,
}

/// Record of a preserved log file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    /// Path the log was moved from.
    pub original_path: String,
    /// Preserved location, relative to the project root.
    pub preserved_path: String,
    /// UTC instant of the preservation.
    pub timestamp: DateTime<Utc>,
    /// Log category (`build`, `test`, ...).
    pub category: String,
    /// Outcome classification.
    pub outcome: LogOutcome,
    /// Size of the preserved file in bytes.
    pub size_bytes: u64,
}

/// A whole-system state capture.
///
/// Serializes to the snapshot JSON document: `name`, `timestamp`, `configs`,
/// `environment`, `versions`, and optionally `build_dir_listing`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Snapshot name. Never empty.
    pub name: String,
    /// UTC instant of the capture.
    pub timestamp: DateTime<Utc>,
    /// Config file path → file contents as text.
    pub configs: std::collections::BTreeMap<String, String>,
    /// Environment variable name → value, after exclude filtering.
    pub environment: std::collections::BTreeMap<String, String>,
    /// Tool name → probed version string.
    pub versions: std::collections::BTreeMap<String, String>,
    /// Relative paths under the build directory, when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_dir_listing: Option<Vec<String>>,
}

/// Kind tag of a unified timeline event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimelineEventKind {
    /// An ordinary journal entry.
    Entry,
    /// An amendment entry.
    Amendment,
    /// A config archival.
    Config,
    /// A log preservation.
    Log,
    /// A state snapshot.
    Snapshot,
}

impl TimelineEventKind {
    /// Wire name of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Entry => "entry",
            Self::Amendment => "amendment",
            Self::Config => "config",
            Self::Log => "log",
            Self::Snapshot => "snapshot",
        }
    }
}

impl FromStr for TimelineEventKind {
    type Err = JournalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "entry" => Ok(Self::Entry),
            "amendment" => Ok(Self::Amendment),
            "config" => Ok(Self::Config),
            "log" => Ok(Self::Log),
            "snapshot" => Ok(Self::Snapshot),
            other => Err(JournalError::invalid(format!(
                "unknown timeline event type '{other}'"
            ))),
        }
    }
}

/// One event in the unified timeline across entries and artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEvent {
    /// When the event happened.
    pub timestamp: DateTime<Utc>,
    /// What kind of event this is.
    pub event_type: TimelineEventKind,
    /// Short human-readable description.
    pub summary: String,
    /// Entry id, for journal events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_id: Option<String>,
    /// Artifact path, for config/log/snapshot events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Entry author, for journal events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Outcome, where one was recorded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
}

/// Formats an instant for artifact filenames: second precision, colons
/// replaced with dashes for filesystem safety.
#[must_use]
pub fn filename_timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H-%M-%S").to_string()
}

/// Reduces free text to a filename-safe slug: lowercase alphanumerics with
/// single dashes, capped at 40 characters.
#[must_use]
pub fn slugify(text: &str) -> String {
    let mut slug = String::new();
    let mut last_dash = true;
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
        if slug.len() >= 40 {
            break;
        }
    }
    let trimmed = slug.trim_end_matches('-');
    if trimmed.is_empty() {
        "unnamed".to_string()
    } else {
        trimmed.to_string()
    }
}
