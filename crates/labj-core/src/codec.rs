//! Markdown codec for daily journal files.
//!
//! A daily file is a `# Journal - YYYY-MM-DD` title followed by a
//! concatenation of entry sections. Each section starts with `## {entry_id}`,
//! carries bold metadata labels (`**Timestamp**:`, `**Author**:`, ...),
//! level-3 body headings (`### Context` ... `### Next Steps`, amendment
//! headings `### Correction` / `### Actual` / `### Impact`, diagnostic
//! headings `### Tool`, `### Command`, `### Duration (ms)`, `### Exit Code`,
//! `### Error Type`), and ends with `---` on its own line.
//!
//! Encoding serializes fields in a fixed order and omits absent ones.
//! Decoding tolerates labels in any order, unknown headings (preserved as
//! opaque extras), and trailing whitespace; it fails only on a malformed
//! entry header, a missing timestamp, or a missing author.

use std::path::Path;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;

use crate::error::{JournalError, Result};
use crate::models::{Diagnostics, Entry, EntryId, EntryKind, Narrative, Outcome};

static SECTION_HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^## (.+?)\s*$").expect("static regex"));
static META_LABEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\*\*([A-Za-z -]+)\*\*:\s*(.*)$").expect("static regex"));
static BODY_HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^### (.+?)\s*$").expect("static regex"));

/// An entry decoded from a daily file, together with any unknown headings the
/// encoder did not produce.
#[derive(Debug, Clone)]
pub struct DecodedEntry {
    /// The structured entry.
    pub entry: Entry,
    /// Unknown `###` blocks, preserved verbatim as (heading, body) pairs.
    pub extras: Vec<(String, String)>,
}

/// Title line for a fresh daily file.
#[must_use]
pub fn file_header(date: NaiveDate) -> String {
    format!("# Journal - {}\n\n", date.format("%Y-%m-%d"))
}

/// Serializes an entry to its markdown section, terminator included.
#[must_use]
pub fn encode_entry(entry: &Entry) -> String {
    let mut lines: Vec<String> = vec![
        format!("## {}", entry.id),
        format!("**Timestamp**: {}", entry.timestamp_str()),
        format!("**Author**: {}", entry.author),
        format!("**Type**: {}", entry.kind.type_name()),
    ];

    if let Some(outcome) = entry.outcome {
        lines.push(format!("**Outcome**: {outcome}"));
    }
    if let Some(template) = &entry.template {
        lines.push(format!("**Template**: {template}"));
    }
    if let Some(config) = &entry.config_used {
        lines.push(format!("**Config**: {config}"));
    }
    if let Some(log) = &entry.log_produced {
        lines.push(format!("**Log**: {log}"));
    }
    if !entry.caused_by.is_empty() {
        lines.push(format!("**Caused-By**: {}", entry.caused_by.join(", ")));
    }
    if !entry.references.is_empty() {
        lines.push(format!("**References**: {}", entry.references.join(", ")));
    }
    if let Some(amends) = entry.amends() {
        lines.push(format!("**Amends**: {amends}"));
    }
    lines.push(String::new());

    match &entry.kind {
        EntryKind::Entry { narrative } => {
            push_block(&mut lines, "Context", narrative.context.as_deref());
            push_block(&mut lines, "Intent", narrative.intent.as_deref());
            push_block(&mut lines, "Action", narrative.action.as_deref());
            push_block(&mut lines, "Observation", narrative.observation.as_deref());
            push_block(&mut lines, "Analysis", narrative.analysis.as_deref());
            push_block(&mut lines, "Next Steps", narrative.next_steps.as_deref());
        }
        EntryKind::Amendment {
            correction,
            actual,
            impact,
            ..
        } => {
            push_block(&mut lines, "Correction", Some(correction));
            push_block(&mut lines, "Actual", Some(actual));
            push_block(&mut lines, "Impact", Some(impact));
        }
    }

    let diag = &entry.diagnostics;
    push_block(&mut lines, "Tool", diag.tool.as_deref());
    push_block(&mut lines, "Command", diag.command.as_deref());
    push_block(
        &mut lines,
        "Duration (ms)",
        diag.duration_ms.map(|d| d.to_string()).as_deref(),
    );
    push_block(
        &mut lines,
        "Exit Code",
        diag.exit_code.map(|c| c.to_string()).as_deref(),
    );
    push_block(&mut lines, "Error Type", diag.error_type.as_deref());

    lines.push("---".to_string());
    lines.push(String::new());
    lines.join("\n")
}

fn push_block(lines: &mut Vec<String>, heading: &str, body: Option<&str>) {
    if let Some(body) = body {
        lines.push(format!("### {heading}"));
        lines.push(body.to_string());
        lines.push(String::new());
    }
}

/// Parses a full daily file into entries.
///
/// Content before the first `## ` line (the file title) is ignored. Sections
/// are delimited by `## {entry_id}` headers and the `---` terminator.
///
/// # Errors
///
/// Returns [`JournalError::Codec`] when a section header is not a valid
/// entry id, or when a section lacks a timestamp or an author.
pub fn decode_file(content: &str, file: &Path) -> Result<Vec<DecodedEntry>> {
    let mut sections: Vec<(EntryId, Vec<&str>)> = Vec::new();
    let mut current: Option<(EntryId, Vec<&str>)> = None;

    for line in content.lines() {
        if let Some(caps) = SECTION_HEADER_RE.captures(line) {
            let header = &caps[1];
            let id = EntryId::from_str(header).map_err(|_| JournalError::Codec {
                file: file.to_path_buf(),
                message: format!("invalid entry header '## {header}'"),
            })?;
            if let Some(done) = current.take() {
                sections.push(done);
            }
            current = Some((id, Vec::new()));
        } else if let Some((_, body)) = current.as_mut() {
            body.push(line);
        }
        // Lines before the first section header (file title) are skipped.
    }
    if let Some(done) = current.take() {
        sections.push(done);
    }

    sections
        .into_iter()
        .map(|(id, body)| decode_section(id, &body, file))
        .collect()
}

/// Computes the next per-day sequence number from a daily file's content.
///
/// Scans for section headers of the given date and returns `max(NNN) + 1`,
/// or 1 when none are present.
#[must_use]
pub fn next_sequence(content: &str, date: NaiveDate) -> u32 {
    let prefix = format!("## {}-", date.format("%Y-%m-%d"));
    content
        .lines()
        .filter_map(|line| line.strip_prefix(&prefix))
        .filter_map(|rest| rest.trim().parse::<u32>().ok())
        .max()
        .map_or(1, |max| max + 1)
}

fn decode_section(id: EntryId, body: &[&str], file: &Path) -> Result<DecodedEntry> {
    let mut timestamp: Option<DateTime<Utc>> = None;
    let mut author: Option<String> = None;
    let mut entry_type = "entry".to_string();
    let mut outcome: Option<Outcome> = None;
    let mut template: Option<String> = None;
    let mut config_used: Option<String> = None;
    let mut log_produced: Option<String> = None;
    let mut caused_by: Vec<String> = Vec::new();
    let mut references: Vec<String> = Vec::new();
    let mut amends: Option<EntryId> = None;

    let codec_err = |message: String| JournalError::Codec {
        file: file.to_path_buf(),
        message,
    };

    // Head: metadata labels, in any order, until the first `###` heading or
    // the terminator.
    let mut idx = 0;
    while idx < body.len() {
        let line = body[idx];
        if BODY_HEADING_RE.is_match(line) || line.trim() == "---" {
            break;
        }
        if let Some(caps) = META_LABEL_RE.captures(line) {
            let value = caps[2].trim().to_string();
            match caps[1].to_ascii_lowercase().as_str() {
                "timestamp" => {
                    let parsed = DateTime::parse_from_rfc3339(&value)
                        .map_err(|e| codec_err(format!("entry {id}: bad timestamp: {e}")))?;
                    timestamp = Some(parsed.with_timezone(&Utc));
                }
                "author" => author = Some(value),
                "type" => entry_type = value.to_ascii_lowercase(),
                "outcome" => outcome = value.parse().ok(),
                "template" => template = Some(value),
                "config" => config_used = Some(value),
                "log" => log_produced = Some(value),
                "caused-by" => {
                    caused_by = value
                        .split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect();
                }
                "references" => {
                    references = value
                        .split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect();
                }
                "amends" => amends = EntryId::from_str(&value).ok(),
                // Unknown labels are tolerated and dropped.
                _ => {}
            }
        }
        idx += 1;
    }

    // Body: `###` blocks until the terminator. Multi-line bodies preserved
    // verbatim up to the next heading or `---`.
    let mut blocks: Vec<(String, String)> = Vec::new();
    while idx < body.len() {
        let line = body[idx];
        if line.trim() == "---" {
            break;
        }
        if let Some(caps) = BODY_HEADING_RE.captures(line) {
            let heading = caps[1].to_string();
            let mut text_lines: Vec<&str> = Vec::new();
            idx += 1;
            while idx < body.len() {
                let inner = body[idx];
                if BODY_HEADING_RE.is_match(inner) || inner.trim() == "---" {
                    break;
                }
                text_lines.push(inner);
                idx += 1;
            }
            let text = text_lines.join("\n").trim().to_string();
            blocks.push((heading, text));
        } else {
            idx += 1;
        }
    }

    let timestamp =
        timestamp.ok_or_else(|| codec_err(format!("entry {id}: missing **Timestamp**")))?;
    let author = author
        .filter(|a| !a.is_empty())
        .ok_or_else(|| codec_err(format!("entry {id}: missing **Author**")))?;

    let mut narrative = Narrative::default();
    let mut diagnostics = Diagnostics::default();
    let mut correction = None;
    let mut actual = None;
    let mut impact = None;
    let mut extras: Vec<(String, String)> = Vec::new();

    for (heading, text) in blocks {
        match heading.to_ascii_lowercase().as_str() {
            "context" => narrative.context = Some(text),
            "intent" => narrative.intent = Some(text),
            "action" => narrative.action = Some(text),
            "observation" => narrative.observation = Some(text),
            "analysis" => narrative.analysis = Some(text),
            "next steps" => narrative.next_steps = Some(text),
            "correction" => correction = Some(text),
            "actual" => actual = Some(text),
            "impact" => impact = Some(text),
            "outcome" => {
                if outcome.is_none() {
                    outcome = text.parse().ok();
                }
            }
            "tool" => diagnostics.tool = Some(text),
            "command" => diagnostics.command = Some(text),
            "duration (ms)" => diagnostics.duration_ms = text.parse().ok(),
            "exit code" => diagnostics.exit_code = text.parse().ok(),
            "error type" => diagnostics.error_type = Some(text),
            _ => extras.push((heading, text)),
        }
    }

    let kind = if entry_type == "amendment" {
        let amends =
            amends.ok_or_else(|| codec_err(format!("amendment {id}: missing **Amends**")))?;
        EntryKind::Amendment {
            amends,
            correction: correction.unwrap_or_default(),
            actual: actual.unwrap_or_default(),
            impact: impact.unwrap_or_default(),
        }
    } else {
        EntryKind::Entry { narrative }
    };

    Ok(DecodedEntry {
        entry: Entry {
            id,
            timestamp,
            author,
            kind,
            outcome,
            template,
            caused_by,
            references,
            config_used,
            log_produced,
            diagnostics,
        },
        extras,
    })
}
