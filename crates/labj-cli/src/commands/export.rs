//! `labj export`

use std::io::Write;
use std::path::Path;

use labj_core::index::QueryParams;
use labj_core::{JournalEngine, JournalError, Result};
use serde_json::Value;

use crate::ExportFormat;

use super::print_entry_table;

pub fn run(
    engine: &JournalEngine,
    format: ExportFormat,
    date_from: Option<&str>,
    date_to: Option<&str>,
    output: Option<&Path>,
) -> Result<()> {
    let entries = fetch_all(engine, date_from, date_to)?;

    let rendered = match format {
        ExportFormat::Table => {
            // Table format prints directly; file output gets the same text.
            if output.is_none() {
                print_entry_table(&entries);
                println!("\n{} entries", entries.len());
                return Ok(());
            }
            table_text(&entries)
        }
        ExportFormat::Json => {
            serde_json::to_string_pretty(&entries).expect("valid JSON") + "\n"
        }
        ExportFormat::Jsonl => {
            let mut out = String::new();
            for entry in &entries {
                out.push_str(&serde_json::to_string(entry).expect("valid JSON"));
                out.push('\n');
            }
            out
        }
        ExportFormat::Csv => csv_text(&entries),
        ExportFormat::Compact => {
            let mut out = String::new();
            for entry in &entries {
                let context = entry["context"]
                    .as_str()
                    .or_else(|| entry["correction"].as_str())
                    .unwrap_or_default()
                    .lines()
                    .next()
                    .unwrap_or_default()
                    .to_string();
                out.push_str(&format!(
                    "{} {} {} {}\n",
                    entry["entry_id"].as_str().unwrap_or_default(),
                    entry["author"].as_str().unwrap_or_default(),
                    entry["outcome"].as_str().unwrap_or("-"),
                    context,
                ));
            }
            out
        }
    };

    match output {
        Some(path) => {
            let mut file = std::fs::File::create(path)
                .map_err(|e| JournalError::io(format!("create {}", path.display()), e))?;
            file.write_all(rendered.as_bytes())
                .map_err(|e| JournalError::io(format!("write {}", path.display()), e))?;
            eprintln!("wrote {} entries to {}", entries.len(), path.display());
        }
        None => print!("{rendered}"),
    }
    Ok(())
}

/// Pages through the index until every matching entry is collected.
fn fetch_all(
    engine: &JournalEngine,
    date_from: Option<&str>,
    date_to: Option<&str>,
) -> Result<Vec<Value>> {
    let mut entries = Vec::new();
    let mut offset = 0u64;
    loop {
        let page = engine.query(QueryParams {
            date_from: date_from.map(str::to_string),
            date_to: date_to.map(str::to_string),
            limit: 1000,
            offset,
            order_by: Some("entry_id".to_string()),
            order_desc: false,
            ..QueryParams::default()
        })?;
        offset += page.entries.len() as u64;
        let done = !page.has_more;
        entries.extend(page.entries);
        if done {
            return Ok(entries);
        }
    }
}

fn table_text(entries: &[Value]) -> String {
    let mut out = String::new();
    for entry in entries {
        out.push_str(&format!(
            "{:<16} {:<28} {:<12} {:<9} {}\n",
            entry["entry_id"].as_str().unwrap_or_default(),
            entry["timestamp"].as_str().unwrap_or_default(),
            entry["author"].as_str().unwrap_or_default(),
            entry["outcome"].as_str().unwrap_or("-"),
            entry["context"].as_str().unwrap_or_default(),
        ));
    }
    out
}

const CSV_COLUMNS: [&str; 10] = [
    "entry_id",
    "timestamp",
    "author",
    "entry_type",
    "outcome",
    "tool",
    "duration_ms",
    "exit_code",
    "context",
    "analysis",
];

fn csv_text(entries: &[Value]) -> String {
    let mut out = CSV_COLUMNS.join(",");
    out.push('\n');
    for entry in entries {
        let row: Vec<String> = CSV_COLUMNS
            .iter()
            .map(|column| csv_field(&entry[*column]))
            .collect();
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}

/// Quotes a field when it contains a comma, quote, or newline; doubles
/// embedded quotes.
fn csv_field(value: &Value) -> String {
    let text = match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if text.contains(',') || text.contains('"') || text.contains('\n') {
        format!("\"{}\"", text.replace('"', "\"\""))
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_csv_field_escaping() {
        assert_eq!(csv_field(&json!("plain")), "plain");
        assert_eq!(csv_field(&json!("a,b")), "\"a,b\"");
        assert_eq!(csv_field(&json!("say \"hi\"")), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_field(&json!(null)), "");
        assert_eq!(csv_field(&json!(42)), "42");
    }

    #[test]
    fn test_csv_text_has_header_and_rows() {
        let entries = vec![json!({
            "entry_id": "2026-01-17-001",
            "timestamp": "2026-01-17T09:00:00+00:00",
            "author": "a",
            "entry_type": "entry",
            "outcome": "success",
            "tool": null,
            "duration_ms": null,
            "exit_code": null,
            "context": "one, two",
            "analysis": null,
        })];
        let text = csv_text(&entries);
        let mut lines = text.lines();
        assert_eq!(lines.next().unwrap(), CSV_COLUMNS.join(","));
        assert!(lines.next().unwrap().contains("\"one, two\""));
    }
}
