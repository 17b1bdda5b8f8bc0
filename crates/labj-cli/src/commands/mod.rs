//! CLI command implementations.

pub mod active;
pub mod export;
pub mod init;
pub mod query;
pub mod rebuild;
pub mod search;
pub mod stats;

use std::collections::BTreeMap;

use labj_core::{JournalError, Result};
use serde_json::Value;

/// Parses repeated `key=value` arguments into a filter map.
pub fn parse_filters(raw: &[String]) -> Result<BTreeMap<String, String>> {
    raw.iter()
        .map(|item| {
            item.split_once('=')
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                .ok_or_else(|| {
                    JournalError::invalid(format!("filter '{item}' must look like key=value"))
                })
        })
        .collect()
}

/// Renders entry rows as an aligned table.
pub fn print_entry_table(entries: &[Value]) {
    if entries.is_empty() {
        println!("(no entries)");
        return;
    }
    println!(
        "{:<16} {:<28} {:<12} {:<10} {:<9} CONTEXT",
        "ID", "TIMESTAMP", "AUTHOR", "TYPE", "OUTCOME"
    );
    for entry in entries {
        let context = entry["context"]
            .as_str()
            .or_else(|| entry["correction"].as_str())
            .unwrap_or_default();
        let first_line: String = context.lines().next().unwrap_or_default().chars().take(60).collect();
        println!(
            "{:<16} {:<28} {:<12} {:<10} {:<9} {}",
            entry["entry_id"].as_str().unwrap_or_default(),
            entry["timestamp"].as_str().unwrap_or_default(),
            entry["author"].as_str().unwrap_or_default(),
            entry["entry_type"].as_str().unwrap_or_default(),
            entry["outcome"].as_str().unwrap_or("-"),
            first_line,
        );
    }
}
