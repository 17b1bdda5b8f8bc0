use std::collections::BTreeMap;
use std::path::Path;

use chrono::{TimeZone, Utc};

use super::*;
use crate::error::JournalError;
use crate::models::{Diagnostics, Entry, EntryKind, Narrative, Outcome};

fn entry(id: &str, author: &str) -> Entry {
    let id: crate::models::EntryId = id.parse().unwrap();
    let timestamp = Utc
        .with_ymd_and_hms(2026, 1, 17, 9, 0, 0)
        .unwrap()
        + chrono::Duration::seconds(i64::from(id.sequence()));
    Entry {
        id,
        timestamp,
        author: author.into(),
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
    }
}

fn with_tool(mut e: Entry, tool: &str, outcome: Outcome, duration_ms: u64) -> Entry {
    e.diagnostics.tool = Some(tool.into());
    e.diagnostics.duration_ms = Some(duration_ms);
    e.outcome = Some(outcome);
    e
}

fn with_context(mut e: Entry, context: &str) -> Entry {
    if let EntryKind::Entry { narrative } = &mut e.kind {
        narrative.context = Some(context.into());
    }
    e
}

fn file() -> &'static Path {
    Path::new("journal/2026-01-17.md")
}

fn filters(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

#[test]
fn test_index_entry_is_idempotent_upsert() {
    let index = JournalIndex::in_memory().unwrap();
    let e = with_context(entry("2026-01-17-001", "a"), "first version");
    index.index_entry(&e, file()).unwrap();
    index.index_entry(&e, file()).unwrap();

    let result = index.query(&QueryParams::default()).unwrap();
    assert_eq!(result.total, 1);

    let updated = with_context(entry("2026-01-17-001", "a"), "second version");
    index.index_entry(&updated, file()).unwrap();
    let row = index.get("2026-01-17-001").unwrap().unwrap();
    assert_eq!(row["context"], "second version");
}

#[test]
fn test_get_absent_returns_none() {
    let index = JournalIndex::in_memory().unwrap();
    assert!(index.get("2026-01-17-001").unwrap().is_none());
    assert!(!index.exists("2026-01-17-001").unwrap());
}

#[test]
fn test_delete_entry_removes_row_and_fts() {
    let index = JournalIndex::in_memory().unwrap();
    let e = with_context(entry("2026-01-17-001", "a"), "findme unique");
    index.index_entry(&e, file()).unwrap();
    assert!(index.delete_entry("2026-01-17-001").unwrap());
    assert!(!index.delete_entry("2026-01-17-001").unwrap());

    let result = index
        .query(&QueryParams {
            text_search: Some("findme".into()),
            ..QueryParams::default()
        })
        .unwrap();
    assert_eq!(result.total, 0);
}

#[test]
fn test_query_filters_are_conjunctive() {
    let index = JournalIndex::in_memory().unwrap();
    index
        .index_entry(
            &with_tool(entry("2026-01-17-001", "a"), "bash", Outcome::Success, 10),
            file(),
        )
        .unwrap();
    index
        .index_entry(
            &with_tool(entry("2026-01-17-002", "a"), "bash", Outcome::Failure, 10),
            file(),
        )
        .unwrap();
    index
        .index_entry(
            &with_tool(entry("2026-01-17-003", "b"), "grep", Outcome::Success, 10),
            file(),
        )
        .unwrap();

    let result = index
        .query(&QueryParams {
            filters: filters(&[("tool", "bash"), ("outcome", "success")]),
            ..QueryParams::default()
        })
        .unwrap();
    assert_eq!(result.total, 1);
    assert_eq!(result.entries[0]["entry_id"], "2026-01-17-001");
}

#[test]
fn test_query_unknown_filter_keys_silently_dropped() {
    let index = JournalIndex::in_memory().unwrap();
    index.index_entry(&entry("2026-01-17-001", "a"), file()).unwrap();

    // A hostile filter key must not reach the SQL text.
    let result = index
        .query(&QueryParams {
            filters: filters(&[("entry_id; DROP TABLE entries; --", "x")]),
            ..QueryParams::default()
        })
        .unwrap();
    assert_eq!(result.total, 1);
}

#[test]
fn test_query_date_range_inclusive() {
    let index = JournalIndex::in_memory().unwrap();
    index.index_entry(&entry("2026-01-16-001", "a"), file()).unwrap();
    index.index_entry(&entry("2026-01-17-001", "a"), file()).unwrap();
    index.index_entry(&entry("2026-01-18-001", "a"), file()).unwrap();

    let result = index
        .query(&QueryParams {
            date_from: Some("2026-01-16".into()),
            date_to: Some("2026-01-17".into()),
            ..QueryParams::default()
        })
        .unwrap();
    assert_eq!(result.total, 2);
}

#[test]
fn test_query_malformed_date_rejected() {
    let index = JournalIndex::in_memory().unwrap();
    let err = index
        .query(&QueryParams {
            date_from: Some("yesterday-ish".into()),
            ..QueryParams::default()
        })
        .unwrap_err();
    assert!(matches!(err, JournalError::InvalidArgument { .. }));
}

#[test]
fn test_query_limit_bounds() {
    let index = JournalIndex::in_memory().unwrap();
    for limit in [0u64, 1001] {
        let err = index
            .query(&QueryParams {
                limit,
                ..QueryParams::default()
            })
            .unwrap_err();
        assert!(matches!(err, JournalError::InvalidArgument { .. }), "limit {limit}");
    }
}

#[test]
fn test_query_pagination_and_has_more() {
    let index = JournalIndex::in_memory().unwrap();
    for i in 1..=5 {
        index
            .index_entry(&entry(&format!("2026-01-17-{i:03}"), "a"), file())
            .unwrap();
    }

    let page = index
        .query(&QueryParams {
            limit: 2,
            offset: 0,
            order_by: Some("entry_id".into()),
            order_desc: false,
            ..QueryParams::default()
        })
        .unwrap();
    assert_eq!(page.total, 5);
    assert!(page.has_more);
    assert_eq!(page.entries[0]["entry_id"], "2026-01-17-001");

    let last = index
        .query(&QueryParams {
            limit: 2,
            offset: 4,
            order_by: Some("entry_id".into()),
            order_desc: false,
            ..QueryParams::default()
        })
        .unwrap();
    assert_eq!(last.entries.len(), 1);
    assert!(!last.has_more);
}

#[test]
fn test_query_page_is_prefix_of_larger_page() {
    let index = JournalIndex::in_memory().unwrap();
    for i in 1..=8 {
        index
            .index_entry(&entry(&format!("2026-01-17-{i:03}"), "a"), file())
            .unwrap();
    }
    let small = index
        .query(&QueryParams {
            limit: 3,
            offset: 2,
            ..QueryParams::default()
        })
        .unwrap();
    let big = index
        .query(&QueryParams {
            limit: 5,
            offset: 0,
            ..QueryParams::default()
        })
        .unwrap();
    let big_ids: Vec<_> = big.entries.iter().map(|e| e["entry_id"].clone()).collect();
    for (i, row) in small.entries.iter().enumerate() {
        assert_eq!(row["entry_id"], big_ids[i + 2]);
    }
}

#[test]
fn test_query_unknown_order_falls_back_to_timestamp() {
    let index = JournalIndex::in_memory().unwrap();
    index.index_entry(&entry("2026-01-17-001", "a"), file()).unwrap();
    index.index_entry(&entry("2026-01-17-002", "a"), file()).unwrap();

    let result = index
        .query(&QueryParams {
            order_by: Some("file_path; DROP TABLE entries".into()),
            order_desc: true,
            ..QueryParams::default()
        })
        .unwrap();
    // Later timestamp first under the fallback ordering.
    assert_eq!(result.entries[0]["entry_id"], "2026-01-17-002");
}

#[test]
fn test_query_ordering_by_duration() {
    let index = JournalIndex::in_memory().unwrap();
    index
        .index_entry(
            &with_tool(entry("2026-01-17-001", "a"), "bash", Outcome::Success, 50),
            file(),
        )
        .unwrap();
    index
        .index_entry(
            &with_tool(entry("2026-01-17-002", "a"), "bash", Outcome::Success, 500),
            file(),
        )
        .unwrap();

    let result = index
        .query(&QueryParams {
            order_by: Some("duration_ms".into()),
            order_desc: true,
            ..QueryParams::default()
        })
        .unwrap();
    assert_eq!(result.entries[0]["duration_ms"], 500);
}

#[test]
fn test_fts_single_word_and_phrase() {
    let index = JournalIndex::in_memory().unwrap();
    index
        .index_entry(
            &with_context(entry("2026-01-17-001", "a"), "linker exploded during stage two"),
            file(),
        )
        .unwrap();
    index
        .index_entry(
            &with_context(entry("2026-01-17-002", "a"), "all tests green"),
            file(),
        )
        .unwrap();

    let hit = index
        .query(&QueryParams {
            text_search: Some("linker".into()),
            ..QueryParams::default()
        })
        .unwrap();
    assert_eq!(hit.total, 1);
    assert_eq!(hit.entries[0]["entry_id"], "2026-01-17-001");

    let phrase = index
        .query(&QueryParams {
            text_search: Some("stage two".into()),
            ..QueryParams::default()
        })
        .unwrap();
    assert_eq!(phrase.total, 1);

    let miss = index
        .query(&QueryParams {
            text_search: Some("nonsense".into()),
            ..QueryParams::default()
        })
        .unwrap();
    assert_eq!(miss.total, 0);
}

#[test]
fn test_fts_quoted_input_does_not_error() {
    let index = JournalIndex::in_memory().unwrap();
    index
        .index_entry(
            &with_context(entry("2026-01-17-001", "a"), "The \"quoted\" token"),
            file(),
        )
        .unwrap();

    let result = index
        .query(&QueryParams {
            text_search: Some("\"quoted\"".into()),
            ..QueryParams::default()
        })
        .unwrap();
    assert_eq!(result.total, 1);
}

#[test]
fn test_fts_amendment_bodies_not_mirrored() {
    let index = JournalIndex::in_memory().unwrap();
    let amendment = Entry {
        kind: EntryKind::Amendment {
            amends: "2026-01-16-001".parse().unwrap(),
            correction: "zanzibar".into(),
            actual: "x".into(),
            impact: "y".into(),
        },
        ..entry("2026-01-17-001", "a")
    };
    index.index_entry(&amendment, file()).unwrap();

    let result = index
        .query(&QueryParams {
            text_search: Some("zanzibar".into()),
            ..QueryParams::default()
        })
        .unwrap();
    assert_eq!(result.total, 0);
    // But the structured row still carries the correction text.
    let row = index.get("2026-01-17-001").unwrap().unwrap();
    assert_eq!(row["correction"], "zanzibar");
}

#[test]
fn test_aggregate_counts_by_tool_and_outcome() {
    let index = JournalIndex::in_memory().unwrap();
    let mut seq = 0;
    let mut add = |tool: &str, outcome: Outcome| {
        seq += 1;
        index
            .index_entry(
                &with_tool(entry(&format!("2026-01-17-{seq:03}"), "a"), tool, outcome, 100),
                file(),
            )
            .unwrap();
    };
    for _ in 0..5 {
        add("bash", Outcome::Success);
    }
    for _ in 0..3 {
        add("bash", Outcome::Failure);
    }
    for _ in 0..2 {
        add("grep", Outcome::Success);
    }

    let by_tool = index
        .aggregate(&AggregateRequest {
            group_by: Some("tool".into()),
            aggregations: vec!["count".into()],
            ..AggregateRequest::default()
        })
        .unwrap();
    let groups = by_tool["groups"].as_array().unwrap();
    let find = |name: &str| {
        groups
            .iter()
            .find(|g| g["tool"] == name)
            .unwrap_or_else(|| panic!("missing group {name}"))["count"]
            .as_i64()
            .unwrap()
    };
    assert_eq!(find("bash"), 8);
    assert_eq!(find("grep"), 2);
    assert_eq!(by_tool["totals"]["count"], 10);

    let by_outcome = index
        .aggregate(&AggregateRequest {
            group_by: Some("outcome".into()),
            aggregations: vec!["count".into()],
            ..AggregateRequest::default()
        })
        .unwrap();
    let sum: i64 = by_outcome["groups"]
        .as_array()
        .unwrap()
        .iter()
        .map(|g| g["count"].as_i64().unwrap())
        .sum();
    assert_eq!(sum, 10);

    // Sum of groups equals the ungrouped total under the same filters.
    let overall = index
        .aggregate(&AggregateRequest::default())
        .unwrap();
    assert_eq!(overall["totals"]["count"], 10);
    assert!(overall["groups"].as_array().unwrap().is_empty());
}

#[test]
fn test_aggregate_numeric_and_invalid_items() {
    let index = JournalIndex::in_memory().unwrap();
    index
        .index_entry(
            &with_tool(entry("2026-01-17-001", "a"), "bash", Outcome::Success, 100),
            file(),
        )
        .unwrap();
    index
        .index_entry(
            &with_tool(entry("2026-01-17-002", "a"), "bash", Outcome::Success, 300),
            file(),
        )
        .unwrap();
    // No duration on this one: excluded from numeric aggregation.
    index.index_entry(&entry("2026-01-17-003", "a"), file()).unwrap();

    let result = index
        .aggregate(&AggregateRequest {
            group_by: Some("tool".into()),
            aggregations: vec![
                "count".into(),
                "avg:duration_ms".into(),
                "max:duration_ms".into(),
                "avg:file_path".into(),   // invalid field: dropped
                "median:duration_ms".into(), // invalid op: dropped
            ],
            ..AggregateRequest::default()
        })
        .unwrap();
    let groups = result["groups"].as_array().unwrap();
    let bash = groups.iter().find(|g| g["tool"] == "bash").unwrap();
    assert_eq!(bash["count"], 2);
    assert!((bash["avg_duration_ms"].as_f64().unwrap() - 200.0).abs() < f64::EPSILON);
    assert_eq!(bash["max_duration_ms"], 300);
    assert!(bash.get("avg_file_path").is_none());
}

#[test]
fn test_aggregate_all_items_invalid_falls_back_to_count() {
    let index = JournalIndex::in_memory().unwrap();
    index.index_entry(&entry("2026-01-17-001", "a"), file()).unwrap();
    let result = index
        .aggregate(&AggregateRequest {
            group_by: Some("author".into()),
            aggregations: vec!["median:duration_ms".into()],
            ..AggregateRequest::default()
        })
        .unwrap();
    assert_eq!(result["groups"][0]["count"], 1);
}

#[test]
fn test_aggregate_unknown_group_by_fails() {
    let index = JournalIndex::in_memory().unwrap();
    let err = index
        .aggregate(&AggregateRequest {
            group_by: Some("file_path".into()),
            ..AggregateRequest::default()
        })
        .unwrap_err();
    assert!(matches!(err, JournalError::InvalidArgument { .. }));
}

#[test]
fn test_aggregate_null_group_reported_as_none() {
    let index = JournalIndex::in_memory().unwrap();
    index.index_entry(&entry("2026-01-17-001", "a"), file()).unwrap();
    index
        .index_entry(
            &with_tool(entry("2026-01-17-002", "a"), "bash", Outcome::Success, 10),
            file(),
        )
        .unwrap();

    let result = index
        .aggregate(&AggregateRequest {
            group_by: Some("tool".into()),
            aggregations: vec!["count".into()],
            ..AggregateRequest::default()
        })
        .unwrap();
    let groups = result["groups"].as_array().unwrap();
    assert!(groups.iter().any(|g| g["tool"] == "(none)"));
}

#[test]
fn test_active_threshold_and_ordering() {
    let index = JournalIndex::in_memory().unwrap();
    index
        .index_entry(
            &with_tool(entry("2026-01-17-001", "a"), "bash", Outcome::Success, 10_000),
            file(),
        )
        .unwrap();
    index
        .index_entry(
            &with_tool(entry("2026-01-17-002", "a"), "bash", Outcome::Success, 45_000),
            file(),
        )
        .unwrap();
    index
        .index_entry(
            &with_tool(entry("2026-01-17-003", "a"), "grep", Outcome::Success, 60_000),
            file(),
        )
        .unwrap();

    let active = index.active(30_000, None).unwrap();
    assert_eq!(active.len(), 2);
    assert_eq!(active[0]["duration_ms"], 60_000);
    assert_eq!(active[1]["duration_ms"], 45_000);

    let bash_only = index.active(30_000, Some("bash")).unwrap();
    assert_eq!(bash_only.len(), 1);
    assert_eq!(bash_only[0]["entry_id"], "2026-01-17-002");
}

#[test]
fn test_rebuild_from_markdown_files() {
    let dir = tempfile::tempdir().unwrap();
    let journal = dir.path().join("journal");
    std::fs::create_dir_all(&journal).unwrap();

    let a = with_context(entry("2026-01-17-001", "a"), "day one work");
    let b = with_context(entry("2026-01-18-001", "b"), "day two work");
    std::fs::write(
        journal.join("2026-01-17.md"),
        format!(
            "{}{}",
            crate::codec::file_header(a.id.date()),
            crate::codec::encode_entry(&a)
        ),
    )
    .unwrap();
    std::fs::write(
        journal.join("2026-01-18.md"),
        format!(
            "{}{}",
            crate::codec::file_header(b.id.date()),
            crate::codec::encode_entry(&b)
        ),
    )
    .unwrap();
    // Skipped files.
    std::fs::write(journal.join("INDEX.md"), "# not a daily file").unwrap();
    std::fs::write(journal.join(".hidden.md"), "## garbage").unwrap();

    let index = JournalIndex::open(&journal).unwrap();
    let report = index.rebuild(&journal, |_, _| {}).unwrap();
    assert_eq!(report.files_processed, 2);
    assert_eq!(report.entries_indexed, 2);
    assert_eq!(report.errors, 0);

    let result = index.query(&QueryParams::default()).unwrap();
    assert_eq!(result.total, 2);
}

#[test]
fn test_rebuild_reports_parse_errors_and_continues() {
    let dir = tempfile::tempdir().unwrap();
    let journal = dir.path().join("journal");
    std::fs::create_dir_all(&journal).unwrap();

    let good = with_context(entry("2026-01-17-001", "a"), "fine");
    std::fs::write(
        journal.join("2026-01-17.md"),
        crate::codec::encode_entry(&good),
    )
    .unwrap();
    // Section without an author: parse failure for the whole file.
    std::fs::write(
        journal.join("2026-01-18.md"),
        "## 2026-01-18-001\n**Timestamp**: 2026-01-18T00:00:00.000000+00:00\n---\n",
    )
    .unwrap();

    let index = JournalIndex::open(&journal).unwrap();
    let mut failed_files = Vec::new();
    let report = index
        .rebuild(&journal, |path, err| {
            if err.is_some() {
                failed_files.push(path.to_path_buf());
            }
        })
        .unwrap();
    assert_eq!(report.files_processed, 2);
    assert_eq!(report.entries_indexed, 1);
    assert_eq!(report.errors, 1);
    assert_eq!(failed_files.len(), 1);
    assert!(failed_files[0].ends_with("2026-01-18.md"));
}

#[test]
fn test_rebuild_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let journal = dir.path().join("journal");
    std::fs::create_dir_all(&journal).unwrap();
    let a = with_context(entry("2026-01-17-001", "a"), "work");
    std::fs::write(journal.join("2026-01-17.md"), crate::codec::encode_entry(&a)).unwrap();

    let index = JournalIndex::open(&journal).unwrap();
    let first = index.rebuild(&journal, |_, _| {}).unwrap();
    let rows_first = index.query(&QueryParams::default()).unwrap();
    let second = index.rebuild(&journal, |_, _| {}).unwrap();
    let rows_second = index.query(&QueryParams::default()).unwrap();

    assert_eq!(first, second);
    assert_eq!(rows_first.total, rows_second.total);
    assert_eq!(rows_first.entries, rows_second.entries);
}

#[test]
fn test_stats_shape() {
    let index = JournalIndex::in_memory().unwrap();
    index
        .index_entry(
            &with_tool(entry("2026-01-17-001", "a"), "bash", Outcome::Success, 10),
            file(),
        )
        .unwrap();
    index.index_entry(&entry("2026-01-18-001", "b"), file()).unwrap();

    let stats = index.stats().unwrap();
    assert_eq!(stats["total_entries"], 2);
    assert_eq!(stats["by_type"]["entry"], 2);
    assert_eq!(stats["by_outcome"]["success"], 1);
    assert_eq!(stats["date_range"]["min"], "2026-01-17");
    assert_eq!(stats["date_range"]["max"], "2026-01-18");
    assert_eq!(stats["top_tools"]["bash"], 1);
}

#[test]
fn test_round_trip_entry_fields_through_index() {
    let index = JournalIndex::in_memory().unwrap();
    let mut e = with_tool(
        with_context(entry("2026-01-17-001", "claude"), "ran make"),
        "bash",
        Outcome::Failure,
        4500,
    );
    e.caused_by = vec!["2026-01-16-002".into()];
    e.references = vec!["config/build.toml".into()];
    e.diagnostics.exit_code = Some(-11);
    e.diagnostics.error_type = Some("Segfault".into());

    index.index_entry(&e, file()).unwrap();
    let row = index.get("2026-01-17-001").unwrap().unwrap();
    assert_eq!(row["author"], "claude");
    assert_eq!(row["context"], "ran make");
    assert_eq!(row["outcome"], "failure");
    assert_eq!(row["caused_by"][0], "2026-01-16-002");
    assert_eq!(row["references"][0], "config/build.toml");
    assert_eq!(row["duration_ms"], 4500);
    assert_eq!(row["exit_code"], -11);
    assert_eq!(row["error_type"], "Segfault");
    assert_eq!(row["date"], "2026-01-17");
}
