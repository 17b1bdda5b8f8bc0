//! Tool dispatch: the contract seen by the outer JSON-RPC layer.
//!
//! The outer layer hands in a tool name and a JSON argument object and gets
//! back a structured JSON result. Errors are encoded as
//! `{"status": "error", "error": "{Kind}", "message": "..."}` so the wire
//! layer never has to understand engine error types. Custom tools supplied
//! at construction are consulted before the built-ins.

use std::collections::BTreeMap;

use serde_json::{Map, Value, json};

use crate::artifact::SnapshotOptions;
use crate::engine::{HandoffFormat, HandoffOptions, JournalEngine, NewEntry, ReadSelector};
use crate::error::{JournalError, Result};
use crate::index::{AggregateRequest, QueryParams};
use crate::models::{Diagnostics, Narrative, TimelineEventKind};

/// A caller-supplied tool dispatched by name.
///
/// The engine knows nothing about a custom tool's semantics, only its
/// invocation point.
pub trait CustomTool: Send + Sync {
    /// Handles one invocation.
    ///
    /// # Errors
    ///
    /// Errors surface to the wire layer through the standard envelope.
    fn call(&self, engine: &JournalEngine, args: &Value) -> Result<Value>;
}

/// Name-keyed registry of custom tools.
pub type CustomTools = BTreeMap<String, Box<dyn CustomTool>>;

/// Names of every built-in tool, in the order the help surface lists them.
pub const TOOL_NAMES: [&str; 20] = [
    "append",
    "amend",
    "read",
    "query",
    "search",
    "stats",
    "active",
    "archive_config",
    "activate_config",
    "diff_config",
    "preserve_log",
    "state_snapshot",
    "timeline",
    "trace_causality",
    "session_handoff",
    "rebuild_artifact_index",
    "rebuild_index",
    "list_templates",
    "get_template",
    "help",
];

/// Dispatches one tool call, encoding any failure into the error envelope.
#[must_use]
pub fn dispatch(engine: &JournalEngine, custom: &CustomTools, name: &str, args: &Value) -> Value {
    match dispatch_result(engine, custom, name, args) {
        Ok(value) => value,
        Err(err) => json!({
            "status": "error",
            "error": err.kind(),
            "message": err.to_string(),
        }),
    }
}

/// Dispatches one tool call, surfacing failures as [`JournalError`].
///
/// # Errors
///
/// [`JournalError::InvalidArgument`] for unknown tools or malformed
/// arguments; otherwise whatever the underlying operation returns.
pub fn dispatch_result(
    engine: &JournalEngine,
    custom: &CustomTools,
    name: &str,
    args: &Value,
) -> Result<Value> {
    if let Some(tool) = custom.get(name) {
        return tool.call(engine, args);
    }

    match name {
        "append" => append(engine, args),
        "amend" => amend(engine, args),
        "read" => read(engine, args),
        "query" => query(engine, args),
        "search" => search(engine, args),
        "stats" => stats(engine, args),
        "active" => active(engine, args),
        "archive_config" => archive_config(engine, args),
        "activate_config" => activate_config(engine, args),
        "diff_config" => diff_config(engine, args),
        "preserve_log" => preserve_log(engine, args),
        "state_snapshot" => state_snapshot(engine, args),
        "timeline" => timeline(engine, args),
        "trace_causality" => trace_causality(engine, args),
        "session_handoff" => session_handoff(engine, args),
        "rebuild_artifact_index" => rebuild_artifact_index(engine, args),
        "rebuild_index" => rebuild_index(engine),
        "list_templates" => Ok(list_templates(engine)),
        "get_template" => get_template(engine, args),
        "help" => Ok(help(args)),
        other => Err(JournalError::invalid(format!("unknown tool '{other}'"))),
    }
}

// ---------------------------------------------------------------------------
// Argument helpers
// ---------------------------------------------------------------------------

fn opt_str(args: &Value, key: &str) -> Option<String> {
    args.get(key).and_then(Value::as_str).map(str::to_string)
}

fn req_str(args: &Value, key: &str) -> Result<String> {
    opt_str(args, key)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| JournalError::invalid(format!("missing required argument '{key}'")))
}

fn opt_bool(args: &Value, key: &str, default: bool) -> bool {
    args.get(key).and_then(Value::as_bool).unwrap_or(default)
}

fn opt_u64(args: &Value, key: &str, default: u64) -> Result<u64> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(value) => value
            .as_u64()
            .ok_or_else(|| JournalError::invalid(format!("argument '{key}' must be a non-negative integer"))),
    }
}

fn opt_str_list(args: &Value, key: &str) -> Result<Vec<String>> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| {
                v.as_str().map(str::to_string).ok_or_else(|| {
                    JournalError::invalid(format!("argument '{key}' must be a list of strings"))
                })
            })
            .collect(),
        Some(_) => Err(JournalError::invalid(format!(
            "argument '{key}' must be a list of strings"
        ))),
    }
}

fn opt_str_map(args: &Value, key: &str) -> Result<BTreeMap<String, String>> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(BTreeMap::new()),
        Some(Value::Object(map)) => map
            .iter()
            .map(|(k, v)| {
                let text = match v {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    _ => {
                        return Err(JournalError::invalid(format!(
                            "argument '{key}.{k}' must be a scalar"
                        )));
                    }
                };
                Ok((k.clone(), text))
            })
            .collect(),
        Some(_) => Err(JournalError::invalid(format!(
            "argument '{key}' must be an object"
        ))),
    }
}

// ---------------------------------------------------------------------------
// Built-in tools
// ---------------------------------------------------------------------------

fn append(engine: &JournalEngine, args: &Value) -> Result<Value> {
    let new = NewEntry {
        author: req_str(args, "author")?,
        narrative: Narrative {
            context: opt_str(args, "context"),
            intent: opt_str(args, "intent"),
            action: opt_str(args, "action"),
            observation: opt_str(args, "observation"),
            analysis: opt_str(args, "analysis"),
            next_steps: opt_str(args, "next_steps"),
        },
        caused_by: opt_str_list(args, "caused_by")?,
        references: opt_str_list(args, "references")?,
        config_used: opt_str(args, "config_used"),
        log_produced: opt_str(args, "log_produced"),
        outcome: opt_str(args, "outcome").map(|o| o.parse()).transpose()?,
        template: opt_str(args, "template"),
        template_values: opt_str_map(args, "template_values")?,
        diagnostics: Diagnostics {
            tool: opt_str(args, "tool"),
            command: opt_str(args, "command"),
            duration_ms: args.get("duration_ms").and_then(Value::as_u64),
            exit_code: args.get("exit_code").and_then(Value::as_i64),
            error_type: opt_str(args, "error_type"),
        },
    };
    Ok(engine.append(new)?.to_json())
}

fn amend(engine: &JournalEngine, args: &Value) -> Result<Value> {
    let entry = engine.amend(
        &req_str(args, "references_entry")?,
        &req_str(args, "correction")?,
        &req_str(args, "actual")?,
        &req_str(args, "impact")?,
        &req_str(args, "author")?,
    )?;
    Ok(entry.to_json())
}

fn read(engine: &JournalEngine, args: &Value) -> Result<Value> {
    let entry_id = opt_str(args, "entry_id");
    let date = opt_str(args, "date");
    let date_from = opt_str(args, "date_from");
    let date_to = opt_str(args, "date_to");

    let by_range = date_from.is_some() || date_to.is_some();
    let mode_count =
        usize::from(entry_id.is_some()) + usize::from(date.is_some()) + usize::from(by_range);
    if mode_count != 1 {
        return Err(JournalError::invalid(
            "read requires exactly one of entry_id, date, or date_from/date_to",
        ));
    }

    let selector = if let Some(id) = entry_id {
        ReadSelector::ById(id)
    } else if let Some(date) = date {
        ReadSelector::ByDate(date)
    } else {
        ReadSelector::ByRange { date_from, date_to }
    };

    let entries = engine.read(&selector, opt_bool(args, "include_content", true))?;
    let count = entries.len();
    Ok(json!({ "entries": entries, "count": count }))
}

fn query(engine: &JournalEngine, args: &Value) -> Result<Value> {
    let result = engine.query(QueryParams {
        filters: opt_str_map(args, "filters")?,
        text_search: opt_str(args, "text_search"),
        date_from: opt_str(args, "date_from"),
        date_to: opt_str(args, "date_to"),
        limit: opt_u64(args, "limit", 100)?,
        offset: opt_u64(args, "offset", 0)?,
        order_by: opt_str(args, "order_by"),
        order_desc: opt_bool(args, "order_desc", true),
    })?;
    Ok(json!({
        "entries": result.entries,
        "total": result.total,
        "has_more": result.has_more,
    }))
}

fn search(engine: &JournalEngine, args: &Value) -> Result<Value> {
    let result = engine.search(
        &req_str(args, "query")?,
        opt_str(args, "author").as_deref(),
        opt_str(args, "date_from").as_deref(),
        opt_str(args, "date_to").as_deref(),
    )?;
    Ok(json!({
        "entries": result.entries,
        "total": result.total,
        "has_more": result.has_more,
    }))
}

fn stats(engine: &JournalEngine, args: &Value) -> Result<Value> {
    match opt_str(args, "group_by") {
        None => engine.stats(),
        Some(group_by) => engine.aggregate(AggregateRequest {
            group_by: Some(group_by),
            aggregations: {
                let list = opt_str_list(args, "aggregations")?;
                if list.is_empty() {
                    vec!["count".into()]
                } else {
                    list
                }
            },
            filters: opt_str_map(args, "filters")?,
            date_from: opt_str(args, "date_from"),
            date_to: opt_str(args, "date_to"),
        }),
    }
}

fn active(engine: &JournalEngine, args: &Value) -> Result<Value> {
    let threshold_ms = opt_u64(args, "threshold_ms", 30_000)?;
    let entries = engine.active(threshold_ms, opt_str(args, "tool").as_deref())?;
    let count = entries.len();
    Ok(json!({ "entries": entries, "count": count }))
}

fn archive_config(engine: &JournalEngine, args: &Value) -> Result<Value> {
    let record = engine.archive_config(
        &req_str(args, "file_path")?,
        &req_str(args, "reason")?,
        opt_str(args, "journal_entry").as_deref(),
        opt_str(args, "stage").as_deref(),
    )?;
    Ok(serde_json::to_value(&record).unwrap_or_default())
}

fn activate_config(engine: &JournalEngine, args: &Value) -> Result<Value> {
    let result = engine.activate_config(
        &req_str(args, "archive_path")?,
        &req_str(args, "target_path")?,
        &req_str(args, "reason")?,
        &req_str(args, "journal_entry")?,
    )?;
    Ok(json!({
        "superseded_archive": result.superseded_archive,
        "activated_path": result.activated_path,
        "source_archive": result.source_archive,
    }))
}

fn diff_config(engine: &JournalEngine, args: &Value) -> Result<Value> {
    let context_lines = opt_u64(args, "context_lines", 3)? as usize;
    engine.diff_config(
        &req_str(args, "path_a")?,
        &req_str(args, "path_b")?,
        context_lines,
    )
}

fn preserve_log(engine: &JournalEngine, args: &Value) -> Result<Value> {
    let outcome = opt_str(args, "outcome")
        .map(|o| o.parse())
        .transpose()?
        .unwrap_or_default();
    let record = engine.preserve_log(
        &req_str(args, "file_path")?,
        &req_str(args, "category")?,
        outcome,
    )?;
    Ok(serde_json::to_value(&record).unwrap_or_default())
}

fn state_snapshot(engine: &JournalEngine, args: &Value) -> Result<Value> {
    let options = SnapshotOptions {
        include_configs: opt_bool(args, "include_configs", true),
        include_env: opt_bool(args, "include_env", true),
        include_versions: opt_bool(args, "include_versions", true),
        include_build_dir_listing: opt_bool(args, "include_build_dir_listing", false),
        build_dir: opt_str(args, "build_dir"),
    };
    let (snapshot, path) = engine.state_snapshot(&req_str(args, "name")?, &options)?;
    Ok(json!({
        "snapshot_path": path,
        "name": snapshot.name,
        "timestamp": snapshot.timestamp.to_rfc3339(),
        "config_count": snapshot.configs.len(),
        "env_count": snapshot.environment.len(),
        "version_count": snapshot.versions.len(),
    }))
}

fn timeline(engine: &JournalEngine, args: &Value) -> Result<Value> {
    let kinds = match opt_str_list(args, "event_types")? {
        list if list.is_empty() => None,
        list => Some(
            list.iter()
                .map(|s| s.parse::<TimelineEventKind>())
                .collect::<Result<Vec<_>>>()?,
        ),
    };
    let limit = opt_u64(args, "limit", 100)? as usize;
    let events = engine.timeline(
        opt_str(args, "date_from").as_deref(),
        opt_str(args, "date_to").as_deref(),
        kinds.as_deref(),
        limit,
    )?;
    let count = events.len();
    Ok(json!({ "events": events, "count": count }))
}

fn trace_causality(engine: &JournalEngine, args: &Value) -> Result<Value> {
    let direction = opt_str(args, "direction")
        .unwrap_or_else(|| "both".into())
        .parse()?;
    let depth = opt_u64(args, "depth", 10)? as u32;
    engine.trace_causality(&req_str(args, "entry_id")?, direction, depth)
}

fn session_handoff(engine: &JournalEngine, args: &Value) -> Result<Value> {
    let format: HandoffFormat = opt_str(args, "format")
        .unwrap_or_else(|| "markdown".into())
        .parse()?;
    engine.session_handoff(&HandoffOptions {
        date_from: opt_str(args, "date_from"),
        date_to: opt_str(args, "date_to"),
        include_configs: opt_bool(args, "include_configs", true),
        include_logs: opt_bool(args, "include_logs", true),
        format,
    })
}

fn rebuild_artifact_index(engine: &JournalEngine, args: &Value) -> Result<Value> {
    let kind = req_str(args, "kind")?.parse()?;
    Ok(engine.rebuild_artifact_index(kind)?.to_json())
}

fn rebuild_index(engine: &JournalEngine) -> Result<Value> {
    let report = engine.rebuild_index()?;
    Ok(json!({
        "files_processed": report.files_processed,
        "entries_indexed": report.entries_indexed,
        "errors": report.errors,
    }))
}

fn list_templates(engine: &JournalEngine) -> Value {
    json!({
        "templates": engine.list_templates(),
        "require_templates": engine.config().validation.require_templates,
    })
}

fn get_template(engine: &JournalEngine, args: &Value) -> Result<Value> {
    let name = req_str(args, "name")?;
    engine
        .get_template(&name)
        .ok_or(JournalError::TemplateNotFound {
            name,
            available: engine.config().template_names(),
        })
}

// ---------------------------------------------------------------------------
// Help
// ---------------------------------------------------------------------------

const HELP_TOPICS: [(&str, &str); 5] = [
    (
        "overview",
        "Append-only lab journal: every action is recorded, nothing is deleted. \
         Daily markdown files under journal/ are the source of truth; configs/, \
         logs/, and snapshots/ hold archived artifacts with INDEX.md files; a \
         SQLite index backs query, search, and stats.",
    ),
    (
        "principles",
        "Five principles: append-only (corrections are amendments, never edits), \
         timestamped (UTC, ISO 8601), attributed (every entry has an author), \
         complete (capture context, intent, action, observation, analysis), \
         reproducible (archive configs, preserve logs, snapshot state).",
    ),
    (
        "workflow",
        "Start: state_snapshot, then append an entry with context and intent. \
         Before editing a config: archive_config. After work: preserve_log and \
         append the results with outcome and caused_by. End: session_handoff.",
    ),
    (
        "causality",
        "Link entries with caused_by (lists of entry ids, YYYY-MM-DD-NNN). \
         trace_causality walks the graph backward (causes), forward (effects), \
         or both, breadth-first with a depth cap.",
    ),
    (
        "errors",
        "DuplicateContent: bytes already archived (safe to ignore). \
         InvalidReference: caused_by target does not exist. NotFound: missing \
         entry or date. LockTimeout: another process holds the file lock; \
         retry. Recovery: rebuild_index and rebuild_artifact_index.",
    ),
];

fn help(args: &Value) -> Value {
    if let Some(tool) = opt_str(args, "tool") {
        if TOOL_NAMES.contains(&tool.as_str()) {
            return json!({
                "type": "tool",
                "tool": tool,
                "content": format!("'{tool}' is a built-in journal tool; see the overview topic for the workflow it belongs to."),
            });
        }
        return json!({
            "type": "error",
            "error": format!("unknown tool '{tool}'"),
            "available_tools": TOOL_NAMES,
        });
    }

    let topic = opt_str(args, "topic").unwrap_or_else(|| "overview".into());
    let topics: Map<String, Value> = HELP_TOPICS
        .iter()
        .map(|(name, _)| ((*name).to_string(), Value::Null))
        .collect();
    match HELP_TOPICS.iter().find(|(name, _)| *name == topic) {
        Some((name, content)) => json!({
            "type": "topic",
            "topic": name,
            "content": content,
            "related_topics": HELP_TOPICS
                .iter()
                .map(|(n, _)| *n)
                .filter(|n| *n != *name)
                .collect::<Vec<_>>(),
        }),
        None => json!({
            "type": "error",
            "error": format!("unknown topic '{topic}'"),
            "available_topics": topics.keys().collect::<Vec<_>>(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::TimeZone;
    use chrono::Utc;

    use super::*;
    use crate::clock::FixedClock;
    use crate::config::ProjectConfig;
    use crate::hooks::NoHooks;

    fn engine() -> (tempfile::TempDir, JournalEngine) {
        let dir = tempfile::tempdir().unwrap();
        let engine = JournalEngine::with_parts(
            ProjectConfig::for_root(dir.path()),
            Arc::new(FixedClock(Utc.with_ymd_and_hms(2026, 1, 17, 12, 0, 0).unwrap())),
            Box::new(NoHooks),
        )
        .unwrap();
        (dir, engine)
    }

    fn call(engine: &JournalEngine, name: &str, args: Value) -> Value {
        dispatch(engine, &CustomTools::new(), name, &args)
    }

    #[test]
    fn test_append_and_query_through_dispatch() {
        let (_dir, engine) = engine();
        let appended = call(
            &engine,
            "append",
            json!({ "author": "claude", "context": "dispatch test", "outcome": "success" }),
        );
        assert_eq!(appended["entry_id"], "2026-01-17-001");

        let result = call(&engine, "query", json!({ "filters": {"outcome": "success"} }));
        assert_eq!(result["total"], 1);
        assert_eq!(result["entries"][0]["context"], "dispatch test");
    }

    #[test]
    fn test_error_envelope_shape() {
        let (_dir, engine) = engine();
        let result = call(&engine, "append", json!({ "context": "no author" }));
        assert_eq!(result["status"], "error");
        assert_eq!(result["error"], "InvalidArgument");
        assert!(result["message"].as_str().unwrap().contains("author"));
    }

    #[test]
    fn test_unknown_tool_rejected() {
        let (_dir, engine) = engine();
        let result = call(&engine, "drop_all_tables", json!({}));
        assert_eq!(result["error"], "InvalidArgument");
    }

    #[test]
    fn test_read_requires_exactly_one_mode() {
        let (_dir, engine) = engine();
        let none = call(&engine, "read", json!({}));
        assert_eq!(none["error"], "InvalidArgument");

        let both = call(
            &engine,
            "read",
            json!({ "entry_id": "2026-01-17-001", "date": "2026-01-17" }),
        );
        assert_eq!(both["error"], "InvalidArgument");
    }

    #[test]
    fn test_amend_and_trace_through_dispatch() {
        let (_dir, engine) = engine();
        call(&engine, "append", json!({ "author": "a", "context": "ran make" }));
        let amended = call(
            &engine,
            "amend",
            json!({
                "references_entry": "2026-01-17-001",
                "correction": "said 30s",
                "actual": "was 45s",
                "impact": "baseline off",
                "author": "a",
            }),
        );
        assert_eq!(amended["entry_type"], "amendment");

        let trace = call(
            &engine,
            "trace_causality",
            json!({ "entry_id": "2026-01-17-001", "direction": "forward", "depth": 5 }),
        );
        assert_eq!(trace["root"], "2026-01-17-001");
    }

    #[test]
    fn test_stats_with_and_without_group_by() {
        let (_dir, engine) = engine();
        call(
            &engine,
            "append",
            json!({ "author": "a", "tool": "bash", "outcome": "success" }),
        );

        let overall = call(&engine, "stats", json!({}));
        assert_eq!(overall["total_entries"], 1);

        let grouped = call(&engine, "stats", json!({ "group_by": "tool" }));
        assert_eq!(grouped["groups"][0]["tool"], "bash");
        assert_eq!(grouped["groups"][0]["count"], 1);
    }

    #[test]
    fn test_artifact_tools_through_dispatch() {
        let (dir, engine) = engine();
        std::fs::write(dir.path().join("build.toml"), "X=1").unwrap();

        let archived = call(
            &engine,
            "archive_config",
            json!({ "file_path": "build.toml", "reason": "first" }),
        );
        assert!(archived["archive_path"].as_str().unwrap().contains("configs/build.toml/"));

        let duplicate = call(
            &engine,
            "archive_config",
            json!({ "file_path": "build.toml", "reason": "second" }),
        );
        assert_eq!(duplicate["error"], "DuplicateContent");

        std::fs::write(dir.path().join("out.log"), "text").unwrap();
        let preserved = call(
            &engine,
            "preserve_log",
            json!({ "file_path": "out.log", "category": "build", "outcome": "failure" }),
        );
        assert!(preserved["preserved_path"].as_str().unwrap().contains("logs/build/"));

        let rebuilt = call(&engine, "rebuild_artifact_index", json!({ "kind": "configs" }));
        assert_eq!(rebuilt["files_found"], 1);
    }

    #[test]
    fn test_snapshot_through_dispatch_requires_name() {
        let (_dir, engine) = engine();
        let missing = call(&engine, "state_snapshot", json!({}));
        assert_eq!(missing["error"], "InvalidArgument");

        let ok = call(
            &engine,
            "state_snapshot",
            json!({ "name": "s1", "include_env": false, "include_versions": false }),
        );
        assert!(ok["snapshot_path"].as_str().unwrap().contains("snapshots/"));
    }

    #[test]
    fn test_templates_and_help() {
        let (_dir, engine) = engine();
        let templates = call(&engine, "list_templates", json!({}));
        assert!(templates["templates"].as_array().unwrap().len() >= 3);

        let build = call(&engine, "get_template", json!({ "name": "build" }));
        assert_eq!(build["name"], "build");

        let missing = call(&engine, "get_template", json!({ "name": "zzz" }));
        assert_eq!(missing["error"], "TemplateNotFound");

        let overview = call(&engine, "help", json!({}));
        assert_eq!(overview["topic"], "overview");
        let errors = call(&engine, "help", json!({ "topic": "errors" }));
        assert!(errors["content"].as_str().unwrap().contains("DuplicateContent"));
    }

    #[test]
    fn test_custom_tool_takes_precedence() {
        struct Echo;
        impl CustomTool for Echo {
            fn call(&self, _engine: &JournalEngine, args: &Value) -> Result<Value> {
                Ok(json!({ "echoed": args.clone() }))
            }
        }

        let (_dir, engine) = engine();
        let mut custom: CustomTools = BTreeMap::new();
        custom.insert("stats".into(), Box::new(Echo));

        let result = dispatch(&engine, &custom, "stats", &json!({ "x": 1 }));
        assert_eq!(result["echoed"]["x"], 1);
    }
}
