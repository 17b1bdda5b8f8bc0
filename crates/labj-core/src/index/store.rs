//! SQLite-backed implementation of the journal index.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use serde_json::{Map, Value, json};

use super::fts::{escape_fts_phrase, escape_fts_query};
use crate::codec;
use crate::error::{JournalError, Result};
use crate::models::{Entry, EntryKind, Narrative};

/// Schema SQL embedded at compile time.
const SCHEMA_SQL: &str = include_str!("schema.sql");

/// Current schema version recorded in the `meta` table.
pub const SCHEMA_VERSION: i64 = 1;

/// Database busy timeout. Writers in other processes get this long to
/// release the database before an operation fails.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Fields accepted as equality filters. Anything else is silently dropped —
/// filter keys never reach the SQL text.
const FILTER_FIELDS: [&str; 6] = [
    "author",
    "outcome",
    "entry_type",
    "template",
    "tool",
    "error_type",
];

/// Fields accepted for `ORDER BY`. Unknown fields fall back to `timestamp`.
const ORDER_FIELDS: [&str; 5] = ["timestamp", "entry_id", "author", "outcome", "duration_ms"];

/// Fields accepted for `GROUP BY` in aggregations.
const GROUP_FIELDS: [&str; 7] = [
    "tool",
    "outcome",
    "author",
    "template",
    "date",
    "entry_type",
    "error_type",
];

/// Numeric fields accepted in aggregation expressions.
const NUMERIC_FIELDS: [&str; 2] = ["duration_ms", "exit_code"];

/// Column list shared by every row-returning query.
const ENTRY_COLUMNS: &str = "entry_id, timestamp, date, author, entry_type, outcome, template, \
     context, intent, action, observation, analysis, next_steps, \
     references_entry, correction, actual, impact, \
     config_used, log_produced, caused_by, refs, \
     tool, command, duration_ms, exit_code, error_type, file_path";

/// Structured retrieval parameters for [`JournalIndex::query`].
#[derive(Debug, Clone)]
pub struct QueryParams {
    /// Equality filters over the whitelisted fields.
    pub filters: BTreeMap<String, String>,
    /// Full-text search over the narrative mirror.
    pub text_search: Option<String>,
    /// Inclusive start date, `YYYY-MM-DD`.
    pub date_from: Option<String>,
    /// Inclusive end date, `YYYY-MM-DD`.
    pub date_to: Option<String>,
    /// Maximum rows returned; must be in `[1, 1000]`.
    pub limit: u64,
    /// Rows to skip.
    pub offset: u64,
    /// Ordering field; unknown fields fall back to `timestamp`.
    pub order_by: Option<String>,
    /// Descending order when true (the default).
    pub order_desc: bool,
}

impl Default for QueryParams {
    fn default() -> Self {
        Self {
            filters: BTreeMap::new(),
            text_search: None,
            date_from: None,
            date_to: None,
            limit: 100,
            offset: 0,
            order_by: None,
            order_desc: true,
        }
    }
}

/// Result page of a [`JournalIndex::query`].
#[derive(Debug, Clone)]
pub struct QueryResult {
    /// Matching rows in requested order, as flat JSON objects.
    pub entries: Vec<Value>,
    /// Total matching rows ignoring pagination.
    pub total: u64,
    /// Whether rows beyond this page exist.
    pub has_more: bool,
}

/// Parameters for [`JournalIndex::aggregate`].
#[derive(Debug, Clone, Default)]
pub struct AggregateRequest {
    /// Grouping field; `None` yields a single totals row.
    pub group_by: Option<String>,
    /// Aggregation items: `count` or `{avg|sum|min|max}:{numeric_field}`.
    pub aggregations: Vec<String>,
    /// Equality filters, same whitelist as queries.
    pub filters: BTreeMap<String, String>,
    /// Inclusive start date.
    pub date_from: Option<String>,
    /// Inclusive end date.
    pub date_to: Option<String>,
}

/// Outcome of an index rebuild.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebuildReport {
    /// Daily files visited.
    pub files_processed: u64,
    /// Entries inserted.
    pub entries_indexed: u64,
    /// Files skipped because they failed to parse.
    pub errors: u64,
}

/// The SQLite index over one journal directory.
///
/// Exactly one connection per engine instance; operations serialize on the
/// internal mutex.
pub struct JournalIndex {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl JournalIndex {
    /// Opens or creates the index at `{journal_dir}/.index.db`.
    ///
    /// Enables WAL mode, sets the busy timeout, and ensures the schema is at
    /// the current version (running forward-only migrations when behind).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized, or
    /// if the on-disk schema version is newer than this build understands.
    pub fn open(journal_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(journal_dir)
            .map_err(|e| JournalError::io("create journal directory", e))?;
        let db_path = journal_dir.join(".index.db");
        let conn = Connection::open(&db_path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(SCHEMA_SQL)?;
        Self::ensure_version(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path,
        })
    }

    /// In-memory index for tests.
    ///
    /// # Errors
    ///
    /// Returns an error if initialization fails.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Self::ensure_version(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: PathBuf::from(":memory:"),
        })
    }

    /// Path of the database file.
    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn ensure_version(conn: &Connection) -> Result<()> {
        let version: Option<i64> = conn
            .query_row("SELECT version FROM meta LIMIT 1", [], |row| row.get(0))
            .optional()?;
        match version {
            None => {
                conn.execute("INSERT INTO meta (version) VALUES (?1)", params![SCHEMA_VERSION])?;
            }
            Some(v) if v < SCHEMA_VERSION => {
                // Forward-only migrations land here as versions grow.
                conn.execute("UPDATE meta SET version = ?1", params![SCHEMA_VERSION])?;
            }
            Some(v) if v > SCHEMA_VERSION => {
                return Err(JournalError::Config {
                    message: format!(
                        "index schema version {v} is newer than supported version {SCHEMA_VERSION}"
                    ),
                });
            }
            Some(_) => {}
        }
        Ok(())
    }

    /// Upserts an entry row and its FTS mirror. Idempotent by `entry_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the statement fails.
    pub fn index_entry(&self, entry: &Entry, file_path: &Path) -> Result<()> {
        let conn = self.conn.lock().expect("index mutex poisoned");
        insert_entry(&conn, entry, file_path)?;
        Ok(())
    }

    /// Removes an entry row (the FTS mirror follows via trigger).
    ///
    /// Used only during rebuild. Returns whether a row was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the statement fails.
    pub fn delete_entry(&self, entry_id: &str) -> Result<bool> {
        let conn = self.conn.lock().expect("index mutex poisoned");
        let n = conn.execute("DELETE FROM entries WHERE entry_id = ?1", params![entry_id])?;
        Ok(n > 0)
    }

    /// Fetches one entry row as a flat JSON object.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get(&self, entry_id: &str) -> Result<Option<Value>> {
        let conn = self.conn.lock().expect("index mutex poisoned");
        let mut stmt =
            conn.prepare(&format!("SELECT {ENTRY_COLUMNS} FROM entries WHERE entry_id = ?1"))?;
        let row = stmt
            .query_row(params![entry_id], row_to_json)
            .optional()?;
        Ok(row)
    }

    /// Whether an entry id is present in the index.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn exists(&self, entry_id: &str) -> Result<bool> {
        let conn = self.conn.lock().expect("index mutex poisoned");
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM entries WHERE entry_id = ?1",
                params![entry_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Highest per-day sequence number indexed for a date, if any.
    ///
    /// Cross-checked against the daily file during id allocation.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn max_sequence(&self, date: &str) -> Result<Option<u32>> {
        let conn = self.conn.lock().expect("index mutex poisoned");
        let mut stmt = conn.prepare("SELECT entry_id FROM entries WHERE date = ?1")?;
        let ids = stmt
            .query_map(params![date], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(ids
            .iter()
            .filter_map(|id| id.rsplit('-').next()?.parse::<u32>().ok())
            .max())
    }

    /// Rows whose `caused_by` list contains the given entry id (the forward
    /// edge of the causality relation).
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn caused_by_of(&self, entry_id: &str) -> Result<Vec<Value>> {
        let conn = self.conn.lock().expect("index mutex poisoned");
        let pattern = format!("%\"{entry_id}\"%");
        let mut stmt = conn.prepare(&format!(
            "SELECT {ENTRY_COLUMNS} FROM entries WHERE caused_by LIKE ?1 ORDER BY entry_id ASC"
        ))?;
        let rows = stmt
            .query_map(params![pattern], row_to_json)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        // The LIKE is a coarse prefilter over the JSON text; confirm on the
        // parsed list.
        Ok(rows
            .into_iter()
            .filter(|row| {
                row["caused_by"]
                    .as_array()
                    .is_some_and(|list| list.iter().any(|v| v == entry_id))
            })
            .collect())
    }

    /// Amendment rows whose `references_entry` is the given entry id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn amendments_of(&self, entry_id: &str) -> Result<Vec<Value>> {
        let conn = self.conn.lock().expect("index mutex poisoned");
        let mut stmt = conn.prepare(&format!(
            "SELECT {ENTRY_COLUMNS} FROM entries \
             WHERE entry_type = 'amendment' AND references_entry = ?1 \
             ORDER BY entry_id ASC"
        ))?;
        let rows = stmt
            .query_map(params![entry_id], row_to_json)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Structured retrieval with filters, text search, date range,
    /// pagination, and whitelisted ordering.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::InvalidArgument`] for an out-of-range limit or
    /// a malformed date; database failures surface as-is.
    pub fn query(&self, query: &QueryParams) -> Result<QueryResult> {
        if query.limit == 0 || query.limit > 1000 {
            return Err(JournalError::invalid(format!(
                "limit must be in [1, 1000], got {}",
                query.limit
            )));
        }

        let text = query.text_search.as_deref().filter(|t| !t.is_empty());
        match self.query_escaped(query, text.map(escape_fts_query).as_deref()) {
            // Operator passthrough can hand FTS5 a string it cannot parse
            // (a dangling AND, an unclosed quote). Retry as the literal
            // phrase the user typed rather than surfacing a syntax error.
            Err(JournalError::Database(_)) if text.is_some() => {
                self.query_escaped(query, text.map(escape_fts_phrase).as_deref())
            }
            other => other,
        }
    }

    fn query_escaped(
        &self,
        query: &QueryParams,
        escaped_text: Option<&str>,
    ) -> Result<QueryResult> {
        let mut conditions: Vec<String> = Vec::new();
        let mut args: Vec<SqlValue> = Vec::new();
        build_conditions(
            &mut conditions,
            &mut args,
            &query.filters,
            query.date_from.as_deref(),
            query.date_to.as_deref(),
        )?;

        if let Some(escaped) = escaped_text {
            conditions.push(
                "entry_id IN (SELECT entry_id FROM entries_fts WHERE entries_fts MATCH ?)"
                    .to_string(),
            );
            args.push(SqlValue::Text(escaped.to_string()));
        }

        let where_clause = render_where(&conditions);

        let order_by = query
            .order_by
            .as_deref()
            .filter(|f| ORDER_FIELDS.contains(f))
            .unwrap_or("timestamp");
        let direction = if query.order_desc { "DESC" } else { "ASC" };

        let conn = self.conn.lock().expect("index mutex poisoned");

        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM entries {where_clause}"),
            params_from_iter(args.iter()),
            |row| row.get(0),
        )?;

        // entry_id tiebreak keeps pagination stable when the order field has
        // duplicates.
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM entries {where_clause} \
             ORDER BY {order_by} {direction}, entry_id {direction} \
             LIMIT ? OFFSET ?"
        );
        args.push(SqlValue::Integer(query.limit as i64));
        args.push(SqlValue::Integer(query.offset as i64));

        let mut stmt = conn.prepare(&sql)?;
        let entries = stmt
            .query_map(params_from_iter(args.iter()), row_to_json)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let total = total.max(0) as u64;
        let has_more = query.offset + (entries.len() as u64) < total;
        Ok(QueryResult {
            entries,
            total,
            has_more,
        })
    }

    /// Grouped statistics over entries.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::InvalidArgument`] for an unknown `group_by`
    /// or malformed date. Invalid aggregation items are silently dropped; if
    /// all drop, the result carries only `count`.
    pub fn aggregate(&self, request: &AggregateRequest) -> Result<Value> {
        if let Some(group) = request.group_by.as_deref() {
            if !GROUP_FIELDS.contains(&group) {
                return Err(JournalError::invalid(format!(
                    "unknown group_by field '{group}'"
                )));
            }
        }

        let mut exprs: Vec<String> = Vec::new();
        let mut names: Vec<String> = Vec::new();
        for item in &request.aggregations {
            if item == "count" {
                exprs.push("COUNT(*)".to_string());
                names.push("count".to_string());
            } else if let Some((op, field)) = item.split_once(':') {
                if ["avg", "sum", "min", "max"].contains(&op) && NUMERIC_FIELDS.contains(&field) {
                    exprs.push(format!("{}({field})", op.to_uppercase()));
                    names.push(format!("{op}_{field}"));
                }
                // Anything else is dropped without error.
            }
        }
        if exprs.is_empty() {
            exprs.push("COUNT(*)".to_string());
            names.push("count".to_string());
        }

        let mut conditions: Vec<String> = Vec::new();
        let mut args: Vec<SqlValue> = Vec::new();
        build_conditions(
            &mut conditions,
            &mut args,
            &request.filters,
            request.date_from.as_deref(),
            request.date_to.as_deref(),
        )?;
        let where_clause = render_where(&conditions);
        let expr_list = exprs.join(", ");

        let conn = self.conn.lock().expect("index mutex poisoned");

        let mut groups: Vec<Value> = Vec::new();
        if let Some(group) = request.group_by.as_deref() {
            let sql = format!(
                "SELECT {group}, {expr_list} FROM entries {where_clause} \
                 GROUP BY {group} ORDER BY {} DESC",
                exprs[0]
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params_from_iter(args.iter()))?;
            while let Some(row) = rows.next()? {
                let key: Option<String> = row.get(0)?;
                let mut obj = Map::new();
                obj.insert(
                    group.to_string(),
                    json!(key.unwrap_or_else(|| "(none)".to_string())),
                );
                for (i, name) in names.iter().enumerate() {
                    obj.insert(name.clone(), read_aggregate_value(row, i + 1, name)?);
                }
                groups.push(Value::Object(obj));
            }
        }

        let totals_sql = format!("SELECT {expr_list} FROM entries {where_clause}");
        let mut totals = Map::new();
        conn.query_row(&totals_sql, params_from_iter(args.iter()), |row| {
            for (i, name) in names.iter().enumerate() {
                let value = read_aggregate_value(row, i, name)?;
                totals.insert(name.clone(), value);
            }
            Ok(())
        })?;

        Ok(json!({
            "group_by": request.group_by,
            "groups": groups,
            "totals": Value::Object(totals),
        }))
    }

    /// Entries whose recorded duration meets the threshold, longest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn active(&self, threshold_ms: u64, tool_filter: Option<&str>) -> Result<Vec<Value>> {
        let conn = self.conn.lock().expect("index mutex poisoned");
        let mut conditions = vec!["duration_ms >= ?".to_string()];
        let mut args: Vec<SqlValue> = vec![SqlValue::Integer(threshold_ms as i64)];
        if let Some(tool) = tool_filter {
            conditions.push("tool = ?".to_string());
            args.push(SqlValue::Text(tool.to_string()));
        }
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM entries WHERE {} \
             ORDER BY duration_ms DESC LIMIT 50",
            conditions.join(" AND ")
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(args.iter()), row_to_json)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Clears the index and reinserts every entry parsed from the journal
    /// directory, all inside a single transaction.
    ///
    /// Files named `INDEX.md` and hidden files are skipped. A file that
    /// fails to parse is reported to `progress` and skipped; it does not
    /// abort the rebuild.
    ///
    /// # Errors
    ///
    /// Returns an error on database failure or if the directory cannot be
    /// listed.
    pub fn rebuild(
        &self,
        journal_dir: &Path,
        mut progress: impl FnMut(&Path, Option<&JournalError>),
    ) -> Result<RebuildReport> {
        let mut files: Vec<PathBuf> = Vec::new();
        if journal_dir.exists() {
            let iter = std::fs::read_dir(journal_dir)
                .map_err(|e| JournalError::io("list journal directory", e))?;
            for dir_entry in iter {
                let dir_entry = dir_entry.map_err(|e| JournalError::io("list journal directory", e))?;
                let path = dir_entry.path();
                let name = dir_entry.file_name().to_string_lossy().into_owned();
                if name.starts_with('.') || name == "INDEX.md" || !name.ends_with(".md") {
                    continue;
                }
                files.push(path);
            }
        }
        files.sort();

        let mut report = RebuildReport::default();
        let mut conn = self.conn.lock().expect("index mutex poisoned");
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM entries", [])?;

        for file in &files {
            report.files_processed += 1;
            progress(file, None);
            let content = match std::fs::read_to_string(file) {
                Ok(content) => content,
                Err(e) => {
                    let err = JournalError::io(format!("read {}", file.display()), e);
                    tracing::warn!(file = %file.display(), error = %err, "rebuild: unreadable file skipped");
                    progress(file, Some(&err));
                    report.errors += 1;
                    continue;
                }
            };
            match codec::decode_file(&content, file) {
                Ok(decoded) => {
                    for d in decoded {
                        insert_entry(&tx, &d.entry, file)?;
                        report.entries_indexed += 1;
                    }
                }
                Err(err) => {
                    tracing::warn!(file = %file.display(), error = %err, "rebuild: unparsable file skipped");
                    progress(file, Some(&err));
                    report.errors += 1;
                }
            }
        }

        tx.commit()?;
        Ok(report)
    }

    /// Overall index statistics for UX surfaces.
    ///
    /// # Errors
    ///
    /// Returns an error if any statistics query fails.
    pub fn stats(&self) -> Result<Value> {
        let conn = self.conn.lock().expect("index mutex poisoned");

        let total: i64 = conn.query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))?;

        let by_type = group_counts(
            &conn,
            "SELECT entry_type, COUNT(*) FROM entries GROUP BY entry_type",
        )?;
        let by_outcome = group_counts(
            &conn,
            "SELECT outcome, COUNT(*) FROM entries WHERE outcome IS NOT NULL GROUP BY outcome",
        )?;
        let top_authors = group_counts(
            &conn,
            "SELECT author, COUNT(*) FROM entries GROUP BY author ORDER BY COUNT(*) DESC LIMIT 10",
        )?;
        let top_tools = group_counts(
            &conn,
            "SELECT tool, COUNT(*) FROM entries WHERE tool IS NOT NULL \
             GROUP BY tool ORDER BY COUNT(*) DESC LIMIT 10",
        )?;

        let (date_min, date_max): (Option<String>, Option<String>) =
            conn.query_row("SELECT MIN(date), MAX(date) FROM entries", [], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?;

        Ok(json!({
            "total_entries": total,
            "by_type": by_type,
            "by_outcome": by_outcome,
            "date_range": { "min": date_min, "max": date_max },
            "top_authors": top_authors,
            "top_tools": top_tools,
        }))
    }
}

/// Shared insert used by live indexing and rebuild.
fn insert_entry(conn: &Connection, entry: &Entry, file_path: &Path) -> Result<()> {
    let narrative = entry.narrative().cloned().unwrap_or_else(Narrative::default);
    let (references_entry, correction, actual, impact) = match &entry.kind {
        EntryKind::Amendment {
            amends,
            correction,
            actual,
            impact,
        } => (
            Some(amends.to_string()),
            Some(correction.clone()),
            Some(actual.clone()),
            Some(impact.clone()),
        ),
        EntryKind::Entry { .. } => (None, None, None, None),
    };

    let caused_by = if entry.caused_by.is_empty() {
        None
    } else {
        Some(serde_json::to_string(&entry.caused_by).expect("string list serializes"))
    };
    let refs = if entry.references.is_empty() {
        None
    } else {
        Some(serde_json::to_string(&entry.references).expect("string list serializes"))
    };

    conn.execute(
        "INSERT OR REPLACE INTO entries (
            entry_id, timestamp, date, author, entry_type, outcome, template,
            context, intent, action, observation, analysis, next_steps,
            references_entry, correction, actual, impact,
            config_used, log_produced, caused_by, refs,
            tool, command, duration_ms, exit_code, error_type, file_path
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                   ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27)",
        params![
            entry.id.to_string(),
            entry.timestamp_str(),
            entry.id.date().format("%Y-%m-%d").to_string(),
            entry.author,
            entry.kind.type_name(),
            entry.outcome.map(|o| o.as_str()),
            entry.template,
            narrative.context,
            narrative.intent,
            narrative.action,
            narrative.observation,
            narrative.analysis,
            narrative.next_steps,
            references_entry,
            correction,
            actual,
            impact,
            entry.config_used,
            entry.log_produced,
            caused_by,
            refs,
            entry.diagnostics.tool,
            entry.diagnostics.command,
            entry.diagnostics.duration_ms.map(|d| d as i64),
            entry.diagnostics.exit_code,
            entry.diagnostics.error_type,
            file_path.to_string_lossy().into_owned(),
        ],
    )?;
    Ok(())
}

/// Appends whitelisted filter and date-range conditions.
fn build_conditions(
    conditions: &mut Vec<String>,
    args: &mut Vec<SqlValue>,
    filters: &BTreeMap<String, String>,
    date_from: Option<&str>,
    date_to: Option<&str>,
) -> Result<()> {
    for (field, value) in filters {
        if !FILTER_FIELDS.contains(&field.as_str()) {
            continue;
        }
        conditions.push(format!("{field} = ?"));
        args.push(SqlValue::Text(value.clone()));
    }
    if let Some(from) = date_from {
        validate_date(from)?;
        conditions.push("date >= ?".to_string());
        args.push(SqlValue::Text(from.to_string()));
    }
    if let Some(to) = date_to {
        validate_date(to)?;
        conditions.push("date <= ?".to_string());
        args.push(SqlValue::Text(to.to_string()));
    }
    Ok(())
}

fn render_where(conditions: &[String]) -> String {
    if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    }
}

fn validate_date(date: &str) -> Result<()> {
    chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map(|_| ())
        .map_err(|_| JournalError::invalid(format!("malformed date '{date}' (expected YYYY-MM-DD)")))
}

/// Reads one aggregation column. `count` is an integer; `avg_*` is a float;
/// sums and extrema of integer columns come back integral. NULL (no non-null
/// inputs) serializes as JSON null.
fn read_aggregate_value(
    row: &rusqlite::Row<'_>,
    idx: usize,
    name: &str,
) -> rusqlite::Result<Value> {
    if name == "count" {
        let n: i64 = row.get(idx)?;
        return Ok(json!(n));
    }
    let value: Option<f64> = row.get(idx)?;
    Ok(match value {
        None => Value::Null,
        Some(v) if name.starts_with("avg_") => json!(v),
        Some(v) if v.fract() == 0.0 => json!(v as i64),
        Some(v) => json!(v),
    })
}

fn group_counts(conn: &Connection, sql: &str) -> Result<Value> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query([])?;
    let mut map = Map::new();
    while let Some(row) = rows.next()? {
        let key: Option<String> = row.get(0)?;
        let count: i64 = row.get(1)?;
        map.insert(key.unwrap_or_else(|| "(none)".to_string()), json!(count));
    }
    Ok(Value::Object(map))
}

/// Converts a row with the [`ENTRY_COLUMNS`] layout into a flat JSON object.
fn row_to_json(row: &rusqlite::Row<'_>) -> rusqlite::Result<Value> {
    let mut m = Map::new();
    let text = |i: usize| -> rusqlite::Result<Value> {
        let v: Option<String> = row.get(i)?;
        Ok(v.map_or(Value::Null, Value::String))
    };

    m.insert("entry_id".into(), text(0)?);
    m.insert("timestamp".into(), text(1)?);
    m.insert("date".into(), text(2)?);
    m.insert("author".into(), text(3)?);
    m.insert("entry_type".into(), text(4)?);
    m.insert("outcome".into(), text(5)?);
    m.insert("template".into(), text(6)?);
    m.insert("context".into(), text(7)?);
    m.insert("intent".into(), text(8)?);
    m.insert("action".into(), text(9)?);
    m.insert("observation".into(), text(10)?);
    m.insert("analysis".into(), text(11)?);
    m.insert("next_steps".into(), text(12)?);
    m.insert("references_entry".into(), text(13)?);
    m.insert("correction".into(), text(14)?);
    m.insert("actual".into(), text(15)?);
    m.insert("impact".into(), text(16)?);
    m.insert("config_used".into(), text(17)?);
    m.insert("log_produced".into(), text(18)?);

    let caused_by: Option<String> = row.get(19)?;
    m.insert("caused_by".into(), parse_json_list(caused_by.as_deref()));
    let refs: Option<String> = row.get(20)?;
    m.insert("references".into(), parse_json_list(refs.as_deref()));

    m.insert("tool".into(), text(21)?);
    m.insert("command".into(), text(22)?);
    let duration: Option<i64> = row.get(23)?;
    m.insert("duration_ms".into(), duration.map_or(Value::Null, |v| json!(v)));
    let exit_code: Option<i64> = row.get(24)?;
    m.insert("exit_code".into(), exit_code.map_or(Value::Null, |v| json!(v)));
    m.insert("error_type".into(), text(25)?);
    m.insert("file_path".into(), text(26)?);

    Ok(Value::Object(m))
}

fn parse_json_list(raw: Option<&str>) -> Value {
    raw.and_then(|s| serde_json::from_str::<Vec<String>>(s).ok())
        .map_or_else(|| json!([]), |list| json!(list))
}
