//! The journal engine façade.
//!
//! [`JournalEngine`] composes the clock, the lock and atomic-writer, the
//! markdown codec, the SQLite index, and the artifact manager into the
//! operation surface the tool layer and CLI call. One engine instance owns
//! one project root; state shared with other processes is coordinated
//! exclusively through file locks.
//!
//! Writes go markdown-first: the daily file is rewritten atomically under
//! its lock, then the index row is upserted. A crash between the two leaves
//! a stale index that `rebuild_index` repairs; the markdown is never behind.

mod causality;
mod handoff;
mod timeline;


use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use serde_json::{Value, json};

pub use causality::Direction;
pub use handoff::{HandoffFormat, HandoffOptions};

use crate::artifact::ArtifactManager;
use crate::clock::{Clock, SystemClock};
use crate::codec;
use crate::config::ProjectConfig;
use crate::error::{JournalError, Result};
use crate::fsio::{ScopedLock, atomic_replace, read_if_exists};
use crate::hooks::{JournalHooks, NoHooks};
use crate::index::{AggregateRequest, JournalIndex, QueryParams, QueryResult, RebuildReport};
use crate::models::{Diagnostics, Entry, EntryId, EntryKind, Narrative, Outcome};

/// Fields for a new ordinary entry.
#[derive(Debug, Clone, Default)]
pub struct NewEntry {
    /// Who or what is making the entry. Required.
    pub author: String,
    /// Narrative body fields.
    pub narrative: Narrative,
    /// Entry ids that led to this entry.
    pub caused_by: Vec<String>,
    /// Cross-references to entries or files.
    pub references: Vec<String>,
    /// Config archive path used.
    pub config_used: Option<String>,
    /// Log path produced.
    pub log_produced: Option<String>,
    /// Outcome classification.
    pub outcome: Option<Outcome>,
    /// Template to construct the entry from.
    pub template: Option<String>,
    /// Values for the template's substitution fields.
    pub template_values: BTreeMap<String, String>,
    /// Diagnostic metadata.
    pub diagnostics: Diagnostics,
}

/// Which entries a [`JournalEngine::read`] selects. Exactly one mode.
#[derive(Debug, Clone)]
pub enum ReadSelector {
    /// One entry by id.
    ById(String),
    /// Every entry of one date.
    ByDate(String),
    /// Every entry in an inclusive date range; absent days are skipped.
    ByRange {
        /// Inclusive start date or token.
        date_from: Option<String>,
        /// Inclusive end date or token.
        date_to: Option<String>,
    },
}

/// The engine: one instance per project root.
pub struct JournalEngine {
    config: Arc<ProjectConfig>,
    clock: Arc<dyn Clock>,
    index: JournalIndex,
    artifacts: ArtifactManager,
    hooks: Box<dyn JournalHooks>,
}

impl JournalEngine {
    /// Opens an engine for a project root, loading `labj.toml` / `labj.json`
    /// when present.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration fails to load or the index
    /// cannot be opened.
    pub fn open(project_root: impl Into<PathBuf>) -> Result<Self> {
        let config = ProjectConfig::load(&project_root.into())?;
        Self::with_parts(config, Arc::new(SystemClock), Box::new(NoHooks))
    }

    /// Opens an engine with an explicit clock and hook registry.
    ///
    /// When the journal directory already holds daily files but no index
    /// database, the index is rebuilt automatically so queries see the full
    /// corpus.
    ///
    /// # Errors
    ///
    /// Returns an error if the index cannot be opened or the automatic
    /// rebuild fails.
    pub fn with_parts(
        config: ProjectConfig,
        clock: Arc<dyn Clock>,
        hooks: Box<dyn JournalHooks>,
    ) -> Result<Self> {
        let config = Arc::new(config);
        let journal_dir = config.journal_path();
        std::fs::create_dir_all(&journal_dir)
            .map_err(|e| JournalError::io("create journal directory", e))?;

        let db_existed = journal_dir.join(".index.db").exists();
        let has_daily_files = std::fs::read_dir(&journal_dir)
            .map(|iter| {
                iter.flatten().any(|e| {
                    let name = e.file_name().to_string_lossy().into_owned();
                    name.ends_with(".md") && !name.starts_with('.') && name != "INDEX.md"
                })
            })
            .unwrap_or(false);

        let index = JournalIndex::open(&journal_dir)?;
        let artifacts = ArtifactManager::new(Arc::clone(&config), Arc::clone(&clock));
        let engine = Self {
            config,
            clock,
            index,
            artifacts,
            hooks,
        };

        if !db_existed && has_daily_files {
            tracing::info!("index database missing; rebuilding from daily files");
            engine.rebuild_index()?;
        }
        Ok(engine)
    }

    /// The project configuration.
    #[must_use]
    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    /// The artifact manager for this project root.
    #[must_use]
    pub const fn artifacts(&self) -> &ArtifactManager {
        &self.artifacts
    }

    /// The query index.
    #[must_use]
    pub const fn index(&self) -> &JournalIndex {
        &self.index
    }

    pub(crate) fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    fn daily_file(&self, date: NaiveDate) -> PathBuf {
        self.config
            .journal_path()
            .join(format!("{}.md", date.format("%Y-%m-%d")))
    }

    fn daily_file_rel(&self, date: NaiveDate) -> PathBuf {
        PathBuf::from(&self.config.directories.journal)
            .join(format!("{}.md", date.format("%Y-%m-%d")))
    }

    /// Resolves the symbolic date tokens `today` and `yesterday` against the
    /// engine clock (UTC). Other values pass through for the index to
    /// validate.
    #[must_use]
    pub fn resolve_date_token(&self, value: &str) -> String {
        match value {
            "today" => self.clock.today().format("%Y-%m-%d").to_string(),
            "yesterday" => (self.clock.today() - chrono::Duration::days(1))
                .format("%Y-%m-%d")
                .to_string(),
            other => other.to_string(),
        }
    }

    // ----- write path -------------------------------------------------

    /// Appends a new entry to today's daily file.
    ///
    /// Flow: validation → template resolution → reference validation →
    /// daily-file lock → sequence allocation → pre-append hook → encode →
    /// whole-file atomic rewrite → index upsert → post-append hook.
    ///
    /// # Errors
    ///
    /// See the error table in the crate documentation; notably
    /// [`JournalError::InvalidReference`] for unresolved `caused_by` targets
    /// and the template errors when templates are required or incomplete.
    pub fn append(&self, new: NewEntry) -> Result<Entry> {
        if new.author.trim().is_empty() {
            return Err(JournalError::invalid("author must not be empty"));
        }

        let mut narrative = new.narrative;
        let mut outcome = new.outcome;

        if self.config.validation.require_templates && new.template.is_none() {
            return Err(JournalError::TemplateRequired {
                available: self.config.template_names(),
            });
        }
        if let Some(name) = &new.template {
            let template =
                self.config
                    .template(name)
                    .ok_or_else(|| JournalError::TemplateNotFound {
                        name: name.clone(),
                        available: self.config.template_names(),
                    })?;
            template.check_required(&new.template_values)?;
            let rendered = template.render(&new.template_values);
            narrative = Narrative {
                context: rendered.context.or(narrative.context),
                intent: rendered.intent.or(narrative.intent),
                action: rendered.action.or(narrative.action),
                observation: rendered.observation.or(narrative.observation),
                analysis: rendered.analysis.or(narrative.analysis),
                next_steps: rendered.next_steps.or(narrative.next_steps),
            };
            if outcome.is_none() {
                outcome = template
                    .default_outcome
                    .as_deref()
                    .and_then(|o| o.parse().ok());
            }
        }

        if self.config.validation.require_outcome && outcome.is_none() {
            return Err(JournalError::invalid(
                "this project requires an outcome on every entry",
            ));
        }

        if self.config.validation.validate_references {
            for target in &new.caused_by {
                if !EntryId::is_valid(target) || !self.index.exists(target)? {
                    return Err(JournalError::InvalidReference {
                        reference: target.clone(),
                    });
                }
            }
        }

        self.persist(|id, timestamp| Entry {
            id,
            timestamp,
            author: new.author.clone(),
            kind: EntryKind::Entry {
                narrative: narrative.clone(),
            },
            outcome,
            template: new.template.clone(),
            caused_by: new.caused_by.clone(),
            references: new.references.clone(),
            config_used: new.config_used.clone(),
            log_produced: new.log_produced.clone(),
            diagnostics: new.diagnostics.clone(),
        })
    }

    /// Records an amendment correcting a prior entry.
    ///
    /// The target must resolve regardless of the `validate_references`
    /// toggle; corrections of phantom entries are never recorded.
    ///
    /// # Errors
    ///
    /// [`JournalError::NotFound`] when the target entry does not exist;
    /// [`JournalError::InvalidArgument`] when any required field is empty.
    pub fn amend(
        &self,
        references_entry: &str,
        correction: &str,
        actual: &str,
        impact: &str,
        author: &str,
    ) -> Result<Entry> {
        if author.trim().is_empty() {
            return Err(JournalError::invalid("author must not be empty"));
        }
        for (field, value) in [
            ("correction", correction),
            ("actual", actual),
            ("impact", impact),
        ] {
            if value.trim().is_empty() {
                return Err(JournalError::invalid(format!(
                    "amendment field '{field}' must not be empty"
                )));
            }
        }
        let amends: EntryId = references_entry.parse()?;
        if !self.index.exists(references_entry)? {
            return Err(JournalError::NotFound {
                what: format!("entry {references_entry} to amend"),
            });
        }

        self.persist(|id, timestamp| Entry {
            id,
            timestamp,
            author: author.to_string(),
            kind: EntryKind::Amendment {
                amends: amends.clone(),
                correction: correction.to_string(),
                actual: actual.to_string(),
                impact: impact.to_string(),
            },
            outcome: None,
            template: None,
            caused_by: Vec::new(),
            references: Vec::new(),
            config_used: None,
            log_produced: None,
            diagnostics: Diagnostics::default(),
        })
    }

    /// Shared persistence flow for entries and amendments.
    fn persist(&self, build: impl FnOnce(EntryId, chrono::DateTime<chrono::Utc>) -> Entry) -> Result<Entry> {
        let now = self.clock.now();
        let date = now.date_naive();
        let file = self.daily_file(date);

        let _lock = ScopedLock::acquire(&file)?;
        let existing = read_if_exists(&file)?;

        // Sequence: next after both the file's sections (authoritative) and
        // the index's rows for the date (covers a file briefly behind a
        // concurrent writer's index update).
        let mut sequence = codec::next_sequence(existing.as_deref().unwrap_or(""), date);
        if let Some(indexed) = self
            .index
            .max_sequence(&date.format("%Y-%m-%d").to_string())?
        {
            sequence = sequence.max(indexed + 1);
        }
        let id = EntryId::new(date, sequence);

        let entry = self.hooks.pre_append(build(id, now)).map_err(|e| match e {
            JournalError::Hook { .. } => e,
            other => JournalError::Hook {
                hook: "pre_append".into(),
                message: other.to_string(),
            },
        })?;

        let encoded = codec::encode_entry(&entry);
        if encoded.len() > self.config.validation.max_entry_size {
            return Err(JournalError::invalid(format!(
                "encoded entry is {} bytes, exceeding max_entry_size {}",
                encoded.len(),
                self.config.validation.max_entry_size
            )));
        }

        let previous = existing.unwrap_or_else(|| codec::file_header(date));
        let mut content = previous.clone();
        if !content.ends_with('\n') {
            content.push('\n');
        }
        content.push_str(&encoded);

        // The rewrite must strictly extend the previous bytes.
        if !content.starts_with(&previous) || content.len() <= previous.len() {
            return Err(JournalError::AppendOnlyViolation {
                message: format!("rewrite of {} would alter persisted content", file.display()),
            });
        }
        atomic_replace(&file, content.as_bytes())?;

        self.index.index_entry(&entry, &self.daily_file_rel(date))?;
        self.hooks.post_append(&entry)?;

        tracing::debug!(entry_id = %entry.id, author = %entry.author, "entry appended");
        Ok(entry)
    }

    // ----- read path --------------------------------------------------

    /// Reads entries by id, by date, or by range, straight from the daily
    /// files.
    ///
    /// # Errors
    ///
    /// [`JournalError::NotFound`] when a requested id or date is absent;
    /// [`JournalError::Codec`] when a daily file fails to parse.
    pub fn read(&self, selector: &ReadSelector, include_content: bool) -> Result<Vec<Value>> {
        let mut results = Vec::new();
        match selector {
            ReadSelector::ById(raw) => {
                let id: EntryId = raw.parse()?;
                let file = self.daily_file(id.date());
                let content = read_if_exists(&file)?.ok_or_else(|| JournalError::NotFound {
                    what: format!("entry {raw}"),
                })?;
                let decoded = codec::decode_file(&content, &file)?;
                let found = decoded
                    .into_iter()
                    .find(|d| d.entry.id == id)
                    .ok_or_else(|| JournalError::NotFound {
                        what: format!("entry {raw}"),
                    })?;
                results.push(self.entry_json(&found.entry, include_content));
            }
            ReadSelector::ByDate(raw) => {
                let resolved = self.resolve_date_token(raw);
                let date = parse_date(&resolved)?;
                let file = self.daily_file(date);
                let content = read_if_exists(&file)?.ok_or_else(|| JournalError::NotFound {
                    what: format!("journal file for {resolved}"),
                })?;
                for d in codec::decode_file(&content, &file)? {
                    results.push(self.entry_json(&d.entry, include_content));
                }
            }
            ReadSelector::ByRange { date_from, date_to } => {
                let from = date_from
                    .as_deref()
                    .map(|d| parse_date(&self.resolve_date_token(d)))
                    .transpose()?;
                let to = date_to
                    .as_deref()
                    .map(|d| parse_date(&self.resolve_date_token(d)))
                    .transpose()?;
                for (date, file) in self.daily_files_sorted()? {
                    if from.is_some_and(|f| date < f) || to.is_some_and(|t| date > t) {
                        continue;
                    }
                    let Some(content) = read_if_exists(&file)? else {
                        continue;
                    };
                    for d in codec::decode_file(&content, &file)? {
                        results.push(self.entry_json(&d.entry, include_content));
                    }
                }
            }
        }
        Ok(results)
    }

    /// All daily files in ascending date order.
    fn daily_files_sorted(&self) -> Result<Vec<(NaiveDate, PathBuf)>> {
        let journal_dir = self.config.journal_path();
        let mut files = Vec::new();
        let iter = std::fs::read_dir(&journal_dir)
            .map_err(|e| JournalError::io("list journal directory", e))?;
        for entry in iter.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') || name == "INDEX.md" || !name.ends_with(".md") {
                continue;
            }
            if let Ok(date) = NaiveDate::parse_from_str(name.trim_end_matches(".md"), "%Y-%m-%d") {
                files.push((date, entry.path()));
            }
        }
        files.sort();
        Ok(files)
    }

    fn entry_json(&self, entry: &Entry, include_content: bool) -> Value {
        let mut value = entry.to_json();
        let map = value.as_object_mut().expect("entry JSON is an object");
        map.insert(
            "file_path".into(),
            json!(self
                .daily_file_rel(entry.id.date())
                .to_string_lossy()
                .into_owned()),
        );
        if !include_content {
            for field in [
                "context",
                "intent",
                "action",
                "observation",
                "analysis",
                "next_steps",
                "correction",
                "actual",
                "impact",
            ] {
                map.insert(field.into(), Value::Null);
            }
        }
        value
    }

    // ----- index delegation -------------------------------------------

    /// Structured query with date-token expansion.
    ///
    /// # Errors
    ///
    /// See [`JournalIndex::query`].
    pub fn query(&self, mut params: QueryParams) -> Result<QueryResult> {
        params.date_from = params.date_from.map(|d| self.resolve_date_token(&d));
        params.date_to = params.date_to.map(|d| self.resolve_date_token(&d));
        self.index.query(&params)
    }

    /// Legacy text-search façade over [`Self::query`].
    ///
    /// # Errors
    ///
    /// See [`JournalIndex::query`].
    pub fn search(
        &self,
        text: &str,
        author: Option<&str>,
        date_from: Option<&str>,
        date_to: Option<&str>,
    ) -> Result<QueryResult> {
        let mut filters = BTreeMap::new();
        if let Some(author) = author {
            filters.insert("author".to_string(), author.to_string());
        }
        self.query(QueryParams {
            filters,
            text_search: Some(text.to_string()),
            date_from: date_from.map(str::to_string),
            date_to: date_to.map(str::to_string),
            ..QueryParams::default()
        })
    }

    /// Overall index statistics.
    ///
    /// # Errors
    ///
    /// See [`JournalIndex::stats`].
    pub fn stats(&self) -> Result<Value> {
        self.index.stats()
    }

    /// Grouped aggregation with date-token expansion.
    ///
    /// # Errors
    ///
    /// See [`JournalIndex::aggregate`].
    pub fn aggregate(&self, mut request: AggregateRequest) -> Result<Value> {
        request.date_from = request.date_from.map(|d| self.resolve_date_token(&d));
        request.date_to = request.date_to.map(|d| self.resolve_date_token(&d));
        self.index.aggregate(&request)
    }

    /// Long-running operations by recorded duration.
    ///
    /// # Errors
    ///
    /// See [`JournalIndex::active`].
    pub fn active(&self, threshold_ms: u64, tool_filter: Option<&str>) -> Result<Vec<Value>> {
        self.index.active(threshold_ms, tool_filter)
    }

    /// Rebuilds the SQLite index from the daily files.
    ///
    /// # Errors
    ///
    /// See [`JournalIndex::rebuild`].
    pub fn rebuild_index(&self) -> Result<RebuildReport> {
        self.index.rebuild(&self.config.journal_path(), |file, error| {
            if let Some(error) = error {
                tracing::warn!(file = %file.display(), %error, "index rebuild: file skipped");
            }
        })
    }

    // ----- artifact operations (hook-wrapped) -------------------------

    /// Archives a config file, running the pre/post archive hooks.
    ///
    /// # Errors
    ///
    /// See [`ArtifactManager::archive_config`]; hook errors abort the
    /// operation.
    pub fn archive_config(
        &self,
        file_path: &str,
        reason: &str,
        journal_entry: Option<&str>,
        stage: Option<&str>,
    ) -> Result<crate::models::ConfigArchive> {
        self.hooks.pre_archive(file_path, reason)?;
        let record = self
            .artifacts
            .archive_config(file_path, reason, journal_entry, stage)?;
        self.hooks.post_archive(&record)?;
        Ok(record)
    }

    /// Activates an archived config.
    ///
    /// # Errors
    ///
    /// See [`ArtifactManager::activate_config`].
    pub fn activate_config(
        &self,
        archive_path: &str,
        target_path: &str,
        reason: &str,
        journal_entry: &str,
    ) -> Result<crate::artifact::ActivationResult> {
        self.artifacts
            .activate_config(archive_path, target_path, reason, journal_entry)
    }

    /// Unified diff between two config files.
    ///
    /// # Errors
    ///
    /// See [`ArtifactManager::diff_config`].
    pub fn diff_config(&self, path_a: &str, path_b: &str, context_lines: usize) -> Result<Value> {
        self.artifacts.diff_config(path_a, path_b, context_lines)
    }

    /// Preserves a log file, running the pre/post preserve hooks.
    ///
    /// # Errors
    ///
    /// See [`ArtifactManager::preserve_log`]; hook errors abort the
    /// operation.
    pub fn preserve_log(
        &self,
        file_path: &str,
        category: &str,
        outcome: crate::models::LogOutcome,
    ) -> Result<crate::models::LogRecord> {
        self.hooks.pre_preserve(file_path)?;
        let record = self.artifacts.preserve_log(file_path, category, outcome)?;
        self.hooks.post_preserve(&record)?;
        Ok(record)
    }

    /// Writes a state snapshot, merging hook-captured versions over the
    /// probed ones.
    ///
    /// # Errors
    ///
    /// See [`ArtifactManager::state_snapshot`].
    pub fn state_snapshot(
        &self,
        name: &str,
        options: &crate::artifact::SnapshotOptions,
    ) -> Result<(crate::models::Snapshot, String)> {
        let extra = self.hooks.capture_versions()?;
        self.artifacts.state_snapshot(name, options, extra)
    }

    /// Regenerates one artifact tree's INDEX.md from the filesystem.
    ///
    /// # Errors
    ///
    /// See [`ArtifactManager::rebuild_artifact_index`].
    pub fn rebuild_artifact_index(
        &self,
        kind: crate::artifact::ArtifactKind,
    ) -> Result<crate::artifact::RebuildIndexReport> {
        self.artifacts.rebuild_artifact_index(kind)
    }

    // ----- templates --------------------------------------------------

    /// Summaries of every known template.
    #[must_use]
    pub fn list_templates(&self) -> Vec<Value> {
        self.config
            .templates
            .values()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "required_fields": t.required_fields,
                    "optional_fields": t.optional_fields,
                    "default_outcome": t.default_outcome,
                })
            })
            .collect()
    }

    /// Full definition of one template.
    #[must_use]
    pub fn get_template(&self, name: &str) -> Option<Value> {
        self.config.template(name).map(|t| {
            json!({
                "name": t.name,
                "description": t.description,
                "context": t.context,
                "intent": t.intent,
                "action": t.action,
                "observation": t.observation,
                "analysis": t.analysis,
                "next_steps": t.next_steps,
                "required_fields": t.required_fields,
                "optional_fields": t.optional_fields,
                "default_outcome": t.default_outcome,
            })
        })
    }
}

fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| JournalError::invalid(format!("malformed date '{value}' (expected YYYY-MM-DD)")))
}
