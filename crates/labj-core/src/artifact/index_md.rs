//! INDEX.md maintenance for the three artifact trees.
//!
//! Each tree keeps a markdown table that is appended on every operation.
//! The tables are a human convenience, not a source of truth: they can be
//! regenerated at any time from filesystem contents and parsed archive
//! filenames.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde_json::{Value, json};

use super::{ArtifactManager, parse_artifact_timestamp, relative_to_root};
use crate::error::{JournalError, Result};
use crate::fsio::{ScopedLock, atomic_replace, read_if_exists};
use crate::models::LogOutcome;

/// Which artifact tree an INDEX operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Config archives.
    Configs,
    /// Preserved logs.
    Logs,
    /// State snapshots.
    Snapshots,
}

impl ArtifactKind {
    /// Wire name of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Configs => "configs",
            Self::Logs => "logs",
            Self::Snapshots => "snapshots",
        }
    }

    const fn header(self) -> &'static str {
        match self {
            Self::Configs => {
                "# Configuration Archive Index\n\n\
                 | Timestamp | Basename | Archive Path | Stage | Reason | Journal Entry |\n\
                 |-----------|----------|--------------|-------|--------|---------------|\n"
            }
            Self::Logs => {
                "# Log Preservation Index\n\n\
                 | Timestamp | Preserved Path | Category | Outcome | Size |\n\
                 |-----------|----------------|----------|---------|------|\n"
            }
            Self::Snapshots => {
                "# Snapshot Index\n\n\
                 | Timestamp | Snapshot Path | Name | Contents |\n\
                 |-----------|---------------|------|----------|\n"
            }
        }
    }
}

impl FromStr for ArtifactKind {
    type Err = JournalError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "configs" => Ok(Self::Configs),
            "logs" => Ok(Self::Logs),
            "snapshots" => Ok(Self::Snapshots),
            other => Err(JournalError::invalid(format!(
                "unknown artifact index kind '{other}' (expected configs, logs, or snapshots)"
            ))),
        }
    }
}

/// Result of an INDEX.md rebuild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebuildIndexReport {
    /// The tree that was rebuilt.
    pub directory: String,
    /// Artifact files found.
    pub files_found: u64,
    /// Path of the regenerated INDEX.md, when one was written.
    pub index_path: Option<PathBuf>,
}

impl RebuildIndexReport {
    /// JSON form for the tool surface.
    #[must_use]
    pub fn to_json(&self) -> Value {
        json!({
            "directory": self.directory,
            "files_found": self.files_found,
            "index_path": self.index_path.as_ref().map(|p| p.display().to_string()),
            "action": if self.index_path.is_some() { "rebuilt" } else { "skipped_no_directory" },
        })
    }
}

impl ArtifactManager {
    fn tree_root(&self, kind: ArtifactKind) -> PathBuf {
        match kind {
            ArtifactKind::Configs => self.config().configs_path(),
            ArtifactKind::Logs => self.config().logs_path(),
            ArtifactKind::Snapshots => self.config().snapshots_path(),
        }
    }

    /// Appends one table row to the tree's INDEX.md, creating the header on
    /// first use. The whole file is rewritten atomically under its lock.
    pub(crate) fn append_index_row(&self, kind: ArtifactKind, row: &str) -> Result<()> {
        let index_path = self.tree_root(kind).join("INDEX.md");
        let _lock = ScopedLock::acquire(&index_path)?;
        let mut content =
            read_if_exists(&index_path)?.unwrap_or_else(|| kind.header().to_string());
        if !content.ends_with('\n') {
            content.push('\n');
        }
        content.push_str(row);
        content.push('\n');
        atomic_replace(&index_path, content.as_bytes())
    }

    /// Regenerates a tree's INDEX.md purely from filesystem contents.
    ///
    /// An absent tree yields a zero-file report and creates nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the tree cannot be listed or the INDEX written.
    pub fn rebuild_artifact_index(&self, kind: ArtifactKind) -> Result<RebuildIndexReport> {
        let root = self.tree_root(kind);
        if !root.exists() {
            return Ok(RebuildIndexReport {
                directory: kind.as_str().to_string(),
                files_found: 0,
                index_path: None,
            });
        }

        let rows = match kind {
            ArtifactKind::Configs => self.config_rows(&root)?,
            ArtifactKind::Logs => self.log_rows(&root)?,
            ArtifactKind::Snapshots => self.snapshot_rows(&root)?,
        };

        let index_path = root.join("INDEX.md");
        let _lock = ScopedLock::acquire(&index_path)?;
        let mut content = kind.header().to_string();
        for (_, row) in &rows {
            content.push_str(row);
            content.push('\n');
        }
        atomic_replace(&index_path, content.as_bytes())?;

        Ok(RebuildIndexReport {
            directory: kind.as_str().to_string(),
            files_found: rows.len() as u64,
            index_path: Some(index_path),
        })
    }

    /// Rows for the config tree, grouped by basename directory and sorted by
    /// timestamp within each group.
    fn config_rows(&self, root: &Path) -> Result<Vec<(String, String)>> {
        let project_root = &self.config().project_root;
        let mut rows = Vec::new();
        for basename_dir in sorted_dir(root)? {
            if !basename_dir.is_dir() {
                continue;
            }
            let basename = file_name_of(&basename_dir);
            for file in sorted_dir(&basename_dir)? {
                let name = file_name_of(&file);
                if skip_artifact_file(&name) {
                    continue;
                }
                let Some(ts) = parse_artifact_timestamp(&name) else {
                    continue;
                };
                let rel = relative_to_root(&file, project_root);
                rows.push((
                    format!("{basename}/{name}"),
                    format!(
                        "| {} | {} | {} | - | (rebuilt) | - |",
                        ts.to_rfc3339(),
                        basename,
                        rel
                    ),
                ));
            }
        }
        rows.sort();
        Ok(rows)
    }

    fn log_rows(&self, root: &Path) -> Result<Vec<(String, String)>> {
        let project_root = &self.config().project_root;
        let mut rows = Vec::new();
        for category_dir in sorted_dir(root)? {
            if !category_dir.is_dir() {
                continue;
            }
            let category = file_name_of(&category_dir);
            for file in sorted_dir(&category_dir)? {
                let name = file_name_of(&file);
                if skip_artifact_file(&name) || !name.ends_with(".log") {
                    continue;
                }
                let Some(ts) = parse_artifact_timestamp(&name) else {
                    continue;
                };
                let outcome = parse_log_outcome(&name);
                let size = file.metadata().map(|m| m.len()).unwrap_or(0);
                let rel = relative_to_root(&file, project_root);
                rows.push((
                    format!("{category}/{name}"),
                    format!(
                        "| {} | {} | {} | {} | {} |",
                        ts.to_rfc3339(),
                        rel,
                        category,
                        outcome,
                        size
                    ),
                ));
            }
        }
        rows.sort();
        Ok(rows)
    }

    fn snapshot_rows(&self, root: &Path) -> Result<Vec<(String, String)>> {
        let project_root = &self.config().project_root;
        let mut rows = Vec::new();
        for file in sorted_dir(root)? {
            let name = file_name_of(&file);
            if skip_artifact_file(&name) || !name.ends_with(".json") {
                continue;
            }
            let Some(ts) = parse_artifact_timestamp(&name) else {
                continue;
            };
            let snapshot_name = snapshot_name_of(&name);
            let rel = relative_to_root(&file, project_root);
            rows.push((
                name.clone(),
                format!("| {} | {} | {} | (rebuilt) |", ts.to_rfc3339(), rel, snapshot_name),
            ));
        }
        rows.sort();
        Ok(rows)
    }
}

/// `{ts}_{outcome}.log` with an optional `_N` collision suffix.
pub(crate) fn parse_log_outcome(file_name: &str) -> LogOutcome {
    let stem = file_name.trim_end_matches(".log");
    let tail = stem.get(20..).unwrap_or("");
    let outcome = tail.split('_').next().unwrap_or("");
    outcome.parse().unwrap_or(LogOutcome::Unknown)
}

/// `{ts}_{name-slug}.json` → `{name-slug}`.
pub(crate) fn snapshot_name_of(file_name: &str) -> String {
    file_name
        .trim_end_matches(".json")
        .get(20..)
        .unwrap_or("")
        .to_string()
}

pub(crate) fn skip_artifact_file(name: &str) -> bool {
    name == "INDEX.md" || name.starts_with('.') || name.ends_with(".lock") || name.ends_with(".tmp")
}

pub(crate) fn sorted_dir(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut out: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|e| JournalError::io(format!("list {}", dir.display()), e))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect();
    out.sort();
    Ok(out)
}

pub(crate) fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
