//! Project configuration.
//!
//! A [`ProjectConfig`] describes one project root: where the four subtrees
//! live, what counts as a config file, how environment capture is filtered,
//! which version probes to run, which templates exist, and which validation
//! toggles are active. Configuration loads from `labj.toml` or `labj.json`
//! at the project root; every field has a default so an empty project works
//! with no configuration file at all.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{JournalError, Result};
use crate::template::{Template, default_templates};

/// Default glob patterns used for config discovery during snapshots.
fn default_config_patterns() -> Vec<String> {
    vec![
        "*.toml".into(),
        "*.json".into(),
        "*.yaml".into(),
        "*.yml".into(),
    ]
}

/// Default regexes for environment variables excluded from snapshots.
///
/// Covers common secret-bearing names; matching is case-insensitive on the
/// variable name.
fn default_env_exclude() -> Vec<String> {
    vec![
        "(?i)secret".into(),
        "(?i)token".into(),
        "(?i)passw(or)?d".into(),
        "(?i)api_?key".into(),
        "(?i)private".into(),
        "(?i)credential".into(),
        "(?i)auth".into(),
    ]
}

const fn default_validate_references() -> bool {
    true
}

const fn default_max_entry_size() -> usize {
    1024 * 1024
}

/// A command probed for a tool version during snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionCommand {
    /// Name the version is recorded under.
    pub name: String,
    /// Shell command to run.
    pub command: String,
    /// Regex whose first capture group extracts the version from stdout.
    #[serde(default)]
    pub parse_regex: Option<String>,
}

/// Directory overrides for the four subtrees, relative to the project root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Directories {
    /// Daily journal files and the query index.
    #[serde(default = "Directories::default_journal")]
    pub journal: String,
    /// Config archives.
    #[serde(default = "Directories::default_configs")]
    pub configs: String,
    /// Preserved logs.
    #[serde(default = "Directories::default_logs")]
    pub logs: String,
    /// State snapshots.
    #[serde(default = "Directories::default_snapshots")]
    pub snapshots: String,
}

impl Directories {
    fn default_journal() -> String {
        "journal".into()
    }
    fn default_configs() -> String {
        "configs".into()
    }
    fn default_logs() -> String {
        "logs".into()
    }
    fn default_snapshots() -> String {
        "snapshots".into()
    }
}

impl Default for Directories {
    fn default() -> Self {
        Self {
            journal: Self::default_journal(),
            configs: Self::default_configs(),
            logs: Self::default_logs(),
            snapshots: Self::default_snapshots(),
        }
    }
}

/// Validation toggles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Validation {
    /// When true, every entry must name a template.
    #[serde(default)]
    pub require_templates: bool,
    /// When true (the default), `caused_by` and amendment targets must
    /// resolve to persisted entries.
    #[serde(default = "default_validate_references")]
    pub validate_references: bool,
    /// When true, every entry must carry an outcome.
    #[serde(default)]
    pub require_outcome: bool,
    /// Maximum encoded size of a single entry in bytes.
    #[serde(default = "default_max_entry_size")]
    pub max_entry_size: usize,
}

impl Default for Validation {
    fn default() -> Self {
        Self {
            require_templates: false,
            validate_references: default_validate_references(),
            require_outcome: false,
            max_entry_size: default_max_entry_size(),
        }
    }
}

/// Configuration for one project's journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name, used in handoff documents.
    #[serde(default = "ProjectConfig::default_project_name")]
    pub project_name: String,
    /// Root directory everything is resolved against. Not part of the file
    /// format; set by the loader.
    #[serde(skip)]
    pub project_root: PathBuf,
    /// Directory overrides.
    #[serde(default)]
    pub directories: Directories,
    /// Glob patterns for config discovery during snapshots.
    #[serde(default = "default_config_patterns")]
    pub config_patterns: Vec<String>,
    /// Known log categories. Informational; preservation accepts any
    /// category.
    #[serde(default)]
    pub log_categories: Vec<String>,
    /// Regexes for environment variables to include; empty means all.
    #[serde(default)]
    pub env_include: Vec<String>,
    /// Regexes for environment variables to exclude from snapshots.
    #[serde(default = "default_env_exclude")]
    pub env_exclude: Vec<String>,
    /// Version probe commands run during snapshots.
    #[serde(default)]
    pub version_commands: Vec<VersionCommand>,
    /// Named templates, merged over the built-in defaults.
    #[serde(default)]
    pub templates: BTreeMap<String, Template>,
    /// Validation toggles.
    #[serde(default)]
    pub validation: Validation,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            project_name: Self::default_project_name(),
            project_root: PathBuf::from("."),
            directories: Directories::default(),
            config_patterns: default_config_patterns(),
            log_categories: Vec::new(),
            env_include: Vec::new(),
            env_exclude: default_env_exclude(),
            version_commands: Vec::new(),
            templates: BTreeMap::new(),
            validation: Validation::default(),
        }
    }
}

impl ProjectConfig {
    fn default_project_name() -> String {
        "unnamed".into()
    }

    /// Configuration with defaults for the given project root, built-in
    /// templates included.
    #[must_use]
    pub fn for_root(project_root: impl Into<PathBuf>) -> Self {
        let mut config = Self {
            project_root: project_root.into(),
            ..Self::default()
        };
        config.finalize();
        config
    }

    /// Loads configuration from the project root.
    ///
    /// Search order: `labj.toml`, `labj.json`. When neither exists, defaults
    /// apply. After parsing, user templates are merged over the built-in
    /// defaults (user definitions win on name collision).
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::Config`] when a present file fails to parse.
    pub fn load(project_root: &Path) -> Result<Self> {
        let toml_path = project_root.join("labj.toml");
        let json_path = project_root.join("labj.json");

        let mut config: Self = if toml_path.exists() {
            let text = std::fs::read_to_string(&toml_path)
                .map_err(|e| JournalError::io("read labj.toml", e))?;
            toml::from_str(&text).map_err(|e| JournalError::Config {
                message: format!("labj.toml: {e}"),
            })?
        } else if json_path.exists() {
            let text = std::fs::read_to_string(&json_path)
                .map_err(|e| JournalError::io("read labj.json", e))?;
            serde_json::from_str(&text).map_err(|e| JournalError::Config {
                message: format!("labj.json: {e}"),
            })?
        } else {
            Self::default()
        };

        config.project_root = project_root.to_path_buf();
        config.finalize();
        Ok(config)
    }

    /// Merges built-in templates under the user's and fills template names
    /// from their map keys.
    pub fn finalize(&mut self) {
        let mut merged = default_templates();
        for (name, mut template) in std::mem::take(&mut self.templates) {
            if template.name.is_empty() {
                template.name.clone_from(&name);
            }
            merged.insert(name, template);
        }
        self.templates = merged;
    }

    /// Absolute path of the journal directory.
    #[must_use]
    pub fn journal_path(&self) -> PathBuf {
        self.project_root.join(&self.directories.journal)
    }

    /// Absolute path of the config archive directory.
    #[must_use]
    pub fn configs_path(&self) -> PathBuf {
        self.project_root.join(&self.directories.configs)
    }

    /// Absolute path of the preserved-log directory.
    #[must_use]
    pub fn logs_path(&self) -> PathBuf {
        self.project_root.join(&self.directories.logs)
    }

    /// Absolute path of the snapshot directory.
    #[must_use]
    pub fn snapshots_path(&self) -> PathBuf {
        self.project_root.join(&self.directories.snapshots)
    }

    /// Resolves a caller-supplied path against the project root.
    #[must_use]
    pub fn resolve(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.project_root.join(p)
        }
    }

    /// Looks up a template by name.
    #[must_use]
    pub fn template(&self, name: &str) -> Option<&Template> {
        self.templates.get(name)
    }

    /// Names of all known templates.
    #[must_use]
    pub fn template_names(&self) -> Vec<String> {
        self.templates.keys().cloned().collect()
    }
}
