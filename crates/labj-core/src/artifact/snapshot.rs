//! Whole-system state snapshots.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;

use regex::Regex;
use wait_timeout::ChildExt;

use super::archive::dedupe_path;
use super::index_md::ArtifactKind;
use super::{ArtifactManager, relative_to_root};
use crate::config::VersionCommand;
use crate::error::{JournalError, Result};
use crate::fsio::atomic_replace;
use crate::models::{Snapshot, filename_timestamp, slugify};

/// Version probes that outlive this window record `"not available"`.
const VERSION_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Value recorded for a probe that failed, timed out, or produced nothing.
const NOT_AVAILABLE: &str = "not available";

/// What a snapshot should capture.
#[derive(Debug, Clone)]
pub struct SnapshotOptions {
    /// Capture config files matching the project's patterns.
    pub include_configs: bool,
    /// Capture the environment (filtered through the exclude regexes).
    pub include_env: bool,
    /// Run the configured version probes.
    pub include_versions: bool,
    /// Capture a recursive listing of `build_dir`.
    pub include_build_dir_listing: bool,
    /// Directory to list; required when `include_build_dir_listing` is set.
    pub build_dir: Option<String>,
}

impl Default for SnapshotOptions {
    fn default() -> Self {
        Self {
            include_configs: true,
            include_env: true,
            include_versions: true,
            include_build_dir_listing: false,
            build_dir: None,
        }
    }
}

impl ArtifactManager {
    /// Captures the requested components into a single JSON document at
    /// `{snapshots}/{timestamp}_{name-slug}.json` and appends to the
    /// snapshot INDEX.
    ///
    /// `extra_versions` is merged over the probed versions (hook-supplied
    /// entries win).
    ///
    /// # Errors
    ///
    /// - [`JournalError::InvalidArgument`] when `name` is empty, or when
    ///   `include_build_dir_listing` is set without a `build_dir`.
    /// - [`JournalError::Io`] when the snapshot cannot be written.
    pub fn state_snapshot(
        &self,
        name: &str,
        options: &SnapshotOptions,
        extra_versions: BTreeMap<String, String>,
    ) -> Result<(Snapshot, String)> {
        if name.trim().is_empty() {
            return Err(JournalError::invalid("snapshot name must not be empty"));
        }
        if options.include_build_dir_listing && options.build_dir.is_none() {
            return Err(JournalError::invalid(
                "include_build_dir_listing requires build_dir",
            ));
        }

        let now = self.now();
        let mut snapshot = Snapshot {
            name: name.to_string(),
            timestamp: now,
            configs: BTreeMap::new(),
            environment: BTreeMap::new(),
            versions: BTreeMap::new(),
            build_dir_listing: None,
        };

        if options.include_configs {
            snapshot.configs = self.capture_configs();
        }
        if options.include_env {
            snapshot.environment = self.capture_environment()?;
        }
        if options.include_versions {
            for probe in &self.config().version_commands {
                snapshot
                    .versions
                    .insert(probe.name.clone(), run_version_probe(probe));
            }
            snapshot.versions.extend(extra_versions);
        }
        if options.include_build_dir_listing {
            let build_dir = self
                .config()
                .resolve(options.build_dir.as_deref().unwrap_or_default());
            let mut listing = Vec::new();
            if build_dir.exists() {
                collect_files(&build_dir, &build_dir, &mut listing);
            }
            listing.sort();
            snapshot.build_dir_listing = Some(listing);
        }

        let snapshot_name = format!("{}_{}.json", filename_timestamp(now), slugify(name));
        let snapshot_path = dedupe_path(self.config().snapshots_path().join(snapshot_name));
        let json = serde_json::to_string_pretty(&snapshot).map_err(|e| JournalError::Config {
            message: format!("snapshot serialization failed: {e}"),
        })?;
        atomic_replace(&snapshot_path, json.as_bytes())?;

        let rel_path = relative_to_root(&snapshot_path, &self.config().project_root);
        let mut contents: Vec<&str> = Vec::new();
        if options.include_configs {
            contents.push("configs");
        }
        if options.include_env {
            contents.push("env");
        }
        if options.include_versions {
            contents.push("versions");
        }
        if snapshot.build_dir_listing.is_some() {
            contents.push("listing");
        }
        self.append_index_row(
            ArtifactKind::Snapshots,
            &format!(
                "| {} | {} | {} | {} |",
                now.to_rfc3339(),
                rel_path,
                snapshot.name,
                contents.join(", "),
            ),
        )?;

        tracing::debug!(snapshot = %rel_path, "state snapshot written");
        Ok((snapshot, rel_path))
    }

    /// Reads every file matching the configured glob patterns, keyed by
    /// project-root-relative path. Unreadable files are skipped.
    fn capture_configs(&self) -> BTreeMap<String, String> {
        let root = &self.config().project_root;
        let mut configs = BTreeMap::new();
        for pattern in &self.config().config_patterns {
            let full_pattern = root.join(pattern).to_string_lossy().into_owned();
            let Ok(paths) = glob::glob(&full_pattern) else {
                tracing::warn!(pattern = %pattern, "invalid config glob pattern skipped");
                continue;
            };
            for path in paths.flatten() {
                if !path.is_file() {
                    continue;
                }
                if let Ok(text) = std::fs::read_to_string(&path) {
                    configs.insert(relative_to_root(&path, root), text);
                }
            }
        }
        configs
    }

    /// Environment snapshot after include/exclude filtering on variable
    /// names.
    fn capture_environment(&self) -> Result<BTreeMap<String, String>> {
        let compile = |patterns: &[String]| -> Result<Vec<Regex>> {
            patterns
                .iter()
                .map(|p| {
                    Regex::new(p).map_err(|e| JournalError::Config {
                        message: format!("bad environment pattern '{p}': {e}"),
                    })
                })
                .collect()
        };
        let include = compile(&self.config().env_include)?;
        let exclude = compile(&self.config().env_exclude)?;

        Ok(std::env::vars()
            .filter(|(name, _)| include.is_empty() || include.iter().any(|re| re.is_match(name)))
            .filter(|(name, _)| !exclude.iter().any(|re| re.is_match(name)))
            .collect())
    }
}

/// Runs one version probe with the short timeout. Every failure mode maps to
/// the literal `"not available"`.
fn run_version_probe(probe: &VersionCommand) -> String {
    let child = Command::new("sh")
        .arg("-c")
        .arg(&probe.command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn();

    let mut child = match child {
        Ok(child) => child,
        Err(_) => return NOT_AVAILABLE.to_string(),
    };

    match child.wait_timeout(VERSION_PROBE_TIMEOUT) {
        Ok(Some(_status)) => {}
        Ok(None) => {
            let _ = child.kill();
            let _ = child.wait();
            return NOT_AVAILABLE.to_string();
        }
        Err(_) => return NOT_AVAILABLE.to_string(),
    }

    let output = match child.wait_with_output() {
        Ok(output) => output,
        Err(_) => return NOT_AVAILABLE.to_string(),
    };

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let mut text = if stdout.is_empty() { stderr } else { stdout };
    if text.is_empty() {
        return NOT_AVAILABLE.to_string();
    }

    if let Some(pattern) = &probe.parse_regex {
        if let Ok(re) = Regex::new(pattern) {
            if let Some(caps) = re.captures(&text) {
                text = caps
                    .get(1)
                    .or_else(|| caps.get(0))
                    .map(|m| m.as_str().to_string())
                    .unwrap_or(text);
            }
        }
    }
    text
}

/// Recursively collects files under `dir` as paths relative to `base`.
fn collect_files(dir: &Path, base: &Path, out: &mut Vec<String>) {
    let Ok(read) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in read.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, base, out);
        } else if path.is_file() {
            out.push(
                path.strip_prefix(base)
                    .unwrap_or(&path)
                    .to_string_lossy()
                    .into_owned(),
            );
        }
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

    fn manager_with(config: ProjectConfig) -> ArtifactManager {
        ArtifactManager::new(
            Arc::new(config),
            Arc::new(FixedClock(
                Utc.with_ymd_and_hms(2026, 1, 17, 18, 45, 30).unwrap(),
            )),
        )
    }

    #[test]
    fn test_snapshot_writes_json_document() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("build.toml"), "X=1").unwrap();
        let mgr = manager_with(ProjectConfig::for_root(dir.path()));

        let (snapshot, rel_path) = mgr
            .state_snapshot(
                "session start",
                &SnapshotOptions {
                    include_env: false,
                    ..SnapshotOptions::default()
                },
                BTreeMap::new(),
            )
            .unwrap();
        assert_eq!(rel_path, "snapshots/2026-01-17T18-45-30_session-start.json");
        assert_eq!(snapshot.configs.get("build.toml").unwrap(), "X=1");

        let text = std::fs::read_to_string(dir.path().join(&rel_path)).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["name"], "session start");
        assert_eq!(parsed["configs"]["build.toml"], "X=1");
        // No listing requested: field omitted entirely.
        assert!(parsed.get("build_dir_listing").is_none());

        let index = std::fs::read_to_string(dir.path().join("snapshots/INDEX.md")).unwrap();
        assert!(index.contains("session start"));
        assert!(index.contains("configs, versions"));
    }

    #[test]
    fn test_snapshot_env_excludes_secrets() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager_with(ProjectConfig::for_root(dir.path()));

        // Set a secret-looking and a benign variable for this process.
        std::env::set_var("LABJ_TEST_SECRET_TOKEN", "hunter2");
        std::env::set_var("LABJ_TEST_PLAIN", "visible");

        let (snapshot, _) = mgr
            .state_snapshot(
                "env-check",
                &SnapshotOptions {
                    include_configs: false,
                    include_versions: false,
                    ..SnapshotOptions::default()
                },
                BTreeMap::new(),
            )
            .unwrap();
        assert!(!snapshot.environment.contains_key("LABJ_TEST_SECRET_TOKEN"));
        assert_eq!(snapshot.environment.get("LABJ_TEST_PLAIN").unwrap(), "visible");

        std::env::remove_var("LABJ_TEST_SECRET_TOKEN");
        std::env::remove_var("LABJ_TEST_PLAIN");
    }

    #[test]
    fn test_snapshot_versions_probe_and_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ProjectConfig::for_root(dir.path());
        config.version_commands = vec![
            VersionCommand {
                name: "echo".into(),
                command: "echo tool 9.8.7".into(),
                parse_regex: Some(r"tool (\S+)".into()),
            },
            VersionCommand {
                name: "missing".into(),
                command: "definitely-not-a-real-binary-xyz --version".into(),
                parse_regex: None,
            },
        ];
        let mgr = manager_with(config);

        let mut extra = BTreeMap::new();
        extra.insert("custom".to_string(), "from-hook".to_string());

        let (snapshot, _) = mgr
            .state_snapshot(
                "versions",
                &SnapshotOptions {
                    include_configs: false,
                    include_env: false,
                    ..SnapshotOptions::default()
                },
                extra,
            )
            .unwrap();
        assert_eq!(snapshot.versions.get("echo").unwrap(), "9.8.7");
        // Shell reports the missing binary on stderr; the probe may surface
        // that text or nothing. Either way a value is recorded.
        assert!(snapshot.versions.contains_key("missing"));
        assert_eq!(snapshot.versions.get("custom").unwrap(), "from-hook");
    }

    #[test]
    fn test_snapshot_build_listing_requires_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager_with(ProjectConfig::for_root(dir.path()));
        let err = mgr
            .state_snapshot(
                "x",
                &SnapshotOptions {
                    include_build_dir_listing: true,
                    build_dir: None,
                    ..SnapshotOptions::default()
                },
                BTreeMap::new(),
            )
            .unwrap_err();
        assert!(matches!(err, JournalError::InvalidArgument { .. }));
    }

    #[test]
    fn test_snapshot_build_listing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("build/obj")).unwrap();
        std::fs::write(dir.path().join("build/out.bin"), "b").unwrap();
        std::fs::write(dir.path().join("build/obj/a.o"), "a").unwrap();
        let mgr = manager_with(ProjectConfig::for_root(dir.path()));

        let (snapshot, _) = mgr
            .state_snapshot(
                "with-listing",
                &SnapshotOptions {
                    include_configs: false,
                    include_env: false,
                    include_versions: false,
                    include_build_dir_listing: true,
                    build_dir: Some("build".into()),
                },
                BTreeMap::new(),
            )
            .unwrap();
        let listing = snapshot.build_dir_listing.unwrap();
        assert_eq!(listing, vec!["obj/a.o".to_string(), "out.bin".to_string()]);
    }

    #[test]
    fn test_snapshot_empty_name_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager_with(ProjectConfig::for_root(dir.path()));
        let err = mgr
            .state_snapshot("", &SnapshotOptions::default(), BTreeMap::new())
            .unwrap_err();
        assert!(matches!(err, JournalError::InvalidArgument { .. }));
    }
}
