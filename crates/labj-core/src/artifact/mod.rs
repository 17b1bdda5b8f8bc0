//! Artifact management: config archives, preserved logs, and state
//! snapshots.
//!
//! Artifacts live in three project-root-relative trees, each with a
//! human-readable `INDEX.md` that is appended on every operation and can be
//! regenerated purely from filesystem contents:
//!
//! ```text
//! configs/{basename}/{YYYY-MM-DDTHH-MM-SS}_{reason-slug}{ext}
//! logs/{category}/{YYYY-MM-DDTHH-MM-SS}_{outcome}.log
//! snapshots/{YYYY-MM-DDTHH-MM-SS}_{name-slug}.json
//! ```
//!
//! Config archives are content-hash deduplicated per basename directory;
//! archiving bytes that are already archived fails with `DuplicateContent`.
//! Log preservation moves the original (it does not copy). Snapshots are
//! single JSON documents capturing configs, environment, and tool versions.

mod archive;
mod diff;
mod events;
mod index_md;
mod preserve;
mod snapshot;

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::clock::Clock;
use crate::config::ProjectConfig;

pub use archive::ActivationResult;
pub use index_md::{ArtifactKind, RebuildIndexReport};
pub use snapshot::SnapshotOptions;

/// Manages the three artifact trees for one project root.
pub struct ArtifactManager {
    config: Arc<ProjectConfig>,
    clock: Arc<dyn Clock>,
}

impl ArtifactManager {
    /// Builds a manager over the given configuration and clock.
    #[must_use]
    pub fn new(config: Arc<ProjectConfig>, clock: Arc<dyn Clock>) -> Self {
        Self { config, clock }
    }

    pub(crate) fn config(&self) -> &ProjectConfig {
        &self.config
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

/// Parses the leading `YYYY-MM-DDTHH-MM-SS` timestamp of an artifact
/// filename.
#[must_use]
pub(crate) fn parse_artifact_timestamp(file_name: &str) -> Option<DateTime<Utc>> {
    let prefix = file_name.get(..19)?;
    NaiveDateTime::parse_from_str(prefix, "%Y-%m-%dT%H-%M-%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Path relative to the project root where possible, for records and INDEX
/// rows.
pub(crate) fn relative_to_root(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned()
}
