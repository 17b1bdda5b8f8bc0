//! Log preservation.

use std::path::Path;

use super::archive::dedupe_path;
use super::index_md::ArtifactKind;
use super::{ArtifactManager, relative_to_root};
use crate::error::{JournalError, Result};
use crate::models::{LogOutcome, LogRecord, filename_timestamp};

impl ArtifactManager {
    /// Moves a log file into `{logs}/{category}/{timestamp}_{outcome}.log`.
    ///
    /// The original file is moved, not copied: after success the source path
    /// no longer exists. Rename is attempted first; when the logs tree lives
    /// on a different filesystem the move degrades to copy + unlink.
    /// Filename collisions within the same second get a `_2`, `_3`, ...
    /// suffix.
    ///
    /// # Errors
    ///
    /// - [`JournalError::NotFound`] when the source does not exist.
    /// - [`JournalError::InvalidArgument`] when `category` is empty.
    /// - [`JournalError::Io`] when the move fails.
    pub fn preserve_log(
        &self,
        file_path: &str,
        category: &str,
        outcome: LogOutcome,
    ) -> Result<LogRecord> {
        if category.trim().is_empty() {
            return Err(JournalError::invalid("log category must not be empty"));
        }
        let source = self.config().resolve(file_path);
        let metadata = std::fs::metadata(&source).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                JournalError::NotFound {
                    what: format!("log file {}", source.display()),
                }
            } else {
                JournalError::io(format!("stat {}", source.display()), e)
            }
        })?;
        let size_bytes = metadata.len();

        let now = self.now();
        let category_dir = self.config().logs_path().join(category);
        std::fs::create_dir_all(&category_dir)
            .map_err(|e| JournalError::io("create log category directory", e))?;

        let preserved_name = format!("{}_{outcome}.log", filename_timestamp(now));
        let preserved = dedupe_path(category_dir.join(preserved_name));

        move_file(&source, &preserved)?;

        let record = LogRecord {
            original_path: file_path.to_string(),
            preserved_path: relative_to_root(&preserved, &self.config().project_root),
            timestamp: now,
            category: category.to_string(),
            outcome,
            size_bytes,
        };

        self.append_index_row(
            ArtifactKind::Logs,
            &format!(
                "| {} | {} | {} | {} | {} |",
                now.to_rfc3339(),
                record.preserved_path,
                record.category,
                record.outcome,
                record.size_bytes,
            ),
        )?;

        tracing::debug!(
            preserved = %record.preserved_path,
            outcome = %record.outcome,
            size = record.size_bytes,
            "log preserved"
        );
        Ok(record)
    }
}

/// Rename with copy + unlink fallback for cross-filesystem moves.
fn move_file(source: &Path, dest: &Path) -> Result<()> {
    match std::fs::rename(source, dest) {
        Ok(()) => Ok(()),
        Err(_) => {
            std::fs::copy(source, dest)
                .map_err(|e| JournalError::io(format!("copy {}", source.display()), e))?;
            std::fs::remove_file(source)
                .map_err(|e| JournalError::io(format!("remove {}", source.display()), e))
        }
    }
}
