//! Config archival and activation.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use super::index_md::{ArtifactKind, file_name_of, skip_artifact_file, sorted_dir};
use super::{ArtifactManager, relative_to_root};
use crate::error::{JournalError, Result};
use crate::fsio::atomic_replace;
use crate::models::{ConfigArchive, filename_timestamp, slugify};

/// Result of activating an archived config.
#[derive(Debug, Clone)]
pub struct ActivationResult {
    /// Archive of the previous target contents, when the target existed.
    /// Points at a pre-existing archive when the bytes were already
    /// archived.
    pub superseded_archive: Option<String>,
    /// The path that now holds the activated bytes.
    pub activated_path: String,
    /// The archive the bytes came from.
    pub source_archive: String,
}

impl ArtifactManager {
    /// Archives a config file's current bytes under
    /// `{configs}/{basename}/{timestamp}_{reason-slug}{ext}`.
    ///
    /// # Errors
    ///
    /// - [`JournalError::NotFound`] when the source file does not exist.
    /// - [`JournalError::InvalidArgument`] when `reason` is empty.
    /// - [`JournalError::DuplicateContent`] when an archive of the same
    ///   `original_path` already holds identical bytes; the error carries the
    ///   prior archive path and the filesystem is left unchanged.
    pub fn archive_config(
        &self,
        file_path: &str,
        reason: &str,
        journal_entry: Option<&str>,
        stage: Option<&str>,
    ) -> Result<ConfigArchive> {
        if reason.trim().is_empty() {
            return Err(JournalError::invalid("archive reason must not be empty"));
        }
        let source = self.config().resolve(file_path);
        let content = std::fs::read(&source).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                JournalError::NotFound {
                    what: format!("config file {}", source.display()),
                }
            } else {
                JournalError::io(format!("read {}", source.display()), e)
            }
        })?;
        let content_hash = hex::encode(Sha256::digest(&content));

        let basename = file_name_of(&source);
        let archive_dir = self.config().configs_path().join(&basename);

        // Duplicate rejection: identical bytes for this basename are refused.
        if archive_dir.exists() {
            for existing in sorted_dir(&archive_dir)? {
                let name = file_name_of(&existing);
                if skip_artifact_file(&name) || !existing.is_file() {
                    continue;
                }
                let existing_bytes = std::fs::read(&existing)
                    .map_err(|e| JournalError::io(format!("read {}", existing.display()), e))?;
                if hex::encode(Sha256::digest(&existing_bytes)) == content_hash {
                    return Err(JournalError::DuplicateContent { existing });
                }
            }
        }

        let now = self.now();
        let ext = source
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        let archive_name = format!("{}_{}{ext}", filename_timestamp(now), slugify(reason));
        let archive_path = dedupe_path(archive_dir.join(archive_name));
        atomic_replace(&archive_path, &content)?;

        let rel_archive = relative_to_root(&archive_path, &self.config().project_root);
        let record = ConfigArchive {
            original_path: file_path.to_string(),
            archive_path: rel_archive.clone(),
            timestamp: now,
            content_hash,
            reason: reason.to_string(),
            journal_entry: journal_entry.map(str::to_string),
            stage: stage.map(str::to_string),
        };

        self.append_index_row(
            ArtifactKind::Configs,
            &format!(
                "| {} | {} | {} | {} | {} | {} |",
                now.to_rfc3339(),
                basename,
                rel_archive,
                record.stage.as_deref().unwrap_or("-"),
                record.reason,
                record.journal_entry.as_deref().unwrap_or("-"),
            ),
        )?;

        tracing::debug!(archive = %record.archive_path, reason = %record.reason, "config archived");
        Ok(record)
    }

    /// Activates an archived config: pre-archives the current target (when
    /// one exists), then copies the archive's bytes over the target
    /// atomically.
    ///
    /// `journal_entry` is required; activation must be documented.
    ///
    /// # Errors
    ///
    /// - [`JournalError::NotFound`] when the archive does not exist.
    /// - [`JournalError::InvalidArgument`] when `journal_entry` is empty.
    /// - Any error from the pre-archival other than duplicate content, which
    ///   is tolerated (the target's bytes are already preserved).
    pub fn activate_config(
        &self,
        archive_path: &str,
        target_path: &str,
        reason: &str,
        journal_entry: &str,
    ) -> Result<ActivationResult> {
        if journal_entry.trim().is_empty() {
            return Err(JournalError::invalid(
                "config activation requires a journal entry",
            ));
        }
        let archive = self.config().resolve(archive_path);
        let target = self.config().resolve(target_path);

        let content = std::fs::read(&archive).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                JournalError::NotFound {
                    what: format!("archive {}", archive.display()),
                }
            } else {
                JournalError::io(format!("read {}", archive.display()), e)
            }
        })?;

        let superseded_archive = if target.exists() {
            match self.archive_config(target_path, "pre-activation", Some(journal_entry), None) {
                Ok(record) => Some(record.archive_path),
                // Current bytes already archived earlier: nothing lost.
                Err(JournalError::DuplicateContent { existing }) => Some(relative_to_root(
                    &existing,
                    &self.config().project_root,
                )),
                Err(other) => return Err(other),
            }
        } else {
            None
        };

        atomic_replace(&target, &content)?;
        tracing::debug!(
            archive = archive_path,
            target = target_path,
            reason,
            "config activated"
        );

        Ok(ActivationResult {
            superseded_archive,
            activated_path: target_path.to_string(),
            source_archive: archive_path.to_string(),
        })
    }
}

/// Appends `_2`, `_3`, ... before the extension until the path is free.
pub(crate) fn dedupe_path(path: PathBuf) -> PathBuf {
    if !path.exists() {
        return path;
    }
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    for n in 2u32.. {
        let candidate = parent.join(format!("{stem}_{n}{ext}"));
        if !candidate.exists() {
            return candidate;
        }
    }
    unreachable!("dedupe counter exhausted")
}
