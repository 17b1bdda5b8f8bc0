//! Error types for journal operations.
//!
//! Every fallible operation in the engine returns [`JournalError`]. Validation
//! failures and `NotFound` surface to callers verbatim; `LockTimeout` and I/O
//! errors surface so callers can decide whether to retry; codec errors during
//! index rebuild are reported through the progress callback instead of
//! aborting the rebuild.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during journal operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum JournalError {
    /// Malformed date, bad entry id, out-of-range limit, unknown `group_by`,
    /// missing required selection, and similar caller mistakes.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of what was wrong with the argument.
        message: String,
    },

    /// A specifically requested entry or file does not exist.
    #[error("not found: {what}")]
    NotFound {
        /// Description of what could not be found.
        what: String,
    },

    /// A `caused_by` or `references_entry` target does not resolve to a
    /// persisted entry while reference validation is enabled.
    #[error("invalid reference: {reference}")]
    InvalidReference {
        /// The reference that failed to resolve.
        reference: String,
    },

    /// The project requires templates and the entry did not name one.
    #[error("template required; available: {available:?}")]
    TemplateRequired {
        /// Names of the templates the project defines.
        available: Vec<String>,
    },

    /// The named template does not exist.
    #[error("template '{name}' not found; available: {available:?}")]
    TemplateNotFound {
        /// The template name that was requested.
        name: String,
        /// Names of the templates the project defines.
        available: Vec<String>,
    },

    /// A template's required field was not supplied on append.
    #[error("template '{template}' missing required fields: {missing:?}")]
    MissingTemplateField {
        /// The template being applied.
        template: String,
        /// The required fields that were absent.
        missing: Vec<String>,
    },

    /// Attempt to archive bytes already archived for the same original path.
    #[error("identical content already archived at {}", existing.display())]
    DuplicateContent {
        /// Path of the earlier archive holding the same bytes.
        existing: PathBuf,
    },

    /// Internal guard: a code path attempted to mutate persisted content.
    #[error("append-only violation: {message}")]
    AppendOnlyViolation {
        /// Description of the attempted mutation.
        message: String,
    },

    /// The advisory lock was not acquired within the timeout window.
    #[error("lock timeout after {waited_ms}ms on {}", path.display())]
    LockTimeout {
        /// The lock file that could not be acquired.
        path: PathBuf,
        /// How long the caller waited.
        waited_ms: u64,
    },

    /// A daily file failed to parse on read.
    #[error("codec error in {}: {message}", file.display())]
    Codec {
        /// The daily file that failed to parse.
        file: PathBuf,
        /// What the parser objected to.
        message: String,
    },

    /// Hook rejected or failed the in-flight operation.
    #[error("hook '{hook}' failed: {message}")]
    Hook {
        /// Name of the hook point.
        hook: String,
        /// Failure description supplied by the hook.
        message: String,
    },

    /// Underlying database error.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Underlying file I/O error.
    #[error("I/O error during {context}: {source}")]
    Io {
        /// Human-readable description of the operation that failed.
        context: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration file failed to load or validate.
    #[error("configuration error: {message}")]
    Config {
        /// What was wrong with the configuration.
        message: String,
    },
}

impl JournalError {
    /// Convenience constructor for I/O errors with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Convenience constructor for invalid-argument errors.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Stable machine-readable kind name, used by the tool dispatch layer.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidArgument { .. } => "InvalidArgument",
            Self::NotFound { .. } => "NotFound",
            Self::InvalidReference { .. } => "InvalidReference",
            Self::TemplateRequired { .. } => "TemplateRequired",
            Self::TemplateNotFound { .. } => "TemplateNotFound",
            Self::MissingTemplateField { .. } => "MissingTemplateField",
            Self::DuplicateContent { .. } => "DuplicateContent",
            Self::AppendOnlyViolation { .. } => "AppendOnlyViolation",
            Self::LockTimeout { .. } => "LockTimeout",
            Self::Codec { .. } => "CodecError",
            Self::Hook { .. } => "HookError",
            Self::Database(_) | Self::Io { .. } => "IoFailure",
            Self::Config { .. } => "ConfigError",
        }
    }

    /// Process exit code for the CLI front-end.
    ///
    /// `0` success, `1` general error, `2` configuration error, `3` not
    /// found, `4` invalid argument.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Config { .. } => 2,
            Self::NotFound { .. } => 3,
            Self::InvalidArgument { .. }
            | Self::InvalidReference { .. }
            | Self::TemplateRequired { .. }
            | Self::TemplateNotFound { .. }
            | Self::MissingTemplateField { .. } => 4,
            _ => 1,
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, JournalError>;
