//! Config diffing.

use serde_json::{Value, json};

use super::ArtifactManager;
use crate::error::{JournalError, Result};

impl ArtifactManager {
    /// Unified diff between two config files.
    ///
    /// Either path may use the `current:` prefix to resolve against the
    /// project root explicitly (`current:config/build.toml`); otherwise
    /// relative paths resolve against the project root as usual.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::NotFound`] when either file is absent.
    pub fn diff_config(&self, path_a: &str, path_b: &str, context_lines: usize) -> Result<Value> {
        let read = |spec: &str| -> Result<String> {
            let stripped = spec.strip_prefix("current:").unwrap_or(spec);
            let path = self.config().resolve(stripped);
            std::fs::read_to_string(&path).map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    JournalError::NotFound {
                        what: format!("config {}", path.display()),
                    }
                } else {
                    JournalError::io(format!("read {}", path.display()), e)
                }
            })
        };

        let content_a = read(path_a)?;
        let content_b = read(path_b)?;

        let patch = diffy::DiffOptions::new()
            .set_context_len(context_lines)
            .create_patch(&content_a, &content_b);
        let rendered = patch.to_string();

        let mut additions = 0u64;
        let mut deletions = 0u64;
        for line in rendered.lines() {
            if line.starts_with('+') && !line.starts_with("+++") {
                additions += 1;
            } else if line.starts_with('-') && !line.starts_with("---") {
                deletions += 1;
            }
        }

        Ok(json!({
            "path_a": path_a,
            "path_b": path_b,
            "identical": content_a == content_b,
            "additions": additions,
            "deletions": deletions,
            "diff": if content_a == content_b { String::new() } else { rendered },
        }))
    }
}
