//! `labj --init`

use std::path::Path;

use labj_core::config::ProjectConfig;
use labj_core::{JournalError, Result};

/// Creates the four project subtrees.
pub fn run(project_root: &Path) -> Result<()> {
    let config = ProjectConfig::load(project_root)?;
    for dir in [
        config.journal_path(),
        config.configs_path(),
        config.logs_path(),
        config.snapshots_path(),
    ] {
        std::fs::create_dir_all(&dir)
            .map_err(|e| JournalError::io(format!("create {}", dir.display()), e))?;
        println!("created {}", dir.display());
    }
    Ok(())
}
