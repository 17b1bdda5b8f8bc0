//! `labj rebuild-index`

use labj_core::JournalEngine;
use labj_core::Result;

pub fn run(engine: &JournalEngine) -> Result<()> {
    let report = engine.rebuild_index()?;
    println!(
        "rebuilt: {} files processed, {} entries indexed, {} errors",
        report.files_processed, report.entries_indexed, report.errors
    );
    Ok(())
}
