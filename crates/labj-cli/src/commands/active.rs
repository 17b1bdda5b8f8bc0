//! `labj active`

use labj_core::JournalEngine;
use labj_core::Result;

use super::print_entry_table;

pub fn run(engine: &JournalEngine, threshold_ms: u64, tool: Option<&str>) -> Result<()> {
    let entries = engine.active(threshold_ms, tool)?;
    if entries.is_empty() {
        println!("no operations at or above {threshold_ms}ms");
        return Ok(());
    }
    print_entry_table(&entries);
    Ok(())
}
