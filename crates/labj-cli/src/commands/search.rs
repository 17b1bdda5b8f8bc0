//! `labj search`

use labj_core::JournalEngine;
use labj_core::Result;

use super::print_entry_table;

pub fn run(
    engine: &JournalEngine,
    query: &str,
    author: Option<&str>,
    date_from: Option<&str>,
    date_to: Option<&str>,
    json: bool,
) -> Result<()> {
    let result = engine.search(query, author, date_from, date_to)?;

    if json {
        let doc = serde_json::json!({
            "entries": result.entries,
            "total": result.total,
        });
        println!("{}", serde_json::to_string_pretty(&doc).expect("valid JSON"));
    } else {
        print_entry_table(&result.entries);
        println!("\n{} matching entries", result.total);
    }
    Ok(())
}
