//! `labj query`

use labj_core::JournalEngine;
use labj_core::Result;
use labj_core::index::QueryParams;

use super::{parse_filters, print_entry_table};

#[allow(clippy::too_many_arguments)]
pub fn run(
    engine: &JournalEngine,
    filters: &[String],
    text: Option<&str>,
    date_from: Option<&str>,
    date_to: Option<&str>,
    limit: u64,
    offset: u64,
    order_by: Option<&str>,
    order_desc: bool,
    json: bool,
) -> Result<()> {
    let result = engine.query(QueryParams {
        filters: parse_filters(filters)?,
        text_search: text.map(str::to_string),
        date_from: date_from.map(str::to_string),
        date_to: date_to.map(str::to_string),
        limit,
        offset,
        order_by: order_by.map(str::to_string),
        order_desc,
    })?;

    if json {
        let doc = serde_json::json!({
            "entries": result.entries,
            "total": result.total,
            "has_more": result.has_more,
        });
        println!("{}", serde_json::to_string_pretty(&doc).expect("valid JSON"));
    } else {
        print_entry_table(&result.entries);
        println!(
            "\n{} of {} entries{}",
            result.entries.len(),
            result.total,
            if result.has_more { " (more available)" } else { "" }
        );
    }
    Ok(())
}
