//! `labj stats`

use labj_core::JournalEngine;
use labj_core::Result;
use labj_core::index::AggregateRequest;

use super::parse_filters;

pub fn run(
    engine: &JournalEngine,
    group_by: Option<&str>,
    aggregations: &[String],
    filters: &[String],
    date_from: Option<&str>,
    date_to: Option<&str>,
) -> Result<()> {
    let result = match group_by {
        None => engine.stats()?,
        Some(group_by) => engine.aggregate(AggregateRequest {
            group_by: Some(group_by.to_string()),
            aggregations: if aggregations.is_empty() {
                vec!["count".to_string()]
            } else {
                aggregations.to_vec()
            },
            filters: parse_filters(filters)?,
            date_from: date_from.map(str::to_string),
            date_to: date_to.map(str::to_string),
        })?,
    };
    println!("{}", serde_json::to_string_pretty(&result).expect("valid JSON"));
    Ok(())
}
