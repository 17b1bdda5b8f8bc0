//! FTS5 query escaping.
//!
//! User search strings are not trusted FTS5 syntax. Double quotes are
//! doubled, and an input containing whitespace or a quote — with none of the
//! explicit operators `AND`, `OR`, `NOT`, `NEAR`, `*` — is wrapped in double
//! quotes so it matches as a phrase. Inputs using the operators are passed
//! through for callers who want the full query language.

const FTS_OPERATORS: [&str; 5] = ["AND", "OR", "NOT", "NEAR", "*"];

/// Escapes a user search string for FTS5 `MATCH`.
#[must_use]
pub fn escape_fts_query(query: &str) -> String {
    let escaped = query.replace('"', "\"\"");
    let has_operator = FTS_OPERATORS.iter().any(|op| query.contains(op));
    if !has_operator && (query.contains(char::is_whitespace) || query.contains('"')) {
        format!("\"{escaped}\"")
    } else {
        escaped
    }
}

/// Escapes a user search string as a literal phrase, unconditionally.
///
/// Used as the fallback when operator passthrough produces a string FTS5
/// cannot parse (e.g. a dangling `AND`): the query is retried as the
/// literal text the user typed.
#[must_use]
pub fn escape_fts_phrase(query: &str) -> String {
    format!("\"{}\"", query.replace('"', "\"\""))
}
