//! FTS5 query construction.

/// Builds a conjunctive FTS5 query from whitespace-separated tokens.
///
/// Each token has embedded double quotes removed and is wrapped in quotes,
/// so FTS5 operators (`-`, `*`, `:`, `NEAR`, ...) are matched literally.
/// Returns `None` when no token survives.
#[must_use]
pub fn build_match_query(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split_whitespace()
        .map(|t| t.replace('"', ""))
        .filter(|t| !t.is_empty())
        .collect();
    if terms.is_empty() {
        return None;
    }

    let estimated_len = terms.iter().map(|t| t.len() + 7).sum::<usize>();
    let mut fts_query = String::with_capacity(estimated_len);
    for (i, term) in terms.iter().enumerate() {
        if i > 0 {
            fts_query.push_str(" AND ");
        }
        fts_query.push('"');
        fts_query.push_str(term);
        fts_query.push('"');
    }
    Some(fts_query)
}
