use std::cmp::Ordering;

use super::corpus::SearchIndex;
use super::scorer::score;
use super::tokenizer::tokenize;
use super::types::{SearchFilters, SearchResult};

/// Run a query against a built index.
///
/// Filters gate candidates before scoring; zero scores are dropped and the
/// rest come back best-first, cut to `limit`.
pub fn search(
    index: &SearchIndex,
    query: &str,
    filters: &SearchFilters,
    limit: usize,
) -> Vec<SearchResult> {
    let query_tokens = tokenize(query);
    if query_tokens.is_empty() || limit == 0 {
        return Vec::new();
    }

    let mut hits: Vec<(f64, &SearchResult)> = index
        .entries()
        .iter()
        .filter(|entry| filters.matches(&entry.result))
        .filter_map(|entry| {
            let points = score(entry, &query_tokens, filters);
            (points > 0.0).then_some((points, &entry.result))
        })
        .collect();

    // Stable sort keeps corpus order for ties
    hits.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
    hits.truncate(limit);

    hits.into_iter()
        .map(|(points, result)| SearchResult {
            score: points,
            ..result.clone()
        })
        .collect()
}
