//! Renumbers bracketed citation markers (`[1]`, `[2,3]`, ...) in a final
//! answer to match the order sources are actually referenced in, dropping
//! any sources the answer never cites and any marker pointing past the end
//! of the source list.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

fn citation_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\[(\d+(?:,\d+)*)\]").unwrap())
}

/// Rewrites every `[n]`/`[n,m,...]` marker in `response` so citation numbers
/// run 1, 2, 3, ... in first-appearance order, and returns the subset of
/// `sources` those markers reference, reordered to match. A marker number
/// outside `1..=sources.len()` is dropped from its bracket group rather than
/// renumbered. If no in-range marker is found, `sources` collapses to empty
/// and `response` is returned unchanged.
pub fn renumber_citations(response: &str, sources: &[Value]) -> (String, Vec<Value>) {
    if sources.is_empty() {
        return (response.to_string(), Vec::new());
    }

    let mut new_index_of: Vec<Option<usize>> = vec![None; sources.len()];
    let mut ordered_sources = Vec::new();

    let rewritten = citation_pattern()
        .replace_all(response, |caps: &regex::Captures| {
            let parts: Vec<String> = caps[1]
                .split(',')
                .map(|n| {
                    let old: usize = n.parse().unwrap_or(0);
                    if old == 0 || old > sources.len() {
                        return String::new();
                    }
                    let slot = &mut new_index_of[old - 1];
                    let new = *slot.get_or_insert_with(|| {
                        ordered_sources.push(sources[old - 1].clone());
                        ordered_sources.len()
                    });
                    new.to_string()
                })
                .collect();
            format!("[{}]", parts.join(","))
        })
        .into_owned();

    if ordered_sources.is_empty() {
        (response.to_string(), Vec::new())
    } else {
        (rewritten, ordered_sources)
    }
}
