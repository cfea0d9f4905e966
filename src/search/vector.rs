//! Cosine-similarity ranking with an optional lexical pre-filter.
//!
//! The pre-filter heuristic (which fields, how terms are matched) is a
//! tunable, not a contract: the only guarantees are that at most
//! `prefilter_count` candidates reach the similarity stage and that the
//! final ranking honors `threshold`/`count`.

use crate::models::NsrRecord;

/// Defaults for plain search.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.3;
pub const DEFAULT_MATCH_COUNT: usize = 20;

/// Stricter defaults for chat retrieval: this context is injected into a
/// prompt, and low-relevance padding degrades answer quality.
pub const CHAT_MATCH_THRESHOLD: f32 = 0.35;
pub const CHAT_MATCH_COUNT: usize = 8;

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for i in 0..a.len() {
        dot += a[i] * b[i];
        norm_a += a[i] * a[i];
        norm_b += b[i] * b[i];
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}

/// Rank candidates by cosine similarity against `query`, keep those at or
/// above `threshold`, sort descending, cap at `count`. Each returned record
/// carries its similarity score. Zero matches is an empty vec, never an error.
pub fn rank_by_similarity<'a, I>(
    candidates: I,
    query: &[f32],
    threshold: f32,
    count: usize,
) -> Vec<NsrRecord>
where
    I: IntoIterator<Item = (&'a NsrRecord, &'a [f32])>,
{
    let mut scored: Vec<(f32, &NsrRecord)> = candidates
        .into_iter()
        .map(|(record, embedding)| (cosine_similarity(query, embedding), record))
        .filter(|(score, _)| *score >= threshold)
        .collect();

    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(count);

    scored
        .into_iter()
        .map(|(score, record)| {
            let mut out = record.clone();
            out.similarity = Some(score);
            out
        })
        .collect()
}

/// Narrow candidates by a cheap lexical signal before the vector comparison.
///
/// Heuristic: whole-query containment in keywords or title; when that leaves
/// nothing, any-term containment (terms of 3+ chars); when there is still no
/// lexical signal, candidates pass through in store order. All three branches
/// cap the output at `prefilter_count`.
pub fn lexical_prefilter<'a>(
    candidates: Vec<(&'a NsrRecord, &'a [f32])>,
    query_text: &str,
    prefilter_count: usize,
) -> Vec<(&'a NsrRecord, &'a [f32])> {
    let query = query_text.trim().to_lowercase();
    if query.is_empty() {
        return cap(candidates, prefilter_count);
    }

    let whole: Vec<_> = candidates
        .iter()
        .copied()
        .filter(|(r, _)| field_contains(r, &query))
        .take(prefilter_count)
        .collect();
    if !whole.is_empty() {
        return whole;
    }

    let terms: Vec<&str> = query.split_whitespace().filter(|t| t.len() >= 3).collect();
    if !terms.is_empty() {
        let by_term: Vec<_> = candidates
            .iter()
            .copied()
            .filter(|(r, _)| terms.iter().any(|t| field_contains(r, t)))
            .take(prefilter_count)
            .collect();
        if !by_term.is_empty() {
            return by_term;
        }
    }

    cap(candidates, prefilter_count)
}

fn field_contains(record: &NsrRecord, needle: &str) -> bool {
    if record.title.to_lowercase().contains(needle) {
        return true;
    }
    record
        .keywords
        .as_deref()
        .is_some_and(|k| k.to_lowercase().contains(needle))
}

fn cap<T>(mut items: Vec<T>, limit: usize) -> Vec<T> {
    items.truncate(limit);
    items
}
