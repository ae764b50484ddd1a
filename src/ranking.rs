//! Relevance scoring.
//!
//! `score` is a pure additive model: every signal contributes a
//! non-negative boost and the sum is only meaningful relative to other
//! scores for the same query. Wall-clock time enters through the context so
//! that repeated calls with the same inputs return the same value.

use std::cmp::Ordering;
use std::path::Path;

use rayon::prelude::*;

use crate::config::RankingConfig;
use crate::trie::{fold, trigram_similarity};
use crate::types::{IndexedEntry, SearchHit};

/// Candidate count above which scoring fans out across the rayon pool.
const PARALLEL_SCORING_THRESHOLD: usize = 4096;

/// Caller state that influences ranking.
#[derive(Debug, Clone, Copy)]
pub struct RankingContext<'a> {
    pub current_directory: Option<&'a str>,
    pub preferred_extensions: &'a [String],
    pub case_sensitive: bool,
    /// Unix timestamp in milliseconds used as "now" for recency decay.
    pub now_ms: u64,
}

/// How a name matched the query. Ordered from weakest to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchKind {
    Contains,
    Prefix,
    Exact,
}

/// Best match tier of `query` (or of any of its terms) against `name`.
pub fn match_kind(name: &str, query: &str, case_sensitive: bool) -> Option<MatchKind> {
    let (name, query) = if case_sensitive {
        (name.to_string(), query.trim().to_string())
    } else {
        (fold(name), fold(query.trim()))
    };
    if query.is_empty() {
        return None;
    }

    let tier = |needle: &str| {
        if name == needle {
            Some(MatchKind::Exact)
        } else if name.starts_with(needle) {
            Some(MatchKind::Prefix)
        } else if name.contains(needle) {
            Some(MatchKind::Contains)
        } else {
            None
        }
    };

    let whole = tier(query.as_str());
    if whole == Some(MatchKind::Exact) {
        return whole;
    }
    query
        .split_whitespace()
        .filter_map(tier)
        .chain(whole)
        .max()
}

/// Additive relevance score of `entry` for `query`. Higher is better.
pub fn score(
    entry: &IndexedEntry,
    query: &str,
    context: &RankingContext<'_>,
    config: &RankingConfig,
) -> f64 {
    let mut score = 0.0;

    score += match match_kind(&entry.name, query, context.case_sensitive) {
        Some(MatchKind::Exact) => config.exact_match_boost,
        Some(MatchKind::Prefix) => config.prefix_match_boost,
        Some(MatchKind::Contains) => config.contains_match_boost,
        None => config.fuzzy_match_boost * trigram_similarity(&fold(&entry.name), &fold(query.trim())),
    };

    score += (entry.access_frequency as f64 * config.frequency_weight).min(config.max_frequency_boost);

    if let Some(last_accessed) = entry.last_accessed {
        let seconds = context.now_ms.saturating_sub(last_accessed) as f64 / 1000.0;
        score += config.recency_weight * (-config.recency_lambda * seconds).exp();
    }

    score += context_boost(entry, context, config);

    if !entry.extension.is_empty() {
        if context
            .preferred_extensions
            .iter()
            .any(|ext| ext.eq_ignore_ascii_case(&entry.extension))
        {
            score += config.extension_boost;
        }
        if query_names_extension(query, &entry.extension) {
            score += config.extension_query_boost;
        }
    }

    if entry.is_directory && config.prefer_directories {
        score += config.directory_ranking_boost;
    }

    score
}

fn context_boost(entry: &IndexedEntry, context: &RankingContext<'_>, config: &RankingConfig) -> f64 {
    let (Some(current), Some(parent)) = (context.current_directory, entry.parent_directory()) else {
        return 0.0;
    };
    if parent == current {
        return config.context_same_dir_boost;
    }
    match Path::new(current).parent().and_then(|p| p.to_str()) {
        Some(grandparent) if grandparent == parent => config.context_parent_dir_boost,
        _ => 0.0,
    }
}

/// True when the user typed the extension itself ("pdf", ".pdf") or a name ending in it.
fn query_names_extension(query: &str, extension: &str) -> bool {
    let query = fold(query.trim());
    let suffix = format!(".{extension}");
    query
        .split_whitespace()
        .any(|term| term.trim_start_matches('.') == extension || term.ends_with(&suffix))
}

/// Scores, orders and truncates candidates. Ties break on path for determinism.
pub fn rank(
    candidates: Vec<&IndexedEntry>,
    query: &str,
    context: &RankingContext<'_>,
    config: &RankingConfig,
    max_results: usize,
) -> Vec<SearchHit> {
    let to_hit = |entry: &IndexedEntry| SearchHit {
        path: entry.path.clone(),
        name: entry.name.clone(),
        is_directory: entry.is_directory,
        score: score(entry, query, context, config),
    };

    let mut hits = if candidates.len() > PARALLEL_SCORING_THRESHOLD {
        candidates.into_par_iter().map(to_hit).collect::<Vec<_>>()
    } else {
        candidates.into_iter().map(to_hit).collect::<Vec<_>>()
    };

    hits.sort_by(compare_hits);
    hits.truncate(max_results);
    hits
}

fn compare_hits(a: &SearchHit, b: &SearchHit) -> Ordering {
    b.score.total_cmp(&a.score).then_with(|| a.path.cmp(&b.path))
}
