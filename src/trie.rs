//! Prefix tree keyed by path segments.
//!
//! The trie is the single owner of every `IndexedEntry`. Alongside the
//! segment tree it keeps a case-folded name index, and the two are updated
//! together so that every path in the tree has exactly one name-index
//! posting and vice versa.

mod names;
mod node;
mod trigram;

use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

pub use trigram::similarity as trigram_similarity;

use self::names::NameIndex;
use self::node::TrieNode;
use crate::config::SearchOperator;
use crate::error::{Result, SearchError};
use crate::types::IndexedEntry;

/// Path segment tree plus name index. Owns every indexed entry.
#[derive(Debug, Default)]
pub struct PathTrie {
    root: TrieNode,
    names: NameIndex,
    len: usize,
    generation: u64,
    case_sensitive: bool,
}

impl PathTrie {
    /// An empty trie. `case_sensitive` only affects lookups.
    pub fn new(case_sensitive: bool) -> Self {
        Self {
            case_sensitive,
            ..Self::default()
        }
    }

    /// Number of indexed paths.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Counter bumped by every mutation, used to detect stale derived data.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether lookups compare names case-sensitively.
    pub fn case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    /// Switches lookup case sensitivity. The name index itself stays folded.
    pub fn set_case_sensitive(&mut self, case_sensitive: bool) {
        if self.case_sensitive != case_sensitive {
            self.case_sensitive = case_sensitive;
            self.generation += 1;
        }
    }

    /// Marks results derived from the current contents as stale.
    pub fn touch(&mut self) {
        self.generation += 1;
    }

    /// Inserts `entry` under its path, replacing any entry already stored there.
    /// The stored path is normalized, so `/a/x/` and `/a/x` share one entry.
    pub fn insert(&mut self, mut entry: IndexedEntry) -> Result<Option<IndexedEntry>> {
        entry.path = normalize_path(&entry.path)?;
        let path = entry.path.clone();
        let segments = path_segments(&path)?;
        let folded = fold(&entry.name);

        let previous = self.root.insert(&segments, entry);
        match previous.as_ref() {
            Some(old) => {
                let old_folded = fold(&old.name);
                if old_folded != folded {
                    self.names.remove(&old_folded, &path);
                    self.names.insert(&folded, &path);
                }
            }
            None => {
                self.names.insert(&folded, &path);
                self.len += 1;
            }
        }
        self.generation += 1;
        Ok(previous)
    }

    /// Removes a single path. Unknown or malformed paths are a no-op.
    pub fn remove(&mut self, path: &str) -> Option<IndexedEntry> {
        let segments = path_segments(path).ok()?;
        let removed = self.root.remove(&segments)?;
        self.names.remove(&fold(&removed.name), &removed.path);
        self.len -= 1;
        self.generation += 1;
        Some(removed)
    }

    /// Removes `prefix` and every path below it, segment-wise.
    pub fn remove_prefix(&mut self, prefix: &str) -> Vec<IndexedEntry> {
        let Ok(segments) = path_segments(prefix) else {
            return Vec::new();
        };
        let Some(subtree) = self.root.detach(&segments) else {
            return Vec::new();
        };

        let removed = subtree.into_entries();
        for entry in &removed {
            self.names.remove(&fold(&entry.name), &entry.path);
        }
        self.len -= removed.len();
        if !removed.is_empty() {
            self.generation += 1;
        }
        removed
    }

    /// Drops every entry and bumps the generation.
    pub fn clear(&mut self) {
        self.root = TrieNode::default();
        self.names.clear();
        self.len = 0;
        self.generation += 1;
    }

    /// Entry stored at `path`, in any spelling that normalizes to it.
    pub fn get(&self, path: &str) -> Option<&IndexedEntry> {
        let segments = path_segments(path).ok()?;
        self.root.find(&segments)?.entry.as_ref()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Bumps the access counters of `path`.
    pub fn record_access(&mut self, path: &str, now_ms: u64) -> Option<&IndexedEntry> {
        let segments = path_segments(path).ok()?;
        let entry = self.root.find_mut(&segments)?.entry.as_mut()?;
        entry.access_frequency = entry.access_frequency.saturating_add(1);
        entry.last_accessed = Some(now_ms);
        self.generation += 1;
        Some(entry)
    }

    /// Every indexed entry, in no particular order.
    pub fn entries(&self) -> Vec<&IndexedEntry> {
        self.root.entries()
    }

    /// Entries whose name equals, starts with or contains `query`, plus, when
    /// `fuzzy_threshold` is set, entries whose name is trigram-similar to it.
    pub fn find_candidates(&self, query: &str, fuzzy_threshold: Option<f64>) -> Vec<&IndexedEntry> {
        self.candidate_paths(query, fuzzy_threshold)
            .into_iter()
            .filter_map(|path| self.get(path))
            .collect()
    }

    /// Combines the candidates of every whitespace separated term.
    pub fn find_candidates_for_terms(
        &self,
        terms: &[&str],
        operator: SearchOperator,
        fuzzy_threshold: Option<f64>,
    ) -> Vec<&IndexedEntry> {
        let mut combined: Option<BTreeSet<&str>> = None;
        for term in terms {
            let paths = self.candidate_paths(term, fuzzy_threshold);
            combined = Some(match (combined, operator) {
                (None, _) => paths,
                (Some(acc), SearchOperator::And) => acc.intersection(&paths).copied().collect(),
                (Some(mut acc), SearchOperator::Or) => {
                    acc.extend(paths);
                    acc
                }
            });
        }
        combined
            .unwrap_or_default()
            .into_iter()
            .filter_map(|path| self.get(path))
            .collect()
    }

    fn candidate_paths(&self, term: &str, fuzzy_threshold: Option<f64>) -> BTreeSet<&str> {
        if term.is_empty() || self.is_empty() {
            return BTreeSet::new();
        }
        let folded = fold(term);

        let mut matched = BTreeSet::new();
        for name in self.names.names_containing(&folded) {
            matched.extend(self.names.paths_for(name));
        }
        if self.case_sensitive {
            matched.retain(|path| {
                self.get(path)
                    .is_some_and(|entry| entry.name.contains(term))
            });
        }

        if let Some(threshold) = fuzzy_threshold {
            for (name, _) in self.names.names_similar_to(&folded, threshold) {
                matched.extend(self.names.paths_for(name));
            }
        }
        matched
    }
}

/// Case folding applied to names and query terms for lookup.
pub fn fold(value: &str) -> String {
    value.to_lowercase()
}

/// Splits a path into trie segments. The root (and drive prefix) is its own segment.
pub fn path_segments(path: &str) -> Result<Vec<&str>> {
    if path.is_empty() {
        return Err(SearchError::InvalidInput("path must not be empty".to_string()));
    }
    let mut segments = Vec::new();
    for component in Path::new(path).components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(SearchError::InvalidInput(format!(
                    "path must not contain parent references: {path}"
                )));
            }
            other => {
                let segment = other.as_os_str().to_str().ok_or_else(|| {
                    SearchError::InvalidInput(format!("path is not valid UTF-8: {path}"))
                })?;
                segments.push(segment);
            }
        }
    }
    if segments.is_empty() {
        return Err(SearchError::InvalidInput(format!("path has no segments: {path}")));
    }
    Ok(segments)
}

/// Rebuilds `path` from its segments: drops `.` and trailing separators.
pub fn normalize_path(path: &str) -> Result<String> {
    if path.trim().is_empty() || path.contains('\0') {
        return Err(SearchError::InvalidInput(format!("malformed path: {path:?}")));
    }
    let segments = path_segments(path)?;
    let normalized = segments.iter().collect::<PathBuf>();
    Ok(normalized.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(path: &str) -> IndexedEntry {
        IndexedEntry::new(path, false)
    }

    fn dir(path: &str) -> IndexedEntry {
        IndexedEntry::new(path, true)
    }

    fn paths(entries: Vec<&IndexedEntry>) -> Vec<String> {
        let mut paths = entries.into_iter().map(|e| e.path.clone()).collect::<Vec<_>>();
        paths.sort();
        paths
    }

    fn sample() -> PathTrie {
        let mut trie = PathTrie::new(false);
        for entry in [
            dir("/docs"),
            file("/docs/report.txt"),
            file("/docs/report_final.txt"),
            file("/docs/Annual-Report.pdf"),
            file("/docs/report"),
            dir("/docs/archive"),
            file("/docs/archive/report.txt"),
            file("/music/song.mp3"),
        ] {
            trie.insert(entry).unwrap();
        }
        trie
    }

    #[test]
    fn empty_trie_has_no_candidates() {
        let trie = PathTrie::new(false);
        assert!(trie.find_candidates("anything", Some(0.3)).is_empty());
    }

    #[test]
    fn insert_is_idempotent() {
        let mut trie = PathTrie::new(false);
        trie.insert(file("/a/x.txt")).unwrap();
        trie.insert(file("/a/x.txt")).unwrap();
        assert_eq!(trie.len(), 1);
        assert_eq!(trie.find_candidates("x.txt", None).len(), 1);
    }

    #[test]
    fn same_name_at_different_locations() {
        let trie = sample();
        let found = paths(trie.find_candidates("report.txt", None));
        assert_eq!(found, vec!["/docs/archive/report.txt", "/docs/report.txt"]);
    }

    #[test]
    fn candidates_cover_exact_prefix_and_contains() {
        let trie = sample();
        let found = paths(trie.find_candidates("report", None));
        assert_eq!(
            found,
            vec![
                "/docs/Annual-Report.pdf",
                "/docs/archive/report.txt",
                "/docs/report",
                "/docs/report.txt",
                "/docs/report_final.txt",
            ]
        );
    }

    #[test]
    fn short_terms_scan_names() {
        let trie = sample();
        let found = paths(trie.find_candidates("mp", None));
        assert_eq!(found, vec!["/music/song.mp3"]);
    }

    #[test]
    fn case_sensitive_lookup_filters_folded_matches() {
        let mut trie = sample();
        trie.set_case_sensitive(true);
        let found = paths(trie.find_candidates("Report", None));
        assert_eq!(found, vec!["/docs/Annual-Report.pdf"]);
    }

    #[test]
    fn fuzzy_lookup_tolerates_typos() {
        let trie = sample();
        assert!(trie.find_candidates("sogn.mp3", None).is_empty());
        let found = paths(trie.find_candidates("sogn.mp3", Some(0.3)));
        assert_eq!(found, vec!["/music/song.mp3"]);
    }

    #[test]
    fn remove_drops_path_and_name_posting() {
        let mut trie = sample();
        let removed = trie.remove("/music/song.mp3").unwrap();
        assert_eq!(removed.name, "song.mp3");
        assert!(trie.find_candidates("song", Some(0.3)).is_empty());
        assert!(!trie.contains("/music/song.mp3"));
        assert_eq!(trie.len(), 7);
    }

    #[test]
    fn differently_spelled_paths_share_one_posting() {
        let mut trie = PathTrie::new(false);
        trie.insert(file("/a/x.txt/")).unwrap();
        trie.insert(file("/a/./x.txt")).unwrap();
        assert_eq!(trie.len(), 1);
        assert_eq!(trie.get("/a/x.txt").unwrap().path, "/a/x.txt");
        assert_eq!(trie.names.paths_for("x.txt").collect::<Vec<_>>(), vec!["/a/x.txt"]);

        trie.remove("/a/x.txt").unwrap();
        assert_eq!(trie.names.paths_for("x.txt").count(), 0);
        assert!(trie.is_empty());
    }

    #[test]
    fn remove_unknown_path_is_noop() {
        let mut trie = sample();
        let generation = trie.generation();
        assert!(trie.remove("/nope").is_none());
        assert!(trie.remove("").is_none());
        assert_eq!(trie.generation(), generation);
    }

    #[test]
    fn remove_prefix_is_segment_aware() {
        let mut trie = PathTrie::new(false);
        trie.insert(dir("/a/b")).unwrap();
        trie.insert(file("/a/b/c.txt")).unwrap();
        trie.insert(file("/a/bc.txt")).unwrap();

        let removed = trie.remove_prefix("/a/b");
        assert_eq!(removed.len(), 2);
        assert_eq!(trie.len(), 1);
        assert!(trie.contains("/a/bc.txt"));
        assert!(trie.find_candidates("c.txt", None).iter().all(|e| e.path == "/a/bc.txt"));
    }

    #[test]
    fn names_and_tree_stay_in_sync() {
        let mut trie = sample();
        trie.remove_prefix("/docs/archive");
        let everything = trie.entries().len();
        assert_eq!(everything, trie.len());
        for entry in trie.entries() {
            assert!(trie
                .find_candidates(&entry.name, None)
                .iter()
                .any(|e| e.path == entry.path));
        }
    }

    #[test]
    fn and_operator_intersects_terms() {
        let trie = sample();
        let found = paths(trie.find_candidates_for_terms(
            &["report", "final"],
            SearchOperator::And,
            None,
        ));
        assert_eq!(found, vec!["/docs/report_final.txt"]);
    }

    #[test]
    fn or_operator_unions_terms() {
        let trie = sample();
        let found = paths(trie.find_candidates_for_terms(
            &["song", "final"],
            SearchOperator::Or,
            None,
        ));
        assert_eq!(found, vec!["/docs/report_final.txt", "/music/song.mp3"]);
    }

    #[test]
    fn record_access_updates_counters() {
        let mut trie = sample();
        trie.record_access("/docs/report.txt", 42).unwrap();
        let entry = trie.record_access("/docs/report.txt", 43).unwrap();
        assert_eq!(entry.access_frequency, 2);
        assert_eq!(entry.last_accessed, Some(43));
        assert!(trie.record_access("/missing", 1).is_none());
    }

    #[test]
    fn normalize_strips_trailing_separator_and_dots() {
        assert_eq!(normalize_path("/a/./b/").unwrap(), "/a/b");
        assert!(normalize_path("").is_err());
        assert!(normalize_path("   ").is_err());
        assert!(normalize_path("/a/../b").is_err());
    }
}
