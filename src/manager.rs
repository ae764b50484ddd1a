//! In-memory index manager: owns the path trie, the query cache and the
//! search metrics, and serializes every mutation behind one write lock.

use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};

use crate::cache::{CacheKey, QueryCache};
use crate::config::{normalize_extensions, SearchEngineConfig};
use crate::error::{Result, SearchError};
use crate::ranking::{rank, RankingContext};
use crate::trie::{normalize_path, PathTrie};
use crate::types::{
    unix_now_millis, IndexedEntry, RecentActivity, SearchEngineMetrics, SearchHit,
};

/// Number of paths reported in `RecentActivity::most_accessed_paths`.
const MOST_ACCESSED_LIMIT: usize = 10;

/// Shared index state. Reads run in parallel; mutations take the trie write lock.
#[derive(Debug)]
pub struct IndexManager {
    config: RwLock<Arc<SearchEngineConfig>>,
    trie: RwLock<PathTrie>,
    cache: RwLock<QueryCache>,
    metrics: Mutex<SearchEngineMetrics>,
    recent_searches: Mutex<VecDeque<String>>,
    current_directory: RwLock<Option<String>>,
    last_updated: AtomicU64,
}

impl IndexManager {
    /// Normalizes and validates `config`, then builds an empty index.
    pub fn new(mut config: SearchEngineConfig) -> Result<Self> {
        config.normalize();
        config.validate()?;
        let cache = QueryCache::new(config.cache_size, config.cache_ttl_duration());
        Ok(Self {
            trie: RwLock::new(PathTrie::new(config.case_sensitive_search)),
            config: RwLock::new(Arc::new(config)),
            cache: RwLock::new(cache),
            metrics: Mutex::new(SearchEngineMetrics::default()),
            recent_searches: Mutex::new(VecDeque::new()),
            current_directory: RwLock::new(None),
            last_updated: AtomicU64::new(unix_now_millis()),
        })
    }

    /// Configuration snapshot. Callers keep using it even if it is replaced.
    pub fn config(&self) -> Arc<SearchEngineConfig> {
        self.config.read().clone()
    }

    /// Replaces the configuration and drops every cached result.
    pub fn update_config(&self, mut config: SearchEngineConfig) -> Result<()> {
        config.normalize();
        config.validate()?;

        let mut trie = self.trie.write();
        let mut current = self.config.write();
        if current.cache_size != config.cache_size || current.cache_ttl != config.cache_ttl {
            *self.cache.write() = QueryCache::new(config.cache_size, config.cache_ttl_duration());
        } else {
            self.cache.read().invalidate_all();
        }
        trie.set_case_sensitive(config.case_sensitive_search);
        trie.touch();
        *current = Arc::new(config);
        drop(current);
        drop(trie);

        self.touch();
        log::debug!("search config updated");
        Ok(())
    }

    /// Stats the path and indexes it as a single entry.
    pub fn add_path(&self, path: &Path) -> Result<IndexedEntry> {
        if !self.config().search_engine_enabled {
            return Err(SearchError::Disabled);
        }
        let normalized = resolve_path(path)?;
        let metadata =
            fs::symlink_metadata(&normalized).map_err(|error| SearchError::from_io(error, path))?;
        let mut entry = IndexedEntry::from_metadata(normalized, &metadata);

        let mut trie = self.trie.write();
        if let Some(previous) = trie.get(&entry.path) {
            entry.inherit_access(previous);
        }
        trie.insert(entry.clone())?;
        drop(trie);

        self.invalidate();
        Ok(entry)
    }

    /// Inserts a batch under a single write lock. Returns the number inserted.
    pub fn insert_batch(&self, entries: Vec<IndexedEntry>) -> usize {
        if entries.is_empty() {
            return 0;
        }
        let mut inserted = 0;
        let mut trie = self.trie.write();
        for mut entry in entries {
            if let Some(previous) = trie.get(&entry.path) {
                entry.inherit_access(previous);
            }
            let path = entry.path.clone();
            match trie.insert(entry) {
                Ok(_) => inserted += 1,
                Err(error) => log::debug!("skipping malformed index entry {path}: {error}"),
            }
        }
        drop(trie);

        self.invalidate();
        inserted
    }

    /// Removes one path. Returns whether it was indexed.
    pub fn remove_path(&self, path: &Path) -> Result<bool> {
        let normalized = resolve_path(path)?;
        let removed = self.trie.write().remove(&normalized).is_some();
        if removed {
            self.invalidate();
        }
        Ok(removed)
    }

    /// Removes a folder and everything indexed below it. Returns the count removed.
    pub fn remove_paths_recursive(&self, folder: &Path) -> Result<usize> {
        let normalized = resolve_path(folder)?;
        let removed = self.trie.write().remove_prefix(&normalized).len();
        if removed > 0 {
            self.invalidate();
        }
        Ok(removed)
    }

    /// Empties the index and the cache and resets search metrics.
    pub fn clear(&self) {
        self.trie.write().clear();
        self.cache.read().invalidate_all();
        let last_indexing = self.metrics.lock().last_indexing_duration_ms;
        *self.metrics.lock() = SearchEngineMetrics {
            last_indexing_duration_ms: last_indexing,
            ..SearchEngineMetrics::default()
        };
        self.recent_searches.lock().clear();
        self.touch();
    }

    /// Ranked matches for `query`, served from the cache when possible.
    pub fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        self.run_search(query, &[])
    }

    /// Like `search`, keeping only entries whose extension is listed.
    /// An empty list applies no filter.
    pub fn search_with_extension(&self, query: &str, extensions: &[String]) -> Result<Vec<SearchHit>> {
        self.run_search(query, &normalize_extensions(extensions))
    }

    fn run_search(&self, query: &str, extensions: &[String]) -> Result<Vec<SearchHit>> {
        let started = Instant::now();
        let query = query.trim();
        if query.is_empty() {
            return Err(SearchError::InvalidInput("search query must not be empty".to_string()));
        }

        let trie = self.trie.read();
        // Read under the trie lock so the snapshot matches the generation.
        let config = self.config();
        if !config.search_engine_enabled {
            return Err(SearchError::Disabled);
        }
        let cache = self.cache.read().clone();
        let current_directory = self.current_directory.read().clone();
        let key = CacheKey::new(
            query,
            extensions,
            current_directory.as_deref(),
            trie.generation(),
            config.case_sensitive_search,
        );

        if let Some(cached) = cache.get(&key) {
            drop(trie);
            self.record_search(query, started, true, config.recent_searches_limit);
            return Ok(cached.as_ref().clone());
        }

        let terms = query.split_whitespace().collect::<Vec<_>>();
        let threshold = config.fuzzy_threshold();
        let mut candidates = if terms.len() > 1 {
            trie.find_candidates_for_terms(&terms, config.default_search_operator, threshold)
        } else {
            trie.find_candidates(query, threshold)
        };
        if !extensions.is_empty() {
            candidates.retain(|entry| extensions.binary_search(&entry.extension).is_ok());
        }

        let context = RankingContext {
            current_directory: current_directory.as_deref(),
            preferred_extensions: &config.preferred_extensions,
            case_sensitive: config.case_sensitive_search,
            now_ms: unix_now_millis(),
        };
        let hits = rank(
            candidates,
            query,
            &context,
            &config.effective_ranking(),
            config.max_results,
        );
        drop(trie);

        cache.put(key, Arc::new(hits.clone()));
        self.record_search(query, started, false, config.recent_searches_limit);
        Ok(hits)
    }

    fn record_search(&self, query: &str, started: Instant, cache_hit: bool, recent_limit: usize) {
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        {
            let mut metrics = self.metrics.lock();
            metrics.total_searches += 1;
            metrics.average_search_time_ms +=
                (elapsed_ms - metrics.average_search_time_ms) / metrics.total_searches as f64;
            if cache_hit {
                metrics.cache_hits += 1;
            }
            metrics.cache_hit_rate = metrics.cache_hits as f64 / metrics.total_searches as f64;
        }
        {
            let mut recent = self.recent_searches.lock();
            recent.retain(|previous| previous != query);
            recent.push_front(query.to_string());
            recent.truncate(recent_limit);
        }
        self.touch();
    }

    /// Bumps the access counters used by frequency and recency ranking.
    pub fn record_access(&self, path: &Path) -> Result<()> {
        let normalized = resolve_path(path)?;
        let found = self
            .trie
            .write()
            .record_access(&normalized, unix_now_millis())
            .is_some();
        if !found {
            return Err(SearchError::NotFound(normalized));
        }
        self.invalidate();
        Ok(())
    }

    /// Sets the directory used for context ranking. `None` clears it.
    pub fn set_current_directory(&self, directory: Option<&Path>) -> Result<()> {
        let normalized = directory.map(resolve_path).transpose()?;
        *self.current_directory.write() = normalized;
        Ok(())
    }

    /// Normalized ranking context directory, if set.
    pub fn current_directory(&self) -> Option<String> {
        self.current_directory.read().clone()
    }

    /// Drops entries whose path no longer exists. Returns the count removed.
    pub fn prune_missing(&self) -> usize {
        let paths = self
            .trie
            .read()
            .entries()
            .into_iter()
            .map(|entry| entry.path.clone())
            .collect::<Vec<_>>();

        let missing = paths
            .into_iter()
            .filter(|path| {
                matches!(
                    fs::symlink_metadata(path),
                    Err(error) if error.kind() == io::ErrorKind::NotFound
                )
            })
            .collect::<Vec<_>>();
        if missing.is_empty() {
            return 0;
        }

        let mut trie = self.trie.write();
        let removed = missing
            .iter()
            .filter(|path| trie.remove(path).is_some())
            .count();
        drop(trie);

        if removed > 0 {
            self.invalidate();
        }
        log::debug!("pruned {removed} missing paths from search index");
        removed
    }

    /// Number of indexed paths.
    pub fn len(&self) -> usize {
        self.trie.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.trie.read().is_empty()
    }

    /// Whether `path`, in normalized form, is indexed.
    pub fn contains(&self, path: &str) -> bool {
        self.trie.read().contains(path)
    }

    /// Owned copy of the entry at `path`.
    pub fn get(&self, path: &str) -> Option<IndexedEntry> {
        self.trie.read().get(path).cloned()
    }

    /// Owned copy of every entry, for snapshots.
    pub fn entries(&self) -> Vec<IndexedEntry> {
        self.trie.read().entries().into_iter().cloned().collect()
    }

    /// Approximate number of cached result lists.
    pub fn cache_entry_count(&self) -> u64 {
        self.cache.read().entry_count()
    }

    /// Snapshot of the search counters.
    pub fn metrics(&self) -> SearchEngineMetrics {
        self.metrics.lock().clone()
    }

    pub(crate) fn set_last_indexing_duration(&self, duration_ms: u64) {
        self.metrics.lock().last_indexing_duration_ms = Some(duration_ms);
    }

    /// Recent queries, newest first, and the most opened paths.
    pub fn recent_activity(&self) -> RecentActivity {
        let recent_searches = self.recent_searches.lock().iter().cloned().collect();

        let trie = self.trie.read();
        let mut accessed = trie
            .entries()
            .into_iter()
            .filter(|entry| entry.access_frequency > 0)
            .collect::<Vec<_>>();
        accessed.sort_by(|a, b| {
            b.access_frequency
                .cmp(&a.access_frequency)
                .then_with(|| a.path.cmp(&b.path))
        });
        let most_accessed_paths = accessed
            .into_iter()
            .take(MOST_ACCESSED_LIMIT)
            .map(|entry| entry.path.clone())
            .collect();

        RecentActivity {
            recent_searches,
            most_accessed_paths,
        }
    }

    /// Unix millis of the last index or config change.
    pub fn last_updated(&self) -> u64 {
        self.last_updated.load(Ordering::Relaxed)
    }

    fn invalidate(&self) {
        self.cache.read().invalidate_all();
        self.touch();
    }

    fn touch(&self) {
        self.last_updated.store(unix_now_millis(), Ordering::Relaxed);
    }
}

/// Makes `path` absolute and normalizes it into the trie's key form.
pub(crate) fn resolve_path(path: &Path) -> Result<String> {
    if path.as_os_str().is_empty() {
        return Err(SearchError::InvalidInput("path must not be empty".to_string()));
    }
    let absolute = std::path::absolute(path).map_err(|error| SearchError::from_io(error, path))?;
    let raw = absolute.to_str().ok_or_else(|| {
        SearchError::InvalidInput(format!("path is not valid UTF-8: {}", path.display()))
    })?;
    normalize_path(raw)
}
