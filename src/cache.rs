//! Bounded, TTL-based cache of ranked result lists.

use std::sync::Arc;
use std::time::Duration;

use moka::policy::EvictionPolicy;
use moka::sync::Cache;

use crate::config::{normalize_extensions, MAX_CACHE_TTL_SECS};
use crate::types::SearchHit;

/// Shared, immutable result list handed out by the cache.
pub type CachedResults = Arc<Vec<SearchHit>>;

/// Identifies one search: the normalized query, the extension filter, the
/// ranking context and the index generation the results were computed from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    query: String,
    extensions: Vec<String>,
    context: Option<String>,
    generation: u64,
}

impl CacheKey {
    /// Builds a key. The query is trimmed, case-folded unless `case_sensitive`,
    /// and its whitespace collapsed.
    pub fn new(
        query: &str,
        extensions: &[String],
        context: Option<&str>,
        generation: u64,
        case_sensitive: bool,
    ) -> Self {
        let collapsed = query.split_whitespace().collect::<Vec<_>>().join(" ");
        let query = if case_sensitive {
            collapsed
        } else {
            collapsed.to_lowercase()
        };
        Self {
            query,
            extensions: normalize_extensions(extensions),
            context: context.map(str::to_string),
            generation,
        }
    }
}

/// Search result cache: LRU bounded by entry count, entries expire after a TTL.
#[derive(Debug, Clone)]
pub struct QueryCache {
    cache: Option<Cache<CacheKey, CachedResults>>,
}

impl QueryCache {
    /// A capacity of zero disables caching entirely. The TTL is capped at
    /// `MAX_CACHE_TTL_SECS`.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        if capacity == 0 {
            return Self { cache: None };
        }
        let cache = Cache::builder()
            .max_capacity(capacity as u64)
            .time_to_live(ttl.min(Duration::from_secs(MAX_CACHE_TTL_SECS)))
            .eviction_policy(EvictionPolicy::lru())
            .build();
        Self { cache: Some(cache) }
    }

    /// Returns the cached list if present and younger than the TTL.
    pub fn get(&self, key: &CacheKey) -> Option<CachedResults> {
        self.cache.as_ref()?.get(key)
    }

    /// Stores a result list. A no-op when the cache is disabled.
    pub fn put(&self, key: CacheKey, results: CachedResults) {
        if let Some(cache) = self.cache.as_ref() {
            cache.insert(key, results);
        }
    }

    /// Drops every entry. Called on each index mutation.
    pub fn invalidate_all(&self) {
        if let Some(cache) = self.cache.as_ref() {
            cache.invalidate_all();
        }
    }

    /// Number of live entries after pending evictions are applied.
    pub fn entry_count(&self) -> u64 {
        match self.cache.as_ref() {
            Some(cache) => {
                cache.run_pending_tasks();
                cache.entry_count()
            }
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn results(path: &str) -> CachedResults {
        Arc::new(vec![SearchHit {
            path: path.to_string(),
            name: path.to_string(),
            is_directory: false,
            score: 1.0,
        }])
    }

    fn key(query: &str) -> CacheKey {
        CacheKey::new(query, &[], None, 0, false)
    }

    #[test]
    fn keys_normalize_query_and_extensions() {
        let a = CacheKey::new("  Report  Final ", &["PDF".into(), ".md".into()], None, 1, false);
        let b = CacheKey::new("report final", &["md".into(), "pdf".into()], None, 1, false);
        assert_eq!(a, b);
        let c = CacheKey::new("Report final", &[], None, 1, true);
        let d = CacheKey::new("report final", &[], None, 1, true);
        assert_ne!(c, d);
    }

    #[test]
    fn keys_differ_by_generation_and_context() {
        assert_ne!(
            CacheKey::new("q", &[], None, 1, false),
            CacheKey::new("q", &[], None, 2, false)
        );
        assert_ne!(
            CacheKey::new("q", &[], Some("/a"), 1, false),
            CacheKey::new("q", &[], Some("/b"), 1, false)
        );
    }

    #[test]
    fn put_then_get_hits() {
        let cache = QueryCache::new(8, Duration::from_secs(60));
        cache.put(key("report"), results("/a"));
        assert_eq!(cache.get(&key("report")).unwrap()[0].path, "/a");
        assert!(cache.get(&key("other")).is_none());
    }

    #[test]
    fn entries_expire_after_ttl() {
        let cache = QueryCache::new(8, Duration::from_millis(50));
        cache.put(key("report"), results("/a"));
        thread::sleep(Duration::from_millis(120));
        assert!(cache.get(&key("report")).is_none());
    }

    #[test]
    fn invalidate_all_clears_everything() {
        let cache = QueryCache::new(8, Duration::from_secs(60));
        cache.put(key("a"), results("/a"));
        cache.put(key("b"), results("/b"));
        cache.invalidate_all();
        assert!(cache.get(&key("a")).is_none());
        assert!(cache.get(&key("b")).is_none());
        assert_eq!(cache.entry_count(), 0);
    }

    #[test]
    fn evicts_on_capacity() {
        let cache = QueryCache::new(2, Duration::from_secs(60));
        cache.put(key("one"), results("/1"));
        cache.put(key("two"), results("/2"));
        cache.put(key("three"), results("/3"));
        assert!(cache.entry_count() <= 2);
    }

    #[test]
    fn oversized_ttl_is_capped() {
        let cache = QueryCache::new(8, Duration::from_secs(u64::MAX / 2));
        cache.put(key("a"), results("/a"));
        assert!(cache.get(&key("a")).is_some());
    }

    #[test]
    fn zero_capacity_disables_cache() {
        let cache = QueryCache::new(0, Duration::from_secs(60));
        cache.put(key("a"), results("/a"));
        assert!(cache.get(&key("a")).is_none());
        assert_eq!(cache.entry_count(), 0);
    }
}
