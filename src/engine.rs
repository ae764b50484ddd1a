//! The search engine context object handed to the UI layer.
//!
//! `SearchEngine` pairs the shared `IndexManager` with the background
//! `IndexingScheduler`. It is constructed explicitly and torn down on drop;
//! there is no process-wide instance.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::watch;

use crate::config::SearchEngineConfig;
use crate::error::{Result, SearchError};
use crate::manager::IndexManager;
use crate::persistence;
use crate::scheduler::IndexingScheduler;
use crate::types::{
    EngineStats, IndexedEntry, IndexingProgress, SearchEngineInfo, SearchEngineStatus, SearchHit,
};

/// Entry point for the UI: search, indexing control and introspection.
#[derive(Debug)]
pub struct SearchEngine {
    manager: Arc<IndexManager>,
    scheduler: IndexingScheduler,
}

impl SearchEngine {
    /// Validates `config`, then restores the persisted snapshot if one is configured.
    pub fn new(config: SearchEngineConfig) -> Result<Self> {
        let snapshot_path = config.persistent_index_path.clone();
        let manager = Arc::new(IndexManager::new(config)?);

        if let Some(path) = snapshot_path.as_deref() {
            if let Some(snapshot) = persistence::load_snapshot(path) {
                let restored = manager.insert_batch(snapshot.entries);
                log::info!(
                    "search index restored path={} entries={} saved_at={}",
                    path.display(),
                    restored,
                    snapshot.saved_at
                );
            }
        }

        Ok(Self {
            manager,
            scheduler: IndexingScheduler::new(),
        })
    }

    /// Builds an engine from a JSON settings document.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        Self::new(SearchEngineConfig::from_json_str(raw)?)
    }

    /// Current configuration snapshot.
    pub fn config(&self) -> Arc<SearchEngineConfig> {
        self.manager.config()
    }

    /// Applies to operations started after the call; a running pass keeps its policy.
    pub fn update_config(&self, config: SearchEngineConfig) -> Result<()> {
        self.manager.update_config(config)
    }

    /// Ranked matches for `query`, at most `max_results` of them.
    pub fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        self.manager.search(query)
    }

    /// Like `search`, keeping only entries with one of `extensions`.
    pub fn search_with_extension(&self, query: &str, extensions: &[String]) -> Result<Vec<SearchHit>> {
        self.manager.search_with_extension(query, extensions)
    }

    /// Indexes a single file or folder without descending into it.
    pub fn add_path(&self, path: &Path) -> Result<IndexedEntry> {
        self.manager.add_path(path)
    }

    /// Indexes `folder` and blocks until the pass ends.
    pub fn add_paths_recursive(&self, folder: &Path) -> Result<IndexingProgress> {
        self.scheduler.run_blocking(folder, self.manager.clone())
    }

    /// Starts indexing `folder` in the background and returns immediately.
    /// Poll `get_indexing_progress` or use `subscribe_progress` to follow it.
    pub fn add_paths_recursive_async(&self, folder: &Path) -> Result<()> {
        self.scheduler.start(folder, self.manager.clone())
    }

    /// Drops one path from the index. Returns whether it was present.
    pub fn remove_path(&self, path: &Path) -> Result<bool> {
        self.manager.remove_path(path)
    }

    /// Drops `folder` and everything indexed below it.
    pub fn remove_paths_recursive(&self, folder: &Path) -> Result<usize> {
        self.manager.remove_paths_recursive(folder)
    }

    /// Empties the index. A running pass is not stopped; call `stop_indexing` first.
    pub fn clear_search_engine(&self) {
        self.manager.clear();
    }

    /// Status, progress, metrics, recent activity and index statistics in one read.
    pub fn get_search_engine_info(&self) -> SearchEngineInfo {
        let config = self.manager.config();
        SearchEngineInfo {
            status: self.scheduler.status(),
            progress: self.scheduler.progress(),
            metrics: self.manager.metrics(),
            recent_activity: self.manager.recent_activity(),
            stats: EngineStats {
                trie_size: self.manager.len(),
                cache_size: self.manager.cache_entry_count(),
                persistent_index_bytes: config
                    .persistent_index_path
                    .as_deref()
                    .and_then(persistence::snapshot_size),
            },
            last_updated: self.manager.last_updated(),
        }
    }

    /// Never blocks on a running pass.
    pub fn get_indexing_status(&self) -> SearchEngineStatus {
        self.scheduler.status()
    }

    /// Progress of the current or most recent pass.
    pub fn get_indexing_progress(&self) -> IndexingProgress {
        self.scheduler.progress()
    }

    /// Returns whether a running pass was asked to stop.
    pub fn stop_indexing(&self) -> bool {
        self.scheduler.stop()
    }

    /// Blocks until the background pass, if any, has exited.
    pub fn wait_for_indexing(&self) {
        self.scheduler.wait();
    }

    /// Receives a new snapshot whenever a batch lands or the run ends.
    pub fn subscribe_progress(&self) -> watch::Receiver<IndexingProgress> {
        self.scheduler.subscribe_progress()
    }

    /// Counts an open of `path`, boosting it in later rankings.
    pub fn record_access(&self, path: &Path) -> Result<()> {
        self.manager.record_access(path)
    }

    /// Sets the directory that context-aware ranking favors. `None` clears it.
    pub fn set_current_directory(&self, directory: Option<&Path>) -> Result<()> {
        self.manager.set_current_directory(directory)
    }

    /// Writes the index to `persistent_index_path`. Returns the snapshot size.
    pub fn save_index(&self) -> Result<u64> {
        let config = self.manager.config();
        let path = config.persistent_index_path.as_deref().ok_or_else(|| {
            SearchError::InvalidInput("persistent_index_path is not configured".to_string())
        })?;
        persistence::save_snapshot(path, &self.manager.entries())
    }

    /// Removes entries whose files have disappeared. Returns the count removed.
    pub fn prune_missing(&self) -> usize {
        self.manager.prune_missing()
    }

    pub fn manager(&self) -> &Arc<IndexManager> {
        &self.manager
    }

    /// Stops any running pass and joins the worker.
    pub fn shutdown(&self) {
        self.scheduler.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn invalid_config_is_rejected() {
        let error = SearchEngine::from_json_str(r#"{ "indexing_batch_size": 0 }"#).unwrap_err();
        assert!(matches!(error, SearchError::InvalidInput(_)));
    }

    #[test]
    fn huge_cache_ttl_is_rejected_not_built() {
        let error = SearchEngine::from_json_str(r#"{ "cache_ttl": 40000000000 }"#).unwrap_err();
        assert!(matches!(error, SearchError::InvalidInput(_)));

        let engine = SearchEngine::new(SearchEngineConfig::default()).unwrap();
        let error = engine
            .update_config(SearchEngineConfig {
                cache_ttl: 40_000_000_000,
                ..SearchEngineConfig::default()
            })
            .unwrap_err();
        assert!(matches!(error, SearchError::InvalidInput(_)));
        assert_eq!(engine.config().cache_ttl, SearchEngineConfig::default().cache_ttl);
    }

    #[test]
    fn save_index_requires_a_path() {
        let engine = SearchEngine::new(SearchEngineConfig::default()).unwrap();
        assert!(matches!(engine.save_index(), Err(SearchError::InvalidInput(_))));
    }

    #[test]
    fn info_reports_index_and_status() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("one.txt"), "").unwrap();
        let engine = SearchEngine::new(SearchEngineConfig::default()).unwrap();
        engine.add_paths_recursive(dir.path()).unwrap();
        engine.search("one").unwrap();

        let info = engine.get_search_engine_info();
        assert_eq!(info.status, SearchEngineStatus::Idle);
        assert_eq!(info.stats.trie_size, 2);
        assert_eq!(info.metrics.total_searches, 1);
        assert_eq!(info.recent_activity.recent_searches, vec!["one"]);
        assert_eq!(info.stats.persistent_index_bytes, None);
        assert!(info.last_updated > 0);
    }
}
