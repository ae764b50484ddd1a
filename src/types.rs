//! Core data types shared by the index, the scheduler and the engine facade.

use std::fs::Metadata;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// One indexed filesystem object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedEntry {
    /// Absolute, normalized path. Unique key of the entry.
    pub path: String,
    /// Final path segment, used for matching.
    pub name: String,
    pub is_directory: bool,
    /// Lowercase extension without the dot, empty for directories.
    pub extension: String,
    pub access_frequency: u64,
    /// Unix timestamp in milliseconds of the last recorded access.
    pub last_accessed: Option<u64>,
    pub size: Option<u64>,
    pub modified_at: Option<u64>,
}

impl IndexedEntry {
    /// Builds an entry for an already normalized path.
    pub fn new(path: impl Into<String>, is_directory: bool) -> Self {
        let path = path.into();
        let as_path = Path::new(&path);
        let name = as_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.clone());
        let extension = if is_directory {
            String::new()
        } else {
            as_path
                .extension()
                .map(|ext| ext.to_string_lossy().to_lowercase())
                .unwrap_or_default()
        };
        Self {
            path,
            name,
            is_directory,
            extension,
            access_frequency: 0,
            last_accessed: None,
            size: None,
            modified_at: None,
        }
    }

    /// Builds an entry from filesystem metadata gathered by the caller.
    pub fn from_metadata(path: impl Into<String>, metadata: &Metadata) -> Self {
        let is_directory = metadata.is_dir();
        let mut entry = Self::new(path, is_directory);
        if !is_directory {
            entry.size = Some(metadata.len());
        }
        entry.modified_at = metadata
            .modified()
            .ok()
            .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
            .map(|elapsed| elapsed.as_millis() as u64);
        entry
    }

    /// Returns the directory containing this entry.
    pub fn parent_directory(&self) -> Option<&str> {
        Path::new(&self.path).parent().and_then(|parent| parent.to_str())
    }

    /// Carries access statistics over from a previous version of the same path.
    pub fn inherit_access(&mut self, previous: &IndexedEntry) {
        self.access_frequency = previous.access_frequency;
        self.last_accessed = previous.last_accessed;
    }
}

/// One ranked search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub path: String,
    pub name: String,
    pub is_directory: bool,
    pub score: f64,
}

/// Engine run state. Transitions are driven by the indexing scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchEngineStatus {
    Idle,
    Indexing,
    Stopped,
    Error(String),
}

impl SearchEngineStatus {
    /// Lowercase label for logs and the UI.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Indexing => "indexing",
            Self::Stopped => "stopped",
            Self::Error(_) => "error",
        }
    }
}

/// Progress of the current (or last) indexing run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexingProgress {
    pub files_discovered: usize,
    pub files_indexed: usize,
    pub percentage_complete: f32,
    pub current_path: Option<String>,
    /// Unix timestamp in milliseconds.
    pub start_time: Option<u64>,
    /// Milliseconds.
    pub estimated_time_remaining: Option<u64>,
    /// Per-file errors skipped during the run.
    pub errors: usize,
}

impl IndexingProgress {
    /// Resets every counter for a run starting at `started_at`.
    pub fn started(started_at: u64) -> Self {
        Self {
            start_time: Some(started_at),
            ..Self::default()
        }
    }

    /// Recomputes the derived fields from the counters.
    pub fn recompute(&mut self, now_ms: u64) {
        self.percentage_complete =
            self.files_indexed as f32 / self.files_discovered.max(1) as f32 * 100.0;

        let Some(started) = self.start_time else {
            self.estimated_time_remaining = None;
            return;
        };
        let elapsed_ms = now_ms.saturating_sub(started);
        if self.files_indexed == 0 || elapsed_ms == 0 {
            self.estimated_time_remaining = None;
            return;
        }
        let per_file_ms = elapsed_ms as f64 / self.files_indexed as f64;
        let remaining = self.files_discovered.saturating_sub(self.files_indexed);
        self.estimated_time_remaining = Some((per_file_ms * remaining as f64).round() as u64);
    }
}

/// Search counters since creation or the last `clear`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchEngineMetrics {
    pub total_searches: u64,
    pub average_search_time_ms: f64,
    pub cache_hits: u64,
    pub cache_hit_rate: f64,
    pub last_indexing_duration_ms: Option<u64>,
}

/// Recent queries and most opened paths.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecentActivity {
    /// Most recent first, without duplicates.
    pub recent_searches: Vec<String>,
    /// Highest access frequency first.
    pub most_accessed_paths: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineStats {
    /// Number of indexed paths.
    pub trie_size: usize,
    /// Number of live query cache entries.
    pub cache_size: u64,
    /// Size of the on-disk snapshot, when one is configured and present.
    pub persistent_index_bytes: Option<u64>,
}

/// Aggregated view returned to the UI layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchEngineInfo {
    pub status: SearchEngineStatus,
    pub progress: IndexingProgress,
    pub metrics: SearchEngineMetrics,
    pub recent_activity: RecentActivity,
    pub stats: EngineStats,
    /// Unix timestamp in milliseconds of the last index mutation or search.
    pub last_updated: u64,
}

/// Returns the current Unix timestamp in milliseconds.
pub fn unix_now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|value| value.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_derives_name_and_lowercase_extension() {
        let entry = IndexedEntry::new("/docs/Report.PDF", false);
        assert_eq!(entry.name, "Report.PDF");
        assert_eq!(entry.extension, "pdf");
        assert_eq!(entry.parent_directory(), Some("/docs"));
    }

    #[test]
    fn directories_have_no_extension() {
        let entry = IndexedEntry::new("/src/archive.d", true);
        assert_eq!(entry.name, "archive.d");
        assert!(entry.extension.is_empty());
    }

    #[test]
    fn dotfiles_have_no_extension() {
        let entry = IndexedEntry::new("/home/u/.bashrc", false);
        assert_eq!(entry.name, ".bashrc");
        assert!(entry.extension.is_empty());
    }

    #[test]
    fn progress_percentage_and_eta() {
        let mut progress = IndexingProgress::started(1_000);
        progress.files_discovered = 10;
        progress.files_indexed = 5;
        progress.recompute(2_000);
        assert!((progress.percentage_complete - 50.0).abs() < f32::EPSILON);
        // 1000ms for 5 files, 5 remaining.
        assert_eq!(progress.estimated_time_remaining, Some(1_000));
    }

    #[test]
    fn progress_with_nothing_discovered_is_zero() {
        let mut progress = IndexingProgress::started(1_000);
        progress.recompute(1_500);
        assert_eq!(progress.percentage_complete, 0.0);
        assert_eq!(progress.estimated_time_remaining, None);
    }
}
