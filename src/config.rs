//! Strongly typed search engine configuration.
//!
//! Settings arrive as JSON from the host application. Every field has a
//! default so partial documents load, and `validate` rejects values the
//! engine cannot honor before anything is built from them.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SearchError};

/// Longest accepted `cache_ttl`, one year in seconds.
pub const MAX_CACHE_TTL_SECS: u64 = 365 * 24 * 60 * 60;

/// How the terms of a multi-word query are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchOperator {
    #[default]
    And,
    Or,
}

/// Weights used by the ranking function. Read-only during scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    pub frequency_weight: f64,
    pub max_frequency_boost: f64,
    pub recency_weight: f64,
    /// Exponential decay constant per second since last access.
    pub recency_lambda: f64,
    pub context_same_dir_boost: f64,
    pub context_parent_dir_boost: f64,
    pub extension_boost: f64,
    pub extension_query_boost: f64,
    pub exact_match_boost: f64,
    pub prefix_match_boost: f64,
    pub contains_match_boost: f64,
    /// Multiplied by the trigram similarity of entries that matched only fuzzily.
    pub fuzzy_match_boost: f64,
    pub directory_ranking_boost: f64,
    pub prefer_directories: bool,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            frequency_weight: 0.05,
            max_frequency_boost: 0.5,
            recency_weight: 1.5,
            // Roughly a one day half-life.
            recency_lambda: std::f64::consts::LN_2 / 86_400.0,
            context_same_dir_boost: 0.4,
            context_parent_dir_boost: 0.2,
            extension_boost: 0.2,
            extension_query_boost: 0.25,
            exact_match_boost: 1.0,
            prefix_match_boost: 0.3,
            contains_match_boost: 0.1,
            fuzzy_match_boost: 0.05,
            directory_ranking_boost: 0.2,
            prefer_directories: false,
        }
    }
}

impl RankingConfig {
    fn validate(&self) -> Result<()> {
        let weights = [
            ("frequency_weight", self.frequency_weight),
            ("max_frequency_boost", self.max_frequency_boost),
            ("recency_weight", self.recency_weight),
            ("recency_lambda", self.recency_lambda),
            ("context_same_dir_boost", self.context_same_dir_boost),
            ("context_parent_dir_boost", self.context_parent_dir_boost),
            ("extension_boost", self.extension_boost),
            ("extension_query_boost", self.extension_query_boost),
            ("exact_match_boost", self.exact_match_boost),
            ("prefix_match_boost", self.prefix_match_boost),
            ("contains_match_boost", self.contains_match_boost),
            ("fuzzy_match_boost", self.fuzzy_match_boost),
            ("directory_ranking_boost", self.directory_ranking_boost),
        ];
        for (name, value) in weights {
            if !value.is_finite() || value < 0.0 {
                return Err(SearchError::InvalidInput(format!(
                    "ranking_config.{name} must be a finite non-negative number, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Engine settings as loaded from the host application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchEngineConfig {
    pub search_engine_enabled: bool,
    pub max_results: usize,
    pub preferred_extensions: Vec<String>,
    pub excluded_patterns: Vec<String>,
    /// Maximum number of cached queries. Zero disables the cache.
    pub cache_size: usize,
    /// Seconds a cached result list stays valid, at most `MAX_CACHE_TTL_SECS`.
    pub cache_ttl: u64,
    pub ranking_config: RankingConfig,
    pub prefer_directories: bool,
    pub index_hidden_files: bool,
    pub follow_symlinks: bool,
    pub max_index_depth: Option<usize>,
    pub max_indexed_files: Option<usize>,
    pub indexing_batch_size: usize,
    pub fuzzy_search_enabled: bool,
    pub fuzzy_trigram_threshold: f64,
    pub case_sensitive_search: bool,
    pub default_search_operator: SearchOperator,
    pub retry_failed_indexing: bool,
    pub persistent_index_path: Option<PathBuf>,
    pub recent_searches_limit: usize,
}

impl Default for SearchEngineConfig {
    fn default() -> Self {
        Self {
            search_engine_enabled: true,
            max_results: 20,
            preferred_extensions: ["txt", "pdf", "docx", "xlsx", "md", "rs", "js", "html", "json"]
                .into_iter()
                .map(String::from)
                .collect(),
            excluded_patterns: [".git", "node_modules", "target"]
                .into_iter()
                .map(String::from)
                .collect(),
            cache_size: 1000,
            cache_ttl: 300,
            ranking_config: RankingConfig::default(),
            prefer_directories: false,
            index_hidden_files: false,
            follow_symlinks: false,
            max_index_depth: None,
            max_indexed_files: None,
            indexing_batch_size: 256,
            fuzzy_search_enabled: true,
            fuzzy_trigram_threshold: 0.35,
            case_sensitive_search: false,
            default_search_operator: SearchOperator::And,
            retry_failed_indexing: true,
            persistent_index_path: None,
            recent_searches_limit: 10,
        }
    }
}

impl SearchEngineConfig {
    /// Parses and validates a JSON settings document.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let mut config: Self = serde_json::from_str(raw)
            .map_err(|error| SearchError::InvalidInput(format!("invalid search config: {error}")))?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON settings file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|error| SearchError::from_io(error, path))?;
        let config = Self::from_json_str(&raw).inspect_err(|error| {
            log::warn!("rejected search config {}: {error}", path.display());
        })?;
        log::debug!("loaded search config from {}", path.display());
        Ok(config)
    }

    /// Lowercases extensions and strips leading dots so lookups compare like for like.
    pub fn normalize(&mut self) {
        self.preferred_extensions = normalize_extensions(&self.preferred_extensions);
    }

    /// Rejects values the engine cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.max_results == 0 {
            return Err(SearchError::InvalidInput(
                "max_results must be greater than zero".to_string(),
            ));
        }
        if self.indexing_batch_size == 0 {
            return Err(SearchError::InvalidInput(
                "indexing_batch_size must be greater than zero".to_string(),
            ));
        }
        if self.cache_ttl > MAX_CACHE_TTL_SECS {
            return Err(SearchError::InvalidInput(format!(
                "cache_ttl must be at most {MAX_CACHE_TTL_SECS} seconds, got {}",
                self.cache_ttl
            )));
        }
        if !(self.fuzzy_trigram_threshold > 0.0 && self.fuzzy_trigram_threshold <= 1.0) {
            return Err(SearchError::InvalidInput(format!(
                "fuzzy_trigram_threshold must be in (0, 1], got {}",
                self.fuzzy_trigram_threshold
            )));
        }
        if self.max_indexed_files == Some(0) {
            return Err(SearchError::InvalidInput(
                "max_indexed_files must be greater than zero when set".to_string(),
            ));
        }
        for pattern in &self.excluded_patterns {
            if pattern.trim().is_empty() {
                return Err(SearchError::InvalidInput(
                    "excluded_patterns must not contain empty patterns".to_string(),
                ));
            }
            if is_glob(pattern) {
                glob::Pattern::new(pattern).map_err(|error| {
                    SearchError::InvalidInput(format!("invalid exclusion pattern {pattern}: {error}"))
                })?;
            }
        }
        self.ranking_config.validate()
    }

    /// `cache_ttl` as a `Duration`.
    pub fn cache_ttl_duration(&self) -> Duration {
        Duration::from_secs(self.cache_ttl)
    }

    /// Ranking weights with the top-level directory preference folded in.
    pub fn effective_ranking(&self) -> RankingConfig {
        let mut ranking = self.ranking_config.clone();
        ranking.prefer_directories |= self.prefer_directories;
        ranking
    }

    /// Trigram threshold to use for candidate lookup, if fuzzy search is on.
    pub fn fuzzy_threshold(&self) -> Option<f64> {
        self.fuzzy_search_enabled
            .then_some(self.fuzzy_trigram_threshold)
    }
}

/// Returns true when the pattern uses glob metacharacters.
pub(crate) fn is_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

/// Lowercases, strips leading dots, drops empties, sorts and dedups.
pub fn normalize_extensions(extensions: &[String]) -> Vec<String> {
    let mut normalized = extensions
        .iter()
        .map(|ext| ext.trim().trim_start_matches('.').to_lowercase())
        .filter(|ext| !ext.is_empty())
        .collect::<Vec<_>>();
    normalized.sort();
    normalized.dedup();
    normalized
}
