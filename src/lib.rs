//! Background filesystem path index with ranked search.
//!
//! This crate provides:
//! - A segment trie over indexed paths with a case-folded name index
//! - Exact, prefix, substring and trigram fuzzy candidate lookup
//! - Additive relevance ranking (match type, frequency, recency, context)
//! - A bounded TTL query cache invalidated on every index mutation
//! - Cancellable background indexing with pollable progress
//! - Optional compressed snapshots of the index

pub mod cache;
pub mod cancel;
pub mod config;
pub mod engine;
pub mod error;
pub mod manager;
pub mod persistence;
pub mod ranking;
pub mod scheduler;
pub mod trie;
pub mod types;

// Re-export main types
pub use cancel::CancellationToken;
pub use config::{RankingConfig, SearchEngineConfig, SearchOperator};
pub use engine::SearchEngine;
pub use error::{Result, SearchError};
pub use manager::IndexManager;
pub use scheduler::IndexingScheduler;
pub use trie::PathTrie;
pub use types::{
    EngineStats, IndexedEntry, IndexingProgress, RecentActivity, SearchEngineInfo,
    SearchEngineMetrics, SearchEngineStatus, SearchHit,
};
