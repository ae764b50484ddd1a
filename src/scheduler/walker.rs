//! Depth-first filesystem traversal that feeds the index in batches.
//!
//! All directory listing and stat calls happen here, outside any index lock.
//! Only the finished batch is handed to `IndexManager::insert_batch`.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::mem;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use glob::Pattern;

use super::progress::ProgressTracker;
use crate::cancel::CancellationToken;
use crate::config::{is_glob, SearchEngineConfig};
use crate::error::{Result, SearchError};
use crate::manager::IndexManager;
use crate::types::IndexedEntry;

/// Pause before the single retry of a transient failure.
const RETRY_BACKOFF: Duration = Duration::from_millis(25);

/// Compiled `excluded_patterns`.
#[derive(Debug, Clone, Default)]
pub struct ExclusionSet {
    globs: Vec<Pattern>,
    fragments: Vec<String>,
    components: Vec<String>,
}

impl ExclusionSet {
    /// Compiles patterns, rejecting malformed globs.
    pub fn new(patterns: &[String]) -> Result<Self> {
        let mut set = Self::default();
        for raw in patterns {
            let pattern = raw.trim();
            if pattern.is_empty() {
                continue;
            }
            if is_glob(pattern) {
                let compiled = Pattern::new(pattern).map_err(|error| {
                    SearchError::InvalidInput(format!("invalid exclusion pattern {pattern}: {error}"))
                })?;
                set.globs.push(compiled);
            } else if pattern.contains(['/', '\\']) {
                set.fragments.push(pattern.replace('\\', "/"));
            } else {
                set.components.push(pattern.to_string());
            }
        }
        Ok(set)
    }

    /// Tests a path relative to the indexed root.
    pub fn is_excluded(&self, relative: &Path) -> bool {
        let component_hit = relative.components().any(|component| {
            let component = component.as_os_str().to_string_lossy();
            self.components.iter().any(|name| *name == component)
                || self.globs.iter().any(|glob| glob.matches(&component))
        });
        if component_hit {
            return true;
        }
        if self.fragments.is_empty() {
            return false;
        }
        let relative = relative.to_string_lossy().replace('\\', "/");
        self.fragments
            .iter()
            .any(|fragment| relative.contains(fragment.as_str()))
    }
}

/// Traversal policy for one run, captured from the configuration at start.
#[derive(Debug, Clone)]
pub struct WalkOptions {
    pub root: PathBuf,
    pub exclusions: ExclusionSet,
    pub index_hidden_files: bool,
    pub follow_symlinks: bool,
    pub max_depth: Option<usize>,
    pub max_files: Option<usize>,
    pub batch_size: usize,
    pub retry_failed: bool,
}

impl WalkOptions {
    pub fn from_config(root: PathBuf, config: &SearchEngineConfig) -> Result<Self> {
        Ok(Self {
            root,
            exclusions: ExclusionSet::new(&config.excluded_patterns)?,
            index_hidden_files: config.index_hidden_files,
            follow_symlinks: config.follow_symlinks,
            max_depth: config.max_index_depth,
            max_files: config.max_indexed_files,
            batch_size: config.indexing_batch_size.max(1),
            retry_failed: config.retry_failed_indexing,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkOutcome {
    Completed,
    Cancelled,
    /// `max_indexed_files` was reached before the tree was exhausted.
    LimitReached,
}

struct Walker<'a> {
    options: &'a WalkOptions,
    manager: &'a IndexManager,
    cancel: &'a CancellationToken,
    progress: &'a ProgressTracker,
    batch: Vec<IndexedEntry>,
    visited: HashSet<PathBuf>,
    discovered: usize,
}

/// Walks `options.root` and indexes everything the policy admits.
///
/// Fails only when the root itself cannot be read; per-entry failures are
/// counted in the progress tracker and skipped.
pub fn walk(
    options: &WalkOptions,
    manager: &IndexManager,
    cancel: &CancellationToken,
    progress: &ProgressTracker,
) -> Result<WalkOutcome> {
    let mut walker = Walker {
        options,
        manager,
        cancel,
        progress,
        batch: Vec::with_capacity(options.batch_size),
        visited: HashSet::new(),
        discovered: 0,
    };
    walker.run()
}

impl Walker<'_> {
    fn run(&mut self) -> Result<WalkOutcome> {
        let root = self.options.root.clone();
        let metadata = self.retrying(&root, |path| fs::metadata(path))?;
        if !metadata.is_dir() {
            return Err(SearchError::InvalidInput(format!(
                "not a directory: {}",
                root.display()
            )));
        }
        // Listing the root is the one failure that aborts the run.
        self.retrying(&root, |path| fs::read_dir(path).map(drop))?;

        if self.options.follow_symlinks {
            if let Ok(canonical) = fs::canonicalize(&root) {
                self.visited.insert(canonical);
            }
        }
        let Some(root_str) = root.to_str() else {
            return Err(SearchError::InvalidInput(format!(
                "path is not valid UTF-8: {}",
                root.display()
            )));
        };
        if self.admit(IndexedEntry::from_metadata(root_str, &metadata)).is_none() {
            return Ok(self.stop_reason());
        }

        let mut stack = vec![(root, 0usize)];
        while let Some((dir, depth)) = stack.pop() {
            if self.cancel.is_cancelled() {
                return Ok(WalkOutcome::Cancelled);
            }
            if self.options.max_depth.is_some_and(|max| depth >= max) {
                continue;
            }

            let children = match self.retrying(&dir, |path| read_children(path)) {
                Ok(children) => children,
                Err(error) => {
                    self.skip(&dir, &error);
                    continue;
                }
            };

            let mut subdirs = Vec::new();
            for child in children {
                if self.cancel.is_cancelled() {
                    return Ok(WalkOutcome::Cancelled);
                }
                let Some(entry) = self.visit(&child) else {
                    continue;
                };
                let is_directory = entry.is_directory;
                if self.admit(entry).is_none() {
                    return Ok(self.stop_reason());
                }
                if is_directory {
                    subdirs.push(child);
                }
            }
            // Reverse so the stack pops children in name order.
            stack.extend(subdirs.into_iter().rev().map(|path| (path, depth + 1)));
        }

        self.flush();
        Ok(WalkOutcome::Completed)
    }

    /// Applies the hidden, exclusion and symlink policies to one child.
    fn visit(&mut self, path: &Path) -> Option<IndexedEntry> {
        let name = path.file_name()?.to_string_lossy();
        if !self.options.index_hidden_files && name.starts_with('.') {
            return None;
        }
        let relative = path.strip_prefix(&self.options.root).unwrap_or(path);
        if self.options.exclusions.is_excluded(relative) {
            return None;
        }

        let mut metadata = match self.retrying(path, |p| fs::symlink_metadata(p)) {
            Ok(metadata) => metadata,
            Err(error) => {
                self.skip(path, &error);
                return None;
            }
        };

        if metadata.file_type().is_symlink() {
            if !self.options.follow_symlinks {
                return None;
            }
            metadata = match self.retrying(path, |p| fs::metadata(p)) {
                Ok(target) => target,
                Err(error) => {
                    self.skip(path, &error);
                    return None;
                }
            };
        }

        if metadata.is_dir() && self.options.follow_symlinks && !self.first_visit(path) {
            log::debug!("skipping already visited directory {}", path.display());
            return None;
        }

        let Some(path_str) = path.to_str() else {
            self.skip(
                path,
                &SearchError::InvalidInput("path is not valid UTF-8".to_string()),
            );
            return None;
        };
        Some(IndexedEntry::from_metadata(path_str, &metadata))
    }

    /// Records a directory's canonical location. False means a cycle or alias.
    fn first_visit(&mut self, path: &Path) -> bool {
        match fs::canonicalize(path) {
            Ok(canonical) => self.visited.insert(canonical),
            Err(error) => {
                self.skip(path, &SearchError::from_io(error, path));
                false
            }
        }
    }

    /// Queues an entry. `None` means the run was cancelled or the file limit was hit.
    fn admit(&mut self, entry: IndexedEntry) -> Option<()> {
        self.cancel.check()?;
        if self
            .options
            .max_files
            .is_some_and(|max| self.discovered >= max)
        {
            self.flush();
            return None;
        }
        self.discovered += 1;
        self.progress.discovered(1);
        self.batch.push(entry);
        if self.batch.len() >= self.options.batch_size {
            self.flush();
        }
        Some(())
    }

    fn stop_reason(&self) -> WalkOutcome {
        if self.cancel.is_cancelled() {
            WalkOutcome::Cancelled
        } else {
            WalkOutcome::LimitReached
        }
    }

    fn flush(&mut self) {
        if self.batch.is_empty() || self.cancel.is_cancelled() {
            return;
        }
        let batch = mem::replace(&mut self.batch, Vec::with_capacity(self.options.batch_size));
        let count = batch.len();
        let last_path = batch.last().map(|entry| entry.path.clone());
        let manager = self.manager;
        self.progress.commit_batch(count, last_path, || {
            manager.insert_batch(batch);
        });
    }

    fn skip(&self, path: &Path, error: &SearchError) {
        self.progress.error();
        log::debug!("search index skipped {}: {error}", path.display());
    }

    /// Runs `op`, retrying once after a short pause on transient failures.
    fn retrying<T>(&self, path: &Path, op: impl Fn(&Path) -> io::Result<T>) -> Result<T> {
        let error = match op(path) {
            Ok(value) => return Ok(value),
            Err(error) => SearchError::from_io(error, path),
        };
        if !self.options.retry_failed || !error.is_transient() {
            return Err(error);
        }
        thread::sleep(RETRY_BACKOFF);
        op(path).map_err(|error| SearchError::from_io(error, path))
    }
}

/// Lists a directory, sorted by name. Unreadable entries are dropped.
fn read_children(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut children = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .collect::<Vec<_>>();
    children.sort();
    Ok(children)
}
