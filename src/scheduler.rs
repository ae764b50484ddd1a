//! Background indexing runs.
//!
//! One worker thread at a time walks a folder and feeds the index. The run
//! state lives in an atomic so `status()` never blocks; transitions out of
//! `Indexing` are guarded by the run generation so a worker that drains
//! after `stop()` cannot overwrite the state of a newer run.

pub mod progress;
pub mod walker;

use std::any::Any;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::watch;

use self::progress::{ProgressTracker, RunState};
use self::walker::{walk, WalkOptions, WalkOutcome};
use crate::cancel::CancellationToken;
use crate::error::{Result, SearchError};
use crate::manager::{resolve_path, IndexManager};
use crate::persistence;
use crate::types::{unix_now_millis, IndexingProgress, SearchEngineStatus};

#[derive(Debug, Default)]
struct RunControl {
    generation: u64,
    cancel: Option<CancellationToken>,
    last_error: Option<String>,
}

#[derive(Debug)]
struct SchedulerShared {
    state: AtomicU8,
    control: Mutex<RunControl>,
    progress: ProgressTracker,
}

impl SchedulerShared {
    /// Moves a run out of `Indexing` unless it was stopped or superseded.
    fn finalize(&self, generation: u64, next: RunState, error: Option<String>) -> bool {
        let mut control = self.control.lock();
        if control.generation != generation {
            return false;
        }
        control.cancel = None;
        let moved = self
            .state
            .compare_exchange(
                RunState::Indexing as u8,
                next as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if moved && next == RunState::Error {
            control.last_error = error;
        }
        moved
    }
}

/// Owns the background indexing worker and its run state.
#[derive(Debug)]
pub struct IndexingScheduler {
    shared: Arc<SchedulerShared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Default for IndexingScheduler {
    fn default() -> Self {
        Self {
            shared: Arc::new(SchedulerShared {
                state: AtomicU8::new(RunState::Idle as u8),
                control: Mutex::new(RunControl::default()),
                progress: ProgressTracker::default(),
            }),
            worker: Mutex::new(None),
        }
    }
}

impl IndexingScheduler {
    /// An idle scheduler with no worker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts indexing `folder` in the background.
    ///
    /// Returns `AlreadyRunning` while another run is active. A stopped run's
    /// worker is joined first, which is bounded by its next cancellation check.
    pub fn start(&self, folder: &Path, manager: Arc<IndexManager>) -> Result<()> {
        let config = manager.config();
        if !config.search_engine_enabled {
            return Err(SearchError::Disabled);
        }
        let root = resolve_path(folder)?;
        let metadata = fs::metadata(&root).map_err(|error| SearchError::from_io(error, folder))?;
        if !metadata.is_dir() {
            return Err(SearchError::InvalidInput(format!("not a directory: {root}")));
        }
        let options = WalkOptions::from_config(root.into(), &config)?;
        let snapshot_path = config.persistent_index_path.clone();

        let mut worker = self.worker.lock();
        if RunState::load(&self.shared.state) == RunState::Indexing {
            return Err(SearchError::AlreadyRunning(options.root.display().to_string()));
        }
        if let Some(previous) = worker.take() {
            if previous.join().is_err() {
                log::warn!("previous search indexing worker panicked");
            }
        }

        let token = CancellationToken::new();
        let generation = {
            let mut control = self.shared.control.lock();
            control.generation += 1;
            control.cancel = Some(token.clone());
            control.last_error = None;
            self.shared.progress.reset(unix_now_millis());
            self.shared
                .state
                .store(RunState::Indexing as u8, Ordering::Release);
            control.generation
        };

        log::info!(
            "search index run started root={} generation={} batch_size={}",
            options.root.display(),
            generation,
            options.batch_size,
        );

        let shared = self.shared.clone();
        let spawned = thread::Builder::new()
            .name("search-indexer".to_string())
            .spawn(move || run_worker(shared, manager, options, token, generation, snapshot_path));

        match spawned {
            Ok(handle) => {
                *worker = Some(handle);
                Ok(())
            }
            Err(error) => {
                let reason = format!("failed to spawn indexing worker: {error}");
                self.shared
                    .finalize(generation, RunState::Error, Some(reason.clone()));
                Err(SearchError::Internal(reason))
            }
        }
    }

    /// Runs an indexing pass on the calling thread's behalf and waits for it.
    pub fn run_blocking(&self, folder: &Path, manager: Arc<IndexManager>) -> Result<IndexingProgress> {
        self.start(folder, manager)?;
        self.wait();
        match self.status() {
            SearchEngineStatus::Error(reason) => Err(SearchError::Internal(reason)),
            _ => Ok(self.progress()),
        }
    }

    /// Blocks until the current worker, if any, has exited.
    pub fn wait(&self) {
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                log::warn!("search indexing worker panicked");
            }
        }
    }

    /// Requests cancellation. Safe to call at any time; returns whether a run was stopped.
    pub fn stop(&self) -> bool {
        let control = self.shared.control.lock();
        let stopped = self
            .shared
            .state
            .compare_exchange(
                RunState::Indexing as u8,
                RunState::Stopped as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if !stopped {
            return false;
        }
        if let Some(token) = control.cancel.as_ref() {
            token.cancel();
        }
        self.shared.progress.finish(unix_now_millis());
        log::info!(
            "search index run stop requested generation={}",
            control.generation
        );
        true
    }

    /// Stops any active run and joins its worker.
    pub fn shutdown(&self) {
        self.stop();
        self.wait();
    }

    /// Current run state. Reads an atomic, so it never waits on the worker.
    pub fn status(&self) -> SearchEngineStatus {
        let state = RunState::load(&self.shared.state);
        let last_error = match state {
            RunState::Error => self.shared.control.lock().last_error.clone(),
            _ => None,
        };
        state.into_status(last_error)
    }

    /// Progress snapshot of the current or last run.
    pub fn progress(&self) -> IndexingProgress {
        self.shared.progress.snapshot()
    }

    /// Watch channel fed on every committed batch.
    pub fn subscribe_progress(&self) -> watch::Receiver<IndexingProgress> {
        self.shared.progress.subscribe()
    }
}

impl Drop for IndexingScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(
    shared: Arc<SchedulerShared>,
    manager: Arc<IndexManager>,
    options: WalkOptions,
    token: CancellationToken,
    generation: u64,
    snapshot_path: Option<std::path::PathBuf>,
) {
    let started = Instant::now();
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        walk(&options, &manager, &token, &shared.progress)
    }));
    let elapsed_ms = started.elapsed().as_millis() as u64;

    let (next, error) = match result {
        Ok(Ok(WalkOutcome::Cancelled)) => (RunState::Stopped, None),
        Ok(Ok(outcome)) => {
            if outcome == WalkOutcome::LimitReached {
                log::info!(
                    "search index run hit file limit root={}",
                    options.root.display()
                );
            }
            if let Some(path) = snapshot_path.as_deref() {
                if let Err(error) = persistence::save_snapshot(path, &manager.entries()) {
                    log::warn!("search index snapshot write failed for {}: {error}", path.display());
                }
            }
            (RunState::Idle, None)
        }
        Ok(Err(error)) => {
            log::warn!(
                "search index run failed root={}: {error}",
                options.root.display()
            );
            (RunState::Error, Some(error.to_string()))
        }
        Err(payload) => {
            let reason = format!("panic during indexing: {}", panic_message(payload.as_ref()));
            log::warn!("{reason}");
            (RunState::Error, Some(reason))
        }
    };

    shared.progress.finish(unix_now_millis());
    manager.set_last_indexing_duration(elapsed_ms);
    shared.finalize(generation, next, error);

    let progress = shared.progress.snapshot();
    log::info!(
        "search index run finished root={} generation={} outcome={} discovered={} indexed={} errors={} elapsed_ms={}",
        options.root.display(),
        generation,
        next_label(next),
        progress.files_discovered,
        progress.files_indexed,
        progress.errors,
        elapsed_ms,
    );
}

fn next_label(state: RunState) -> &'static str {
    match state {
        RunState::Idle => "completed",
        RunState::Indexing => "indexing",
        RunState::Stopped => "stopped",
        RunState::Error => "error",
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "indexing thread panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SearchEngineConfig;
    use std::time::Duration;

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        fs::create_dir_all(dir.path().join("b/deep")).unwrap();
        fs::write(dir.path().join("b/c.txt"), "c").unwrap();
        fs::write(dir.path().join("b/deep/e.txt"), "e").unwrap();
        dir
    }

    fn manager(config: SearchEngineConfig) -> Arc<IndexManager> {
        Arc::new(IndexManager::new(config).unwrap())
    }

    #[test]
    fn stop_before_start_is_noop() {
        let scheduler = IndexingScheduler::new();
        assert!(!scheduler.stop());
        assert!(!scheduler.stop());
        assert_eq!(scheduler.status(), SearchEngineStatus::Idle);
    }

    #[test]
    fn blocking_run_indexes_tree() {
        let dir = fixture();
        let scheduler = IndexingScheduler::new();
        let manager = manager(SearchEngineConfig::default());
        let progress = scheduler.run_blocking(dir.path(), manager.clone()).unwrap();

        // root, a.txt, b, b/c.txt, b/deep, b/deep/e.txt
        assert_eq!(manager.len(), 6);
        assert_eq!(progress.files_discovered, 6);
        assert_eq!(progress.files_indexed, 6);
        assert_eq!(scheduler.status(), SearchEngineStatus::Idle);
        assert!(manager.metrics().last_indexing_duration_ms.is_some());
    }

    #[test]
    fn depth_limit_indexes_but_does_not_descend() {
        let dir = fixture();
        let scheduler = IndexingScheduler::new();
        let manager = manager(SearchEngineConfig {
            max_index_depth: Some(1),
            ..SearchEngineConfig::default()
        });
        scheduler.run_blocking(dir.path(), manager.clone()).unwrap();
        // root, a.txt, b
        assert_eq!(manager.len(), 3);
        let hits = manager.search("c.txt").unwrap();
        assert!(hits.iter().all(|hit| hit.name != "c.txt"));
    }

    #[test]
    fn file_limit_stops_run() {
        let dir = fixture();
        let scheduler = IndexingScheduler::new();
        let manager = manager(SearchEngineConfig {
            max_indexed_files: Some(2),
            indexing_batch_size: 1,
            ..SearchEngineConfig::default()
        });
        scheduler.run_blocking(dir.path(), manager.clone()).unwrap();
        assert_eq!(manager.len(), 2);
        assert_eq!(scheduler.status(), SearchEngineStatus::Idle);
    }

    #[test]
    fn missing_folder_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = IndexingScheduler::new();
        let error = scheduler
            .start(&dir.path().join("missing"), manager(SearchEngineConfig::default()))
            .unwrap_err();
        assert!(matches!(error, SearchError::NotFound(_)));
    }

    #[test]
    fn file_root_is_invalid() {
        let dir = fixture();
        let scheduler = IndexingScheduler::new();
        let error = scheduler
            .start(&dir.path().join("a.txt"), manager(SearchEngineConfig::default()))
            .unwrap_err();
        assert!(matches!(error, SearchError::InvalidInput(_)));
    }

    #[test]
    fn progress_is_monotonic_while_running() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..200 {
            fs::write(dir.path().join(format!("f{i}.txt")), "").unwrap();
        }
        let scheduler = IndexingScheduler::new();
        let manager = manager(SearchEngineConfig {
            indexing_batch_size: 7,
            ..SearchEngineConfig::default()
        });
        scheduler.start(dir.path(), manager).unwrap();
        for _ in 0..50 {
            let progress = scheduler.progress();
            assert!(progress.files_indexed <= progress.files_discovered);
            thread::sleep(Duration::from_millis(1));
        }
        scheduler.wait();
        let progress = scheduler.progress();
        assert_eq!(progress.files_indexed, progress.files_discovered);
        assert_eq!(progress.files_discovered, 201);
    }

    #[cfg(unix)]
    #[test]
    fn symlink_cycles_are_not_followed_twice() {
        let dir = fixture();
        std::os::unix::fs::symlink(dir.path(), dir.path().join("b/loop")).unwrap();
        let scheduler = IndexingScheduler::new();
        let manager = manager(SearchEngineConfig {
            follow_symlinks: true,
            ..SearchEngineConfig::default()
        });
        scheduler.run_blocking(dir.path(), manager.clone()).unwrap();
        assert_eq!(manager.len(), 6);
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_skipped_by_default() {
        let dir = fixture();
        std::os::unix::fs::symlink(dir.path().join("a.txt"), dir.path().join("link.txt")).unwrap();
        let scheduler = IndexingScheduler::new();
        let manager = manager(SearchEngineConfig::default());
        scheduler.run_blocking(dir.path(), manager.clone()).unwrap();
        assert!(manager.search("link").unwrap().is_empty());
    }

    #[cfg(unix)]
    fn run_with_dangling_link(retry_failed: bool) {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        std::os::unix::fs::symlink(dir.path().join("gone"), dir.path().join("broken")).unwrap();
        fs::write(dir.path().join("z.txt"), "z").unwrap();

        let scheduler = IndexingScheduler::new();
        let manager = manager(SearchEngineConfig {
            follow_symlinks: true,
            retry_failed_indexing: retry_failed,
            ..SearchEngineConfig::default()
        });
        let progress = scheduler.run_blocking(dir.path(), manager.clone()).unwrap();

        assert_eq!(scheduler.status(), SearchEngineStatus::Idle);
        assert_eq!(progress.errors, 1);
        // root, a.txt, z.txt
        assert_eq!(progress.files_discovered, 3);
        assert_eq!(progress.files_indexed, 3);
        assert!(manager.contains(dir.path().join("a.txt").to_str().unwrap()));
        assert!(manager.contains(dir.path().join("z.txt").to_str().unwrap()));
        assert!(!manager.contains(dir.path().join("broken").to_str().unwrap()));
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_entry_is_skipped_and_counted() {
        run_with_dangling_link(true);
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_entry_is_skipped_without_retry() {
        run_with_dangling_link(false);
    }

    #[test]
    fn stopped_run_counts_every_inserted_entry() {
        let dir = tempfile::tempdir().unwrap();
        for d in 0..30 {
            let sub = dir.path().join(format!("d{d}"));
            fs::create_dir(&sub).unwrap();
            for f in 0..100 {
                fs::write(sub.join(format!("f{f}.txt")), "").unwrap();
            }
        }
        let scheduler = IndexingScheduler::new();
        let manager = manager(SearchEngineConfig {
            indexing_batch_size: 1,
            ..SearchEngineConfig::default()
        });
        scheduler.start(dir.path(), manager.clone()).unwrap();
        assert!(scheduler.stop());
        scheduler.wait();

        assert_eq!(scheduler.status(), SearchEngineStatus::Stopped);
        assert_eq!(manager.len(), scheduler.progress().files_indexed);
    }
}
