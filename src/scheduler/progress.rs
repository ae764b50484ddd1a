//! Run state and progress tracking for indexing runs.
//!
//! Counters are atomics so the UI can poll `snapshot()` as often as it
//! likes without contending with the traversal thread. Batch commits and
//! `finish` share one gate: a batch is either inserted and counted before the
//! freeze, or dropped.

use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::types::{unix_now_millis, IndexingProgress, SearchEngineStatus};

/// Scheduler state as stored in an atomic.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[repr(u8)]
pub enum RunState {
    Idle = 0,
    Indexing = 1,
    Stopped = 2,
    Error = 3,
}

impl RunState {
    /// Reads the state, mapping unknown values to `Idle`.
    pub fn load(atomic: &AtomicU8) -> Self {
        match atomic.load(Ordering::Acquire) {
            1 => Self::Indexing,
            2 => Self::Stopped,
            3 => Self::Error,
            _ => Self::Idle,
        }
    }

    /// Attaches the failure reason for the `Error` state.
    pub fn into_status(self, last_error: Option<String>) -> SearchEngineStatus {
        match self {
            Self::Idle => SearchEngineStatus::Idle,
            Self::Indexing => SearchEngineStatus::Indexing,
            Self::Stopped => SearchEngineStatus::Stopped,
            Self::Error => SearchEngineStatus::Error(
                last_error.unwrap_or_else(|| "indexing failed".to_string()),
            ),
        }
    }
}

#[derive(Debug)]
pub struct ProgressTracker {
    files_discovered: AtomicUsize,
    files_indexed: AtomicUsize,
    errors: AtomicUsize,
    started_at: AtomicU64,
    finished_at: AtomicU64,
    current_path: Mutex<Option<String>>,
    commit_gate: Mutex<()>,
    updates: watch::Sender<IndexingProgress>,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        let (updates, _) = watch::channel(IndexingProgress::default());
        Self {
            files_discovered: AtomicUsize::new(0),
            files_indexed: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
            started_at: AtomicU64::new(0),
            finished_at: AtomicU64::new(0),
            current_path: Mutex::new(None),
            commit_gate: Mutex::new(()),
            updates,
        }
    }
}

impl ProgressTracker {
    /// Zeroes every counter for a run starting at `started_at`.
    pub fn reset(&self, started_at: u64) {
        self.files_indexed.store(0, Ordering::Relaxed);
        self.files_discovered.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
        self.started_at.store(started_at, Ordering::Relaxed);
        self.finished_at.store(0, Ordering::Release);
        *self.current_path.lock() = None;
        self.publish();
    }

    /// Adds `count` entries found by the traversal.
    pub fn discovered(&self, count: usize) {
        if self.is_finished() {
            return;
        }
        self.files_discovered.fetch_add(count, Ordering::Relaxed);
    }

    /// Counts one skipped entry.
    pub fn error(&self) {
        if self.is_finished() {
            return;
        }
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Runs `insert` for a batch of `count` entries and counts it, unless the
    /// run has already finished. Returns whether the batch was committed.
    pub fn commit_batch(
        &self,
        count: usize,
        last_path: Option<String>,
        insert: impl FnOnce(),
    ) -> bool {
        let _gate = self.commit_gate.lock();
        if self.is_finished() {
            return false;
        }
        insert();
        self.files_indexed.fetch_add(count, Ordering::Relaxed);
        if last_path.is_some() {
            *self.current_path.lock() = last_path;
        }
        self.publish();
        true
    }

    /// Freezes every counter. Waits for an in-flight batch commit; later
    /// updates from a draining worker are ignored.
    pub fn finish(&self, finished_at: u64) {
        let _gate = self.commit_gate.lock();
        if self
            .finished_at
            .compare_exchange(0, finished_at.max(1), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.publish();
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished_at.load(Ordering::Acquire) != 0
    }

    /// Consistent copy of the counters with percentage and ETA filled in.
    pub fn snapshot(&self) -> IndexingProgress {
        // Indexed is read first: it never exceeds discovered at any instant.
        let indexed = self.files_indexed.load(Ordering::Relaxed);
        let discovered = self.files_discovered.load(Ordering::Relaxed);
        let started_at = self.started_at.load(Ordering::Relaxed);
        let finished_at = self.finished_at.load(Ordering::Relaxed);

        let mut progress = IndexingProgress {
            files_discovered: discovered,
            files_indexed: indexed.min(discovered),
            percentage_complete: 0.0,
            current_path: self.current_path.lock().clone(),
            start_time: (started_at != 0).then_some(started_at),
            estimated_time_remaining: None,
            errors: self.errors.load(Ordering::Relaxed),
        };
        let now = if finished_at != 0 {
            finished_at
        } else {
            unix_now_millis()
        };
        progress.recompute(now);
        progress
    }

    /// Receiver that sees every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<IndexingProgress> {
        self.updates.subscribe()
    }

    fn publish(&self) {
        self.updates.send_replace(self.snapshot());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_round_trips_through_atomic() {
        let atomic = AtomicU8::new(RunState::Stopped as u8);
        assert_eq!(RunState::load(&atomic), RunState::Stopped);
        atomic.store(42, Ordering::Relaxed);
        assert_eq!(RunState::load(&atomic), RunState::Idle);
    }

    #[test]
    fn error_state_carries_reason() {
        let status = RunState::Error.into_status(Some("disk gone".into()));
        assert_eq!(status, SearchEngineStatus::Error("disk gone".into()));
    }

    #[test]
    fn batches_update_snapshot() {
        let tracker = ProgressTracker::default();
        tracker.reset(unix_now_millis());
        tracker.discovered(4);
        assert!(tracker.commit_batch(2, Some("/a/b".into()), || {}));
        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.files_discovered, 4);
        assert_eq!(snapshot.files_indexed, 2);
        assert_eq!(snapshot.current_path.as_deref(), Some("/a/b"));
        assert!((snapshot.percentage_complete - 50.0).abs() < f32::EPSILON);
    }

    #[test]
    fn reset_zeroes_counters() {
        let tracker = ProgressTracker::default();
        tracker.reset(1);
        tracker.discovered(3);
        tracker.commit_batch(3, None, || {});
        tracker.error();
        tracker.reset(2);
        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.files_discovered, 0);
        assert_eq!(snapshot.files_indexed, 0);
        assert_eq!(snapshot.errors, 0);
        assert_eq!(snapshot.start_time, Some(2));
    }

    #[test]
    fn finished_counters_are_frozen() {
        let tracker = ProgressTracker::default();
        tracker.reset(1);
        tracker.discovered(2);
        tracker.commit_batch(1, None, || {});
        tracker.finish(5);
        tracker.discovered(10);
        let mut inserted = false;
        assert!(!tracker.commit_batch(10, Some("/late".into()), || inserted = true));
        assert!(!inserted);
        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.files_discovered, 2);
        assert_eq!(snapshot.files_indexed, 1);
        assert_eq!(snapshot.current_path, None);
    }

    #[test]
    fn subscribers_see_batches() {
        let tracker = ProgressTracker::default();
        let mut updates = tracker.subscribe();
        tracker.reset(1);
        tracker.discovered(1);
        tracker.commit_batch(1, Some("/x".into()), || {});
        assert!(updates.has_changed().unwrap());
        assert_eq!(updates.borrow_and_update().files_indexed, 1);
    }
}
