//! Batch progress tracking.
//!
//! Running scripts report per-file progress as JSON lines on stdout. The
//! monitor turns those into whole snapshots that readers copy out.

use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

/// One progress line emitted by a running script after each input file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressInfo {
    /// File just processed.
    pub file: String,
    /// Fraction of the batch done, in `[0, 1]`.
    pub progress: f64,
    /// Number of files in the batch.
    pub total: usize,
    /// Files done so far, cumulative.
    pub current: usize,
}

impl ProgressInfo {
    /// Parses a stdout line. Anything that is not a complete record is `None`.
    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.trim();
        if !line.starts_with('{') {
            return None;
        }
        serde_json::from_str(line).ok()
    }
}

/// Lifecycle of a batch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    #[default]
    Idle,
    Running,
    /// The script failed and a repair is in flight.
    Fixing,
    Completed,
    Failed,
}

impl BatchStatus {
    /// Whether a run is in progress.
    pub fn is_active(self) -> bool {
        matches!(self, BatchStatus::Running | BatchStatus::Fixing)
    }

    /// Whether the run has finished.
    pub fn is_terminal(self) -> bool {
        matches!(self, BatchStatus::Completed | BatchStatus::Failed)
    }
}

/// Point-in-time view of a batch run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BatchProgress {
    pub status: BatchStatus,
    pub current_file: String,
    pub progress: f64,
    pub total_files: usize,
    pub processed: usize,
    pub failed: usize,
    pub message: String,
}

impl BatchProgress {
    /// Snapshot with the given status and message, other fields zeroed.
    pub fn with_status(status: BatchStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Default)]
struct State {
    snapshot: BatchProgress,
    total: usize,
    succeeded: usize,
}

/// Owner of the current snapshot and the running file tally.
///
/// Snapshots are replaced whole under one lock shared with the tally, so a
/// reader never sees a half-written snapshot.
#[derive(Debug, Default)]
pub struct ProgressMonitor {
    state: Mutex<State>,
}

impl ProgressMonitor {
    /// Creates an idle monitor.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns a copy of the current snapshot.
    pub fn snapshot(&self) -> BatchProgress {
        self.lock().snapshot.clone()
    }

    /// Replaces the current snapshot.
    pub fn publish(&self, snapshot: BatchProgress) {
        tracing::debug!(status = ?snapshot.status, message = %snapshot.message, "progress");
        self.lock().snapshot = snapshot;
    }

    /// Applies a script progress line to the snapshot and the tally.
    ///
    /// Counts are cumulative, so the tally is set rather than incremented.
    pub fn record(&self, info: &ProgressInfo) {
        tracing::debug!(file = %info.file, current = info.current, total = info.total, "file processed");
        let mut state = self.lock();
        state.total = info.total;
        state.succeeded = info.current;
        state.snapshot = BatchProgress {
            status: BatchStatus::Running,
            current_file: info.file.clone(),
            progress: info.progress,
            total_files: info.total,
            processed: info.current,
            failed: 0,
            message: String::new(),
        };
    }

    /// Clears the tally at the start of a run.
    pub fn reset_tally(&self) {
        let mut state = self.lock();
        state.total = 0;
        state.succeeded = 0;
    }

    /// Returns `(total, succeeded)` as last reported.
    pub fn tally(&self) -> (usize, usize) {
        let state = self.lock();
        (state.total, state.succeeded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;

    #[test]
    fn new_monitor_is_idle() {
        let monitor = ProgressMonitor::new();
        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.status, BatchStatus::Idle);
        assert_eq!(snapshot.progress, 0.0);
        assert_eq!(monitor.tally(), (0, 0));
    }

    #[test]
    fn parse_line_accepts_progress_record() {
        let info = ProgressInfo::parse_line(
            r#"{"file": "app.log", "progress": 0.5, "total": 4, "current": 2}"#,
        )
        .unwrap();
        assert_eq!(info.file, "app.log");
        assert_eq!(info.progress, 0.5);
        assert_eq!(info.total, 4);
        assert_eq!(info.current, 2);
    }

    #[test]
    fn parse_line_ignores_other_output() {
        assert!(ProgressInfo::parse_line("Processing app.log...").is_none());
        assert!(ProgressInfo::parse_line("").is_none());
        assert!(ProgressInfo::parse_line(r#"{"level": "info"}"#).is_none());
        assert!(ProgressInfo::parse_line(r#"{"file": "a", "progress": 1.0}"#).is_none());
        assert!(ProgressInfo::parse_line("{not json").is_none());
    }

    #[test]
    fn record_sets_cumulative_tally() {
        let monitor = ProgressMonitor::new();
        for current in 1..=3 {
            monitor.record(&ProgressInfo {
                file: format!("{}.log", current),
                progress: current as f64 / 3.0,
                total: 3,
                current,
            });
        }

        assert_eq!(monitor.tally(), (3, 3));
        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.status, BatchStatus::Running);
        assert_eq!(snapshot.current_file, "3.log");
        assert_eq!(snapshot.processed, 3);
        assert_eq!(snapshot.total_files, 3);
    }

    #[test]
    fn reset_tally_keeps_snapshot() {
        let monitor = ProgressMonitor::new();
        monitor.record(&ProgressInfo {
            file: "a.log".to_string(),
            progress: 1.0,
            total: 1,
            current: 1,
        });
        monitor.reset_tally();
        assert_eq!(monitor.tally(), (0, 0));
        assert_eq!(monitor.snapshot().current_file, "a.log");
    }

    #[test]
    fn snapshot_is_an_independent_copy() {
        let monitor = ProgressMonitor::new();
        let mut copy = monitor.snapshot();
        copy.message = "edited".to_string();
        assert_eq!(monitor.snapshot().message, "");
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&BatchStatus::Fixing).unwrap();
        assert_eq!(json, "\"fixing\"");
        assert!(BatchStatus::Fixing.is_active());
        assert!(!BatchStatus::Completed.is_active());
        assert!(BatchStatus::Failed.is_terminal());
    }

    #[test]
    fn concurrent_publishers_leave_whole_snapshots() {
        let monitor = Arc::new(ProgressMonitor::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let monitor = monitor.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        monitor.publish(BatchProgress {
                            status: BatchStatus::Running,
                            current_file: format!("{}", i),
                            processed: i,
                            ..BatchProgress::default()
                        });
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.current_file, snapshot.processed.to_string());
    }

    proptest! {
        #[test]
        fn progress_info_survives_json(
            file in "[A-Za-z0-9_. -]{0,40}",
            progress in 0.0f64..=1.0,
            total in 0usize..100_000,
            current in 0usize..100_000,
        ) {
            let info = ProgressInfo { file, progress, total, current };
            let line = serde_json::to_string(&info).unwrap();
            prop_assert_eq!(ProgressInfo::parse_line(&line), Some(info));
        }
    }
}
