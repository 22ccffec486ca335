//! Sync status types.

use crate::remote::VersionToken;
use bikeledger_model::EntityKind;
use std::fmt;
use std::time::Duration;

/// Status of the sync engine, as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncState {
    /// Nothing happening.
    #[default]
    Idle,
    /// A cycle is running.
    Syncing,
    /// The last cycle synced every file.
    Success,
    /// The last cycle failed and no retry is pending.
    Failed,
    /// The last cycle failed; a retry is scheduled.
    PendingRetry,
    /// The network is known to be down.
    Offline,
}

impl SyncState {
    /// Returns true while a cycle runs.
    pub fn is_active(&self) -> bool {
        matches!(self, SyncState::Syncing)
    }

    /// Returns true if a new cycle may start.
    pub fn can_start_sync(&self) -> bool {
        !matches!(self, SyncState::Syncing | SyncState::Offline)
    }

    /// Short label.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Idle => "idle",
            SyncState::Syncing => "syncing",
            SyncState::Success => "success",
            SyncState::Failed => "failed",
            SyncState::PendingRetry => "pending-retry",
            SyncState::Offline => "offline",
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What started a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOrigin {
    /// The user asked.
    Manual,
    /// Local data changed and the debounce window passed.
    DataChanged,
    /// The network came back.
    NetworkRegained,
    /// A scheduled retry.
    Retry,
}

impl TriggerOrigin {
    /// Whether the user is waiting for the outcome.
    pub fn is_manual(&self) -> bool {
        matches!(self, TriggerOrigin::Manual)
    }
}

/// What happened to one file in a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    /// Remote already matched; nothing pushed.
    Unchanged,
    /// New content pushed.
    Pushed(VersionToken),
    /// The file failed; see the cycle error.
    Failed(String),
}

/// Per-file result of a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReport {
    /// Family.
    pub kind: EntityKind,
    /// Outcome.
    pub outcome: FileOutcome,
    /// Records after the merge.
    pub records: usize,
    /// Whether a conflict forced a refetch.
    pub conflict_retried: bool,
    /// Remote content that could not be decoded and was treated as empty.
    pub parse_warning: Option<String>,
}

/// Summary of a finished cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    /// Per-file results, in catalogue order.
    pub files: Vec<FileReport>,
    /// Projected cash in hand after the commit.
    pub balance: f64,
    /// Families edited locally while the cycle ran.
    pub concurrent_edits: Vec<EntityKind>,
    /// Wall time of the cycle.
    pub duration: Duration,
}

impl CycleReport {
    /// Number of files pushed.
    pub fn pushed(&self) -> usize {
        self.files
            .iter()
            .filter(|f| matches!(f.outcome, FileOutcome::Pushed(_)))
            .count()
    }

    /// Number of files that failed.
    pub fn failed(&self) -> usize {
        self.files
            .iter()
            .filter(|f| matches!(f.outcome, FileOutcome::Failed(_)))
            .count()
    }

    /// One-line summary for manual syncs.
    pub fn summary(&self) -> String {
        match (self.pushed(), self.failed()) {
            (0, 0) => "Already up to date".to_string(),
            (pushed, 0) => format!("Sync complete: {pushed} file(s) updated"),
            (pushed, failed) => {
                format!("Sync incomplete: {pushed} file(s) updated, {failed} failed")
            }
        }
    }
}

/// Result of asking for a cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// A cycle ran to the end.
    Completed(CycleReport),
    /// Another cycle was running; this request was folded into a re-run.
    Coalesced,
    /// An automatic trigger was ignored, e.g. while the credential is
    /// rejected.
    Skipped,
}

/// User-facing status line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStatus {
    /// Current state.
    pub state: SyncState,
    /// One-line message from the last manual sync.
    pub message: Option<String>,
    /// Banner for failures that need attention.
    pub banner: Option<String>,
}

/// Statistics about sync operations.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Cycles that synced every file.
    pub cycles_completed: u64,
    /// Cycles with at least one failure.
    pub cycles_failed: u64,
    /// Files pushed.
    pub files_pushed: u64,
    /// Conflicts resolved by refetching.
    pub conflicts_retried: u64,
    /// Retries scheduled.
    pub retries_scheduled: u64,
    /// Last error message.
    pub last_error: Option<String>,
}
