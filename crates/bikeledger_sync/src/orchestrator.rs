//! The sync cycle.
//!
//! One cycle runs every entity file through fetch, merge, compare and push
//! concurrently, then writes all merged families back in one local
//! transaction. Files fail independently; the cycle reports every failure
//! together after all files were attempted.

use crate::config::{Credential, SyncConfig};
use crate::error::{FileFailure, SyncError, SyncResult};
use crate::local::{CommitBatch, LocalStore, StagedCollection};
use crate::merge::merge_collections;
use crate::remote::{RemoteFile, RemoteStore, VersionToken};
use crate::retry::{RetryDecision, RetryPlanner};
use crate::state::{
    CycleOutcome, CycleReport, FileOutcome, FileReport, SyncState, SyncStats, SyncStatus,
    TriggerOrigin,
};
use bikeledger_model::time::now_iso;
use bikeledger_model::{Collection, EntityKind};
use futures_util::future::join_all;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Clears the syncing flag on every exit path.
struct SyncingGuard<'a>(&'a AtomicBool);

impl Drop for SyncingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Working state of one file within a cycle.
#[derive(Debug)]
struct FilePass {
    kind: EntityKind,
    staged: Option<StagedCollection>,
    token: Option<VersionToken>,
    outcome: FileOutcome,
    records: usize,
    conflict_retried: bool,
    parse_warning: Option<String>,
}

impl FilePass {
    fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            staged: None,
            token: None,
            outcome: FileOutcome::Unchanged,
            records: 0,
            conflict_retried: false,
            parse_warning: None,
        }
    }

    fn stage(&mut self, merged: &Collection, base_revision: u64, fetched: Option<&RemoteFile>) {
        self.records = merged.len();
        self.token = fetched.map(|f| f.token.clone());
        self.staged = Some(StagedCollection {
            collection: merged.clone(),
            base_revision,
        });
    }

    fn pushed(&mut self, token: VersionToken) {
        self.token = Some(token.clone());
        self.outcome = FileOutcome::Pushed(token);
    }
}

/// Whether `staged` differs from what the remote holds: first byte for byte,
/// then after normalizing the remote content through the same merge.
fn needs_push(
    kind: EntityKind,
    staged: &str,
    merged: &Collection,
    fetched: Option<&RemoteFile>,
) -> bool {
    let Some(file) = fetched else {
        return !merged.is_empty();
    };
    if file.content == staged {
        return false;
    }
    let canonical = Collection::decode(kind, &file.content)
        .map_err(SyncError::from)
        .and_then(|remote| merge_collections(Collection::empty(kind), remote))
        .and_then(|normalized| normalized.encode().map_err(SyncError::from));
    match canonical {
        Ok(text) => text != staged,
        Err(_) => true,
    }
}

/// Runs sync cycles between a [`LocalStore`] and a [`RemoteStore`].
///
/// At most one cycle runs at a time. Automatic triggers arriving during a
/// cycle are folded into one follow-up cycle; a manual trigger gets
/// [`SyncError::AlreadySyncing`].
pub struct SyncOrchestrator<R: RemoteStore, L: LocalStore> {
    config: SyncConfig,
    remote: Arc<R>,
    local: Arc<L>,
    syncing: AtomicBool,
    rerun: AtomicBool,
    online: AtomicBool,
    auth_blocked: AtomicBool,
    status: RwLock<SyncStatus>,
    stats: RwLock<SyncStats>,
    last_report: RwLock<Option<CycleReport>>,
    retry: Mutex<RetryPlanner>,
}

impl<R: RemoteStore, L: LocalStore> SyncOrchestrator<R, L> {
    /// Creates an orchestrator.
    pub fn new(config: SyncConfig, remote: Arc<R>, local: Arc<L>) -> Self {
        let retry = RetryPlanner::new(config.retry.clone());
        Self {
            config,
            remote,
            local,
            syncing: AtomicBool::new(false),
            rerun: AtomicBool::new(false),
            online: AtomicBool::new(true),
            auth_blocked: AtomicBool::new(false),
            status: RwLock::new(SyncStatus::default()),
            stats: RwLock::new(SyncStats::default()),
            last_report: RwLock::new(None),
            retry: Mutex::new(retry),
        }
    }

    /// Configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Remote side.
    pub fn remote(&self) -> &Arc<R> {
        &self.remote
    }

    /// Local side.
    pub fn local(&self) -> &Arc<L> {
        &self.local
    }

    /// Current state.
    pub fn state(&self) -> SyncState {
        self.status.read().state
    }

    /// Current status line.
    pub fn status(&self) -> SyncStatus {
        self.status.read().clone()
    }

    /// Statistics.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Report of the last cycle that reached the local commit.
    pub fn last_report(&self) -> Option<CycleReport> {
        self.last_report.read().clone()
    }

    /// Whether a cycle is running.
    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::SeqCst)
    }

    /// Whether the network is believed to be up.
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Records a network change.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
        let mut status = self.status.write();
        if !online && status.state != SyncState::Syncing {
            status.state = SyncState::Offline;
        } else if online && status.state == SyncState::Offline {
            status.state = SyncState::Idle;
        }
    }

    /// Replaces the credential and lifts a block caused by a rejected one.
    pub fn set_credential(&self, credential: Option<Credential>) {
        self.remote.set_credential(credential);
        if self.auth_blocked.swap(false, Ordering::SeqCst) {
            tracing::info!("credential replaced; automatic sync resumed");
            self.retry.lock().on_success();
            let mut status = self.status.write();
            status.banner = None;
            if status.state == SyncState::Failed {
                status.state = SyncState::Idle;
            }
        }
    }

    /// Delay of a retry scheduled since the last call, if any.
    pub fn take_retry_request(&self) -> Option<Duration> {
        self.retry.lock().take_pending()
    }

    fn set_state(&self, state: SyncState) {
        self.status.write().state = state;
    }

    /// Runs a cycle now.
    ///
    /// Returns [`CycleOutcome::Coalesced`] when an automatic trigger hits a
    /// running cycle, and [`CycleOutcome::Skipped`] for automatic triggers
    /// while offline or while the credential is blocked. Changes made during
    /// the cycle cause follow-up cycles before this returns; the report is
    /// the first cycle's.
    pub async fn sync_now(&self, origin: TriggerOrigin) -> SyncResult<CycleOutcome> {
        if !self.is_online() {
            let mut status = self.status.write();
            if status.state != SyncState::Syncing {
                status.state = SyncState::Offline;
            }
            if origin.is_manual() {
                status.message = Some("Offline: sync will run when back online".into());
                return Err(SyncError::Offline);
            }
            return Ok(CycleOutcome::Skipped);
        }

        if self
            .syncing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            if origin.is_manual() {
                return Err(SyncError::AlreadySyncing);
            }
            self.rerun.store(true, Ordering::SeqCst);
            tracing::debug!(?origin, "sync running; queued a re-run");
            return Ok(CycleOutcome::Coalesced);
        }
        let _guard = SyncingGuard(&self.syncing);

        if !origin.is_manual() && self.auth_blocked.load(Ordering::SeqCst) {
            tracing::debug!(?origin, "credential rejected earlier; skipping automatic sync");
            return Ok(CycleOutcome::Skipped);
        }
        if !self.remote.is_configured() {
            if origin.is_manual() {
                self.status.write().message = Some("Sync is not configured".into());
            }
            return Err(SyncError::NotConfigured);
        }

        self.rerun.store(false, Ordering::SeqCst);
        let first = self.run_and_record(origin).await?;
        while self.rerun.swap(false, Ordering::SeqCst) {
            tracing::debug!("re-running for changes made during the cycle");
            if self.run_and_record(TriggerOrigin::DataChanged).await.is_err() {
                break;
            }
        }
        Ok(CycleOutcome::Completed(first))
    }

    async fn run_and_record(&self, origin: TriggerOrigin) -> SyncResult<CycleReport> {
        self.set_state(SyncState::Syncing);
        tracing::info!(?origin, "sync cycle started");
        let result = self.run_cycle().await;
        self.finish(origin, &result);
        result
    }

    fn finish(&self, origin: TriggerOrigin, result: &SyncResult<CycleReport>) {
        let manual = origin.is_manual();
        match result {
            Ok(report) => {
                self.retry.lock().on_success();
                {
                    let mut stats = self.stats.write();
                    stats.cycles_completed += 1;
                    stats.files_pushed += report.pushed() as u64;
                    stats.last_error = None;
                }
                let mut status = self.status.write();
                status.state = SyncState::Success;
                status.banner = None;
                if manual {
                    status.message = Some(report.summary());
                }
                tracing::info!(
                    pushed = report.pushed(),
                    balance = report.balance,
                    elapsed_ms = report.duration.as_millis() as u64,
                    "sync cycle complete"
                );
            }
            Err(error) => {
                let decision = self.retry.lock().on_failure(error, manual);
                {
                    let mut stats = self.stats.write();
                    stats.cycles_failed += 1;
                    stats.last_error = Some(error.to_string());
                    if matches!(decision, RetryDecision::Schedule(_)) {
                        stats.retries_scheduled += 1;
                    }
                }
                let mut status = self.status.write();
                if manual {
                    status.message = Some(format!("Sync failed: {error}"));
                }
                match decision {
                    RetryDecision::Schedule(delay) => {
                        status.state = SyncState::PendingRetry;
                        tracing::warn!(%error, retry_in_s = delay.as_secs(), "sync failed; retry scheduled");
                    }
                    RetryDecision::Exhausted => {
                        status.state = SyncState::Failed;
                        status.banner = Some(format!("Sync keeps failing: {error}"));
                        tracing::warn!(%error, "sync failed; retries exhausted");
                    }
                    RetryDecision::Blocked => {
                        self.auth_blocked.store(true, Ordering::SeqCst);
                        status.state = SyncState::Failed;
                        status.banner =
                            Some("GitHub rejected the access token; update it to resume sync".into());
                        tracing::error!(%error, "credential rejected; automatic sync paused");
                    }
                    RetryDecision::GiveUp => {
                        status.state = SyncState::Failed;
                        if error.is_fatal() {
                            status.banner = Some(format!("Sync stopped: {error}"));
                            tracing::error!(%error, "sync failed");
                        } else {
                            tracing::warn!(%error, "sync failed");
                        }
                    }
                }
            }
        }
    }

    async fn run_cycle(&self) -> SyncResult<CycleReport> {
        let started = Instant::now();
        let passes = join_all(EntityKind::ALL.into_iter().map(|kind| self.sync_file(kind))).await;

        let mut batch = CommitBatch::default();
        let mut files = Vec::with_capacity(passes.len());
        let mut failures = Vec::new();
        for (mut pass, error) in passes {
            if let Some(staged) = pass.staged.take() {
                batch.staged.push(staged);
            }
            if let Some(token) = pass.token.take() {
                batch.tokens.insert(pass.kind.file_name().to_string(), token);
            }
            if let Some(error) = error {
                pass.outcome = FileOutcome::Failed(error.to_string());
                failures.push(FileFailure {
                    file: pass.kind.file_name(),
                    error,
                });
            }
            files.push(FileReport {
                kind: pass.kind,
                outcome: pass.outcome,
                records: pass.records,
                conflict_retried: pass.conflict_retried,
                parse_warning: pass.parse_warning,
            });
        }
        if failures.is_empty() {
            batch.last_sync = Some(now_iso());
        }

        let commit = self.local.commit(batch)?;
        if !commit.concurrent_edits.is_empty() {
            self.rerun.store(true, Ordering::SeqCst);
        }
        let report = CycleReport {
            files,
            balance: commit.balance,
            concurrent_edits: commit.concurrent_edits,
            duration: started.elapsed(),
        };
        *self.last_report.write() = Some(report.clone());

        if failures.is_empty() {
            Ok(report)
        } else {
            Err(SyncError::Partial { failures })
        }
    }

    async fn sync_file(&self, kind: EntityKind) -> (FilePass, Option<SyncError>) {
        let mut pass = FilePass::new(kind);
        let error = self.sync_file_steps(&mut pass).await.err();
        if let Some(error) = &error {
            tracing::warn!(file = kind.file_name(), %error, "file sync failed");
        }
        (pass, error)
    }

    async fn sync_file_steps(&self, pass: &mut FilePass) -> SyncResult<()> {
        let kind = pass.kind;
        let file = kind.file_name();
        let local = self.local.load(kind)?;

        let fetched = self.remote.fetch_file(file).await?;
        let merged = self.merge_remote(pass, local.collection.clone(), fetched.as_ref())?;
        pass.stage(&merged, local.revision, fetched.as_ref());
        let text = merged.encode()?;
        if !needs_push(kind, &text, &merged, fetched.as_ref()) {
            tracing::debug!(file, records = merged.len(), "remote up to date");
            return Ok(());
        }

        let expected = fetched.as_ref().map(|f| &f.token);
        match self.remote.push_file(file, &text, expected).await {
            Ok(token) => {
                tracing::debug!(file, %token, pushed = true, "pushed");
                pass.pushed(token);
                return Ok(());
            }
            Err(SyncError::Conflict { .. }) => {
                tracing::warn!(file, "version conflict; refetching and merging again");
            }
            Err(error) => return Err(error),
        }

        pass.conflict_retried = true;
        self.stats.write().conflicts_retried += 1;

        let refetched = self.remote.fetch_file(file).await?;
        let merged = self.merge_remote(pass, local.collection, refetched.as_ref())?;
        pass.stage(&merged, local.revision, refetched.as_ref());
        let text = merged.encode()?;
        if !needs_push(kind, &text, &merged, refetched.as_ref()) {
            return Ok(());
        }
        let token = self
            .remote
            .push_file(file, &text, refetched.as_ref().map(|f| &f.token))
            .await?;
        tracing::debug!(file, %token, pushed = true, "pushed after conflict");
        pass.pushed(token);
        Ok(())
    }

    fn merge_remote(
        &self,
        pass: &mut FilePass,
        local: Collection,
        fetched: Option<&RemoteFile>,
    ) -> SyncResult<Collection> {
        let kind = pass.kind;
        let remote = match fetched {
            None => Collection::empty(kind),
            Some(file) => match Collection::decode(kind, &file.content) {
                Ok(remote) => remote,
                Err(e) => {
                    let error = SyncError::parse(kind.file_name(), e.to_string());
                    tracing::warn!(file = kind.file_name(), %error, "unreadable remote content; treating as empty");
                    pass.parse_warning = Some(error.to_string());
                    Collection::empty(kind)
                }
            },
        };
        merge_collections(local, remote)
    }
}
