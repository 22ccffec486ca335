//! Trigger delivery and debouncing.
//!
//! Triggers go through a bounded channel to a single scheduler task, which
//! owns the debounce deadline and the retry timer and runs one cycle at a
//! time.

use crate::config::Credential;
use crate::error::{SyncError, SyncResult};
use crate::local::LocalStore;
use crate::orchestrator::SyncOrchestrator;
use crate::remote::RemoteStore;
use crate::state::{CycleOutcome, SyncState, TriggerOrigin};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// An event for the scheduler.
#[derive(Debug)]
pub enum Trigger {
    /// Run now and reply with the outcome.
    Manual(oneshot::Sender<SyncResult<CycleOutcome>>),
    /// Local data changed.
    DataChanged,
    /// Connectivity changed.
    Network(bool),
    /// A new credential, or `None` to forget it.
    Credential(Option<Credential>),
    /// Stop the scheduler.
    Shutdown,
}

/// Collapses a burst of events into one deadline, `window` after the last
/// event. Time is passed in, so the logic runs without timers.
#[derive(Debug, Clone)]
pub struct Coalescer {
    window: Duration,
    deadline: Option<Instant>,
    events: u32,
}

impl Coalescer {
    /// Creates a coalescer with the given quiet window.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            deadline: None,
            events: 0,
        }
    }

    /// Records an event at `now`, pushing the deadline back.
    pub fn notify(&mut self, now: Instant) {
        self.deadline = Some(now + self.window);
        self.events += 1;
    }

    /// When the burst is over, if one is in progress.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// If the deadline passed, resets and returns how many events were
    /// collapsed.
    pub fn take_due(&mut self, now: Instant) -> Option<u32> {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                let events = self.events;
                self.clear();
                Some(events)
            }
            _ => None,
        }
    }

    /// Drops the pending burst.
    pub fn clear(&mut self) {
        self.deadline = None;
        self.events = 0;
    }
}

/// Cheap, cloneable sender side of the scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    tx: mpsc::Sender<Trigger>,
}

impl SchedulerHandle {
    /// Runs a manual cycle and waits for its outcome.
    pub async fn sync_now(&self) -> SyncResult<CycleOutcome> {
        let (reply, outcome) = oneshot::channel();
        self.tx
            .send(Trigger::Manual(reply))
            .await
            .map_err(|_| SyncError::Stopped)?;
        outcome.await.map_err(|_| SyncError::Stopped)?
    }

    /// Signals a local data change. Never blocks; when the queue is full a
    /// cycle is already on its way.
    pub fn data_changed(&self) {
        if let Err(mpsc::error::TrySendError::Closed(_)) = self.tx.try_send(Trigger::DataChanged) {
            tracing::debug!("scheduler stopped; data change not delivered");
        }
    }

    /// Signals a connectivity change.
    pub async fn network_changed(&self, online: bool) -> SyncResult<()> {
        self.tx
            .send(Trigger::Network(online))
            .await
            .map_err(|_| SyncError::Stopped)
    }

    /// Replaces the credential.
    pub async fn set_credential(&self, credential: Option<Credential>) -> SyncResult<()> {
        self.tx
            .send(Trigger::Credential(credential))
            .await
            .map_err(|_| SyncError::Stopped)
    }

    /// Asks the scheduler to stop after the current cycle.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(Trigger::Shutdown).await;
    }
}

/// Starts the scheduler task for `orchestrator`.
pub fn spawn<R, L>(orchestrator: Arc<SyncOrchestrator<R, L>>) -> (SchedulerHandle, JoinHandle<()>)
where
    R: RemoteStore + 'static,
    L: LocalStore + 'static,
{
    let (tx, rx) = mpsc::channel(orchestrator.config().trigger_capacity.max(1));
    let task = tokio::spawn(run(orchestrator, rx));
    (SchedulerHandle { tx }, task)
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn run_automatic<R: RemoteStore, L: LocalStore>(
    orchestrator: &SyncOrchestrator<R, L>,
    origin: TriggerOrigin,
) {
    match orchestrator.sync_now(origin).await {
        Ok(_) => {}
        Err(SyncError::NotConfigured) => {
            tracing::debug!(?origin, "sync not configured; trigger ignored");
        }
        Err(error) => tracing::debug!(?origin, %error, "automatic sync failed"),
    }
}

fn next_retry<R: RemoteStore, L: LocalStore>(
    orchestrator: &SyncOrchestrator<R, L>,
    current: Option<Instant>,
) -> Option<Instant> {
    if let Some(delay) = orchestrator.take_retry_request() {
        return Some(Instant::now() + delay);
    }
    if orchestrator.state() == SyncState::PendingRetry {
        current
    } else {
        None
    }
}

async fn run<R: RemoteStore, L: LocalStore>(
    orchestrator: Arc<SyncOrchestrator<R, L>>,
    mut rx: mpsc::Receiver<Trigger>,
) {
    let mut coalescer = Coalescer::new(orchestrator.config().debounce);
    let mut retry_at: Option<Instant> = None;
    tracing::debug!("sync scheduler started");

    loop {
        tokio::select! {
            trigger = rx.recv() => match trigger {
                None | Some(Trigger::Shutdown) => break,
                Some(Trigger::Manual(reply)) => {
                    coalescer.clear();
                    let outcome = orchestrator.sync_now(TriggerOrigin::Manual).await;
                    let _ = reply.send(outcome);
                }
                Some(Trigger::DataChanged) => coalescer.notify(Instant::now()),
                Some(Trigger::Network(true)) => {
                    orchestrator.set_online(true);
                    run_automatic(&orchestrator, TriggerOrigin::NetworkRegained).await;
                }
                Some(Trigger::Network(false)) => orchestrator.set_online(false),
                Some(Trigger::Credential(credential)) => orchestrator.set_credential(credential),
            },
            () = sleep_until_opt(coalescer.deadline()) => {
                if let Some(events) = coalescer.take_due(Instant::now()) {
                    tracing::debug!(events, "debounce window closed");
                    run_automatic(&orchestrator, TriggerOrigin::DataChanged).await;
                }
            }
            () = sleep_until_opt(retry_at) => {
                retry_at = None;
                run_automatic(&orchestrator, TriggerOrigin::Retry).await;
            }
        }
        retry_at = next_retry(&orchestrator, retry_at);
    }
    tracing::debug!("sync scheduler stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_collapses_into_one_deadline() {
        let start = Instant::now();
        let mut coalescer = Coalescer::new(Duration::from_secs(5));
        assert!(coalescer.deadline().is_none());

        coalescer.notify(start);
        coalescer.notify(start + Duration::from_secs(2));
        coalescer.notify(start + Duration::from_secs(4));
        assert_eq!(coalescer.deadline(), Some(start + Duration::from_secs(9)));

        assert_eq!(coalescer.take_due(start + Duration::from_secs(8)), None);
        assert_eq!(coalescer.take_due(start + Duration::from_secs(9)), Some(3));
        assert!(coalescer.deadline().is_none());
        assert_eq!(coalescer.take_due(start + Duration::from_secs(20)), None);
    }

    #[test]
    fn clear_drops_the_burst() {
        let now = Instant::now();
        let mut coalescer = Coalescer::new(Duration::from_secs(5));
        coalescer.notify(now);
        coalescer.clear();
        assert_eq!(coalescer.take_due(now + Duration::from_secs(60)), None);
    }
}
