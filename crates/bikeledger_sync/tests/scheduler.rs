//! Scheduler timing, driven by tokio's paused clock.

use bikeledger_store::Store;
use bikeledger_sync::scheduler;
use bikeledger_sync::{
    CycleOutcome, Fault, MemoryRemote, SyncConfig, SyncError, SyncOrchestrator, SyncState,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

const PROBE: &str = "parts.json";

fn orchestrator() -> Arc<SyncOrchestrator<MemoryRemote, Store>> {
    Arc::new(SyncOrchestrator::new(
        SyncConfig::default(),
        Arc::new(MemoryRemote::new()),
        Arc::new(Store::open_in_memory().unwrap()),
    ))
}

#[tokio::test(start_paused = true)]
async fn burst_of_changes_runs_one_cycle_after_the_quiet_window() {
    let orch = orchestrator();
    let (handle, task) = scheduler::spawn(orch.clone());

    for _ in 0..3 {
        handle.data_changed();
        sleep(Duration::from_secs(1)).await;
    }
    sleep(Duration::from_secs(3)).await;
    assert_eq!(orch.remote().fetch_count(PROBE), 0);

    sleep(Duration::from_secs(2)).await;
    assert_eq!(orch.remote().fetch_count(PROBE), 1);
    assert_eq!(orch.state(), SyncState::Success);

    handle.shutdown().await;
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn failed_cycle_is_retried_once_after_the_delay() {
    let orch = orchestrator();
    let (handle, task) = scheduler::spawn(orch.clone());
    orch.remote().set_fault(Some(Fault::Network));

    handle.data_changed();
    sleep(Duration::from_secs(6)).await;
    assert_eq!(orch.remote().fetch_count(PROBE), 1);
    assert_eq!(orch.state(), SyncState::PendingRetry);

    orch.remote().set_fault(None);
    sleep(Duration::from_secs(8)).await;
    assert_eq!(orch.remote().fetch_count(PROBE), 1);
    sleep(Duration::from_secs(2)).await;
    assert_eq!(orch.remote().fetch_count(PROBE), 2);
    assert_eq!(orch.state(), SyncState::Success);

    sleep(Duration::from_secs(60)).await;
    assert_eq!(orch.remote().fetch_count(PROBE), 2);

    handle.shutdown().await;
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn manual_sync_cancels_the_pending_retry() {
    let orch = orchestrator();
    let (handle, task) = scheduler::spawn(orch.clone());
    orch.remote().set_fault(Some(Fault::Network));
    handle.data_changed();
    sleep(Duration::from_secs(6)).await;
    assert_eq!(orch.state(), SyncState::PendingRetry);

    orch.remote().set_fault(None);
    let outcome = handle.sync_now().await.unwrap();
    assert!(matches!(outcome, CycleOutcome::Completed(_)));
    assert_eq!(orch.remote().fetch_count(PROBE), 2);

    sleep(Duration::from_secs(30)).await;
    assert_eq!(orch.remote().fetch_count(PROBE), 2);

    handle.shutdown().await;
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn regained_network_syncs_immediately() {
    let orch = orchestrator();
    let (handle, task) = scheduler::spawn(orch.clone());

    handle.network_changed(false).await.unwrap();
    handle.data_changed();
    sleep(Duration::from_secs(6)).await;
    assert_eq!(orch.remote().fetch_count(PROBE), 0);
    assert_eq!(orch.state(), SyncState::Offline);

    handle.network_changed(true).await.unwrap();
    sleep(Duration::from_millis(1)).await;
    assert_eq!(orch.remote().fetch_count(PROBE), 1);

    handle.shutdown().await;
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn stopped_scheduler_rejects_requests() {
    let orch = orchestrator();
    let (handle, task) = scheduler::spawn(orch);
    handle.shutdown().await;
    task.await.unwrap();

    assert!(matches!(handle.sync_now().await, Err(SyncError::Stopped)));
}
