//! # BikeLedger Sync
//!
//! Offline-first sync between the local store and a set of files in a
//! GitHub repository.
//!
//! This crate provides:
//! - [`RemoteStore`], with the GitHub contents client ([`GithubContents`])
//!   and an in-memory remote for tests ([`MemoryRemote`])
//! - merge functions per entity family shape ([`merge`])
//! - the cash balance projection ([`projector`])
//! - [`SyncOrchestrator`], which runs sync cycles
//! - a trigger scheduler with debounce and retry ([`scheduler`])
//!
//! ## Cycle
//!
//! Every entity file goes through the same steps, all files concurrently:
//! 1. Fetch the remote file and its version token
//! 2. Merge remote records into the local ones
//! 3. Push the merged file if it differs from what was fetched
//! 4. On a stale token, fetch again, merge again and push once more
//!
//! Then all merged families are written back in one local transaction and
//! the cash balance is projected from the merged ledger.
//!
//! ## Key Invariants
//!
//! - One cycle at a time
//! - A file's failure never blocks another file
//! - Local ids never leave the device
//! - The balance is always folded from the ledger, never trusted

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod github;
mod local;
pub mod merge;
mod orchestrator;
pub mod projector;
mod remote;
mod retry;
pub mod scheduler;
mod settings;
mod state;

pub use config::{Credential, RemoteLocation, RetryConfig, SyncConfig, DEFAULT_API_BASE};
pub use error::{FileFailure, SyncError, SyncResult};
pub use github::{classify_status, contents_url, decode_content, GithubContents};
pub use local::{
    append_ledger_entry, wipe_local_data, CommitBatch, CommitReport, LocalSnapshot, LocalStore,
    StagedCollection,
};
pub use orchestrator::SyncOrchestrator;
pub use remote::{content_token, Fault, MemoryRemote, RemoteFile, RemoteStore, VersionToken};
pub use retry::{RetryDecision, RetryPlanner};
pub use scheduler::{Coalescer, SchedulerHandle, Trigger};
pub use settings::{SyncSettings, SETTINGS_ID, SETTINGS_TABLE};
pub use state::{
    CycleOutcome, CycleReport, FileOutcome, FileReport, SyncState, SyncStats, SyncStatus,
    TriggerOrigin,
};
