//! Sync command implementation.

use super::open_store;
use bikeledger_sync::{
    Credential, CycleOutcome, GithubContents, SyncConfig, SyncError, SyncOrchestrator,
    SyncSettings, TriggerOrigin,
};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Runs one manual sync cycle and prints its one-line outcome.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(open_store(path)?);
    let settings = SyncSettings::load(&store)?;
    let Some(location) = settings.location else {
        return Err("no sync target; run `bikeledger configure` first".into());
    };
    let Some(credential) = Credential::from_env(crate::TOKEN_VAR) else {
        return Err(format!("set {} to a GitHub token", crate::TOKEN_VAR).into());
    };

    debug!(owner = %location.owner, repo = %location.repo, branch = %location.branch, "starting manual sync");
    let config = SyncConfig::new().with_location(location);
    let remote = Arc::new(GithubContents::new(&config, Some(credential))?);
    let orchestrator = SyncOrchestrator::new(config, remote, store);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(orchestrator.sync_now(TriggerOrigin::Manual));

    let status = orchestrator.status();
    if let Some(message) = &status.message {
        println!("{message}");
    }
    match result {
        Ok(CycleOutcome::Completed(report)) => {
            for file in report.files.iter().filter(|f| f.parse_warning.is_some()) {
                println!(
                    "  warning: {} was unreadable and was rewritten",
                    file.kind.file_name()
                );
            }
            println!("Cash in hand: {}", report.balance);
            Ok(())
        }
        Ok(_) => Ok(()),
        Err(SyncError::Partial { failures }) => {
            for failure in &failures {
                println!("  {}: {}", failure.file, failure.error);
            }
            Err(format!("{} file(s) failed to sync", failures.len()).into())
        }
        Err(e) => Err(e.into()),
    }
}
