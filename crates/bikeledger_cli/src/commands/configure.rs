//! Configure command implementation.

use super::open_store;
use bikeledger_sync::{RemoteLocation, SyncSettings};
use std::path::Path;

/// Runs the configure command.
pub fn run(
    path: &Path,
    owner: String,
    repo: String,
    branch: String,
    base_path: String,
) -> Result<(), Box<dyn std::error::Error>> {
    let location = RemoteLocation::new(owner, repo)
        .with_branch(branch)
        .with_base_path(base_path);
    if !location.is_complete() {
        return Err("owner and repo must not be empty".into());
    }

    let store = open_store(path)?;
    let mut settings = SyncSettings::load(&store)?;
    if settings.location.as_ref() != Some(&location) {
        // Tokens belong to the old location.
        settings.version_tokens.clear();
        settings.last_sync = None;
    }
    settings.location = Some(location.clone());
    settings.save(&store)?;

    println!(
        "Sync target: {}/{}@{} {}",
        location.owner,
        location.repo,
        location.branch,
        location.file_path("")
    );
    Ok(())
}
