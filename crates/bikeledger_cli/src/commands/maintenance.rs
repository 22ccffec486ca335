//! Store maintenance commands.

use super::open_store;
use bikeledger_sync::wipe_local_data;
use std::path::Path;
use tracing::warn;

/// Rewrites the journal as one snapshot record.
pub fn compact(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(path)?;
    let before = store.stats()?.journal_bytes;
    store.compact()?;
    let after = store.stats()?.journal_bytes;
    println!("Journal compacted: {before} -> {after} bytes");
    Ok(())
}

/// Clears every entity table. Nothing is pushed and the sync target is
/// kept, so the next sync pulls the remote files back in.
pub fn wipe(path: &Path, confirmed: bool) -> Result<(), Box<dyn std::error::Error>> {
    if !confirmed {
        return Err("refusing to wipe without --yes".into());
    }
    let store = open_store(path)?;
    warn!(store = %path.display(), "wiping local data");
    wipe_local_data(&store)?;
    println!("All local data deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bikeledger_sync::{RemoteLocation, SyncSettings};

    #[test]
    fn wipe_needs_confirmation() {
        let dir = tempfile::tempdir().unwrap();
        assert!(wipe(dir.path(), false).is_err());
    }

    #[test]
    fn sync_target_survives_wipe() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = open_store(dir.path()).unwrap();
            let settings = SyncSettings {
                location: Some(RemoteLocation::new("acme", "shop")),
                cash_in_hand: 250.0,
                ..Default::default()
            };
            settings.save(&store).unwrap();
        }

        wipe(dir.path(), true).unwrap();

        let store = open_store(dir.path()).unwrap();
        let settings = SyncSettings::load(&store).unwrap();
        assert_eq!(settings.location.unwrap().owner, "acme");
        assert_eq!(settings.cash_in_hand, 0.0);
    }
}
