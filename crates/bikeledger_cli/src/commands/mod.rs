//! CLI command implementations.

pub mod cash;
pub mod configure;
pub mod maintenance;
pub mod status;
pub mod sync;

use bikeledger_store::Store;
use std::path::Path;

/// Opens the store at `path`, creating it if needed.
pub fn open_store(path: &Path) -> Result<Store, Box<dyn std::error::Error>> {
    Store::open(path).map_err(|e| format!("cannot open store at {}: {e}", path.display()).into())
}
