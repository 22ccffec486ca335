//! Status command implementation.

use super::open_store;
use bikeledger_sync::SyncSettings;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Status report.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    /// Store path.
    pub store: String,
    /// Sync target as `owner/repo@branch`.
    pub remote: Option<String>,
    /// Last fully successful sync.
    pub last_sync: Option<String>,
    /// Version token per remote file.
    pub version_tokens: BTreeMap<String, String>,
    /// Balance from the last sync or ledger entry.
    pub cash_in_hand: f64,
    /// Rows per table.
    pub tables: BTreeMap<String, usize>,
    /// Journal size in bytes.
    pub journal_bytes: u64,
}

/// Runs the status command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(path)?;
    let settings = SyncSettings::load(&store)?;
    let stats = store.stats()?;

    let report = StatusReport {
        store: path.display().to_string(),
        remote: settings
            .location
            .as_ref()
            .map(|l| format!("{}/{}@{}", l.owner, l.repo, l.branch)),
        last_sync: settings.last_sync.clone(),
        version_tokens: settings
            .version_tokens
            .iter()
            .map(|(file, token)| (file.clone(), token.to_string()))
            .collect(),
        cash_in_hand: settings.cash_in_hand,
        tables: stats.tables,
        journal_bytes: stats.journal_bytes,
    };

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        _ => print_text(&report),
    }
    Ok(())
}

fn print_text(report: &StatusReport) {
    println!("Store:        {}", report.store);
    println!(
        "Remote:       {}",
        report.remote.as_deref().unwrap_or("(not configured)")
    );
    println!(
        "Last sync:    {}",
        report.last_sync.as_deref().unwrap_or("never")
    );
    println!("Cash in hand: {}", report.cash_in_hand);
    println!("Journal:      {} bytes", report.journal_bytes);
    if !report.tables.is_empty() {
        println!();
        println!("Tables:");
        for (table, rows) in &report.tables {
            println!("  {table:<14} {rows}");
        }
    }
    if !report.version_tokens.is_empty() {
        println!();
        println!("Version tokens:");
        for (file, token) in &report.version_tokens {
            println!("  {file:<22} {token}");
        }
    }
}
