//! Cash ledger commands.

use super::open_store;
use crate::CashAction;
use bikeledger_model::{Collection, EntityKind, LedgerKind, UniqueTimestamps};
use bikeledger_sync::{append_ledger_entry, projector, LocalStore};
use std::path::Path;

/// Records a ledger entry.
pub fn record(path: &Path, action: CashAction) -> Result<(), Box<dyn std::error::Error>> {
    let (kind, amount, reason) = match action {
        CashAction::Set { amount, reason } => (LedgerKind::Set, amount, reason),
        CashAction::Increase { amount, reason } => (LedgerKind::Increase, amount.abs(), reason),
        CashAction::Decrease { amount, reason } => (LedgerKind::Decrease, -amount.abs(), reason),
    };
    if !amount.is_finite() {
        return Err("amount must be a finite number".into());
    }

    let store = open_store(path)?;
    let stamps = UniqueTimestamps::default();
    let entry = append_ledger_entry(
        &store,
        &stamps,
        kind,
        amount,
        reason.as_deref().unwrap_or_default(),
    )?;
    println!(
        "Recorded {} of {} at {} (balance {})",
        entry.kind,
        entry.amount,
        entry.timestamp.as_deref().unwrap_or_default(),
        entry.balance
    );
    Ok(())
}

/// Prints the balance folded from the local ledger.
pub fn balance(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(path)?;
    let snapshot = store.load(EntityKind::CashLog)?;
    let entries = match &snapshot.collection {
        Collection::CashLog(entries) => entries.as_slice(),
        _ => &[],
    };
    println!("{}", projector::project(entries));
    Ok(())
}
