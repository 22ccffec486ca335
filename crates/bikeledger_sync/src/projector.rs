//! Cash balance projection.
//!
//! The balance is never trusted from a cached field: it is folded from the
//! merged ledger every time.

use bikeledger_model::time::parse_millis;
use bikeledger_model::{LedgerEntry, LedgerKind};
use std::cmp::Ordering;

/// Total order used to replay the ledger: timestamp first, then every other
/// field so that equal timestamps still replay the same way on every device.
pub fn replay_order(a: &LedgerEntry, b: &LedgerEntry) -> Ordering {
    let (ta, tb) = (a.timestamp.as_deref(), b.timestamp.as_deref());
    ta.and_then(parse_millis)
        .cmp(&tb.and_then(parse_millis))
        .then_with(|| ta.cmp(&tb))
        .then_with(|| a.kind.cmp(&b.kind))
        .then_with(|| a.amount.total_cmp(&b.amount))
        .then_with(|| a.reason.cmp(&b.reason))
        .then_with(|| a.correlation_id.cmp(&b.correlation_id))
        .then_with(|| a.balance.total_cmp(&b.balance))
}

/// Applies one entry to a running balance.
pub fn apply(balance: f64, entry: &LedgerEntry) -> f64 {
    match entry.kind {
        LedgerKind::Set => entry.amount,
        _ => balance + entry.amount,
    }
}

/// Projects the cash in hand from `entries`, in any order.
pub fn project(entries: &[LedgerEntry]) -> f64 {
    let mut ordered: Vec<&LedgerEntry> = entries.iter().collect();
    ordered.sort_by(|a, b| replay_order(a, b));
    ordered.into_iter().fold(0.0, apply)
}
