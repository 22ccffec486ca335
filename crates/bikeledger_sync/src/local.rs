//! The local side of a sync cycle.

use crate::error::{SyncError, SyncResult};
use crate::merge::merge_collections;
use crate::projector::project;
use crate::remote::VersionToken;
use crate::settings::SyncSettings;
use bikeledger_model::{
    Collection, EntityKind, LedgerEntry, LedgerKind, TimeSource, UniqueTimestamps,
};
use bikeledger_store::{row_id, Row, Store, StoreError, Transaction, ID_FIELD};
use std::collections::{BTreeMap, HashSet};

/// A family as read at the start of a cycle.
#[derive(Debug, Clone)]
pub struct LocalSnapshot {
    /// Records.
    pub collection: Collection,
    /// Table revision at read time.
    pub revision: u64,
}

/// A merged family waiting to be written back.
#[derive(Debug, Clone)]
pub struct StagedCollection {
    /// Merged records.
    pub collection: Collection,
    /// Revision the local input was read at.
    pub base_revision: u64,
}

/// Everything one cycle writes locally, in one transaction.
#[derive(Debug, Clone, Default)]
pub struct CommitBatch {
    /// Merged families.
    pub staged: Vec<StagedCollection>,
    /// New version tokens per file.
    pub tokens: BTreeMap<String, VersionToken>,
    /// Cycle timestamp, set only when every file synced.
    pub last_sync: Option<String>,
}

/// What the commit did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommitReport {
    /// Balance projected from the committed cash log.
    pub balance: f64,
    /// Families edited locally while the cycle ran.
    pub concurrent_edits: Vec<EntityKind>,
}

/// Local persistence as the orchestrator sees it.
pub trait LocalStore: Send + Sync {
    /// Reads one family with its table revision.
    fn load(&self, kind: EntityKind) -> SyncResult<LocalSnapshot>;

    /// Writes a cycle's results atomically. Families whose table changed
    /// since they were read are merged again with the current rows.
    fn commit(&self, batch: CommitBatch) -> SyncResult<CommitReport>;

    /// Reads the sync settings.
    fn load_settings(&self) -> SyncResult<SyncSettings>;

    /// Writes the sync settings.
    fn save_settings(&self, settings: &SyncSettings) -> SyncResult<()>;
}

impl LocalStore for Store {
    fn load(&self, kind: EntityKind) -> SyncResult<LocalSnapshot> {
        let (rows, revision) = self.snapshot(kind.table());
        Ok(LocalSnapshot {
            collection: Collection::from_rows(kind, rows),
            revision,
        })
    }

    fn commit(&self, batch: CommitBatch) -> SyncResult<CommitReport> {
        let report = self.transaction(|txn| {
            commit_in(txn, batch).map_err(|e| match e {
                SyncError::LocalTransaction(inner) => inner,
                other => StoreError::aborted(other.to_string()),
            })
        })?;
        if !report.concurrent_edits.is_empty() {
            tracing::info!(families = ?report.concurrent_edits, "merged edits made during sync");
        }
        Ok(report)
    }

    fn load_settings(&self) -> SyncResult<SyncSettings> {
        SyncSettings::load(self)
    }

    fn save_settings(&self, settings: &SyncSettings) -> SyncResult<()> {
        settings.save(self)
    }
}

fn commit_in(txn: &mut Transaction<'_>, batch: CommitBatch) -> SyncResult<CommitReport> {
    let mut report = CommitReport::default();
    let mut ledger: Option<Vec<LedgerEntry>> = None;

    for staged in batch.staged {
        let kind = staged.collection.kind();
        let table = kind.table();
        let collection = if txn.revision(table) == staged.base_revision {
            staged.collection
        } else {
            report.concurrent_edits.push(kind);
            let current = Collection::from_rows(kind, txn.scan(table));
            merge_collections(current, staged.collection)?
        };
        if let Some(entries) = collection.as_ledger() {
            ledger = Some(entries.to_vec());
        }
        txn.replace_all(table, unique_ids(collection.into_rows()?));
    }

    let ledger = match ledger {
        Some(entries) => entries,
        None => {
            let rows = txn.scan(EntityKind::CashLog.table());
            match Collection::from_rows(EntityKind::CashLog, rows) {
                Collection::CashLog(entries) => entries,
                _ => Vec::new(),
            }
        }
    };
    report.balance = project(&ledger);

    let mut settings = SyncSettings::load_in(txn)?;
    settings.cash_in_hand = report.balance;
    settings.version_tokens.extend(batch.tokens);
    if batch.last_sync.is_some() {
        settings.last_sync = batch.last_sync;
    }
    settings.save_in(txn)?;
    Ok(report)
}

/// Drops repeated local ids so two merged records never share a row.
fn unique_ids(rows: Vec<Row>) -> Vec<Row> {
    let mut seen = HashSet::new();
    rows.into_iter()
        .map(|mut row| {
            if let Some(id) = row_id(&row) {
                if !seen.insert(id) {
                    row.remove(ID_FIELD);
                }
            }
            row
        })
        .collect()
}

/// Appends a cash ledger entry with a fresh unique timestamp.
///
/// `amount` is signed: decreases are negative. The cached `balance` is the
/// projected balance after the entry. Returns the stored entry.
pub fn append_ledger_entry<C: TimeSource>(
    store: &Store,
    stamps: &UniqueTimestamps<C>,
    kind: LedgerKind,
    amount: f64,
    reason: &str,
) -> SyncResult<LedgerEntry> {
    let table = EntityKind::CashLog.table();
    let entry = store.transaction(|txn| {
        let entries = match Collection::from_rows(EntityKind::CashLog, txn.scan(table)) {
            Collection::CashLog(entries) => entries,
            _ => Vec::new(),
        };
        for existing in &entries {
            if let Some(ts) = existing.timestamp.as_deref() {
                stamps.observe(ts);
            }
        }

        let mut entry = LedgerEntry::new(stamps.next(), kind, amount).with_reason(reason);
        let mut all = entries;
        all.push(entry.clone());
        entry.balance = project(&all);

        let row = match serde_json::to_value(&entry)? {
            serde_json::Value::Object(row) => row,
            _ => return txn.abort("ledger entry did not encode to an object"),
        };
        let id = txn.insert(table, row);
        entry.local_id = Some(id);

        let mut settings = SyncSettings::load_in(txn).map_err(|e| StoreError::aborted(e.to_string()))?;
        settings.cash_in_hand = entry.balance;
        settings
            .save_in(txn)
            .map_err(|e| StoreError::aborted(e.to_string()))?;
        Ok(entry)
    })?;
    tracing::debug!(kind = %entry.kind, amount = entry.amount, balance = entry.balance, "ledger entry recorded");
    Ok(entry)
}

/// Deletes every entity row and zeroes the cached balance.
///
/// The settings record keeps its location and version tokens, so the next
/// sync pulls the remote files back in. Nothing is pushed.
pub fn wipe_local_data(store: &Store) -> SyncResult<()> {
    store.transaction(|txn| {
        for kind in EntityKind::ALL {
            txn.clear(kind.table());
        }
        let mut settings =
            SyncSettings::load_in(txn).map_err(|e| StoreError::aborted(e.to_string()))?;
        settings.cash_in_hand = 0.0;
        settings
            .save_in(txn)
            .map_err(|e| StoreError::aborted(e.to_string()))
    })?;
    tracing::warn!(tables = EntityKind::ALL.len(), "local data wiped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bikeledger_model::{Customer, ManualClock};
    use serde_json::json;

    fn customers(store: &Store) -> Vec<Customer> {
        match store.load(EntityKind::Customers).unwrap().collection {
            Collection::Customers(c) => c,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn commit_replaces_tables_and_projects_balance() {
        let store = Store::open_in_memory().unwrap();
        let ledger = vec![
            LedgerEntry::new("2024-03-01T10:00:00.000Z", LedgerKind::Set, 1000.0),
            LedgerEntry::new("2024-03-01T11:00:00.000Z", LedgerKind::Decrease, -200.0),
        ];
        let mut tokens = BTreeMap::new();
        tokens.insert("cash_log.json".to_string(), VersionToken::new("v1"));

        let report = store
            .commit(CommitBatch {
                staged: vec![StagedCollection {
                    collection: Collection::CashLog(ledger),
                    base_revision: 0,
                }],
                tokens,
                last_sync: Some("2024-03-01T12:00:00.000Z".into()),
            })
            .unwrap();

        assert_eq!(report.balance, 800.0);
        assert!(report.concurrent_edits.is_empty());
        assert_eq!(store.scan("cash_log").len(), 2);
        let settings = store.load_settings().unwrap();
        assert_eq!(settings.cash_in_hand, 800.0);
        assert_eq!(settings.token("cash_log.json").unwrap().as_str(), "v1");
        assert_eq!(settings.last_sync.as_deref(), Some("2024-03-01T12:00:00.000Z"));
    }

    #[test]
    fn edits_during_a_cycle_survive_the_commit() {
        let store = Store::open_in_memory().unwrap();
        let snapshot = store.load(EntityKind::Customers).unwrap();

        store
            .transaction(|txn| {
                let row = json!({ "name": "Mid Cycle", "phone": "1" });
                txn.insert("customers", row.as_object().cloned().unwrap());
                Ok(())
            })
            .unwrap();

        let merged = Collection::Customers(vec![Customer {
            name: "From Remote".into(),
            ..Default::default()
        }]);
        let report = store
            .commit(CommitBatch {
                staged: vec![StagedCollection {
                    collection: merged,
                    base_revision: snapshot.revision,
                }],
                ..Default::default()
            })
            .unwrap();

        assert_eq!(report.concurrent_edits, vec![EntityKind::Customers]);
        let names: Vec<_> = customers(&store).into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["From Remote", "Mid Cycle"]);
    }

    #[test]
    fn duplicate_ids_get_fresh_rows() {
        let rows = vec![
            json!({ "_id": 4, "name": "a" }),
            json!({ "_id": 4, "name": "b" }),
            json!({ "name": "c" }),
        ]
        .into_iter()
        .filter_map(|v| v.as_object().cloned())
        .collect();
        let rows = unique_ids(rows);
        assert_eq!(row_id(&rows[0]), Some(4));
        assert_eq!(row_id(&rows[1]), None);
    }

    #[test]
    fn ledger_entries_get_unique_timestamps() {
        let store = Store::open_in_memory().unwrap();
        let stamps = UniqueTimestamps::new(ManualClock::new(1_700_000_000_000));

        let first = append_ledger_entry(&store, &stamps, LedgerKind::Set, 1000.0, "opening").unwrap();
        let second =
            append_ledger_entry(&store, &stamps, LedgerKind::Decrease, -200.0, "fuel").unwrap();

        assert_ne!(first.timestamp, second.timestamp);
        assert_eq!(second.balance, 800.0);
        assert_eq!(store.load_settings().unwrap().cash_in_hand, 800.0);
        assert_eq!(store.scan("cash_log").len(), 2);
    }

    #[test]
    fn wipe_keeps_the_sync_target() {
        let store = Store::open_in_memory().unwrap();
        let mut settings = SyncSettings {
            location: Some(crate::config::RemoteLocation::new("acme", "shop")),
            ..Default::default()
        };
        settings
            .version_tokens
            .insert("parts.json".into(), VersionToken::new("v3"));
        settings.save(&store).unwrap();
        let stamps = UniqueTimestamps::new(ManualClock::new(1_700_000_000_000));
        append_ledger_entry(&store, &stamps, LedgerKind::Set, 500.0, "float").unwrap();
        store
            .transaction(|txn| {
                let row = json!({ "name": "Chain" });
                txn.insert("parts", row.as_object().cloned().unwrap());
                Ok(())
            })
            .unwrap();

        wipe_local_data(&store).unwrap();

        assert!(store.scan("cash_log").is_empty());
        assert!(store.scan("parts").is_empty());
        let settings = store.load_settings().unwrap();
        assert_eq!(settings.location.as_ref().unwrap().repo, "shop");
        assert_eq!(settings.token("parts.json").unwrap().as_str(), "v3");
        assert_eq!(settings.cash_in_hand, 0.0);
    }
}
