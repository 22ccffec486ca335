//! Store facade, directory handling and recovery.
//!
//! On-disk layout:
//!
//! ```text
//! <store_dir>/
//! ├─ LOCK          # advisory lock, one process at a time
//! └─ journal.log   # framed commit journal
//! ```

use crate::backend::StorageBackend;
use crate::error::{StoreError, StoreResult};
use crate::file::FileBackend;
use crate::journal::{Journal, JournalEntry};
use crate::memory::InMemoryBackend;
use crate::table::{Row, Table};
use crate::transaction::{apply_op, Transaction};
use fs2::FileExt;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const JOURNAL_FILE: &str = "journal.log";

#[derive(Debug, Default)]
struct State {
    tables: BTreeMap<String, Table>,
    seq: u64,
}

/// Row counts and journal size, for status output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Rows per table.
    pub tables: BTreeMap<String, usize>,
    /// Last committed sequence number.
    pub seq: u64,
    /// Journal size in bytes.
    pub journal_bytes: u64,
}

/// An embedded, journaled store of JSON row tables.
///
/// # Example
///
/// ```rust
/// use bikeledger_store::Store;
/// use serde_json::json;
///
/// let store = Store::open_in_memory().unwrap();
/// let id = store
///     .transaction(|txn| {
///         let row = json!({ "name": "Asha" }).as_object().cloned().unwrap();
///         Ok(txn.insert("customers", row))
///     })
///     .unwrap();
/// assert_eq!(store.get("customers", id).unwrap()["name"], "Asha");
/// ```
pub struct Store {
    path: Option<PathBuf>,
    _lock: Option<File>,
    journal: Mutex<Journal>,
    state: RwLock<State>,
}

impl Store {
    /// Opens or creates a store in `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Locked`] if another process holds the directory,
    /// or an error if the journal cannot be read.
    pub fn open(dir: &Path) -> StoreResult<Self> {
        std::fs::create_dir_all(dir)?;

        let lock = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(dir.join(LOCK_FILE))?;
        if lock.try_lock_exclusive().is_err() {
            return Err(StoreError::Locked);
        }

        let backend = FileBackend::open(&dir.join(JOURNAL_FILE))?;
        let mut store = Self::with_backend(Box::new(backend))?;
        store.path = Some(dir.to_path_buf());
        store._lock = Some(lock);
        tracing::debug!(path = %dir.display(), seq = store.seq(), "store opened");
        Ok(store)
    }

    /// Opens a store over an arbitrary backend, replaying its journal.
    pub fn with_backend(backend: Box<dyn StorageBackend>) -> StoreResult<Self> {
        let mut journal = Journal::new(backend);
        let state = Self::recover(&mut journal)?;
        Ok(Self {
            path: None,
            _lock: None,
            journal: Mutex::new(journal),
            state: RwLock::new(state),
        })
    }

    /// Opens a fresh in-memory store.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::with_backend(Box::new(InMemoryBackend::new()))
    }

    fn recover(journal: &mut Journal) -> StoreResult<State> {
        let mut state = State::default();
        for entry in journal.replay()? {
            match entry {
                JournalEntry::Snapshot { seq, tables } => {
                    state.tables = tables;
                    state.seq = seq;
                }
                JournalEntry::Commit { seq, ops } => {
                    if seq <= state.seq {
                        return Err(StoreError::corrupted(format!(
                            "commit {seq} follows {}",
                            state.seq
                        )));
                    }
                    let touched: BTreeSet<String> =
                        ops.iter().map(|op| op.table().to_string()).collect();
                    for name in touched {
                        state.tables.entry(name).or_default().bump_revision();
                    }
                    for op in ops {
                        apply_op(&mut state.tables, op);
                    }
                    state.seq = seq;
                }
            }
        }
        Ok(state)
    }

    /// Runs `f` in a write transaction.
    ///
    /// If `f` returns `Ok`, its writes are journaled and become visible
    /// together. If it returns `Err`, nothing is written. Transactions are
    /// serialized; calling `transaction` from inside `f` deadlocks.
    pub fn transaction<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Transaction<'_>) -> StoreResult<T>,
    {
        let mut journal = self.journal.lock();
        let state = self.state.read();

        let mut txn = Transaction::new(&state.tables);
        let value = f(&mut txn)?;
        let (staged, ops) = txn.into_parts();
        if ops.is_empty() {
            return Ok(value);
        }

        let seq = state.seq + 1;
        drop(state);
        let op_count = ops.len();
        journal.append(&JournalEntry::Commit { seq, ops })?;

        let mut state = self.state.write();
        state.seq = seq;
        state.tables.extend(staged);
        tracing::trace!(seq, ops = op_count, "transaction committed");
        Ok(value)
    }

    /// Reads one row.
    #[must_use]
    pub fn get(&self, table: &str, id: u64) -> Option<Row> {
        self.state.read().tables.get(table)?.get(id).cloned()
    }

    /// Reads every row of a table in id order.
    #[must_use]
    pub fn scan(&self, table: &str) -> Vec<Row> {
        self.state
            .read()
            .tables
            .get(table)
            .map(|t| t.rows().cloned().collect())
            .unwrap_or_default()
    }

    /// Rows whose `field` equals `value`.
    #[must_use]
    pub fn find_eq(&self, table: &str, field: &str, value: &Value) -> Vec<Row> {
        self.state
            .read()
            .tables
            .get(table)
            .map(|t| t.find_eq(field, value).cloned().collect())
            .unwrap_or_default()
    }

    /// Rows whose `field` lies in `lo..hi`.
    #[must_use]
    pub fn find_range(&self, table: &str, field: &str, lo: &Value, hi: &Value) -> Vec<Row> {
        self.state
            .read()
            .tables
            .get(table)
            .map(|t| t.find_range(field, lo, hi).cloned().collect())
            .unwrap_or_default()
    }

    /// Rows and revision of a table, read together.
    #[must_use]
    pub fn snapshot(&self, table: &str) -> (Vec<Row>, u64) {
        let state = self.state.read();
        state.tables.get(table).map_or((Vec::new(), 0), |t| {
            (t.rows().cloned().collect(), t.revision())
        })
    }

    /// Current revision of a table; 0 for a table never written.
    #[must_use]
    pub fn revision(&self, table: &str) -> u64 {
        self.state.read().tables.get(table).map_or(0, Table::revision)
    }

    /// Names of every table ever written.
    #[must_use]
    pub fn table_names(&self) -> Vec<String> {
        self.state.read().tables.keys().cloned().collect()
    }

    /// Last committed sequence number.
    #[must_use]
    pub fn seq(&self) -> u64 {
        self.state.read().seq
    }

    /// Directory of a file-backed store.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Collects row counts and the journal size.
    pub fn stats(&self) -> StoreResult<StoreStats> {
        let journal_bytes = self.journal.lock().size()?;
        let state = self.state.read();
        Ok(StoreStats {
            tables: state
                .tables
                .iter()
                .map(|(name, t)| (name.clone(), t.len()))
                .collect(),
            seq: state.seq,
            journal_bytes,
        })
    }

    /// Rewrites the journal as one snapshot record.
    pub fn compact(&self) -> StoreResult<()> {
        let mut journal = self.journal.lock();
        let state = self.state.read();
        let before = journal.size()?;
        journal.rewrite(&JournalEntry::Snapshot {
            seq: state.seq,
            tables: state.tables.clone(),
        })?;
        tracing::info!(before, after = journal.size()?, "journal compacted");
        Ok(())
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.path)
            .field("seq", &self.seq())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn insert_and_read() {
        let store = Store::open_in_memory().unwrap();
        let id = store
            .transaction(|txn| Ok(txn.insert("parts", row(json!({ "name": "Chain" })))))
            .unwrap();

        let stored = store.get("parts", id).unwrap();
        assert_eq!(stored["name"], "Chain");
        assert_eq!(stored["_id"], json!(id));
        assert_eq!(store.revision("parts"), 1);
    }

    #[test]
    fn failed_closure_leaves_no_trace() {
        let store = Store::open_in_memory().unwrap();
        let result: StoreResult<()> = store.transaction(|txn| {
            txn.insert("parts", row(json!({ "name": "Chain" })));
            txn.abort("changed my mind")
        });

        assert!(matches!(result, Err(StoreError::Aborted { .. })));
        assert!(store.scan("parts").is_empty());
        assert_eq!(store.seq(), 0);
    }

    #[test]
    fn transaction_reads_its_own_writes() {
        let store = Store::open_in_memory().unwrap();
        store
            .transaction(|txn| {
                let id = txn.insert("customers", row(json!({ "name": "Asha" })));
                assert_eq!(txn.get("customers", id).unwrap()["name"], "Asha");
                assert_eq!(txn.scan("customers").len(), 1);
                assert_eq!(txn.revision("customers"), 0);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn replace_all_swaps_rows_atomically() {
        let store = Store::open_in_memory().unwrap();
        store
            .transaction(|txn| {
                txn.insert("suppliers", row(json!({ "name": "Old" })));
                Ok(())
            })
            .unwrap();

        store
            .transaction(|txn| {
                txn.replace_all(
                    "suppliers",
                    vec![row(json!({ "name": "A" })), row(json!({ "name": "B" }))],
                );
                txn.insert("customers", row(json!({ "name": "C" })));
                Ok(())
            })
            .unwrap();

        let names: Vec<_> = store
            .scan("suppliers")
            .into_iter()
            .map(|r| r["name"].clone())
            .collect();
        assert_eq!(names, vec![json!("A"), json!("B")]);
        assert_eq!(store.revision("suppliers"), 2);
        assert_eq!(store.revision("customers"), 1);
    }

    #[test]
    fn bulk_put_honours_existing_ids() {
        let store = Store::open_in_memory().unwrap();
        let ids = store
            .transaction(|txn| {
                Ok(txn.bulk_put(
                    "expenses",
                    vec![
                        row(json!({ "_id": 10, "amount": 5 })),
                        row(json!({ "amount": 6 })),
                    ],
                ))
            })
            .unwrap();
        assert_eq!(ids, vec![10, 11]);
    }

    #[test]
    fn delete_reports_presence() {
        let store = Store::open_in_memory().unwrap();
        store
            .transaction(|txn| {
                let id = txn.insert("parts", row(json!({ "name": "Bolt" })));
                assert!(txn.delete("parts", id));
                assert!(!txn.delete("parts", id));
                Ok(())
            })
            .unwrap();
        assert!(store.scan("parts").is_empty());
    }

    #[test]
    fn queries_by_field() {
        let store = Store::open_in_memory().unwrap();
        store
            .transaction(|txn| {
                for (date, amount) in [("2024-01-05", 100), ("2024-02-10", 40), ("2024-02-20", 60)] {
                    txn.insert("expenses", row(json!({ "date": date, "amount": amount })));
                }
                Ok(())
            })
            .unwrap();

        assert_eq!(store.find_eq("expenses", "amount", &json!(40)).len(), 1);
        let february = store.find_range(
            "expenses",
            "date",
            &json!("2024-02-01"),
            &json!("2024-03-01"),
        );
        assert_eq!(february.len(), 2);
        assert!(store.find_eq("missing", "amount", &json!(40)).is_empty());
    }

    #[test]
    fn replay_restores_state_and_revisions() {
        let backend = InMemoryBackend::new();
        {
            let store = Store::with_backend(Box::new(backend.clone())).unwrap();
            store
                .transaction(|txn| {
                    txn.insert("parts", row(json!({ "name": "Chain" })));
                    Ok(())
                })
                .unwrap();
            store
                .transaction(|txn| {
                    txn.insert("parts", row(json!({ "name": "Tyre" })));
                    Ok(())
                })
                .unwrap();
        }

        let store = Store::with_backend(Box::new(backend)).unwrap();
        assert_eq!(store.scan("parts").len(), 2);
        assert_eq!(store.revision("parts"), 2);
        assert_eq!(store.seq(), 2);
    }

    #[test]
    fn compact_preserves_content() {
        let backend = InMemoryBackend::new();
        let store = Store::with_backend(Box::new(backend.clone())).unwrap();
        for name in ["a", "b", "c"] {
            store
                .transaction(|txn| {
                    txn.insert("customers", row(json!({ "name": name })));
                    Ok(())
                })
                .unwrap();
        }
        store.compact().unwrap();
        drop(store);

        let reopened = Store::with_backend(Box::new(backend)).unwrap();
        assert_eq!(reopened.scan("customers").len(), 3);
        assert_eq!(reopened.revision("customers"), 3);
        let id = reopened
            .transaction(|txn| Ok(txn.insert("customers", row(json!({ "name": "d" })))))
            .unwrap();
        assert_eq!(id, 4);
    }

    #[test]
    fn noop_transaction_writes_nothing() {
        let backend = InMemoryBackend::new();
        let store = Store::with_backend(Box::new(backend.clone())).unwrap();
        store.transaction(|txn| Ok(txn.scan("parts"))).unwrap();
        assert!(backend.data().is_empty());
    }
}
