//! Write transactions.

use crate::error::{StoreError, StoreResult};
use crate::journal::TableOp;
use crate::table::{row_id, Row, Table};
use std::collections::BTreeMap;

/// A write transaction handed to [`crate::Store::transaction`].
///
/// Tables are copied on first write; reads through the transaction see its
/// own staged writes. Nothing becomes visible to other readers until the
/// closure returns `Ok` and the commit record is durable.
pub struct Transaction<'a> {
    base: &'a BTreeMap<String, Table>,
    staged: BTreeMap<String, Table>,
    ops: Vec<TableOp>,
}

impl<'a> Transaction<'a> {
    pub(crate) fn new(base: &'a BTreeMap<String, Table>) -> Self {
        Self {
            base,
            staged: BTreeMap::new(),
            ops: Vec::new(),
        }
    }

    pub(crate) fn into_parts(self) -> (BTreeMap<String, Table>, Vec<TableOp>) {
        (self.staged, self.ops)
    }

    fn table(&self, name: &str) -> Option<&Table> {
        self.staged.get(name).or_else(|| self.base.get(name))
    }

    fn table_mut(&mut self, name: &str) -> &mut Table {
        let base = self.base;
        self.staged.entry(name.to_string()).or_insert_with(|| {
            let mut table = base.get(name).cloned().unwrap_or_default();
            table.bump_revision();
            table
        })
    }

    /// Reads a row.
    #[must_use]
    pub fn get(&self, table: &str, id: u64) -> Option<Row> {
        self.table(table).and_then(|t| t.get(id)).cloned()
    }

    /// Reads every row of a table in id order.
    #[must_use]
    pub fn scan(&self, table: &str) -> Vec<Row> {
        self.table(table)
            .map(|t| t.rows().cloned().collect())
            .unwrap_or_default()
    }

    /// Revision of a table as of the start of this transaction.
    #[must_use]
    pub fn revision(&self, table: &str) -> u64 {
        self.base.get(table).map_or(0, Table::revision)
    }

    /// Inserts a row under a fresh id and returns the id.
    pub fn insert(&mut self, table: &str, row: Row) -> u64 {
        let t = self.table_mut(table);
        let id = t.allocate_id();
        let stored = t.put(id, row).clone();
        self.ops.push(TableOp::Put {
            table: table.to_string(),
            id,
            row: stored,
        });
        id
    }

    /// Inserts or overwrites the row with `id`.
    pub fn put(&mut self, table: &str, id: u64, row: Row) {
        let stored = self.table_mut(table).put(id, row).clone();
        self.ops.push(TableOp::Put {
            table: table.to_string(),
            id,
            row: stored,
        });
    }

    /// Upserts many rows.
    ///
    /// A row that carries `_id` overwrites that id; a row without one gets a
    /// fresh id. Returns the ids in input order.
    pub fn bulk_put(&mut self, table: &str, rows: Vec<Row>) -> Vec<u64> {
        rows.into_iter()
            .map(|row| match row_id(&row) {
                Some(id) => {
                    self.put(table, id, row);
                    id
                }
                None => self.insert(table, row),
            })
            .collect()
    }

    /// Physically removes a row. Returns whether it existed.
    pub fn delete(&mut self, table: &str, id: u64) -> bool {
        if self.table(table).and_then(|t| t.get(id)).is_none() {
            return false;
        }
        self.table_mut(table).delete(id);
        self.ops.push(TableOp::Delete {
            table: table.to_string(),
            id,
        });
        true
    }

    /// Removes every row of a table.
    pub fn clear(&mut self, table: &str) {
        self.table_mut(table).clear();
        self.ops.push(TableOp::Clear {
            table: table.to_string(),
        });
    }

    /// Clears a table and fills it with `rows`.
    pub fn replace_all(&mut self, table: &str, rows: Vec<Row>) -> Vec<u64> {
        self.clear(table);
        self.bulk_put(table, rows)
    }

    /// Rolls the transaction back with a reason.
    ///
    /// Convenience for closures: `return txn.abort("...")`.
    pub fn abort<T>(&self, reason: impl Into<String>) -> StoreResult<T> {
        Err(StoreError::aborted(reason))
    }
}

/// Applies a committed op during replay.
pub(crate) fn apply_op(tables: &mut BTreeMap<String, Table>, op: TableOp) {
    match op {
        TableOp::Put { table, id, row } => {
            tables.entry(table).or_default().put(id, row);
        }
        TableOp::Delete { table, id } => {
            if let Some(t) = tables.get_mut(&table) {
                t.delete(id);
            }
        }
        TableOp::Clear { table } => tables.entry(table).or_default().clear(),
    }
}
