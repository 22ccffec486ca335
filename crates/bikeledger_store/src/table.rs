//! In-memory table image.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// A stored row: a JSON object whose `_id` field holds the local id.
pub type Row = serde_json::Map<String, Value>;

/// Name of the field carrying the local id.
pub const ID_FIELD: &str = "_id";

/// One named table.
///
/// `revision` moves forward once per committed transaction that touches the
/// table, so a reader can tell whether rows changed since it last looked.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    rows: BTreeMap<u64, Row>,
    next_id: u64,
    revision: u64,
}

impl Table {
    /// Returns the row with the given id.
    #[must_use]
    pub fn get(&self, id: u64) -> Option<&Row> {
        self.rows.get(&id)
    }

    /// Iterates rows in id order.
    pub fn rows(&self) -> impl Iterator<Item = &Row> {
        self.rows.values()
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Current revision.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub(crate) fn bump_revision(&mut self) {
        self.revision += 1;
    }

    pub(crate) fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Stores `row` under `id`, writing the id into the row.
    pub(crate) fn put(&mut self, id: u64, mut row: Row) -> &Row {
        row.insert(ID_FIELD.to_string(), Value::from(id));
        self.next_id = self.next_id.max(id);
        self.rows.insert(id, row);
        &self.rows[&id]
    }

    pub(crate) fn delete(&mut self, id: u64) -> bool {
        self.rows.remove(&id).is_some()
    }

    pub(crate) fn clear(&mut self) {
        self.rows.clear();
    }

    /// Rows whose `field` equals `value`.
    pub fn find_eq<'a>(&'a self, field: &'a str, value: &'a Value) -> impl Iterator<Item = &'a Row> {
        self.rows
            .values()
            .filter(move |row| row.get(field).is_some_and(|v| values_equal(v, value)))
    }

    /// Rows whose `field` lies in `lo..hi` (lower bound inclusive).
    ///
    /// Only rows whose field has the same JSON type as the bounds match;
    /// numbers compare numerically, strings lexically.
    pub fn find_range<'a>(
        &'a self,
        field: &'a str,
        lo: &'a Value,
        hi: &'a Value,
    ) -> impl Iterator<Item = &'a Row> {
        self.rows.values().filter(move |row| {
            row.get(field).is_some_and(|v| {
                matches!(
                    compare_values(v, lo),
                    Some(Ordering::Greater | Ordering::Equal)
                ) && matches!(compare_values(v, hi), Some(Ordering::Less))
            })
        })
    }
}

/// Reads the local id out of a row, if it carries one.
#[must_use]
pub fn row_id(row: &Row) -> Option<u64> {
    row.get(ID_FIELD).and_then(Value::as_u64)
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Orders two scalars of the same JSON type.
#[must_use]
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}
