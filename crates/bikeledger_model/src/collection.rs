//! A whole entity family as one typed value.

use crate::csv;
use crate::document;
use crate::entity::{
    Customer, EditLogEntry, Expense, ImageSet, InventoryItem, LedgerEntry, Part, Record,
    ServiceRecord, Supplier,
};
use crate::error::ModelResult;
use crate::kind::EntityKind;
use bikeledger_store::Row;
use serde_json::Value;

/// Every record of one entity family.
#[derive(Debug, Clone, PartialEq)]
pub enum Collection {
    /// Bikes.
    Inventory(Vec<InventoryItem>),
    /// Cash ledger.
    CashLog(Vec<LedgerEntry>),
    /// Edit history.
    EditLog(Vec<EditLogEntry>),
    /// Expenses.
    Expenses(Vec<Expense>),
    /// Customers.
    Customers(Vec<Customer>),
    /// Parts.
    Parts(Vec<Part>),
    /// Service records.
    ServiceLog(Vec<ServiceRecord>),
    /// Suppliers.
    Suppliers(Vec<Supplier>),
    /// Photos per plate.
    Images(Vec<ImageSet>),
}

macro_rules! each {
    ($value:expr, $records:ident => $body:expr) => {
        match $value {
            Collection::Inventory($records) => $body,
            Collection::CashLog($records) => $body,
            Collection::EditLog($records) => $body,
            Collection::Expenses($records) => $body,
            Collection::Customers($records) => $body,
            Collection::Parts($records) => $body,
            Collection::ServiceLog($records) => $body,
            Collection::Suppliers($records) => $body,
            Collection::Images($records) => $body,
        }
    };
}

fn rows_to_records<T: Record>(kind: EntityKind, rows: Vec<Row>) -> Vec<T> {
    rows.into_iter()
        .filter_map(|row| match serde_json::from_value::<T>(Value::Object(row)) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(table = kind.table(), error = %e, "skipping unreadable row");
                None
            }
        })
        .collect()
}

fn records_to_rows<T: Record>(records: Vec<T>) -> ModelResult<Vec<Row>> {
    records
        .into_iter()
        .map(|record| match serde_json::to_value(record)? {
            Value::Object(row) => Ok(row),
            _ => Err(crate::ModelError::UnexpectedShape {
                expected: "a record that serializes to an object",
            }),
        })
        .collect()
}

fn without_local_ids<T: Record>(records: &[T]) -> Vec<T> {
    records
        .iter()
        .cloned()
        .map(|mut record| {
            record.set_local_id(None);
            record
        })
        .collect()
}

impl Collection {
    /// An empty collection of `kind`.
    #[must_use]
    pub fn empty(kind: EntityKind) -> Self {
        match kind {
            EntityKind::Inventory => Self::Inventory(Vec::new()),
            EntityKind::CashLog => Self::CashLog(Vec::new()),
            EntityKind::EditLog => Self::EditLog(Vec::new()),
            EntityKind::Expenses => Self::Expenses(Vec::new()),
            EntityKind::Customers => Self::Customers(Vec::new()),
            EntityKind::Parts => Self::Parts(Vec::new()),
            EntityKind::ServiceLog => Self::ServiceLog(Vec::new()),
            EntityKind::Suppliers => Self::Suppliers(Vec::new()),
            EntityKind::Images => Self::Images(Vec::new()),
        }
    }

    /// The family this collection belongs to.
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Inventory(_) => EntityKind::Inventory,
            Self::CashLog(_) => EntityKind::CashLog,
            Self::EditLog(_) => EntityKind::EditLog,
            Self::Expenses(_) => EntityKind::Expenses,
            Self::Customers(_) => EntityKind::Customers,
            Self::Parts(_) => EntityKind::Parts,
            Self::ServiceLog(_) => EntityKind::ServiceLog,
            Self::Suppliers(_) => EntityKind::Suppliers,
            Self::Images(_) => EntityKind::Images,
        }
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        each!(self, records => records.len())
    }

    /// Whether there are no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Decodes remote file content.
    ///
    /// # Errors
    ///
    /// Fails when the file as a whole is unreadable; single bad records are
    /// skipped.
    pub fn decode(kind: EntityKind, text: &str) -> ModelResult<Self> {
        Ok(match kind {
            EntityKind::Inventory => Self::Inventory(csv::decode_inventory(text)?),
            EntityKind::CashLog => Self::CashLog(document::decode_records(text)?),
            EntityKind::EditLog => Self::EditLog(document::decode_records(text)?),
            EntityKind::Expenses => Self::Expenses(document::decode_records(text)?),
            EntityKind::Customers => Self::Customers(document::decode_records(text)?),
            EntityKind::Parts => Self::Parts(document::decode_records(text)?),
            EntityKind::ServiceLog => Self::ServiceLog(document::decode_records(text)?),
            EntityKind::Suppliers => Self::Suppliers(document::decode_records(text)?),
            EntityKind::Images => Self::Images(document::decode_image_map(text)?),
        })
    }

    /// Encodes the remote file content.
    ///
    /// Local ids are never written; expense receipt photos stay local.
    pub fn encode(&self) -> ModelResult<String> {
        match self {
            Self::Inventory(items) => Ok(csv::encode_inventory(items)),
            Self::Images(sets) => document::encode_image_map(sets),
            Self::Expenses(expenses) => {
                let wire: Vec<Expense> = without_local_ids(expenses)
                    .into_iter()
                    .map(|mut expense| {
                        expense.image = None;
                        expense
                    })
                    .collect();
                document::encode_records(&wire)
            }
            Self::CashLog(records) => document::encode_records(&without_local_ids(records)),
            Self::EditLog(records) => document::encode_records(&without_local_ids(records)),
            Self::Customers(records) => document::encode_records(&without_local_ids(records)),
            Self::Parts(records) => document::encode_records(&without_local_ids(records)),
            Self::ServiceLog(records) => document::encode_records(&without_local_ids(records)),
            Self::Suppliers(records) => document::encode_records(&without_local_ids(records)),
        }
    }

    /// Builds a collection from local table rows. Unreadable rows are skipped.
    #[must_use]
    pub fn from_rows(kind: EntityKind, rows: Vec<Row>) -> Self {
        match kind {
            EntityKind::Inventory => Self::Inventory(rows_to_records(kind, rows)),
            EntityKind::CashLog => Self::CashLog(rows_to_records(kind, rows)),
            EntityKind::EditLog => Self::EditLog(rows_to_records(kind, rows)),
            EntityKind::Expenses => Self::Expenses(rows_to_records(kind, rows)),
            EntityKind::Customers => Self::Customers(rows_to_records(kind, rows)),
            EntityKind::Parts => Self::Parts(rows_to_records(kind, rows)),
            EntityKind::ServiceLog => Self::ServiceLog(rows_to_records(kind, rows)),
            EntityKind::Suppliers => Self::Suppliers(rows_to_records(kind, rows)),
            EntityKind::Images => Self::Images(rows_to_records(kind, rows)),
        }
    }

    /// Converts into local table rows, local ids included where known.
    pub fn into_rows(self) -> ModelResult<Vec<Row>> {
        each!(self, records => records_to_rows(records))
    }

    /// Ledger entries, if this is the cash log.
    #[must_use]
    pub fn as_ledger(&self) -> Option<&[LedgerEntry]> {
        match self {
            Self::CashLog(entries) => Some(entries),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rows_round_trip_keeps_ids() {
        let rows = vec![
            json!({ "_id": 3, "name": "Chain", "sku": "C-1" }),
            json!("not an object either"),
        ]
        .into_iter()
        .filter_map(|v| v.as_object().cloned())
        .collect();

        let parts = Collection::from_rows(EntityKind::Parts, rows);
        assert_eq!(parts.len(), 1);
        let rows = parts.into_rows().unwrap();
        assert_eq!(rows[0]["_id"], json!(3));
    }

    #[test]
    fn encode_drops_local_only_fields() {
        let expenses = Collection::Expenses(vec![Expense {
            local_id: Some(4),
            date: "2024-01-01".into(),
            category: "Fuel".into(),
            amount: 300.0,
            image: Some("data:image/png;base64,AAAA".into()),
            ..Expense::default()
        }]);
        let text = expenses.encode().unwrap();
        assert!(!text.contains("_id"));
        assert!(!text.contains("image"));
        assert!(text.contains("\"amount\": 300"));
    }

    #[test]
    fn decode_dispatches_by_kind() {
        let csv = "\"no\",\"owner\"\r\n\"AB12\",\"X\"";
        let inventory = Collection::decode(EntityKind::Inventory, csv).unwrap();
        assert_eq!(inventory.kind(), EntityKind::Inventory);
        assert_eq!(inventory.len(), 1);

        let images = Collection::decode(EntityKind::Images, "{}").unwrap();
        assert!(images.is_empty());
        assert!(Collection::decode(EntityKind::CashLog, "{}").is_err());
    }
}
