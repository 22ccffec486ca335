//! Entity records.
//!
//! Every record decodes defensively: all fields default, unknown fields are
//! kept in `extra` and written back untouched. `_id` is the local store id
//! and never leaves the device.

use crate::lenient;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Behaviour shared by every synchronized record type.
pub trait Record:
    Serialize + DeserializeOwned + Clone + PartialEq + fmt::Debug + Send + Sync + 'static
{
    /// Local store id, if the record came from the store.
    fn local_id(&self) -> Option<u64>;

    /// Replaces the local store id.
    fn set_local_id(&mut self, id: Option<u64>);
}

macro_rules! impl_record {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl Record for $ty {
                fn local_id(&self) -> Option<u64> {
                    self.local_id
                }

                fn set_local_id(&mut self, id: Option<u64>) {
                    self.local_id = id;
                }
            }
        )+
    };
}

impl_record!(
    InventoryItem,
    LedgerEntry,
    EditLogEntry,
    Expense,
    Customer,
    Part,
    ServiceRecord,
    Supplier,
    ImageSet,
);

/// Normalizes a plate number: trimmed and upper-cased.
#[must_use]
pub fn normalize_plate(plate: &str) -> String {
    plate.trim().to_uppercase()
}

/// A bike in the inventory, identified by its plate number.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InventoryItem {
    /// Local store id.
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub local_id: Option<u64>,
    /// Plate number.
    #[serde(deserialize_with = "lenient::string")]
    pub no: String,
    /// Previous owner.
    #[serde(deserialize_with = "lenient::string")]
    pub owner: String,
    /// Price paid.
    #[serde(with = "lenient::number")]
    pub purchase_price: f64,
    /// Money spent on repairs.
    #[serde(with = "lenient::number")]
    pub repair_cost: f64,
    /// Sale price, 0 while unsold.
    #[serde(with = "lenient::number")]
    pub selling_price: f64,
    /// `selling_price - (purchase_price + repair_cost)`.
    #[serde(with = "lenient::number")]
    pub net_profit: f64,
    /// Purchase date.
    #[serde(deserialize_with = "lenient::string")]
    pub date_purchase: String,
    /// Sale date, empty while unsold.
    #[serde(deserialize_with = "lenient::string")]
    pub date_selling: String,
    /// Last modification time.
    #[serde(
        rename = "_updatedAt",
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<String>,
    /// Tombstone.
    #[serde(rename = "_deleted", deserialize_with = "lenient::flag")]
    pub deleted: bool,
    /// Fields this build does not know.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl InventoryItem {
    /// Identity key: the normalized plate, `None` when blank.
    #[must_use]
    pub fn identity(&self) -> Option<String> {
        let plate = normalize_plate(&self.no);
        (!plate.is_empty()).then_some(plate)
    }

    /// Recomputes `net_profit` from the prices.
    pub fn recompute_profit(&mut self) {
        self.net_profit = self.selling_price - (self.purchase_price + self.repair_cost);
    }
}

/// Kind of a cash ledger entry.
///
/// Unknown kinds written by newer clients survive a round trip unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LedgerKind {
    /// Replace the balance with the amount.
    Set,
    /// Manual top-up.
    Increase,
    /// Manual withdrawal.
    Decrease,
    /// Bike purchase.
    Buy,
    /// Bike sale.
    Sell,
    /// Business expense.
    Expense,
    /// Automatic correction.
    System,
    /// Anything else.
    Other(String),
}

impl LedgerKind {
    /// Wire name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Set => "set",
            Self::Increase => "increase",
            Self::Decrease => "decrease",
            Self::Buy => "buy",
            Self::Sell => "sell",
            Self::Expense => "expense",
            Self::System => "system",
            Self::Other(other) => other,
        }
    }
}

impl Default for LedgerKind {
    fn default() -> Self {
        Self::Other(String::new())
    }
}

impl From<String> for LedgerKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "set" => Self::Set,
            "increase" => Self::Increase,
            "decrease" => Self::Decrease,
            "buy" => Self::Buy,
            "sell" => Self::Sell,
            "expense" => Self::Expense,
            "system" => Self::System,
            _ => Self::Other(value),
        }
    }
}

impl From<LedgerKind> for String {
    fn from(kind: LedgerKind) -> Self {
        match kind {
            LedgerKind::Other(other) => other,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for LedgerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One cash-in-hand ledger entry, identified by its exact timestamp.
///
/// `balance` is the running total at write time and goes stale after a
/// merge; the authoritative balance is always re-projected from the log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LedgerEntry {
    /// Local store id.
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub local_id: Option<u64>,
    /// Unique creation time (ISO-8601).
    #[serde(
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<String>,
    /// Entry kind.
    #[serde(rename = "type")]
    pub kind: LedgerKind,
    /// New balance for `set`, signed delta otherwise.
    #[serde(with = "lenient::number")]
    pub amount: f64,
    /// Free text.
    #[serde(deserialize_with = "lenient::string")]
    pub reason: String,
    /// Running balance when written.
    #[serde(with = "lenient::number")]
    pub balance: f64,
    /// Groups entries written by one business operation.
    #[serde(
        rename = "transactionId",
        alias = "correlationId",
        deserialize_with = "lenient::opt_string"
    )]
    pub correlation_id: Option<String>,
    /// Fields this build does not know.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LedgerEntry {
    /// Creates an entry.
    pub fn new(timestamp: impl Into<String>, kind: LedgerKind, amount: f64) -> Self {
        Self {
            timestamp: Some(timestamp.into()),
            kind,
            amount,
            ..Self::default()
        }
    }

    /// Sets the reason.
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    /// Sets the cached running balance.
    #[must_use]
    pub fn with_balance(mut self, balance: f64) -> Self {
        self.balance = balance;
        self
    }

    /// Sets the correlation id.
    #[must_use]
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }
}

/// One entry of the inventory edit history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EditLogEntry {
    /// Local store id.
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub local_id: Option<u64>,
    /// Unique creation time (ISO-8601).
    #[serde(
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<String>,
    /// Local id of the edited bike on the device that made the edit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bike_id: Option<Value>,
    /// Plate of the edited bike.
    #[serde(
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub bike_plate: Option<String>,
    /// `add`, `update`, `delete`, ...
    #[serde(
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub action: Option<String>,
    /// Snapshot before the edit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_data: Option<Value>,
    /// Snapshot after the edit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_data: Option<Value>,
    /// Field-level changes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changes: Option<Value>,
    /// Fields this build does not know.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A business expense, identified by date, category and amount.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Expense {
    /// Local store id.
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub local_id: Option<u64>,
    /// Expense date.
    #[serde(deserialize_with = "lenient::string")]
    pub date: String,
    /// Category.
    #[serde(deserialize_with = "lenient::string")]
    pub category: String,
    /// Amount spent.
    #[serde(with = "lenient::number")]
    pub amount: f64,
    /// Free text.
    #[serde(deserialize_with = "lenient::string")]
    pub description: String,
    /// Receipt photo; kept locally, never pushed.
    #[serde(
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub image: Option<String>,
    /// Last modification time.
    #[serde(
        rename = "_updatedAt",
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<String>,
    /// Fields this build does not know.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Expense {
    /// Identity key `date_category_amount`, `None` without a date.
    #[must_use]
    pub fn identity(&self) -> Option<String> {
        if self.date.trim().is_empty() {
            return None;
        }
        Some(format!(
            "{}_{}_{}",
            self.date,
            self.category,
            lenient::format_f64(self.amount)
        ))
    }
}

/// A customer contact, identified by name (case-insensitive).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Customer {
    /// Local store id.
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub local_id: Option<u64>,
    /// Name.
    #[serde(deserialize_with = "lenient::string")]
    pub name: String,
    /// Phone number.
    #[serde(deserialize_with = "lenient::string")]
    pub phone: String,
    /// Email address.
    #[serde(deserialize_with = "lenient::string")]
    pub email: String,
    /// Postal address.
    #[serde(deserialize_with = "lenient::string")]
    pub address: String,
    /// Last modification time.
    #[serde(
        rename = "_updatedAt",
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<String>,
    /// Fields this build does not know.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A spare part, identified by name (case-insensitive).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Part {
    /// Local store id.
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub local_id: Option<u64>,
    /// Name.
    #[serde(deserialize_with = "lenient::string")]
    pub name: String,
    /// Stock keeping unit.
    #[serde(deserialize_with = "lenient::string")]
    pub sku: String,
    /// Units in stock.
    #[serde(with = "lenient::number")]
    pub stock_quantity: f64,
    /// Unit cost.
    #[serde(with = "lenient::number")]
    pub cost_price: f64,
    /// Supplier reference.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supplier_id: Option<Value>,
    /// Last modification time.
    #[serde(
        rename = "_updatedAt",
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<String>,
    /// Fields this build does not know.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Service work on a bike, identified by bike, date and description.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServiceRecord {
    /// Local store id.
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub local_id: Option<u64>,
    /// Serviced bike.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bike_id: Option<Value>,
    /// Service date.
    #[serde(deserialize_with = "lenient::string")]
    pub date: String,
    /// What was done.
    #[serde(deserialize_with = "lenient::string")]
    pub description: String,
    /// Parts consumed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub part_ids_used: Option<Value>,
    /// Last modification time.
    #[serde(
        rename = "_updatedAt",
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<String>,
    /// Fields this build does not know.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ServiceRecord {
    /// Identity key `bikeId_date_description`, `None` without a date.
    #[must_use]
    pub fn identity(&self) -> Option<String> {
        if self.date.trim().is_empty() {
            return None;
        }
        let bike = self
            .bike_id
            .as_ref()
            .and_then(lenient::scalar_to_string)
            .unwrap_or_default();
        Some(format!("{bike}_{}_{}", self.date, self.description))
    }
}

/// A supplier contact, identified by name (case-insensitive).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Supplier {
    /// Local store id.
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub local_id: Option<u64>,
    /// Name.
    #[serde(deserialize_with = "lenient::string")]
    pub name: String,
    /// Contact person.
    #[serde(deserialize_with = "lenient::string")]
    pub contact_person: String,
    /// Phone number.
    #[serde(deserialize_with = "lenient::string")]
    pub phone: String,
    /// Supplied category.
    #[serde(deserialize_with = "lenient::string")]
    pub category: String,
    /// Last modification time.
    #[serde(
        rename = "_updatedAt",
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<String>,
    /// Fields this build does not know.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Case-insensitive name key shared by customers, parts and suppliers.
#[must_use]
pub fn name_identity(name: &str) -> Option<String> {
    let trimmed = name.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_lowercase())
}

/// Maximum photos kept per plate.
pub const MAX_IMAGES_PER_PLATE: usize = 3;

/// Photos attached to one plate, as base64 data URLs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageSet {
    /// Local store id.
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub local_id: Option<u64>,
    /// Plate number.
    #[serde(deserialize_with = "lenient::string")]
    pub plate: String,
    /// Images, oldest first.
    pub images: Vec<String>,
}

impl ImageSet {
    /// Creates a set, keeping at most [`MAX_IMAGES_PER_PLATE`] images.
    pub fn new(plate: impl Into<String>, mut images: Vec<String>) -> Self {
        images.truncate(MAX_IMAGES_PER_PLATE);
        Self {
            local_id: None,
            plate: plate.into(),
            images,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn inventory_reads_loose_json() {
        let item: InventoryItem = serde_json::from_value(json!({
            "no": "ab12",
            "purchasePrice": "15000",
            "repairCost": 500,
            "_deleted": "true",
            "ownerId": 4
        }))
        .unwrap();

        assert_eq!(item.identity().as_deref(), Some("AB12"));
        assert_eq!(item.purchase_price, 15000.0);
        assert!(item.deleted);
        assert_eq!(item.extra["ownerId"], json!(4));
        assert_eq!(item.updated_at, None);
    }

    #[test]
    fn unknown_ledger_kind_survives() {
        let entry: LedgerEntry = serde_json::from_value(json!({
            "timestamp": "2024-01-01T00:00:00.000Z",
            "type": "refund",
            "amount": 10
        }))
        .unwrap();
        assert_eq!(entry.kind, LedgerKind::Other("refund".into()));

        let back = serde_json::to_value(&entry).unwrap();
        assert_eq!(back["type"], "refund");
        assert_eq!(back["amount"], json!(10));
        assert_eq!(back["transactionId"], Value::Null);
    }

    #[test]
    fn correlation_id_alias() {
        let entry: LedgerEntry = serde_json::from_value(json!({
            "timestamp": "2024-01-01T00:00:00.000Z",
            "type": "sell",
            "amount": 100,
            "correlationId": "sale_9"
        }))
        .unwrap();
        assert_eq!(entry.correlation_id.as_deref(), Some("sale_9"));
        assert_eq!(serde_json::to_value(&entry).unwrap()["transactionId"], "sale_9");
    }

    #[test]
    fn identities() {
        let expense = Expense {
            date: "2024-03-01".into(),
            category: "Rent".into(),
            amount: 1500.0,
            ..Expense::default()
        };
        assert_eq!(expense.identity().as_deref(), Some("2024-03-01_Rent_1500"));

        let service = ServiceRecord {
            bike_id: Some(json!(3)),
            date: "2024-03-02".into(),
            description: "Oil".into(),
            ..ServiceRecord::default()
        };
        assert_eq!(service.identity().as_deref(), Some("3_2024-03-02_Oil"));

        assert_eq!(name_identity("  Ravi Motors "), Some("ravi motors".into()));
        assert_eq!(name_identity("   "), None);
    }

    #[test]
    fn image_sets_are_capped() {
        let set = ImageSet::new("AB12", vec!["a".into(), "b".into(), "c".into(), "d".into()]);
        assert_eq!(set.images.len(), MAX_IMAGES_PER_PLATE);
    }
}
