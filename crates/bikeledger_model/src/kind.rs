//! The catalogue of synchronized entity families.

use std::fmt;

/// Encoding of a remote file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    /// Quoted CSV with a header row.
    Csv,
    /// Pretty-printed JSON array of records.
    JsonArray,
    /// Pretty-printed JSON object keyed by plate.
    JsonMap,
}

/// One synchronized entity family: one local table, one remote file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntityKind {
    /// Bikes in stock or sold.
    Inventory,
    /// Cash-in-hand ledger.
    CashLog,
    /// History of inventory edits.
    EditLog,
    /// Business expenses.
    Expenses,
    /// Customer contacts.
    Customers,
    /// Spare parts.
    Parts,
    /// Service work done on bikes.
    ServiceLog,
    /// Supplier contacts.
    Suppliers,
    /// Photos per plate.
    Images,
}

impl EntityKind {
    /// Every kind, in sync order.
    pub const ALL: [EntityKind; 9] = [
        EntityKind::Inventory,
        EntityKind::CashLog,
        EntityKind::EditLog,
        EntityKind::Expenses,
        EntityKind::Customers,
        EntityKind::Parts,
        EntityKind::ServiceLog,
        EntityKind::Suppliers,
        EntityKind::Images,
    ];

    /// Local table name.
    #[must_use]
    pub const fn table(self) -> &'static str {
        match self {
            Self::Inventory => "inventory",
            Self::CashLog => "cash_log",
            Self::EditLog => "edit_log",
            Self::Expenses => "expenses",
            Self::Customers => "customers",
            Self::Parts => "parts",
            Self::ServiceLog => "service_log",
            Self::Suppliers => "suppliers",
            Self::Images => "images",
        }
    }

    /// Remote file name, relative to the configured base path.
    #[must_use]
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::Inventory => "bikes_inventory.csv",
            Self::CashLog => "cash_log.json",
            Self::EditLog => "edit_log.json",
            Self::Expenses => "expenses.json",
            Self::Customers => "customers.json",
            Self::Parts => "parts.json",
            Self::ServiceLog => "service_log.json",
            Self::Suppliers => "suppliers.json",
            Self::Images => "images/images.json",
        }
    }

    /// Remote encoding.
    #[must_use]
    pub const fn format(self) -> FileFormat {
        match self {
            Self::Inventory => FileFormat::Csv,
            Self::Images => FileFormat::JsonMap,
            _ => FileFormat::JsonArray,
        }
    }

    /// Looks a kind up by its remote file name.
    #[must_use]
    pub fn from_file_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.file_name() == name)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}
