//! # BikeLedger Store
//!
//! Embedded table store backing the BikeLedger app.
//!
//! Rows are JSON objects grouped into named tables and keyed by a local
//! `u64` id. All writes go through [`Store::transaction`]; each committed
//! transaction is one checksummed record in an append-only journal, replayed
//! on open.
//!
//! ## Backends
//!
//! - [`InMemoryBackend`] - tests and throwaway stores
//! - [`FileBackend`] - the `journal.log` file of an on-disk store
//!
//! ## Example
//!
//! ```rust
//! use bikeledger_store::Store;
//! use serde_json::json;
//!
//! let store = Store::open_in_memory().unwrap();
//! store
//!     .transaction(|txn| {
//!         let row = json!({ "name": "Brake pads", "price": 450 });
//!         txn.insert("parts", row.as_object().cloned().unwrap());
//!         Ok(())
//!     })
//!     .unwrap();
//! assert_eq!(store.find_eq("parts", "price", &json!(450)).len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
pub mod journal;
mod memory;
mod store;
mod table;
mod transaction;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult, StoreError, StoreResult};
pub use file::FileBackend;
pub use journal::{JournalEntry, TableOp};
pub use memory::InMemoryBackend;
pub use store::{Store, StoreStats};
pub use table::{compare_values, row_id, Row, Table, ID_FIELD};
pub use transaction::Transaction;
