//! # BikeLedger Model
//!
//! Entity types and the codecs for the remote files they sync through.
//!
//! This crate provides:
//! - [`EntityKind`], the catalogue of entity families with their local table
//!   and remote file
//! - typed records ([`InventoryItem`], [`LedgerEntry`], ...) that decode
//!   defensively and keep unknown fields
//! - the inventory CSV codec and the JSON document codec
//! - [`Collection`], one whole family as a typed value
//! - [`UniqueTimestamps`] for collision-free log identities
//!
//! This is a pure crate with no I/O.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod collection;
pub mod csv;
pub mod document;
mod entity;
mod error;
mod kind;
pub mod lenient;
pub mod time;

pub use collection::Collection;
pub use entity::{
    name_identity, normalize_plate, Customer, EditLogEntry, Expense, ImageSet, InventoryItem,
    LedgerEntry, LedgerKind, Part, Record, ServiceRecord, Supplier, MAX_IMAGES_PER_PLATE,
};
pub use error::{ModelError, ModelResult};
pub use kind::{EntityKind, FileFormat};
pub use time::{ManualClock, SystemClock, TimeSource, UniqueTimestamps};
