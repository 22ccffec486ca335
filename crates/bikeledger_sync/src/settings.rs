//! Sync settings persisted next to the data.

use crate::config::RemoteLocation;
use crate::error::{SyncError, SyncResult};
use crate::remote::VersionToken;
use bikeledger_model::lenient;
use bikeledger_store::{Row, Store, Transaction, ID_FIELD};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Table holding the settings record.
pub const SETTINGS_TABLE: &str = "settings";

/// Local id of the single settings record.
pub const SETTINGS_ID: u64 = 1;

/// Everything the engine remembers between cycles. The credential is never
/// part of it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SyncSettings {
    /// Where the remote files live.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<RemoteLocation>,
    /// When the last fully successful cycle finished.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<String>,
    /// Last known version token per remote file.
    pub version_tokens: BTreeMap<String, VersionToken>,
    /// Balance projected from the merged cash log.
    #[serde(with = "lenient::number")]
    pub cash_in_hand: f64,
}

impl SyncSettings {
    /// Decodes the settings record. A missing record yields defaults.
    pub fn from_row(row: Option<Row>) -> SyncResult<Self> {
        match row {
            None => Ok(Self::default()),
            Some(mut row) => {
                row.remove(ID_FIELD);
                serde_json::from_value(Value::Object(row)).map_err(|e| {
                    SyncError::LocalTransaction(bikeledger_store::StoreError::corrupted(format!(
                        "unreadable settings record: {e}"
                    )))
                })
            }
        }
    }

    /// Encodes the settings record.
    pub fn to_row(&self) -> SyncResult<Row> {
        match serde_json::to_value(self).map_err(bikeledger_store::StoreError::from)? {
            Value::Object(row) => Ok(row),
            _ => Err(SyncError::LocalTransaction(
                bikeledger_store::StoreError::corrupted("settings did not encode to an object"),
            )),
        }
    }

    /// Reads the settings from `store`.
    pub fn load(store: &Store) -> SyncResult<Self> {
        Self::from_row(store.get(SETTINGS_TABLE, SETTINGS_ID))
    }

    /// Reads the settings inside a transaction.
    pub fn load_in(txn: &Transaction<'_>) -> SyncResult<Self> {
        Self::from_row(txn.get(SETTINGS_TABLE, SETTINGS_ID))
    }

    /// Writes the settings inside a transaction.
    pub fn save_in(&self, txn: &mut Transaction<'_>) -> SyncResult<()> {
        txn.put(SETTINGS_TABLE, SETTINGS_ID, self.to_row()?);
        Ok(())
    }

    /// Writes the settings to `store` in their own transaction.
    pub fn save(&self, store: &Store) -> SyncResult<()> {
        let row = self.to_row()?;
        store.transaction(|txn| {
            txn.put(SETTINGS_TABLE, SETTINGS_ID, row);
            Ok(())
        })?;
        Ok(())
    }

    /// Token recorded for `file`.
    pub fn token(&self, file: &str) -> Option<&VersionToken> {
        self.version_tokens.get(file)
    }
}
