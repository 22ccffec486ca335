//! Commit journal framing and replay.
//!
//! Every committed transaction becomes one framed record:
//!
//! ```text
//! | magic "BLJR" (4) | payload length u32 LE (4) | SHA-256 of payload (32) | JSON payload |
//! ```
//!
//! Replay stops at the first frame that is short, has a bad magic, or fails
//! its checksum, and truncates the backend there. A crash mid-append
//! therefore loses at most the transaction being written.

use crate::backend::StorageBackend;
use crate::error::{StoreError, StoreResult};
use crate::table::{Row, Table};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Magic bytes opening each journal frame.
pub const JOURNAL_MAGIC: [u8; 4] = *b"BLJR";

const LEN_SIZE: usize = 4;
const CHECKSUM_SIZE: usize = 32;
/// Frame header size: magic + length + checksum.
pub const HEADER_SIZE: usize = JOURNAL_MAGIC.len() + LEN_SIZE + CHECKSUM_SIZE;

/// One mutation inside a committed transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TableOp {
    /// Insert or overwrite a row.
    Put {
        /// Table name.
        table: String,
        /// Local row id.
        id: u64,
        /// Full row, `_id` included.
        row: Row,
    },
    /// Physically remove a row.
    Delete {
        /// Table name.
        table: String,
        /// Local row id.
        id: u64,
    },
    /// Remove every row of a table.
    Clear {
        /// Table name.
        table: String,
    },
}

impl TableOp {
    /// Returns the table this op touches.
    #[must_use]
    pub fn table(&self) -> &str {
        match self {
            Self::Put { table, .. } | Self::Delete { table, .. } | Self::Clear { table } => table,
        }
    }
}

/// A journal record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JournalEntry {
    /// A committed transaction.
    Commit {
        /// Commit sequence number.
        seq: u64,
        /// Mutations in application order.
        ops: Vec<TableOp>,
    },
    /// Full image of every table, written by compaction.
    Snapshot {
        /// Sequence number of the last commit folded in.
        seq: u64,
        /// Every table by name.
        tables: BTreeMap<String, Table>,
    },
}

impl JournalEntry {
    /// Returns the sequence number of the entry.
    #[must_use]
    pub fn seq(&self) -> u64 {
        match self {
            Self::Commit { seq, .. } | Self::Snapshot { seq, .. } => *seq,
        }
    }
}

/// Encodes an entry as one frame.
pub fn encode_frame(entry: &JournalEntry) -> StoreResult<Vec<u8>> {
    let payload = serde_json::to_vec(entry)?;
    let len = u32::try_from(payload.len())
        .map_err(|_| StoreError::corrupted("journal record payload too large"))?;

    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
    frame.extend_from_slice(&JOURNAL_MAGIC);
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&Sha256::digest(&payload));
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Result of scanning raw journal bytes.
#[derive(Debug)]
pub struct Decoded {
    /// Entries in the valid prefix.
    pub entries: Vec<JournalEntry>,
    /// Length of the valid prefix in bytes.
    pub valid_len: u64,
}

/// Decodes every well-formed frame up to the first damaged one.
///
/// # Errors
///
/// A frame with a valid checksum whose payload is not a journal entry is
/// reported as [`StoreError::Corrupted`]; that cannot come from a torn write.
pub fn decode_frames(bytes: &[u8]) -> StoreResult<Decoded> {
    let mut entries = Vec::new();
    let mut offset = 0usize;

    while offset < bytes.len() {
        let rest = &bytes[offset..];
        if rest.len() < HEADER_SIZE || rest[..4] != JOURNAL_MAGIC {
            break;
        }
        let mut len_bytes = [0u8; LEN_SIZE];
        len_bytes.copy_from_slice(&rest[4..8]);
        let len = u32::from_le_bytes(len_bytes) as usize;
        let Some(frame_end) = HEADER_SIZE.checked_add(len).filter(|end| *end <= rest.len()) else {
            break;
        };
        let checksum = &rest[8..HEADER_SIZE];
        let payload = &rest[HEADER_SIZE..frame_end];
        if Sha256::digest(payload).as_slice() != checksum {
            break;
        }
        let entry: JournalEntry = serde_json::from_slice(payload).map_err(|e| {
            StoreError::corrupted(format!("record at offset {offset} is unreadable: {e}"))
        })?;
        entries.push(entry);
        offset += frame_end;
    }

    Ok(Decoded {
        entries,
        valid_len: offset as u64,
    })
}

/// Append-only journal over a storage backend.
pub struct Journal {
    backend: Box<dyn StorageBackend>,
    poisoned: bool,
}

impl Journal {
    /// Wraps a backend.
    pub fn new(backend: Box<dyn StorageBackend>) -> Self {
        Self {
            backend,
            poisoned: false,
        }
    }

    /// Whether a failed append could not be rolled back.
    #[must_use]
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Reads every intact entry, cutting away a damaged tail.
    pub fn replay(&mut self) -> StoreResult<Vec<JournalEntry>> {
        let bytes = self.backend.read_all()?;
        let decoded = decode_frames(&bytes)?;
        if decoded.valid_len < bytes.len() as u64 {
            tracing::warn!(
                valid = decoded.valid_len,
                total = bytes.len(),
                "truncating damaged journal tail"
            );
            self.backend.truncate(decoded.valid_len)?;
            self.backend.sync()?;
        }
        Ok(decoded.entries)
    }

    /// Appends one entry and syncs it.
    ///
    /// On failure the journal is cut back to its previous length, so a
    /// reported failure never reappears on replay. If that cut fails too the
    /// journal is poisoned and refuses further writes.
    pub fn append(&mut self, entry: &JournalEntry) -> StoreResult<()> {
        if self.poisoned {
            return Err(StoreError::Poisoned);
        }
        let frame = encode_frame(entry)?;
        let before = self.backend.size()?;
        let written = self
            .backend
            .append(&frame)
            .and_then(|_| self.backend.sync());
        if let Err(error) = written {
            if let Err(rollback) = self.roll_back(before) {
                tracing::error!(%error, %rollback, "journal rollback failed; store poisoned");
                self.poisoned = true;
            } else {
                tracing::warn!(%error, len = before, "journal append failed; rolled back");
            }
            return Err(error.into());
        }
        Ok(())
    }

    fn roll_back(&mut self, len: u64) -> StoreResult<()> {
        if self.backend.size()? > len {
            self.backend.truncate(len)?;
        }
        self.backend.sync()?;
        Ok(())
    }

    /// Replaces the whole journal with a single entry.
    pub fn rewrite(&mut self, entry: &JournalEntry) -> StoreResult<()> {
        if self.poisoned {
            return Err(StoreError::Poisoned);
        }
        let frame = encode_frame(entry)?;
        self.backend.replace(&frame)?;
        Ok(())
    }

    /// Returns the journal size in bytes.
    pub fn size(&self) -> StoreResult<u64> {
        Ok(self.backend.size()?)
    }
}

impl std::fmt::Debug for Journal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Journal").finish_non_exhaustive()
    }
}
