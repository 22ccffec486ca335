//! Storage backend trait.

use crate::error::StorageResult;

/// An append-only byte store underneath the journal.
///
/// Backends never interpret what they hold; framing and checksums belong to
/// [`crate::journal`].
///
/// # Invariants
///
/// - `append` returns the offset where data was written
/// - `read_at` returns exactly the bytes previously written at that offset
/// - after `sync` returns, appended data survives process termination
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::ReadPastEnd`] if the range is not fully
    /// inside the stored bytes.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Appends data and returns the offset where it starts.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Returns the current size in bytes.
    fn size(&self) -> StorageResult<u64>;

    /// Makes all appended data durable.
    fn sync(&mut self) -> StorageResult<()>;

    /// Drops every byte after `new_size`.
    ///
    /// Used to cut a torn journal tail and to rewrite the journal on compaction.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;

    /// Replaces the whole content with `data` and syncs.
    ///
    /// The default truncates then appends; backends that can swap content
    /// atomically should override it.
    fn replace(&mut self, data: &[u8]) -> StorageResult<()> {
        self.truncate(0)?;
        self.append(data)?;
        self.sync()
    }

    /// Reads the whole content.
    fn read_all(&self) -> StorageResult<Vec<u8>> {
        let size = self.size()?;
        self.read_at(0, size as usize)
    }
}
