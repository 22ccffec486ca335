//! In-memory backend for tests and throwaway stores.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::sync::Arc;

/// An in-memory storage backend.
///
/// Clones share the same buffer, so a test can keep a handle, drop the
/// [`crate::Store`] and reopen another one over the same bytes.
#[derive(Debug, Default, Clone)]
pub struct InMemoryBackend {
    data: Arc<RwLock<Vec<u8>>>,
}

impl InMemoryBackend {
    /// Creates a new empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend holding `data`, for recovery tests.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(RwLock::new(data)),
        }
    }

    /// Returns a copy of the stored bytes.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.data.read().clone()
    }
}

impl StorageBackend for InMemoryBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let data = self.data.read();
        let size = data.len() as u64;
        let start = offset as usize;
        let end = start.saturating_add(len);

        if offset > size || end > data.len() {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }

        Ok(data[start..end].to_vec())
    }

    fn append(&mut self, new_data: &[u8]) -> StorageResult<u64> {
        let mut data = self.data.write();
        let offset = data.len() as u64;
        data.extend_from_slice(new_data);
        Ok(offset)
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.data.read().len() as u64)
    }

    fn sync(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let mut data = self.data.write();
        let size = data.len() as u64;
        if new_size > size {
            return Err(StorageError::TruncatePastEnd {
                requested: new_size,
                size,
            });
        }
        data.truncate(new_size as usize);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_returns_offsets() {
        let mut backend = InMemoryBackend::new();
        assert_eq!(backend.append(b"abc").unwrap(), 0);
        assert_eq!(backend.append(b"de").unwrap(), 3);
        assert_eq!(backend.read_all().unwrap(), b"abcde");
    }

    #[test]
    fn read_past_end_fails() {
        let backend = InMemoryBackend::with_data(b"abc".to_vec());
        assert!(matches!(
            backend.read_at(2, 5),
            Err(StorageError::ReadPastEnd { .. })
        ));
    }

    #[test]
    fn clones_share_bytes() {
        let mut backend = InMemoryBackend::new();
        let observer = backend.clone();
        backend.append(b"shared").unwrap();
        assert_eq!(observer.data(), b"shared");
    }

    #[test]
    fn truncate_bounds() {
        let mut backend = InMemoryBackend::with_data(b"hello".to_vec());
        backend.truncate(2).unwrap();
        assert_eq!(backend.data(), b"he");
        assert!(matches!(
            backend.truncate(10),
            Err(StorageError::TruncatePastEnd { .. })
        ));
    }
}
