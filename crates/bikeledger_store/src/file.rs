//! File backend for persistent stores.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A storage backend over a single OS file.
///
/// `sync()` calls `File::sync_all()`; the store syncs after every commit.
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    file: Mutex<File>,
    size: u64,
}

impl FileBackend {
    /// Opens or creates the file at `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the file or its directories cannot be created.
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let size = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            size,
        })
    }

    /// Returns the path to the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StorageBackend for FileBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let end = offset.saturating_add(len as u64);
        if offset > self.size || end > self.size {
            return Err(StorageError::ReadPastEnd {
                offset,
                len,
                size: self.size,
            });
        }
        if len == 0 {
            return Ok(Vec::new());
        }

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        let mut buffer = vec![0u8; len];
        file.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let offset = self.size;
        if data.is_empty() {
            return Ok(offset);
        }
        let file = self.file.get_mut();
        file.seek(SeekFrom::End(0))?;
        file.write_all(data)?;
        self.size += data.len() as u64;
        Ok(offset)
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.size)
    }

    fn sync(&mut self) -> StorageResult<()> {
        let file = self.file.get_mut();
        file.flush()?;
        file.sync_all()?;
        Ok(())
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        if new_size > self.size {
            return Err(StorageError::TruncatePastEnd {
                requested: new_size,
                size: self.size,
            });
        }
        let file = self.file.get_mut();
        file.set_len(new_size)?;
        file.sync_all()?;
        self.size = new_size;
        Ok(())
    }

    fn replace(&mut self, data: &[u8]) -> StorageResult<()> {
        let tmp = self.path.with_extension("tmp");
        {
            let mut staged = File::create(&tmp)?;
            staged.write_all(data)?;
            staged.sync_all()?;
        }
        std::fs::rename(&tmp, &self.path)?;

        let file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        self.size = file.metadata()?.len();
        *self.file.get_mut() = file;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn creates_missing_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("journal.log");
        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.size().unwrap(), 0);
        assert!(path.exists());
        assert_eq!(backend.path(), path);
    }

    #[test]
    fn data_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("journal.log");
        {
            let mut backend = FileBackend::open(&path).unwrap();
            backend.append(b"persistent").unwrap();
            backend.sync().unwrap();
        }
        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.read_all().unwrap(), b"persistent");
    }

    #[test]
    fn truncate_shrinks_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("journal.log");
        let mut backend = FileBackend::open(&path).unwrap();
        backend.append(b"hello world").unwrap();
        backend.truncate(5).unwrap();
        assert_eq!(backend.read_all().unwrap(), b"hello");
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 5);
    }

    #[test]
    fn replace_swaps_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("journal.log");
        let mut backend = FileBackend::open(&path).unwrap();
        backend.append(b"old old old").unwrap();
        backend.replace(b"new").unwrap();
        backend.append(b"+tail").unwrap();
        assert_eq!(backend.read_all().unwrap(), b"new+tail");
        assert!(!path.with_extension("tmp").exists());
    }
}
