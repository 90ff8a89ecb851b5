//! Journal bytes kept in a vector.

use crate::backend::StorageBackend;
use crate::error::{check_range, StorageError, StorageResult};
use parking_lot::Mutex;

/// Volatile backend for in-memory bags and for replaying captured journals.
///
/// Flush and sync do nothing; the bytes die with the backend.
///
/// ```rust
/// use databag_storage::{InMemoryBackend, StorageBackend};
///
/// let mut journal = InMemoryBackend::new();
/// assert_eq!(journal.append(b"frame-1").unwrap(), 0);
/// assert_eq!(journal.append(b"frame-2").unwrap(), 7);
/// assert_eq!(journal.read_at(7, 7).unwrap(), b"frame-2");
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    bytes: Mutex<Vec<u8>>,
}

impl InMemoryBackend {
    /// An empty journal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A journal that already holds `bytes`, e.g. one copied off disk.
    #[must_use]
    pub fn with_data(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Mutex::new(bytes),
        }
    }

    /// Snapshot of the stored bytes.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.bytes.lock().clone()
    }
}

impl StorageBackend for InMemoryBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let bytes = self.bytes.lock();
        check_range(offset, len as u64, bytes.len() as u64)?;
        // In range, so both ends fit in usize
        let start = offset as usize;
        Ok(bytes[start..start + len].to_vec())
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let bytes = self.bytes.get_mut();
        let start = bytes.len() as u64;
        bytes.extend_from_slice(data);
        Ok(start)
    }

    fn flush(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.bytes.lock().len() as u64)
    }

    fn sync(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn truncate(&mut self, len: u64) -> StorageResult<()> {
        let bytes = self.bytes.get_mut();
        let size = bytes.len() as u64;
        if len > size {
            return Err(StorageError::out_of_range(size, len - size, size));
        }
        bytes.truncate(len as usize);
        Ok(())
    }
}
