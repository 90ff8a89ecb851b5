//! The byte-store seam between a journal and where its bytes live.

use crate::error::{StorageError, StorageResult};

/// Append-only bytes holding one bag journal.
///
/// Offsets handed out by [`append`](Self::append) stay valid until a
/// [`truncate`](Self::truncate) cuts below them. Implementations are shared
/// behind a bag handle, so they must be `Send + Sync`.
pub trait StorageBackend: Send + Sync {
    /// Copies `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// [`StorageError::OutOfRange`] when the range passes the end of the
    /// stored bytes.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Writes `data` after the last stored byte and returns where it starts.
    ///
    /// # Errors
    ///
    /// Fails when the underlying write fails.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Hands buffered bytes to the operating system.
    ///
    /// # Errors
    ///
    /// Fails when the underlying flush fails.
    fn flush(&mut self) -> StorageResult<()>;

    /// Number of stored bytes.
    ///
    /// # Errors
    ///
    /// Fails when the size cannot be read.
    fn size(&self) -> StorageResult<u64>;

    /// Waits until stored bytes survive a power loss.
    ///
    /// # Errors
    ///
    /// Fails when the underlying fsync fails.
    fn sync(&mut self) -> StorageResult<()>;

    /// Drops every byte from `len` onwards.
    ///
    /// Journal recovery calls this to cut off a torn trailing record.
    ///
    /// # Errors
    ///
    /// [`StorageError::OutOfRange`] when `len` is past the end.
    fn truncate(&mut self, len: u64) -> StorageResult<()>;

    /// Copies every stored byte.
    ///
    /// # Errors
    ///
    /// Fails like [`read_at`](Self::read_at), or with
    /// [`StorageError::Corrupted`] when the journal is larger than memory
    /// can address.
    fn read_all(&self) -> StorageResult<Vec<u8>> {
        let size = self.size()?;
        let len = usize::try_from(size)
            .map_err(|_| StorageError::Corrupted(format!("{size} byte journal is not addressable")))?;
        self.read_at(0, len)
    }
}
