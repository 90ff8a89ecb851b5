//! Journal bytes kept in a locked file.

use crate::backend::StorageBackend;
use crate::error::{check_range, StorageError, StorageResult};
use fs2::FileExt;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Open file plus the length we have written so far.
#[derive(Debug)]
struct Handle {
    file: File,
    len: u64,
}

/// Persistent backend over one journal file.
///
/// Opening takes an exclusive advisory lock that is held until the backend
/// is dropped. A bag that finds the file already locked fails straight away
/// with [`StorageError::Locked`].
///
/// [`flush`](StorageBackend::flush) only empties user-space buffers;
/// [`sync`](StorageBackend::sync) is what makes bytes durable.
///
/// ```no_run
/// use databag_storage::{FileBackend, StorageBackend};
/// use std::path::Path;
///
/// let mut journal = FileBackend::open_with_create_dirs(Path::new("data/bag.db")).unwrap();
/// journal.append(b"frame").unwrap();
/// journal.sync().unwrap();
/// ```
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    handle: Mutex<Handle>,
}

impl FileBackend {
    /// Opens `path`, creating an empty journal if it is missing.
    ///
    /// # Errors
    ///
    /// [`StorageError::Locked`] when another handle holds the file, or
    /// [`StorageError::Io`] when it cannot be opened.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        file.try_lock_exclusive().map_err(|_| StorageError::Locked {
            path: path.to_path_buf(),
        })?;

        let len = file.metadata()?.len();
        debug!(path = %path.display(), len, "journal file opened");
        Ok(Self {
            path: path.to_path_buf(),
            handle: Mutex::new(Handle { file, len }),
        })
    }

    /// Like [`open`](Self::open), but first creates any missing parent
    /// directories.
    ///
    /// # Errors
    ///
    /// As [`open`](Self::open), plus directory creation failures.
    pub fn open_with_create_dirs(path: &Path) -> StorageResult<Self> {
        match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => fs::create_dir_all(dir)?,
            _ => {}
        }
        Self::open(path)
    }

    /// Journal file location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileBackend {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.handle.get_mut().file) {
            trace!(path = %self.path.display(), error = %e, "unlock on close failed");
        }
    }
}

impl StorageBackend for FileBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let mut handle = self.handle.lock();
        check_range(offset, len as u64, handle.len)?;
        let mut buf = vec![0u8; len];
        if len > 0 {
            handle.file.seek(SeekFrom::Start(offset))?;
            handle.file.read_exact(&mut buf)?;
        }
        Ok(buf)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let handle = self.handle.get_mut();
        let start = handle.len;
        if data.is_empty() {
            return Ok(start);
        }
        handle.file.seek(SeekFrom::Start(start))?;
        if let Err(e) = handle.file.write_all(data) {
            // Cut off whatever part of the frame made it to the file
            if let Err(cut) = handle.file.set_len(start) {
                debug!(path = %self.path.display(), error = %cut, "partial append left in place");
            }
            return Err(e.into());
        }
        handle.len += data.len() as u64;
        Ok(start)
    }

    fn flush(&mut self) -> StorageResult<()> {
        Ok(self.handle.get_mut().file.flush()?)
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.handle.lock().len)
    }

    fn sync(&mut self) -> StorageResult<()> {
        Ok(self.handle.get_mut().file.sync_data()?)
    }

    fn truncate(&mut self, len: u64) -> StorageResult<()> {
        let handle = self.handle.get_mut();
        if len > handle.len {
            return Err(StorageError::out_of_range(handle.len, len - handle.len, handle.len));
        }
        handle.file.set_len(len)?;
        handle.file.sync_all()?;
        debug!(path = %self.path.display(), from = handle.len, to = len, "journal truncated");
        handle.len = len;
        Ok(())
    }
}
