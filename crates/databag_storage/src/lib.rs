//! Where DataBag journal bytes live.
//!
//! A backend stores one journal as a flat run of bytes. It can append,
//! read a range back, flush, sync and cut the tail. Frame layout, checksums
//! and replay belong to `databag_core`; nothing here looks inside the bytes.
//!
//! [`FileBackend`] keeps the journal in a single file and holds an exclusive
//! lock on it while open. [`InMemoryBackend`] keeps it in a vector.
//!
//! ```rust
//! use databag_storage::{InMemoryBackend, StorageBackend};
//!
//! let mut journal = InMemoryBackend::new();
//! let at = journal.append(b"record").unwrap();
//! assert_eq!(journal.read_at(at, 6).unwrap(), b"record");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
