//! Append-only journal.
//!
//! Every change to a bag's tables is one CRC-framed record appended to a
//! [`StorageBackend`]. On open the journal is read front to back and the
//! records are replayed into memory.
//!
//! A crash can leave a partially written last record. Replay treats an
//! incomplete frame at the tail as the end of the journal and truncates it
//! away so later appends start on a frame boundary. A complete frame with a
//! bad checksum is corruption, not a torn write, and fails the open. So does
//! a length prefix that runs past the end while whole records still follow
//! it; those bytes are never truncated.

mod record;

pub use record::{compute_crc32, JournalRecord, Op, RecordKind, RowImage, MIN_FRAME_SIZE};

use crate::error::{BagError, BagResult};
use databag_storage::StorageBackend;
use record::frame_len;
use tracing::{debug, warn};

/// Appends records to, and replays records from, a storage backend.
pub struct Journal {
    backend: Box<dyn StorageBackend>,
    sync_on_commit: bool,
}

impl Journal {
    /// Creates a journal over a backend.
    pub fn new(backend: Box<dyn StorageBackend>, sync_on_commit: bool) -> Self {
        Self {
            backend,
            sync_on_commit,
        }
    }

    /// Appends a record, flushes it and, when configured, syncs it.
    ///
    /// Returns the offset where the record was written.
    pub fn append(&mut self, record: &JournalRecord) -> BagResult<u64> {
        let offset = self.write(record)?;
        self.persist()?;
        Ok(offset)
    }

    /// Appends a record without flushing.
    ///
    /// Once this returns `Ok` the record is part of the journal and will be
    /// replayed, whatever [`persist`](Self::persist) later reports.
    pub fn write(&mut self, record: &JournalRecord) -> BagResult<u64> {
        let frame = record.encode()?;
        let offset = self.backend.append(&frame)?;
        debug!(offset, len = frame.len(), kind = ?record.kind(), "journal append");
        Ok(offset)
    }

    /// Flushes written records and syncs them if `sync_on_commit` is set.
    pub fn persist(&mut self) -> BagResult<()> {
        self.backend.flush()?;
        if self.sync_on_commit {
            self.backend.sync()?;
        }
        Ok(())
    }

    /// Drops every record written at or after `offset`.
    pub fn rollback(&mut self, offset: u64) -> BagResult<()> {
        warn!(offset, "rolling back journal record");
        self.backend.truncate(offset)?;
        Ok(())
    }

    /// Reads every complete record in order.
    ///
    /// Bytes after the last complete frame are a torn tail and are truncated,
    /// unless a valid frame can still be found among them. In that case the
    /// length prefix at the stop point is damaged and committed records
    /// follow it, so replay fails with [`BagError::JournalCorruption`] and
    /// leaves the bytes alone. A checksum mismatch or a structurally invalid
    /// record fails as well.
    pub fn replay(&mut self) -> BagResult<Vec<JournalRecord>> {
        let size = self.backend.size()?;
        let mut records = Vec::new();
        let mut offset = 0u64;

        while size - offset >= MIN_FRAME_SIZE as u64 {
            let len_bytes = self.backend.read_at(offset, 4)?;
            let record_len = frame_len(&len_bytes);
            if record_len < MIN_FRAME_SIZE {
                return Err(BagError::journal_corruption(format!(
                    "record length {record_len} at offset {offset} below minimum"
                )));
            }
            if record_len as u64 > size - offset {
                break;
            }

            let data = self.backend.read_at(offset, record_len)?;
            records.push(JournalRecord::decode(&data)?);
            offset += record_len as u64;
        }

        if offset < size {
            let tail = self.backend.read_at(offset, (size - offset) as usize)?;
            if let Some(at) = frame_within(&tail) {
                return Err(BagError::journal_corruption(format!(
                    "record at offset {offset} overruns the journal but a complete \
                     record follows at offset {}",
                    offset + at as u64
                )));
            }
            warn!(
                offset,
                dropped = size - offset,
                "truncating torn journal tail"
            );
            self.backend.truncate(offset)?;
        }

        Ok(records)
    }

    /// Returns the current journal size in bytes.
    pub fn size(&self) -> BagResult<u64> {
        Ok(self.backend.size()?)
    }
}

/// Position of the first complete, checksummed frame inside `tail`, past
/// its first byte.
fn frame_within(tail: &[u8]) -> Option<usize> {
    (1..tail.len()).find(|&at| {
        let rest = &tail[at..];
        rest.len() >= MIN_FRAME_SIZE && {
            let len = frame_len(rest);
            len >= MIN_FRAME_SIZE
                && len <= rest.len()
                && JournalRecord::decode(&rest[..len]).is_ok()
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use databag_storage::InMemoryBackend;

    fn create(bag: &str) -> JournalRecord {
        JournalRecord::CreateTable { bag: bag.into() }
    }

    #[test]
    fn append_and_replay() {
        let mut journal = Journal::new(Box::new(InMemoryBackend::new()), false);
        assert_eq!(journal.append(&create("a")).unwrap(), 0);
        journal.append(&create("b")).unwrap();

        let records = journal.replay().unwrap();
        assert_eq!(records, vec![create("a"), create("b")]);
    }

    #[test]
    fn torn_tail_is_truncated() {
        let mut data = create("a").encode().unwrap();
        let full = data.len() as u64;
        let second = create("b").encode().unwrap();
        data.extend_from_slice(&second[..second.len() - 3]);

        let mut journal = Journal::new(Box::new(InMemoryBackend::with_data(data)), false);
        let records = journal.replay().unwrap();
        assert_eq!(records, vec![create("a")]);
        assert_eq!(journal.size().unwrap(), full);

        // The next append lands on a frame boundary
        journal.append(&create("c")).unwrap();
        assert_eq!(journal.replay().unwrap(), vec![create("a"), create("c")]);
    }

    #[test]
    fn short_length_prefix_is_truncated() {
        let mut data = create("a").encode().unwrap();
        data.extend_from_slice(&[7, 0]);
        let mut journal = Journal::new(Box::new(InMemoryBackend::with_data(data)), false);
        assert_eq!(journal.replay().unwrap().len(), 1);
    }

    #[test]
    fn overrunning_length_before_whole_records_is_corrupt() {
        let first = create("a").encode().unwrap();
        let mut data = first.clone();
        data.extend(create("b").encode().unwrap());
        data.extend(create("c").encode().unwrap());
        // High byte of the second frame's length
        data[first.len() + 3] = 0x7f;
        let size = data.len() as u64;

        let mut journal = Journal::new(Box::new(InMemoryBackend::with_data(data)), false);
        assert!(matches!(
            journal.replay(),
            Err(BagError::JournalCorruption { .. })
        ));
        assert_eq!(journal.size().unwrap(), size);
    }

    #[test]
    fn overrunning_length_on_last_frame_is_torn() {
        let mut data = create("a").encode().unwrap();
        let full = data.len();
        data.extend(create("b").encode().unwrap());
        data[full + 3] = 0x7f;

        let mut journal = Journal::new(Box::new(InMemoryBackend::with_data(data)), false);
        assert_eq!(journal.replay().unwrap(), vec![create("a")]);
        assert_eq!(journal.size().unwrap(), full as u64);
    }

    #[test]
    fn rollback_discards_written_record() {
        let mut journal = Journal::new(Box::new(InMemoryBackend::new()), false);
        journal.append(&create("a")).unwrap();
        let offset = journal.write(&create("b")).unwrap();
        journal.rollback(offset).unwrap();
        assert_eq!(journal.replay().unwrap(), vec![create("a")]);
    }

    #[test]
    fn checksum_mismatch_fails_replay() {
        let mut data = create("a").encode().unwrap();
        let last = data.len() - 1;
        data[last] ^= 0x55;
        let mut journal = Journal::new(Box::new(InMemoryBackend::with_data(data)), false);
        assert!(matches!(
            journal.replay(),
            Err(BagError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn zero_length_frame_is_corrupt() {
        let mut journal = Journal::new(
            Box::new(InMemoryBackend::with_data(vec![0; 16])),
            false,
        );
        assert!(matches!(
            journal.replay(),
            Err(BagError::JournalCorruption { .. })
        ));
    }
}
