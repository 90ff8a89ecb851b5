//! Bags over a backend whose flush or sync can be made to fail.

use databag_codec::Value;
use databag_core::{BagConfig, BagError, DataBag, Engine};
use databag_storage::{InMemoryBackend, StorageBackend, StorageError, StorageResult};
use parking_lot::Mutex;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// In-memory journal that fails the next sync when armed.
#[derive(Clone, Default)]
struct FlakySync {
    bytes: Arc<Mutex<Vec<u8>>>,
    fail_next_sync: Arc<AtomicBool>,
}

impl FlakySync {
    fn arm(&self) {
        self.fail_next_sync.store(true, Ordering::SeqCst);
    }

    fn journal(&self) -> Vec<u8> {
        self.bytes.lock().clone()
    }
}

impl StorageBackend for FlakySync {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        InMemoryBackend::with_data(self.journal()).read_at(offset, len)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let mut bytes = self.bytes.lock();
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
        if self.fail_next_sync.swap(false, Ordering::SeqCst) {
            return Err(StorageError::Io(io::Error::other("fsync failed")));
        }
        Ok(())
    }

    fn truncate(&mut self, len: u64) -> StorageResult<()> {
        let mut bytes = self.bytes.lock();
        if len > bytes.len() as u64 {
            return Err(StorageError::Corrupted("truncate past end".into()));
        }
        bytes.truncate(len as usize);
        Ok(())
    }
}

fn versioned() -> BagConfig {
    BagConfig::new().versioned(true).history(3)
}

#[test]
fn failed_sync_keeps_memory_and_journal_in_step() {
    let backend = FlakySync::default();
    let engine = Arc::new(Engine::open(Box::new(backend.clone()), true).unwrap());
    let bag = DataBag::with_engine(engine, &versioned()).unwrap();

    bag.set("k", &Value::from(1)).unwrap();
    backend.arm();
    let err = bag.set("k", &Value::from(2)).unwrap_err();
    assert!(matches!(err, BagError::Storage(StorageError::Io(_))));

    // The journaled write is visible despite the error
    assert_eq!(bag.get("k").unwrap(), Value::from(2));
    bag.set("k", &Value::from(3)).unwrap();
    assert_eq!(bag.versions("k"), vec![0, -1, -2]);

    let reopened = Engine::open(Box::new(InMemoryBackend::with_data(backend.journal())), false)
        .unwrap();
    let bag = DataBag::with_engine(Arc::new(reopened), &versioned()).unwrap();
    assert_eq!(bag.get("k").unwrap(), Value::from(3));
    assert_eq!(bag.get_version("k", -1).unwrap(), Value::from(2));
    assert_eq!(bag.get_version("k", -2).unwrap(), Value::from(1));
}

#[test]
fn failed_sync_on_table_creation_still_opens() {
    let backend = FlakySync::default();
    backend.arm();
    let engine = Arc::new(Engine::open(Box::new(backend.clone()), true).unwrap());
    assert!(DataBag::with_engine(engine.clone(), &BagConfig::new()).is_err());

    // The table record landed; a second handle finds it instead of
    // journaling a duplicate
    let bag = DataBag::with_engine(engine, &BagConfig::new()).unwrap();
    bag.set("a", &Value::from(true)).unwrap();

    let reopened = Engine::open(Box::new(InMemoryBackend::with_data(backend.journal())), false)
        .unwrap();
    let bag = DataBag::with_engine(Arc::new(reopened), &BagConfig::new()).unwrap();
    assert_eq!(bag.get("a").unwrap(), Value::from(true));
}
