//! Crash recovery testing for DataBag.
//!
//! A crash can stop a journal at any byte. This module records a journal
//! together with the bag state after each commit, then reopens every
//! prefix of the journal and checks that the recovered bag equals the state
//! after the last commit that fits in the prefix.
//!
//! ## Usage
//!
//! ```rust
//! use databag_testkit::crash::CrashRecoveryHarness;
//! use databag_codec::Value;
//!
//! let mut harness = CrashRecoveryHarness::new();
//! harness.set("a", Value::from(1));
//! harness.set("b", Value::from(2));
//! assert!(harness.check_every_prefix().passed);
//! ```

use crate::fixtures::file_config;
use databag_codec::Value;
use databag_core::{BagConfig, BagError, BagResult, DataBag, Engine};
use databag_storage::InMemoryBackend;
use std::collections::BTreeMap;
use std::sync::Arc;
use tempfile::TempDir;

/// Result of a crash recovery test.
#[derive(Debug, Clone)]
pub struct CrashRecoveryResult {
    /// Whether the test passed.
    pub passed: bool,
    /// Number of journal prefixes checked.
    pub prefixes: usize,
    /// First failure, if any.
    pub error: Option<String>,
}

impl CrashRecoveryResult {
    fn pass(prefixes: usize) -> Self {
        Self {
            passed: true,
            prefixes,
            error: None,
        }
    }

    fn fail(prefixes: usize, error: String) -> Self {
        Self {
            passed: false,
            prefixes,
            error: Some(error),
        }
    }
}

/// Test harness for crash recovery scenarios.
pub struct CrashRecoveryHarness {
    bag: Option<DataBag>,
    config: BagConfig,
    temp_dir: TempDir,
    /// `(journal length, bag contents)` after each commit.
    checkpoints: Vec<(u64, BTreeMap<String, Value>)>,
    current: BTreeMap<String, Value>,
}

impl CrashRecoveryHarness {
    /// Creates a harness over a fresh, unversioned file-backed bag.
    pub fn new() -> Self {
        Self::with_config(BagConfig::new())
    }

    /// Creates a harness over a fresh file-backed bag.
    pub fn with_config(config: BagConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config = file_config(temp_dir.path(), config);
        let bag = DataBag::open(config.clone()).expect("Failed to open bag");
        let mut harness = Self {
            bag: Some(bag),
            config,
            temp_dir,
            checkpoints: Vec::new(),
            current: BTreeMap::new(),
        };
        harness.checkpoint();
        harness
    }

    fn bag(&self) -> &DataBag {
        self.bag.as_ref().expect("bag is open until the journal is read")
    }

    fn checkpoint(&mut self) {
        let len = self.bag().engine().journal_size().expect("Failed to size journal");
        self.checkpoints.push((len, self.current.clone()));
    }

    /// Writes a value and records a checkpoint.
    pub fn set(&mut self, key: &str, value: Value) {
        self.bag().set(key, &value).expect("Failed to set value");
        self.current.insert(key.to_string(), value);
        self.checkpoint();
    }

    /// Deletes a key and records a checkpoint.
    pub fn delete(&mut self, key: &str) {
        self.bag().delete(key).expect("Failed to delete key");
        self.current.remove(key);
        self.checkpoint();
    }

    /// Closes the bag and returns the journal bytes.
    pub fn journal(&mut self) -> Vec<u8> {
        self.bag = None;
        let path = match &self.config.location {
            databag_core::Location::Path(path) => path.clone(),
            databag_core::Location::InMemory => unreachable!("harness bags are file-backed"),
        };
        std::fs::read(path).expect("Failed to read journal")
    }

    /// Reopens every prefix of the journal and compares against the
    /// checkpoints.
    pub fn check_every_prefix(&mut self) -> CrashRecoveryResult {
        let journal = self.journal();
        for cut in 0..=journal.len() {
            let expected = self
                .checkpoints
                .iter()
                .rev()
                .find(|(len, _)| *len <= cut as u64)
                .map(|(_, state)| state.clone())
                .unwrap_or_default();

            let recovered = match recover(&journal[..cut], &self.config) {
                Ok(state) => state,
                Err(e) => return CrashRecoveryResult::fail(cut, format!("prefix {cut}: {e}")),
            };
            if recovered != expected {
                return CrashRecoveryResult::fail(
                    cut,
                    format!("prefix {cut}: recovered {recovered:?}, expected {expected:?}"),
                );
            }
        }
        CrashRecoveryResult::pass(journal.len() + 1)
    }

    /// Path of the directory holding the journal.
    pub fn dir(&self) -> &std::path::Path {
        self.temp_dir.path()
    }
}

impl Default for CrashRecoveryHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Opens a bag over journal bytes and returns its current contents.
pub fn recover(journal: &[u8], config: &BagConfig) -> BagResult<BTreeMap<String, Value>> {
    let backend = InMemoryBackend::with_data(journal.to_vec());
    let engine = Arc::new(Engine::open(Box::new(backend), false)?);
    let bag = DataBag::with_engine(engine, config)?;
    bag.iterate()
        .map(|key| {
            let value = bag.get(&key)?;
            Ok::<_, BagError>((key, value))
        })
        .collect()
}

/// Returns a copy of the journal with one byte flipped.
pub fn corrupt_byte(journal: &[u8], offset: usize) -> Vec<u8> {
    let mut data = journal.to_vec();
    data[offset] ^= 0xFF;
    data
}
