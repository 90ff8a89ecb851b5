//! Test fixtures and bag helpers.
//!
//! Provides convenience functions for setting up test bags
//! and common test scenarios.

use databag_core::{BagConfig, DataBag, DocumentBag};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// File name used for journals inside fixture directories.
pub const JOURNAL_FILE: &str = "bag.db";

/// A test bag with automatic cleanup.
pub struct TestBag<B> {
    /// The bag instance.
    pub bag: B,
    /// The temporary directory (kept alive to prevent cleanup).
    temp_dir: Option<TempDir>,
}

impl<B> TestBag<B> {
    /// Returns the journal path if file-based, None if in-memory.
    pub fn path(&self) -> Option<PathBuf> {
        self.temp_dir.as_ref().map(|d| d.path().join(JOURNAL_FILE))
    }
}

impl TestBag<DataBag> {
    /// Creates a new in-memory key-value bag.
    pub fn memory() -> Self {
        Self {
            bag: DataBag::in_memory().expect("Failed to open in-memory bag"),
            temp_dir: None,
        }
    }

    /// Creates a new file-backed key-value bag.
    pub fn file(config: BagConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let bag = DataBag::open(file_config(temp_dir.path(), config))
            .expect("Failed to open file bag");
        Self {
            bag,
            temp_dir: Some(temp_dir),
        }
    }
}

impl TestBag<DocumentBag> {
    /// Creates a new in-memory document bag.
    pub fn memory_docs(config: BagConfig) -> Self {
        Self {
            bag: DocumentBag::open(config.in_memory()).expect("Failed to open in-memory bag"),
            temp_dir: None,
        }
    }

    /// Creates a new file-backed document bag.
    pub fn file_docs(config: BagConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let bag = DocumentBag::open(file_config(temp_dir.path(), config))
            .expect("Failed to open file bag");
        Self {
            bag,
            temp_dir: Some(temp_dir),
        }
    }
}

impl<B> std::ops::Deref for TestBag<B> {
    type Target = B;

    fn deref(&self) -> &Self::Target {
        &self.bag
    }
}

/// Points a configuration at a journal inside `dir`, without fsync.
pub fn file_config(dir: &Path, config: BagConfig) -> BagConfig {
    config.path(dir.join(JOURNAL_FILE)).sync_on_commit(false)
}

/// Random alphanumeric text, for values that should not compress.
pub fn noise(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Runs a test with a temporary in-memory key-value bag.
///
/// # Example
///
/// ```rust
/// use databag_testkit::with_temp_bag;
/// use databag_codec::Value;
///
/// with_temp_bag(|bag| {
///     bag.set("k", &Value::from(1)).unwrap();
///     assert!(bag.contains("k"));
/// });
/// ```
pub fn with_temp_bag<F, R>(f: F) -> R
where
    F: FnOnce(&DataBag) -> R,
{
    let test_bag = TestBag::memory();
    f(&test_bag.bag)
}

/// Runs a test with a temporary in-memory document bag.
pub fn with_temp_docs<F, R>(f: F) -> R
where
    F: FnOnce(&DocumentBag) -> R,
{
    let test_bag = TestBag::memory_docs(BagConfig::new());
    f(&test_bag.bag)
}

/// Runs a test with a file-backed bag, passing the journal path.
///
/// The bag is dropped before the directory, so the closure may reopen the
/// path after dropping its own handles.
pub fn with_file_bag<F, R>(config: BagConfig, f: F) -> R
where
    F: FnOnce(DataBag, &Path) -> R,
{
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = temp_dir.path().join(JOURNAL_FILE);
    let bag = DataBag::open(file_config(temp_dir.path(), config)).expect("Failed to open file bag");
    f(bag, &path)
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;
    use databag_codec::Value;

    /// Creates a document bag with `count` records `{"n": i, "parity": "even"|"odd"}`
    /// under keys `k000`, `k001`, ...
    pub fn populated_docs(count: usize, indexed: bool) -> TestBag<DocumentBag> {
        let mut config = BagConfig::new().table("populated");
        if indexed {
            config = config.index(["n"]).index(["parity"]);
        }
        let test_bag = TestBag::memory_docs(config);
        for i in 0..count {
            let parity = if i % 2 == 0 { "even" } else { "odd" };
            let record = Value::map([
                ("n", Value::from(i64::try_from(i).expect("count fits i64"))),
                ("parity", Value::from(parity)),
            ]);
            test_bag
                .bag
                .set(&format!("k{i:03}"), &record)
                .expect("Failed to set record");
        }
        test_bag
    }

    /// Creates a versioned bag holding `writes` successive values of `key`.
    pub fn rotated_bag(key: &str, writes: usize, history: u32) -> TestBag<DataBag> {
        let test_bag = TestBag {
            bag: DataBag::open(BagConfig::new().versioned(true).history(history))
                .expect("Failed to open bag"),
            temp_dir: None,
        };
        for i in 0..writes {
            test_bag
                .bag
                .set(key, &Value::from(format!("v{}", i + 1)))
                .expect("Failed to set value");
        }
        test_bag
    }
}
