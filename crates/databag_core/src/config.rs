//! Bag configuration.

use crate::error::{BagError, BagResult};
use std::path::PathBuf;

/// Default bag name.
pub const DEFAULT_TABLE: &str = "databag";

/// Default number of historical versions kept per key.
pub const DEFAULT_HISTORY: u32 = 10;

/// Where a bag's journal lives.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Location {
    /// Nothing is persisted; the bag disappears when dropped.
    #[default]
    InMemory,
    /// A journal file, created if missing and locked while open.
    Path(PathBuf),
}

/// Configuration for opening a bag.
#[derive(Debug, Clone)]
pub struct BagConfig {
    /// Storage location.
    pub location: Location,

    /// Bag (table) name. Several bags can share one journal.
    pub table: String,

    /// Whether writes keep previous values as negative versions.
    pub versioned: bool,

    /// Deepest retained version is `-history`.
    pub history: u32,

    /// Field sets indexed on open. Only used by document bags.
    pub indexes: Vec<Vec<String>>,

    /// Whether to fsync the journal on every commit.
    pub sync_on_commit: bool,
}

impl Default for BagConfig {
    fn default() -> Self {
        Self {
            location: Location::InMemory,
            table: DEFAULT_TABLE.to_string(),
            versioned: false,
            history: DEFAULT_HISTORY,
            indexes: Vec::new(),
            sync_on_commit: true,
        }
    }
}

impl BagConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps the bag in memory.
    #[must_use]
    pub fn in_memory(mut self) -> Self {
        self.location = Location::InMemory;
        self
    }

    /// Persists the bag to a journal file.
    #[must_use]
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.location = Location::Path(path.into());
        self
    }

    /// Sets the bag name.
    #[must_use]
    pub fn table(mut self, name: impl Into<String>) -> Self {
        self.table = name.into();
        self
    }

    /// Enables or disables version history.
    #[must_use]
    pub const fn versioned(mut self, value: bool) -> Self {
        self.versioned = value;
        self
    }

    /// Sets the history depth.
    #[must_use]
    pub const fn history(mut self, depth: u32) -> Self {
        self.history = depth;
        self
    }

    /// Adds a field set to index on open.
    #[must_use]
    pub fn index<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.indexes.push(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Sets whether to fsync the journal on every commit.
    #[must_use]
    pub const fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }

    /// Checks names before anything touches storage.
    pub fn validate(&self) -> BagResult<()> {
        validate_name("bag name", &self.table)?;
        for fields in &self.indexes {
            if fields.is_empty() {
                return Err(BagError::invalid_config("index needs at least one field"));
            }
            for field in fields {
                validate_name("field name", field)?;
            }
        }
        Ok(())
    }
}

/// Rejects empty names and names containing NUL.
pub fn validate_name(what: &str, name: &str) -> BagResult<()> {
    if name.is_empty() {
        return Err(BagError::invalid_config(format!("{what} must not be empty")));
    }
    if name.contains('\0') {
        return Err(BagError::invalid_config(format!(
            "{what} {name:?} must not contain NUL"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = BagConfig::default();
        assert_eq!(config.location, Location::InMemory);
        assert_eq!(config.table, "databag");
        assert!(!config.versioned);
        assert_eq!(config.history, 10);
        assert!(config.indexes.is_empty());
        assert!(config.sync_on_commit);
    }

    #[test]
    fn builder_pattern() {
        let config = BagConfig::new()
            .path("/tmp/bag.db")
            .table("people")
            .versioned(true)
            .history(2)
            .index(["y", "x"])
            .sync_on_commit(false);

        assert_eq!(config.location, Location::Path("/tmp/bag.db".into()));
        assert_eq!(config.table, "people");
        assert!(config.versioned);
        assert_eq!(config.history, 2);
        assert_eq!(config.indexes, vec![vec!["y".to_string(), "x".to_string()]]);
        assert!(!config.sync_on_commit);
    }

    #[test]
    fn rejects_bad_names() {
        assert!(BagConfig::new().table("").validate().is_err());
        assert!(BagConfig::new().table("a\0b").validate().is_err());
        assert!(BagConfig::new().index([""]).validate().is_err());
        assert!(BagConfig::new().index(Vec::<String>::new()).validate().is_err());
        assert!(BagConfig::new().index(["x"]).validate().is_ok());
    }
}
