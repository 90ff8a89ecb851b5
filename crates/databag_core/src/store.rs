//! Versioned key-value bags.

use crate::config::BagConfig;
use crate::engine::{Engine, Row, Table, Tables};
use crate::error::{BagError, BagResult};
use crate::journal::{Op, RowImage};
use crate::keygen::generate_key;
use crate::types::SequenceNumber;
use chrono::{DateTime, Utc};
use databag_codec::Value;
use std::sync::Arc;
use tracing::debug;

/// A named bag of values with optional version history.
///
/// Every key has at most one current value (version 0). When the bag is
/// versioned, each write moves the existing values one slot older (-1, -2,
/// ...) and drops whatever falls past `-history`.
///
/// # Example
///
/// ```rust
/// use databag_core::{BagConfig, DataBag};
/// use databag_codec::Value;
///
/// let bag = DataBag::open(BagConfig::new().versioned(true).history(2))?;
/// bag.set("blah", &Value::from("blip"))?;
/// bag.set("blah", &Value::from("blop"))?;
/// assert_eq!(bag.get("blah")?, Value::from("blop"));
/// assert_eq!(bag.get_version("blah", -1)?, Value::from("blip"));
/// # Ok::<(), databag_core::BagError>(())
/// ```
#[derive(Debug, Clone)]
pub struct DataBag {
    engine: Arc<Engine>,
    name: String,
    versioned: bool,
    history: u32,
}

impl DataBag {
    /// Opens a bag on its own engine at the configured location.
    pub fn open(config: BagConfig) -> BagResult<Self> {
        config.validate()?;
        let engine = Engine::open_location(&config.location, config.sync_on_commit)?;
        Self::with_engine(Arc::new(engine), &config)
    }

    /// Opens the default in-memory bag.
    pub fn in_memory() -> BagResult<Self> {
        Self::open(BagConfig::new().in_memory())
    }

    /// Opens a bag on an existing engine, creating its table if needed.
    ///
    /// The location and sync settings of `config` are ignored; they belong
    /// to the engine.
    pub fn with_engine(engine: Arc<Engine>, config: &BagConfig) -> BagResult<Self> {
        config.validate()?;
        engine.ensure_table(&config.table)?;
        Ok(Self {
            engine,
            name: config.table.clone(),
            versioned: config.versioned,
            history: config.history,
        })
    }

    /// Bag name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The engine hosting this bag.
    #[must_use]
    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Whether writes keep history.
    #[must_use]
    pub fn is_versioned(&self) -> bool {
        self.versioned
    }

    /// Deepest retained version is `-history`.
    #[must_use]
    pub fn history(&self) -> u32 {
        self.history
    }

    /// Returns the current value of a key.
    pub fn get(&self, key: &str) -> BagResult<Value> {
        self.get_version(key, 0)
    }

    /// Returns the value of a key at a version (0 or negative).
    ///
    /// # Errors
    ///
    /// [`BagError::InvalidVersion`] for positive versions,
    /// [`BagError::NotFound`] if no row exists at that version.
    pub fn get_version(&self, key: &str, version: i64) -> BagResult<Value> {
        check_version(version)?;
        let row: Option<Row> = self
            .engine
            .read(|tables| Ok::<_, BagError>(self.table(tables)?.get(key, version).cloned()))?;
        let row = row.ok_or_else(|| BagError::not_found(key, version))?;
        row.decode()
    }

    /// Returns the current value of a key, or `default` if it has none.
    pub fn get_or_default(&self, key: &str, default: Value) -> BagResult<Value> {
        self.get_version_or_default(key, default, 0)
    }

    /// Returns the value at a version, or `default` if there is no row.
    ///
    /// Positive versions still fail with [`BagError::InvalidVersion`].
    pub fn get_version_or_default(
        &self,
        key: &str,
        default: Value,
        version: i64,
    ) -> BagResult<Value> {
        match self.get_version(key, version) {
            Err(BagError::NotFound { .. }) => Ok(default),
            other => other,
        }
    }

    /// Writes a value as the current version of a key.
    ///
    /// Ageing, pruning and the insert commit as one unit.
    pub fn set(&self, key: &str, value: &Value) -> BagResult<()> {
        let payload = databag_codec::encode(value)?;
        let row = RowImage {
            payload: payload.bytes,
            is_json: payload.is_json,
            is_compressed: payload.is_compressed,
            created_at: Utc::now(),
        };
        let ops = self
            .engine
            .commit(|tables| self.write_ops(tables, key, row))?;
        debug!(bag = %self.name, key, ops, "set");
        Ok(())
    }

    /// Stores a value under a freshly generated key and returns the key.
    pub fn add(&self, value: &Value) -> BagResult<String> {
        let key = generate_key();
        self.set(&key, value)?;
        Ok(key)
    }

    /// Removes every version of a key.
    ///
    /// # Errors
    ///
    /// [`BagError::NotFound`] if the key has no current value.
    pub fn delete(&self, key: &str) -> BagResult<()> {
        self.engine.commit(|tables| {
            if !self.table(tables)?.contains(key) {
                return Err(BagError::not_found(key, 0));
            }
            Ok(vec![Op::DeleteKey {
                bag: self.name.clone(),
                key: key.to_string(),
            }])
        })?;
        debug!(bag = %self.name, key, "delete");
        Ok(())
    }

    /// Write time of the current value of a key.
    pub fn when(&self, key: &str) -> BagResult<DateTime<Utc>> {
        self.engine
            .read(|tables| {
                Ok::<_, BagError>(self.table(tables)?.current(key).map(|row| row.created_at))
            })?
            .ok_or_else(|| BagError::not_found(key, 0))
    }

    /// Returns true if the key has a current value.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.engine.read(|tables| {
            tables
                .bag(&self.name)
                .is_some_and(|table| table.contains(key))
        })
    }

    /// Retained versions of a key, newest first. Empty if absent.
    #[must_use]
    pub fn versions(&self, key: &str) -> Vec<i64> {
        self.engine.read(|tables| {
            tables
                .bag(&self.name)
                .map(|table| table.versions(key))
                .unwrap_or_default()
        })
    }

    /// Stored size in bytes of the current value of a key.
    pub fn stored_len(&self, key: &str) -> BagResult<usize> {
        self.engine
            .read(|tables| {
                Ok::<_, BagError>(self.table(tables)?.current(key).map(|row| row.payload.len()))
            })?
            .ok_or_else(|| BagError::not_found(key, 0))
    }

    /// Number of keys with a current value.
    #[must_use]
    pub fn len(&self) -> usize {
        self.engine
            .read(|tables| tables.bag(&self.name).map_or(0, |table| table.len()))
    }

    /// Returns true if no key has a current value.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current keys in ascending lexical order.
    ///
    /// Lazy: each step reads the next key after the previous one, so writes
    /// made during iteration may or may not be seen.
    #[must_use]
    pub fn iterate(&self) -> Keys<'_> {
        Keys {
            bag: self,
            cursor: None,
            done: false,
        }
    }

    /// Current `(key, value)` pairs in write order, oldest first unless
    /// `descending`.
    #[must_use]
    pub fn by_created(&self, descending: bool) -> ByCreated<'_> {
        ByCreated {
            bag: self,
            cursor: None,
            descending,
            done: false,
        }
    }

    pub(crate) fn table<'t>(&self, tables: &'t Tables) -> BagResult<&'t Table> {
        tables
            .bag(&self.name)
            .ok_or_else(|| BagError::journal_corruption(format!("missing table {}", self.name)))
    }

    fn write_ops(&self, tables: &Tables, key: &str, row: RowImage) -> BagResult<Vec<Op>> {
        let table = self.table(tables)?;
        let mut ops = Vec::new();

        if self.versioned {
            let floor = -i64::from(self.history);
            // Oldest first, so every move lands on a slot that is already free
            for version in table.versions(key).into_iter().rev() {
                let aged = version - 1;
                if aged < floor {
                    ops.push(Op::DeleteRow {
                        bag: self.name.clone(),
                        key: key.to_string(),
                        version,
                    });
                } else {
                    ops.push(Op::Reversion {
                        bag: self.name.clone(),
                        key: key.to_string(),
                        from: version,
                        to: aged,
                    });
                }
            }
        } else if table.get(key, 0).is_some() {
            ops.push(Op::DeleteRow {
                bag: self.name.clone(),
                key: key.to_string(),
                version: 0,
            });
        }

        ops.push(Op::InsertRow {
            bag: self.name.clone(),
            key: key.to_string(),
            version: 0,
            row,
        });
        Ok(ops)
    }
}

fn check_version(version: i64) -> BagResult<()> {
    if version > 0 {
        return Err(BagError::InvalidVersion(version));
    }
    Ok(())
}

/// Lazy iterator over current keys. See [`DataBag::iterate`].
#[derive(Debug)]
pub struct Keys<'a> {
    bag: &'a DataBag,
    cursor: Option<String>,
    done: bool,
}

impl Iterator for Keys<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.done {
            return None;
        }
        let next = self.bag.engine.read(|tables| {
            tables
                .bag(&self.bag.name)
                .and_then(|table| table.next_key(self.cursor.as_deref()))
                .map(str::to_string)
        });
        match next {
            Some(key) => {
                self.cursor = Some(key.clone());
                Some(key)
            }
            None => {
                self.done = true;
                None
            }
        }
    }
}

/// Lazy iterator over current rows in write order. See
/// [`DataBag::by_created`].
#[derive(Debug)]
pub struct ByCreated<'a> {
    bag: &'a DataBag,
    cursor: Option<SequenceNumber>,
    descending: bool,
    done: bool,
}

impl Iterator for ByCreated<'_> {
    type Item = BagResult<(String, Value)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let next = self.bag.engine.read(|tables| {
            let table = tables.bag(&self.bag.name)?;
            let (seq, key) = table.next_by_seq(self.cursor, self.descending)?;
            let row = table.current(key)?.clone();
            Some((seq, key.to_string(), row))
        });
        match next {
            Some((seq, key, row)) => {
                self.cursor = Some(seq);
                Some(row.decode().map(|value| (key, value)))
            }
            None => {
                self.done = true;
                None
            }
        }
    }
}
