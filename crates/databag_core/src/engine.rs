//! Embedded table engine.
//!
//! The engine owns one journal and the in-memory tables rebuilt from it. A
//! single engine can host several bags and their index tables.
//!
//! ## Tables
//!
//! - A primary table per bag, ordered by `(key, version)`, plus a map of the
//!   current (version 0) rows keyed by write sequence.
//! - An index table per index, holding id-ordered rows and an ordered map
//!   from leading-column cell to row ids.
//!
//! ## Commits
//!
//! Callers build a batch of [`Op`]s against a consistent view of the tables
//! while the engine lock is held. The batch is journaled first and then
//! applied, so replay after a restart reproduces the same state, including
//! write sequences and index row ids.

use crate::config::Location;
use crate::error::{BagError, BagResult};
use crate::index::Cell;
use crate::journal::{Journal, JournalRecord, Op, RowImage};
use crate::types::{IndexRowId, SequenceNumber};
use chrono::{DateTime, Utc};
use databag_codec::Value;
use databag_storage::{FileBackend, InMemoryBackend, StorageBackend};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use tracing::{debug, info};

/// A stored primary row.
#[derive(Debug, Clone)]
pub struct Row {
    /// Encoded payload bytes.
    pub payload: Vec<u8>,
    /// Payload is JSON text.
    pub is_json: bool,
    /// Payload is compressed.
    pub is_compressed: bool,
    /// Write timestamp.
    pub created_at: DateTime<Utc>,
    /// Write sequence, assigned when the row was inserted.
    pub seq: SequenceNumber,
}

impl Row {
    /// Decodes the payload.
    pub fn decode(&self) -> BagResult<Value> {
        Ok(databag_codec::decode(
            &self.payload,
            self.is_json,
            self.is_compressed,
        )?)
    }
}

/// Primary table of one bag.
#[derive(Debug, Default)]
pub struct Table {
    rows: BTreeMap<(String, i64), Row>,
    /// Current key -> sequence of its version 0 row.
    heads: BTreeMap<String, SequenceNumber>,
    /// Sequence -> key, for current rows only.
    by_seq: BTreeMap<SequenceNumber, String>,
}

impl Table {
    /// Returns the row at `(key, version)`.
    #[must_use]
    pub fn get(&self, key: &str, version: i64) -> Option<&Row> {
        self.rows.get(&(key.to_string(), version))
    }

    /// Returns the current row of a key.
    #[must_use]
    pub fn current(&self, key: &str) -> Option<&Row> {
        if self.heads.contains_key(key) {
            self.get(key, 0)
        } else {
            None
        }
    }

    /// Returns true if the key has a current row.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.heads.contains_key(key)
    }

    /// Retained versions of a key, newest first.
    #[must_use]
    pub fn versions(&self, key: &str) -> Vec<i64> {
        let start = (key.to_string(), i64::MIN);
        let end = (key.to_string(), i64::MAX);
        self.rows
            .range(start..=end)
            .rev()
            .map(|((_, version), _)| *version)
            .collect()
    }

    /// Number of current keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.heads.len()
    }

    /// Returns true if no key has a current row.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heads.is_empty()
    }

    /// First current key strictly after `after`, in lexical order.
    #[must_use]
    pub fn next_key(&self, after: Option<&str>) -> Option<&str> {
        let lower = after.map_or(Bound::Unbounded, Bound::Excluded);
        self.heads
            .range::<str, _>((lower, Bound::Unbounded))
            .next()
            .map(|(key, _)| key.as_str())
    }

    /// Next current row in write order, strictly past `after`.
    #[must_use]
    pub fn next_by_seq(
        &self,
        after: Option<SequenceNumber>,
        descending: bool,
    ) -> Option<(SequenceNumber, &str)> {
        let entry = if descending {
            let upper = after.map_or(Bound::Unbounded, Bound::Excluded);
            self.by_seq.range((Bound::Unbounded, upper)).next_back()
        } else {
            let lower = after.map_or(Bound::Unbounded, Bound::Excluded);
            self.by_seq.range((lower, Bound::Unbounded)).next()
        };
        entry.map(|(seq, key)| (*seq, key.as_str()))
    }

    fn insert(&mut self, key: &str, version: i64, row: Row) -> BagResult<()> {
        let slot = (key.to_string(), version);
        if self.rows.contains_key(&slot) {
            return Err(BagError::journal_corruption(format!(
                "duplicate row {key:?} at version {version}"
            )));
        }
        if version == 0 {
            self.heads.insert(key.to_string(), row.seq);
            self.by_seq.insert(row.seq, key.to_string());
        }
        self.rows.insert(slot, row);
        Ok(())
    }

    fn remove(&mut self, key: &str, version: i64) -> BagResult<Row> {
        let row = self
            .rows
            .remove(&(key.to_string(), version))
            .ok_or_else(|| {
                BagError::journal_corruption(format!("missing row {key:?} at version {version}"))
            })?;
        if version == 0 {
            self.heads.remove(key);
            self.by_seq.remove(&row.seq);
        }
        Ok(row)
    }

    fn remove_key(&mut self, key: &str) {
        for version in self.versions(key) {
            self.rows.remove(&(key.to_string(), version));
        }
        if let Some(seq) = self.heads.remove(key) {
            self.by_seq.remove(&seq);
        }
    }
}

/// One row of an index table.
#[derive(Debug, Clone)]
pub struct IndexRow {
    /// Key of the indexed primary row.
    pub key: String,
    /// One cell per indexed field.
    pub cells: Vec<Cell>,
}

/// Physical index table.
#[derive(Debug)]
pub struct IndexTable {
    bag: String,
    fields: Vec<String>,
    rows: BTreeMap<IndexRowId, IndexRow>,
    leading: BTreeMap<Cell, Vec<IndexRowId>>,
    next_id: IndexRowId,
}

impl IndexTable {
    fn new(bag: String, fields: Vec<String>) -> Self {
        Self {
            bag,
            fields,
            rows: BTreeMap::new(),
            leading: BTreeMap::new(),
            next_id: IndexRowId(1),
        }
    }

    /// Bag this index belongs to.
    #[must_use]
    pub fn bag(&self) -> &str {
        &self.bag
    }

    /// Indexed fields, in column order.
    #[must_use]
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Number of index rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// All rows in id order.
    pub fn rows(&self) -> impl Iterator<Item = (IndexRowId, &IndexRow)> {
        self.rows.iter().map(|(id, row)| (*id, row))
    }

    /// Rows whose leading cell falls in the range, in id order.
    pub fn leading_range(
        &self,
        range: (Bound<&Cell>, Bound<&Cell>),
    ) -> impl Iterator<Item = (IndexRowId, &IndexRow)> {
        let mut ids: Vec<IndexRowId> = self
            .leading
            .range(range)
            .flat_map(|(_, ids)| ids.iter().copied())
            .collect();
        ids.sort_unstable();
        ids.into_iter()
            .filter_map(|id| self.rows.get(&id).map(|row| (id, row)))
    }

    fn insert(&mut self, key: &str, cells: Vec<Cell>) -> BagResult<IndexRowId> {
        if cells.len() != self.fields.len() {
            return Err(BagError::journal_corruption(format!(
                "index row has {} cells for {} fields",
                cells.len(),
                self.fields.len()
            )));
        }
        let id = self.next_id;
        self.next_id = id.next();
        let lead = cells.first().cloned().unwrap_or(Cell::Null);
        self.leading.entry(lead).or_default().push(id);
        self.rows.insert(
            id,
            IndexRow {
                key: key.to_string(),
                cells,
            },
        );
        Ok(id)
    }
}

/// All tables hosted by an engine.
#[derive(Debug, Default)]
pub struct Tables {
    bags: HashMap<String, Table>,
    indexes: BTreeMap<String, IndexTable>,
    next_seq: SequenceNumber,
}

impl Tables {
    /// Returns a bag's primary table.
    #[must_use]
    pub fn bag(&self, name: &str) -> Option<&Table> {
        self.bags.get(name)
    }

    /// Returns an index table by name.
    #[must_use]
    pub fn index(&self, name: &str) -> Option<&IndexTable> {
        self.indexes.get(name)
    }

    /// Names of the index tables belonging to a bag.
    #[must_use]
    pub fn index_names(&self, bag: &str) -> Vec<String> {
        self.indexes
            .iter()
            .filter(|(_, table)| table.bag == bag)
            .map(|(name, _)| name.clone())
            .collect()
    }

    fn bag_mut(&mut self, name: &str) -> BagResult<&mut Table> {
        self.bags
            .get_mut(name)
            .ok_or_else(|| BagError::journal_corruption(format!("unknown bag {name:?}")))
    }

    fn apply(&mut self, record: &JournalRecord) -> BagResult<()> {
        match record {
            JournalRecord::CreateTable { bag } => {
                self.bags.entry(bag.clone()).or_default();
            }
            JournalRecord::CreateIndexTable { name, bag, fields } => {
                if let Some(existing) = self.indexes.get(name) {
                    if existing.fields != *fields {
                        return Err(BagError::journal_corruption(format!(
                            "index table {name} recreated with different fields"
                        )));
                    }
                } else {
                    self.indexes
                        .insert(name.clone(), IndexTable::new(bag.clone(), fields.clone()));
                }
            }
            JournalRecord::Commit { ops } => {
                for op in ops {
                    self.apply_op(op)?;
                }
            }
        }
        Ok(())
    }

    fn apply_op(&mut self, op: &Op) -> BagResult<()> {
        match op {
            Op::InsertRow {
                bag,
                key,
                version,
                row,
            } => {
                let seq = self.next_seq;
                self.next_seq = seq.next();
                let RowImage {
                    payload,
                    is_json,
                    is_compressed,
                    created_at,
                } = row.clone();
                self.bag_mut(bag)?.insert(
                    key,
                    *version,
                    Row {
                        payload,
                        is_json,
                        is_compressed,
                        created_at,
                        seq,
                    },
                )?;
            }
            Op::DeleteRow { bag, key, version } => {
                self.bag_mut(bag)?.remove(key, *version)?;
            }
            Op::Reversion { bag, key, from, to } => {
                let table = self.bag_mut(bag)?;
                let row = table.remove(key, *from)?;
                table.insert(key, *to, row)?;
            }
            Op::DeleteKey { bag, key } => {
                self.bag_mut(bag)?.remove_key(key);
            }
            Op::InsertIndexRow { table, key, cells } => {
                self.indexes
                    .get_mut(table)
                    .ok_or_else(|| {
                        BagError::journal_corruption(format!("unknown index table {table:?}"))
                    })?
                    .insert(key, cells.clone())?;
            }
        }
        Ok(())
    }
}

struct EngineState {
    journal: Journal,
    tables: Tables,
}

impl EngineState {
    /// Writes a record, applies it, then flushes.
    ///
    /// Memory always matches the journal: a record that fails to apply is
    /// rolled back out of the journal, and a flush or sync failure is
    /// reported only after the written record has been applied.
    fn log(&mut self, record: &JournalRecord) -> BagResult<u64> {
        let offset = self.journal.write(record)?;
        if let Err(e) = self.tables.apply(record) {
            self.journal.rollback(offset)?;
            return Err(e);
        }
        self.journal.persist()?;
        Ok(offset)
    }
}

/// Journal-backed table engine shared by bag handles.
pub struct Engine {
    state: Mutex<EngineState>,
}

impl Engine {
    /// Opens an engine over a backend, replaying its journal.
    pub fn open(backend: Box<dyn StorageBackend>, sync_on_commit: bool) -> BagResult<Self> {
        let mut journal = Journal::new(backend, sync_on_commit);
        let records = journal.replay()?;

        let mut tables = Tables::default();
        for record in &records {
            tables.apply(record)?;
        }

        info!(
            records = records.len(),
            bags = tables.bags.len(),
            indexes = tables.indexes.len(),
            "engine replayed journal"
        );

        Ok(Self {
            state: Mutex::new(EngineState { journal, tables }),
        })
    }

    /// Opens an engine at a configured location.
    ///
    /// A file location is created if missing and locked for the lifetime of
    /// the engine.
    pub fn open_location(location: &Location, sync_on_commit: bool) -> BagResult<Self> {
        match location {
            Location::InMemory => Self::open(Box::new(InMemoryBackend::new()), sync_on_commit),
            Location::Path(path) => {
                info!(path = %path.display(), "opening bag file");
                let backend = FileBackend::open_with_create_dirs(path)?;
                Self::open(Box::new(backend), sync_on_commit)
            }
        }
    }

    /// Opens an empty in-memory engine.
    pub fn in_memory() -> BagResult<Self> {
        Self::open(Box::new(InMemoryBackend::new()), false)
    }

    /// Creates a bag's primary table if it does not exist.
    ///
    /// Returns true if the table was created.
    pub fn ensure_table(&self, bag: &str) -> BagResult<bool> {
        let mut state = self.state.lock();
        if state.tables.bags.contains_key(bag) {
            return Ok(false);
        }
        let record = JournalRecord::CreateTable {
            bag: bag.to_string(),
        };
        state.log(&record)?;
        info!(bag, "created table");
        Ok(true)
    }

    /// Creates an index table if it does not exist.
    ///
    /// Returns true if the table was created. Fails if a table with the
    /// same name already exists over different fields.
    pub fn ensure_index_table(&self, name: &str, bag: &str, fields: &[String]) -> BagResult<bool> {
        let mut state = self.state.lock();
        if let Some(existing) = state.tables.indexes.get(name) {
            if existing.fields != fields || existing.bag != bag {
                return Err(BagError::invalid_config(format!(
                    "index table {name} already exists over fields {:?} of bag {}",
                    existing.fields, existing.bag
                )));
            }
            return Ok(false);
        }
        let record = JournalRecord::CreateIndexTable {
            name: name.to_string(),
            bag: bag.to_string(),
            fields: fields.to_vec(),
        };
        state.log(&record)?;
        info!(bag, index = name, ?fields, "created index table");
        Ok(true)
    }

    /// Runs a read against a consistent view of the tables.
    pub fn read<R>(&self, f: impl FnOnce(&Tables) -> R) -> R {
        let state = self.state.lock();
        f(&state.tables)
    }

    /// Builds a batch of operations and commits it as one journal record.
    ///
    /// `build` sees the tables as of the commit; no other writer can run
    /// between building and applying. An empty batch writes nothing.
    ///
    /// A flush or sync error is returned after the batch is already
    /// journaled and visible; it will replay on the next open.
    ///
    /// Returns the number of operations committed.
    pub fn commit<F>(&self, build: F) -> BagResult<usize>
    where
        F: FnOnce(&Tables) -> BagResult<Vec<Op>>,
    {
        let mut state = self.state.lock();
        let ops = build(&state.tables)?;
        if ops.is_empty() {
            return Ok(0);
        }
        let count = ops.len();
        let record = JournalRecord::Commit { ops };
        let offset = state.log(&record)?;
        debug!(offset, ops = count, "committed");
        Ok(count)
    }

    /// Current journal size in bytes.
    pub fn journal_size(&self) -> BagResult<u64> {
        self.state.lock().journal.size()
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Engine")
            .field("bags", &state.tables.bags.len())
            .field("indexes", &state.tables.indexes.len())
            .finish()
    }
}
