//! Index manager - per-bag index registry.
//!
//! The manager tracks which indexes are active for one bag, creates their
//! physical tables on demand, derives the index rows for each write, and
//! picks the index that covers a query.
//!
//! # Invariants
//!
//! - Every active definition has a physical table in the engine
//! - Index rows are only ever appended; rows left behind by overwrites and
//!   deletes are filtered out by the join against current primary rows
//! - A record that carries none of an index's fields gets no row in it

use super::IndexDefinition;
use crate::engine::Engine;
use crate::error::BagResult;
use crate::journal::Op;
use databag_codec::Value;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

/// Active indexes of one bag, keyed by table name.
#[derive(Debug)]
pub struct IndexManager {
    bag: String,
    active: RwLock<BTreeMap<String, IndexDefinition>>,
}

impl IndexManager {
    /// Creates an empty registry for a bag.
    pub fn new(bag: impl Into<String>) -> Self {
        Self {
            bag: bag.into(),
            active: RwLock::new(BTreeMap::new()),
        }
    }

    /// Bag this manager serves.
    #[must_use]
    pub fn bag(&self) -> &str {
        &self.bag
    }

    /// Activates an index, creating its table if it does not exist.
    ///
    /// Idempotent: ensuring an index that is already active, or whose table
    /// survives from an earlier session, changes nothing on disk. Existing
    /// records are not backfilled.
    ///
    /// # Errors
    ///
    /// Returns [`crate::BagError::InvalidConfig`] for an empty field set,
    /// an invalid name, or a table name already used by a different field
    /// set.
    pub fn ensure<I, S>(&self, engine: &Engine, fields: I) -> BagResult<IndexDefinition>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let def = IndexDefinition::new(&self.bag, fields)?;
        let table = def.table_name();

        if self.active.read().contains_key(&table) {
            return Ok(def);
        }

        let created = engine.ensure_index_table(&table, &self.bag, def.fields())?;
        if created {
            info!(
                bag = %self.bag,
                table = %table,
                secondary = %def.secondary_name(),
                "created index table"
            );
        }

        self.active.write().insert(table, def.clone());
        Ok(def)
    }

    /// Active definitions, ordered by table name.
    #[must_use]
    pub fn definitions(&self) -> Vec<IndexDefinition> {
        self.active.read().values().cloned().collect()
    }

    /// Number of active indexes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.active.read().len()
    }

    /// Returns true if no index is active.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.active.read().is_empty()
    }

    /// Picks the index covering every column.
    ///
    /// Among covering indexes the one with the fewest fields wins, ties
    /// broken by the smallest table name.
    #[must_use]
    pub fn covering(&self, columns: &BTreeSet<&str>) -> Option<IndexDefinition> {
        if columns.is_empty() {
            return None;
        }
        self.active
            .read()
            .iter()
            .filter(|(_, def)| def.covers(columns))
            .min_by(|(a_name, a), (b_name, b)| {
                a.fields()
                    .len()
                    .cmp(&b.fields().len())
                    .then_with(|| a_name.cmp(b_name))
            })
            .map(|(_, def)| def.clone())
    }

    /// Index rows to append for a record written under `key`.
    #[must_use]
    pub fn index_ops(&self, key: &str, record: &BTreeMap<String, Value>) -> Vec<Op> {
        self.active
            .read()
            .iter()
            .filter_map(|(table, def)| {
                def.cells(record).map(|cells| Op::InsertIndexRow {
                    table: table.clone(),
                    key: key.to_string(),
                    cells,
                })
            })
            .collect()
    }
}
