//! Access path selection and execution.
//!
//! A query runs along one of three paths:
//!
//! - no predicates: every current record
//! - a covering index: the tightest index whose fields include every
//!   referenced column
//! - otherwise a full scan of current records
//!
//! Every path yields records most recent write first, and every path
//! compares through [`crate::index::Cell`], so adding or dropping an index
//! never changes which records match a fresh write.

use super::Query;
use crate::engine::{IndexRow, Tables};
use crate::error::{BagError, BagResult};
use crate::index::{Cell, IndexManager};
use crate::query::Operator;
use crate::store::DataBag;
use crate::types::{IndexRowId, SequenceNumber};
use databag_codec::Value;
use std::collections::HashSet;
use std::fmt;
use std::ops::Bound;
use tracing::debug;

static NULL_CELL: Cell = Cell::Null;

/// The access path chosen for a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    /// Every current record.
    All,
    /// Lookup through an index table.
    Index {
        /// Index table name.
        table: String,
        /// Indexed fields, leading column first.
        fields: Vec<String>,
    },
    /// Scan of every current record with per-record filtering.
    FullScan,
}

impl Plan {
    /// Chooses the access path for a query.
    #[must_use]
    pub fn choose(query: &Query, indexes: &IndexManager) -> Self {
        if query.is_empty() {
            return Plan::All;
        }
        match indexes.covering(&query.fields()) {
            Some(def) => Plan::Index {
                table: def.table_name(),
                fields: def.fields().to_vec(),
            },
            None => Plan::FullScan,
        }
    }

    /// Returns true if the plan reads an index.
    #[must_use]
    pub fn uses_index(&self) -> bool {
        matches!(self, Plan::Index { .. })
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Plan::All => f.write_str("all"),
            Plan::Index { table, .. } => write!(f, "index {table}"),
            Plan::FullScan => f.write_str("full scan"),
        }
    }
}

/// Plans and starts a query against a bag.
pub(crate) fn execute<'a>(
    bag: &'a DataBag,
    indexes: &IndexManager,
    query: Query,
) -> BagResult<Matches<'a>> {
    let plan = Plan::choose(&query, indexes);
    debug!(bag = bag.name(), %query, %plan, "query plan");

    let source = match &plan {
        Plan::All | Plan::FullScan => Source::Scan {
            query,
            cursor: None,
        },
        Plan::Index { table, .. } => {
            let keys = bag
                .engine()
                .read(|tables| index_lookup(bag, tables, table, &query))?;
            debug!(bag = bag.name(), table = %table, hits = keys.len(), "index lookup");
            Source::Keys(keys.into_iter())
        }
    };

    Ok(Matches {
        bag,
        source,
        done: false,
    })
}

/// Keys of current rows matched through an index, most recent write first.
fn index_lookup(
    bag: &DataBag,
    tables: &Tables,
    table_name: &str,
    query: &Query,
) -> BagResult<Vec<String>> {
    let primary = bag.table(tables)?;
    let index = tables.index(table_name).ok_or_else(|| {
        BagError::journal_corruption(format!("index table {table_name} is missing"))
    })?;

    let mut checks = Vec::with_capacity(query.predicates().len());
    for predicate in query.predicates() {
        let column = index
            .fields()
            .iter()
            .position(|f| *f == predicate.field)
            .ok_or_else(|| {
                BagError::journal_corruption(format!(
                    "index table {table_name} has no column {}",
                    predicate.field
                ))
            })?;
        checks.push((column, predicate.op, predicate.literal_cell()));
    }

    // A null literal matches nothing
    if checks.iter().any(|(_, _, literal)| literal.is_null()) {
        return Ok(Vec::new());
    }

    let leading = checks
        .iter()
        .find(|(column, op, _)| *column == 0 && *op != Operator::Ne);
    let candidates: Box<dyn Iterator<Item = (IndexRowId, &IndexRow)> + '_> = match leading {
        Some((_, op, literal)) => Box::new(index.leading_range(leading_bounds(*op, literal))),
        None => Box::new(index.rows()),
    };

    let mut seen = HashSet::new();
    let mut hits: Vec<(SequenceNumber, String)> = Vec::new();
    for (_, row) in candidates {
        let matched = checks
            .iter()
            .all(|(column, op, literal)| {
                row.cells
                    .get(*column)
                    .is_some_and(|cell| cell.satisfies(*op, literal))
            });
        if !matched || !seen.insert(row.key.as_str()) {
            continue;
        }
        if let Some(current) = primary.current(&row.key) {
            hits.push((current.seq, row.key.clone()));
        }
    }

    hits.sort_by(|a, b| b.0.cmp(&a.0));
    Ok(hits.into_iter().map(|(_, key)| key).collect())
}

/// Range of leading cells that can satisfy `cell <op> literal`.
///
/// Null cells never satisfy a comparison, so every range starts above
/// them. `literal` must not be null.
fn leading_bounds(op: Operator, literal: &Cell) -> (Bound<&Cell>, Bound<&Cell>) {
    match op {
        Operator::Eq => (Bound::Included(literal), Bound::Included(literal)),
        Operator::Gt => (Bound::Excluded(literal), Bound::Unbounded),
        Operator::Ge => (Bound::Included(literal), Bound::Unbounded),
        Operator::Lt => (Bound::Excluded(&NULL_CELL), Bound::Excluded(literal)),
        Operator::Le => (Bound::Excluded(&NULL_CELL), Bound::Included(literal)),
        Operator::Ne => (Bound::Excluded(&NULL_CELL), Bound::Unbounded),
    }
}

#[derive(Debug)]
enum Source {
    Keys(std::vec::IntoIter<String>),
    Scan {
        query: Query,
        cursor: Option<SequenceNumber>,
    },
}

/// Lazy query results as `(key, value)` pairs, most recent write first.
///
/// Rows are decoded one at a time as the iterator advances.
#[derive(Debug)]
pub struct Matches<'a> {
    bag: &'a DataBag,
    source: Source,
    done: bool,
}

impl Matches<'_> {
    fn next_keyed(&mut self) -> Option<BagResult<(String, Value)>> {
        let Source::Keys(keys) = &mut self.source else {
            return None;
        };
        for key in keys.by_ref() {
            let row = self.bag.engine().read(|tables| {
                tables
                    .bag(self.bag.name())
                    .and_then(|table| table.current(&key))
                    .cloned()
            });
            // Deleted since the lookup
            let Some(row) = row else { continue };
            return Some(row.decode().map(|value| (key, value)));
        }
        None
    }

    fn next_scanned(&mut self) -> Option<BagResult<(String, Value)>> {
        let Source::Scan { query, cursor } = &mut self.source else {
            return None;
        };
        loop {
            let step = self.bag.engine().read(|tables| {
                let table = tables.bag(self.bag.name())?;
                let (seq, key) = table.next_by_seq(*cursor, true)?;
                let row = table.current(key)?.clone();
                Some((seq, key.to_string(), row))
            });
            let (seq, key, row) = step?;
            *cursor = Some(seq);

            match row.decode() {
                Ok(value) if query.matches(&value) => return Some(Ok((key, value))),
                Ok(_) => {}
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

impl Iterator for Matches<'_> {
    type Item = BagResult<(String, Value)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let next = match self.source {
            Source::Keys(_) => self.next_keyed(),
            Source::Scan { .. } => self.next_scanned(),
        };
        if next.is_none() {
            self.done = true;
        }
        next
    }
}
