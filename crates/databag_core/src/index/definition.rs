//! Index definitions and table naming.

use super::Cell;
use crate::config::validate_name;
use crate::error::{BagError, BagResult};
use databag_codec::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A composite index over a set of fields of one bag.
///
/// Fields are stored sorted and deduplicated, so `{"b", "a"}` and
/// `{"a", "b", "a"}` define the same index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexDefinition {
    bag: String,
    fields: Vec<String>,
}

impl IndexDefinition {
    /// Creates a definition.
    ///
    /// # Errors
    ///
    /// Returns [`BagError::InvalidConfig`] if the field set is empty or a
    /// name is invalid.
    pub fn new<I, S>(bag: &str, fields: I) -> BagResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        validate_name("bag", bag)?;
        let fields: BTreeSet<String> = fields.into_iter().map(Into::into).collect();
        if fields.is_empty() {
            return Err(BagError::invalid_config("an index needs at least one field"));
        }
        for field in &fields {
            validate_name("field", field)?;
        }
        Ok(Self {
            bag: bag.to_string(),
            fields: fields.into_iter().collect(),
        })
    }

    /// Owning bag.
    #[must_use]
    pub fn bag(&self) -> &str {
        &self.bag
    }

    /// Sorted field list. The first field is the leading column.
    #[must_use]
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Physical table name: `idx_{bag}_{fields joined by "_"}`.
    #[must_use]
    pub fn table_name(&self) -> String {
        format!("idx_{}_{}", self.bag, self.fields.join("_"))
    }

    /// Name of the secondary lookup structure over the table.
    #[must_use]
    pub fn secondary_name(&self) -> String {
        format!("i_{}", self.table_name())
    }

    /// Whether every column is one of this index's fields.
    #[must_use]
    pub fn covers(&self, columns: &BTreeSet<&str>) -> bool {
        columns
            .iter()
            .all(|c| self.fields.iter().any(|f| f == c))
    }

    /// Index cells for a record, or `None` if the record has none of the
    /// indexed fields. Missing fields become null cells.
    #[must_use]
    pub fn cells(&self, record: &BTreeMap<String, Value>) -> Option<Vec<Cell>> {
        if !self.fields.iter().any(|f| record.contains_key(f)) {
            return None;
        }
        Some(
            self.fields
                .iter()
                .map(|f| record.get(f).map_or(Cell::Null, Cell::from_value))
                .collect(),
        )
    }
}

impl fmt::Display for IndexDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.bag, self.fields.join(", "))
    }
}
