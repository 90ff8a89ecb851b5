//! Document bags: map-valued bags with secondary indexes and queries.

use crate::config::BagConfig;
use crate::engine::Engine;
use crate::error::{BagError, BagResult};
use crate::index::{IndexDefinition, IndexManager};
use crate::keygen::generate_key;
use crate::query::{self, Matches, Plan, Query, QueryArg};
use crate::store::{ByCreated, DataBag, Keys};
use chrono::{DateTime, Utc};
use databag_codec::Value;
use std::sync::Arc;
use tracing::debug;

/// A bag whose values are field-keyed maps.
///
/// Writes maintain every active index, and [`DocumentBag::find`] picks an
/// index or a full scan for each query.
///
/// # Example
///
/// ```rust
/// use databag_core::{BagConfig, DocumentBag, Field};
/// use databag_codec::Value;
///
/// let people = DocumentBag::open(BagConfig::new().table("people").index(["x", "y"]))?;
/// let small = people.add(&Value::map([("x", 10), ("y", 99)]))?;
/// let big = people.add(&Value::map([("x", 100), ("y", 999)]))?;
///
/// let (key, _) = people.find_one([Field::new("x").gt(50)])?.unwrap();
/// assert_eq!(key, big);
/// # let _ = small;
/// # Ok::<(), databag_core::BagError>(())
/// ```
///
/// The inner bag is not exposed; every write is type-checked and indexed.
///
/// ```compile_fail
/// use databag_core::DocumentBag;
/// use databag_codec::Value;
///
/// let docs = DocumentBag::in_memory().unwrap();
/// docs.bag().set("k", &Value::from(1)).unwrap();
/// ```
#[derive(Debug)]
pub struct DocumentBag {
    bag: DataBag,
    indexes: IndexManager,
}

impl DocumentBag {
    /// Opens a document bag on its own engine and ensures the configured
    /// indexes.
    pub fn open(config: BagConfig) -> BagResult<Self> {
        let bag = DataBag::open(config.clone())?;
        Self::from_bag(bag, &config)
    }

    /// Opens the default in-memory document bag.
    pub fn in_memory() -> BagResult<Self> {
        Self::open(BagConfig::new().in_memory())
    }

    /// Opens a document bag on an existing engine.
    pub fn with_engine(engine: Arc<Engine>, config: &BagConfig) -> BagResult<Self> {
        let bag = DataBag::with_engine(engine, config)?;
        Self::from_bag(bag, config)
    }

    fn from_bag(bag: DataBag, config: &BagConfig) -> BagResult<Self> {
        let indexes = IndexManager::new(bag.name());
        for fields in &config.indexes {
            indexes.ensure(bag.engine(), fields.iter().cloned())?;
        }
        Ok(Self { bag, indexes })
    }

    /// Bag name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.bag.name()
    }

    /// Activates an index over `fields`. See [`IndexManager::ensure`].
    pub fn ensure_index<I, S>(&self, fields: I) -> BagResult<IndexDefinition>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.indexes.ensure(self.bag.engine(), fields)
    }

    /// Active index definitions, ordered by table name.
    #[must_use]
    pub fn indexes(&self) -> Vec<IndexDefinition> {
        self.indexes.definitions()
    }

    /// Writes a record and its index rows.
    ///
    /// The primary write commits first, then the index rows as a separate
    /// commit.
    ///
    /// # Errors
    ///
    /// [`BagError::TypeMismatch`] if `record` is not a map.
    pub fn set(&self, key: &str, record: &Value) -> BagResult<()> {
        let fields = record
            .as_map()
            .ok_or_else(|| BagError::type_mismatch("map", record.type_name()))?;

        self.bag.set(key, record)?;

        let ops = self.indexes.index_ops(key, fields);
        if !ops.is_empty() {
            let rows = self.bag.engine().commit(|_| Ok(ops))?;
            debug!(bag = self.bag.name(), key, rows, "index rows");
        }
        Ok(())
    }

    /// Stores a record under a generated key and returns the key.
    pub fn add(&self, record: &Value) -> BagResult<String> {
        let key = generate_key();
        self.set(&key, record)?;
        Ok(key)
    }

    /// Current record of a key.
    pub fn get(&self, key: &str) -> BagResult<Value> {
        self.bag.get(key)
    }

    /// Record of a key at a version (0 or negative).
    pub fn get_version(&self, key: &str, version: i64) -> BagResult<Value> {
        self.bag.get_version(key, version)
    }

    /// Current record of a key, or `default`.
    pub fn get_or_default(&self, key: &str, default: Value) -> BagResult<Value> {
        self.bag.get_or_default(key, default)
    }

    /// Removes every version of a key. Index rows are left behind and never
    /// surface, since a deleted key has no current row to join.
    pub fn delete(&self, key: &str) -> BagResult<()> {
        self.bag.delete(key)
    }

    /// Returns true if the key has a current record.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.bag.contains(key)
    }

    /// Write time of the current record.
    pub fn when(&self, key: &str) -> BagResult<DateTime<Utc>> {
        self.bag.when(key)
    }

    /// Retained versions of a key, newest first.
    #[must_use]
    pub fn versions(&self, key: &str) -> Vec<i64> {
        self.bag.versions(key)
    }

    /// Number of current records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bag.len()
    }

    /// Returns true if there are no current records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bag.is_empty()
    }

    /// Current keys in ascending lexical order.
    #[must_use]
    pub fn iterate(&self) -> Keys<'_> {
        self.bag.iterate()
    }

    /// Current records in write order.
    #[must_use]
    pub fn by_created(&self, descending: bool) -> ByCreated<'_> {
        self.bag.by_created(descending)
    }

    /// Runs a query.
    ///
    /// Arguments are ANDed. With no arguments every current record matches.
    /// Results are lazy and most recent write first.
    ///
    /// # Errors
    ///
    /// [`BagError::QueryTypeError`] or [`BagError::UnsupportedOperator`] for
    /// malformed arguments.
    pub fn find<I, A>(&self, args: I) -> BagResult<Matches<'_>>
    where
        I: IntoIterator<Item = A>,
        A: Into<QueryArg>,
    {
        self.query(Query::parse(args)?)
    }

    /// Runs an already built query.
    pub fn query(&self, query: Query) -> BagResult<Matches<'_>> {
        query::execute(&self.bag, &self.indexes, query)
    }

    /// First match of a query, or `None`.
    pub fn find_one<I, A>(&self, args: I) -> BagResult<Option<(String, Value)>>
    where
        I: IntoIterator<Item = A>,
        A: Into<QueryArg>,
    {
        self.find(args)?.next().transpose()
    }

    /// Every current record, most recent write first.
    pub fn all(&self) -> BagResult<Matches<'_>> {
        self.query(Query::new())
    }

    /// The access path a query would take, without running it.
    pub fn explain<I, A>(&self, args: I) -> BagResult<Plan>
    where
        I: IntoIterator<Item = A>,
        A: Into<QueryArg>,
    {
        Ok(Plan::choose(&Query::parse(args)?, &self.indexes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Field;

    fn people() -> DocumentBag {
        DocumentBag::open(BagConfig::new().table("people")).unwrap()
    }

    fn keys(matches: Matches<'_>) -> Vec<String> {
        matches.map(|r| r.unwrap().0).collect()
    }

    fn no_args() -> Vec<QueryArg> {
        Vec::new()
    }

    #[test]
    fn non_map_records_are_rejected() {
        let bag = people();
        assert!(matches!(
            bag.set("k", &Value::from(5)),
            Err(BagError::TypeMismatch { ref expected, ref found })
                if expected == "map" && found == "integer"
        ));
        assert!(bag.is_empty());
    }

    #[test]
    fn indexed_lookups() {
        let bag = people();
        bag.ensure_index(["x", "y"]).unwrap();
        let small = bag.add(&Value::map([("x", 10), ("y", 99)])).unwrap();
        let big = bag.add(&Value::map([("x", 100), ("y", 999)])).unwrap();

        let (key, value) = bag.find_one([QueryArg::eq("x", 10)]).unwrap().unwrap();
        assert_eq!(key, small);
        assert_eq!(value, Value::map([("x", 10), ("y", 99)]));

        let sugar = Value::map([("x", Value::map([("$gt", 50)]))]);
        assert_eq!(keys(bag.find([sugar]).unwrap()), vec![big.clone()]);
        assert_eq!(keys(bag.find([Field::new("y").ge(99)]).unwrap()), vec![big, small]);
    }

    #[test]
    fn empty_query_returns_everything_newest_first() {
        let bag = people();
        let a = bag.add(&Value::map([("n", 1)])).unwrap();
        let b = bag.add(&Value::map([("n", 2)])).unwrap();
        bag.set(&a, &Value::map([("n", 3)])).unwrap();

        assert_eq!(keys(bag.find(no_args()).unwrap()), vec![a.clone(), b.clone()]);
        assert_eq!(keys(bag.all().unwrap()), vec![a, b]);
        assert_eq!(bag.explain(no_args()).unwrap(), Plan::All);
    }

    #[test]
    fn find_one_without_match_is_none() {
        let bag = people();
        bag.add(&Value::map([("n", 1)])).unwrap();
        assert_eq!(bag.find_one([QueryArg::eq("n", 2)]).unwrap(), None);
        assert_eq!(bag.find_one([QueryArg::eq("missing", 1)]).unwrap(), None);
    }

    #[test]
    fn plan_selection() {
        let bag = people();
        bag.ensure_index(["x", "y"]).unwrap();
        bag.ensure_index(["x"]).unwrap();

        assert_eq!(
            bag.explain([QueryArg::eq("x", 1)]).unwrap().to_string(),
            "index idx_people_x"
        );
        assert_eq!(
            bag.explain([Field::new("y").lt(3)]).unwrap().to_string(),
            "index idx_people_x_y"
        );
        // No partial use of an index
        assert_eq!(
            bag.explain([QueryArg::eq("x", 1), QueryArg::eq("z", 1)]).unwrap(),
            Plan::FullScan
        );
    }

    #[test]
    fn numeric_affinity_on_both_paths() {
        let bag = people();
        let num = bag.add(&Value::map([("v", 500)])).unwrap();
        let text = bag.add(&Value::map([("v", "500")])).unwrap();
        bag.add(&Value::map([("v", 9)])).unwrap();
        bag.add(&Value::map([("v", "abc")])).unwrap();

        let query = || [Field::new("v").gt(9).lt(1000)];
        let scanned = keys(bag.find(query()).unwrap());

        bag.ensure_index(["v"]).unwrap();
        // Re-add so the index has rows
        for key in bag.iterate().collect::<Vec<_>>() {
            let record = bag.get(&key).unwrap();
            bag.set(&key, &record).unwrap();
        }
        assert!(bag.explain(query()).unwrap().uses_index());
        let mut indexed = keys(bag.find(query()).unwrap());
        let mut scanned = scanned;
        indexed.sort();
        scanned.sort();
        assert_eq!(indexed, scanned);

        let mut expected = vec![num, text];
        expected.sort();
        assert_eq!(indexed, expected);
    }

    #[test]
    fn null_never_matches() {
        let bag = people();
        bag.ensure_index(["v"]).unwrap();
        bag.add(&Value::map([("v", Value::Null)])).unwrap();
        bag.add(&Value::map([("w", 1)])).unwrap();

        assert_eq!(bag.find([Field::new("v").ne(1)]).unwrap().count(), 0);
        assert_eq!(bag.find([QueryArg::eq("v", Value::Null)]).unwrap().count(), 0);
        assert_eq!(bag.find([Field::new("w").ne(Value::Null)]).unwrap().count(), 0);
    }

    #[test]
    fn deleted_records_do_not_surface() {
        let bag = people();
        bag.ensure_index(["x"]).unwrap();
        let key = bag.add(&Value::map([("x", 1)])).unwrap();
        bag.delete(&key).unwrap();
        assert_eq!(bag.find([QueryArg::eq("x", 1)]).unwrap().count(), 0);
    }

    #[test]
    fn overwrite_keeps_stale_index_rows() {
        let bag = people();
        bag.ensure_index(["x"]).unwrap();
        bag.set("k", &Value::map([("x", 1)])).unwrap();
        bag.set("k", &Value::map([("x", 2)])).unwrap();

        let old = keys(bag.find([QueryArg::eq("x", 1)]).unwrap());
        assert_eq!(old, vec!["k".to_string()]);
        let (_, value) = bag.find_one([QueryArg::eq("x", 2)]).unwrap().unwrap();
        assert_eq!(value, Value::map([("x", 2)]));

        // One hit per key even with several matching rows
        bag.set("k", &Value::map([("x", 1)])).unwrap();
        assert_eq!(bag.find([QueryArg::eq("x", 1)]).unwrap().count(), 1);
    }

    #[test]
    fn indexes_are_not_retroactive() {
        let bag = people();
        bag.add(&Value::map([("x", 1)])).unwrap();
        bag.ensure_index(["x"]).unwrap();
        assert_eq!(bag.find([QueryArg::eq("x", 1)]).unwrap().count(), 0);
    }

    #[test]
    fn configured_indexes_are_created_on_open() {
        let bag = DocumentBag::open(
            BagConfig::new()
                .table("cfg")
                .index(["b", "a"])
                .index(["c"]),
        )
        .unwrap();
        let names: Vec<String> = bag.indexes().iter().map(IndexDefinition::table_name).collect();
        assert_eq!(names, vec!["idx_cfg_a_b", "idx_cfg_c"]);
    }

    #[test]
    fn query_errors() {
        let bag = people();
        assert!(matches!(
            bag.find([Value::from(1)]),
            Err(BagError::QueryTypeError(_))
        ));
        assert!(matches!(
            bag.find_one([Value::map([("x", Value::map([("$in", 1)]))])]),
            Err(BagError::UnsupportedOperator(_))
        ));
    }

    #[test]
    fn query_is_lazy() {
        let bag = people();
        for n in 0..10 {
            bag.add(&Value::map([("n", n)])).unwrap();
        }
        let mut matches = bag.find([Field::new("n").ge(0)]).unwrap();
        assert!(matches.next().is_some());
        bag.add(&Value::map([("n", 99)])).unwrap();
        // Older rows are still reached after a concurrent write
        assert_eq!(matches.count(), 9);
    }
}
