//! Cross-crate integration test helpers.
//!
//! Provides a harness that mirrors every write to a document bag into a
//! plain map, so reads and queries can be checked against a model.

use databag_codec::Value;
use databag_core::{BagConfig, DocumentBag, Engine, Query, QueryArg};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A test harness for integration testing.
///
/// Holds two bags on one engine: `indexed` carries the indexes under test,
/// `plain` has none. Every write goes to both.
pub struct IntegrationHarness {
    /// Bag with indexes.
    pub indexed: DocumentBag,
    /// Bag without indexes, answered by full scans.
    pub plain: DocumentBag,
    /// Current records by key.
    records: BTreeMap<String, Value>,
}

impl IntegrationHarness {
    /// Creates a harness with an index on each field set.
    pub fn new(indexes: &[&[&str]]) -> Self {
        let engine = Arc::new(Engine::in_memory().expect("Failed to open engine"));
        let mut config = BagConfig::new().table("indexed");
        for fields in indexes {
            config = config.index(fields.iter().copied());
        }
        Self {
            indexed: DocumentBag::with_engine(engine.clone(), &config)
                .expect("Failed to open indexed bag"),
            plain: DocumentBag::with_engine(engine, &BagConfig::new().table("plain"))
                .expect("Failed to open plain bag"),
            records: BTreeMap::new(),
        }
    }

    /// Writes a record to both bags and tracks it.
    pub fn set(&mut self, key: &str, record: Value) {
        self.indexed.set(key, &record).expect("Failed to set record");
        self.plain.set(key, &record).expect("Failed to set record");
        self.records.insert(key.to_string(), record);
    }

    /// Deletes a record from both bags and updates tracking.
    pub fn delete(&mut self, key: &str) {
        self.indexed.delete(key).expect("Failed to delete record");
        self.plain.delete(key).expect("Failed to delete record");
        self.records.remove(key);
    }

    /// Verifies all tracked records are in both bags, and nothing else.
    pub fn verify_all(&self) {
        for bag in [&self.indexed, &self.plain] {
            assert_eq!(bag.len(), self.records.len(), "record count mismatch in {}", bag.name());
            for (key, expected) in &self.records {
                let actual = bag.get(key).expect("Failed to get record");
                assert_eq!(&actual, expected, "record mismatch for {key} in {}", bag.name());
            }
        }
    }

    /// Runs a query on both bags and on the model, asserting that all three
    /// agree. Returns the matching keys, most recent write first.
    ///
    /// Only meaningful when no key has been overwritten: stale index rows
    /// let an overwritten key match on its old values.
    pub fn check_query(&self, args: Vec<QueryArg>) -> Vec<String> {
        let query = Query::parse(args.clone()).expect("Failed to parse query");

        let indexed: Vec<String> = self
            .indexed
            .find(args.clone())
            .expect("Failed to run indexed query")
            .map(|r| r.expect("Failed to decode").0)
            .collect();
        let plain: Vec<String> = self
            .plain
            .find(args)
            .expect("Failed to run scan query")
            .map(|r| r.expect("Failed to decode").0)
            .collect();
        assert_eq!(indexed, plain, "index and scan disagree on {query}");

        let mut expected: Vec<String> = self
            .records
            .iter()
            .filter(|(_, record)| query.matches(record))
            .map(|(key, _)| key.clone())
            .collect();
        let mut actual = plain.clone();
        expected.sort();
        actual.sort();
        assert_eq!(actual, expected, "bag and model disagree on {query}");

        plain
    }

    /// Returns the count of tracked records.
    pub fn tracked_count(&self) -> usize {
        self.records.len()
    }
}

impl Default for IntegrationHarness {
    fn default() -> Self {
        Self::new(&[&["a", "b"]])
    }
}

/// Checks that every stored value reads back unchanged from a bag.
pub fn check_roundtrip(values: &[Value]) {
    let bag = databag_core::DataBag::in_memory().expect("Failed to open bag");
    for (i, value) in values.iter().enumerate() {
        let key = format!("v{i}");
        bag.set(&key, value).expect("Failed to set value");
        assert_eq!(&bag.get(&key).expect("Failed to get value"), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generators::{query_args_strategy, record_strategy, bag_proptest_config, QUICK_CASES, FIELD_POOL};
    use databag_core::Field;
    use proptest::prelude::*;

    #[test]
    fn test_integration_harness() {
        let mut harness = IntegrationHarness::default();
        harness.set("x", Value::map([("a", 1), ("b", 2)]));
        harness.set("y", Value::map([("a", 3)]));
        harness.set("z", Value::map([("c", "only c")]));
        harness.verify_all();
        assert_eq!(harness.tracked_count(), 3);

        harness.delete("y");
        harness.verify_all();
        assert_eq!(harness.tracked_count(), 2);
    }

    #[test]
    fn test_index_consistency() {
        let mut harness = IntegrationHarness::default();
        for i in 0..20i64 {
            harness.set(
                &format!("k{i:02}"),
                Value::map([("a", Value::from(i)), ("b", Value::from(i % 3))]),
            );
        }
        let keys = harness.check_query(vec![Field::new("a").ge(15).into()]);
        assert_eq!(keys, vec!["k19", "k18", "k17", "k16", "k15"]);

        let keys = harness.check_query(vec![QueryArg::eq("b", 0), Field::new("a").lt(7).into()]);
        assert_eq!(keys, vec!["k06", "k03", "k00"]);
    }

    #[test]
    fn test_deleted_records_leave_results() {
        let mut harness = IntegrationHarness::default();
        harness.set("k1", Value::map([("a", 1)]));
        harness.set("k2", Value::map([("a", 1)]));
        harness.delete("k1");
        assert_eq!(harness.check_query(vec![QueryArg::eq("a", 1)]), vec!["k2"]);
    }

    #[test]
    fn test_roundtrip_helper() {
        check_roundtrip(&[
            Value::Null,
            Value::from(true),
            Value::from(-7),
            Value::from(2.5),
            Value::from("text"),
            Value::from(vec![1, 2, 3]),
            Value::map([("nested", Value::map([("deep", 1)]))]),
        ]);
    }

    proptest! {
        #![proptest_config(bag_proptest_config(QUICK_CASES))]

        #[test]
        fn index_and_scan_agree(
            records in prop::collection::vec(record_strategy(), 0..40),
            args in query_args_strategy(&FIELD_POOL),
        ) {
            let mut harness = IntegrationHarness::new(&[&["a", "b", "c"]]);
            for (i, record) in records.into_iter().enumerate() {
                harness.set(&format!("k{i:03}"), record);
            }
            harness.check_query(args);
        }
    }
}
