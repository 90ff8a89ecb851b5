//! Proptest strategies for bag keys, values, records and queries.
//!
//! Records draw their fields from [`FIELD_POOL`] so generated queries
//! actually hit generated data.

use databag_codec::Value;
use databag_core::{Field, Operator, Predicate, QueryArg};
use proptest::prelude::*;
use std::collections::BTreeMap;

/// Field names used by generated records and queries.
pub const FIELD_POOL: [&str; 3] = ["a", "b", "c"];

/// Strategy for generating valid bag keys.
pub fn key_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z0-9_]{1,16}").expect("key pattern compiles")
}

/// Strategy for generating valid bag and field names.
pub fn name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,15}").expect("name pattern compiles")
}

/// Strategy for generating finite floats.
pub fn finite_float_strategy() -> impl Strategy<Value = f64> {
    prop_oneof![
        (-1_000_000i32..1_000_000).prop_map(|n| f64::from(n) / 8.0),
        any::<f64>().prop_filter("finite", |f| f.is_finite()),
    ]
}

/// Strategy for generating scalar values, with a bias towards text that
/// looks like a number.
pub fn scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        (-100i64..100).prop_map(Value::Integer),
        finite_float_strategy().prop_map(Value::Float),
        (-100i64..100).prop_map(|n| Value::Text(n.to_string())),
        prop::string::string_regex("[a-z ]{0,12}")
            .expect("text pattern compiles")
            .prop_map(Value::Text),
    ]
}

/// Strategy for generating arbitrary nested values.
///
/// Datetimes are left out; they decode as text, not as themselves.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    scalar_strategy().prop_recursive(3, 32, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::btree_map(name_strategy(), inner, 0..6).prop_map(Value::Map),
        ]
    })
}

/// Strategy for generating document records over [`FIELD_POOL`].
///
/// Fields may be missing so that sparse indexing is exercised.
pub fn record_strategy() -> impl Strategy<Value = Value> {
    prop::collection::vec(prop::option::of(scalar_strategy()), FIELD_POOL.len()).prop_map(
        |slots| {
            let fields: BTreeMap<String, Value> = FIELD_POOL
                .iter()
                .zip(slots)
                .filter_map(|(name, slot)| slot.map(|v| ((*name).to_string(), v)))
                .collect();
            Value::Map(fields)
        },
    )
}

/// Strategy for generating comparison operators.
pub fn operator_strategy() -> impl Strategy<Value = Operator> {
    prop::sample::select(Operator::ALL.to_vec())
}

/// Strategy for generating predicates over the given fields.
pub fn predicate_strategy(fields: &'static [&'static str]) -> impl Strategy<Value = Predicate> {
    (
        prop::sample::select(fields.to_vec()),
        operator_strategy(),
        scalar_strategy(),
    )
        .prop_map(|(field, op, literal)| Predicate::new(field, op, literal))
}

/// Strategy for generating `find` arguments in every input form.
pub fn query_args_strategy(
    fields: &'static [&'static str],
) -> impl Strategy<Value = Vec<QueryArg>> {
    let arg = prop_oneof![
        predicate_strategy(fields).prop_map(QueryArg::from),
        (prop::sample::select(fields.to_vec()), scalar_strategy())
            .prop_map(|(field, literal)| QueryArg::eq(field, literal)),
        (prop::sample::select(fields.to_vec()), -100i64..100, -100i64..100)
            .prop_map(|(field, lo, hi)| QueryArg::from(Field::new(field).gt(lo).le(hi))),
    ];
    prop::collection::vec(arg, 1..3)
}

/// A single operation on a key-value bag.
#[derive(Debug, Clone)]
pub enum BagOperation {
    /// Write a value
    Set {
        /// Key
        key: String,
        /// Value
        value: Value,
    },
    /// Delete a key
    Delete {
        /// Key
        key: String,
    },
    /// Read a key
    Get {
        /// Key
        key: String,
    },
}

/// Strategy for generating bag operations over a small key space, so that
/// overwrites and deletes of existing keys are common.
pub fn bag_operation_strategy() -> impl Strategy<Value = BagOperation> {
    let key = prop::sample::select(vec!["k1", "k2", "k3", "k4"]).prop_map(str::to_string);
    prop_oneof![
        3 => (key.clone(), value_strategy())
            .prop_map(|(key, value)| BagOperation::Set { key, value }),
        1 => key.clone().prop_map(|key| BagOperation::Delete { key }),
        2 => key.prop_map(|key| BagOperation::Get { key }),
    ]
}

/// Between `min_ops` and `max_ops - 1` operations in a row.
pub fn bag_script_strategy(
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<BagOperation>> {
    prop::collection::vec(bag_operation_strategy(), min_ops..max_ops)
}

/// Case count for property tests that run on every `cargo test`.
pub const QUICK_CASES: u32 = 32;

/// Case count for soak runs.
pub const THOROUGH_CASES: u32 = 1024;

/// Proptest settings with `cases` cases and shrinking capped to match.
#[must_use]
pub fn bag_proptest_config(cases: u32) -> ProptestConfig {
    ProptestConfig {
        cases,
        max_shrink_iters: cases.saturating_mul(8),
        ..ProptestConfig::default()
    }
}
