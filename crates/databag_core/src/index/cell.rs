//! Numeric-preferring index cells.
//!
//! Index columns hold loosely typed cells so that ordering comparisons work
//! for numbers stored by either path: `500 > 9` must hold whether the field
//! was written as a number or as the text `"500"`. Conversion rules:
//!
//! | value                        | cell            |
//! |------------------------------|-----------------|
//! | null                         | `Null`          |
//! | integer, float, bool         | `Number`        |
//! | text that parses as a number | `Number`        |
//! | other text                   | `Text`          |
//! | datetime                     | `Text` (RFC 3339) |
//! | array, map                   | `Text` (JSON)   |
//!
//! Cells order `Null < Number < Text`. Any comparison with a null side is
//! false, including `!=`.

use crate::query::Operator;
use databag_codec::{iso8601, Value};
use std::cmp::Ordering;

/// One index column value.
#[derive(Debug, Clone)]
pub enum Cell {
    /// Missing or null field.
    Null,
    /// Numeric value. Never NaN, never negative zero.
    Number(f64),
    /// Non-numeric text.
    Text(String),
}

impl Cell {
    /// Builds a numeric cell. NaN becomes null.
    #[must_use]
    pub fn number(n: f64) -> Self {
        if n.is_nan() {
            Cell::Null
        } else if n == 0.0 {
            Cell::Number(0.0)
        } else {
            Cell::Number(n)
        }
    }

    /// Builds a text cell, preferring a number when the text is one.
    #[must_use]
    pub fn text(s: &str) -> Self {
        match s.parse::<f64>() {
            Ok(n) if n.is_finite() => Cell::number(n),
            _ => Cell::Text(s.to_string()),
        }
    }

    /// Converts a stored or literal value with numeric affinity.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => Cell::Null,
            Value::Bool(b) => Cell::Number(if *b { 1.0 } else { 0.0 }),
            Value::Integer(n) => Cell::number(*n as f64),
            Value::Float(f) => Cell::number(*f),
            Value::Text(s) => Cell::text(s),
            Value::DateTime(ts) => Cell::Text(iso8601(ts)),
            Value::Array(_) | Value::Map(_) => Cell::Text(value.to_string()),
        }
    }

    /// Returns true for [`Cell::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    /// Evaluates `self <op> literal`.
    #[must_use]
    pub fn satisfies(&self, op: Operator, literal: &Cell) -> bool {
        if self.is_null() || literal.is_null() {
            return false;
        }
        op.holds(self.cmp(literal))
    }

    fn rank(&self) -> u8 {
        match self {
            Cell::Null => 0,
            Cell::Number(_) => 1,
            Cell::Text(_) => 2,
        }
    }
}

impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Cell {}

impl PartialOrd for Cell {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Cell {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Cell::Number(a), Cell::Number(b)) => a.total_cmp(b),
            (Cell::Text(a), Cell::Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;

    #[test]
    fn numbers_and_bools_are_numeric() {
        assert_eq!(Cell::from_value(&Value::from(7)), Cell::Number(7.0));
        assert_eq!(Cell::from_value(&Value::from(2.5)), Cell::Number(2.5));
        assert_eq!(Cell::from_value(&Value::from(true)), Cell::Number(1.0));
        assert_eq!(Cell::from_value(&Value::from(-0.0)), Cell::Number(0.0));
    }

    #[test]
    fn numeric_text_is_numeric() {
        assert_eq!(Cell::from_value(&Value::from("500")), Cell::Number(500.0));
        assert_eq!(Cell::from_value(&Value::from("1e3")), Cell::Number(1000.0));
        assert_eq!(Cell::from_value(&Value::from("abc")), Cell::Text("abc".into()));
        assert_eq!(Cell::from_value(&Value::from("NaN")), Cell::Text("NaN".into()));
        assert_eq!(Cell::from_value(&Value::from("inf")), Cell::Text("inf".into()));
    }

    #[test]
    fn numeric_ordering_is_not_lexical() {
        let big = Cell::from_value(&Value::from("500"));
        let small = Cell::from_value(&Value::from(9));
        assert!(big.satisfies(Operator::Gt, &small));
        assert!(!big.satisfies(Operator::Lt, &small));
    }

    #[test]
    fn nested_values_become_json_text() {
        let cell = Cell::from_value(&Value::from(vec![1, 2]));
        assert_eq!(cell, Cell::Text("[1,2]".into()));
        let ts = Utc.with_ymd_and_hms(2020, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(
            Cell::from_value(&Value::DateTime(ts)),
            Cell::Text("2020-01-02T03:04:05Z".into())
        );
    }

    #[test]
    fn null_never_compares() {
        let one = Cell::Number(1.0);
        for op in Operator::ALL {
            assert!(!Cell::Null.satisfies(op, &one));
            assert!(!one.satisfies(op, &Cell::Null));
            assert!(!Cell::Null.satisfies(op, &Cell::Null));
        }
    }

    #[test]
    fn numbers_sort_below_text() {
        let mut cells = vec![
            Cell::Text("b".into()),
            Cell::Number(3.0),
            Cell::Null,
            Cell::Text("a".into()),
            Cell::Number(-1.0),
        ];
        cells.sort();
        assert_eq!(
            cells,
            vec![
                Cell::Null,
                Cell::Number(-1.0),
                Cell::Number(3.0),
                Cell::Text("a".into()),
                Cell::Text("b".into()),
            ]
        );
        assert!(Cell::Text("a".into()).satisfies(Operator::Gt, &Cell::Number(1e9)));
    }

    proptest! {
        #[test]
        fn integer_text_compares_like_the_integer(a in -10_000i64..10_000, b in -10_000i64..10_000) {
            let as_text = Cell::from_value(&Value::from(a.to_string()));
            let as_number = Cell::from_value(&Value::from(b));
            prop_assert_eq!(as_text.cmp(&as_number), a.cmp(&b));
        }

        #[test]
        fn eq_and_ne_split_non_null_cells(a in "[a-z0-9]{0,4}", b in "[a-z0-9]{0,4}") {
            let (a, b) = (Cell::text(&a), Cell::text(&b));
            prop_assert_ne!(a.satisfies(Operator::Eq, &b), a.satisfies(Operator::Ne, &b));
        }
    }
}
