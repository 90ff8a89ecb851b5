//! Predicates and their front-ends.
//!
//! Three input forms produce the same [`Query`]:
//!
//! - the fluent builder: `Field::new("x").gt(10).lt(20)`
//! - map sugar: `{"x": {"$gt": 10}, "y": 5}`
//! - keyword equalities: `QueryArg::eq("y", 5)`

use crate::error::{BagError, BagResult};
use crate::index::Cell;
use databag_codec::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `=`
    Eq,
    /// `!=`
    Ne,
}

impl Operator {
    /// Every operator.
    pub const ALL: [Operator; 6] = [
        Operator::Lt,
        Operator::Le,
        Operator::Gt,
        Operator::Ge,
        Operator::Eq,
        Operator::Ne,
    ];

    /// Comparison symbol.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Eq => "=",
            Operator::Ne => "!=",
        }
    }

    /// Parses a map-sugar operator name.
    ///
    /// Accepts `$gt`, `$lt`, `$gte`, `$lte` and `$ne`. Equality is written
    /// as a bare literal, so there is no `$eq`.
    pub fn from_sugar(name: &str) -> BagResult<Self> {
        match name {
            "$gt" => Ok(Operator::Gt),
            "$lt" => Ok(Operator::Lt),
            "$gte" => Ok(Operator::Ge),
            "$lte" => Ok(Operator::Le),
            "$ne" => Ok(Operator::Ne),
            other => Err(BagError::UnsupportedOperator(other.to_string())),
        }
    }

    /// Whether `lhs.cmp(rhs) == ordering` satisfies `lhs <op> rhs`.
    #[must_use]
    pub fn holds(self, ordering: Ordering) -> bool {
        match self {
            Operator::Lt => ordering == Ordering::Less,
            Operator::Le => ordering != Ordering::Greater,
            Operator::Gt => ordering == Ordering::Greater,
            Operator::Ge => ordering != Ordering::Less,
            Operator::Eq => ordering == Ordering::Equal,
            Operator::Ne => ordering != Ordering::Equal,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// One `(field, operator, literal)` condition.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    /// Field name.
    pub field: String,
    /// Comparison.
    pub op: Operator,
    /// Right-hand side.
    pub literal: Value,
}

impl Predicate {
    /// Creates a predicate.
    pub fn new(field: impl Into<String>, op: Operator, literal: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op,
            literal: literal.into(),
        }
    }

    /// Literal converted with index affinity.
    #[must_use]
    pub fn literal_cell(&self) -> Cell {
        Cell::from_value(&self.literal)
    }

    /// Evaluates the predicate against a field value.
    #[must_use]
    pub fn matches(&self, value: &Value) -> bool {
        Cell::from_value(value).satisfies(self.op, &self.literal_cell())
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.field, self.op, self.literal)
    }
}

/// Fluent per-field predicate builder.
///
/// Each call adds one condition; repeating a condition has no effect.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    name: String,
    conditions: Vec<(Operator, Value)>,
}

impl Field {
    /// Starts a builder for a field.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            conditions: Vec::new(),
        }
    }

    /// Field name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn cond(mut self, op: Operator, literal: impl Into<Value>) -> Self {
        let cond = (op, literal.into());
        if !self.conditions.contains(&cond) {
            self.conditions.push(cond);
        }
        self
    }

    /// Adds `field < literal`.
    #[must_use]
    pub fn lt(self, literal: impl Into<Value>) -> Self {
        self.cond(Operator::Lt, literal)
    }

    /// Adds `field <= literal`.
    #[must_use]
    pub fn le(self, literal: impl Into<Value>) -> Self {
        self.cond(Operator::Le, literal)
    }

    /// Adds `field > literal`.
    #[must_use]
    pub fn gt(self, literal: impl Into<Value>) -> Self {
        self.cond(Operator::Gt, literal)
    }

    /// Adds `field >= literal`.
    #[must_use]
    pub fn ge(self, literal: impl Into<Value>) -> Self {
        self.cond(Operator::Ge, literal)
    }

    /// Adds `field = literal`.
    #[must_use]
    pub fn eq(self, literal: impl Into<Value>) -> Self {
        self.cond(Operator::Eq, literal)
    }

    /// Adds `field != literal`.
    #[must_use]
    pub fn ne(self, literal: impl Into<Value>) -> Self {
        self.cond(Operator::Ne, literal)
    }

    /// The conditions as predicates, in the order they were added.
    #[must_use]
    pub fn predicates(&self) -> Vec<Predicate> {
        self.conditions
            .iter()
            .map(|(op, literal)| Predicate::new(self.name.clone(), *op, literal.clone()))
            .collect()
    }
}

/// One argument to `find`.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryArg {
    /// Fluent builder conditions.
    Field(Field),
    /// A single predicate.
    Predicate(Predicate),
    /// Map sugar; must be a [`Value::Map`].
    Doc(Value),
    /// Keyword equality. Normalized ahead of every other argument.
    Eq(String, Value),
}

impl QueryArg {
    /// Keyword equality `field = literal`.
    pub fn eq(field: impl Into<String>, literal: impl Into<Value>) -> Self {
        QueryArg::Eq(field.into(), literal.into())
    }
}

impl From<Field> for QueryArg {
    fn from(field: Field) -> Self {
        QueryArg::Field(field)
    }
}

impl From<Predicate> for QueryArg {
    fn from(predicate: Predicate) -> Self {
        QueryArg::Predicate(predicate)
    }
}

impl From<Value> for QueryArg {
    fn from(doc: Value) -> Self {
        QueryArg::Doc(doc)
    }
}

impl From<BTreeMap<String, Value>> for QueryArg {
    fn from(doc: BTreeMap<String, Value>) -> Self {
        QueryArg::Doc(Value::Map(doc))
    }
}

/// A normalized, deduplicated list of ANDed predicates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    predicates: Vec<Predicate>,
}

impl Query {
    /// Creates an empty query, which matches everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalizes `find` arguments.
    ///
    /// Keyword equalities come first, then the remaining arguments in
    /// order.
    ///
    /// # Errors
    ///
    /// [`BagError::QueryTypeError`] if a map-sugar argument is not a map,
    /// [`BagError::UnsupportedOperator`] for an unknown `$` operator.
    pub fn parse<I, A>(args: I) -> BagResult<Self>
    where
        I: IntoIterator<Item = A>,
        A: Into<QueryArg>,
    {
        let (keywords, rest): (Vec<QueryArg>, Vec<QueryArg>) = args
            .into_iter()
            .map(Into::into)
            .partition(|arg| matches!(arg, QueryArg::Eq(..)));

        let mut query = Self::new();
        for arg in keywords.into_iter().chain(rest) {
            match arg {
                QueryArg::Eq(field, literal) => {
                    query.push(Predicate::new(field, Operator::Eq, literal));
                }
                QueryArg::Predicate(predicate) => query.push(predicate),
                QueryArg::Field(field) => {
                    for predicate in field.predicates() {
                        query.push(predicate);
                    }
                }
                QueryArg::Doc(doc) => {
                    for predicate in parse_sugar(&doc)? {
                        query.push(predicate);
                    }
                }
            }
        }
        Ok(query)
    }

    /// Adds a predicate unless an identical one is present.
    pub fn push(&mut self, predicate: Predicate) {
        if !self.predicates.contains(&predicate) {
            self.predicates.push(predicate);
        }
    }

    /// The predicates, in normalized order.
    #[must_use]
    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// Returns true if the query has no predicates.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// Distinct referenced fields.
    #[must_use]
    pub fn fields(&self) -> BTreeSet<&str> {
        self.predicates.iter().map(|p| p.field.as_str()).collect()
    }

    /// Evaluates the query against a whole record.
    ///
    /// The record must be a map containing every referenced field, and
    /// every predicate must hold for that field's value.
    #[must_use]
    pub fn matches(&self, record: &Value) -> bool {
        let Some(fields) = record.as_map() else {
            return self.is_empty();
        };
        self.predicates.iter().all(|p| {
            fields
                .get(&p.field)
                .is_some_and(|value| p.matches(value))
        })
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.predicates.is_empty() {
            return f.write_str("*");
        }
        for (i, predicate) in self.predicates.iter().enumerate() {
            if i > 0 {
                f.write_str(" AND ")?;
            }
            write!(f, "{predicate}")?;
        }
        Ok(())
    }
}

/// Desugars `{"x": {"$gt": 1}, "y": 2}` into predicates.
fn parse_sugar(doc: &Value) -> BagResult<Vec<Predicate>> {
    let fields = doc
        .as_map()
        .ok_or_else(|| BagError::QueryTypeError(doc.type_name().to_string()))?;

    let mut predicates = Vec::new();
    for (field, spec) in fields {
        match spec {
            Value::Map(ops) => {
                for (name, literal) in ops {
                    let op = Operator::from_sugar(name)?;
                    predicates.push(Predicate::new(field.clone(), op, literal.clone()));
                }
            }
            literal => predicates.push(Predicate::new(field.clone(), Operator::Eq, literal.clone())),
        }
    }
    Ok(predicates)
}
