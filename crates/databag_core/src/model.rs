//! Typed document mapping.
//!
//! A [`Schema`] is an ordered table of field descriptors. It converts
//! between [`Document`]s and the maps stored in a [`DocumentBag`], applying
//! defaults and per-kind coercion. [`Documents`] pairs a schema with a bag
//! and offers save/grab/find verbs.

use crate::config::BagConfig;
use crate::document::DocumentBag;
use crate::error::{BagError, BagResult};
use crate::query::{Matches, QueryArg};
use chrono::{DateTime, Utc};
use databag_codec::Value;
use std::collections::BTreeMap;

/// Built-in field recording when a document was first saved.
pub const CREATED_TS: &str = "_created_ts";

/// Accepted type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// UTF-8 text.
    Text,
    /// 64-bit integer.
    Integer,
    /// 64-bit float. Integers widen.
    Float,
    /// Boolean.
    Bool,
    /// Timestamp. RFC 3339 text is parsed.
    DateTime,
    /// Anything.
    Any,
}

impl FieldKind {
    /// Coerces a non-null value to this kind.
    ///
    /// # Errors
    ///
    /// [`BagError::TypeMismatch`] if the value cannot be represented.
    #[allow(clippy::cast_precision_loss)]
    pub fn coerce(self, value: Value) -> BagResult<Value> {
        match (self, value) {
            (FieldKind::Any, v)
            | (FieldKind::Text, v @ Value::Text(_))
            | (FieldKind::Integer, v @ Value::Integer(_))
            | (FieldKind::Float, v @ Value::Float(_))
            | (FieldKind::Bool, v @ Value::Bool(_))
            | (FieldKind::DateTime, v @ Value::DateTime(_)) => Ok(v),
            (FieldKind::Float, Value::Integer(n)) => Ok(Value::Float(n as f64)),
            (FieldKind::DateTime, Value::Text(s)) => DateTime::parse_from_rfc3339(&s)
                .map(|ts| Value::DateTime(ts.with_timezone(&Utc)))
                .map_err(|_| BagError::type_mismatch("RFC 3339 datetime", format!("{s:?}"))),
            (kind, other) => Err(BagError::type_mismatch(kind.name(), other.type_name())),
        }
    }

    fn name(self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Integer => "integer",
            FieldKind::Float => "float",
            FieldKind::Bool => "bool",
            FieldKind::DateTime => "datetime",
            FieldKind::Any => "any",
        }
    }
}

/// Value used when a field is missing or null.
#[derive(Debug, Clone, Default)]
pub enum FieldDefault {
    /// No default; the field stays absent.
    #[default]
    None,
    /// A fixed value.
    Value(Value),
    /// Computed on each use.
    Generator(fn() -> Value),
}

impl FieldDefault {
    /// Produces the default, if any.
    #[must_use]
    pub fn resolve(&self) -> Option<Value> {
        match self {
            FieldDefault::None => None,
            FieldDefault::Value(v) => Some(v.clone()),
            FieldDefault::Generator(generate) => Some(generate()),
        }
    }
}

/// One field descriptor.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    /// Field name.
    pub name: String,
    /// Accepted kind.
    pub kind: FieldKind,
    /// Default for missing or null values.
    pub default: FieldDefault,
}

impl FieldSpec {
    /// Creates a descriptor without a default.
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            default: FieldDefault::None,
        }
    }

    /// Sets a fixed default.
    #[must_use]
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = FieldDefault::Value(value.into());
        self
    }

    /// Sets a generated default.
    #[must_use]
    pub fn default_with(mut self, generate: fn() -> Value) -> Self {
        self.default = FieldDefault::Generator(generate);
        self
    }

    fn resolve(&self, value: Option<&Value>) -> BagResult<Option<Value>> {
        match value {
            Some(v) if !v.is_null() => self.kind.coerce(v.clone()).map(Some),
            _ => self
                .default
                .resolve()
                .map(|v| self.kind.coerce(v))
                .transpose(),
        }
    }
}

fn now() -> Value {
    Value::DateTime(Utc::now())
}

/// Ordered field table.
///
/// Every schema starts with [`CREATED_TS`], a datetime defaulting to the
/// current time.
#[derive(Debug, Clone)]
pub struct Schema {
    fields: Vec<FieldSpec>,
}

impl Default for Schema {
    fn default() -> Self {
        Self::new()
    }
}

impl Schema {
    /// Creates a schema holding only the built-in fields.
    #[must_use]
    pub fn new() -> Self {
        Self {
            fields: vec![FieldSpec::new(CREATED_TS, FieldKind::DateTime).default_with(now)],
        }
    }

    /// Declares a field, replacing an earlier one with the same name.
    #[must_use]
    pub fn field(mut self, spec: FieldSpec) -> Self {
        match self.fields.iter_mut().find(|f| f.name == spec.name) {
            Some(existing) => *existing = spec,
            None => self.fields.push(spec),
        }
        self
    }

    /// Declared fields in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Looks up a field by name.
    #[must_use]
    pub fn spec(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Writes defaults into a document's missing or null fields.
    pub fn fill_defaults(&self, doc: &mut Document) -> BagResult<()> {
        for spec in &self.fields {
            if doc.values.get(&spec.name).is_some_and(|v| !v.is_null()) {
                continue;
            }
            if let Some(value) = spec.resolve(None)? {
                doc.values.insert(spec.name.clone(), value);
            }
        }
        Ok(())
    }

    /// Converts a document to the map stored in the bag.
    ///
    /// Only declared fields are kept.
    ///
    /// # Errors
    ///
    /// [`BagError::TypeMismatch`] if a value does not fit its field.
    pub fn to_map(&self, doc: &Document) -> BagResult<Value> {
        let mut map = BTreeMap::new();
        for spec in &self.fields {
            if let Some(value) = spec.resolve(doc.values.get(&spec.name))? {
                map.insert(spec.name.clone(), value);
            }
        }
        Ok(Value::Map(map))
    }

    /// Builds a document from a stored map.
    ///
    /// Undeclared fields are dropped. Missing or null fields take their
    /// default.
    ///
    /// # Errors
    ///
    /// [`BagError::TypeMismatch`] if `value` is not a map or a field does
    /// not fit.
    pub fn from_map(&self, key: Option<String>, value: &Value) -> BagResult<Document> {
        let fields = value
            .as_map()
            .ok_or_else(|| BagError::type_mismatch("map", value.type_name()))?;
        let mut values = BTreeMap::new();
        for spec in &self.fields {
            if let Some(v) = spec.resolve(fields.get(&spec.name))? {
                values.insert(spec.name.clone(), v);
            }
        }
        Ok(Document { key, values })
    }
}

/// A keyed set of field values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    /// Storage key, `None` until first saved.
    pub key: Option<String>,
    /// Field values.
    pub values: BTreeMap<String, Value>,
}

impl Document {
    /// Creates an unsaved, empty document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty document with a fixed key.
    pub fn with_key(key: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            values: BTreeMap::new(),
        }
    }

    /// Sets a field.
    #[must_use]
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(field.into(), value.into());
        self
    }

    /// Field value, if present.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    /// Creation time, once defaults have been applied.
    #[must_use]
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        match self.values.get(CREATED_TS) {
            Some(Value::DateTime(ts)) => Some(*ts),
            _ => None,
        }
    }
}

/// Schema-aware verbs over a document bag.
#[derive(Debug)]
pub struct Documents {
    bag: DocumentBag,
    schema: Schema,
}

impl Documents {
    /// Pairs a bag with a schema.
    pub fn new(bag: DocumentBag, schema: Schema) -> Self {
        Self { bag, schema }
    }

    /// Opens a document bag and pairs it with a schema.
    pub fn open(config: BagConfig, schema: Schema) -> BagResult<Self> {
        Ok(Self::new(DocumentBag::open(config)?, schema))
    }

    /// The underlying bag.
    #[must_use]
    pub fn bag(&self) -> &DocumentBag {
        &self.bag
    }

    /// The schema.
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Saves a document and returns its key.
    ///
    /// Defaults are written back into `doc`. A document without a key is
    /// added under a generated one, which is then recorded on `doc`.
    pub fn save(&self, doc: &mut Document) -> BagResult<String> {
        self.schema.fill_defaults(doc)?;
        let record = self.schema.to_map(doc)?;
        let key = match &doc.key {
            Some(key) => {
                self.bag.set(key, &record)?;
                key.clone()
            }
            None => self.bag.add(&record)?,
        };
        doc.key = Some(key.clone());
        Ok(key)
    }

    /// Loads the current document stored under a key.
    pub fn grab(&self, key: &str) -> BagResult<Document> {
        let value = self.bag.get(key)?;
        self.schema.from_map(Some(key.to_string()), &value)
    }

    /// Documents matching a query, most recent write first.
    pub fn find<I, A>(&self, args: I) -> BagResult<DocumentMatches<'_>>
    where
        I: IntoIterator<Item = A>,
        A: Into<QueryArg>,
    {
        Ok(DocumentMatches {
            matches: self.bag.find(args)?,
            schema: &self.schema,
        })
    }

    /// First document matching a query, or `None`.
    pub fn find_one<I, A>(&self, args: I) -> BagResult<Option<Document>>
    where
        I: IntoIterator<Item = A>,
        A: Into<QueryArg>,
    {
        self.find(args)?.next().transpose()
    }

    /// Every current document, most recent write first.
    pub fn iter(&self) -> BagResult<DocumentMatches<'_>> {
        Ok(DocumentMatches {
            matches: self.bag.all()?,
            schema: &self.schema,
        })
    }
}

/// Lazy documents from a query. See [`Documents::find`].
#[derive(Debug)]
pub struct DocumentMatches<'a> {
    matches: Matches<'a>,
    schema: &'a Schema,
}

impl Iterator for DocumentMatches<'_> {
    type Item = BagResult<Document>;

    fn next(&mut self) -> Option<Self::Item> {
        let (key, value) = match self.matches.next()? {
            Ok(pair) => pair,
            Err(e) => return Some(Err(e)),
        };
        Some(self.schema.from_map(Some(key), &value))
    }
}
