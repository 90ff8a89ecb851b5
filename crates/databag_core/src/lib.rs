//! # DataBag Core
//!
//! Embedded versioned key-value bags for DataBag.
//!
//! This crate provides:
//! - A CRC-framed append-only journal replayed into in-memory tables
//! - [`DataBag`]: string keys to values, with optional version history
//! - [`DocumentBag`]: map-valued bags with sparse composite indexes
//! - A predicate builder and planner choosing index lookups or scans
//! - [`Schema`] and [`Documents`] for typed document mapping
//!
//! ## Example
//!
//! ```rust
//! use databag_core::{BagConfig, DocumentBag, Field, QueryArg};
//! use databag_codec::Value;
//!
//! let bag = DocumentBag::open(BagConfig::new().table("things").index(["x"]))?;
//! bag.set("a", &Value::map([("x", Value::from(1)), ("y", Value::from("one"))]))?;
//! bag.set("b", &Value::map([("x", Value::from(2)), ("y", Value::from("two"))]))?;
//!
//! let hits: Vec<_> = bag.find([Field::new("x").ge(2)])?.collect::<Result<_, _>>()?;
//! assert_eq!(hits[0].0, "b");
//! assert!(bag.find_one([QueryArg::eq("y", "three")])?.is_none());
//! # Ok::<(), databag_core::BagError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod document;
mod engine;
mod error;
mod index;
mod journal;
mod keygen;
mod model;
mod query;
mod store;
mod types;

pub use config::{validate_name, BagConfig, Location, DEFAULT_HISTORY, DEFAULT_TABLE};
pub use document::DocumentBag;
pub use engine::{Engine, IndexRow, IndexTable, Row, Table, Tables};
pub use error::{BagError, BagResult};
pub use index::{Cell, IndexDefinition, IndexManager};
pub use journal::{compute_crc32, JournalRecord, Op, RecordKind, RowImage, MIN_FRAME_SIZE};
pub use keygen::generate_key;
pub use model::{
    Document, DocumentMatches, Documents, FieldDefault, FieldKind, FieldSpec, Schema, CREATED_TS,
};
pub use query::{Field, Matches, Operator, Plan, Predicate, Query, QueryArg};
pub use store::{ByCreated, DataBag, Keys};
pub use types::{IndexRowId, SequenceNumber};
