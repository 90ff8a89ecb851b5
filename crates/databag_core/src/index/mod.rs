//! Sparse composite secondary indexes.
//!
//! Each index is a physical table of `(key, cell...)` rows, one cell per
//! indexed field, kept alongside the bag's primary table. Indexes are
//! declared through [`IndexManager::ensure`] and picked automatically by
//! the query planner; callers never name an index in a query.
//!
//! # Layout
//!
//! - [`Cell`]: numeric-preferring column value with a total order
//! - [`IndexDefinition`]: sorted field set and table naming
//! - [`IndexManager`]: per-bag registry and row derivation

mod cell;
mod definition;
mod manager;

pub use cell::Cell;
pub use definition::IndexDefinition;
pub use manager::IndexManager;
