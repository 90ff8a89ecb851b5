//! Predicates and query planning.
//!
//! Queries are ANDed lists of `(field, operator, literal)` predicates.
//! Callers describe what to match; the planner decides whether an index
//! or a full scan answers it.

mod planner;
mod predicate;

pub use planner::{Matches, Plan};
pub use predicate::{Field, Operator, Predicate, Query, QueryArg};

pub(crate) use planner::execute;
