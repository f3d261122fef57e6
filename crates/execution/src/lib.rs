#![deny(missing_docs)]

//! Coordinator-side execution primitives shared by every execution path.
//!
//! Architecture role:
//! - row and scalar value model exchanged with source connectors
//! - expression evaluation with SQL three-valued logic
//! - in-memory operators: hash join, COUNT aggregate, stable multi-key sort, pagination,
//!   projection
//! - Arrow rendering of result rows
//!
//! Key modules:
//! - [`row`]
//! - [`expressions`]
//! - [`operators`]
//! - [`batch`]

/// Arrow conversion of result rows.
pub mod batch;
/// Expression and predicate evaluation over rows.
pub mod expressions;
/// In-memory relational operators.
pub mod operators;
/// Row and scalar value model.
pub mod row;

pub use batch::rows_to_record_batch;
pub use expressions::{eval_expr, eval_predicate};
pub use operators::{
    filter, hash_aggregate, hash_join, paginate, project, qualify, sort_rows, validate_page, Page,
};
pub use row::{Row, ScalarValue};
