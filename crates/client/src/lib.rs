//! Embedded federated query engine.
//!
//! [`Engine`] owns the catalog and the source connectors. Queries are parsed, planned into a
//! logical plan with per-source predicate pushdown and executed on either the fast path (the
//! recognized join-group-order-paginate template) or the generic operator walk. The legacy
//! executor answers the same queries straight from the AST and serves as the oracle that
//! [`Engine::compare`] checks the logical paths against.

mod legacy;
mod planner_facade;
mod runtime;
mod session;

pub mod engine;
pub mod repl;

pub use engine::{Comparison, Engine, QueryResult};
pub use runtime::{ExecutionMeta, ExecutionPath, Timings};
