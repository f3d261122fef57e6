//! Logical planning for federated queries.
//!
//! SQL AST -> [`LogicalPlan`] (Planner Bridge) -> per-source predicate pushdown ->
//! [`select_strategy`], which either recognizes the join-group-order-paginate template as a
//! [`FastPathDescriptor`] or leaves the plan to the operator-by-operator executor.

pub mod explain;
pub mod logical_plan;
pub mod optimizer;
pub mod sql_frontend;

pub use explain::{explain_active_buyers, explain_fast_path, explain_logical};
pub use logical_plan::*;
pub use optimizer::*;
pub use sql_frontend::*;
