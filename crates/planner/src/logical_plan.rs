use std::fmt;

use fedq_common::{FedqError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Expr {
    /// Column reference. `alias.column` above a scan, bare `column` inside a scan predicate.
    Column(String),
    Literal(LiteralValue),
    BinaryOp {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    IsNull(Box<Expr>),
    IsNotNull(Box<Expr>),
}

impl Expr {
    pub fn col(name: impl Into<String>) -> Self {
        Self::Column(name.into())
    }

    pub fn lit(value: impl Into<LiteralValue>) -> Self {
        Self::Literal(value.into())
    }

    pub fn equals(self, other: Expr) -> Self {
        Self::BinaryOp {
            left: Box::new(self),
            op: BinaryOp::Eq,
            right: Box::new(other),
        }
    }

    pub fn and(self, other: Expr) -> Self {
        Self::And(Box::new(self), Box::new(other))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LiteralValue {
    Int64(i64),
    Utf8(String),
    Boolean(bool),
    Null,
}

impl From<i64> for LiteralValue {
    fn from(v: i64) -> Self {
        Self::Int64(v)
    }
}

impl From<&str> for LiteralValue {
    fn from(v: &str) -> Self {
        Self::Utf8(v.to_string())
    }
}

impl From<String> for LiteralValue {
    fn from(v: String) -> Self {
        Self::Utf8(v)
    }
}

impl From<bool> for LiteralValue {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggExpr {
    /// COUNT(expr): rows where `expr` is not null.
    Count(Expr),
    /// COUNT(*)
    CountStar,
}

/// Storage engine family behind a named source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Relational,
    Document,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Relational => f.write_str("relational"),
            Self::Document => f.write_str("document"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    /// Output column of the operator below the sort.
    pub column: String,
    pub direction: SortDirection,
}

impl SortKey {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// Engine-independent operator tree. Knows nothing about SQL syntax or storage engines
/// beyond the source name and kind a scan reads from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicalPlan {
    Scan {
        source: String,
        kind: SourceKind,
        table: String,
        alias: String,
        /// Pushed predicate over bare column names, evaluated at the source.
        predicate: Option<Expr>,
    },
    /// Coordinator-side predicate over qualified columns.
    Filter {
        predicate: Expr,
        input: Box<LogicalPlan>,
    },
    /// Inner equi-join; `on.0` names a left-side column, `on.1` a right-side column.
    Join {
        left: Box<LogicalPlan>,
        right: Box<LogicalPlan>,
        on: (String, String),
    },
    Aggregate {
        group_exprs: Vec<(Expr, String)>,
        aggr_exprs: Vec<(AggExpr, String)>,
        input: Box<LogicalPlan>,
    },
    Sort {
        keys: Vec<SortKey>,
        input: Box<LogicalPlan>,
    },
    /// Offset/limit exactly as written in the query. Negative values are rejected at
    /// execution time, never clamped.
    Paginate {
        offset: i64,
        limit: Option<i64>,
        input: Box<LogicalPlan>,
    },
    Projection {
        exprs: Vec<(Expr, String)>,
        input: Box<LogicalPlan>,
    },
}

impl LogicalPlan {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Scan { .. } => "Scan",
            Self::Filter { .. } => "Filter",
            Self::Join { .. } => "Join",
            Self::Aggregate { .. } => "Aggregate",
            Self::Sort { .. } => "Sort",
            Self::Paginate { .. } => "Paginate",
            Self::Projection { .. } => "Projection",
        }
    }

    pub fn children(&self) -> Vec<&LogicalPlan> {
        match self {
            Self::Scan { .. } => vec![],
            Self::Join { left, right, .. } => vec![left.as_ref(), right.as_ref()],
            Self::Filter { input, .. }
            | Self::Aggregate { input, .. }
            | Self::Sort { input, .. }
            | Self::Paginate { input, .. }
            | Self::Projection { input, .. } => vec![input.as_ref()],
        }
    }

    /// Aliases of every scan under this node, left to right.
    pub fn scan_aliases(&self) -> Vec<&str> {
        match self {
            Self::Scan { alias, .. } => vec![alias.as_str()],
            other => other
                .children()
                .into_iter()
                .flat_map(LogicalPlan::scan_aliases)
                .collect(),
        }
    }

    /// Check the structural invariants every executor relies on.
    ///
    /// Sort and Paginate act on aggregated rows only, so neither may sit below an
    /// Aggregate; aggregates do not nest.
    pub fn validate(&self) -> Result<()> {
        self.validate_inner(false)
    }

    fn validate_inner(&self, under_aggregate: bool) -> Result<()> {
        match self {
            Self::Sort { .. } | Self::Paginate { .. } if under_aggregate => {
                return Err(FedqError::Unsupported(format!(
                    "{} below Aggregate is not supported",
                    self.name()
                )))
            }
            Self::Aggregate { .. } if under_aggregate => {
                return Err(FedqError::Unsupported(
                    "nested aggregates are not supported".to_string(),
                ))
            }
            Self::Sort { keys, .. } if keys.is_empty() => {
                return Err(FedqError::Unsupported(
                    "Sort requires at least one key".to_string(),
                ))
            }
            _ => {}
        }
        let below = under_aggregate || matches!(self, Self::Aggregate { .. });
        for child in self.children() {
            child.validate_inner(below)?;
        }
        Ok(())
    }
}

/// Split `alias.column` into its parts; bare names have no qualifier.
pub fn split_qualified(name: &str) -> (Option<&str>, &str) {
    match name.split_once('.') {
        Some((q, c)) => (Some(q), c),
        None => (None, name),
    }
}

pub fn strip_qualifier(name: &str) -> &str {
    split_qualified(name).1
}
