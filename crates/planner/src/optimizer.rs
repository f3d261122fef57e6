use std::collections::HashSet;

use fedq_common::Result;
use serde::{Deserialize, Serialize};

use crate::logical_plan::{
    split_qualified, strip_qualifier, AggExpr, BinaryOp, Expr, LiteralValue, LogicalPlan,
    SortKey, SourceKind,
};

// -----------------------------
// Predicate pushdown
// -----------------------------

/// Move every WHERE conjunct that references exactly one scan alias into that scan's
/// predicate (qualifiers stripped, ANDed with what the scan already has). Conjuncts that
/// span both sides, or reference no column at all, stay in a residual `Filter`.
pub fn pushdown_predicates(plan: LogicalPlan) -> Result<LogicalPlan> {
    Ok(match plan {
        LogicalPlan::Filter { predicate, input } => {
            let mut input = pushdown_predicates(*input)?;
            let mut residual = vec![];
            for conjunct in split_conjuncts(predicate) {
                let qualifiers = expr_columns(&conjunct)
                    .iter()
                    .map(|c| split_qualified(c).0.map(str::to_string))
                    .collect::<HashSet<_>>();
                let target = match qualifiers.iter().collect::<Vec<_>>().as_slice() {
                    [Some(alias)] => Some(alias.clone()),
                    _ => None,
                };
                match target {
                    Some(alias) if attach_to_scan(&mut input, &alias, &conjunct) => {}
                    _ => residual.push(conjunct),
                }
            }
            if residual.is_empty() {
                input
            } else {
                LogicalPlan::Filter {
                    predicate: combine_conjuncts(residual),
                    input: Box::new(input),
                }
            }
        }
        LogicalPlan::Join { left, right, on } => LogicalPlan::Join {
            left: Box::new(pushdown_predicates(*left)?),
            right: Box::new(pushdown_predicates(*right)?),
            on,
        },
        LogicalPlan::Aggregate {
            group_exprs,
            aggr_exprs,
            input,
        } => LogicalPlan::Aggregate {
            group_exprs,
            aggr_exprs,
            input: Box::new(pushdown_predicates(*input)?),
        },
        LogicalPlan::Sort { keys, input } => LogicalPlan::Sort {
            keys,
            input: Box::new(pushdown_predicates(*input)?),
        },
        LogicalPlan::Paginate {
            offset,
            limit,
            input,
        } => LogicalPlan::Paginate {
            offset,
            limit,
            input: Box::new(pushdown_predicates(*input)?),
        },
        LogicalPlan::Projection { exprs, input } => LogicalPlan::Projection {
            exprs,
            input: Box::new(pushdown_predicates(*input)?),
        },
        scan @ LogicalPlan::Scan { .. } => scan,
    })
}

/// Find the scan bound to `alias` below joins and AND `conjunct` into its predicate.
fn attach_to_scan(plan: &mut LogicalPlan, alias: &str, conjunct: &Expr) -> bool {
    match plan {
        LogicalPlan::Scan {
            alias: scan_alias,
            predicate,
            ..
        } if scan_alias == alias => {
            let pushed = strip_expr_qualifiers(conjunct.clone());
            *predicate = Some(match predicate.take() {
                Some(existing) => existing.and(pushed),
                None => pushed,
            });
            true
        }
        LogicalPlan::Join { left, right, .. } => {
            attach_to_scan(left, alias, conjunct) || attach_to_scan(right, alias, conjunct)
        }
        _ => false,
    }
}

fn strip_expr_qualifiers(e: Expr) -> Expr {
    match e {
        Expr::Column(c) => Expr::Column(strip_qualifier(&c).to_string()),
        Expr::Literal(_) => e,
        Expr::BinaryOp { left, op, right } => Expr::BinaryOp {
            left: Box::new(strip_expr_qualifiers(*left)),
            op,
            right: Box::new(strip_expr_qualifiers(*right)),
        },
        Expr::And(a, b) => Expr::And(
            Box::new(strip_expr_qualifiers(*a)),
            Box::new(strip_expr_qualifiers(*b)),
        ),
        Expr::Or(a, b) => Expr::Or(
            Box::new(strip_expr_qualifiers(*a)),
            Box::new(strip_expr_qualifiers(*b)),
        ),
        Expr::Not(x) => Expr::Not(Box::new(strip_expr_qualifiers(*x))),
        Expr::IsNull(x) => Expr::IsNull(Box::new(strip_expr_qualifiers(*x))),
        Expr::IsNotNull(x) => Expr::IsNotNull(Box::new(strip_expr_qualifiers(*x))),
    }
}

pub fn split_conjuncts(e: Expr) -> Vec<Expr> {
    match e {
        Expr::And(a, b) => {
            let mut v = split_conjuncts(*a);
            v.extend(split_conjuncts(*b));
            v
        }
        other => vec![other],
    }
}

pub fn combine_conjuncts(mut v: Vec<Expr>) -> Expr {
    if v.is_empty() {
        return Expr::Literal(LiteralValue::Boolean(true));
    }
    let first = v.remove(0);
    v.into_iter()
        .fold(first, |acc, e| Expr::And(Box::new(acc), Box::new(e)))
}

pub fn expr_columns(e: &Expr) -> HashSet<String> {
    let mut out = HashSet::new();
    collect_cols(e, &mut out);
    out
}

fn collect_cols(e: &Expr, out: &mut HashSet<String>) {
    match e {
        Expr::Column(c) => {
            out.insert(c.clone());
        }
        Expr::BinaryOp { left, right, .. } => {
            collect_cols(left, out);
            collect_cols(right, out);
        }
        Expr::And(a, b) | Expr::Or(a, b) => {
            collect_cols(a, out);
            collect_cols(b, out);
        }
        Expr::Not(x) | Expr::IsNull(x) | Expr::IsNotNull(x) => collect_cols(x, out),
        Expr::Literal(_) => {}
    }
}

// -----------------------------
// Strategy selection
// -----------------------------

/// One side of the fast-path join as the connector sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceScan {
    pub source: String,
    pub table: String,
    pub alias: String,
    /// Join key column, unqualified.
    pub key_column: String,
    /// Pushed predicate over unqualified columns.
    pub predicate: Option<Expr>,
}

/// What the template's COUNT counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CountTarget {
    Star,
    /// Non-null values of a relational column (unqualified).
    Relational(String),
    /// Non-null values of a document field (unqualified).
    Document(String),
}

/// Flattened, validated form of the join-group-order-paginate template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FastPathDescriptor {
    pub relational: SourceScan,
    pub document: SourceScan,
    pub count: CountTarget,
    /// Output name of the grouping key (the join key value).
    pub group_output: String,
    /// Output name of the COUNT.
    pub count_output: String,
    /// Final `(aggregate output, projected name)` list in SELECT order.
    pub projection: Vec<(String, String)>,
    pub order_by: Vec<SortKey>,
    pub offset: i64,
    pub limit: Option<i64>,
}

/// Customers active on both sources, counted per group column.
///
/// Key sets from `orders` and `events` are intersected at the coordinator; `customers` is
/// then fetched for the surviving keys only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveBuyersPlan {
    pub orders: SourceScan,
    pub events: SourceScan,
    pub customers: SourceScan,
    /// Customer column the buyers are grouped by, unqualified.
    pub group_column: String,
    pub count_output: String,
}

/// Pure structural match of `plan` against the fast-path template.
///
/// Values never matter, only operator shapes: a different event type or page window gives
/// the same answer.
pub fn select_strategy(plan: &LogicalPlan) -> Option<FastPathDescriptor> {
    let LogicalPlan::Projection { exprs, input } = plan else {
        return None;
    };
    let (offset, limit, sorted) = match input.as_ref() {
        LogicalPlan::Paginate {
            offset,
            limit,
            input,
        } => (*offset, *limit, input.as_ref()),
        other => (0, None, other),
    };
    let LogicalPlan::Sort { keys, input } = sorted else {
        return None;
    };
    if keys.is_empty() {
        return None;
    }
    let LogicalPlan::Aggregate {
        group_exprs,
        aggr_exprs,
        input,
    } = input.as_ref()
    else {
        return None;
    };
    let LogicalPlan::Join { left, right, on } = input.as_ref() else {
        return None;
    };
    let left = scan_parts(left)?;
    let right = scan_parts(right)?;
    let (rel, doc, rel_key, doc_key) = match (left.kind, right.kind) {
        (SourceKind::Relational, SourceKind::Document) => (left, right, &on.0, &on.1),
        (SourceKind::Document, SourceKind::Relational) => (right, left, &on.1, &on.0),
        _ => return None,
    };

    if !is_field_equals_literal(doc.predicate?) {
        return None;
    }
    if !rel.predicate.map_or(true, is_literal_comparison_conjunction) {
        return None;
    }

    // GROUP BY the join key.
    let [(Expr::Column(group_col), group_output)] = group_exprs.as_slice() else {
        return None;
    };
    if group_col != rel_key && group_col != doc_key {
        return None;
    }

    let [(agg, count_output)] = aggr_exprs.as_slice() else {
        return None;
    };
    let count = match agg {
        AggExpr::CountStar => CountTarget::Star,
        AggExpr::Count(Expr::Column(c)) => match split_qualified(c) {
            (Some(a), col) if a == rel.alias => CountTarget::Relational(col.to_string()),
            (Some(a), col) if a == doc.alias => CountTarget::Document(col.to_string()),
            _ => return None,
        },
        AggExpr::Count(_) => return None,
    };

    let outputs = [group_output.as_str(), count_output.as_str()];
    if !keys.iter().all(|k| outputs.contains(&k.column.as_str())) {
        return None;
    }
    let projection = exprs
        .iter()
        .map(|(e, name)| match e {
            Expr::Column(c) if outputs.contains(&c.as_str()) => Some((c.clone(), name.clone())),
            _ => None,
        })
        .collect::<Option<Vec<_>>>()?;

    Some(FastPathDescriptor {
        relational: rel.into_source_scan(rel_key),
        document: doc.into_source_scan(doc_key),
        count,
        group_output: group_output.clone(),
        count_output: count_output.clone(),
        projection,
        order_by: keys.clone(),
        offset,
        limit,
    })
}

struct ScanParts<'a> {
    source: &'a str,
    kind: SourceKind,
    table: &'a str,
    alias: &'a str,
    predicate: Option<&'a Expr>,
}

impl ScanParts<'_> {
    fn into_source_scan(self, qualified_key: &str) -> SourceScan {
        SourceScan {
            source: self.source.to_string(),
            table: self.table.to_string(),
            alias: self.alias.to_string(),
            key_column: strip_qualifier(qualified_key).to_string(),
            predicate: self.predicate.cloned(),
        }
    }
}

fn scan_parts(plan: &LogicalPlan) -> Option<ScanParts<'_>> {
    match plan {
        LogicalPlan::Scan {
            source,
            kind,
            table,
            alias,
            predicate,
        } => Some(ScanParts {
            source,
            kind: *kind,
            table,
            alias,
            predicate: predicate.as_ref(),
        }),
        _ => None,
    }
}

/// `field = 'literal'` in either operand order; NULL literals never match.
fn is_field_equals_literal(e: &Expr) -> bool {
    match e {
        Expr::BinaryOp {
            left,
            op: BinaryOp::Eq,
            right,
        } => matches!(
            (left.as_ref(), right.as_ref()),
            (Expr::Column(_), Expr::Literal(v)) | (Expr::Literal(v), Expr::Column(_))
                if *v != LiteralValue::Null
        ),
        _ => false,
    }
}

/// `AND` of `column op literal` comparisons, literal on either side.
fn is_literal_comparison_conjunction(e: &Expr) -> bool {
    match e {
        Expr::And(a, b) => {
            is_literal_comparison_conjunction(a) && is_literal_comparison_conjunction(b)
        }
        Expr::BinaryOp { left, right, .. } => matches!(
            (left.as_ref(), right.as_ref()),
            (Expr::Column(_), Expr::Literal(_)) | (Expr::Literal(_), Expr::Column(_))
        ),
        _ => false,
    }
}
