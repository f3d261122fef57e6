use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use fedq_common::{FedqError, Result};
use fedq_planner::{AggExpr, Expr, SortDirection, SortKey};
use tracing::debug;

use crate::expressions::{eval_expr, eval_predicate};
use crate::row::{Row, ScalarValue};

/// Validated page window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    /// Rows to skip.
    pub offset: usize,
    /// Maximum rows to keep; `None` keeps the rest.
    pub limit: Option<usize>,
}

/// Reject negative bounds. Values are never clamped.
pub fn validate_page(offset: i64, limit: Option<i64>) -> Result<Page> {
    let offset = usize::try_from(offset)
        .map_err(|_| FedqError::InvalidPage(format!("offset must be >= 0, got {offset}")))?;
    let limit = limit
        .map(|l| {
            usize::try_from(l)
                .map_err(|_| FedqError::InvalidPage(format!("limit must be >= 0, got {l}")))
        })
        .transpose()?;
    Ok(Page { offset, limit })
}

/// Drop the first `page.offset` rows, keep at most `page.limit`.
pub fn paginate(rows: Vec<Row>, page: Page) -> Vec<Row> {
    let iter = rows.into_iter().skip(page.offset);
    match page.limit {
        Some(limit) => iter.take(limit).collect(),
        None => iter.collect(),
    }
}

/// Stable multi-key sort. Keys compare in declared order, each in its own direction.
pub fn sort_rows(rows: &mut [Row], keys: &[SortKey]) -> Result<()> {
    let Some(first) = rows.first() else {
        return Ok(());
    };
    let idx = keys
        .iter()
        .map(|k| {
            first.position(&k.column).map(|i| (i, k.direction)).ok_or_else(|| {
                FedqError::Execution(format!("sort key '{}' not found in input", k.column))
            })
        })
        .collect::<Result<Vec<_>>>()?;
    rows.sort_by(|a, b| compare_rows(a, b, &idx));
    Ok(())
}

fn compare_rows(a: &Row, b: &Row, idx: &[(usize, SortDirection)]) -> Ordering {
    for (i, dir) in idx {
        let ord = a.value_at(*i).cmp(&b.value_at(*i));
        let ord = match dir {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Inner equi-join on `left_key = right_key`.
///
/// The smaller input is built into a hash table; NULL keys never match. Output rows carry
/// the left row's cells followed by the right row's.
pub fn hash_join(
    left: Vec<Row>,
    right: Vec<Row>,
    left_key: &str,
    right_key: &str,
) -> Result<Vec<Row>> {
    let build_left = left.len() <= right.len();
    let (build_rows, probe_rows, build_key, probe_key) = if build_left {
        (&left, &right, left_key, right_key)
    } else {
        (&right, &left, right_key, left_key)
    };

    let mut ht: HashMap<&ScalarValue, Vec<usize>> = HashMap::new();
    for (idx, row) in build_rows.iter().enumerate() {
        let key = join_key(row, build_key)?;
        if key.is_null() {
            continue;
        }
        ht.entry(key).or_default().push(idx);
    }

    let mut out = Vec::new();
    for probe in probe_rows {
        let key = join_key(probe, probe_key)?;
        if key.is_null() {
            continue;
        }
        if let Some(build_matches) = ht.get(key) {
            for build_idx in build_matches {
                let build = &build_rows[*build_idx];
                out.push(if build_left {
                    build.concat(probe)
                } else {
                    probe.concat(build)
                });
            }
        }
    }
    debug!(
        operator = "HashJoin",
        build_side = if build_left { "left" } else { "right" },
        build_rows = build_rows.len(),
        probe_rows = probe_rows.len(),
        output_rows = out.len(),
        "hash join finished"
    );
    Ok(out)
}

fn join_key<'a>(row: &'a Row, key: &str) -> Result<&'a ScalarValue> {
    row.get(key)
        .ok_or_else(|| FedqError::Execution(format!("join key '{key}' not found in input")))
}

/// Group by `group_exprs` and compute COUNT aggregates.
///
/// Groups come out in ascending key order. Each output row holds the group outputs followed
/// by the aggregate outputs. Without group expressions a single row is produced even for
/// empty input.
pub fn hash_aggregate(
    rows: &[Row],
    group_exprs: &[(Expr, String)],
    aggr_exprs: &[(AggExpr, String)],
) -> Result<Vec<Row>> {
    let mut groups: BTreeMap<Vec<ScalarValue>, Vec<i64>> = BTreeMap::new();
    for row in rows {
        let key = group_exprs
            .iter()
            .map(|(e, _)| eval_expr(e, row))
            .collect::<Result<Vec<_>>>()?;
        let states = groups
            .entry(key)
            .or_insert_with(|| vec![0; aggr_exprs.len()]);
        for (state, (agg, _)) in states.iter_mut().zip(aggr_exprs) {
            let counted = match agg {
                AggExpr::CountStar => true,
                AggExpr::Count(e) => !eval_expr(e, row)?.is_null(),
            };
            if counted {
                *state += 1;
            }
        }
    }
    if groups.is_empty() && group_exprs.is_empty() {
        groups.insert(vec![], vec![0; aggr_exprs.len()]);
    }

    let out = groups
        .into_iter()
        .map(|(key, states)| {
            let mut row = Row::new();
            for ((_, name), v) in group_exprs.iter().zip(key) {
                row.push(name.clone(), v);
            }
            for ((_, name), n) in aggr_exprs.iter().zip(states) {
                row.push(name.clone(), ScalarValue::Int64(n));
            }
            row
        })
        .collect::<Vec<_>>();
    debug!(
        operator = "HashAggregate",
        input_rows = rows.len(),
        groups = out.len(),
        "aggregate finished"
    );
    Ok(out)
}

/// Keep rows for which `predicate` is definitely true.
pub fn filter(rows: Vec<Row>, predicate: &Expr) -> Result<Vec<Row>> {
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        if eval_predicate(predicate, &row)? {
            out.push(row);
        }
    }
    Ok(out)
}

/// Evaluate `exprs` per row into new rows named by the second tuple element.
pub fn project(rows: &[Row], exprs: &[(Expr, String)]) -> Result<Vec<Row>> {
    rows.iter()
        .map(|row| {
            let mut out = Row::new();
            for (e, name) in exprs {
                out.push(name.clone(), eval_expr(e, row)?);
            }
            Ok(out)
        })
        .collect()
}

/// Qualify every column of every row with `alias`.
pub fn qualify(rows: Vec<Row>, alias: &str) -> Vec<Row> {
    rows.into_iter().map(|r| r.qualified(alias)).collect()
}
