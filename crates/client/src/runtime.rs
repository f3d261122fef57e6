use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use fedq_common::{FedqError, MetricsRegistry, QueryId, Result};
use fedq_execution::{
    filter, hash_aggregate, hash_join, paginate, project, qualify, sort_rows, validate_page, Row,
    ScalarValue,
};
use fedq_planner::{
    expr_columns, select_strategy, split_qualified, ActiveBuyersPlan, AggExpr, CountTarget, Expr,
    FastPathDescriptor, LogicalPlan,
};
use fedq_storage::{ConnectorRegistry, CountRequest, KeyCount, KeySet, SourceConnector};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Which executor produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionPath {
    Fast,
    Generic,
    Legacy,
}

impl ExecutionPath {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::Generic => "generic",
            Self::Legacy => "legacy",
        }
    }
}

impl fmt::Display for ExecutionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Timings {
    /// Time spent inside connector calls, summed over calls.
    pub source_ms: f64,
    /// Everything else: planning hand-off, join, aggregate, sort, paginate.
    pub coordinator_ms: f64,
}

/// Per-execution metadata returned next to the rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionMeta {
    pub query_id: QueryId,
    pub path: ExecutionPath,
    pub elapsed_ms: f64,
    pub row_count: usize,
    pub timings: Timings,
}

/// State owned by one execution: connector snapshot, timers, fan-out policy.
pub(crate) struct ExecState<'a> {
    pub(crate) query_id: QueryId,
    pub(crate) connectors: &'a ConnectorRegistry,
    metrics: &'a MetricsRegistry,
    concurrent_fanout: bool,
    started: Instant,
    source_nanos: AtomicU64,
}

impl<'a> ExecState<'a> {
    pub(crate) fn new(
        query_id: QueryId,
        connectors: &'a ConnectorRegistry,
        metrics: &'a MetricsRegistry,
        concurrent_fanout: bool,
    ) -> Self {
        Self {
            query_id,
            connectors,
            metrics,
            concurrent_fanout,
            started: Instant::now(),
            source_nanos: AtomicU64::new(0),
        }
    }

    /// Await one connector round-trip, recording its latency.
    pub(crate) async fn call<T>(
        &self,
        connector: &dyn SourceConnector,
        operation: &'static str,
        fut: BoxFuture<'_, Result<T>>,
    ) -> Result<T> {
        let start = Instant::now();
        let out = fut.await;
        let elapsed = start.elapsed();
        self.source_nanos
            .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
        self.metrics
            .record_connector_call(connector.name(), operation, elapsed.as_secs_f64());
        debug!(
            query_id = %self.query_id,
            connector = connector.name(),
            operation,
            elapsed_ms = elapsed.as_secs_f64() * 1e3,
            ok = out.is_ok(),
            "connector call"
        );
        out
    }

    /// Fan-out/fan-in barrier over two independent source calls.
    pub(crate) async fn fan_out<A, B>(
        &self,
        a: impl Future<Output = Result<A>>,
        b: impl Future<Output = Result<B>>,
    ) -> Result<(A, B)> {
        if self.concurrent_fanout {
            futures::future::try_join(a, b).await
        } else {
            let a = a.await?;
            let b = b.await?;
            Ok((a, b))
        }
    }

    /// Close the execution: metrics, completion log, metadata.
    pub(crate) fn finish(self, path: ExecutionPath, rows: &[Row]) -> ExecutionMeta {
        let elapsed = self.started.elapsed();
        let elapsed_ms = elapsed.as_secs_f64() * 1e3;
        let source_ms = self.source_nanos.load(Ordering::Relaxed) as f64 / 1e6;
        let meta = ExecutionMeta {
            query_id: self.query_id,
            path,
            elapsed_ms,
            row_count: rows.len(),
            timings: Timings {
                source_ms,
                coordinator_ms: (elapsed_ms - source_ms).max(0.0),
            },
        };
        self.metrics
            .record_query(path.as_str(), rows.len() as u64, elapsed.as_secs_f64());
        info!(
            query_id = %meta.query_id,
            path = path.as_str(),
            rows = meta.row_count,
            elapsed_ms = meta.elapsed_ms,
            source_ms = meta.timings.source_ms,
            "query finished"
        );
        meta
    }
}

/// Executes logical plans: the fast path when the plan matches the template, the generic
/// operator walk otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct FederatedRuntime {
    force_generic: bool,
}

impl FederatedRuntime {
    pub fn new(force_generic: bool) -> Self {
        Self { force_generic }
    }

    pub(crate) async fn execute(
        &self,
        plan: &LogicalPlan,
        state: &ExecState<'_>,
    ) -> Result<(Vec<Row>, ExecutionPath)> {
        plan.validate()?;
        match select_strategy(plan) {
            Some(descriptor) if !self.force_generic => {
                debug!(query_id = %state.query_id, "plan matches fast-path template");
                let rows = run_fast_path(&descriptor, state).await?;
                Ok((rows, ExecutionPath::Fast))
            }
            matched => {
                if matched.is_some() {
                    warn!(
                        query_id = %state.query_id,
                        strategy = "generic",
                        "fast path disabled by configuration; walking plan generically"
                    );
                }
                let rows = run_generic(plan, state).await?;
                Ok((rows, ExecutionPath::Generic))
            }
        }
    }
}

/// Push the filters, intersect keys, count per key, then sort, paginate and project.
async fn run_fast_path(d: &FastPathDescriptor, state: &ExecState<'_>) -> Result<Vec<Row>> {
    let page = validate_page(d.offset, d.limit)?;
    let rel = state.connectors.get(&d.relational.source)?;
    let doc = state.connectors.get(&d.document.source)?;
    let rel_pred = d.relational.predicate.as_ref();
    let doc_pred = d.document.predicate.as_ref();

    let doc_keys = state.call(
        doc.as_ref(),
        "distinct_keys_matching",
        doc.distinct_keys_matching(&d.document.table, &d.document.key_column, doc_pred),
    );
    // Without a relational predicate the relational side is never enumerated: the grouped
    // count below, restricted to the document keys, performs the join.
    let keys = match rel_pred {
        Some(p) => {
            let rel_keys = state.call(
                rel.as_ref(),
                "distinct_keys_matching",
                rel.distinct_keys_matching(&d.relational.table, &d.relational.key_column, Some(p)),
            );
            let (doc_keys, rel_keys) = state.fan_out(doc_keys, rel_keys).await?;
            doc_keys.intersection(&rel_keys).cloned().collect()
        }
        None => doc_keys.await?,
    };
    debug!(query_id = %state.query_id, keys = keys.len(), "fast path key set");

    let (rel_count_col, doc_count_col) = match &d.count {
        CountTarget::Star => (None, None),
        CountTarget::Relational(c) => (Some(c.as_str()), None),
        CountTarget::Document(c) => (None, Some(c.as_str())),
    };
    let rel_counts = state.call(
        rel.as_ref(),
        "count_by_key",
        rel.count_by_key(CountRequest {
            table: &d.relational.table,
            key_column: &d.relational.key_column,
            predicate: rel_pred,
            count_column: rel_count_col,
            keys: Some(&keys),
        }),
    );
    let doc_counts = state.call(
        doc.as_ref(),
        "count_by_key",
        doc.count_by_key(CountRequest {
            table: &d.document.table,
            key_column: &d.document.key_column,
            predicate: doc_pred,
            count_column: doc_count_col,
            keys: Some(&keys),
        }),
    );
    let (rel_counts, doc_counts) = state.fan_out(rel_counts, doc_counts).await?;

    let mut rows = Vec::with_capacity(rel_counts.len());
    for (key, rc) in &rel_counts {
        let Some(dc) = doc_counts.get(key) else {
            continue;
        };
        let n = joined_count(&d.count, rc, dc)?;
        rows.push(Row::from_pairs([
            (d.group_output.clone(), key.clone()),
            (d.count_output.clone(), n.into()),
        ]));
    }
    sort_rows(&mut rows, &d.order_by)?;
    let rows = paginate(rows, page);
    let exprs = d
        .projection
        .iter()
        .map(|(src, name)| (Expr::col(src.clone()), name.clone()))
        .collect::<Vec<_>>();
    project(&rows, &exprs)
}

/// Intersect the customer keys of both key sources, then group the matching customers.
pub(crate) async fn run_active_buyers(
    p: &ActiveBuyersPlan,
    state: &ExecState<'_>,
) -> Result<Vec<Row>> {
    let orders = state.connectors.get(&p.orders.source)?;
    let events = state.connectors.get(&p.events.source)?;
    let customers = state.connectors.get(&p.customers.source)?;

    let (order_keys, event_keys) = state
        .fan_out(
            state.call(
                orders.as_ref(),
                "distinct_keys_matching",
                orders.distinct_keys_matching(
                    &p.orders.table,
                    &p.orders.key_column,
                    p.orders.predicate.as_ref(),
                ),
            ),
            state.call(
                events.as_ref(),
                "distinct_keys_matching",
                events.distinct_keys_matching(
                    &p.events.table,
                    &p.events.key_column,
                    p.events.predicate.as_ref(),
                ),
            ),
        )
        .await?;
    let keys: KeySet = order_keys.intersection(&event_keys).cloned().collect();
    debug!(query_id = %state.query_id, keys = keys.len(), "active buyer keys");
    if keys.is_empty() {
        return Ok(Vec::new());
    }

    let projection = [p.customers.key_column.clone(), p.group_column.clone()];
    let rows = state
        .call(
            customers.as_ref(),
            "rows_for_keys",
            customers.rows_for_keys(
                &p.customers.table,
                &p.customers.key_column,
                &keys,
                p.customers.predicate.as_ref(),
                Some(projection.as_slice()),
            ),
        )
        .await?;

    let mut groups: BTreeMap<ScalarValue, i64> = BTreeMap::new();
    for row in &rows {
        let group = row.get(&p.group_column).cloned().unwrap_or(ScalarValue::Null);
        *groups.entry(group).or_insert(0) += 1;
    }
    Ok(groups
        .into_iter()
        .map(|(group, n)| {
            Row::from_pairs([
                (p.group_column.clone(), group),
                (p.count_output.clone(), n.into()),
            ])
        })
        .collect())
}

/// Count of one key over the joined rows: every relational row pairs with every document
/// row, so the counted side contributes its non-null count and the other its row count.
pub(crate) fn joined_count(target: &CountTarget, rel: &KeyCount, doc: &KeyCount) -> Result<i64> {
    let (a, b) = match target {
        CountTarget::Star => (rel.rows, doc.rows),
        CountTarget::Relational(_) => (rel.non_null, doc.rows),
        CountTarget::Document(_) => (rel.rows, doc.non_null),
    };
    a.checked_mul(b)
        .ok_or_else(|| FedqError::Execution(format!("joined count overflows: {a} x {b}")))
}

async fn run_generic(plan: &LogicalPlan, state: &ExecState<'_>) -> Result<Vec<Row>> {
    validate_pages(plan)?;
    let projections = scan_projections(plan);
    eval_plan(plan, state, &projections).await
}

/// Page bounds are checked before any source is contacted.
fn validate_pages(plan: &LogicalPlan) -> Result<()> {
    if let LogicalPlan::Paginate { offset, limit, .. } = plan {
        validate_page(*offset, *limit)?;
    }
    plan.children().into_iter().try_for_each(validate_pages)
}

fn eval_plan<'a>(
    plan: &'a LogicalPlan,
    state: &'a ExecState<'a>,
    projections: &'a BTreeMap<String, Vec<String>>,
) -> BoxFuture<'a, Result<Vec<Row>>> {
    async move {
        match plan {
            LogicalPlan::Scan {
                source,
                table,
                alias,
                predicate,
                ..
            } => {
                let conn = state.connectors.get(source)?;
                let columns = projections.get(alias).map(Vec::as_slice);
                let rows = state
                    .call(
                        conn.as_ref(),
                        "scan",
                        conn.scan(table, predicate.as_ref(), columns),
                    )
                    .await?;
                Ok(qualify(rows, alias))
            }
            LogicalPlan::Filter { predicate, input } => {
                let rows = eval_plan(input, state, projections).await?;
                filter(rows, predicate)
            }
            LogicalPlan::Join { left, right, on } => {
                let (l, r) = state
                    .fan_out(
                        eval_plan(left, state, projections),
                        eval_plan(right, state, projections),
                    )
                    .await?;
                hash_join(l, r, &on.0, &on.1)
            }
            LogicalPlan::Aggregate {
                group_exprs,
                aggr_exprs,
                input,
            } => {
                let rows = eval_plan(input, state, projections).await?;
                hash_aggregate(&rows, group_exprs, aggr_exprs)
            }
            LogicalPlan::Sort { keys, input } => {
                let mut rows = eval_plan(input, state, projections).await?;
                sort_rows(&mut rows, keys)?;
                Ok(rows)
            }
            LogicalPlan::Paginate {
                offset,
                limit,
                input,
            } => {
                let page = validate_page(*offset, *limit)?;
                let rows = eval_plan(input, state, projections).await?;
                Ok(paginate(rows, page))
            }
            LogicalPlan::Projection { exprs, input } => {
                let rows = eval_plan(input, state, projections).await?;
                project(&rows, exprs)
            }
        }
    }
    .boxed()
}

/// Columns each scan alias must deliver to the operators above it.
fn scan_projections(plan: &LogicalPlan) -> BTreeMap<String, Vec<String>> {
    let mut needed: BTreeMap<String, BTreeSet<String>> = plan
        .scan_aliases()
        .into_iter()
        .map(|a| (a.to_string(), BTreeSet::new()))
        .collect();
    collect_plan_columns(plan, &mut needed);
    needed
        .into_iter()
        .map(|(alias, cols)| (alias, cols.into_iter().collect()))
        .collect()
}

fn collect_plan_columns(plan: &LogicalPlan, needed: &mut BTreeMap<String, BTreeSet<String>>) {
    match plan {
        // pushed predicates are evaluated by the source
        LogicalPlan::Scan { .. } => {}
        LogicalPlan::Filter { predicate, .. } => add_columns(predicate, needed),
        LogicalPlan::Join { on, .. } => {
            add_columns(&Expr::col(on.0.as_str()), needed);
            add_columns(&Expr::col(on.1.as_str()), needed);
        }
        LogicalPlan::Aggregate {
            group_exprs,
            aggr_exprs,
            ..
        } => {
            for (e, _) in group_exprs {
                add_columns(e, needed);
            }
            for (a, _) in aggr_exprs {
                if let AggExpr::Count(e) = a {
                    add_columns(e, needed);
                }
            }
        }
        LogicalPlan::Projection { exprs, .. } => {
            for (e, _) in exprs {
                add_columns(e, needed);
            }
        }
        LogicalPlan::Sort { .. } | LogicalPlan::Paginate { .. } => {}
    }
    for child in plan.children() {
        collect_plan_columns(child, needed);
    }
}

fn add_columns(e: &Expr, needed: &mut BTreeMap<String, BTreeSet<String>>) {
    for c in expr_columns(e) {
        if let (Some(alias), column) = split_qualified(&c) {
            if let Some(cols) = needed.get_mut(alias) {
                cols.insert(column.to_string());
            }
        }
    }
}
