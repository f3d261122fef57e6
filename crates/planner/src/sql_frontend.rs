use std::collections::HashSet;

use fedq_common::{FedqError, Result};
use sqlparser::ast::{
    BinaryOperator as SqlBinaryOp, Expr as SqlExpr, FunctionArg, FunctionArgExpr,
    FunctionArguments, GroupByExpr, Ident, JoinConstraint, JoinOperator, ObjectName, OrderByExpr,
    Query, SelectItem, SetExpr, Statement, TableFactor, TableWithJoins, UnaryOperator, Value,
};

use crate::logical_plan::{
    AggExpr, BinaryOp, Expr, LiteralValue, LogicalPlan, SortDirection, SortKey, SourceKind,
};
use crate::optimizer::{pushdown_predicates, ActiveBuyersPlan, SourceScan};

/// Where a table lives and which columns it exposes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSource {
    pub source: String,
    pub kind: SourceKind,
    pub columns: Vec<String>,
}

/// Table metadata lookup used while binding names.
pub trait CatalogProvider {
    fn resolve_table(&self, table: &str) -> Result<TableSource>;
}

/// Convert SQL text into a pushed-down logical plan.
pub fn sql_to_logical(sql: &str, catalog: &dyn CatalogProvider) -> Result<LogicalPlan> {
    let stmt = fedq_sql::parse_one(sql)?;
    plan_logical_from_ast(&stmt, catalog)
}

/// Planner Bridge entry point: canonical plan followed by per-source predicate pushdown.
///
/// A query of the join-group-order-paginate shape comes out of here in the form the
/// strategy selector recognizes.
pub fn plan_logical_from_ast(stmt: &Statement, catalog: &dyn CatalogProvider) -> Result<LogicalPlan> {
    let canonical = plan(stmt, catalog)?;
    pushdown_predicates(canonical)
}

/// Legacy-compatible planner: the WHERE clause stays a coordinator-side `Filter` above
/// the join, so the result is always executed operator-by-operator.
pub fn plan(stmt: &Statement, catalog: &dyn CatalogProvider) -> Result<LogicalPlan> {
    match stmt {
        Statement::Query(q) => query_to_logical(q, catalog),
        _ => Err(FedqError::Unsupported(
            "only SELECT queries are supported".to_string(),
        )),
    }
}

/// Build the per-customer event count template without going through SQL text:
/// customers joined with events on `customer_id`, filtered to one `event_type`, grouped
/// by customer, output `{customer_id, n}`.
pub fn plan_event_counts_per_customer(
    catalog: &dyn CatalogProvider,
    event_type: &str,
    order_by: &[SortKey],
    offset: i64,
    limit: Option<i64>,
) -> Result<LogicalPlan> {
    let customers = catalog.resolve_table("customers")?;
    let events = catalog.resolve_table("events")?;
    for key in order_by {
        if key.column != "customer_id" && key.column != "n" {
            return Err(FedqError::Unsupported(format!(
                "ORDER BY column '{}' is not in the SELECT/GROUP BY list",
                key.column
            )));
        }
    }
    if order_by.is_empty() {
        return Err(FedqError::Unsupported(
            "event count template requires ORDER BY".to_string(),
        ));
    }

    let join = LogicalPlan::Join {
        left: Box::new(LogicalPlan::Scan {
            source: customers.source,
            kind: customers.kind,
            table: "customers".to_string(),
            alias: "c".to_string(),
            predicate: None,
        }),
        right: Box::new(LogicalPlan::Scan {
            source: events.source,
            kind: events.kind,
            table: "events".to_string(),
            alias: "e".to_string(),
            predicate: Some(Expr::col("event_type").equals(Expr::lit(event_type))),
        }),
        on: ("c.customer_id".to_string(), "e.customer_id".to_string()),
    };
    let aggregate = LogicalPlan::Aggregate {
        group_exprs: vec![(Expr::col("c.customer_id"), "customer_id".to_string())],
        aggr_exprs: vec![(AggExpr::Count(Expr::col("e.event_id")), "n".to_string())],
        input: Box::new(join),
    };
    let sorted = LogicalPlan::Sort {
        keys: order_by.to_vec(),
        input: Box::new(aggregate),
    };
    let paged = LogicalPlan::Paginate {
        offset,
        limit,
        input: Box::new(sorted),
    };
    Ok(LogicalPlan::Projection {
        exprs: vec![
            (Expr::col("customer_id"), "customer_id".to_string()),
            (Expr::col("n"), "n".to_string()),
        ],
        input: Box::new(paged),
    })
}

/// Build the active-buyers query: customers with an order on or after
/// `order_date_cutoff` and at least one `event_type` event, counted per region.
pub fn plan_active_buyers_by_region(
    catalog: &dyn CatalogProvider,
    order_date_cutoff: &str,
    event_type: &str,
) -> Result<ActiveBuyersPlan> {
    let orders = key_scan(
        catalog,
        "orders",
        "o",
        &["customer_id", "order_date"],
        Some(Expr::BinaryOp {
            left: Box::new(Expr::col("order_date")),
            op: BinaryOp::GtEq,
            right: Box::new(Expr::lit(order_date_cutoff)),
        }),
    )?;
    let events = key_scan(
        catalog,
        "events",
        "e",
        &["customer_id", "event_type"],
        Some(Expr::col("event_type").equals(Expr::lit(event_type))),
    )?;
    let customers = key_scan(catalog, "customers", "c", &["customer_id", "region"], None)?;
    Ok(ActiveBuyersPlan {
        orders,
        events,
        customers,
        group_column: "region".to_string(),
        count_output: "buyers".to_string(),
    })
}

/// Scan keyed on `customer_id`, checked to expose `columns`.
fn key_scan(
    catalog: &dyn CatalogProvider,
    table: &str,
    alias: &str,
    columns: &[&str],
    predicate: Option<Expr>,
) -> Result<SourceScan> {
    let source = catalog.resolve_table(table)?;
    if let Some(missing) = columns
        .iter()
        .find(|c| !source.columns.iter().any(|x| x == *c))
    {
        return Err(FedqError::Planning(format!("unknown column: {table}.{missing}")));
    }
    Ok(SourceScan {
        source: source.source,
        table: table.to_string(),
        alias: alias.to_string(),
        key_column: "customer_id".to_string(),
        predicate,
    })
}

struct Binding {
    alias: String,
    source: TableSource,
}

/// Name-resolution scope for one SELECT: the bound tables in FROM/JOIN order.
struct Scope {
    bindings: Vec<Binding>,
}

impl Scope {
    fn binding(&self, alias: &str) -> Option<&Binding> {
        self.bindings.iter().find(|b| b.alias == alias)
    }

    /// Resolve a column reference to `alias.column`.
    fn resolve(&self, parts: &[Ident]) -> Result<String> {
        match parts {
            [col] => {
                let name = ident_name(col);
                let owners = self
                    .bindings
                    .iter()
                    .filter(|b| b.source.columns.iter().any(|c| *c == name))
                    .collect::<Vec<_>>();
                match owners.as_slice() {
                    [b] => Ok(format!("{}.{name}", b.alias)),
                    [] => Err(FedqError::Planning(format!("unknown column: {name}"))),
                    _ => Err(FedqError::Planning(format!(
                        "ambiguous column '{name}'; qualify it with a table alias"
                    ))),
                }
            }
            [qualifier, col] => {
                let alias = ident_name(qualifier);
                let name = ident_name(col);
                let b = self
                    .binding(&alias)
                    .ok_or_else(|| FedqError::Planning(format!("unknown table alias: {alias}")))?;
                if !b.source.columns.iter().any(|c| *c == name) {
                    return Err(FedqError::Planning(format!("unknown column: {alias}.{name}")));
                }
                Ok(format!("{alias}.{name}"))
            }
            _ => Err(FedqError::Unsupported(format!(
                "column reference '{}' has too many parts",
                compound_ident_to_string(parts)
            ))),
        }
    }
}

/// One SELECT-list entry after binding.
enum SelectEntry {
    Column { qualified: String, output: String },
    Count { agg: AggExpr, output: String },
}

impl SelectEntry {
    fn output(&self) -> &str {
        match self {
            Self::Column { output, .. } | Self::Count { output, .. } => output,
        }
    }
}

fn query_to_logical(q: &Query, catalog: &dyn CatalogProvider) -> Result<LogicalPlan> {
    if q.with.is_some() {
        return Err(FedqError::Unsupported("WITH clauses are not supported".to_string()));
    }
    if q.fetch.is_some() || !q.limit_by.is_empty() {
        return Err(FedqError::Unsupported(
            "FETCH / LIMIT BY are not supported".to_string(),
        ));
    }
    let select = match &*q.body {
        SetExpr::Select(s) => s.as_ref(),
        _ => {
            return Err(FedqError::Unsupported(
                "only simple SELECT is supported (no UNION/EXCEPT/INTERSECT)".to_string(),
            ))
        }
    };
    if select.distinct.is_some() {
        return Err(FedqError::Unsupported("SELECT DISTINCT is not supported".to_string()));
    }
    if select.having.is_some() {
        return Err(FedqError::Unsupported("HAVING is not supported".to_string()));
    }

    // FROM + JOIN
    let (mut plan, scope) = from_to_plan(&select.from, catalog)?;

    // WHERE
    if let Some(selection) = &select.selection {
        plan = LogicalPlan::Filter {
            predicate: sql_expr_to_expr(selection, &scope)?,
            input: Box::new(plan),
        };
    }

    // SELECT list
    let mut entries = Vec::with_capacity(select.projection.len());
    for item in &select.projection {
        let entry = match item {
            SelectItem::UnnamedExpr(e) => select_entry(e, None, &scope)?,
            SelectItem::ExprWithAlias { expr, alias } => {
                select_entry(expr, Some(ident_name(alias)), &scope)?
            }
            _ => {
                return Err(FedqError::Unsupported(
                    "SELECT * is not supported (use explicit columns)".to_string(),
                ))
            }
        };
        if entries
            .iter()
            .any(|e: &SelectEntry| e.output() == entry.output())
        {
            return Err(FedqError::Planning(format!(
                "duplicate output column: {}",
                entry.output()
            )));
        }
        entries.push(entry);
    }

    let group_keys = group_by_columns(&select.group_by, &scope)?;
    let aggregating =
        !group_keys.is_empty() || entries.iter().any(|e| matches!(e, SelectEntry::Count { .. }));

    let order_by = q
        .order_by
        .as_ref()
        .map(|o| o.exprs.as_slice())
        .unwrap_or_default();

    if aggregating {
        // Every plain column must be a grouping column.
        for entry in &entries {
            if let SelectEntry::Column { qualified, .. } = entry {
                if !group_keys.contains(qualified) {
                    return Err(FedqError::Planning(format!(
                        "column {qualified} must appear in GROUP BY"
                    )));
                }
            }
        }

        // (qualified source column if any, output name) visible to ORDER BY.
        let mut visible: Vec<(Option<String>, String)> = vec![];
        let mut group_exprs = vec![];
        for g in &group_keys {
            let output = entries
                .iter()
                .find_map(|e| match e {
                    SelectEntry::Column { qualified, output } if qualified == g => {
                        Some(output.clone())
                    }
                    _ => None,
                })
                .unwrap_or_else(|| crate::logical_plan::strip_qualifier(g).to_string());
            visible.push((Some(g.clone()), output.clone()));
            group_exprs.push((Expr::Column(g.clone()), output));
        }
        let mut aggr_exprs = vec![];
        for entry in &entries {
            if let SelectEntry::Count { agg, output } = entry {
                visible.push((None, output.clone()));
                aggr_exprs.push((agg.clone(), output.clone()));
            }
        }
        plan = LogicalPlan::Aggregate {
            group_exprs,
            aggr_exprs: aggr_exprs.clone(),
            input: Box::new(plan),
        };

        let keys = order_by
            .iter()
            .map(|o| order_key(o, &visible, &aggr_exprs, &scope))
            .collect::<Result<Vec<_>>>()?;
        plan = sort_and_paginate(plan, keys, q)?;

        let exprs = entries
            .iter()
            .map(|e| (Expr::Column(e.output().to_string()), e.output().to_string()))
            .collect();
        Ok(LogicalPlan::Projection {
            exprs,
            input: Box::new(plan),
        })
    } else {
        let mut visible = vec![];
        let mut exprs = vec![];
        for entry in &entries {
            if let SelectEntry::Column { qualified, output } = entry {
                visible.push((Some(qualified.clone()), output.clone()));
                exprs.push((Expr::Column(qualified.clone()), output.clone()));
            }
        }
        plan = LogicalPlan::Projection {
            exprs,
            input: Box::new(plan),
        };
        let keys = order_by
            .iter()
            .map(|o| order_key(o, &visible, &[], &scope))
            .collect::<Result<Vec<_>>>()?;
        sort_and_paginate(plan, keys, q)
    }
}

fn sort_and_paginate(mut plan: LogicalPlan, keys: Vec<SortKey>, q: &Query) -> Result<LogicalPlan> {
    if !keys.is_empty() {
        plan = LogicalPlan::Sort {
            keys,
            input: Box::new(plan),
        };
    }
    let offset = q
        .offset
        .as_ref()
        .map(|o| page_literal(&o.value, "OFFSET"))
        .transpose()?;
    let limit = q
        .limit
        .as_ref()
        .map(|l| page_literal(l, "LIMIT"))
        .transpose()?;
    if offset.is_some() || limit.is_some() {
        plan = LogicalPlan::Paginate {
            offset: offset.unwrap_or(0),
            limit,
            input: Box::new(plan),
        };
    }
    Ok(plan)
}

fn from_to_plan(from: &[TableWithJoins], catalog: &dyn CatalogProvider) -> Result<(LogicalPlan, Scope)> {
    if from.len() != 1 {
        return Err(FedqError::Unsupported(
            "exactly one FROM item (optionally with JOINs) is supported".to_string(),
        ));
    }
    let twj = &from[0];

    let mut scope = Scope { bindings: vec![] };
    let mut plan = table_factor_to_scan(&twj.relation, catalog, &mut scope)?;
    for j in &twj.joins {
        let right = table_factor_to_scan(&j.relation, catalog, &mut scope)?;
        let constraint = match &j.join_operator {
            JoinOperator::Inner(c) => c,
            _ => {
                return Err(FedqError::Unsupported(
                    "only INNER JOIN is supported".to_string(),
                ))
            }
        };
        let on = match constraint {
            JoinConstraint::On(expr) => equi_join_pair(expr, &scope)?,
            _ => {
                return Err(FedqError::Unsupported(
                    "JOIN requires an ON condition".to_string(),
                ))
            }
        };
        plan = LogicalPlan::Join {
            left: Box::new(plan),
            right: Box::new(right),
            on,
        };
    }

    let sources = scope
        .bindings
        .iter()
        .map(|b| b.source.source.as_str())
        .collect::<HashSet<_>>();
    if sources.len() > 2 {
        return Err(FedqError::Unsupported(
            "queries referencing more than two sources are not supported".to_string(),
        ));
    }
    Ok((plan, scope))
}

fn table_factor_to_scan(
    tf: &TableFactor,
    catalog: &dyn CatalogProvider,
    scope: &mut Scope,
) -> Result<LogicalPlan> {
    match tf {
        TableFactor::Table { name, alias, .. } => {
            let table = object_name_to_string(name);
            let source = catalog.resolve_table(&table)?;
            let alias = alias
                .as_ref()
                .map(|a| ident_name(&a.name))
                .unwrap_or_else(|| table.clone());
            if scope.binding(&alias).is_some() {
                return Err(FedqError::Planning(format!(
                    "table alias '{alias}' is bound twice"
                )));
            }
            let scan = LogicalPlan::Scan {
                source: source.source.clone(),
                kind: source.kind,
                table,
                alias: alias.clone(),
                predicate: None,
            };
            scope.bindings.push(Binding { alias, source });
            Ok(scan)
        }
        _ => Err(FedqError::Unsupported(
            "only simple table names in FROM are supported".to_string(),
        )),
    }
}

/// Resolve `a.x = b.y` into `(left column, right column)`.
fn equi_join_pair(expr: &SqlExpr, scope: &Scope) -> Result<(String, String)> {
    match expr {
        SqlExpr::Nested(inner) => equi_join_pair(inner, scope),
        SqlExpr::BinaryOp {
            left,
            op: SqlBinaryOp::Eq,
            right,
        } => {
            let l = column_ref(left, scope)?.ok_or_else(non_equi)?;
            let r = column_ref(right, scope)?.ok_or_else(non_equi)?;
            // the newest binding is the right side, everything bound before it the left
            let Some((newest, _)) = scope.bindings.split_last() else {
                return Err(non_equi());
            };
            let owner = |c: &str| crate::logical_plan::split_qualified(c).0.map(str::to_string);
            let is_new = |c: &str| owner(c).as_deref() == Some(newest.alias.as_str());
            match (is_new(&l), is_new(&r)) {
                (false, true) => Ok((l, r)),
                (true, false) => Ok((r, l)),
                _ => Err(FedqError::Unsupported(
                    "join condition must compare one column from each side".to_string(),
                )),
            }
        }
        SqlExpr::BinaryOp {
            op: SqlBinaryOp::And,
            ..
        } => Err(FedqError::Unsupported(
            "multi-column join conditions are not supported".to_string(),
        )),
        _ => Err(non_equi()),
    }
}

fn non_equi() -> FedqError {
    FedqError::Unsupported("JOIN ... ON must be an equi-join (a = b)".to_string())
}

fn column_ref(e: &SqlExpr, scope: &Scope) -> Result<Option<String>> {
    match e {
        SqlExpr::Identifier(id) => scope.resolve(std::slice::from_ref(id)).map(Some),
        SqlExpr::CompoundIdentifier(parts) => scope.resolve(parts).map(Some),
        SqlExpr::Nested(inner) => column_ref(inner, scope),
        _ => Ok(None),
    }
}

fn select_entry(e: &SqlExpr, alias: Option<String>, scope: &Scope) -> Result<SelectEntry> {
    if let Some(agg) = try_parse_agg(e, scope)? {
        return Ok(SelectEntry::Count {
            agg,
            output: alias.unwrap_or_else(|| "count".to_string()),
        });
    }
    match column_ref(e, scope)? {
        Some(qualified) => {
            let output = alias.unwrap_or_else(|| {
                crate::logical_plan::strip_qualifier(&qualified).to_string()
            });
            Ok(SelectEntry::Column { qualified, output })
        }
        None => Err(FedqError::Unsupported(format!(
            "only column references and COUNT are supported in SELECT, got: {e}"
        ))),
    }
}

fn group_by_columns(g: &GroupByExpr, scope: &Scope) -> Result<Vec<String>> {
    match g {
        GroupByExpr::Expressions(es, _mods) => es
            .iter()
            .map(|e| {
                column_ref(e, scope)?.ok_or_else(|| {
                    FedqError::Unsupported(format!("GROUP BY supports columns only, got: {e}"))
                })
            })
            .collect(),
        GroupByExpr::All(_mods) => Err(FedqError::Unsupported(
            "GROUP BY ALL is not supported".to_string(),
        )),
    }
}

fn try_parse_agg(e: &SqlExpr, scope: &Scope) -> Result<Option<AggExpr>> {
    let func = match e {
        SqlExpr::Function(f) => f,
        _ => return Ok(None),
    };
    let fname = object_name_to_string(&func.name).to_uppercase();
    if fname != "COUNT" {
        let kind = match fname.as_str() {
            "SUM" | "MIN" | "MAX" | "AVG" => "aggregate",
            _ => "function",
        };
        return Err(FedqError::Unsupported(format!(
            "{kind} {fname} is not supported (only COUNT)"
        )));
    }
    if func.over.is_some() || func.filter.is_some() {
        return Err(FedqError::Unsupported(
            "COUNT with OVER/FILTER is not supported".to_string(),
        ));
    }
    let list = match &func.args {
        FunctionArguments::List(list) => list,
        _ => {
            return Err(FedqError::Unsupported(
                "COUNT requires one argument".to_string(),
            ))
        }
    };
    if list.duplicate_treatment.is_some() {
        return Err(FedqError::Unsupported(
            "COUNT(DISTINCT ...) is not supported".to_string(),
        ));
    }
    match list.args.as_slice() {
        [FunctionArg::Unnamed(FunctionArgExpr::Wildcard)] => Ok(Some(AggExpr::CountStar)),
        [FunctionArg::Unnamed(FunctionArgExpr::Expr(arg))] => match column_ref(arg, scope)? {
            Some(col) => Ok(Some(AggExpr::Count(Expr::Column(col)))),
            None => match arg {
                // COUNT(1) counts rows.
                SqlExpr::Value(Value::Number(_, _)) => Ok(Some(AggExpr::CountStar)),
                _ => Err(FedqError::Unsupported(format!(
                    "COUNT argument must be a column or *, got: {arg}"
                ))),
            },
        },
        _ => Err(FedqError::Unsupported(
            "COUNT requires exactly one argument".to_string(),
        )),
    }
}

/// Resolve one ORDER BY item to an output column of the operator below the sort.
fn order_key(
    o: &OrderByExpr,
    visible: &[(Option<String>, String)],
    aggs: &[(AggExpr, String)],
    scope: &Scope,
) -> Result<SortKey> {
    if o.nulls_first.is_some() {
        return Err(FedqError::Unsupported(
            "NULLS FIRST/LAST is not supported".to_string(),
        ));
    }
    let direction = match o.asc {
        Some(false) => SortDirection::Desc,
        _ => SortDirection::Asc,
    };
    let not_listed = |what: &str| {
        FedqError::Unsupported(format!(
            "ORDER BY column '{what}' is not in the SELECT/GROUP BY list"
        ))
    };

    let column = match &o.expr {
        // Output aliases win over source columns for bare names.
        SqlExpr::Identifier(id) if visible.iter().any(|(_, out)| *out == ident_name(id)) => {
            ident_name(id)
        }
        e @ SqlExpr::Function(_) => {
            let agg = try_parse_agg(e, scope)?.ok_or_else(|| not_listed(&e.to_string()))?;
            aggs.iter()
                .find(|(a, _)| *a == agg)
                .map(|(_, out)| out.clone())
                .ok_or_else(|| not_listed(&e.to_string()))?
        }
        e => {
            let qualified = column_ref(e, scope)?.ok_or_else(|| {
                FedqError::Unsupported(format!("ORDER BY supports columns only, got: {e}"))
            })?;
            visible
                .iter()
                .find(|(q, _)| q.as_deref() == Some(qualified.as_str()))
                .map(|(_, out)| out.clone())
                .ok_or_else(|| not_listed(&qualified))?
        }
    };
    Ok(SortKey { column, direction })
}

fn sql_expr_to_expr(e: &SqlExpr, scope: &Scope) -> Result<Expr> {
    match e {
        SqlExpr::Identifier(id) => Ok(Expr::Column(scope.resolve(std::slice::from_ref(id))?)),
        SqlExpr::CompoundIdentifier(parts) => Ok(Expr::Column(scope.resolve(parts)?)),
        SqlExpr::Value(v) => Ok(Expr::Literal(sql_value_to_literal(v)?)),
        SqlExpr::Nested(inner) => sql_expr_to_expr(inner, scope),
        SqlExpr::IsNull(inner) => Ok(Expr::IsNull(Box::new(sql_expr_to_expr(inner, scope)?))),
        SqlExpr::IsNotNull(inner) => {
            Ok(Expr::IsNotNull(Box::new(sql_expr_to_expr(inner, scope)?)))
        }
        SqlExpr::UnaryOp {
            op: UnaryOperator::Not,
            expr,
        } => Ok(Expr::Not(Box::new(sql_expr_to_expr(expr, scope)?))),
        SqlExpr::UnaryOp {
            op: UnaryOperator::Minus,
            expr,
        } => match sql_expr_to_expr(expr, scope)? {
            Expr::Literal(LiteralValue::Int64(i)) => Ok(Expr::Literal(LiteralValue::Int64(-i))),
            _ => Err(FedqError::Unsupported(format!(
                "unary minus is only supported on integer literals: {e}"
            ))),
        },
        SqlExpr::BinaryOp { left, op, right } => {
            // AND/OR are represented as BinaryOp too
            if *op == SqlBinaryOp::And {
                return Ok(Expr::And(
                    Box::new(sql_expr_to_expr(left, scope)?),
                    Box::new(sql_expr_to_expr(right, scope)?),
                ));
            }
            if *op == SqlBinaryOp::Or {
                return Ok(Expr::Or(
                    Box::new(sql_expr_to_expr(left, scope)?),
                    Box::new(sql_expr_to_expr(right, scope)?),
                ));
            }
            Ok(Expr::BinaryOp {
                left: Box::new(sql_expr_to_expr(left, scope)?),
                op: sql_binop_to_binop(op)?,
                right: Box::new(sql_expr_to_expr(right, scope)?),
            })
        }
        _ => Err(FedqError::Unsupported(format!(
            "unsupported SQL expression: {e}"
        ))),
    }
}

fn sql_value_to_literal(v: &Value) -> Result<LiteralValue> {
    match v {
        Value::Number(s, _) => s.parse::<i64>().map(LiteralValue::Int64).map_err(|_| {
            FedqError::Unsupported(format!("only integer numeric literals are supported: {s}"))
        }),
        Value::SingleQuotedString(s) => Ok(LiteralValue::Utf8(s.clone())),
        Value::Boolean(b) => Ok(LiteralValue::Boolean(*b)),
        Value::Null => Ok(LiteralValue::Null),
        _ => Err(FedqError::Unsupported(format!(
            "unsupported SQL literal: {v}"
        ))),
    }
}

/// OFFSET/LIMIT value as written, sign included.
fn page_literal(e: &SqlExpr, what: &str) -> Result<i64> {
    match e {
        SqlExpr::Value(Value::Number(s, _)) => s
            .parse::<i64>()
            .map_err(|_| FedqError::Planning(format!("{what} must be an integer, got {s}"))),
        SqlExpr::UnaryOp {
            op: UnaryOperator::Minus,
            expr,
        } => page_literal(expr, what).map(|v| -v),
        SqlExpr::Nested(inner) => page_literal(inner, what),
        _ => Err(FedqError::Planning(format!(
            "{what} must be an integer literal, got {e}"
        ))),
    }
}

fn sql_binop_to_binop(op: &SqlBinaryOp) -> Result<BinaryOp> {
    Ok(match op {
        SqlBinaryOp::Eq => BinaryOp::Eq,
        SqlBinaryOp::NotEq => BinaryOp::NotEq,
        SqlBinaryOp::Lt => BinaryOp::Lt,
        SqlBinaryOp::LtEq => BinaryOp::LtEq,
        SqlBinaryOp::Gt => BinaryOp::Gt,
        SqlBinaryOp::GtEq => BinaryOp::GtEq,
        _ => {
            return Err(FedqError::Unsupported(format!(
                "unsupported binary operator: {op}"
            )))
        }
    })
}

/// Unquoted identifiers fold to lower case.
fn ident_name(id: &Ident) -> String {
    if id.quote_style.is_some() {
        id.value.clone()
    } else {
        id.value.to_lowercase()
    }
}

fn object_name_to_string(n: &ObjectName) -> String {
    n.0.iter().map(ident_name).collect::<Vec<_>>().join(".")
}

fn compound_ident_to_string(parts: &[Ident]) -> String {
    parts.iter().map(ident_name).collect::<Vec<_>>().join(".")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    struct TestCatalog {
        tables: HashMap<String, TableSource>,
    }

    impl TestCatalog {
        fn federated() -> Self {
            let mut tables = HashMap::new();
            tables.insert(
                "customers".to_string(),
                TableSource {
                    source: "relational".to_string(),
                    kind: SourceKind::Relational,
                    columns: vec!["customer_id".into(), "region".into(), "segment".into()],
                },
            );
            tables.insert(
                "orders".to_string(),
                TableSource {
                    source: "relational".to_string(),
                    kind: SourceKind::Relational,
                    columns: vec![
                        "order_id".into(),
                        "customer_id".into(),
                        "order_date".into(),
                        "status".into(),
                    ],
                },
            );
            tables.insert(
                "events".to_string(),
                TableSource {
                    source: "document".to_string(),
                    kind: SourceKind::Document,
                    columns: vec!["event_id".into(), "customer_id".into(), "event_type".into()],
                },
            );
            tables.insert(
                "tickets".to_string(),
                TableSource {
                    source: "helpdesk".to_string(),
                    kind: SourceKind::Document,
                    columns: vec!["ticket_id".into(), "customer_id".into()],
                },
            );
            Self { tables }
        }
    }

    impl CatalogProvider for TestCatalog {
        fn resolve_table(&self, table: &str) -> Result<TableSource> {
            self.tables
                .get(table)
                .cloned()
                .ok_or_else(|| FedqError::Planning(format!("unknown table: {table}")))
        }
    }

    const TEMPLATE: &str = "SELECT c.customer_id, COUNT(e.event_id) AS n \
        FROM customers c JOIN events e ON c.customer_id = e.customer_id \
        WHERE e.event_type = 'page_view' \
        GROUP BY c.customer_id \
        ORDER BY n DESC, c.customer_id ASC \
        LIMIT 10 OFFSET 1000";

    fn plan_sql(sql: &str) -> Result<LogicalPlan> {
        let stmt = fedq_sql::parse_one(sql)?;
        plan(&stmt, &TestCatalog::federated())
    }

    #[test]
    fn template_plan_preserves_order_keys_and_page() {
        let plan = plan_sql(TEMPLATE).expect("plan");
        let LogicalPlan::Projection { exprs, input } = plan else {
            panic!("expected projection root");
        };
        assert_eq!(
            exprs.iter().map(|(_, n)| n.as_str()).collect::<Vec<_>>(),
            vec!["customer_id", "n"]
        );
        let LogicalPlan::Paginate {
            offset,
            limit,
            input,
        } = *input
        else {
            panic!("expected paginate");
        };
        assert_eq!((offset, limit), (1000, Some(10)));
        let LogicalPlan::Sort { keys, input } = *input else {
            panic!("expected sort");
        };
        assert_eq!(keys, vec![SortKey::desc("n"), SortKey::asc("customer_id")]);
        assert!(matches!(*input, LogicalPlan::Aggregate { .. }));
    }

    #[test]
    fn legacy_planner_keeps_filter_above_join() {
        let plan = plan_sql(TEMPLATE).expect("plan");
        let mut node = &plan;
        loop {
            match node {
                LogicalPlan::Filter { input, predicate } => {
                    assert!(matches!(**input, LogicalPlan::Join { .. }));
                    assert_eq!(
                        *predicate,
                        Expr::col("e.event_type").equals(Expr::lit("page_view"))
                    );
                    break;
                }
                other => node = other.children()[0],
            }
        }
    }

    #[test]
    fn negative_page_values_are_preserved_literally() {
        let plan = plan_sql(
            "SELECT c.customer_id FROM customers c ORDER BY c.customer_id LIMIT -1 OFFSET -5",
        )
        .expect("plan");
        let LogicalPlan::Paginate { offset, limit, .. } = plan else {
            panic!("expected paginate root");
        };
        assert_eq!((offset, limit), (-5, Some(-1)));
    }

    #[test]
    fn reversed_join_condition_is_normalized() {
        let plan = plan_sql(
            "SELECT c.region FROM customers c JOIN events e ON e.customer_id = c.customer_id",
        )
        .expect("plan");
        let LogicalPlan::Projection { input, .. } = plan else {
            panic!("expected projection");
        };
        let LogicalPlan::Join { on, .. } = *input else {
            panic!("expected join");
        };
        assert_eq!(on, ("c.customer_id".to_string(), "e.customer_id".to_string()));
    }

    #[test]
    fn rejects_unsupported_shapes() {
        let cases = [
            "SELECT c.customer_id FROM customers c JOIN events e ON c.customer_id < e.customer_id",
            "SELECT c.customer_id FROM customers c JOIN events e ON c.customer_id = e.customer_id \
             JOIN tickets t ON c.customer_id = t.customer_id",
            "SELECT c.customer_id FROM customers c JOIN orders o ON c.customer_id = o.customer_id \
             JOIN events e ON o.order_id = c.customer_id",
            "SELECT c.customer_id FROM customers c LEFT JOIN events e ON c.customer_id = e.customer_id",
            "SELECT c.customer_id, SUM(e.event_id) FROM customers c JOIN events e \
             ON c.customer_id = e.customer_id GROUP BY c.customer_id",
            "SELECT c.customer_id, COUNT(e.event_id) AS n FROM customers c JOIN events e \
             ON c.customer_id = e.customer_id GROUP BY c.customer_id ORDER BY c.region",
            "SELECT * FROM customers",
            "SELECT c.customer_id FROM customers c UNION SELECT o.customer_id FROM orders o",
        ];
        for sql in cases {
            let err = plan_sql(sql).expect_err(sql);
            assert_eq!(err.kind(), "unsupported", "{sql}: {err}");
        }
    }

    #[test]
    fn several_tables_from_one_source_join_left_deep() {
        let plan = plan_sql(
            "SELECT c.region, COUNT(*) AS n FROM customers c \
             JOIN orders o ON o.customer_id = c.customer_id \
             JOIN events e ON c.customer_id = e.customer_id \
             GROUP BY c.region",
        )
        .expect("plan");
        let LogicalPlan::Projection { input, .. } = plan else {
            panic!("expected projection");
        };
        let LogicalPlan::Aggregate { input, .. } = *input else {
            panic!("expected aggregate");
        };
        let LogicalPlan::Join { left, right, on } = *input else {
            panic!("expected join");
        };
        assert_eq!(on, ("c.customer_id".to_string(), "e.customer_id".to_string()));
        assert!(matches!(*right, LogicalPlan::Scan { ref alias, .. } if alias == "e"));
        let LogicalPlan::Join { on, .. } = *left else {
            panic!("expected inner join");
        };
        assert_eq!(on, ("c.customer_id".to_string(), "o.customer_id".to_string()));
    }

    #[test]
    fn unknown_names_are_planning_errors() {
        for sql in [
            "SELECT x.customer_id FROM customers c",
            "SELECT c.nope FROM customers c",
            "SELECT customer_id FROM customers c JOIN events e ON c.customer_id = e.customer_id",
            "SELECT c.customer_id FROM warehouse c",
        ] {
            let err = plan_sql(sql).expect_err(sql);
            assert_eq!(err.kind(), "planning", "{sql}: {err}");
        }
    }

    #[test]
    fn order_by_aggregate_call_resolves_to_its_alias() {
        let plan = plan_sql(
            "SELECT c.customer_id, COUNT(e.event_id) AS n FROM customers c JOIN events e \
             ON c.customer_id = e.customer_id GROUP BY c.customer_id \
             ORDER BY COUNT(e.event_id) DESC",
        )
        .expect("plan");
        let LogicalPlan::Projection { input, .. } = plan else {
            panic!("expected projection");
        };
        let LogicalPlan::Sort { keys, .. } = *input else {
            panic!("expected sort");
        };
        assert_eq!(keys, vec![SortKey::desc("n")]);
    }

    #[test]
    fn active_buyers_plan_pushes_one_predicate_per_key_source() {
        let plan = plan_active_buyers_by_region(&TestCatalog::federated(), "2024-01-01", "add_to_cart")
            .expect("plan");
        assert_eq!(plan.orders.source, "relational");
        assert_eq!(plan.events.source, "document");
        assert_eq!(plan.customers.predicate, None);
        assert_eq!(
            plan.events.predicate,
            Some(Expr::col("event_type").equals(Expr::lit("add_to_cart")))
        );
        assert!(matches!(
            plan.orders.predicate,
            Some(Expr::BinaryOp { op: BinaryOp::GtEq, .. })
        ));
    }

    #[test]
    fn template_builder_matches_sql_after_pushdown() {
        let from_sql = sql_to_logical(TEMPLATE, &TestCatalog::federated()).expect("plan sql");
        let built = plan_event_counts_per_customer(
            &TestCatalog::federated(),
            "page_view",
            &[SortKey::desc("n"), SortKey::asc("customer_id")],
            1000,
            Some(10),
        )
        .expect("build");
        assert_eq!(from_sql, built);
    }
}
