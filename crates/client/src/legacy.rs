//! Reference executor that interprets the parsed query directly.
//!
//! It shares only the connector interface with the logical-plan paths: name binding,
//! predicate extraction, counting, ordering and paging are all done here from the AST.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use fedq_common::{FedqError, Result};
use fedq_execution::{validate_page, Row, ScalarValue};
use fedq_planner::{
    combine_conjuncts, BinaryOp, CatalogProvider, Expr, LiteralValue, SourceKind, TableSource,
};
use fedq_sql::Statement;
use fedq_storage::{CountRequest, KeySet};
use sqlparser::ast::{
    BinaryOperator, Expr as SqlExpr, FunctionArg, FunctionArgExpr, FunctionArguments,
    GroupByExpr, Ident, JoinConstraint, JoinOperator, SelectItem, SetExpr, TableFactor,
    UnaryOperator, Value,
};
use tracing::debug;

use crate::runtime::ExecState;

struct Side {
    alias: String,
    table: String,
    source: TableSource,
    key: String,
    conjuncts: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Counted {
    Rows,
    Relational(String),
    Document(String),
}

/// The template query, pulled out of the AST.
struct TemplateQuery {
    relational: Side,
    document: Side,
    counted: Counted,
    group_output: String,
    count_output: String,
    select: Vec<String>,
    /// `(output column, descending)`
    order_by: Vec<(String, bool)>,
    offset: i64,
    limit: Option<i64>,
}

pub(crate) async fn execute_legacy(
    stmt: &Statement,
    catalog: &dyn CatalogProvider,
    state: &ExecState<'_>,
) -> Result<(Vec<String>, Vec<Row>)> {
    let q = interpret(stmt, catalog)?;
    validate_page(q.offset, q.limit)?;

    let rel = state.connectors.get(&q.relational.source.source)?;
    let doc = state.connectors.get(&q.document.source.source)?;
    let rel_pred = (!q.relational.conjuncts.is_empty())
        .then(|| combine_conjuncts(q.relational.conjuncts.clone()));
    let doc_pred = combine_conjuncts(q.document.conjuncts.clone());

    let (doc_keys, rel_keys) = state
        .fan_out(
            state.call(
                doc.as_ref(),
                "distinct_keys_matching",
                doc.distinct_keys_matching(&q.document.table, &q.document.key, Some(&doc_pred)),
            ),
            state.call(
                rel.as_ref(),
                "distinct_keys_matching",
                rel.distinct_keys_matching(
                    &q.relational.table,
                    &q.relational.key,
                    rel_pred.as_ref(),
                ),
            ),
        )
        .await?;
    let keys: KeySet = doc_keys.intersection(&rel_keys).cloned().collect();
    debug!(query_id = %state.query_id, keys = keys.len(), "legacy key intersection");

    let mut rel_columns = vec![q.relational.key.clone()];
    if let Counted::Relational(c) = &q.counted {
        if *c != q.relational.key {
            rel_columns.push(c.clone());
        }
    }
    let doc_count_column = match &q.counted {
        Counted::Document(c) => Some(c.as_str()),
        _ => None,
    };
    let (rel_rows, doc_counts) = state
        .fan_out(
            state.call(
                rel.as_ref(),
                "rows_for_keys",
                rel.rows_for_keys(
                    &q.relational.table,
                    &q.relational.key,
                    &keys,
                    rel_pred.as_ref(),
                    Some(rel_columns.as_slice()),
                ),
            ),
            state.call(
                doc.as_ref(),
                "count_by_key",
                doc.count_by_key(CountRequest {
                    table: &q.document.table,
                    key_column: &q.document.key,
                    predicate: Some(&doc_pred),
                    count_column: doc_count_column,
                    keys: Some(&keys),
                }),
            ),
        )
        .await?;

    // key -> (rows, rows with a non-null counted column)
    let mut rel_counts: BTreeMap<ScalarValue, (i64, i64)> = BTreeMap::new();
    for row in &rel_rows {
        let key = row.get(&q.relational.key).cloned().unwrap_or(ScalarValue::Null);
        if key.is_null() {
            continue;
        }
        let counted = match &q.counted {
            Counted::Relational(c) => row.get(c).is_some_and(|v| !v.is_null()),
            _ => true,
        };
        let entry = rel_counts.entry(key).or_insert((0, 0));
        entry.0 += 1;
        if counted {
            entry.1 += 1;
        }
    }

    let mut grouped = Vec::new();
    for (key, (rel_rows, rel_non_null)) in rel_counts {
        let Some(dc) = doc_counts.get(&key) else {
            continue;
        };
        let (a, b) = match q.counted {
            Counted::Rows => (rel_rows, dc.rows),
            Counted::Relational(_) => (rel_non_null, dc.rows),
            Counted::Document(_) => (rel_rows, dc.non_null),
        };
        let n = a
            .checked_mul(b)
            .ok_or_else(|| FedqError::Execution(format!("count overflows for key {key:?}")))?;
        grouped.push([key, ScalarValue::Int64(n)]);
    }

    let order = q
        .order_by
        .iter()
        .map(|(col, desc)| (usize::from(*col != q.group_output), *desc))
        .collect::<Vec<_>>();
    grouped.sort_by(|a, b| {
        for (i, desc) in &order {
            let ord = a[*i].cmp(&b[*i]);
            let ord = if *desc { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });

    let skip = q.offset as usize;
    let take = q.limit.map_or(usize::MAX, |l| l as usize);
    let rows = grouped
        .into_iter()
        .skip(skip)
        .take(take)
        .map(|[key, n]| {
            let mut row = Row::new();
            for name in &q.select {
                let value = if *name == q.count_output { &n } else { &key };
                row.push(name.clone(), value.clone());
            }
            row
        })
        .collect();
    Ok((q.select, rows))
}

fn unsupported(msg: impl Into<String>) -> FedqError {
    FedqError::Unsupported(format!("legacy executor: {}", msg.into()))
}

fn interpret(stmt: &Statement, catalog: &dyn CatalogProvider) -> Result<TemplateQuery> {
    let Statement::Query(query) = stmt else {
        return Err(unsupported("only SELECT queries are supported"));
    };
    if query.with.is_some() || query.fetch.is_some() || !query.limit_by.is_empty() {
        return Err(unsupported("WITH / FETCH / LIMIT BY are not supported"));
    }
    let SetExpr::Select(select) = &*query.body else {
        return Err(unsupported("set operations are not supported"));
    };
    if select.distinct.is_some() || select.having.is_some() {
        return Err(unsupported("DISTINCT / HAVING are not supported"));
    }

    // FROM a JOIN b ON a.k = b.k
    let [twj] = select.from.as_slice() else {
        return Err(unsupported("expected exactly one FROM item"));
    };
    let [join] = twj.joins.as_slice() else {
        return Err(unsupported("expected exactly one JOIN"));
    };
    let JoinOperator::Inner(JoinConstraint::On(on)) = &join.join_operator else {
        return Err(unsupported("expected INNER JOIN ... ON"));
    };
    let mut sides = vec![
        bind_table(&twj.relation, catalog)?,
        bind_table(&join.relation, catalog)?,
    ];
    if sides[0].alias == sides[1].alias {
        return Err(FedqError::Planning(format!(
            "table alias '{}' is bound twice",
            sides[0].alias
        )));
    }
    let (l, r) = match on {
        SqlExpr::BinaryOp {
            left,
            op: BinaryOperator::Eq,
            right,
        } => (column(left, &sides)?, column(right, &sides)?),
        _ => return Err(unsupported("JOIN condition must be a single equality")),
    };
    let (Some(l), Some(r)) = (l, r) else {
        return Err(unsupported("JOIN condition must compare two columns"));
    };
    if l.0 == r.0 {
        return Err(unsupported("JOIN condition must compare one column from each side"));
    }
    sides[l.0].key = l.1.clone();
    sides[r.0].key = r.1.clone();

    // WHERE: conjunction of per-source predicates
    if let Some(selection) = &select.selection {
        for conjunct in flatten_and(selection) {
            let (idx, pred) = side_predicate(conjunct, &sides)?;
            sides[idx].conjuncts.push(pred);
        }
    }

    // GROUP BY the join key
    let group = match &select.group_by {
        GroupByExpr::Expressions(es, _) if es.len() == 1 => column(&es[0], &sides)?,
        _ => None,
    }
    .ok_or_else(|| unsupported("expected GROUP BY on one column"))?;
    if sides[group.0].key != group.1 {
        return Err(unsupported("GROUP BY must use the join key"));
    }

    // SELECT: the group column and one COUNT
    let mut select_names = Vec::new();
    let mut group_output = None;
    let mut count = None;
    for item in &select.projection {
        let (e, alias) = match item {
            SelectItem::UnnamedExpr(e) => (e, None),
            SelectItem::ExprWithAlias { expr, alias } => (expr, Some(ident(alias))),
            _ => return Err(unsupported("wildcards are not supported")),
        };
        let name = if let Some(counted) = count_arg(e, &sides)? {
            if count.is_some() {
                return Err(unsupported("expected a single COUNT"));
            }
            let name = alias.unwrap_or_else(|| "count".to_string());
            count = Some((counted, name.clone()));
            name
        } else {
            match column(e, &sides)? {
                Some(c) if c == group => {
                    let name = alias.unwrap_or_else(|| c.1.clone());
                    group_output = Some(name.clone());
                    name
                }
                Some(c) => {
                    return Err(FedqError::Planning(format!(
                        "column {}.{} must appear in GROUP BY",
                        sides[c.0].alias, c.1
                    )))
                }
                None => return Err(unsupported(format!("unsupported SELECT item {e}"))),
            }
        };
        if select_names.contains(&name) {
            return Err(FedqError::Planning(format!("duplicate output column: {name}")));
        }
        select_names.push(name);
    }
    let Some((counted_at, count_output)) = count else {
        return Err(unsupported("expected a COUNT aggregate"));
    };
    let group_output = group_output.unwrap_or_else(|| group.1.clone());

    // ORDER BY output names, the group column or the COUNT expression
    let mut order_by = Vec::new();
    for o in query.order_by.iter().flat_map(|o| o.exprs.iter()) {
        if o.nulls_first.is_some() {
            return Err(unsupported("NULLS FIRST/LAST is not supported"));
        }
        let desc = o.asc == Some(false);
        let target = match &o.expr {
            SqlExpr::Identifier(id) if ident(id) == group_output => group_output.clone(),
            SqlExpr::Identifier(id) if ident(id) == count_output => count_output.clone(),
            e => match count_arg(e, &sides)? {
                Some(c) if c == counted_at => count_output.clone(),
                Some(_) => return Err(unsupported(format!("ORDER BY {e} is not selected"))),
                None if column(e, &sides)? == Some(group.clone()) => group_output.clone(),
                None => return Err(unsupported(format!("ORDER BY {e} is not selected"))),
            },
        };
        order_by.push((target, desc));
    }

    let offset = match &query.offset {
        Some(o) => integer(&o.value)?,
        None => 0,
    };
    let limit = query.limit.as_ref().map(integer).transpose()?;

    let counted = match counted_at {
        None => Counted::Rows,
        Some((idx, col)) => match sides[idx].source.kind {
            SourceKind::Relational => Counted::Relational(col),
            SourceKind::Document => Counted::Document(col),
        },
    };
    let (relational, document) = split_sides(sides)?;
    if document.conjuncts.is_empty() {
        return Err(unsupported("a filter on the document source is required"));
    }
    Ok(TemplateQuery {
        relational,
        document,
        counted,
        group_output,
        count_output,
        select: select_names,
        order_by,
        offset,
        limit,
    })
}

fn bind_table(tf: &TableFactor, catalog: &dyn CatalogProvider) -> Result<Side> {
    let TableFactor::Table { name, alias, .. } = tf else {
        return Err(unsupported("only plain table names are supported"));
    };
    let table = name.0.iter().map(ident).collect::<Vec<_>>().join(".");
    let source = catalog.resolve_table(&table)?;
    Ok(Side {
        alias: alias
            .as_ref()
            .map(|a| ident(&a.name))
            .unwrap_or_else(|| table.clone()),
        table,
        source,
        key: String::new(),
        conjuncts: Vec::new(),
    })
}

fn split_sides(sides: Vec<Side>) -> Result<(Side, Side)> {
    let mut it = sides.into_iter();
    let (Some(a), Some(b)) = (it.next(), it.next()) else {
        return Err(unsupported("expected two sources"));
    };
    match (a.source.kind, b.source.kind) {
        (SourceKind::Relational, SourceKind::Document) => Ok((a, b)),
        (SourceKind::Document, SourceKind::Relational) => Ok((b, a)),
        _ => Err(unsupported("expected one relational and one document source")),
    }
}

/// `(side index, bare column)` for a column reference, `None` for anything else.
fn column(e: &SqlExpr, sides: &[Side]) -> Result<Option<(usize, String)>> {
    let has = |s: &Side, c: &str| s.source.columns.iter().any(|x| x == c);
    match e {
        SqlExpr::Nested(inner) => column(inner, sides),
        SqlExpr::Identifier(id) => {
            let name = ident(id);
            let owners = (0..sides.len())
                .filter(|i| has(&sides[*i], &name))
                .collect::<Vec<_>>();
            match owners.as_slice() {
                [i] => Ok(Some((*i, name))),
                [] => Err(FedqError::Planning(format!("unknown column: {name}"))),
                _ => Err(FedqError::Planning(format!(
                    "ambiguous column '{name}'; qualify it with a table alias"
                ))),
            }
        }
        SqlExpr::CompoundIdentifier(parts) if parts.len() == 2 => {
            let alias = ident(&parts[0]);
            let name = ident(&parts[1]);
            let i = sides
                .iter()
                .position(|s| s.alias == alias)
                .ok_or_else(|| FedqError::Planning(format!("unknown table alias: {alias}")))?;
            if !has(&sides[i], &name) {
                return Err(FedqError::Planning(format!("unknown column: {alias}.{name}")));
            }
            Ok(Some((i, name)))
        }
        _ => Ok(None),
    }
}

fn flatten_and(e: &SqlExpr) -> Vec<&SqlExpr> {
    match e {
        SqlExpr::Nested(inner) => flatten_and(inner),
        SqlExpr::BinaryOp {
            left,
            op: BinaryOperator::And,
            right,
        } => {
            let mut v = flatten_and(left);
            v.extend(flatten_and(right));
            v
        }
        other => vec![other],
    }
}

/// A predicate over the columns of one side, with bare column names.
fn side_predicate(e: &SqlExpr, sides: &[Side]) -> Result<(usize, Expr)> {
    let both = |l: &SqlExpr, r: &SqlExpr| -> Result<(usize, Expr, Expr)> {
        let (i, a) = side_predicate(l, sides)?;
        let (j, b) = side_predicate(r, sides)?;
        if i != j {
            return Err(unsupported(format!("filter spans both sources: {e}")));
        }
        Ok((i, a, b))
    };
    match e {
        SqlExpr::Nested(inner) => side_predicate(inner, sides),
        SqlExpr::BinaryOp {
            left,
            op: BinaryOperator::Or,
            right,
        } => both(left, right).map(|(i, a, b)| (i, Expr::Or(Box::new(a), Box::new(b)))),
        SqlExpr::BinaryOp {
            left,
            op: BinaryOperator::And,
            right,
        } => both(left, right).map(|(i, a, b)| (i, a.and(b))),
        SqlExpr::UnaryOp {
            op: UnaryOperator::Not,
            expr,
        } => side_predicate(expr, sides).map(|(i, p)| (i, Expr::Not(Box::new(p)))),
        SqlExpr::IsNull(inner) | SqlExpr::IsNotNull(inner) => {
            let Some((i, c)) = column(inner, sides)? else {
                return Err(unsupported(format!("unsupported filter {e}")));
            };
            let col = Box::new(Expr::Column(c));
            let pred = if matches!(e, SqlExpr::IsNull(_)) {
                Expr::IsNull(col)
            } else {
                Expr::IsNotNull(col)
            };
            Ok((i, pred))
        }
        _ => comparison(e, sides),
    }
}

/// `column op literal` as a pushed predicate on a bare column.
fn comparison(e: &SqlExpr, sides: &[Side]) -> Result<(usize, Expr)> {
    let SqlExpr::BinaryOp { left, op, right } = e else {
        return Err(unsupported(format!("unsupported filter {e}")));
    };
    let op = match op {
        BinaryOperator::Eq => BinaryOp::Eq,
        BinaryOperator::NotEq => BinaryOp::NotEq,
        BinaryOperator::Lt => BinaryOp::Lt,
        BinaryOperator::LtEq => BinaryOp::LtEq,
        BinaryOperator::Gt => BinaryOp::Gt,
        BinaryOperator::GtEq => BinaryOp::GtEq,
        other => return Err(unsupported(format!("unsupported operator {other}"))),
    };
    let (idx, col, lit, op) = match (column(left, sides)?, column(right, sides)?) {
        (Some((i, c)), None) => (i, c, literal(right)?, op),
        (None, Some((i, c))) => (i, c, literal(left)?, mirror(op)),
        _ => return Err(unsupported(format!("filter must compare a column with a literal: {e}"))),
    };
    Ok((
        idx,
        Expr::BinaryOp {
            left: Box::new(Expr::Column(col)),
            op,
            right: Box::new(Expr::Literal(lit)),
        },
    ))
}

fn mirror(op: BinaryOp) -> BinaryOp {
    match op {
        BinaryOp::Lt => BinaryOp::Gt,
        BinaryOp::LtEq => BinaryOp::GtEq,
        BinaryOp::Gt => BinaryOp::Lt,
        BinaryOp::GtEq => BinaryOp::LtEq,
        other => other,
    }
}

fn literal(e: &SqlExpr) -> Result<LiteralValue> {
    match e {
        SqlExpr::Nested(inner) => literal(inner),
        SqlExpr::Value(Value::SingleQuotedString(s)) => Ok(LiteralValue::Utf8(s.clone())),
        SqlExpr::Value(Value::Boolean(b)) => Ok(LiteralValue::Boolean(*b)),
        SqlExpr::Value(Value::Null) => Ok(LiteralValue::Null),
        SqlExpr::Value(Value::Number(..)) | SqlExpr::UnaryOp { .. } => {
            integer(e).map(LiteralValue::Int64).map_err(|_| unsupported(format!("bad literal {e}")))
        }
        _ => Err(unsupported(format!("expected a literal, got {e}"))),
    }
}

fn integer(e: &SqlExpr) -> Result<i64> {
    match e {
        SqlExpr::Nested(inner) => integer(inner),
        SqlExpr::Value(Value::Number(s, _)) => s
            .parse::<i64>()
            .map_err(|_| FedqError::Planning(format!("expected an integer, got {s}"))),
        SqlExpr::UnaryOp {
            op: UnaryOperator::Minus,
            expr,
        } => integer(expr).map(|v| -v),
        _ => Err(FedqError::Planning(format!("expected an integer literal, got {e}"))),
    }
}

/// `Some(None)` for COUNT(*) / COUNT(1), `Some(Some(column))` for COUNT(column).
#[allow(clippy::type_complexity)]
fn count_arg(e: &SqlExpr, sides: &[Side]) -> Result<Option<Option<(usize, String)>>> {
    let SqlExpr::Function(f) = e else {
        return Ok(None);
    };
    let name = f.name.0.iter().map(ident).collect::<Vec<_>>().join(".");
    if name != "count" {
        return Err(unsupported(format!("function {name} is not supported")));
    }
    let FunctionArguments::List(list) = &f.args else {
        return Err(unsupported("COUNT requires one argument"));
    };
    if list.duplicate_treatment.is_some() || f.over.is_some() || f.filter.is_some() {
        return Err(unsupported("COUNT modifiers are not supported"));
    }
    match list.args.as_slice() {
        [FunctionArg::Unnamed(FunctionArgExpr::Wildcard)] => Ok(Some(None)),
        [FunctionArg::Unnamed(FunctionArgExpr::Expr(SqlExpr::Value(Value::Number(..))))] => {
            Ok(Some(None))
        }
        [FunctionArg::Unnamed(FunctionArgExpr::Expr(arg))] => match column(arg, sides)? {
            Some(c) => Ok(Some(Some(c))),
            None => Err(unsupported(format!("COUNT argument {arg} is not a column"))),
        },
        _ => Err(unsupported("COUNT requires one argument")),
    }
}

fn ident(id: &Ident) -> String {
    if id.quote_style.is_some() {
        id.value.clone()
    } else {
        id.value.to_lowercase()
    }
}
