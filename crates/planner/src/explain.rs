use crate::logical_plan::{AggExpr, BinaryOp, Expr, LiteralValue, LogicalPlan, SortDirection, SortKey};
use crate::optimizer::{ActiveBuyersPlan, CountTarget, FastPathDescriptor, SourceScan};

/// Render logical plan as human-readable multiline text.
pub fn explain_logical(plan: &LogicalPlan) -> String {
    let mut s = String::new();
    fmt_plan(plan, 0, &mut s);
    s
}

/// Render the fast-path descriptor: one block per pushed source, then the coordinator steps.
pub fn explain_fast_path(d: &FastPathDescriptor) -> String {
    let mut out = String::from("FastPath\n");
    fmt_source("relational", &d.relational, &mut out);
    fmt_source("document", &d.document, &mut out);
    let count = match &d.count {
        CountTarget::Star => "COUNT(*)".to_string(),
        CountTarget::Relational(c) => format!("COUNT({}.{c})", d.relational.alias),
        CountTarget::Document(c) => format!("COUNT({}.{c})", d.document.alias),
    };
    out.push_str(&format!(
        "  aggregate {} := {count} group_by {}\n",
        d.count_output, d.group_output
    ));
    out.push_str(&format!("  order_by {}\n", fmt_sort_keys(&d.order_by)));
    out.push_str(&format!(
        "  paginate offset={} limit={}\n",
        d.offset,
        fmt_limit(d.limit)
    ));
    let cols = d
        .projection
        .iter()
        .map(|(src, name)| {
            if src == name {
                name.clone()
            } else {
                format!("{name} := {src}")
            }
        })
        .collect::<Vec<_>>();
    out.push_str(&format!("  project {}\n", cols.join(", ")));
    out
}

pub fn explain_active_buyers(p: &ActiveBuyersPlan) -> String {
    let mut out = String::from("ActiveBuyers\n");
    fmt_source("orders", &p.orders, &mut out);
    fmt_source("events", &p.events, &mut out);
    out.push_str("  intersect keys\n");
    fmt_source("customers", &p.customers, &mut out);
    out.push_str(&format!(
        "  aggregate {} := COUNT(*) group_by {}\n",
        p.count_output, p.group_column
    ));
    out
}

fn fmt_source(role: &str, s: &SourceScan, out: &mut String) {
    out.push_str(&format!(
        "  {role} source={} table={} alias={} key={}\n",
        s.source, s.table, s.alias, s.key_column
    ));
    out.push_str(&format!(
        "    predicate={}\n",
        s.predicate.as_ref().map(fmt_expr).unwrap_or_else(|| "<none>".to_string())
    ));
}

fn fmt_plan(plan: &LogicalPlan, indent: usize, out: &mut String) {
    let pad = "  ".repeat(indent);
    match plan {
        LogicalPlan::Scan {
            source,
            kind,
            table,
            alias,
            predicate,
        } => {
            out.push_str(&format!(
                "{pad}Scan {table} AS {alias} source={source} kind={kind}\n"
            ));
            if let Some(p) = predicate {
                out.push_str(&format!("{pad}  pushed_predicate={}\n", fmt_expr(p)));
            }
        }
        LogicalPlan::Filter { predicate, input } => {
            out.push_str(&format!("{pad}Filter {}\n", fmt_expr(predicate)));
            fmt_plan(input, indent + 1, out);
        }
        LogicalPlan::Join { left, right, on } => {
            out.push_str(&format!("{pad}Join on {} = {}\n", on.0, on.1));
            out.push_str(&format!("{pad}  left:\n"));
            fmt_plan(left, indent + 2, out);
            out.push_str(&format!("{pad}  right:\n"));
            fmt_plan(right, indent + 2, out);
        }
        LogicalPlan::Aggregate {
            group_exprs,
            aggr_exprs,
            input,
        } => {
            out.push_str(&format!("{pad}Aggregate\n"));
            for (g, name) in group_exprs {
                out.push_str(&format!("{pad}  group {name} := {}\n", fmt_expr(g)));
            }
            for (a, name) in aggr_exprs {
                out.push_str(&format!("{pad}  {name} := {}\n", fmt_agg(a)));
            }
            fmt_plan(input, indent + 1, out);
        }
        LogicalPlan::Sort { keys, input } => {
            out.push_str(&format!("{pad}Sort {}\n", fmt_sort_keys(keys)));
            fmt_plan(input, indent + 1, out);
        }
        LogicalPlan::Paginate {
            offset,
            limit,
            input,
        } => {
            out.push_str(&format!(
                "{pad}Paginate offset={offset} limit={}\n",
                fmt_limit(*limit)
            ));
            fmt_plan(input, indent + 1, out);
        }
        LogicalPlan::Projection { exprs, input } => {
            out.push_str(&format!("{pad}Projection\n"));
            for (e, name) in exprs {
                out.push_str(&format!("{pad}  {name} := {}\n", fmt_expr(e)));
            }
            fmt_plan(input, indent + 1, out);
        }
    }
}

fn fmt_sort_keys(keys: &[SortKey]) -> String {
    keys.iter()
        .map(|k| {
            let dir = match k.direction {
                SortDirection::Asc => "ASC",
                SortDirection::Desc => "DESC",
            };
            format!("{} {dir}", k.column)
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn fmt_limit(limit: Option<i64>) -> String {
    limit.map(|l| l.to_string()).unwrap_or_else(|| "all".to_string())
}

fn fmt_agg(a: &AggExpr) -> String {
    match a {
        AggExpr::Count(e) => format!("COUNT({})", fmt_expr(e)),
        AggExpr::CountStar => "COUNT(*)".to_string(),
    }
}

fn fmt_expr(e: &Expr) -> String {
    match e {
        Expr::Column(c) => c.clone(),
        Expr::Literal(v) => fmt_literal(v),
        Expr::Not(x) => format!("NOT ({})", fmt_expr(x)),
        Expr::IsNull(x) => format!("{} IS NULL", fmt_expr(x)),
        Expr::IsNotNull(x) => format!("{} IS NOT NULL", fmt_expr(x)),
        Expr::And(a, b) => format!("({}) AND ({})", fmt_expr(a), fmt_expr(b)),
        Expr::Or(a, b) => format!("({}) OR ({})", fmt_expr(a), fmt_expr(b)),
        Expr::BinaryOp { left, op, right } => {
            format!("{} {} {}", fmt_expr(left), fmt_op(*op), fmt_expr(right))
        }
    }
}

fn fmt_literal(v: &LiteralValue) -> String {
    match v {
        LiteralValue::Int64(i) => i.to_string(),
        LiteralValue::Utf8(s) => format!("'{s}'"),
        LiteralValue::Boolean(b) => b.to_string(),
        LiteralValue::Null => "NULL".to_string(),
    }
}

fn fmt_op(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Eq => "=",
        BinaryOp::NotEq => "<>",
        BinaryOp::Lt => "<",
        BinaryOp::LtEq => "<=",
        BinaryOp::Gt => ">",
        BinaryOp::GtEq => ">=",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logical_plan::SourceKind;

    #[test]
    fn explain_shows_pushed_predicate_and_page() {
        let plan = LogicalPlan::Paginate {
            offset: 20,
            limit: None,
            input: Box::new(LogicalPlan::Scan {
                source: "document".to_string(),
                kind: SourceKind::Document,
                table: "events".to_string(),
                alias: "e".to_string(),
                predicate: Some(Expr::col("event_type").equals(Expr::lit("wishlist"))),
            }),
        };
        let text = explain_logical(&plan);
        assert!(text.contains("Paginate offset=20 limit=all"));
        assert!(text.contains("Scan events AS e source=document kind=document"));
        assert!(text.contains("pushed_predicate=event_type = 'wishlist'"));
    }

    #[test]
    fn active_buyers_explain_lists_sources_in_call_order() {
        let scan = |table: &str, predicate| SourceScan {
            source: "relational".to_string(),
            table: table.to_string(),
            alias: table[..1].to_string(),
            key_column: "customer_id".to_string(),
            predicate,
        };
        let plan = ActiveBuyersPlan {
            orders: scan("orders", None),
            events: scan("events", Some(Expr::col("event_type").equals(Expr::lit("checkout")))),
            customers: scan("customers", None),
            group_column: "region".to_string(),
            count_output: "buyers".to_string(),
        };
        let text = explain_active_buyers(&plan);
        let at = |needle: &str| text.find(needle).unwrap_or_else(|| panic!("{needle} in {text}"));
        assert!(at("table=orders") < at("table=events"));
        assert!(at("intersect keys") < at("table=customers"));
        assert!(text.contains("predicate=event_type = 'checkout'"));
        assert!(text.contains("buyers := COUNT(*) group_by region"));
    }
}
