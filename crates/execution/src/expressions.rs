use fedq_common::{FedqError, Result};
use fedq_planner::{BinaryOp, Expr};

use crate::row::{Row, ScalarValue};

/// Evaluate `expr` against `row` with SQL three-valued logic.
///
/// Boolean operators return `Boolean` or `Null`. Comparisons involving NULL, or values of
/// different types, are unknown (`Null`).
pub fn eval_expr(expr: &Expr, row: &Row) -> Result<ScalarValue> {
    match expr {
        Expr::Column(c) => row
            .get(c)
            .cloned()
            .ok_or_else(|| FedqError::Execution(format!("column '{c}' not found in row"))),
        Expr::Literal(v) => Ok(ScalarValue::from(v)),
        Expr::BinaryOp { left, op, right } => {
            let l = eval_expr(left, row)?;
            let r = eval_expr(right, row)?;
            Ok(compare_scalar_values(*op, &l, &r)
                .map(ScalarValue::Boolean)
                .unwrap_or(ScalarValue::Null))
        }
        Expr::And(a, b) => {
            let l = truth(&eval_expr(a, row)?)?;
            if l == Some(false) {
                return Ok(ScalarValue::Boolean(false));
            }
            let r = truth(&eval_expr(b, row)?)?;
            Ok(match (l, r) {
                (_, Some(false)) => ScalarValue::Boolean(false),
                (Some(true), Some(true)) => ScalarValue::Boolean(true),
                _ => ScalarValue::Null,
            })
        }
        Expr::Or(a, b) => {
            let l = truth(&eval_expr(a, row)?)?;
            if l == Some(true) {
                return Ok(ScalarValue::Boolean(true));
            }
            let r = truth(&eval_expr(b, row)?)?;
            Ok(match (l, r) {
                (_, Some(true)) => ScalarValue::Boolean(true),
                (Some(false), Some(false)) => ScalarValue::Boolean(false),
                _ => ScalarValue::Null,
            })
        }
        Expr::Not(x) => Ok(match truth(&eval_expr(x, row)?)? {
            Some(b) => ScalarValue::Boolean(!b),
            None => ScalarValue::Null,
        }),
        Expr::IsNull(x) => Ok(ScalarValue::Boolean(eval_expr(x, row)?.is_null())),
        Expr::IsNotNull(x) => Ok(ScalarValue::Boolean(!eval_expr(x, row)?.is_null())),
    }
}

/// Evaluate a filter predicate; only a definite `true` keeps the row.
pub fn eval_predicate(expr: &Expr, row: &Row) -> Result<bool> {
    Ok(truth(&eval_expr(expr, row)?)? == Some(true))
}

fn truth(v: &ScalarValue) -> Result<Option<bool>> {
    match v {
        ScalarValue::Boolean(b) => Ok(Some(*b)),
        ScalarValue::Null => Ok(None),
        other => Err(FedqError::Execution(format!(
            "expected boolean predicate, got {} value {other}",
            other.type_name()
        ))),
    }
}

fn compare_scalar_values(op: BinaryOp, lhs: &ScalarValue, rhs: &ScalarValue) -> Option<bool> {
    use ScalarValue::*;
    let ord = match (lhs, rhs) {
        (Null, _) | (_, Null) => return None,
        (Int64(a), Int64(b)) => a.cmp(b),
        (Utf8(a), Utf8(b)) => a.cmp(b),
        (Boolean(a), Boolean(b)) => a.cmp(b),
        _ => return None,
    };
    Some(match op {
        BinaryOp::Eq => ord.is_eq(),
        BinaryOp::NotEq => ord.is_ne(),
        BinaryOp::Lt => ord.is_lt(),
        BinaryOp::LtEq => ord.is_le(),
        BinaryOp::Gt => ord.is_gt(),
        BinaryOp::GtEq => ord.is_ge(),
    })
}
