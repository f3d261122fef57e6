//! Parser boundary. Malformed SQL is the parser's failure domain and surfaces as
//! [`FedqError::Planning`]; everything downstream consumes the resulting AST read-only.

use fedq_common::{FedqError, Result};
pub use sqlparser::ast::Statement;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

pub fn parse_sql(sql: &str) -> Result<Vec<Statement>> {
    let dialect = GenericDialect {};
    Parser::parse_sql(&dialect, sql).map_err(|e| FedqError::Planning(e.to_string()))
}

/// Parse exactly one statement.
pub fn parse_one(sql: &str) -> Result<Statement> {
    let mut stmts = parse_sql(sql)?;
    if stmts.len() != 1 {
        return Err(FedqError::Unsupported(format!(
            "expected exactly one SQL statement, got {}",
            stmts.len()
        )));
    }
    Ok(stmts.remove(0))
}
