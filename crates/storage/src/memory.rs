use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use fedq_common::{FedqError, Result, SourceConfig};
use fedq_execution::{eval_predicate, Row, ScalarValue};
use fedq_planner::{expr_columns, Expr, SourceKind};
use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, info};

use crate::connector::{CountRequest, KeyCount, KeySet, SourceConnector};

const MEMORY_SCHEME: &str = "memory://";

/// In-process store of either kind.
///
/// Relational tables are rectangular: every referenced column must exist. Document
/// collections tolerate missing fields, which read as NULL.
#[derive(Debug)]
pub struct MemoryConnector {
    config: SourceConfig,
    kind: SourceKind,
    tables: RwLock<HashMap<String, Vec<Row>>>,
}

impl MemoryConnector {
    pub fn new(config: SourceConfig, kind: SourceKind) -> Result<Self> {
        if !config.uri.starts_with(MEMORY_SCHEME) {
            return Err(FedqError::InvalidConfig(format!(
                "memory connector '{}' needs a {MEMORY_SCHEME} uri, got '{}'",
                config.name, config.uri
            )));
        }
        info!(
            source = %config.name,
            kind = %kind,
            uri = %config.uri,
            database = %config.database,
            authenticated = config.user.is_some(),
            "memory connector ready"
        );
        Ok(Self {
            config,
            kind,
            tables: RwLock::new(HashMap::new()),
        })
    }

    /// Replace the contents of `table`.
    pub fn load_table(&self, table: impl Into<String>, rows: Vec<Row>) {
        self.tables
            .write()
            .expect("table lock poisoned")
            .insert(table.into(), rows);
    }

    pub fn table_names(&self) -> Vec<String> {
        let mut names = self
            .tables
            .read()
            .expect("table lock poisoned")
            .keys()
            .cloned()
            .collect::<Vec<_>>();
        names.sort();
        names
    }

    pub fn database(&self) -> &str {
        &self.config.database
    }

    fn err(&self, message: impl Into<String>) -> FedqError {
        FedqError::connector(&self.config.name, message)
    }

    /// Run `f` over the rows of `table` that match `predicate`.
    fn with_matching(
        &self,
        table: &str,
        predicate: Option<&Expr>,
        mut f: impl FnMut(&Row) -> Result<()>,
    ) -> Result<()> {
        let tables = self.tables.read().expect("table lock poisoned");
        let rows = tables
            .get(table)
            .ok_or_else(|| self.err(format!("unknown table '{table}'")))?;
        let referenced = predicate
            .map(|p| expr_columns(p).into_iter().collect::<Vec<_>>())
            .unwrap_or_default();
        for row in rows {
            if let Some(p) = predicate {
                let view = self.view(row, &referenced)?;
                if !eval_predicate(p, &view).map_err(|e| self.err(e.to_string()))? {
                    continue;
                }
            }
            f(row)?;
        }
        Ok(())
    }

    /// Row restricted to `columns`, in that order.
    fn view(&self, row: &Row, columns: &[String]) -> Result<Row> {
        let mut out = Row::new();
        for c in columns {
            out.push(c.clone(), self.field(row, c)?);
        }
        Ok(out)
    }

    fn field(&self, row: &Row, column: &str) -> Result<ScalarValue> {
        match (row.get(column), self.kind) {
            (Some(v), _) => Ok(v.clone()),
            (None, SourceKind::Document) => Ok(ScalarValue::Null),
            (None, SourceKind::Relational) => Err(self.err(format!("unknown column '{column}'"))),
        }
    }

    fn project(&self, row: &Row, projection: Option<&[String]>) -> Result<Row> {
        match projection {
            Some(cols) => self.view(row, cols),
            None => Ok(row.clone()),
        }
    }
}

impl SourceConnector for MemoryConnector {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn distinct_keys_matching<'a>(
        &'a self,
        table: &'a str,
        key_column: &'a str,
        predicate: Option<&'a Expr>,
    ) -> BoxFuture<'a, Result<KeySet>> {
        async move {
            let mut keys = KeySet::new();
            self.with_matching(table, predicate, |row| {
                let k = self.field(row, key_column)?;
                if !k.is_null() {
                    keys.insert(k);
                }
                Ok(())
            })?;
            debug!(
                source = %self.config.name,
                table,
                key_column,
                keys = keys.len(),
                "distinct_keys_matching"
            );
            Ok(keys)
        }
        .boxed()
    }

    fn rows_for_keys<'a>(
        &'a self,
        table: &'a str,
        key_column: &'a str,
        keys: &'a KeySet,
        predicate: Option<&'a Expr>,
        projection: Option<&'a [String]>,
    ) -> BoxFuture<'a, Result<Vec<Row>>> {
        async move {
            let mut out = Vec::new();
            self.with_matching(
                table,
                predicate,
                |row| {
                    if keys.contains(&self.field(row, key_column)?) {
                        out.push(self.project(row, projection)?);
                    }
                    Ok(())
                },
            )?;
            debug!(
                source = %self.config.name,
                table,
                requested_keys = keys.len(),
                rows = out.len(),
                "rows_for_keys"
            );
            Ok(out)
        }
        .boxed()
    }

    fn scan<'a>(
        &'a self,
        table: &'a str,
        predicate: Option<&'a Expr>,
        projection: Option<&'a [String]>,
    ) -> BoxFuture<'a, Result<Vec<Row>>> {
        async move {
            let mut out = Vec::new();
            self.with_matching(
                table,
                predicate,
                |row| {
                    out.push(self.project(row, projection)?);
                    Ok(())
                },
            )?;
            debug!(source = %self.config.name, table, rows = out.len(), "scan");
            Ok(out)
        }
        .boxed()
    }

    fn count_by_key<'a>(
        &'a self,
        req: CountRequest<'a>,
    ) -> BoxFuture<'a, Result<BTreeMap<ScalarValue, KeyCount>>> {
        async move {
            let mut counts: BTreeMap<ScalarValue, KeyCount> = BTreeMap::new();
            self.with_matching(
                req.table,
                req.predicate,
                |row| {
                    let key = self.field(row, req.key_column)?;
                    if key.is_null() || req.keys.is_some_and(|ks| !ks.contains(&key)) {
                        return Ok(());
                    }
                    let counted = match req.count_column {
                        Some(c) => !self.field(row, c)?.is_null(),
                        None => true,
                    };
                    let entry = counts.entry(key).or_default();
                    entry.rows += 1;
                    if counted {
                        entry.non_null += 1;
                    }
                    Ok(())
                },
            )?;
            debug!(
                source = %self.config.name,
                table = req.table,
                key_column = req.key_column,
                groups = counts.len(),
                "count_by_key"
            );
            Ok(counts)
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use futures::executor::block_on;

    use super::*;
    use crate::connector::ConnectorRegistry;

    fn events() -> MemoryConnector {
        let conn = MemoryConnector::new(
            SourceConfig::new("document", "memory://document", "federated"),
            SourceKind::Document,
        )
        .expect("connector");
        conn.load_table(
            "events",
            vec![
                Row::from_pairs([
                    ("event_id", ScalarValue::Int64(1)),
                    ("customer_id", ScalarValue::Int64(7)),
                    ("event_type", ScalarValue::from("page_view")),
                ]),
                Row::from_pairs([
                    ("event_id", ScalarValue::Int64(2)),
                    ("customer_id", ScalarValue::Int64(7)),
                ]),
                Row::from_pairs([
                    ("event_id", ScalarValue::Int64(3)),
                    ("customer_id", ScalarValue::Int64(3)),
                    ("event_type", ScalarValue::from("page_view")),
                ]),
                Row::from_pairs([
                    ("event_id", ScalarValue::Int64(4)),
                    ("event_type", ScalarValue::from("page_view")),
                ]),
            ],
        );
        conn
    }

    fn page_view() -> Expr {
        Expr::col("event_type").equals(Expr::lit("page_view"))
    }

    #[test]
    fn distinct_keys_skip_missing_fields_and_null_keys() {
        let conn = events();
        let p = page_view();
        let keys = block_on(conn.distinct_keys_matching("events", "customer_id", Some(&p)))
            .expect("keys");
        assert_eq!(
            keys.into_iter().collect::<Vec<_>>(),
            vec![ScalarValue::Int64(3), ScalarValue::Int64(7)]
        );
    }

    #[test]
    fn count_by_key_reports_rows_and_non_null() {
        let conn = events();
        let counts = block_on(conn.count_by_key(CountRequest {
            table: "events",
            key_column: "customer_id",
            predicate: None,
            count_column: Some("event_type"),
            keys: None,
        }))
        .expect("counts");
        assert_eq!(
            counts.get(&ScalarValue::Int64(7)),
            Some(&KeyCount {
                rows: 2,
                non_null: 1
            })
        );
        assert_eq!(counts.len(), 2);
    }

    #[test]
    fn rows_for_keys_projects_missing_fields_as_null() {
        let conn = events();
        let keys = KeySet::from([ScalarValue::Int64(7)]);
        let projection = vec!["event_type".to_string()];
        let rows = block_on(conn.rows_for_keys(
            "events",
            "customer_id",
            &keys,
            None,
            Some(projection.as_slice()),
        ))
        .expect("rows");
        assert_eq!(
            rows,
            vec![
                Row::from_pairs([("event_type", ScalarValue::from("page_view"))]),
                Row::from_pairs([("event_type", ScalarValue::Null)]),
            ]
        );
    }

    #[test]
    fn unknown_table_and_relational_column_are_connector_errors() {
        let conn = events();
        let err = block_on(conn.scan("orders", None, None)).expect_err("unknown table");
        assert_eq!(err.kind(), "connector");

        let rel = MemoryConnector::new(
            SourceConfig::new("relational", "memory://relational", "federated"),
            SourceKind::Relational,
        )
        .expect("connector");
        rel.load_table("customers", vec![Row::from_pairs([("customer_id", 1_i64)])]);
        let p = Expr::col("region").equals(Expr::lit("West"));
        let err = block_on(rel.scan("customers", Some(&p), None)).expect_err("unknown column");
        assert_eq!(err.kind(), "connector");
    }

    #[test]
    fn non_memory_uri_is_rejected() {
        let err = MemoryConnector::new(
            SourceConfig::new("pg", "postgres://localhost:5432", "federated"),
            SourceKind::Relational,
        )
        .expect_err("bad uri");
        assert_eq!(err.kind(), "invalid_config");
    }

    #[test]
    fn registry_resolves_by_source_name() {
        let mut registry = ConnectorRegistry::new();
        registry.register(Arc::new(events()));
        assert_eq!(registry.get("document").expect("conn").kind(), SourceKind::Document);
        assert_eq!(
            registry.get("relational").expect_err("missing").kind(),
            "invalid_config"
        );
    }
}
