use std::collections::HashMap;

use fedq_common::{FedqError, Result};
use fedq_planner::{CatalogProvider, SourceKind, TableSource};

/// customers/orders on the relational source, events on the document source.
pub struct FederatedCatalog {
    tables: HashMap<String, TableSource>,
}

impl FederatedCatalog {
    pub fn new() -> Self {
        let mut tables = HashMap::new();
        let mut add = |name: &str, source: &str, kind: SourceKind, cols: &[&str]| {
            tables.insert(
                name.to_string(),
                TableSource {
                    source: source.to_string(),
                    kind,
                    columns: cols.iter().map(|c| c.to_string()).collect(),
                },
            );
        };
        add(
            "customers",
            "relational",
            SourceKind::Relational,
            &["customer_id", "region", "segment"],
        );
        add(
            "orders",
            "relational",
            SourceKind::Relational,
            &["order_id", "customer_id", "order_date", "amount_cents", "status"],
        );
        add(
            "events",
            "document",
            SourceKind::Document,
            &["event_id", "customer_id", "event_type", "ts"],
        );
        Self { tables }
    }
}

impl CatalogProvider for FederatedCatalog {
    fn resolve_table(&self, table: &str) -> Result<TableSource> {
        self.tables
            .get(table)
            .cloned()
            .ok_or_else(|| FedqError::Planning(format!("unknown table: {table}")))
    }
}

pub fn template_sql(event_type: &str, order_by: &str, offset: i64, limit: i64) -> String {
    format!(
        "SELECT c.customer_id, COUNT(e.event_id) AS n \
         FROM customers c JOIN events e ON c.customer_id = e.customer_id \
         WHERE e.event_type = '{event_type}' \
         GROUP BY c.customer_id \
         ORDER BY {order_by} \
         LIMIT {limit} OFFSET {offset}"
    )
}
