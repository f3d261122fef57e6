use std::collections::HashMap;
use std::fs;

use fedq_common::{FedqError, Result};
use fedq_planner::{CatalogProvider, SourceKind, TableSource};
use serde::{Deserialize, Serialize};

/// A table (or document collection) and the source it lives in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDef {
    pub name: String,
    /// Source name; must match a registered connector.
    pub source: String,
    pub kind: SourceKind,
    pub columns: Vec<String>,
}

impl TableDef {
    pub fn new(
        name: impl Into<String>,
        source: impl Into<String>,
        kind: SourceKind,
        columns: &[&str],
    ) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            kind,
            columns: columns.iter().map(|c| c.to_string()).collect(),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct Catalog {
    tables: HashMap<String, TableDef>,
}

impl Catalog {
    pub fn new() -> Self {
        Self {
            tables: HashMap::new(),
        }
    }

    /// customers/orders on `relational`, events on `document`.
    pub fn federated(relational: &str, document: &str) -> Self {
        let mut cat = Self::new();
        cat.register_table(TableDef::new(
            "customers",
            relational,
            SourceKind::Relational,
            &["customer_id", "region", "segment"],
        ));
        cat.register_table(TableDef::new(
            "orders",
            relational,
            SourceKind::Relational,
            &["order_id", "customer_id", "order_date", "amount_cents", "status"],
        ));
        cat.register_table(TableDef::new(
            "events",
            document,
            SourceKind::Document,
            &["event_id", "customer_id", "event_type", "ts"],
        ));
        cat
    }

    pub fn register_table(&mut self, table: TableDef) {
        self.tables.insert(table.name.clone(), table);
    }

    pub fn get(&self, name: &str) -> Result<&TableDef> {
        self.tables
            .get(name)
            .ok_or_else(|| FedqError::Planning(format!("unknown table: {name}")))
    }

    /// Tables sorted by name.
    pub fn tables(&self) -> Vec<TableDef> {
        let mut v = self.tables.values().cloned().collect::<Vec<_>>();
        v.sort_by(|a, b| a.name.cmp(&b.name));
        v
    }

    pub fn load_from_json(path: &str) -> Result<Self> {
        let s = fs::read_to_string(path)?;
        Self::from_json_str(&s)
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        let tables: Vec<TableDef> =
            serde_json::from_str(s).map_err(|e| FedqError::InvalidConfig(e.to_string()))?;
        let mut cat = Catalog::new();
        for t in tables {
            cat.register_table(t);
        }
        Ok(cat)
    }
}

impl CatalogProvider for Catalog {
    fn resolve_table(&self, table: &str) -> Result<TableSource> {
        let def = self.get(table)?;
        Ok(TableSource {
            source: def.source.clone(),
            kind: def.kind,
            columns: def.columns.clone(),
        })
    }
}
