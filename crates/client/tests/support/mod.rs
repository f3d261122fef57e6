#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use fedq_client::Engine;
use fedq_common::{EngineConfig, FedqError, Result, SourceConfig, StrategyMode};
use fedq_execution::{Row, ScalarValue};
use fedq_planner::{Expr, SourceKind};
use fedq_storage::{
    generate_dataset, Catalog, CountRequest, DatasetConfig, KeyCount, KeySet, MemoryConnector,
    SourceConnector,
};
use futures::future::BoxFuture;
use futures::FutureExt;

/// Big enough for an offset of 1000 to land inside the page_view groups.
pub fn dataset() -> DatasetConfig {
    DatasetConfig {
        customers: 1_500,
        orders: 4_000,
        events: 12_000,
        seed: 42,
    }
}

pub fn small_dataset() -> DatasetConfig {
    DatasetConfig {
        customers: 120,
        orders: 400,
        events: 1_500,
        seed: 7,
    }
}

pub fn config(strategy: StrategyMode) -> EngineConfig {
    EngineConfig {
        strategy,
        ..EngineConfig::default()
    }
}

pub fn fixture_engine(strategy: StrategyMode, dataset: &DatasetConfig) -> Engine {
    Engine::with_fixture_dataset(config(strategy), dataset).expect("fixture engine")
}

pub fn template_sql(event: &str, order: &str, offset: i64, limit: Option<i64>) -> String {
    let mut sql = format!(
        "SELECT c.customer_id, COUNT(e.event_id) AS n \
         FROM customers c JOIN events e ON c.customer_id = e.customer_id \
         WHERE e.event_type = '{event}' \
         GROUP BY c.customer_id \
         ORDER BY {order}"
    );
    if let Some(limit) = limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    }
    sql.push_str(&format!(" OFFSET {offset}"));
    sql
}

pub fn run(engine: &Engine, sql: &str) -> Result<fedq_client::QueryResult> {
    futures::executor::block_on(engine.sql(sql))
}

pub fn int(row: &Row, column: &str) -> i64 {
    row.get(column)
        .and_then(ScalarValue::as_i64)
        .unwrap_or_else(|| panic!("{column} missing or not an integer in {row:?}"))
}

/// Wraps a connector, records every operation name and optionally fails one of them.
#[derive(Debug)]
pub struct RecordingConnector {
    inner: Arc<dyn SourceConnector>,
    fail_on: Option<&'static str>,
    calls: Mutex<Vec<&'static str>>,
}

impl RecordingConnector {
    pub fn new(inner: Arc<dyn SourceConnector>, fail_on: Option<&'static str>) -> Self {
        Self {
            inner,
            fail_on,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().expect("calls lock").clone()
    }

    fn enter(&self, op: &'static str) -> Result<()> {
        self.calls.lock().expect("calls lock").push(op);
        if self.fail_on == Some(op) {
            return Err(FedqError::connector(self.inner.name(), format!("{op} unavailable")));
        }
        Ok(())
    }
}

impl SourceConnector for RecordingConnector {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn kind(&self) -> SourceKind {
        self.inner.kind()
    }

    fn distinct_keys_matching<'a>(
        &'a self,
        table: &'a str,
        key_column: &'a str,
        predicate: Option<&'a Expr>,
    ) -> BoxFuture<'a, Result<KeySet>> {
        async move {
            self.enter("distinct_keys_matching")?;
            self.inner
                .distinct_keys_matching(table, key_column, predicate)
                .await
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
            self.enter("rows_for_keys")?;
            self.inner
                .rows_for_keys(table, key_column, keys, predicate, projection)
                .await
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
            self.enter("scan")?;
            self.inner.scan(table, predicate, projection).await
        }
        .boxed()
    }

    fn count_by_key<'a>(
        &'a self,
        req: CountRequest<'a>,
    ) -> BoxFuture<'a, Result<BTreeMap<ScalarValue, KeyCount>>> {
        async move {
            self.enter("count_by_key")?;
            self.inner.count_by_key(req).await
        }
        .boxed()
    }
}

pub struct Recorded {
    pub engine: Engine,
    pub relational: Arc<RecordingConnector>,
    pub document: Arc<RecordingConnector>,
}

/// Fixture engine whose two sources record their calls.
pub fn recorded_engine(
    strategy: StrategyMode,
    dataset: &DatasetConfig,
    relational_fail_on: Option<&'static str>,
    document_fail_on: Option<&'static str>,
) -> Recorded {
    let cfg = config(strategy);
    let rel = MemoryConnector::new(cfg.relational.clone(), SourceKind::Relational)
        .expect("relational");
    let doc = MemoryConnector::new(cfg.document.clone(), SourceKind::Document).expect("document");
    generate_dataset(dataset).load_into(&rel, &doc);
    let relational = Arc::new(RecordingConnector::new(Arc::new(rel), relational_fail_on));
    let document = Arc::new(RecordingConnector::new(Arc::new(doc), document_fail_on));

    let engine = Engine::new(cfg.clone()).expect("engine");
    engine.register_connector(relational.clone());
    engine.register_connector(document.clone());
    for table in Catalog::federated(&cfg.relational.name, &cfg.document.name).tables() {
        let name = table.name.clone();
        engine.register_table(name, table);
    }
    Recorded {
        engine,
        relational,
        document,
    }
}

/// Tiny hand-written dataset with repeated keys, null keys and missing document fields.
pub fn ragged_engine(strategy: StrategyMode) -> Engine {
    let rel = MemoryConnector::new(
        SourceConfig::new("pg", "memory://pg", "shop"),
        SourceKind::Relational,
    )
    .expect("relational");
    let doc = MemoryConnector::new(
        SourceConfig::new("mongo", "memory://mongo", "tracking"),
        SourceKind::Document,
    )
    .expect("document");

    let customer = |id: i64, region: &str, segment: ScalarValue| {
        Row::from_pairs([
            ("customer_id", ScalarValue::Int64(id)),
            ("region", ScalarValue::from(region)),
            ("segment", segment),
        ])
    };
    rel.load_table(
        "customers",
        vec![
            customer(1, "West", ScalarValue::from("SMB")),
            customer(2, "West", ScalarValue::Null),
            customer(3, "South", ScalarValue::from("ENT")),
            customer(4, "South", ScalarValue::from("SMB")),
        ],
    );
    let order = |id: i64, cid: ScalarValue, status: &str| {
        Row::from_pairs([
            ("order_id", ScalarValue::Int64(id)),
            ("customer_id", cid),
            ("order_date", ScalarValue::from("2024-01-01")),
            ("amount_cents", ScalarValue::Int64(1_000)),
            ("status", ScalarValue::from(status)),
        ])
    };
    rel.load_table(
        "orders",
        vec![
            order(10, ScalarValue::Int64(1), "paid"),
            order(11, ScalarValue::Int64(1), "paid"),
            order(12, ScalarValue::Int64(1), "cancelled"),
            order(13, ScalarValue::Int64(2), "shipped"),
            order(14, ScalarValue::Null, "paid"),
            order(15, ScalarValue::Int64(3), "paid"),
        ],
    );

    let mut events = Vec::new();
    for (eid, cid, event_type, ts) in [
        (100, Some(1), Some("checkout"), Some("2024-01-02T00:00:00Z")),
        (101, Some(1), Some("checkout"), None),
        (102, Some(2), Some("checkout"), Some("2024-01-03T00:00:00Z")),
        (103, Some(2), Some("page_view"), None),
        (104, Some(3), None, None),
        (105, None, Some("checkout"), None),
        (106, Some(4), Some("checkout"), None),
        (107, Some(9), Some("checkout"), Some("2024-01-04T00:00:00Z")),
    ] {
        let mut row = Row::new();
        row.push("event_id", ScalarValue::Int64(eid));
        if let Some(cid) = cid {
            row.push("customer_id", ScalarValue::Int64(cid));
        }
        if let Some(t) = event_type {
            row.push("event_type", ScalarValue::from(t));
        }
        if let Some(ts) = ts {
            row.push("ts", ScalarValue::from(ts));
        }
        events.push(row);
    }
    doc.load_table("events", events);

    let engine = Engine::new(EngineConfig {
        strategy,
        ..EngineConfig::default()
    })
    .expect("engine");
    engine.register_connector(Arc::new(rel));
    engine.register_connector(Arc::new(doc));
    for table in Catalog::federated("pg", "mongo").tables() {
        let name = table.name.clone();
        engine.register_table(name, table);
    }
    engine
}
