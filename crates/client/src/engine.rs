use std::sync::Arc;

use arrow::record_batch::RecordBatch;
use fedq_common::{EngineConfig, Result, StrategyMode};
use fedq_execution::{rows_to_record_batch, Row};
use fedq_planner::{ActiveBuyersPlan, LogicalPlan, SortKey, SourceKind};
use fedq_sql::Statement;
use fedq_storage::{
    generate_dataset, Catalog, DatasetConfig, MemoryConnector, SourceConnector, TableDef,
};
use tracing::{info, warn};

use crate::legacy::execute_legacy;
use crate::runtime::{run_active_buyers, ExecutionMeta, ExecutionPath};
use crate::session::{Session, SharedSession};

/// Rows of one `Engine::sql` call with their column names and metadata.
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub meta: ExecutionMeta,
}

impl QueryResult {
    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        rows_to_record_batch(&self.columns, &self.rows)
    }
}

/// Legacy and logical execution of the same parsed query.
#[derive(Debug, Clone)]
pub struct Comparison {
    pub legacy_rows: Vec<Row>,
    pub legacy_meta: ExecutionMeta,
    pub logical_rows: Vec<Row>,
    pub logical_meta: ExecutionMeta,
    /// Both paths returned the same rows in the same order.
    pub equal: bool,
}

#[derive(Clone)]
pub struct Engine {
    session: SharedSession,
}

impl Engine {
    /// Engine with no connectors and an empty catalog.
    pub fn new(config: EngineConfig) -> Result<Self> {
        let session = Arc::new(Session::new(config)?);
        Ok(Self { session })
    }

    /// Engine over in-memory relational and document sources named after
    /// `config.relational` / `config.document`, loaded with a generated dataset.
    pub fn with_fixture_dataset(config: EngineConfig, dataset: &DatasetConfig) -> Result<Self> {
        let relational = Arc::new(MemoryConnector::new(
            config.relational.clone(),
            SourceKind::Relational,
        )?);
        let document = Arc::new(MemoryConnector::new(
            config.document.clone(),
            SourceKind::Document,
        )?);
        generate_dataset(dataset).load_into(&relational, &document);
        info!(
            customers = dataset.customers,
            orders = dataset.orders,
            events = dataset.events,
            seed = dataset.seed,
            "fixture dataset loaded"
        );

        let catalog = Catalog::federated(relational.name(), document.name());
        let engine = Self::new(config)?;
        engine.register_connector(relational);
        engine.register_connector(document);
        for table in catalog.tables() {
            let name = table.name.clone();
            engine.register_table(name, table);
        }
        Ok(engine)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.session.config
    }

    pub fn register_connector(&self, connector: Arc<dyn SourceConnector>) {
        self.session
            .connectors
            .write()
            .expect("connector lock poisoned")
            .register(connector);
    }

    /// Register a table under a given name.
    /// We override `table.name` to avoid ambiguity.
    pub fn register_table(&self, name: impl Into<String>, mut table: TableDef) {
        table.name = name.into();
        self.session
            .catalog
            .write()
            .expect("catalog lock poisoned")
            .register_table(table);
    }

    pub fn list_tables(&self) -> Vec<String> {
        self.session
            .catalog
            .read()
            .expect("catalog lock poisoned")
            .tables()
            .into_iter()
            .map(|t| t.name)
            .collect()
    }

    pub fn parse(&self, sql: &str) -> Result<Statement> {
        self.session.planner.parse(sql)
    }

    /// Canonical plan with the WHERE clause as a coordinator-side filter.
    pub fn plan(&self, stmt: &Statement) -> Result<LogicalPlan> {
        let catalog = self.session.catalog.read().expect("catalog lock poisoned");
        self.session.planner.plan(stmt, &*catalog)
    }

    /// Plan with predicates pushed into the scans.
    pub fn plan_logical_from_ast(&self, stmt: &Statement) -> Result<LogicalPlan> {
        let catalog = self.session.catalog.read().expect("catalog lock poisoned");
        self.session.planner.plan_logical_from_ast(stmt, &*catalog)
    }

    pub fn plan_event_counts_per_customer(
        &self,
        event_type: &str,
        order_by: &[SortKey],
        offset: i64,
        limit: Option<i64>,
    ) -> Result<LogicalPlan> {
        let catalog = self.session.catalog.read().expect("catalog lock poisoned");
        fedq_planner::plan_event_counts_per_customer(&*catalog, event_type, order_by, offset, limit)
    }

    pub fn plan_active_buyers_by_region(
        &self,
        order_date_cutoff: &str,
        event_type: &str,
    ) -> Result<ActiveBuyersPlan> {
        let catalog = self.session.catalog.read().expect("catalog lock poisoned");
        fedq_planner::plan_active_buyers_by_region(&*catalog, order_date_cutoff, event_type)
    }

    /// Customers with an order on or after `order_date_cutoff` and an `event_type` event,
    /// counted per region in ascending region order.
    pub async fn active_buyers_by_region(
        &self,
        order_date_cutoff: &str,
        event_type: &str,
    ) -> Result<QueryResult> {
        let plan = self.plan_active_buyers_by_region(order_date_cutoff, event_type)?;
        let connectors = self.session.connectors_snapshot();
        let state = self.session.exec_state(&connectors);
        let rows = run_active_buyers(&plan, &state).await?;
        let meta = state.finish(ExecutionPath::Fast, &rows);
        Ok(QueryResult {
            columns: vec![plan.group_column, plan.count_output],
            rows,
            meta,
        })
    }

    pub fn explain(&self, plan: &LogicalPlan) -> String {
        self.session.planner.explain(plan)
    }

    pub async fn execute_logical(&self, plan: &LogicalPlan) -> Result<Vec<Row>> {
        Ok(self.execute_logical_with_meta(plan).await?.0)
    }

    pub async fn execute_logical_with_meta(
        &self,
        plan: &LogicalPlan,
    ) -> Result<(Vec<Row>, ExecutionMeta)> {
        let connectors = self.session.connectors_snapshot();
        let state = self.session.exec_state(&connectors);
        let (rows, path) = self.session.runtime.execute(plan, &state).await?;
        let meta = state.finish(path, &rows);
        Ok((rows, meta))
    }

    pub async fn execute_legacy(&self, stmt: &Statement) -> Result<Vec<Row>> {
        Ok(self.execute_legacy_with_meta(stmt).await?.0)
    }

    pub async fn execute_legacy_with_meta(
        &self,
        stmt: &Statement,
    ) -> Result<(Vec<Row>, ExecutionMeta)> {
        let (_, rows, meta) = self.run_legacy(stmt).await?;
        Ok((rows, meta))
    }

    async fn run_legacy(&self, stmt: &Statement) -> Result<(Vec<String>, Vec<Row>, ExecutionMeta)> {
        let catalog = self.session.catalog_snapshot();
        let connectors = self.session.connectors_snapshot();
        let state = self.session.exec_state(&connectors);
        let (columns, rows) = execute_legacy(stmt, &catalog, &state).await?;
        let meta = state.finish(ExecutionPath::Legacy, &rows);
        Ok((columns, rows, meta))
    }

    /// Parse, plan and execute `query` on the executor the configured strategy selects.
    pub async fn sql(&self, query: &str) -> Result<QueryResult> {
        let stmt = self.parse(query)?;
        if self.session.config.strategy == StrategyMode::Legacy {
            let (columns, rows, meta) = self.run_legacy(&stmt).await?;
            return Ok(QueryResult {
                columns,
                rows,
                meta,
            });
        }
        let plan = self.plan_logical_from_ast(&stmt)?;
        let (rows, meta) = self.execute_logical_with_meta(&plan).await?;
        Ok(QueryResult {
            columns: output_columns(&plan),
            rows,
            meta,
        })
    }

    /// Run the legacy executor and the logical-plan executor on `stmt`.
    pub async fn compare(&self, stmt: &Statement) -> Result<Comparison> {
        let plan = self.plan_logical_from_ast(stmt)?;
        let (legacy_rows, legacy_meta) = self.execute_legacy_with_meta(stmt).await?;
        let (logical_rows, logical_meta) = self.execute_logical_with_meta(&plan).await?;
        let equal = legacy_rows == logical_rows;
        if !equal {
            warn!(
                legacy_query_id = %legacy_meta.query_id,
                logical_query_id = %logical_meta.query_id,
                legacy_rows = legacy_rows.len(),
                logical_rows = logical_rows.len(),
                "legacy and logical results differ"
            );
        }
        Ok(Comparison {
            legacy_rows,
            legacy_meta,
            logical_rows,
            logical_meta,
            equal,
        })
    }

    pub fn prometheus_metrics(&self) -> String {
        self.session.prometheus_metrics()
    }
}

/// Output column names of `plan`'s root.
fn output_columns(plan: &LogicalPlan) -> Vec<String> {
    match plan {
        LogicalPlan::Projection { exprs, .. } => exprs.iter().map(|(_, n)| n.clone()).collect(),
        LogicalPlan::Aggregate {
            group_exprs,
            aggr_exprs,
            ..
        } => group_exprs
            .iter()
            .map(|(_, n)| n.clone())
            .chain(aggr_exprs.iter().map(|(_, n)| n.clone()))
            .collect(),
        LogicalPlan::Sort { input, .. }
        | LogicalPlan::Paginate { input, .. }
        | LogicalPlan::Filter { input, .. } => output_columns(input),
        LogicalPlan::Join { left, right, .. } => {
            let mut cols = output_columns(left);
            cols.extend(output_columns(right));
            cols
        }
        // scan width is only known once rows arrive
        LogicalPlan::Scan { .. } => Vec::new(),
    }
}
