use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use fedq_common::{EngineConfig, MetricsRegistry, QueryId, Result, StrategyMode};
use fedq_storage::{Catalog, ConnectorRegistry};

use crate::planner_facade::PlannerFacade;
use crate::runtime::{ExecState, FederatedRuntime};

pub type SharedSession = Arc<Session>;

#[derive(Debug)]
pub struct Session {
    pub config: EngineConfig,
    pub catalog: RwLock<Catalog>,
    pub connectors: RwLock<ConnectorRegistry>,
    pub metrics: MetricsRegistry,
    pub planner: PlannerFacade,
    pub runtime: FederatedRuntime,
    next_query_id: AtomicU64,
}

impl Session {
    pub fn new(config: EngineConfig) -> Result<Self> {
        let runtime = FederatedRuntime::new(config.strategy == StrategyMode::Generic);
        Ok(Self {
            config,
            catalog: RwLock::new(Catalog::new()),
            connectors: RwLock::new(ConnectorRegistry::new()),
            metrics: MetricsRegistry::new(),
            planner: PlannerFacade::new(),
            runtime,
            next_query_id: AtomicU64::new(1),
        })
    }

    pub fn catalog_snapshot(&self) -> Catalog {
        self.catalog.read().expect("catalog lock poisoned").clone()
    }

    pub fn connectors_snapshot(&self) -> ConnectorRegistry {
        self.connectors
            .read()
            .expect("connector lock poisoned")
            .clone()
    }

    /// Fresh per-execution state over `connectors`.
    pub(crate) fn exec_state<'a>(&'a self, connectors: &'a ConnectorRegistry) -> ExecState<'a> {
        let id = QueryId(self.next_query_id.fetch_add(1, Ordering::Relaxed));
        ExecState::new(id, connectors, &self.metrics, self.config.concurrent_fanout)
    }

    pub fn prometheus_metrics(&self) -> String {
        self.metrics.render_prometheus()
    }
}
