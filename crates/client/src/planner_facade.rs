use fedq_common::Result;
use fedq_planner::{
    explain_fast_path, explain_logical, select_strategy, CatalogProvider, FastPathDescriptor,
    LogicalPlan,
};
use fedq_sql::Statement;

#[derive(Debug, Default)]
pub struct PlannerFacade;

impl PlannerFacade {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, sql: &str) -> Result<Statement> {
        fedq_sql::parse_one(sql)
    }

    /// Canonical plan, WHERE kept above the join.
    pub fn plan(&self, stmt: &Statement, catalog: &dyn CatalogProvider) -> Result<LogicalPlan> {
        fedq_planner::plan(stmt, catalog)
    }

    pub fn plan_logical_from_ast(
        &self,
        stmt: &Statement,
        catalog: &dyn CatalogProvider,
    ) -> Result<LogicalPlan> {
        fedq_planner::plan_logical_from_ast(stmt, catalog)
    }

    pub fn select_strategy(&self, plan: &LogicalPlan) -> Option<FastPathDescriptor> {
        select_strategy(plan)
    }

    /// Logical tree, followed by the fast-path descriptor when the plan matches.
    pub fn explain(&self, plan: &LogicalPlan) -> String {
        let mut out = explain_logical(plan);
        if let Some(d) = self.select_strategy(plan) {
            out.push('\n');
            out.push_str(&explain_fast_path(&d));
        }
        out
    }
}
