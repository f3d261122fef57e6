use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::Debug;
use std::sync::Arc;

use fedq_common::{FedqError, Result};
use fedq_execution::{Row, ScalarValue};
use fedq_planner::{Expr, SourceKind};
use futures::future::BoxFuture;

/// Distinct, non-null join keys in ascending order.
pub type KeySet = BTreeSet<ScalarValue>;

/// Per-key result of a grouped count pushed to a source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyCount {
    /// Rows carrying the key.
    pub rows: i64,
    /// Rows carrying the key whose counted column is not null. Equals `rows` when no
    /// column is counted.
    pub non_null: i64,
}

/// Grouped count pushed down to one source.
#[derive(Debug, Clone, Copy)]
pub struct CountRequest<'a> {
    pub table: &'a str,
    pub key_column: &'a str,
    /// Predicate over unqualified columns; rows that fail it are not counted.
    pub predicate: Option<&'a Expr>,
    /// Column whose non-null values are counted into [`KeyCount::non_null`].
    pub count_column: Option<&'a str>,
    /// Restrict the result to these keys.
    pub keys: Option<&'a KeySet>,
}

/// Read-only access to one external store.
///
/// Every operation is a single round-trip; predicates use unqualified column names and
/// rows come back with unqualified columns. Failures surface as
/// [`FedqError::Connector`] and are never retried by callers.
pub trait SourceConnector: Send + Sync + Debug {
    /// Source name tables are bound to in the catalog.
    fn name(&self) -> &str;

    fn kind(&self) -> SourceKind;

    /// Distinct non-null values of `key_column` over rows matching `predicate`.
    fn distinct_keys_matching<'a>(
        &'a self,
        table: &'a str,
        key_column: &'a str,
        predicate: Option<&'a Expr>,
    ) -> BoxFuture<'a, Result<KeySet>>;

    /// Rows whose `key_column` is in `keys` and that match `predicate`, restricted to
    /// `projection` when given.
    fn rows_for_keys<'a>(
        &'a self,
        table: &'a str,
        key_column: &'a str,
        keys: &'a KeySet,
        predicate: Option<&'a Expr>,
        projection: Option<&'a [String]>,
    ) -> BoxFuture<'a, Result<Vec<Row>>>;

    /// Full scan with optional predicate and projection.
    fn scan<'a>(
        &'a self,
        table: &'a str,
        predicate: Option<&'a Expr>,
        projection: Option<&'a [String]>,
    ) -> BoxFuture<'a, Result<Vec<Row>>>;

    /// Grouped count by key. Keys without matching rows are absent from the result.
    fn count_by_key<'a>(
        &'a self,
        req: CountRequest<'a>,
    ) -> BoxFuture<'a, Result<BTreeMap<ScalarValue, KeyCount>>>;
}

/// Connectors by source name.
#[derive(Debug, Default, Clone)]
pub struct ConnectorRegistry {
    connectors: HashMap<String, Arc<dyn SourceConnector>>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register under the connector's own name, replacing any previous one.
    pub fn register(&mut self, connector: Arc<dyn SourceConnector>) {
        self.connectors
            .insert(connector.name().to_string(), connector);
    }

    pub fn get(&self, source: &str) -> Result<Arc<dyn SourceConnector>> {
        self.connectors.get(source).cloned().ok_or_else(|| {
            FedqError::InvalidConfig(format!("no connector registered for source '{source}'"))
        })
    }

    pub fn names(&self) -> Vec<String> {
        let mut names = self.connectors.keys().cloned().collect::<Vec<_>>();
        names.sort();
        names
    }
}
