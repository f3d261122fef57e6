use std::sync::Arc;

use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};

#[derive(Clone, Debug)]
pub struct MetricsRegistry {
    inner: Arc<MetricsInner>,
}

#[derive(Debug)]
struct MetricsInner {
    registry: Registry,
    queries_total: CounterVec,
    query_rows_out: CounterVec,
    query_time_seconds: HistogramVec,
    connector_calls: CounterVec,
    connector_time_seconds: HistogramVec,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner::new()),
        }
    }

    /// Record one finished execution on `path` (`fast`, `generic`, `legacy`).
    pub fn record_query(&self, path: &str, rows_out: u64, secs: f64) {
        let labels = [path];
        self.inner.queries_total.with_label_values(&labels).inc();
        self.inner
            .query_rows_out
            .with_label_values(&labels)
            .inc_by(rows_out as f64);
        self.inner
            .query_time_seconds
            .with_label_values(&labels)
            .observe(secs.max(0.0));
    }

    /// Record one round-trip to a source connector.
    pub fn record_connector_call(&self, connector: &str, operation: &str, secs: f64) {
        let labels = [connector, operation];
        self.inner.connector_calls.with_label_values(&labels).inc();
        self.inner
            .connector_time_seconds
            .with_label_values(&labels)
            .observe(secs.max(0.0));
    }

    pub fn render_prometheus(&self) -> String {
        let metric_families = self.inner.registry.gather();
        let mut out = Vec::new();
        let enc = TextEncoder::new();
        if enc.encode(&metric_families, &mut out).is_err() {
            return String::new();
        }
        String::from_utf8_lossy(&out).to_string()
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsInner {
    fn new() -> Self {
        let registry = Registry::new();

        let queries_total = counter_vec(
            &registry,
            "fedq_queries_total",
            "Executions finished per strategy path",
            &["path"],
        );
        let query_rows_out = counter_vec(
            &registry,
            "fedq_query_rows_out_total",
            "Result rows returned per strategy path",
            &["path"],
        );
        let query_time_seconds = histogram_vec(
            &registry,
            "fedq_query_time_seconds",
            "End-to-end execution time per strategy path",
            &["path"],
        );
        let connector_calls = counter_vec(
            &registry,
            "fedq_connector_calls_total",
            "Source connector round-trips",
            &["connector", "operation"],
        );
        let connector_time_seconds = histogram_vec(
            &registry,
            "fedq_connector_time_seconds",
            "Time spent waiting on source connectors",
            &["connector", "operation"],
        );

        Self {
            registry,
            queries_total,
            query_rows_out,
            query_time_seconds,
            connector_calls,
            connector_time_seconds,
        }
    }
}

fn counter_vec(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> CounterVec {
    let c = CounterVec::new(Opts::new(name, help), labels).expect("counter vec");
    registry
        .register(Box::new(c.clone()))
        .expect("register counter");
    c
}

fn histogram_vec(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> HistogramVec {
    let h = HistogramVec::new(HistogramOpts::new(name, help), labels).expect("histogram vec");
    registry
        .register(Box::new(h.clone()))
        .expect("register histogram");
    h
}

#[cfg(test)]
mod tests {
    use super::MetricsRegistry;

    #[test]
    fn renders_prometheus_text() {
        let m = MetricsRegistry::new();
        m.record_query("fast", 10, 0.01);
        let text = m.render_prometheus();
        assert!(text.contains("fedq_queries_total"));
        assert!(text.contains("path=\"fast\""));
    }

    #[test]
    fn renders_all_metric_families() {
        let m = MetricsRegistry::new();
        m.record_query("generic", 4, 0.02);
        m.record_connector_call("document", "distinct_keys_matching", 0.003);
        let text = m.render_prometheus();

        assert!(text.contains("fedq_queries_total"));
        assert!(text.contains("fedq_query_rows_out_total"));
        assert!(text.contains("fedq_query_time_seconds"));
        assert!(text.contains("fedq_connector_calls_total"));
        assert!(text.contains("fedq_connector_time_seconds"));
        assert!(text.contains("operation=\"distinct_keys_matching\""));
    }
}
