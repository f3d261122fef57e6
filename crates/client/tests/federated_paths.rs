use std::collections::{BTreeMap, BTreeSet};

use fedq_client::ExecutionPath;
use fedq_common::StrategyMode;
use fedq_execution::{Row, ScalarValue};

#[path = "support/mod.rs"]
mod support;

use support::{fixture_engine, int, ragged_engine, run, template_sql};

const ORDERS: [&str; 3] = [
    "n DESC, c.customer_id ASC",
    "c.customer_id DESC",
    "n ASC, customer_id DESC",
];

fn all_paths(sql: &str, engines: &[fedq_client::Engine; 3]) -> [Vec<Row>; 3] {
    let out = engines
        .iter()
        .map(|e| run(e, sql).unwrap_or_else(|err| panic!("{sql}: {err}")))
        .collect::<Vec<_>>();
    assert_eq!(out[0].meta.path, ExecutionPath::Fast, "{sql}");
    assert_eq!(out[1].meta.path, ExecutionPath::Generic, "{sql}");
    assert_eq!(out[2].meta.path, ExecutionPath::Legacy, "{sql}");
    let mut rows = out.into_iter().map(|r| r.rows);
    [
        rows.next().expect("fast"),
        rows.next().expect("generic"),
        rows.next().expect("legacy"),
    ]
}

fn engines(dataset: &fedq_storage::DatasetConfig) -> [fedq_client::Engine; 3] {
    [
        fixture_engine(StrategyMode::Auto, dataset),
        fixture_engine(StrategyMode::Generic, dataset),
        fixture_engine(StrategyMode::Legacy, dataset),
    ]
}

#[test]
fn fast_generic_and_legacy_return_identical_rows() {
    let engines = engines(&support::small_dataset());
    for event in ["page_view", "checkout", "wishlist", "no_such_event"] {
        for order in ORDERS {
            for (offset, limit) in [(0, Some(10)), (5, Some(3)), (40, None), (0, None)] {
                let sql = template_sql(event, order, offset, limit);
                let [fast, generic, legacy] = all_paths(&sql, &engines);
                assert_eq!(fast, generic, "{sql}");
                assert_eq!(fast, legacy, "{sql}");
            }
        }
    }
}

#[test]
fn paths_agree_with_relational_predicate_and_repeated_relational_keys() {
    let engines = engines(&support::small_dataset());
    for sql in [
        "SELECT c.customer_id, COUNT(e.event_id) AS n \
         FROM customers c JOIN events e ON c.customer_id = e.customer_id \
         WHERE e.event_type = 'add_to_cart' AND c.region = 'West' \
         GROUP BY c.customer_id ORDER BY n DESC, c.customer_id LIMIT 15",
        "SELECT o.customer_id AS cid, COUNT(*) AS n \
         FROM orders o JOIN events e ON o.customer_id = e.customer_id \
         WHERE e.event_type = 'checkout' AND o.status <> 'cancelled' \
         GROUP BY o.customer_id ORDER BY n DESC, cid ASC LIMIT 20 OFFSET 3",
        "SELECT COUNT(o.order_id) AS orders_seen, e.customer_id \
         FROM events e JOIN orders o ON e.customer_id = o.customer_id \
         WHERE 'page_view' = e.event_type \
         GROUP BY e.customer_id ORDER BY orders_seen DESC, e.customer_id ASC LIMIT 25",
    ] {
        let [fast, generic, legacy] = all_paths(sql, &engines);
        assert!(!fast.is_empty(), "{sql}");
        assert_eq!(fast, generic, "{sql}");
        assert_eq!(fast, legacy, "{sql}");
    }
}

#[test]
fn non_comparison_relational_filters_leave_the_fast_path_and_still_agree() {
    let engines = engines(&support::small_dataset());
    for sql in [
        "SELECT c.customer_id, COUNT(e.event_id) AS n \
         FROM customers c JOIN events e ON c.customer_id = e.customer_id \
         WHERE e.event_type = 'page_view' AND (c.region = 'West' OR c.region = 'South') \
         GROUP BY c.customer_id ORDER BY n DESC, c.customer_id ASC LIMIT 5",
        "SELECT c.customer_id, COUNT(e.event_id) AS n \
         FROM customers c JOIN events e ON c.customer_id = e.customer_id \
         WHERE e.event_type = 'page_view' AND c.region IS NOT NULL \
         GROUP BY c.customer_id ORDER BY n DESC, c.customer_id ASC LIMIT 5",
    ] {
        let out = engines
            .iter()
            .map(|e| run(e, sql).unwrap_or_else(|err| panic!("{sql}: {err}")))
            .collect::<Vec<_>>();
        assert_eq!(out[0].meta.path, ExecutionPath::Generic, "{sql}");
        assert_eq!(out[1].meta.path, ExecutionPath::Generic, "{sql}");
        assert_eq!(out[2].meta.path, ExecutionPath::Legacy, "{sql}");
        assert_eq!(out[0].rows.len(), 5, "{sql}");
        assert_eq!(out[0].rows, out[1].rows, "{sql}");
        assert_eq!(out[0].rows, out[2].rows, "{sql}");

        let stmt = engines[0].parse(sql).expect("parse");
        let cmp = futures::executor::block_on(engines[0].compare(&stmt)).expect("compare");
        assert!(cmp.equal, "{sql}");
    }
}

#[test]
fn end_to_end_page_view_offset_1000_limit_10() {
    let dataset = support::dataset();
    let engine = fixture_engine(StrategyMode::Auto, &dataset);
    let sql = template_sql("page_view", "n DESC, c.customer_id ASC", 1000, Some(10));
    let result = run(&engine, &sql).expect("template query");

    assert_eq!(result.meta.path, ExecutionPath::Fast);
    assert_eq!(result.meta.path.as_str(), "fast");
    assert_eq!(result.columns, vec!["customer_id".to_string(), "n".to_string()]);
    assert_eq!(result.rows.len(), 10);
    assert_eq!(result.meta.row_count, 10);
    for row in &result.rows {
        assert_eq!(row.columns().collect::<Vec<_>>(), vec!["customer_id", "n"]);
    }
    for pair in result.rows.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        assert!(
            int(a, "n") > int(b, "n")
                || (int(a, "n") == int(b, "n") && int(a, "customer_id") < int(b, "customer_id")),
            "{a:?} before {b:?}"
        );
    }

    let legacy = fixture_engine(StrategyMode::Legacy, &dataset);
    assert_eq!(run(&legacy, &sql).expect("legacy").rows, result.rows);
}

#[test]
fn ragged_sources_count_nulls_and_missing_fields_the_same_way() {
    let cases: [(&str, Vec<(i64, i64)>); 3] = [
        (
            "SELECT c.customer_id, COUNT(e.ts) AS n FROM customers c \
             JOIN events e ON c.customer_id = e.customer_id WHERE e.event_type = 'checkout' \
             GROUP BY c.customer_id ORDER BY n DESC, c.customer_id ASC",
            vec![(1, 1), (2, 1), (4, 0)],
        ),
        (
            "SELECT o.customer_id, COUNT(*) AS n FROM orders o \
             JOIN events e ON o.customer_id = e.customer_id WHERE e.event_type = 'checkout' \
             GROUP BY o.customer_id ORDER BY n DESC, o.customer_id ASC",
            vec![(1, 6), (2, 1)],
        ),
        (
            "SELECT c.customer_id, COUNT(c.segment) AS n FROM customers c \
             JOIN events e ON c.customer_id = e.customer_id WHERE e.event_type = 'checkout' \
             GROUP BY c.customer_id ORDER BY n DESC, c.customer_id ASC",
            vec![(1, 2), (4, 1), (2, 0)],
        ),
    ];
    let engines = [
        ragged_engine(StrategyMode::Auto),
        ragged_engine(StrategyMode::Generic),
        ragged_engine(StrategyMode::Legacy),
    ];
    for (sql, expected) in cases {
        let [fast, generic, legacy] = all_paths(sql, &engines);
        let got = fast
            .iter()
            .map(|r| (int(r, "customer_id"), int(r, "n")))
            .collect::<Vec<_>>();
        assert_eq!(got, expected, "{sql}");
        assert_eq!(fast, generic, "{sql}");
        assert_eq!(fast, legacy, "{sql}");
    }
}

#[test]
fn compare_reports_equal_results_and_both_paths() {
    let engine = fixture_engine(StrategyMode::Auto, &support::small_dataset());
    let stmt = engine
        .parse(&template_sql("page_view", "n DESC, c.customer_id ASC", 10, Some(5)))
        .expect("parse");
    let cmp = futures::executor::block_on(engine.compare(&stmt)).expect("compare");
    assert!(cmp.equal);
    assert_eq!(cmp.legacy_rows, cmp.logical_rows);
    assert_eq!(cmp.legacy_meta.path, ExecutionPath::Legacy);
    assert_eq!(cmp.logical_meta.path, ExecutionPath::Fast);
    assert_ne!(cmp.legacy_meta.query_id, cmp.logical_meta.query_id);
}

#[test]
fn explicit_plan_builder_runs_on_the_fast_path() {
    let engine = fixture_engine(StrategyMode::Auto, &support::small_dataset());
    let plan = engine
        .plan_event_counts_per_customer(
            "page_view",
            &[
                fedq_planner::SortKey::desc("n"),
                fedq_planner::SortKey::asc("customer_id"),
            ],
            0,
            Some(5),
        )
        .expect("plan");
    let (rows, meta) =
        futures::executor::block_on(engine.execute_logical_with_meta(&plan)).expect("run");
    assert_eq!(meta.path, ExecutionPath::Fast);

    let stmt = engine
        .parse(&template_sql("page_view", "n DESC, c.customer_id ASC", 0, Some(5)))
        .expect("parse");
    let legacy = futures::executor::block_on(engine.execute_legacy(&stmt)).expect("legacy");
    assert_eq!(rows, legacy);
}

#[test]
fn record_batch_carries_result_columns() {
    let engine = ragged_engine(StrategyMode::Auto);
    let result = run(
        &engine,
        "SELECT c.customer_id, COUNT(e.ts) AS n FROM customers c \
         JOIN events e ON c.customer_id = e.customer_id WHERE e.event_type = 'checkout' \
         GROUP BY c.customer_id ORDER BY n DESC, c.customer_id ASC",
    )
    .expect("query");
    let batch = result.to_record_batch().expect("batch");
    assert_eq!(batch.num_rows(), 3);
    let schema = batch.schema();
    let names = schema
        .fields()
        .iter()
        .map(|f| f.name().as_str())
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["customer_id", "n"]);
    assert_eq!(result.rows[0].get("customer_id"), Some(&ScalarValue::Int64(1)));
}

fn text(row: &Row, column: &str) -> String {
    match row.get(column) {
        Some(ScalarValue::Utf8(s)) => s.clone(),
        other => panic!("{column} is not text: {other:?}"),
    }
}

#[test]
fn active_buyers_by_region_intersects_order_and_event_customers() {
    let cfg = support::small_dataset();
    let data = fedq_storage::generate_dataset(&cfg);
    let ordered = data
        .orders
        .iter()
        .filter(|o| text(o, "order_date").as_str() >= "2024-01-01")
        .map(|o| int(o, "customer_id"))
        .collect::<BTreeSet<_>>();
    let carted = data
        .events
        .iter()
        .filter(|e| text(e, "event_type") == "add_to_cart")
        .map(|e| int(e, "customer_id"))
        .collect::<BTreeSet<_>>();
    let mut expected: BTreeMap<String, i64> = BTreeMap::new();
    for c in &data.customers {
        let cid = int(c, "customer_id");
        if ordered.contains(&cid) && carted.contains(&cid) {
            *expected.entry(text(c, "region")).or_default() += 1;
        }
    }
    assert!(!expected.is_empty());

    let rec = support::recorded_engine(StrategyMode::Auto, &cfg, None, None);
    let result = futures::executor::block_on(
        rec.engine.active_buyers_by_region("2024-01-01", "add_to_cart"),
    )
    .expect("active buyers");
    assert_eq!(result.columns, vec!["region".to_string(), "buyers".to_string()]);
    assert_eq!(result.meta.path, ExecutionPath::Fast);
    let got = result
        .rows
        .iter()
        .map(|r| (text(r, "region"), int(r, "buyers")))
        .collect::<BTreeMap<_, _>>();
    assert_eq!(got, expected);
    assert_eq!(
        rec.relational.calls(),
        vec!["distinct_keys_matching", "rows_for_keys"]
    );
    assert_eq!(rec.document.calls(), vec!["distinct_keys_matching"]);

    let none = futures::executor::block_on(
        rec.engine.active_buyers_by_region("2999-01-01", "add_to_cart"),
    )
    .expect("no buyers");
    assert!(none.rows.is_empty());
}

#[test]
fn two_relational_tables_and_one_document_table_join_generically() {
    let cfg = support::small_dataset();
    let data = fedq_storage::generate_dataset(&cfg);
    let mut orders_per_customer: BTreeMap<i64, i64> = BTreeMap::new();
    for o in &data.orders {
        if text(o, "order_date").as_str() > "2024-01-01" {
            *orders_per_customer.entry(int(o, "customer_id")).or_default() += 1;
        }
    }
    let mut checkouts_per_customer: BTreeMap<i64, i64> = BTreeMap::new();
    for e in &data.events {
        if text(e, "event_type") == "checkout" {
            *checkouts_per_customer.entry(int(e, "customer_id")).or_default() += 1;
        }
    }
    let mut expected: BTreeMap<String, i64> = BTreeMap::new();
    for c in &data.customers {
        let cid = int(c, "customer_id");
        let pairs = orders_per_customer.get(&cid).copied().unwrap_or(0)
            * checkouts_per_customer.get(&cid).copied().unwrap_or(0);
        if pairs > 0 {
            *expected.entry(text(c, "region")).or_default() += pairs;
        }
    }

    let sql = "SELECT c.region, COUNT(*) AS n FROM customers c \
               JOIN orders o ON c.customer_id = o.customer_id \
               JOIN events e ON c.customer_id = e.customer_id \
               WHERE o.order_date > '2024-01-01' AND e.event_type = 'checkout' \
               GROUP BY c.region ORDER BY c.region";
    for strategy in [StrategyMode::Auto, StrategyMode::Generic] {
        let result = run(&fixture_engine(strategy, &cfg), sql).expect("three tables");
        assert_eq!(result.meta.path, ExecutionPath::Generic);
        let got = result
            .rows
            .iter()
            .map(|r| (text(r, "region"), int(r, "n")))
            .collect::<BTreeMap<_, _>>();
        assert_eq!(got, expected, "{strategy}");
    }
}
