use fedq_client::repl::{build_engine, render_result, run_repl, ReplOptions};
use fedq_client::{Engine, QueryResult};
use fedq_common::{EngineConfig, StrategyMode};
use fedq_storage::DatasetConfig;
use tracing_subscriber::EnvFilter;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let Some(command) = args.first().map(String::as_str) else {
        print_usage();
        return Ok(());
    };
    if command == "--help" || command == "-h" {
        print_usage();
        return Ok(());
    }

    let opts = parse_opts(&args[1..])?;
    match command {
        "query" => run_query(opts),
        "demo" => run_demo(opts),
        "compare" => run_compare(opts),
        "active-buyers" => run_active_buyers(opts),
        "repl" => {
            let config = opts.engine_config()?;
            run_repl(ReplOptions {
                config,
                dataset: opts.dataset,
                catalog: opts.catalog,
            })
        }
        other => Err(format!("unknown command: {other}").into()),
    }
}

#[derive(Debug, Clone)]
struct CliOpts {
    sql: Option<String>,
    plan_only: bool,
    strategy: Option<StrategyMode>,
    event: Option<String>,
    cutoff: String,
    order: String,
    offsets: Vec<i64>,
    limit: i64,
    dataset: DatasetConfig,
    catalog: Option<String>,
    config: Option<String>,
}

impl CliOpts {
    fn engine_config(&self) -> CliResult<EngineConfig> {
        let config = match &self.config {
            Some(path) => EngineConfig::from_json_file(path)?,
            None => EngineConfig::default(),
        };
        let mut config = config.apply_env_overrides()?;
        if let Some(strategy) = self.strategy {
            config.strategy = strategy;
        }
        Ok(config)
    }

    fn engine(&self) -> CliResult<Engine> {
        Ok(build_engine(
            self.engine_config()?,
            &self.dataset,
            self.catalog.as_deref(),
        )?)
    }

    fn event(&self, default: &'static str) -> &str {
        self.event.as_deref().unwrap_or(default)
    }

    fn offsets(&self, default: &[i64]) -> Vec<i64> {
        if self.offsets.is_empty() {
            default.to_vec()
        } else {
            self.offsets.clone()
        }
    }
}

fn parse_opts(args: &[String]) -> CliResult<CliOpts> {
    let mut opts = CliOpts {
        sql: None,
        plan_only: false,
        strategy: None,
        event: None,
        cutoff: "2024-01-01".to_string(),
        order: "n DESC, c.customer_id ASC".to_string(),
        offsets: Vec::new(),
        limit: 10,
        dataset: DatasetConfig::default(),
        catalog: None,
        config: None,
    };

    let mut i = 0usize;
    while i < args.len() {
        let flag = args[i].as_str();
        let mut value = || -> CliResult<String> {
            i += 1;
            args.get(i)
                .cloned()
                .ok_or_else(|| format!("missing value for {flag}").into())
        };
        match flag {
            "--sql" => opts.sql = Some(value()?),
            "--plan" => opts.plan_only = true,
            "--legacy" => opts.strategy = Some(StrategyMode::Legacy),
            "--generic" => opts.strategy = Some(StrategyMode::Generic),
            "--event" => opts.event = Some(value()?),
            "--cutoff" => opts.cutoff = value()?,
            "--order" => opts.order = value()?,
            "--offset" => opts.offsets.push(value()?.parse()?),
            "--limit" => opts.limit = value()?.parse()?,
            "--customers" => opts.dataset.customers = value()?.parse()?,
            "--orders" => opts.dataset.orders = value()?.parse()?,
            "--events" => opts.dataset.events = value()?.parse()?,
            "--seed" => opts.dataset.seed = value()?.parse()?,
            "--catalog" => opts.catalog = Some(value()?),
            "--config" => opts.config = Some(value()?),
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => return Err(format!("unknown argument: {other}").into()),
        }
        i += 1;
    }
    Ok(opts)
}

fn template_sql(event: &str, order: &str, offset: i64, limit: i64) -> String {
    format!(
        "SELECT c.customer_id, COUNT(e.event_id) AS n \
         FROM customers c JOIN events e ON c.customer_id = e.customer_id \
         WHERE e.event_type = '{}' \
         GROUP BY c.customer_id \
         ORDER BY {order} \
         LIMIT {limit} OFFSET {offset}",
        event.replace('\'', "''")
    )
}

fn print_result(result: &QueryResult) -> CliResult<()> {
    println!("{}", render_result(result)?);
    println!("META: {}", serde_json::to_string(&result.meta)?);
    Ok(())
}

fn run_query(opts: CliOpts) -> CliResult<()> {
    let sql = opts.sql.clone().ok_or("query requires --sql")?;
    let engine = opts.engine()?;
    if opts.plan_only {
        let stmt = engine.parse(&sql)?;
        let plan = engine.plan_logical_from_ast(&stmt)?;
        println!("{}", engine.explain(&plan));
        return Ok(());
    }
    let result = futures::executor::block_on(engine.sql(&sql))?;
    print_result(&result)
}

fn run_demo(opts: CliOpts) -> CliResult<()> {
    let engine = opts.engine()?;
    let offset = opts.offsets(&[1000])[0];
    let sql = template_sql(opts.event("page_view"), &opts.order, offset, opts.limit);
    println!("SQL: {sql}");
    let result = futures::executor::block_on(engine.sql(&sql))?;
    print_result(&result)
}

fn run_compare(opts: CliOpts) -> CliResult<()> {
    let engine = opts.engine()?;
    println!(
        "{:>8} {:>6} | {:>11} | {:>11} | {:>7} | {:<5} | equal",
        "offset", "limit", "legacy ms", "logical ms", "rows", "path"
    );
    let mut all_equal = true;
    for offset in opts.offsets(&[0, 1000, 5000]) {
        let sql = template_sql(opts.event("page_view"), &opts.order, offset, opts.limit);
        let stmt = engine.parse(&sql)?;
        let cmp = futures::executor::block_on(engine.compare(&stmt))?;
        all_equal &= cmp.equal;
        println!(
            "{:>8} {:>6} | {:>11.2} | {:>11.2} | {:>7} | {:<5} | {}",
            offset,
            opts.limit,
            cmp.legacy_meta.elapsed_ms,
            cmp.logical_meta.elapsed_ms,
            cmp.logical_meta.row_count,
            cmp.logical_meta.path.as_str(),
            cmp.equal
        );
    }
    if !all_equal {
        return Err("legacy and logical results differ".into());
    }
    Ok(())
}

fn run_active_buyers(opts: CliOpts) -> CliResult<()> {
    let engine = opts.engine()?;
    let event = opts.event("add_to_cart");
    if opts.plan_only {
        let plan = engine.plan_active_buyers_by_region(&opts.cutoff, event)?;
        println!("{}", fedq_planner::explain_active_buyers(&plan));
        return Ok(());
    }
    let result =
        futures::executor::block_on(engine.active_buyers_by_region(&opts.cutoff, event))?;
    print_result(&result)
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  fedq query --sql \"<SQL>\" [--plan] [--legacy|--generic]");
    eprintln!("  fedq demo [--offset N] [--limit N] [--event E] [--order \"n DESC, c.customer_id ASC\"]");
    eprintln!("  fedq compare [--event E] [--offset N]... [--limit N]");
    eprintln!("  fedq active-buyers [--cutoff YYYY-MM-DD] [--event E] [--plan]");
    eprintln!("  fedq repl");
    eprintln!();
    eprintln!("Shared options:");
    eprintln!("  --customers N --orders N --events N --seed N   fixture dataset size");
    eprintln!("  --catalog PATH   extra table definitions (JSON)");
    eprintln!("  --config PATH    engine config (JSON)");
    eprintln!("Logging is controlled by RUST_LOG, e.g. RUST_LOG=fedq_client=debug");
}
