use std::io::Write;

use arrow::util::pretty::pretty_format_batches;
use fedq_common::{EngineConfig, FedqError, Result};
use fedq_storage::{Catalog, DatasetConfig};

use crate::{Engine, QueryResult};

#[derive(Debug, Clone)]
pub struct ReplOptions {
    pub config: EngineConfig,
    pub dataset: DatasetConfig,
    pub catalog: Option<String>,
}

/// Fixture engine, plus any table definitions from `catalog`.
pub fn build_engine(
    config: EngineConfig,
    dataset: &DatasetConfig,
    catalog: Option<&str>,
) -> Result<Engine> {
    let engine = Engine::with_fixture_dataset(config, dataset)?;
    if let Some(path) = catalog {
        let catalog = Catalog::load_from_json(path)?;
        for table in catalog.tables() {
            let name = table.name.clone();
            engine.register_table(name, table);
        }
    }
    Ok(engine)
}

/// Pretty table for `result`, or `OK: 0 rows`.
pub fn render_result(result: &QueryResult) -> Result<String> {
    if result.rows.is_empty() {
        return Ok("OK: 0 rows".to_string());
    }
    let batch = result.to_record_batch()?;
    pretty_format_batches(&[batch])
        .map(|t| t.to_string())
        .map_err(|e| FedqError::Execution(e.to_string()))
}

pub fn run_repl(opts: ReplOptions) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let engine = build_engine(opts.config, &opts.dataset, opts.catalog.as_deref())?;

    eprintln!("fedq REPL (\\dt lists tables, EXPLAIN <query> shows the plan, \\q quits)");
    let stdin = std::io::stdin();
    let mut line = String::new();
    loop {
        print!("fedq> ");
        std::io::stdout().flush()?;
        line.clear();
        // Ctrl+D => EOF => exit
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let raw = line.trim();
        if raw.is_empty() {
            continue;
        }
        if raw == "\\q" || raw.eq_ignore_ascii_case("quit") || raw.eq_ignore_ascii_case("exit") {
            break;
        }
        if raw == "\\dt" {
            for t in engine.list_tables() {
                println!("{t}");
            }
            continue;
        }
        let sql = raw.trim_end_matches(';');
        if let Some(rest) = strip_prefix_ignore_case(sql, "explain ") {
            match engine
                .parse(rest)
                .and_then(|stmt| engine.plan_logical_from_ast(&stmt))
            {
                Ok(plan) => println!("{}", engine.explain(&plan)),
                Err(e) => eprintln!("error: {e}"),
            }
            continue;
        }
        match futures::executor::block_on(engine.sql(sql)) {
            Ok(result) => {
                println!("{}", render_result(&result)?);
                eprintln!(
                    "path={} rows={} elapsed_ms={:.3}",
                    result.meta.path, result.meta.row_count, result.meta.elapsed_ms
                );
            }
            Err(e) => eprintln!("error [{}]: {e}", e.kind()),
        }
    }
    Ok(())
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| s[prefix.len()..].trim_start())
}
