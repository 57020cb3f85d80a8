//! Historical backfill: replay a date range for a set of symbols.
//!
//! Usage:
//!   backfill --symbols BTC,ETH --from 2024-01-01 --to 2024-01-31 [--insert-only]

use chrono::NaiveDate;
use featflow::config::EngineConfig;
use featflow::engine::MaterializeContext;
use featflow::export::JsonlExporter;
use featflow::normalizer::SymbolNormalizer;
use featflow::orchestrator;
use featflow::sources;
use featflow::writer::{SqliteFeatureWriter, WriteMode};
use std::sync::Arc;

struct Args {
    symbols: Vec<String>,
    from: NaiveDate,
    to: NaiveDate,
    mode: WriteMode,
}

fn usage() -> String {
    "usage: backfill --symbols BTC,ETH --from YYYY-MM-DD --to YYYY-MM-DD [--insert-only]"
        .to_string()
}

fn parse_args(argv: &[String]) -> Result<Args, String> {
    let mut symbols: Option<Vec<String>> = None;
    let mut from: Option<NaiveDate> = None;
    let mut to: Option<NaiveDate> = None;
    let mut mode = WriteMode::Upsert;

    let mut i = 0;
    while i < argv.len() {
        match argv[i].as_str() {
            "--symbols" => {
                i += 1;
                let list = argv.get(i).ok_or_else(usage)?;
                symbols = Some(
                    list.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect(),
                );
            }
            "--from" => {
                i += 1;
                let raw = argv.get(i).ok_or_else(usage)?;
                from = Some(
                    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                        .map_err(|e| format!("invalid --from date '{}': {}", raw, e))?,
                );
            }
            "--to" => {
                i += 1;
                let raw = argv.get(i).ok_or_else(usage)?;
                to = Some(
                    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                        .map_err(|e| format!("invalid --to date '{}': {}", raw, e))?,
                );
            }
            "--insert-only" => mode = WriteMode::InsertOnly,
            other => return Err(format!("unknown argument '{}'\n{}", other, usage())),
        }
        i += 1;
    }

    let symbols = symbols.filter(|s| !s.is_empty()).ok_or_else(usage)?;
    Ok(Args {
        symbols,
        from: from.ok_or_else(usage)?,
        to: to.ok_or_else(usage)?,
        mode,
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let argv: Vec<String> = std::env::args().skip(1).collect();
    let args = match parse_args(&argv) {
        Ok(args) => args,
        Err(msg) => {
            eprintln!("{}", msg);
            std::process::exit(2);
        }
    };

    let config = EngineConfig::from_env()?;
    log::info!("🚀 Starting featflow backfill...");
    log::info!("📊 Configuration:");
    log::info!("   DB path: {}", config.db_path);
    log::info!("   Workers: {}", config.worker_count);
    log::info!("   Symbols: {:?}", args.symbols);
    log::info!("   Range: {} to {} ({:?})", args.from, args.to, args.mode);

    let writer = SqliteFeatureWriter::from_config(&config)?;

    let normalizer = {
        let conn = sources::open_source_connection(&config.db_path)?;
        SymbolNormalizer::load(&conn)?
    };

    let export_path = config.export_path.clone();
    let mut ctx = MaterializeContext::new(config, normalizer, Arc::new(writer));
    if let Some(path) = export_path {
        ctx = ctx.with_exporter(JsonlExporter::new(path)?);
    }

    orchestrator::run_backfill(Arc::new(ctx), &args.symbols, args.from, args.to, args.mode)
        .await?;

    Ok(())
}
