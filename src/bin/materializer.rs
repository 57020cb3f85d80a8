//! Real-time materializer: tails the price stream and keeps the wide
//! feature table current. Runs until Ctrl-C.

use featflow::config::EngineConfig;
use featflow::engine::MaterializeContext;
use featflow::export::JsonlExporter;
use featflow::normalizer::SymbolNormalizer;
use featflow::orchestrator;
use featflow::sources;
use featflow::writer::SqliteFeatureWriter;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let config = EngineConfig::from_env()?;
    log::info!("🚀 Starting featflow materializer...");
    log::info!("📊 Configuration:");
    log::info!("   DB path: {}", config.db_path);
    log::info!("   Workers: {}", config.worker_count);
    log::info!("   Poll interval: {}s", config.poll_interval_secs);
    log::info!(
        "   Windows: price {}s, technical {}s, macro {}s, onchain {}s, sentiment {}s",
        config.price_window_secs,
        config.technical_window_secs,
        config.macro_window_secs,
        config.onchain_window_secs,
        config.decay_bands.window_secs()
    );

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

    orchestrator::run_realtime(Arc::new(ctx)).await?;

    log::info!("👋 Materializer stopped");
    Ok(())
}
