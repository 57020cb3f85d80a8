//! Per-unit materialization pipeline
//!
//! One unit = one (symbol, timestamp). The five domain reads are issued
//! concurrently, each on its own read-only connection and each under its
//! own deadline, so a hanging source cannot stall the rest of the unit.
//! A failed domain degrades the unit to partial; the other domains still
//! populate.

use crate::align::{self, DomainData};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::export::JsonlExporter;
use crate::normalizer::SymbolNormalizer;
use crate::records::Domain;
use crate::sources;
use crate::writer::{FeatureWriter, WriteMode, WriteOutcome};
use rusqlite::Connection;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task;
use tokio::time::timeout;

/// One (symbol, timestamp) materialization task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkUnit {
    pub raw_symbol: String,
    pub timestamp: i64,
}

impl WorkUnit {
    pub fn new(raw_symbol: impl Into<String>, timestamp: i64) -> Self {
        Self {
            raw_symbol: raw_symbol.into(),
            timestamp,
        }
    }
}

/// Outcome of one unit, attributable to (symbol, timestamp) for replay.
#[derive(Debug, Clone)]
pub struct UnitReport {
    pub canonical_symbol: String,
    pub timestamp: i64,
    pub write: WriteOutcome,
    /// Domains that failed to read (schema drift, timeout, connectivity).
    /// Join misses are not failures and never appear here.
    pub failed_domains: Vec<(Domain, String)>,
    pub completeness_pct: f64,
}

impl UnitReport {
    pub fn is_partial(&self) -> bool {
        !self.failed_domains.is_empty()
    }
}

/// Shared, read-only state handed to every worker.
pub struct MaterializeContext {
    pub db_path: Arc<String>,
    pub config: Arc<EngineConfig>,
    pub normalizer: Arc<SymbolNormalizer>,
    pub writer: Arc<dyn FeatureWriter>,
    /// Optional JSONL tap; appended to after every insert or update.
    pub exporter: Option<Arc<Mutex<JsonlExporter>>>,
}

impl MaterializeContext {
    pub fn new(
        config: EngineConfig,
        normalizer: SymbolNormalizer,
        writer: Arc<dyn FeatureWriter>,
    ) -> Self {
        Self {
            db_path: Arc::new(config.db_path.clone()),
            config: Arc::new(config),
            normalizer: Arc::new(normalizer),
            writer,
            exporter: None,
        }
    }

    pub fn with_exporter(mut self, exporter: JsonlExporter) -> Self {
        self.exporter = Some(Arc::new(Mutex::new(exporter)));
        self
    }
}

/// Run one domain read on the blocking pool under its own deadline.
async fn read_domain<T, F>(
    domain: Domain,
    db_path: Arc<String>,
    timeout_ms: u64,
    read_fn: F,
) -> Result<T, EngineError>
where
    T: Send + 'static,
    F: FnOnce(&Connection) -> Result<T, EngineError> + Send + 'static,
{
    let handle = task::spawn_blocking(move || {
        let conn = sources::open_source_connection(db_path.as_str())?;
        read_fn(&conn)
    });

    match timeout(Duration::from_millis(timeout_ms), handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) => Err(EngineError::Connectivity(join_err.to_string())),
        Err(_) => Err(EngineError::Timeout { domain }),
    }
}

/// Materialize one unit: read all domains, align, aggregate, score, write.
pub async fn materialize_unit(
    ctx: &MaterializeContext,
    unit: &WorkUnit,
    mode: WriteMode,
) -> Result<UnitReport, EngineError> {
    let canonical = ctx.normalizer.canonicalize(&unit.raw_symbol);
    let as_of = unit.timestamp;
    let cfg = &ctx.config;
    let timeout_ms = cfg.read_timeout_ms;

    let price_fut = {
        let symbol = canonical.symbol.clone();
        let window = cfg.price_window_secs;
        read_domain(Domain::Price, ctx.db_path.clone(), timeout_ms, move |conn| {
            sources::price::fetch(conn, &symbol, as_of, window)
        })
    };
    let technical_fut = {
        let symbol = canonical.symbol.clone();
        let window = cfg.technical_window_secs;
        read_domain(Domain::Technical, ctx.db_path.clone(), timeout_ms, move |conn| {
            sources::technical::fetch(conn, &symbol, as_of, window)
        })
    };
    let macro_fut = {
        let window = cfg.macro_window_secs;
        read_domain(Domain::Macro, ctx.db_path.clone(), timeout_ms, move |conn| {
            sources::macro_econ::fetch(conn, as_of, window)
        })
    };
    let onchain_fut = {
        let symbol = canonical.symbol.clone();
        let window = cfg.onchain_window_secs;
        read_domain(Domain::Onchain, ctx.db_path.clone(), timeout_ms, move |conn| {
            sources::onchain::fetch(conn, &symbol, as_of, window)
        })
    };
    let sentiment_fut = {
        let symbol = canonical.symbol.clone();
        let window = cfg.decay_bands.window_secs();
        read_domain(Domain::Sentiment, ctx.db_path.clone(), timeout_ms, move |conn| {
            sources::sentiment::fetch(conn, &symbol, as_of, window)
        })
    };

    let (price_res, technical_res, macro_res, onchain_res, sentiment_res) =
        tokio::join!(price_fut, technical_fut, macro_fut, onchain_fut, sentiment_fut);

    let mut data = DomainData::default();
    let mut failed_domains = Vec::new();

    match price_res {
        Ok(price) => data.price = price,
        Err(e) => failed_domains.push((Domain::Price, e.to_string())),
    }
    match technical_res {
        Ok(technical) => data.technical = technical,
        Err(e) => failed_domains.push((Domain::Technical, e.to_string())),
    }
    match macro_res {
        Ok(snapshot) => data.macro_snapshot = snapshot,
        Err(e) => failed_domains.push((Domain::Macro, e.to_string())),
    }
    match onchain_res {
        Ok(onchain) => data.onchain = onchain,
        Err(e) => failed_domains.push((Domain::Onchain, e.to_string())),
    }
    match sentiment_res {
        Ok(observations) => data.sentiment = observations,
        Err(e) => failed_domains.push((Domain::Sentiment, e.to_string())),
    }

    // Every domain failing means the store itself is the problem, not one
    // collector's schema. Fail the unit so it gets re-queued.
    if failed_domains.len() == Domain::all().len() {
        return Err(EngineError::Connectivity(format!(
            "all domain reads failed for {} @ {}: {}",
            canonical.symbol, as_of, failed_domains[0].1
        )));
    }

    for (domain, detail) in &failed_domains {
        log::warn!(
            "⚠️  {} read failed for {} @ {}: {}",
            domain.as_str(),
            canonical.symbol,
            as_of,
            detail
        );
    }

    let now = chrono::Utc::now().timestamp();
    let record = align::assemble(
        &canonical.symbol,
        canonical.mapped,
        as_of,
        now,
        &data,
        &cfg.decay_bands,
    );
    let completeness_pct = record.data_completeness_pct;

    let write = ctx.writer.write(&record, mode).await?;

    if matches!(write, WriteOutcome::Inserted | WriteOutcome::Updated) {
        if let Some(exporter) = &ctx.exporter {
            if let Err(e) = exporter.lock().await.append(&record) {
                log::warn!("⚠️  Export append failed: {}", e);
            }
        }
    }

    log::debug!(
        "📦 Materialized {} @ {} ({:?}, {:.1}% complete)",
        canonical.symbol,
        as_of,
        write,
        completeness_pct
    );

    Ok(UnitReport {
        canonical_symbol: canonical.symbol,
        timestamp: as_of,
        write,
        failed_domains,
        completeness_pct,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::macro_econ::tests::{create_macro_table, insert_macro};
    use crate::sources::price::tests::{create_price_table, insert_price};
    use crate::sources::sentiment::tests::{create_sentiment_table, insert_sentiment};
    use crate::sources::technical::tests::{create_technical_table, insert_technical};
    use crate::writer::SqliteFeatureWriter;
    use tempfile::TempDir;

    fn make_context(dir: &TempDir) -> MaterializeContext {
        let db_path = dir.path().join("test.db");
        let db_path_str = db_path.to_str().unwrap().to_string();

        let writer = SqliteFeatureWriter::new(&db_path).unwrap();

        let mut config = EngineConfig::from_env().unwrap();
        config.db_path = db_path_str;

        let normalizer = SymbolNormalizer::from_pairs(&[("XBT", "BTC")]);
        MaterializeContext::new(config, normalizer, Arc::new(writer))
    }

    fn open(ctx: &MaterializeContext) -> Connection {
        Connection::open(ctx.db_path.as_str()).unwrap()
    }

    #[tokio::test]
    async fn test_unit_with_partial_sources() {
        let dir = TempDir::new().unwrap();
        let ctx = make_context(&dir);
        {
            let conn = open(&ctx);
            create_price_table(&conn);
            create_technical_table(&conn);
            create_macro_table(&conn);
            create_sentiment_table(&conn);
            insert_price(&conn, "BTC", 9_900, 42_000.0);
            // technical, macro, sentiment tables exist but are empty;
            // onchain table is missing entirely (schema drift)
        }

        let unit = WorkUnit::new("XBT", 10_000);
        let report = materialize_unit(&ctx, &unit, WriteMode::Upsert)
            .await
            .unwrap();

        assert_eq!(report.canonical_symbol, "BTC");
        assert_eq!(report.write, WriteOutcome::Inserted);
        assert!(report.is_partial());
        assert_eq!(report.failed_domains.len(), 1);
        assert_eq!(report.failed_domains[0].0, Domain::Onchain);

        let writer = SqliteFeatureWriter::new(dir.path().join("test.db")).unwrap();
        let stored = writer.read("BTC", 10_000).unwrap().unwrap();
        assert_eq!(stored.current_price, Some(42_000.0));
        assert_eq!(stored.rsi_14, None); // empty window, not an error
        assert_eq!(stored.active_addresses, None);
    }

    #[tokio::test]
    async fn test_unit_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let ctx = make_context(&dir);
        {
            let conn = open(&ctx);
            create_price_table(&conn);
            create_technical_table(&conn);
            create_macro_table(&conn);
            create_sentiment_table(&conn);
            insert_price(&conn, "BTC", 9_900, 42_000.0);
            insert_technical(&conn, "BTC", 9_800, 61.0);
            insert_macro(&conn, "vix", 9_000, 18.4);
            insert_sentiment(&conn, "BTC", 9_500, "crypto", 0.7);
        }

        let unit = WorkUnit::new("BTC", 10_000);
        let first = materialize_unit(&ctx, &unit, WriteMode::Upsert)
            .await
            .unwrap();
        assert_eq!(first.write, WriteOutcome::Inserted);

        let second = materialize_unit(&ctx, &unit, WriteMode::Upsert)
            .await
            .unwrap();
        assert_eq!(second.write, WriteOutcome::Unchanged);
        assert_eq!(first.completeness_pct, second.completeness_pct);
    }

    #[tokio::test]
    async fn test_unmapped_symbol_flagged_not_failed() {
        let dir = TempDir::new().unwrap();
        let ctx = make_context(&dir);
        {
            let conn = open(&ctx);
            create_price_table(&conn);
            create_technical_table(&conn);
            create_macro_table(&conn);
            create_sentiment_table(&conn);
            insert_price(&conn, "doge", 9_900, 0.12);
        }

        let unit = WorkUnit::new("doge", 10_000);
        let report = materialize_unit(&ctx, &unit, WriteMode::Upsert)
            .await
            .unwrap();
        assert_eq!(report.canonical_symbol, "DOGE");

        let writer = SqliteFeatureWriter::new(dir.path().join("test.db")).unwrap();
        let stored = writer.read("DOGE", 10_000).unwrap().unwrap();
        assert!(!stored.symbol_mapped);
        assert_eq!(stored.current_price, Some(0.12));
    }
}
