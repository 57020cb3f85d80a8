//! Run orchestration: real-time tailing and historical backfill
//!
//! Both modes reduce to the same thing: enumerate (symbol, timestamp)
//! units, fan them out across a bounded worker pool, and keep each
//! symbol's units in ascending timestamp order. Order matters per symbol
//! only, so fan-out is one task per symbol with a shared semaphore
//! bounding total concurrency.

use crate::engine::{self, MaterializeContext, WorkUnit};
use crate::error::EngineError;
use crate::sources;
use crate::writer::{WriteMode, WriteOutcome};
use chrono::{Duration as ChronoDuration, NaiveDate};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task;

/// Batch cap per poll cycle; keeps a cold-start tail from unbounded reads.
const TAIL_BATCH_LIMIT: i64 = 500;

/// Tail position in the price stream: last (timestamp, rowid) already
/// handed to the engine. The rowid tie-break keeps the cursor exact when a
/// batch boundary lands inside a run of rows sharing one timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TailCursor {
    pub timestamp: i64,
    pub rowid: i64,
}

impl TailCursor {
    /// Before the first row of an empty store.
    pub fn start() -> Self {
        TailCursor {
            timestamp: 0,
            rowid: 0,
        }
    }
}

/// Cross-worker run statistics, logged at shutdown.
#[derive(Debug, Default)]
pub struct RunCounters {
    pub processed: AtomicU64,
    pub inserted: AtomicU64,
    pub updated: AtomicU64,
    pub unchanged: AtomicU64,
    pub skipped: AtomicU64,
    pub partial: AtomicU64,
    pub failed: AtomicU64,
}

impl RunCounters {
    pub fn record(&self, result: &Result<engine::UnitReport, EngineError>) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        match result {
            Ok(report) => {
                match report.write {
                    WriteOutcome::Inserted => &self.inserted,
                    WriteOutcome::Updated => &self.updated,
                    WriteOutcome::Unchanged => &self.unchanged,
                    WriteOutcome::Skipped => &self.skipped,
                }
                .fetch_add(1, Ordering::Relaxed);
                if report.is_partial() {
                    self.partial.fetch_add(1, Ordering::Relaxed);
                }
            }
            Err(_) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn log_summary(&self, mode: &str) {
        log::info!(
            "✅ {} run complete: {} processed, {} inserted, {} updated, {} unchanged, {} skipped, {} partial, {} failed",
            mode,
            self.processed.load(Ordering::Relaxed),
            self.inserted.load(Ordering::Relaxed),
            self.updated.load(Ordering::Relaxed),
            self.unchanged.load(Ordering::Relaxed),
            self.skipped.load(Ordering::Relaxed),
            self.partial.load(Ordering::Relaxed),
            self.failed.load(Ordering::Relaxed),
        );
    }
}

/// Process one symbol's units sequentially, each gated by the worker pool.
async fn run_symbol_units(
    ctx: Arc<MaterializeContext>,
    semaphore: Arc<Semaphore>,
    counters: Arc<RunCounters>,
    units: Vec<WorkUnit>,
    mode: WriteMode,
) {
    for unit in units {
        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return, // pool closed, shutting down
        };

        let result = engine::materialize_unit(&ctx, &unit, mode).await;
        if let Err(e) = &result {
            log::error!(
                "❌ Unit failed for {} @ {}: {}",
                unit.raw_symbol,
                unit.timestamp,
                e
            );
        }
        counters.record(&result);
        drop(permit);
    }
}

async fn fan_out(
    ctx: &Arc<MaterializeContext>,
    semaphore: &Arc<Semaphore>,
    counters: &Arc<RunCounters>,
    per_symbol: BTreeMap<String, Vec<WorkUnit>>,
    mode: WriteMode,
) {
    let mut handles = Vec::new();
    for (_, units) in per_symbol {
        handles.push(tokio::spawn(run_symbol_units(
            ctx.clone(),
            semaphore.clone(),
            counters.clone(),
            units,
            mode,
        )));
    }
    for handle in handles {
        if let Err(e) = handle.await {
            log::error!("❌ Worker task panicked: {}", e);
        }
    }
}

/// One tail poll: pick up price rows past `cursor`, materialize a unit per
/// row, and return the advanced cursor.
pub async fn drain_tail_batch(
    ctx: &Arc<MaterializeContext>,
    semaphore: &Arc<Semaphore>,
    counters: &Arc<RunCounters>,
    cursor: TailCursor,
) -> Result<TailCursor, EngineError> {
    let db_path = ctx.db_path.clone();
    let rows = task::spawn_blocking(move || {
        let conn = sources::open_source_connection(db_path.as_str())?;
        sources::price::newer_than(&conn, cursor.timestamp, cursor.rowid, TAIL_BATCH_LIMIT)
    })
    .await
    .map_err(|e| EngineError::Connectivity(e.to_string()))??;

    let last = match rows.last() {
        Some(last) => last,
        None => {
            log::debug!("⏳ No price rows newer than cursor {:?}", cursor);
            return Ok(cursor);
        }
    };

    // rows arrive in cursor order, so the last row is the new position
    let next_cursor = TailCursor {
        timestamp: last.timestamp,
        rowid: last.rowid,
    };
    log::info!(
        "📈 Picked up {} new price rows (cursor {} -> {})",
        rows.len(),
        cursor.timestamp,
        next_cursor.timestamp
    );

    // rows arrive ascending, so per-symbol order is preserved by grouping
    let mut per_symbol: BTreeMap<String, Vec<WorkUnit>> = BTreeMap::new();
    for event in rows {
        per_symbol
            .entry(crate::normalizer::lookup_key(&event.symbol))
            .or_default()
            .push(WorkUnit::new(event.symbol, event.timestamp));
    }

    fan_out(ctx, semaphore, counters, per_symbol, WriteMode::Upsert).await;
    Ok(next_cursor)
}

/// Tail the price stream until Ctrl-C, materializing as rows land.
///
/// In-flight units finish before shutdown; the poll in progress is the
/// last one.
pub async fn run_realtime(ctx: Arc<MaterializeContext>) -> Result<(), EngineError> {
    let counters = Arc::new(RunCounters::default());
    let semaphore = Arc::new(Semaphore::new(ctx.config.worker_count));

    let db_path = ctx.db_path.clone();
    let mut cursor = task::spawn_blocking(move || {
        let conn = sources::open_source_connection(db_path.as_str())?;
        sources::price::tail_position(&conn)
    })
    .await
    .map_err(|e| EngineError::Connectivity(e.to_string()))??
    .map(|(timestamp, rowid)| TailCursor { timestamp, rowid })
    .unwrap_or_else(TailCursor::start);

    log::info!(
        "🚀 Tailing price stream from cursor {} (poll every {}s, {} workers)",
        cursor.timestamp,
        ctx.config.poll_interval_secs,
        ctx.config.worker_count
    );

    // One shutdown future for the whole loop: a Ctrl-C arriving while a
    // drain is in flight is latched, not lost.
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut poll = tokio::time::interval(Duration::from_secs(ctx.config.poll_interval_secs));
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                log::info!("🛑 Shutdown requested, finishing in-flight units");
                break;
            }
            _ = poll.tick() => {
                match drain_tail_batch(&ctx, &semaphore, &counters, cursor).await {
                    Ok(next) => cursor = next,
                    Err(e) => log::error!("❌ Tail poll failed: {}", e),
                }
            }
        }
    }

    counters.log_summary("realtime");
    Ok(())
}

/// Unit timestamp for one (symbol, day): the day's latest price timestamp
/// when one exists, otherwise the end-of-day instant.
async fn backfill_unit_timestamp(
    ctx: &Arc<MaterializeContext>,
    symbol: &str,
    day_start: i64,
    day_end: i64,
) -> Result<i64, EngineError> {
    let db_path = ctx.db_path.clone();
    let key = crate::normalizer::lookup_key(symbol);
    let latest = task::spawn_blocking(move || {
        let conn = sources::open_source_connection(db_path.as_str())?;
        sources::price::latest_in_range(&conn, &key, day_start, day_end)
    })
    .await
    .map_err(|e| EngineError::Connectivity(e.to_string()))??;

    Ok(latest.unwrap_or(day_end - 1))
}

/// Replay a date range for a set of symbols, one unit per (symbol, day).
///
/// Days run ascending per symbol; symbols run in parallel under the worker
/// pool. Safe to re-run over already-materialized ranges.
pub async fn run_backfill(
    ctx: Arc<MaterializeContext>,
    symbols: &[String],
    from: NaiveDate,
    to: NaiveDate,
    mode: WriteMode,
) -> Result<Arc<RunCounters>, EngineError> {
    if from > to {
        return Err(EngineError::Config(format!(
            "backfill range is inverted: {} > {}",
            from, to
        )));
    }

    let day_count = (to - from).num_days() + 1;
    log::info!(
        "🚀 Backfilling {} symbols over {} days ({} to {}, {:?})",
        symbols.len(),
        day_count,
        from,
        to,
        mode
    );

    let counters = Arc::new(RunCounters::default());
    let semaphore = Arc::new(Semaphore::new(ctx.config.worker_count));

    let mut per_symbol: BTreeMap<String, Vec<WorkUnit>> = BTreeMap::new();
    for symbol in symbols {
        let mut units = Vec::with_capacity(day_count as usize);
        let mut day = from;
        while day <= to {
            let day_start = day.and_hms_opt(0, 0, 0).map(|t| t.and_utc().timestamp());
            let day_start = match day_start {
                Some(ts) => ts,
                None => break,
            };
            let day_end = day_start + 86_400;
            // a bad day is counted as failed, the rest of the range still runs
            match backfill_unit_timestamp(&ctx, symbol, day_start, day_end).await {
                Ok(timestamp) => units.push(WorkUnit::new(symbol.clone(), timestamp)),
                Err(e) => {
                    log::error!("❌ Skipping {} on {}: {}", symbol, day, e);
                    counters.record(&Err(e));
                }
            }
            day += ChronoDuration::days(1);
        }
        per_symbol.insert(crate::normalizer::lookup_key(symbol), units);
    }

    fan_out(&ctx, &semaphore, &counters, per_symbol, mode).await;

    counters.log_summary("backfill");
    Ok(counters)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::normalizer::SymbolNormalizer;
    use crate::sources::price::tests::{create_price_table, insert_price};
    use crate::writer::SqliteFeatureWriter;
    use rusqlite::Connection;
    use tempfile::TempDir;

    fn make_context(dir: &TempDir) -> Arc<MaterializeContext> {
        let db_path = dir.path().join("test.db");
        let writer = SqliteFeatureWriter::new(&db_path).unwrap();

        let mut config = EngineConfig::from_env().unwrap();
        config.db_path = db_path.to_str().unwrap().to_string();
        config.worker_count = 2;

        Arc::new(MaterializeContext::new(
            config,
            SymbolNormalizer::from_pairs(&[]),
            Arc::new(writer),
        ))
    }

    fn seed_price_only(ctx: &MaterializeContext) -> Connection {
        let conn = Connection::open(ctx.db_path.as_str()).unwrap();
        create_price_table(&conn);
        crate::sources::technical::tests::create_technical_table(&conn);
        crate::sources::macro_econ::tests::create_macro_table(&conn);
        crate::sources::onchain::tests::create_onchain_table(&conn);
        crate::sources::sentiment::tests::create_sentiment_table(&conn);
        conn
    }

    #[tokio::test]
    async fn test_tail_batch_advances_cursor_and_writes() {
        let dir = TempDir::new().unwrap();
        let ctx = make_context(&dir);
        let conn = seed_price_only(&ctx);
        insert_price(&conn, "BTC", 1_000, 100.0);
        insert_price(&conn, "ETH", 1_100, 2_000.0);

        let semaphore = Arc::new(Semaphore::new(2));
        let counters = Arc::new(RunCounters::default());

        let cursor = drain_tail_batch(&ctx, &semaphore, &counters, TailCursor::start())
            .await
            .unwrap();
        assert_eq!(cursor.timestamp, 1_100);
        assert_eq!(counters.processed.load(Ordering::Relaxed), 2);
        assert_eq!(counters.inserted.load(Ordering::Relaxed), 2);

        let writer = SqliteFeatureWriter::new(dir.path().join("test.db")).unwrap();
        assert!(writer.read("BTC", 1_000).unwrap().is_some());
        assert!(writer.read("ETH", 1_100).unwrap().is_some());

        // nothing new: cursor stays put, nothing processed
        let cursor2 = drain_tail_batch(&ctx, &semaphore, &counters, cursor)
            .await
            .unwrap();
        assert_eq!(cursor2, cursor);
        assert_eq!(counters.processed.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_tail_batch_boundary_inside_shared_timestamp_loses_nothing() {
        let dir = TempDir::new().unwrap();
        let ctx = make_context(&dir);
        let conn = seed_price_only(&ctx);

        // One more row than fits in a single batch, all at one timestamp
        let total = TAIL_BATCH_LIMIT + 1;
        for i in 0..total {
            insert_price(&conn, &format!("SYM{i:03}"), 1_000, 1.0 + i as f64);
        }

        let semaphore = Arc::new(Semaphore::new(2));
        let counters = Arc::new(RunCounters::default());

        let mut cursor = TailCursor::start();
        loop {
            let next = drain_tail_batch(&ctx, &semaphore, &counters, cursor)
                .await
                .unwrap();
            if next == cursor {
                break;
            }
            cursor = next;
        }

        assert_eq!(counters.processed.load(Ordering::Relaxed), total as u64);
        assert_eq!(counters.inserted.load(Ordering::Relaxed), total as u64);
        assert_eq!(counters.failed.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_backfill_materializes_each_day() {
        let dir = TempDir::new().unwrap();
        let ctx = make_context(&dir);
        let conn = seed_price_only(&ctx);

        let from = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let to = NaiveDate::from_ymd_opt(2024, 1, 3).unwrap();
        let day1 = from.and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp();

        // Day 1 has two prices (latest wins), day 2 has none, day 3 has one
        insert_price(&conn, "BTC", day1 + 3_600, 100.0);
        insert_price(&conn, "BTC", day1 + 7_200, 110.0);
        insert_price(&conn, "BTC", day1 + 2 * 86_400 + 60, 120.0);

        let symbols = vec!["BTC".to_string()];
        let counters = run_backfill(ctx, &symbols, from, to, WriteMode::Upsert)
            .await
            .unwrap();
        assert_eq!(counters.processed.load(Ordering::Relaxed), 3);
        assert_eq!(counters.failed.load(Ordering::Relaxed), 0);

        let writer = SqliteFeatureWriter::new(dir.path().join("test.db")).unwrap();
        // day 1 unit sits at the latest price timestamp of the day
        let row = writer.read("BTC", day1 + 7_200).unwrap().unwrap();
        assert_eq!(row.current_price, Some(110.0));
        // day 2 had no price: unit lands at end-of-day, price null
        let empty_day = writer.read("BTC", day1 + 2 * 86_400 - 1).unwrap().unwrap();
        assert_eq!(empty_day.current_price, None);
    }

    #[tokio::test]
    async fn test_backfill_counts_bad_days_and_keeps_going() {
        let dir = TempDir::new().unwrap();
        let ctx = make_context(&dir);

        // no price_data table at all: every day's enumeration fails
        let conn = Connection::open(ctx.db_path.as_str()).unwrap();
        crate::sources::technical::tests::create_technical_table(&conn);
        crate::sources::macro_econ::tests::create_macro_table(&conn);
        crate::sources::onchain::tests::create_onchain_table(&conn);
        crate::sources::sentiment::tests::create_sentiment_table(&conn);

        let from = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let to = NaiveDate::from_ymd_opt(2024, 1, 3).unwrap();
        let counters = run_backfill(ctx, &["BTC".to_string()], from, to, WriteMode::Upsert)
            .await
            .unwrap();

        // the run finishes instead of aborting on the first bad day
        assert_eq!(counters.processed.load(Ordering::Relaxed), 3);
        assert_eq!(counters.failed.load(Ordering::Relaxed), 3);
        assert_eq!(counters.inserted.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_backfill_rejects_inverted_range() {
        let dir = TempDir::new().unwrap();
        let ctx = make_context(&dir);
        seed_price_only(&ctx);

        let from = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        let to = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let result = run_backfill(ctx, &["BTC".to_string()], from, to, WriteMode::Upsert).await;
        assert!(matches!(result, Err(EngineError::Config(_))));
    }

    #[tokio::test]
    async fn test_backfill_rerun_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let ctx = make_context(&dir);
        let conn = seed_price_only(&ctx);

        let from = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let day1 = from.and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp();
        insert_price(&conn, "BTC", day1 + 3_600, 100.0);

        let symbols = vec!["BTC".to_string()];
        let first = run_backfill(ctx.clone(), &symbols, from, from, WriteMode::Upsert)
            .await
            .unwrap();
        assert_eq!(first.inserted.load(Ordering::Relaxed), 1);

        let second = run_backfill(ctx, &symbols, from, from, WriteMode::Upsert)
            .await
            .unwrap();
        assert_eq!(second.unchanged.load(Ordering::Relaxed), 1);
        assert_eq!(second.inserted.load(Ordering::Relaxed), 0);
    }
}
