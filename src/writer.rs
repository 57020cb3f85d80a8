//! Idempotent upsert writer for the materialized feature store
//!
//! One contract shared by both run modes: read the existing row, merge
//! (incoming non-null wins, nothing is ever nulled out), recompute
//! completeness on the merged state, then upsert inside one immediate
//! transaction. Re-running a unit converges to the same row.

use crate::backoff::ExponentialBackoff;
use crate::completeness;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::records::MaterializedFeatureRecord;
use crate::sqlite_pragma::apply_optimized_pragmas;
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::Path;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Insert or merge-update (default for both run modes).
    Upsert,
    /// Backfill "--insert-only": leave existing rows untouched.
    InsertOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Inserted,
    Updated,
    /// Merge produced a row identical to the stored one; nothing written.
    Unchanged,
    /// Row existed and mode was InsertOnly.
    Skipped,
}

#[async_trait]
pub trait FeatureWriter: Send + Sync {
    async fn write(
        &self,
        record: &MaterializedFeatureRecord,
        mode: WriteMode,
    ) -> Result<WriteOutcome, EngineError>;
}

pub struct SqliteFeatureWriter {
    conn: Arc<Mutex<Connection>>,
    retry_initial_ms: u64,
    retry_max_ms: u64,
    retry_max: u32,
}

/// Create the output table. Source tables belong to the collectors and are
/// never created here.
pub fn init_schema(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS materialized_features (
            canonical_symbol            TEXT NOT NULL,
            timestamp                   INTEGER NOT NULL,
            created_at                  INTEGER NOT NULL,
            updated_at                  INTEGER NOT NULL,
            current_price               REAL,
            volume_24h                  REAL,
            market_cap                  REAL,
            percent_change_1h           REAL,
            percent_change_24h          REAL,
            percent_change_7d           REAL,
            open                        REAL,
            high                        REAL,
            low                         REAL,
            close                       REAL,
            ohlc_volume                 REAL,
            price_source                TEXT,
            sma_20                      REAL,
            sma_50                      REAL,
            ema_12                      REAL,
            ema_26                      REAL,
            rsi_14                      REAL,
            macd                        REAL,
            macd_signal                 REAL,
            bollinger_upper             REAL,
            bollinger_lower             REAL,
            fed_funds_rate              REAL,
            treasury_10y                REAL,
            dxy_index                   REAL,
            cpi_yoy                     REAL,
            unemployment_rate           REAL,
            sp500_close                 REAL,
            vix                         REAL,
            active_addresses            INTEGER,
            transaction_count           INTEGER,
            exchange_inflow             REAL,
            exchange_outflow            REAL,
            whale_tx_count              INTEGER,
            nvt_ratio                   REAL,
            sentiment_crypto            REAL,
            sentiment_stock             REAL,
            sentiment_social            REAL,
            sentiment_overall           REAL,
            sentiment_observation_count INTEGER NOT NULL DEFAULT 0,
            data_completeness_pct       REAL NOT NULL DEFAULT 0,
            has_price                   INTEGER NOT NULL DEFAULT 0,
            has_technical               INTEGER NOT NULL DEFAULT 0,
            has_macro                   INTEGER NOT NULL DEFAULT 0,
            has_onchain                 INTEGER NOT NULL DEFAULT 0,
            has_sentiment               INTEGER NOT NULL DEFAULT 0,
            symbol_mapped               INTEGER NOT NULL DEFAULT 1,
            PRIMARY KEY (canonical_symbol, timestamp)
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_features_timestamp
         ON materialized_features(timestamp DESC)",
        [],
    )?;

    Ok(())
}

const SELECT_COLUMNS: &str = "canonical_symbol, timestamp, created_at, updated_at,
    current_price, volume_24h, market_cap, percent_change_1h, percent_change_24h,
    percent_change_7d, open, high, low, close, ohlc_volume, price_source,
    sma_20, sma_50, ema_12, ema_26, rsi_14, macd, macd_signal,
    bollinger_upper, bollinger_lower,
    fed_funds_rate, treasury_10y, dxy_index, cpi_yoy, unemployment_rate,
    sp500_close, vix,
    active_addresses, transaction_count, exchange_inflow, exchange_outflow,
    whale_tx_count, nvt_ratio,
    sentiment_crypto, sentiment_stock, sentiment_social, sentiment_overall,
    sentiment_observation_count, data_completeness_pct,
    has_price, has_technical, has_macro, has_onchain, has_sentiment,
    symbol_mapped";

fn row_to_record(row: &rusqlite::Row<'_>) -> Result<MaterializedFeatureRecord, rusqlite::Error> {
    Ok(MaterializedFeatureRecord {
        canonical_symbol: row.get(0)?,
        timestamp: row.get(1)?,
        created_at: row.get(2)?,
        updated_at: row.get(3)?,
        current_price: row.get(4)?,
        volume_24h: row.get(5)?,
        market_cap: row.get(6)?,
        percent_change_1h: row.get(7)?,
        percent_change_24h: row.get(8)?,
        percent_change_7d: row.get(9)?,
        open: row.get(10)?,
        high: row.get(11)?,
        low: row.get(12)?,
        close: row.get(13)?,
        ohlc_volume: row.get(14)?,
        price_source: row.get(15)?,
        sma_20: row.get(16)?,
        sma_50: row.get(17)?,
        ema_12: row.get(18)?,
        ema_26: row.get(19)?,
        rsi_14: row.get(20)?,
        macd: row.get(21)?,
        macd_signal: row.get(22)?,
        bollinger_upper: row.get(23)?,
        bollinger_lower: row.get(24)?,
        fed_funds_rate: row.get(25)?,
        treasury_10y: row.get(26)?,
        dxy_index: row.get(27)?,
        cpi_yoy: row.get(28)?,
        unemployment_rate: row.get(29)?,
        sp500_close: row.get(30)?,
        vix: row.get(31)?,
        active_addresses: row.get(32)?,
        transaction_count: row.get(33)?,
        exchange_inflow: row.get(34)?,
        exchange_outflow: row.get(35)?,
        whale_tx_count: row.get(36)?,
        nvt_ratio: row.get(37)?,
        sentiment_crypto: row.get(38)?,
        sentiment_stock: row.get(39)?,
        sentiment_social: row.get(40)?,
        sentiment_overall: row.get(41)?,
        sentiment_observation_count: row.get(42)?,
        data_completeness_pct: row.get(43)?,
        has_price: row.get(44)?,
        has_technical: row.get(45)?,
        has_macro: row.get(46)?,
        has_onchain: row.get(47)?,
        has_sentiment: row.get(48)?,
        symbol_mapped: row.get(49)?,
    })
}

fn upsert_record(
    tx: &rusqlite::Transaction<'_>,
    record: &MaterializedFeatureRecord,
) -> Result<(), rusqlite::Error> {
    tx.execute(
        "INSERT INTO materialized_features (
            canonical_symbol, timestamp, created_at, updated_at,
            current_price, volume_24h, market_cap, percent_change_1h,
            percent_change_24h, percent_change_7d, open, high, low, close,
            ohlc_volume, price_source,
            sma_20, sma_50, ema_12, ema_26, rsi_14, macd, macd_signal,
            bollinger_upper, bollinger_lower,
            fed_funds_rate, treasury_10y, dxy_index, cpi_yoy,
            unemployment_rate, sp500_close, vix,
            active_addresses, transaction_count, exchange_inflow,
            exchange_outflow, whale_tx_count, nvt_ratio,
            sentiment_crypto, sentiment_stock, sentiment_social,
            sentiment_overall, sentiment_observation_count,
            data_completeness_pct,
            has_price, has_technical, has_macro, has_onchain, has_sentiment,
            symbol_mapped
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13,
                  ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25,
                  ?26, ?27, ?28, ?29, ?30, ?31, ?32, ?33, ?34, ?35, ?36, ?37,
                  ?38, ?39, ?40, ?41, ?42, ?43, ?44, ?45, ?46, ?47, ?48, ?49,
                  ?50)
        ON CONFLICT(canonical_symbol, timestamp) DO UPDATE SET
            updated_at = excluded.updated_at,
            current_price = excluded.current_price,
            volume_24h = excluded.volume_24h,
            market_cap = excluded.market_cap,
            percent_change_1h = excluded.percent_change_1h,
            percent_change_24h = excluded.percent_change_24h,
            percent_change_7d = excluded.percent_change_7d,
            open = excluded.open,
            high = excluded.high,
            low = excluded.low,
            close = excluded.close,
            ohlc_volume = excluded.ohlc_volume,
            price_source = excluded.price_source,
            sma_20 = excluded.sma_20,
            sma_50 = excluded.sma_50,
            ema_12 = excluded.ema_12,
            ema_26 = excluded.ema_26,
            rsi_14 = excluded.rsi_14,
            macd = excluded.macd,
            macd_signal = excluded.macd_signal,
            bollinger_upper = excluded.bollinger_upper,
            bollinger_lower = excluded.bollinger_lower,
            fed_funds_rate = excluded.fed_funds_rate,
            treasury_10y = excluded.treasury_10y,
            dxy_index = excluded.dxy_index,
            cpi_yoy = excluded.cpi_yoy,
            unemployment_rate = excluded.unemployment_rate,
            sp500_close = excluded.sp500_close,
            vix = excluded.vix,
            active_addresses = excluded.active_addresses,
            transaction_count = excluded.transaction_count,
            exchange_inflow = excluded.exchange_inflow,
            exchange_outflow = excluded.exchange_outflow,
            whale_tx_count = excluded.whale_tx_count,
            nvt_ratio = excluded.nvt_ratio,
            sentiment_crypto = excluded.sentiment_crypto,
            sentiment_stock = excluded.sentiment_stock,
            sentiment_social = excluded.sentiment_social,
            sentiment_overall = excluded.sentiment_overall,
            sentiment_observation_count = excluded.sentiment_observation_count,
            data_completeness_pct = excluded.data_completeness_pct,
            has_price = excluded.has_price,
            has_technical = excluded.has_technical,
            has_macro = excluded.has_macro,
            has_onchain = excluded.has_onchain,
            has_sentiment = excluded.has_sentiment,
            symbol_mapped = excluded.symbol_mapped",
        params![
            record.canonical_symbol,
            record.timestamp,
            record.created_at,
            record.updated_at,
            record.current_price,
            record.volume_24h,
            record.market_cap,
            record.percent_change_1h,
            record.percent_change_24h,
            record.percent_change_7d,
            record.open,
            record.high,
            record.low,
            record.close,
            record.ohlc_volume,
            record.price_source,
            record.sma_20,
            record.sma_50,
            record.ema_12,
            record.ema_26,
            record.rsi_14,
            record.macd,
            record.macd_signal,
            record.bollinger_upper,
            record.bollinger_lower,
            record.fed_funds_rate,
            record.treasury_10y,
            record.dxy_index,
            record.cpi_yoy,
            record.unemployment_rate,
            record.sp500_close,
            record.vix,
            record.active_addresses,
            record.transaction_count,
            record.exchange_inflow,
            record.exchange_outflow,
            record.whale_tx_count,
            record.nvt_ratio,
            record.sentiment_crypto,
            record.sentiment_stock,
            record.sentiment_social,
            record.sentiment_overall,
            record.sentiment_observation_count,
            record.data_completeness_pct,
            record.has_price,
            record.has_technical,
            record.has_macro,
            record.has_onchain,
            record.has_sentiment,
            record.symbol_mapped,
        ],
    )?;
    Ok(())
}

/// One read-merge-write attempt inside an immediate transaction.
fn attempt_write(
    conn: &mut Connection,
    record: &MaterializedFeatureRecord,
    mode: WriteMode,
) -> Result<WriteOutcome, rusqlite::Error> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let existing = tx
        .query_row(
            &format!(
                "SELECT {} FROM materialized_features
                 WHERE canonical_symbol = ?1 AND timestamp = ?2",
                SELECT_COLUMNS
            ),
            params![record.canonical_symbol, record.timestamp],
            row_to_record,
        )
        .optional()?;

    let outcome = match existing {
        None => {
            let mut fresh = record.clone();
            completeness::apply(&mut fresh);
            upsert_record(&tx, &fresh)?;
            WriteOutcome::Inserted
        }
        Some(_) if mode == WriteMode::InsertOnly => WriteOutcome::Skipped,
        Some(existing) => {
            let mut merged = existing.clone();
            merged.merge_from(record);
            completeness::apply(&mut merged);

            // Audit-insensitive comparison: only touch the row when a
            // measurement actually changed.
            let mut comparable = merged.clone();
            comparable.updated_at = existing.updated_at;
            if comparable == existing {
                WriteOutcome::Unchanged
            } else {
                upsert_record(&tx, &merged)?;
                WriteOutcome::Updated
            }
        }
    };

    tx.commit()?;
    Ok(outcome)
}

impl SqliteFeatureWriter {
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self, EngineError> {
        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| EngineError::Connectivity(e.to_string()))?;
            }
        }

        let conn = Connection::open(db_path).map_err(|e| EngineError::Connectivity(e.to_string()))?;
        apply_optimized_pragmas(&conn).map_err(|e| EngineError::Connectivity(e.to_string()))?;
        init_schema(&conn)?;

        log::info!("✅ Feature store initialized with WAL mode");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            retry_initial_ms: 100,
            retry_max_ms: 2_000,
            retry_max: 3,
        })
    }

    pub fn from_config(config: &EngineConfig) -> Result<Self, EngineError> {
        let mut writer = Self::new(&config.db_path)?;
        writer.retry_initial_ms = config.write_retry_initial_ms;
        writer.retry_max_ms = config.write_retry_max_ms;
        writer.retry_max = config.write_retry_max;
        Ok(writer)
    }

    /// Read one materialized row back. Used by tests and diagnostics.
    pub fn read(
        &self,
        canonical_symbol: &str,
        timestamp: i64,
    ) -> Result<Option<MaterializedFeatureRecord>, EngineError> {
        let conn = self.conn.lock().unwrap();
        let record = conn
            .query_row(
                &format!(
                    "SELECT {} FROM materialized_features
                     WHERE canonical_symbol = ?1 AND timestamp = ?2",
                    SELECT_COLUMNS
                ),
                params![canonical_symbol, timestamp],
                row_to_record,
            )
            .optional()
            .map_err(|e| EngineError::Connectivity(e.to_string()))?;
        Ok(record)
    }
}

#[async_trait]
impl FeatureWriter for SqliteFeatureWriter {
    async fn write(
        &self,
        record: &MaterializedFeatureRecord,
        mode: WriteMode,
    ) -> Result<WriteOutcome, EngineError> {
        let mut backoff =
            ExponentialBackoff::new(self.retry_initial_ms, self.retry_max_ms, self.retry_max);

        loop {
            let attempt = {
                let mut conn = self.conn.lock().unwrap();
                attempt_write(&mut conn, record, mode)
            };

            match attempt {
                Ok(outcome) => return Ok(outcome),
                Err(e) if EngineError::is_retryable_write(&e) => {
                    if backoff.sleep().await.is_err() {
                        return Err(EngineError::WriteConflict(format!(
                            "{} @ {}: {}",
                            record.canonical_symbol, record.timestamp, e
                        )));
                    }
                }
                Err(e) => return Err(EngineError::Connectivity(e.to_string())),
            }
        }
    }
}
