//! Price/OHLC reader: nearest record at or before the target, never stale
//!
//! Price collection is sub-hourly, so the window is short. "Nearest ≤ as_of"
//! rather than forward-fill: a price older than the window is worse than no
//! price at all for ML consumption.

use crate::error::EngineError;
use crate::records::{Domain, PriceRecord};
use rusqlite::{params, Connection, OptionalExtension};

pub fn fetch(
    conn: &Connection,
    canonical_symbol: &str,
    as_of: i64,
    window_secs: i64,
) -> Result<Option<PriceRecord>, EngineError> {
    let result = conn
        .query_row(
            "SELECT timestamp, current_price, volume_24h, market_cap,
                    percent_change_1h, percent_change_24h, percent_change_7d,
                    open, high, low, close, volume, source
             FROM price_data
             WHERE UPPER(TRIM(symbol)) = ?1
               AND timestamp <= ?2
               AND timestamp > ?3
             ORDER BY timestamp DESC
             LIMIT 1",
            params![canonical_symbol, as_of, as_of - window_secs],
            |row| {
                Ok(PriceRecord {
                    timestamp: row.get(0)?,
                    current_price: row.get(1)?,
                    volume_24h: row.get(2)?,
                    market_cap: row.get(3)?,
                    percent_change_1h: row.get(4)?,
                    percent_change_24h: row.get(5)?,
                    percent_change_7d: row.get(6)?,
                    open: row.get(7)?,
                    high: row.get(8)?,
                    low: row.get(9)?,
                    close: row.get(10)?,
                    volume: row.get(11)?,
                    source: row.get(12)?,
                })
            },
        )
        .optional()
        .map_err(|e| EngineError::from_read_error(Domain::Price, e))?;

    Ok(result)
}

/// One new price row picked up by the tail query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceEvent {
    pub symbol: String,
    pub timestamp: i64,
    pub rowid: i64,
}

/// Price rows strictly after the (timestamp, rowid) cursor, oldest first.
///
/// Drives the real-time tail: every new price row becomes one
/// (symbol, timestamp) materialization unit. The rowid tie-break makes the
/// ordering total, so a batch boundary falling inside a shared timestamp
/// resumes at the exact row where the previous batch stopped instead of
/// skipping the rest of that timestamp.
pub fn newer_than(
    conn: &Connection,
    cursor_ts: i64,
    cursor_rowid: i64,
    limit: i64,
) -> Result<Vec<PriceEvent>, EngineError> {
    let mut stmt = conn
        .prepare(
            "SELECT symbol, timestamp, rowid FROM price_data
             WHERE timestamp > ?1 OR (timestamp = ?1 AND rowid > ?2)
             ORDER BY timestamp ASC, rowid ASC
             LIMIT ?3",
        )
        .map_err(|e| EngineError::from_read_error(Domain::Price, e))?;

    let rows = stmt
        .query_map(params![cursor_ts, cursor_rowid, limit], |row| {
            Ok(PriceEvent {
                symbol: row.get(0)?,
                timestamp: row.get(1)?,
                rowid: row.get(2)?,
            })
        })
        .map_err(|e| EngineError::from_read_error(Domain::Price, e))?;

    let mut events = Vec::new();
    for row in rows {
        events.push(row.map_err(|e| EngineError::from_read_error(Domain::Price, e))?);
    }
    Ok(events)
}

/// Tail start position: the highest (timestamp, rowid) on record, if any.
/// Realtime runs start tailing from here so historical rows stay with the
/// backfill path.
pub fn tail_position(conn: &Connection) -> Result<Option<(i64, i64)>, EngineError> {
    let (ts, rowid) = conn
        .query_row(
            "SELECT MAX(timestamp), MAX(rowid) FROM price_data",
            [],
            |row| {
                Ok((
                    row.get::<_, Option<i64>>(0)?,
                    row.get::<_, Option<i64>>(1)?,
                ))
            },
        )
        .map_err(|e| EngineError::from_read_error(Domain::Price, e))?;

    Ok(match (ts, rowid) {
        (Some(ts), Some(rowid)) => Some((ts, rowid)),
        _ => None,
    })
}

/// Latest price timestamp for a symbol within [start, end).
pub fn latest_in_range(
    conn: &Connection,
    canonical_symbol: &str,
    start: i64,
    end: i64,
) -> Result<Option<i64>, EngineError> {
    conn.query_row(
        "SELECT MAX(timestamp) FROM price_data
         WHERE UPPER(TRIM(symbol)) = ?1
           AND timestamp >= ?2
           AND timestamp < ?3",
        params![canonical_symbol, start, end],
        |row| row.get::<_, Option<i64>>(0),
    )
    .map_err(|e| EngineError::from_read_error(Domain::Price, e))
}
