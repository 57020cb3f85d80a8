//! Technical indicator reader: nearest snapshot at or before the target
//!
//! Indicator snapshots land hourly, so the window is a little wider than the
//! price window but the join policy is the same.

use crate::error::EngineError;
use crate::records::{Domain, TechnicalRecord};
use rusqlite::{params, Connection, OptionalExtension};

pub fn fetch(
    conn: &Connection,
    canonical_symbol: &str,
    as_of: i64,
    window_secs: i64,
) -> Result<Option<TechnicalRecord>, EngineError> {
    let result = conn
        .query_row(
            "SELECT timestamp, sma_20, sma_50, ema_12, ema_26, rsi_14,
                    macd, macd_signal, bollinger_upper, bollinger_lower
             FROM technical_indicators
             WHERE UPPER(TRIM(symbol)) = ?1
               AND timestamp <= ?2
               AND timestamp > ?3
             ORDER BY timestamp DESC
             LIMIT 1",
            params![canonical_symbol, as_of, as_of - window_secs],
            |row| {
                Ok(TechnicalRecord {
                    timestamp: row.get(0)?,
                    sma_20: row.get(1)?,
                    sma_50: row.get(2)?,
                    ema_12: row.get(3)?,
                    ema_26: row.get(4)?,
                    rsi_14: row.get(5)?,
                    macd: row.get(6)?,
                    macd_signal: row.get(7)?,
                    bollinger_upper: row.get(8)?,
                    bollinger_lower: row.get(9)?,
                })
            },
        )
        .optional()
        .map_err(|e| EngineError::from_read_error(Domain::Technical, e))?;

    Ok(result)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn create_technical_table(conn: &Connection) {
        conn.execute(
            "CREATE TABLE technical_indicators (
                symbol TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                sma_20 REAL,
                sma_50 REAL,
                ema_12 REAL,
                ema_26 REAL,
                rsi_14 REAL,
                macd REAL,
                macd_signal REAL,
                bollinger_upper REAL,
                bollinger_lower REAL
            )",
            [],
        )
        .unwrap();
    }

    pub(crate) fn insert_technical(conn: &Connection, symbol: &str, timestamp: i64, rsi: f64) {
        conn.execute(
            "INSERT INTO technical_indicators (symbol, timestamp, sma_20, rsi_14)
             VALUES (?1, ?2, 100.0, ?3)",
            params![symbol, timestamp, rsi],
        )
        .unwrap();
    }

    #[test]
    fn test_most_recent_snapshot_wins() {
        let conn = Connection::open_in_memory().unwrap();
        create_technical_table(&conn);
        insert_technical(&conn, "ETH", 1_000, 40.0);
        insert_technical(&conn, "ETH", 1_700, 60.0);

        let rec = fetch(&conn, "ETH", 2_000, 7_200).unwrap().unwrap();
        assert_eq!(rec.timestamp, 1_700);
        assert_eq!(rec.rsi_14, Some(60.0));
    }

    #[test]
    fn test_empty_window_is_a_miss_not_an_error() {
        let conn = Connection::open_in_memory().unwrap();
        create_technical_table(&conn);

        assert!(fetch(&conn, "ETH", 2_000, 7_200).unwrap().is_none());
    }

    #[test]
    fn test_missing_column_is_schema_drift() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute(
            "CREATE TABLE technical_indicators (symbol TEXT, timestamp INTEGER)",
            [],
        )
        .unwrap();

        match fetch(&conn, "ETH", 2_000, 7_200) {
            Err(EngineError::SchemaDrift { domain, .. }) => {
                assert_eq!(domain, Domain::Technical)
            }
            other => panic!("expected SchemaDrift, got {:?}", other.map(|_| ())),
        }
    }
}
