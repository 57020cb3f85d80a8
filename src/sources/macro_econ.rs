//! Macro indicator reader: explicit forward-fill per named indicator
//!
//! The macro table is long-format (one row per indicator print) and each
//! indicator updates on its own cadence, daily to monthly. Forward-fill is
//! an explicit as_of-parameterized query per indicator, never an implicit
//! global "current value" lookup.

use crate::error::EngineError;
use crate::records::{Domain, MacroPoint, MacroSnapshot, MACRO_INDICATORS};
use rusqlite::{params, Connection, OptionalExtension};

/// Latest print ≤ as_of within the window, independently for each of the
/// named indicators. Indicators with no print in the window are simply
/// absent from the snapshot.
pub fn fetch(
    conn: &Connection,
    as_of: i64,
    window_secs: i64,
) -> Result<MacroSnapshot, EngineError> {
    let mut snapshot = MacroSnapshot::default();

    let mut stmt = conn
        .prepare(
            "SELECT value, timestamp
             FROM macro_indicators
             WHERE indicator = ?1
               AND timestamp <= ?2
               AND timestamp > ?3
             ORDER BY timestamp DESC
             LIMIT 1",
        )
        .map_err(|e| EngineError::from_read_error(Domain::Macro, e))?;

    for indicator in MACRO_INDICATORS {
        let point = stmt
            .query_row(params![indicator, as_of, as_of - window_secs], |row| {
                Ok(MacroPoint {
                    value: row.get(0)?,
                    timestamp: row.get(1)?,
                })
            })
            .optional()
            .map_err(|e| EngineError::from_read_error(Domain::Macro, e))?;

        if let Some(point) = point {
            snapshot.values.insert(indicator.to_string(), point);
        }
    }

    Ok(snapshot)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn create_macro_table(conn: &Connection) {
        conn.execute(
            "CREATE TABLE macro_indicators (
                indicator TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                value REAL NOT NULL
            )",
            [],
        )
        .unwrap();
    }

    pub(crate) fn insert_macro(conn: &Connection, indicator: &str, timestamp: i64, value: f64) {
        conn.execute(
            "INSERT INTO macro_indicators (indicator, timestamp, value) VALUES (?1, ?2, ?3)",
            params![indicator, timestamp, value],
        )
        .unwrap();
    }

    const DAY: i64 = 86_400;

    #[test]
    fn test_forward_fill_uses_earlier_print_not_later() {
        let conn = Connection::open_in_memory().unwrap();
        create_macro_table(&conn);

        // Prints at D1 and D3, target at D2 between them
        insert_macro(&conn, "fed_funds_rate", 1 * DAY, 5.25);
        insert_macro(&conn, "fed_funds_rate", 3 * DAY, 5.50);

        let snapshot = fetch(&conn, 2 * DAY, 14 * DAY).unwrap();
        let point = snapshot.values.get("fed_funds_rate").unwrap();
        assert_eq!(point.value, 5.25);
        assert_eq!(point.timestamp, 1 * DAY);
    }

    #[test]
    fn test_indicators_fill_independently() {
        let conn = Connection::open_in_memory().unwrap();
        create_macro_table(&conn);

        insert_macro(&conn, "fed_funds_rate", 1 * DAY, 5.25);
        insert_macro(&conn, "vix", 9 * DAY, 18.4);
        insert_macro(&conn, "cpi_yoy", 5 * DAY, 3.2);

        let snapshot = fetch(&conn, 10 * DAY, 14 * DAY).unwrap();
        assert_eq!(snapshot.get("fed_funds_rate"), Some(5.25));
        assert_eq!(snapshot.get("vix"), Some(18.4));
        assert_eq!(snapshot.get("cpi_yoy"), Some(3.2));
        assert_eq!(snapshot.get("dxy_index"), None);
    }

    #[test]
    fn test_prints_older_than_window_excluded() {
        let conn = Connection::open_in_memory().unwrap();
        create_macro_table(&conn);

        insert_macro(&conn, "unemployment_rate", 1 * DAY, 3.9);

        let snapshot = fetch(&conn, 30 * DAY, 14 * DAY).unwrap();
        assert!(snapshot.is_empty());
    }

    #[test]
    fn test_missing_table_is_schema_drift() {
        let conn = Connection::open_in_memory().unwrap();
        match fetch(&conn, DAY, 14 * DAY) {
            Err(EngineError::SchemaDrift { domain, .. }) => assert_eq!(domain, Domain::Macro),
            other => panic!("expected SchemaDrift, got {:?}", other.map(|_| ())),
        }
    }
}
