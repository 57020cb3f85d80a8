//! On-chain metrics reader: latest daily snapshot at or before the target

use crate::error::EngineError;
use crate::records::{Domain, OnchainRecord};
use rusqlite::{params, Connection, OptionalExtension};

pub fn fetch(
    conn: &Connection,
    canonical_symbol: &str,
    as_of: i64,
    window_secs: i64,
) -> Result<Option<OnchainRecord>, EngineError> {
    let result = conn
        .query_row(
            "SELECT timestamp, active_addresses, transaction_count,
                    exchange_inflow, exchange_outflow, whale_tx_count, nvt_ratio
             FROM onchain_metrics
             WHERE UPPER(TRIM(symbol)) = ?1
               AND timestamp <= ?2
               AND timestamp > ?3
             ORDER BY timestamp DESC
             LIMIT 1",
            params![canonical_symbol, as_of, as_of - window_secs],
            |row| {
                Ok(OnchainRecord {
                    timestamp: row.get(0)?,
                    active_addresses: row.get(1)?,
                    transaction_count: row.get(2)?,
                    exchange_inflow: row.get(3)?,
                    exchange_outflow: row.get(4)?,
                    whale_tx_count: row.get(5)?,
                    nvt_ratio: row.get(6)?,
                })
            },
        )
        .optional()
        .map_err(|e| EngineError::from_read_error(Domain::Onchain, e))?;

    Ok(result)
}
