//! Sentiment reader: the whole trailing window, not just the nearest row
//!
//! Unlike the other domains this returns every observation inside the
//! window, because the decay aggregator needs the full set to weight by
//! recency. Rows with an unknown audience label are skipped, not fatal.

use crate::error::EngineError;
use crate::records::{Audience, Domain, SentimentObservation};
use rusqlite::{params, Connection};

pub fn fetch(
    conn: &Connection,
    canonical_symbol: &str,
    as_of: i64,
    window_secs: i64,
) -> Result<Vec<SentimentObservation>, EngineError> {
    let mut stmt = conn
        .prepare(
            "SELECT timestamp, audience, score
             FROM sentiment_observations
             WHERE UPPER(TRIM(symbol)) = ?1
               AND timestamp <= ?2
               AND timestamp > ?3
             ORDER BY timestamp ASC",
        )
        .map_err(|e| EngineError::from_read_error(Domain::Sentiment, e))?;

    let rows = stmt
        .query_map(
            params![canonical_symbol, as_of, as_of - window_secs],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, f64>(2)?,
                ))
            },
        )
        .map_err(|e| EngineError::from_read_error(Domain::Sentiment, e))?;

    let mut observations = Vec::new();
    for row in rows {
        let (timestamp, audience_str, score) =
            row.map_err(|e| EngineError::from_read_error(Domain::Sentiment, e))?;
        match Audience::from_str(&audience_str) {
            Some(audience) => observations.push(SentimentObservation {
                timestamp,
                audience,
                score,
            }),
            None => {
                log::debug!("⚠️  Skipping sentiment row with unknown audience '{}'", audience_str);
            }
        }
    }

    Ok(observations)
}
