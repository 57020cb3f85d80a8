//! Error taxonomy for the materialization engine
//!
//! A join miss (no source record inside a domain's window) is NOT an error
//! and never appears here; readers return `Ok(None)` for it.

use crate::records::Domain;

#[derive(Debug)]
pub enum EngineError {
    /// Source or destination store unreachable, or a query failed outright.
    Connectivity(String),
    /// Upsert lost a lock race and exhausted its bounded retries.
    WriteConflict(String),
    /// An expected source column/table is missing for one domain.
    SchemaDrift { domain: Domain, detail: String },
    /// A single domain read exceeded its per-read deadline.
    Timeout { domain: Domain },
    /// Startup-time configuration problem.
    Config(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Connectivity(msg) => write!(f, "connectivity failure: {}", msg),
            EngineError::WriteConflict(msg) => write!(f, "write conflict: {}", msg),
            EngineError::SchemaDrift { domain, detail } => {
                write!(f, "schema drift in {} source: {}", domain.as_str(), detail)
            }
            EngineError::Timeout { domain } => {
                write!(f, "read timeout in {} source", domain.as_str())
            }
            EngineError::Config(msg) => write!(f, "invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for EngineError {}

impl EngineError {
    /// Classify a rusqlite error raised while reading one domain's table.
    ///
    /// Missing tables and columns mean the collector contract drifted; that
    /// domain fails alone. Everything else is a connectivity problem.
    pub fn from_read_error(domain: Domain, err: rusqlite::Error) -> Self {
        let msg = err.to_string();
        if msg.contains("no such column") || msg.contains("no such table") {
            EngineError::SchemaDrift {
                domain,
                detail: msg,
            }
        } else {
            EngineError::Connectivity(msg)
        }
    }

    /// True for SQLITE_BUSY / SQLITE_LOCKED style contention worth retrying.
    pub fn is_retryable_write(err: &rusqlite::Error) -> bool {
        matches!(
            err,
            rusqlite::Error::SqliteFailure(e, _)
                if e.code == rusqlite::ErrorCode::DatabaseBusy
                    || e.code == rusqlite::ErrorCode::DatabaseLocked
        )
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(err: rusqlite::Error) -> Self {
        EngineError::Connectivity(err.to_string())
    }
}
