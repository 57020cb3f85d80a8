//! Per-domain source readers
//!
//! One reader per collector-owned table. Every reader is read-only and
//! side-effect free, encodes its domain's freshness policy as a window size,
//! and treats "no record inside the window" as `Ok(None)` rather than an
//! error. Symbol predicates always compare on the normalized form
//! (`UPPER(TRIM(symbol)) = ?`) against the canonical key; see `normalizer`.

pub mod macro_econ;
pub mod onchain;
pub mod price;
pub mod sentiment;
pub mod technical;

use crate::error::EngineError;
use crate::sqlite_pragma::apply_optimized_pragmas;
use rusqlite::{Connection, OpenFlags};
use std::path::Path;

/// Open a read-only connection for source reads.
///
/// `query_only` is belt-and-braces on top of the read-only open flag; with
/// WAL on the shared database file these connections never block the writer.
pub fn open_source_connection(db_path: impl AsRef<Path>) -> Result<Connection, EngineError> {
    let conn = Connection::open_with_flags(
        db_path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|e| EngineError::Connectivity(e.to_string()))?;

    apply_optimized_pragmas(&conn).map_err(|e| EngineError::Connectivity(e.to_string()))?;
    conn.execute_batch("PRAGMA query_only = ON")
        .map_err(|e| EngineError::Connectivity(e.to_string()))?;

    Ok(conn)
}
