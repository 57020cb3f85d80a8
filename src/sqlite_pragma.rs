//! Shared SQLite PRAGMA tuning applied to every connection the engine opens

use rusqlite::Connection;

/// Apply the optimized PRAGMA set (WAL, NORMAL, MEMORY, mmap, cache,
/// autocheckpoint).
///
/// WAL is what lets read-only source connections coexist with the single
/// feature writer without blocking each other.
pub fn apply_optimized_pragmas(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    conn.pragma_update(None, "mmap_size", 268_435_456i64)?;
    conn.pragma_update(None, "cache_size", -64_000i64)?;
    conn.pragma_update(None, "wal_autocheckpoint", 1000i64)?;
    Ok(())
}
