//! Symbol canonicalization and collation handling
//!
//! The source tables disagree on symbol casing and collation (a recurring
//! bug class in ad-hoc queries). All cross-table joins go through the
//! canonical key produced here; no reader re-solves case matching on its own.

use crate::error::EngineError;
use rusqlite::Connection;
use std::collections::HashMap;

/// Result of canonicalizing a raw symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Canonical {
    pub symbol: String,
    /// False when the mapping table had no entry and the symbol passed
    /// through on the identity fallback. Not an error; surfaced in the
    /// materialized row's quality metadata.
    pub mapped: bool,
}

/// Upper-cased, trimmed comparison form used by every cross-table join
/// predicate (paired with `UPPER(TRIM(symbol)) = ?` on the SQL side).
pub fn lookup_key(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Legacy-to-canonical symbol mapping, loaded once per run.
///
/// Read-only after load, so it is shared across workers behind an `Arc`
/// without locking. The mapping table is mutated only by an explicit
/// migration step, never by this engine.
pub struct SymbolNormalizer {
    mapping: HashMap<String, String>,
}

impl SymbolNormalizer {
    /// Build the mapping from the `symbol_mapping` table.
    ///
    /// A missing table degrades to the identity mapping: the collectors own
    /// that table and it may not exist yet on a fresh deployment.
    pub fn load(conn: &Connection) -> Result<Self, EngineError> {
        let mut mapping = HashMap::new();

        let mut stmt = match conn.prepare("SELECT legacy_symbol, canonical_symbol FROM symbol_mapping")
        {
            Ok(stmt) => stmt,
            Err(e) if e.to_string().contains("no such table") => {
                log::warn!("⚠️  symbol_mapping table not found, using identity mapping");
                return Ok(Self { mapping });
            }
            Err(e) => return Err(EngineError::Connectivity(e.to_string())),
        };

        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        for row in rows {
            let (legacy, canonical) = row?;
            mapping.insert(lookup_key(&legacy), lookup_key(&canonical));
        }

        log::info!("🔤 Symbol normalizer loaded {} mappings", mapping.len());
        Ok(Self { mapping })
    }

    #[cfg(test)]
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        let mapping = pairs
            .iter()
            .map(|(l, c)| (lookup_key(l), lookup_key(c)))
            .collect();
        Self { mapping }
    }

    /// Resolve a raw source-table symbol to its canonical form.
    ///
    /// Unmapped symbols are not an error: they pass through in normalized
    /// form with `mapped = false`.
    pub fn canonicalize(&self, raw_symbol: &str) -> Canonical {
        let key = lookup_key(raw_symbol);
        match self.mapping.get(&key) {
            Some(canonical) => Canonical {
                symbol: canonical.clone(),
                mapped: true,
            },
            None => Canonical {
                symbol: key,
                mapped: false,
            },
        }
    }

    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }
}
