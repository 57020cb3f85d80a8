//! featflow: point-in-time feature materialization for market data
//!
//! Joins independently-collected source streams (price/OHLC, technical
//! indicators, macro prints, on-chain metrics, sentiment) into one wide
//! row per (canonical_symbol, timestamp), with as-of alignment, decay
//! weighted sentiment, completeness scoring, and idempotent merge writes.

pub mod align;
pub mod backoff;
pub mod completeness;
pub mod config;
pub mod decay;
pub mod engine;
pub mod error;
pub mod export;
pub mod normalizer;
pub mod orchestrator;
pub mod records;
pub mod sources;
pub mod sqlite_pragma;
pub mod writer;

pub use config::EngineConfig;
pub use engine::{MaterializeContext, WorkUnit};
pub use error::EngineError;
pub use records::MaterializedFeatureRecord;
pub use writer::{FeatureWriter, SqliteFeatureWriter, WriteMode, WriteOutcome};
