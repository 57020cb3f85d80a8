//! Engine configuration from environment variables

use std::env;

#[derive(Debug)]
pub enum ConfigError {
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidValue(msg) => write!(f, "Invalid configuration value: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Discrete decay-weight bands for sentiment aggregation, ordered by age.
///
/// Band boundaries are deliberately configuration, not constants: the right
/// windows are an operational tuning question, not an architectural one.
#[derive(Debug, Clone, PartialEq)]
pub struct DecayBands {
    /// (max_age_secs, weight) pairs sorted ascending by age. Observations
    /// older than the last band are excluded entirely.
    pub bands: Vec<(i64, f64)>,
}

impl DecayBands {
    /// Parse "3600:1.0,21600:0.6,86400:0.3" style band specs.
    pub fn parse(spec: &str) -> Result<Self, ConfigError> {
        let mut bands = Vec::new();
        for part in spec.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let (age, weight) = part.split_once(':').ok_or_else(|| {
                ConfigError::InvalidValue(format!("decay band '{}' is not AGE:WEIGHT", part))
            })?;
            let age: i64 = age.trim().parse().map_err(|_| {
                ConfigError::InvalidValue(format!("decay band age '{}' is not an integer", age))
            })?;
            let weight: f64 = weight.trim().parse().map_err(|_| {
                ConfigError::InvalidValue(format!("decay band weight '{}' is not a number", weight))
            })?;
            if age <= 0 || weight <= 0.0 {
                return Err(ConfigError::InvalidValue(format!(
                    "decay band '{}' must have positive age and weight",
                    part
                )));
            }
            bands.push((age, weight));
        }
        if bands.is_empty() {
            return Err(ConfigError::InvalidValue(
                "decay band spec contains no bands".to_string(),
            ));
        }
        bands.sort_by_key(|(age, _)| *age);
        Ok(Self { bands })
    }

    /// Most recent hour weighted highest, 6h band next, 24h band lowest.
    pub fn default_bands() -> Self {
        Self {
            bands: vec![(3_600, 1.0), (21_600, 0.6), (86_400, 0.3)],
        }
    }

    /// Weight for an observation of the given age, or None if excluded.
    pub fn weight_for_age(&self, age_secs: i64) -> Option<f64> {
        if age_secs < 0 {
            return None; // future observation, look-ahead guard
        }
        self.bands
            .iter()
            .find(|(max_age, _)| age_secs <= *max_age)
            .map(|(_, weight)| *weight)
    }

    /// Trailing window length implied by the last band.
    pub fn window_secs(&self) -> i64 {
        self.bands.last().map(|(age, _)| *age).unwrap_or(0)
    }
}

/// Runtime configuration for both run modes.
///
/// Environment variables (all optional):
/// - `FEATFLOW_DB_PATH` (default: data/featflow.db)
/// - `FEATFLOW_WORKERS` (default: 4)
/// - `FEATFLOW_POLL_INTERVAL_SECS` (default: 30)
/// - `FEATFLOW_PRICE_WINDOW_SECS` (default: 3600)
/// - `FEATFLOW_TECHNICAL_WINDOW_SECS` (default: 7200)
/// - `FEATFLOW_MACRO_WINDOW_DAYS` (default: 14)
/// - `FEATFLOW_ONCHAIN_WINDOW_DAYS` (default: 7)
/// - `FEATFLOW_DECAY_BANDS` (default: 3600:1.0,21600:0.6,86400:0.3)
/// - `FEATFLOW_READ_TIMEOUT_MS` (default: 2000)
/// - `FEATFLOW_WRITE_RETRY_MAX` (default: 3)
/// - `FEATFLOW_WRITE_RETRY_INITIAL_MS` (default: 100)
/// - `FEATFLOW_WRITE_RETRY_MAX_MS` (default: 2000)
/// - `FEATFLOW_EXPORT_PATH` (optional JSONL export tap, off when unset)
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub db_path: String,
    pub worker_count: usize,
    pub poll_interval_secs: u64,
    pub price_window_secs: i64,
    pub technical_window_secs: i64,
    pub macro_window_secs: i64,
    pub onchain_window_secs: i64,
    pub decay_bands: DecayBands,
    pub read_timeout_ms: u64,
    pub write_retry_max: u32,
    pub write_retry_initial_ms: u64,
    pub write_retry_max_ms: u64,
    pub export_path: Option<String>,
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let decay_bands = match env::var("FEATFLOW_DECAY_BANDS") {
            Ok(spec) => DecayBands::parse(&spec)?,
            Err(_) => DecayBands::default_bands(),
        };

        Ok(Self {
            db_path: env::var("FEATFLOW_DB_PATH")
                .unwrap_or_else(|_| "data/featflow.db".to_string()),
            worker_count: parse_env("FEATFLOW_WORKERS", 4),
            poll_interval_secs: parse_env("FEATFLOW_POLL_INTERVAL_SECS", 30),
            price_window_secs: parse_env("FEATFLOW_PRICE_WINDOW_SECS", 3_600),
            technical_window_secs: parse_env("FEATFLOW_TECHNICAL_WINDOW_SECS", 7_200),
            macro_window_secs: parse_env::<i64>("FEATFLOW_MACRO_WINDOW_DAYS", 14) * 86_400,
            onchain_window_secs: parse_env::<i64>("FEATFLOW_ONCHAIN_WINDOW_DAYS", 7) * 86_400,
            decay_bands,
            read_timeout_ms: parse_env("FEATFLOW_READ_TIMEOUT_MS", 2_000),
            write_retry_max: parse_env("FEATFLOW_WRITE_RETRY_MAX", 3),
            write_retry_initial_ms: parse_env("FEATFLOW_WRITE_RETRY_INITIAL_MS", 100),
            write_retry_max_ms: parse_env("FEATFLOW_WRITE_RETRY_MAX_MS", 2_000),
            export_path: env::var("FEATFLOW_EXPORT_PATH").ok(),
        })
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
