//! Core data model: per-domain source records and the wide materialized row

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The five independently collected source domains joined by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Domain {
    Price,
    Technical,
    Macro,
    Onchain,
    Sentiment,
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Price => "price",
            Domain::Technical => "technical",
            Domain::Macro => "macro",
            Domain::Onchain => "onchain",
            Domain::Sentiment => "sentiment",
        }
    }

    pub fn all() -> [Domain; 5] {
        [
            Domain::Price,
            Domain::Technical,
            Domain::Macro,
            Domain::Onchain,
            Domain::Sentiment,
        ]
    }
}

/// Spot/OHLC snapshot from `price_data`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceRecord {
    pub timestamp: i64,
    pub current_price: Option<f64>,
    pub volume_24h: Option<f64>,
    pub market_cap: Option<f64>,
    pub percent_change_1h: Option<f64>,
    pub percent_change_24h: Option<f64>,
    pub percent_change_7d: Option<f64>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<f64>,
    pub source: Option<String>,
}

/// Indicator snapshot from `technical_indicators`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TechnicalRecord {
    pub timestamp: i64,
    pub sma_20: Option<f64>,
    pub sma_50: Option<f64>,
    pub ema_12: Option<f64>,
    pub ema_26: Option<f64>,
    pub rsi_14: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub bollinger_upper: Option<f64>,
    pub bollinger_lower: Option<f64>,
}

/// One forward-filled macro indicator print.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MacroPoint {
    pub value: f64,
    pub timestamp: i64,
}

/// The fixed set of named macro indicators materialized into the wide row.
pub const MACRO_INDICATORS: [&str; 7] = [
    "fed_funds_rate",
    "treasury_10y",
    "dxy_index",
    "cpi_yoy",
    "unemployment_rate",
    "sp500_close",
    "vix",
];

/// Per-indicator forward-fill results; each indicator carries its own print
/// timestamp because their cadences are independent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MacroSnapshot {
    pub values: HashMap<String, MacroPoint>,
}

impl MacroSnapshot {
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, indicator: &str) -> Option<f64> {
        self.values.get(indicator).map(|p| p.value)
    }
}

/// Daily network snapshot from `onchain_metrics`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnchainRecord {
    pub timestamp: i64,
    pub active_addresses: Option<i64>,
    pub transaction_count: Option<i64>,
    pub exchange_inflow: Option<f64>,
    pub exchange_outflow: Option<f64>,
    pub whale_tx_count: Option<i64>,
    pub nvt_ratio: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Audience {
    #[serde(rename = "crypto")]
    Crypto,
    #[serde(rename = "stock")]
    Stock,
    #[serde(rename = "social")]
    Social,
}

impl Audience {
    pub fn as_str(&self) -> &'static str {
        match self {
            Audience::Crypto => "crypto",
            Audience::Stock => "stock",
            Audience::Social => "social",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "crypto" => Some(Audience::Crypto),
            "stock" => Some(Audience::Stock),
            "social" => Some(Audience::Social),
            _ => None,
        }
    }

    pub fn all() -> [Audience; 3] {
        [Audience::Crypto, Audience::Stock, Audience::Social]
    }
}

/// One raw sentiment reading from `sentiment_observations`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentObservation {
    pub timestamp: i64,
    pub audience: Audience,
    pub score: f64,
}

/// One row of the wide `materialized_features` table, keyed by
/// (canonical_symbol, timestamp). Every measurement field is independently
/// nullable; a null means "no source record inside the domain's window",
/// which downstream must keep distinguishable from zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterializedFeatureRecord {
    // Identity / audit
    pub canonical_symbol: String,
    pub timestamp: i64,
    pub created_at: i64,
    pub updated_at: i64,

    // Price / OHLC
    pub current_price: Option<f64>,
    pub volume_24h: Option<f64>,
    pub market_cap: Option<f64>,
    pub percent_change_1h: Option<f64>,
    pub percent_change_24h: Option<f64>,
    pub percent_change_7d: Option<f64>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub ohlc_volume: Option<f64>,
    pub price_source: Option<String>,

    // Technical
    pub sma_20: Option<f64>,
    pub sma_50: Option<f64>,
    pub ema_12: Option<f64>,
    pub ema_26: Option<f64>,
    pub rsi_14: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub bollinger_upper: Option<f64>,
    pub bollinger_lower: Option<f64>,

    // Macro
    pub fed_funds_rate: Option<f64>,
    pub treasury_10y: Option<f64>,
    pub dxy_index: Option<f64>,
    pub cpi_yoy: Option<f64>,
    pub unemployment_rate: Option<f64>,
    pub sp500_close: Option<f64>,
    pub vix: Option<f64>,

    // On-chain
    pub active_addresses: Option<i64>,
    pub transaction_count: Option<i64>,
    pub exchange_inflow: Option<f64>,
    pub exchange_outflow: Option<f64>,
    pub whale_tx_count: Option<i64>,
    pub nvt_ratio: Option<f64>,

    // Sentiment
    pub sentiment_crypto: Option<f64>,
    pub sentiment_stock: Option<f64>,
    pub sentiment_social: Option<f64>,
    pub sentiment_overall: Option<f64>,
    pub sentiment_observation_count: i64,

    // Quality. Completeness and the per-domain flags are derived from the
    // row's current state at write time, never carried over from a previous
    // write.
    pub data_completeness_pct: f64,
    pub has_price: bool,
    pub has_technical: bool,
    pub has_macro: bool,
    pub has_onchain: bool,
    pub has_sentiment: bool,
    pub symbol_mapped: bool,
}

impl MaterializedFeatureRecord {
    pub fn new(canonical_symbol: &str, timestamp: i64, now: i64) -> Self {
        Self {
            canonical_symbol: canonical_symbol.to_string(),
            timestamp,
            created_at: now,
            updated_at: now,
            current_price: None,
            volume_24h: None,
            market_cap: None,
            percent_change_1h: None,
            percent_change_24h: None,
            percent_change_7d: None,
            open: None,
            high: None,
            low: None,
            close: None,
            ohlc_volume: None,
            price_source: None,
            sma_20: None,
            sma_50: None,
            ema_12: None,
            ema_26: None,
            rsi_14: None,
            macd: None,
            macd_signal: None,
            bollinger_upper: None,
            bollinger_lower: None,
            fed_funds_rate: None,
            treasury_10y: None,
            dxy_index: None,
            cpi_yoy: None,
            unemployment_rate: None,
            sp500_close: None,
            vix: None,
            active_addresses: None,
            transaction_count: None,
            exchange_inflow: None,
            exchange_outflow: None,
            whale_tx_count: None,
            nvt_ratio: None,
            sentiment_crypto: None,
            sentiment_stock: None,
            sentiment_social: None,
            sentiment_overall: None,
            sentiment_observation_count: 0,
            data_completeness_pct: 0.0,
            has_price: false,
            has_technical: false,
            has_macro: false,
            has_onchain: false,
            has_sentiment: false,
            symbol_mapped: true,
        }
    }

    /// (domain, populated) for every measurement field, in a fixed order.
    ///
    /// This is the single enumeration of the measurement set; the
    /// completeness scorer consumes it so the two can never disagree.
    /// Provenance (`price_source`) and the observation count are metadata,
    /// not measurements, and are excluded along with identity/audit fields.
    pub fn field_presence(&self) -> Vec<(Domain, bool)> {
        let mut fields = Vec::with_capacity(38);

        for v in [
            self.current_price,
            self.volume_24h,
            self.market_cap,
            self.percent_change_1h,
            self.percent_change_24h,
            self.percent_change_7d,
            self.open,
            self.high,
            self.low,
            self.close,
            self.ohlc_volume,
        ] {
            fields.push((Domain::Price, v.is_some()));
        }

        for v in [
            self.sma_20,
            self.sma_50,
            self.ema_12,
            self.ema_26,
            self.rsi_14,
            self.macd,
            self.macd_signal,
            self.bollinger_upper,
            self.bollinger_lower,
        ] {
            fields.push((Domain::Technical, v.is_some()));
        }

        for v in [
            self.fed_funds_rate,
            self.treasury_10y,
            self.dxy_index,
            self.cpi_yoy,
            self.unemployment_rate,
            self.sp500_close,
            self.vix,
        ] {
            fields.push((Domain::Macro, v.is_some()));
        }

        fields.push((Domain::Onchain, self.active_addresses.is_some()));
        fields.push((Domain::Onchain, self.transaction_count.is_some()));
        fields.push((Domain::Onchain, self.exchange_inflow.is_some()));
        fields.push((Domain::Onchain, self.exchange_outflow.is_some()));
        fields.push((Domain::Onchain, self.whale_tx_count.is_some()));
        fields.push((Domain::Onchain, self.nvt_ratio.is_some()));

        for v in [
            self.sentiment_crypto,
            self.sentiment_stock,
            self.sentiment_social,
            self.sentiment_overall,
        ] {
            fields.push((Domain::Sentiment, v.is_some()));
        }

        fields
    }

    /// Merge an incoming record into this (existing) one: incoming non-null
    /// values win, existing values are never nulled out.
    pub fn merge_from(&mut self, incoming: &MaterializedFeatureRecord) {
        macro_rules! take_some {
            ($($field:ident),* $(,)?) => {
                $(
                    if incoming.$field.is_some() {
                        self.$field = incoming.$field;
                    }
                )*
            };
        }

        take_some!(
            current_price,
            volume_24h,
            market_cap,
            percent_change_1h,
            percent_change_24h,
            percent_change_7d,
            open,
            high,
            low,
            close,
            ohlc_volume,
            sma_20,
            sma_50,
            ema_12,
            ema_26,
            rsi_14,
            macd,
            macd_signal,
            bollinger_upper,
            bollinger_lower,
            fed_funds_rate,
            treasury_10y,
            dxy_index,
            cpi_yoy,
            unemployment_rate,
            sp500_close,
            vix,
            active_addresses,
            transaction_count,
            exchange_inflow,
            exchange_outflow,
            whale_tx_count,
            nvt_ratio,
        );

        if incoming.price_source.is_some() {
            self.price_source = incoming.price_source.clone();
        }

        // Sentiment score and count move together: a record with no sentiment
        // window must not reset a previously stored count to zero.
        let incoming_has_sentiment = incoming.sentiment_crypto.is_some()
            || incoming.sentiment_stock.is_some()
            || incoming.sentiment_social.is_some();
        if incoming_has_sentiment {
            if incoming.sentiment_crypto.is_some() {
                self.sentiment_crypto = incoming.sentiment_crypto;
            }
            if incoming.sentiment_stock.is_some() {
                self.sentiment_stock = incoming.sentiment_stock;
            }
            if incoming.sentiment_social.is_some() {
                self.sentiment_social = incoming.sentiment_social;
            }
            if incoming.sentiment_overall.is_some() {
                self.sentiment_overall = incoming.sentiment_overall;
            }
            self.sentiment_observation_count = incoming.sentiment_observation_count;
        }

        self.symbol_mapped = self.symbol_mapped && incoming.symbol_mapped;
        self.updated_at = incoming.updated_at;
    }
}
