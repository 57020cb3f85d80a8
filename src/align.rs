//! Temporal alignment: fold per-domain source records into one wide row
//!
//! Join policy per domain:
//! - price/technical: as-of nearest ≤ target within window (reader enforces)
//! - macro: forward-fill, latest ≤ target per named indicator
//! - onchain: latest daily snapshot ≤ target
//! - sentiment: windowed decay aggregate (delegated to `decay`)
//!
//! A domain with no record inside its window leaves all of its fields null.

use crate::completeness;
use crate::config::DecayBands;
use crate::decay;
use crate::records::{
    MacroSnapshot, MaterializedFeatureRecord, OnchainRecord, PriceRecord, SentimentObservation,
    TechnicalRecord,
};

/// Everything the readers produced for one (symbol, timestamp) unit.
#[derive(Debug, Clone, Default)]
pub struct DomainData {
    pub price: Option<PriceRecord>,
    pub technical: Option<TechnicalRecord>,
    pub macro_snapshot: MacroSnapshot,
    pub onchain: Option<OnchainRecord>,
    pub sentiment: Vec<SentimentObservation>,
}

pub fn assemble(
    canonical_symbol: &str,
    symbol_mapped: bool,
    timestamp: i64,
    now: i64,
    data: &DomainData,
    bands: &DecayBands,
) -> MaterializedFeatureRecord {
    let mut record = MaterializedFeatureRecord::new(canonical_symbol, timestamp, now);
    record.symbol_mapped = symbol_mapped;

    if let Some(price) = &data.price {
        debug_assert!(price.timestamp <= timestamp);
        record.current_price = price.current_price;
        record.volume_24h = price.volume_24h;
        record.market_cap = price.market_cap;
        record.percent_change_1h = price.percent_change_1h;
        record.percent_change_24h = price.percent_change_24h;
        record.percent_change_7d = price.percent_change_7d;
        record.open = price.open;
        record.high = price.high;
        record.low = price.low;
        record.close = price.close;
        record.ohlc_volume = price.volume;
        record.price_source = price.source.clone();
    }

    if let Some(technical) = &data.technical {
        debug_assert!(technical.timestamp <= timestamp);
        record.sma_20 = technical.sma_20;
        record.sma_50 = technical.sma_50;
        record.ema_12 = technical.ema_12;
        record.ema_26 = technical.ema_26;
        record.rsi_14 = technical.rsi_14;
        record.macd = technical.macd;
        record.macd_signal = technical.macd_signal;
        record.bollinger_upper = technical.bollinger_upper;
        record.bollinger_lower = technical.bollinger_lower;
    }

    record.fed_funds_rate = data.macro_snapshot.get("fed_funds_rate");
    record.treasury_10y = data.macro_snapshot.get("treasury_10y");
    record.dxy_index = data.macro_snapshot.get("dxy_index");
    record.cpi_yoy = data.macro_snapshot.get("cpi_yoy");
    record.unemployment_rate = data.macro_snapshot.get("unemployment_rate");
    record.sp500_close = data.macro_snapshot.get("sp500_close");
    record.vix = data.macro_snapshot.get("vix");

    if let Some(onchain) = &data.onchain {
        debug_assert!(onchain.timestamp <= timestamp);
        record.active_addresses = onchain.active_addresses;
        record.transaction_count = onchain.transaction_count;
        record.exchange_inflow = onchain.exchange_inflow;
        record.exchange_outflow = onchain.exchange_outflow;
        record.whale_tx_count = onchain.whale_tx_count;
        record.nvt_ratio = onchain.nvt_ratio;
    }

    let sentiment = decay::aggregate_all(&data.sentiment, timestamp, bands);
    record.sentiment_crypto = sentiment.crypto;
    record.sentiment_stock = sentiment.stock;
    record.sentiment_social = sentiment.social;
    record.sentiment_overall = sentiment.overall;
    record.sentiment_observation_count = sentiment.observation_count;

    completeness::apply(&mut record);

    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::Audience;

    #[test]
    fn test_empty_domains_leave_nulls() {
        let record = assemble(
            "BTC",
            true,
            10_000,
            10_050,
            &DomainData::default(),
            &DecayBands::default_bands(),
        );

        assert_eq!(record.current_price, None);
        assert_eq!(record.rsi_14, None);
        assert_eq!(record.fed_funds_rate, None);
        assert_eq!(record.active_addresses, None);
        assert_eq!(record.sentiment_overall, None);
        assert_eq!(record.sentiment_observation_count, 0);
        assert_eq!(record.data_completeness_pct, 0.0);
    }

    #[test]
    fn test_assemble_maps_all_domains() {
        let mut data = DomainData::default();
        data.price = Some(PriceRecord {
            timestamp: 9_900,
            current_price: Some(42_000.0),
            volume_24h: Some(1.0e9),
            market_cap: None,
            percent_change_1h: None,
            percent_change_24h: None,
            percent_change_7d: None,
            open: Some(41_500.0),
            high: Some(42_200.0),
            low: Some(41_400.0),
            close: Some(42_000.0),
            volume: Some(3.2e7),
            source: Some("coingecko".to_string()),
        });
        data.technical = Some(TechnicalRecord {
            timestamp: 9_800,
            sma_20: Some(41_000.0),
            sma_50: None,
            ema_12: None,
            ema_26: None,
            rsi_14: Some(61.0),
            macd: None,
            macd_signal: None,
            bollinger_upper: None,
            bollinger_lower: None,
        });
        data.sentiment = vec![SentimentObservation {
            timestamp: 9_500,
            audience: Audience::Crypto,
            score: 0.7,
        }];

        let record = assemble("BTC", true, 10_000, 10_050, &data, &DecayBands::default_bands());

        assert_eq!(record.current_price, Some(42_000.0));
        assert_eq!(record.price_source.as_deref(), Some("coingecko"));
        assert_eq!(record.rsi_14, Some(61.0));
        assert_eq!(record.sentiment_crypto, Some(0.7));
        assert_eq!(record.sentiment_observation_count, 1);
        assert!(record.data_completeness_pct > 0.0);
        assert!(record.has_price && record.has_technical && record.has_sentiment);
        assert!(!record.has_macro && !record.has_onchain);
    }

    #[test]
    fn test_completeness_reflects_assembled_state() {
        let mut data = DomainData::default();
        data.sentiment = vec![SentimentObservation {
            timestamp: 9_999,
            audience: Audience::Social,
            score: 0.0,
        }];

        let record = assemble("BTC", true, 10_000, 10_050, &data, &DecayBands::default_bands());

        // Zero score is populated data, not missing data
        assert_eq!(record.sentiment_social, Some(0.0));
        assert!(record.data_completeness_pct > 0.0);
    }
}
