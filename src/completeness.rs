//! Completeness scoring for materialized rows
//!
//! Recomputed from the row's current state on every write; a straggling
//! macro print that lands later must raise the stored percentage.

use crate::records::{Domain, MaterializedFeatureRecord};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct Completeness {
    /// populated_fields / total_fields over the measurement set, 0-100.
    pub percentage: f64,
    /// Domains that contributed at least one non-null value.
    pub populated_domains: Vec<Domain>,
}

impl Completeness {
    pub fn has(&self, domain: Domain) -> bool {
        self.populated_domains.contains(&domain)
    }
}

/// Recompute the score from the row's current state and stamp the quality
/// metadata (percentage plus per-domain flags) onto it.
pub fn apply(record: &mut MaterializedFeatureRecord) -> Completeness {
    let c = score(record);
    record.data_completeness_pct = c.percentage;
    record.has_price = c.has(Domain::Price);
    record.has_technical = c.has(Domain::Technical);
    record.has_macro = c.has(Domain::Macro);
    record.has_onchain = c.has(Domain::Onchain);
    record.has_sentiment = c.has(Domain::Sentiment);
    c
}

pub fn score(record: &MaterializedFeatureRecord) -> Completeness {
    let presence = record.field_presence();
    let total = presence.len();
    let mut populated = 0usize;
    let mut by_domain: HashMap<Domain, bool> = HashMap::new();

    for (domain, is_populated) in presence {
        if is_populated {
            populated += 1;
        }
        *by_domain.entry(domain).or_insert(false) |= is_populated;
    }

    let populated_domains = Domain::all()
        .into_iter()
        .filter(|d| by_domain.get(d).copied().unwrap_or(false))
        .collect();

    Completeness {
        percentage: if total == 0 {
            0.0
        } else {
            populated as f64 / total as f64 * 100.0
        },
        populated_domains,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_record_scores_zero() {
        let record = MaterializedFeatureRecord::new("BTC", 1_000, 900);
        let c = score(&record);
        assert_eq!(c.percentage, 0.0);
        assert!(c.populated_domains.is_empty());
    }

    #[test]
    fn test_domain_flags_track_any_populated_field() {
        let mut record = MaterializedFeatureRecord::new("BTC", 1_000, 900);
        record.current_price = Some(42_000.0);
        record.rsi_14 = Some(55.0);
        record.fed_funds_rate = Some(5.25);

        let c = score(&record);
        assert!(c.has(Domain::Price));
        assert!(c.has(Domain::Technical));
        assert!(c.has(Domain::Macro));
        assert!(!c.has(Domain::Onchain));
        assert!(!c.has(Domain::Sentiment));
        assert_eq!(c.populated_domains.len(), 3);
    }

    #[test]
    fn test_percentage_matches_populated_over_total() {
        let mut record = MaterializedFeatureRecord::new("BTC", 1_000, 900);
        record.current_price = Some(42_000.0);
        record.close = Some(42_100.0);

        let total = record.field_presence().len();
        let c = score(&record);
        assert!((c.percentage - 2.0 / total as f64 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_straggler_update_raises_percentage() {
        let mut record = MaterializedFeatureRecord::new("BTC", 1_000, 900);
        record.current_price = Some(42_000.0);
        let before = score(&record).percentage;

        record.fed_funds_rate = Some(5.25);
        let after = score(&record).percentage;
        assert!(after > before);
    }

    #[test]
    fn test_apply_stamps_flags_and_percentage() {
        let mut record = MaterializedFeatureRecord::new("BTC", 1_000, 900);
        record.current_price = Some(42_000.0);
        record.fed_funds_rate = Some(5.25);

        let c = apply(&mut record);
        assert_eq!(record.data_completeness_pct, c.percentage);
        assert!(record.has_price);
        assert!(!record.has_technical);
        assert!(record.has_macro);
        assert!(!record.has_onchain);
        assert!(!record.has_sentiment);
    }

    #[test]
    fn test_zero_sentiment_score_counts_as_populated() {
        let mut record = MaterializedFeatureRecord::new("BTC", 1_000, 900);
        record.sentiment_social = Some(0.0);

        let c = score(&record);
        assert!(c.has(Domain::Sentiment));
    }
}
