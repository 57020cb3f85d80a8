//! Decay-weighted sentiment aggregation
//!
//! Observations are weighted by recency using discrete bands (see
//! `DecayBands`) and combined as a weighted mean per audience. An empty
//! window produces None, never a fabricated zero: zero is a real score.

use crate::config::DecayBands;
use crate::records::{Audience, SentimentObservation};

/// Per-audience decayed scores plus the number of observations actually
/// used after window filtering.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SentimentAggregate {
    pub crypto: Option<f64>,
    pub stock: Option<f64>,
    pub social: Option<f64>,
    pub overall: Option<f64>,
    pub observation_count: i64,
}

/// Weighted mean of one audience's observations relative to `as_of`.
///
/// Returns (score, count_used); None when every observation falls outside
/// the decay bands.
pub fn aggregate(
    observations: &[SentimentObservation],
    as_of: i64,
    bands: &DecayBands,
) -> Option<(f64, i64)> {
    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;
    let mut count = 0i64;

    for obs in observations {
        let age = as_of - obs.timestamp;
        if let Some(weight) = bands.weight_for_age(age) {
            weighted_sum += obs.score * weight;
            weight_total += weight;
            count += 1;
        }
    }

    if count == 0 {
        return None;
    }

    Some((weighted_sum / weight_total, count))
}

/// Aggregate all audiences independently with the same decay policy, then
/// roll the populated per-audience scores into one overall figure.
pub fn aggregate_all(
    observations: &[SentimentObservation],
    as_of: i64,
    bands: &DecayBands,
) -> SentimentAggregate {
    let mut result = SentimentAggregate::default();

    for audience in Audience::all() {
        let subset: Vec<SentimentObservation> = observations
            .iter()
            .filter(|o| o.audience == audience)
            .cloned()
            .collect();

        if let Some((score, count)) = aggregate(&subset, as_of, bands) {
            result.observation_count += count;
            match audience {
                Audience::Crypto => result.crypto = Some(score),
                Audience::Stock => result.stock = Some(score),
                Audience::Social => result.social = Some(score),
            }
        }
    }

    let populated: Vec<f64> = [result.crypto, result.stock, result.social]
        .into_iter()
        .flatten()
        .collect();
    if !populated.is_empty() {
        result.overall = Some(populated.iter().sum::<f64>() / populated.len() as f64);
    }

    result
}
