//! Feature Engineer
//!
//! Pure transform: observation + encoders + frozen aggregates → `FeatureVector`.
//! Training, evaluation and serving all call `FeatureEngineer::transform`.
//!
//! ## Training path vs serving path
//! The only asymmetry is the guard. With a known guard (training records)
//! its bandwidth, country and historical features come from the record and
//! the aggregate table. Without one (a live request, where the guard is the
//! prediction target) the fixed `InferenceDefaults` are used instead. The
//! middle and exit relays are looked up in the table on both paths.

use serde::{Deserialize, Serialize};

use crate::logic::dataset::{CircuitObservation, RelayRole};
use super::aggregates::{AggregateTable, PairKind};
use super::encoder::{CategoricalField, EncoderRegistry};
use super::layout::*;
use super::vector::FeatureVector;

/// Added to every bandwidth-ratio denominator, on both paths.
pub const BANDWIDTH_STABILIZER: f64 = 1e-6;

// ============================================================================
// INFERENCE DEFAULTS
// ============================================================================

/// Neutral stand-ins for the unknown guard, plus request-mapping defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceDefaults {
    pub guard_bandwidth: f64,
    pub guard_country: String,
    pub guard_usage_freq: f64,
    pub guard_exit_pair_freq: f64,
    pub guard_middle_pair_freq: f64,
    pub guard_prefers_exit_country: f64,

    // Request → observation mapping
    pub middle_bandwidth: f64,
    pub exit_bandwidth: f64,
    pub total_bytes: f64,
    /// total_bytes = bandwidth (MB/s) * setup (s) * this
    pub bytes_per_mb: f64,
    pub unknown_fingerprint: String,
    pub unknown_country: String,
}

impl Default for InferenceDefaults {
    fn default() -> Self {
        Self {
            guard_bandwidth: 8.5,
            guard_country: "US".to_string(),
            guard_usage_freq: 0.5,
            guard_exit_pair_freq: 0.1,
            guard_middle_pair_freq: 0.1,
            guard_prefers_exit_country: 0.5,
            middle_bandwidth: 7.0,
            exit_bandwidth: 6.5,
            total_bytes: 1e7,
            bytes_per_mb: 1e6,
            unknown_fingerprint: "UNKNOWN".to_string(),
            unknown_country: "Unknown".to_string(),
        }
    }
}

// ============================================================================
// ENGINEER
// ============================================================================

/// Guard-describing inputs, resolved once per observation
struct GuardInputs<'a> {
    bandwidth: f64,
    country: &'a str,
    usage: f64,
    exit_pair: f64,
    middle_pair: f64,
    avg_bandwidth: f64,
    prefers_exit_country: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct FeatureEngineer<'a> {
    encoders: &'a EncoderRegistry,
    aggregates: &'a AggregateTable,
    defaults: &'a InferenceDefaults,
}

impl<'a> FeatureEngineer<'a> {
    pub fn new(
        encoders: &'a EncoderRegistry,
        aggregates: &'a AggregateTable,
        defaults: &'a InferenceDefaults,
    ) -> Self {
        Self { encoders, aggregates, defaults }
    }

    fn guard_inputs<'o>(&self, obs: &'o CircuitObservation) -> GuardInputs<'o>
    where
        'a: 'o,
    {
        let agg = self.aggregates;
        match obs.guard.as_ref() {
            Some(guard) => {
                let fp = guard.fingerprint.as_str();
                let prefers = agg.preferred_exit_country(fp) == Some(obs.exit.country.as_str());
                GuardInputs {
                    bandwidth: guard.bandwidth,
                    country: guard.country.as_str(),
                    usage: agg.lookup_usage(RelayRole::Guard, fp) as f64,
                    exit_pair: agg.lookup_pair(PairKind::GuardExit, fp, &obs.exit.fingerprint) as f64,
                    middle_pair: agg.lookup_pair(PairKind::GuardMiddle, fp, &obs.middle.fingerprint) as f64,
                    avg_bandwidth: agg.guard_mean_bandwidth(fp),
                    prefers_exit_country: if prefers { 1.0 } else { 0.0 },
                }
            }
            None => {
                let d = self.defaults;
                GuardInputs {
                    bandwidth: d.guard_bandwidth,
                    country: d.guard_country.as_str(),
                    usage: d.guard_usage_freq,
                    exit_pair: d.guard_exit_pair_freq,
                    middle_pair: d.guard_middle_pair_freq,
                    avg_bandwidth: d.guard_bandwidth,
                    prefers_exit_country: d.guard_prefers_exit_country,
                }
            }
        }
    }

    /// Build the fixed-order feature vector for one observation
    pub fn transform(&self, obs: &CircuitObservation) -> FeatureVector {
        let guard = self.guard_inputs(obs);
        let mut v = [0.0f64; FEATURE_COUNT];

        let (g_bw, m_bw, e_bw) = (guard.bandwidth, obs.middle.bandwidth, obs.exit.bandwidth);

        // 1. Ratios
        v[IDX_BW_RATIO_GUARD_MIDDLE] = g_bw / (m_bw + BANDWIDTH_STABILIZER);
        v[IDX_BW_RATIO_GUARD_EXIT] = g_bw / (e_bw + BANDWIDTH_STABILIZER);
        v[IDX_BW_RATIO_MIDDLE_EXIT] = m_bw / (e_bw + BANDWIDTH_STABILIZER);

        // 2. Aggregates
        let total = g_bw + m_bw + e_bw;
        v[IDX_BW_TOTAL] = total;
        v[IDX_BW_MIN] = g_bw.min(m_bw).min(e_bw);
        v[IDX_BW_MAX] = g_bw.max(m_bw).max(e_bw);
        v[IDX_BW_STD] = sample_std(&[g_bw, m_bw, e_bw]);

        // 3. Geography
        let (g_c, m_c, e_c) = (guard.country, obs.middle.country.as_str(), obs.exit.country.as_str());
        v[IDX_SAME_COUNTRY_GUARD_MIDDLE] = indicator(g_c == m_c);
        v[IDX_SAME_COUNTRY_GUARD_EXIT] = indicator(g_c == e_c);
        v[IDX_SAME_COUNTRY_MIDDLE_EXIT] = indicator(m_c == e_c);
        v[IDX_ALL_SAME_COUNTRY] = indicator(g_c == m_c && g_c == e_c);
        v[IDX_COUNTRY_DIVERSITY] = distinct_count(&[g_c, m_c, e_c]) as f64 / 3.0;

        // 4. Historical
        let agg = self.aggregates;
        v[IDX_GUARD_USAGE_FREQ] = guard.usage;
        v[IDX_MIDDLE_USAGE_FREQ] = agg.lookup_usage(RelayRole::Middle, &obs.middle.fingerprint) as f64;
        v[IDX_EXIT_USAGE_FREQ] = agg.lookup_usage(RelayRole::Exit, &obs.exit.fingerprint) as f64;
        v[IDX_GUARD_EXIT_PAIR_FREQ] = guard.exit_pair;
        v[IDX_GUARD_AVG_BANDWIDTH] = guard.avg_bandwidth;
        v[IDX_GUARD_MIDDLE_PAIR_FREQ] = guard.middle_pair;
        v[IDX_GUARD_PREFERS_EXIT_COUNTRY] = guard.prefers_exit_country;

        // 5. Categorical (target never appears here)
        let enc = self.encoders;
        v[IDX_MIDDLE_FINGERPRINT_ENCODED] = enc.encode(CategoricalField::MiddleFingerprint, &obs.middle.fingerprint) as f64;
        v[IDX_EXIT_FINGERPRINT_ENCODED] = enc.encode(CategoricalField::ExitFingerprint, &obs.exit.fingerprint) as f64;
        v[IDX_GUARD_COUNTRY_ENCODED] = enc.encode(CategoricalField::GuardCountry, g_c) as f64;
        v[IDX_MIDDLE_COUNTRY_ENCODED] = enc.encode(CategoricalField::MiddleCountry, m_c) as f64;
        v[IDX_EXIT_COUNTRY_ENCODED] = enc.encode(CategoricalField::ExitCountry, e_c) as f64;

        // 6. Interactions
        v[IDX_BW_GUARD_X_SETUP] = g_bw * obs.setup_duration;
        v[IDX_BW_TOTAL_X_BYTES] = total * obs.total_bytes;

        // 7. Raw measurements
        v[IDX_GUARD_BANDWIDTH] = g_bw;
        v[IDX_MIDDLE_BANDWIDTH] = m_bw;
        v[IDX_EXIT_BANDWIDTH] = e_bw;
        v[IDX_CIRCUIT_SETUP_DURATION] = obs.setup_duration;
        v[IDX_TOTAL_BYTES] = obs.total_bytes;

        fill_non_finite(&mut v, obs.circuit_id.as_deref());
        FeatureVector::from_values(v)
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn indicator(condition: bool) -> f64 {
    if condition { 1.0 } else { 0.0 }
}

fn distinct_count(values: &[&str]) -> usize {
    let mut seen: Vec<&str> = Vec::with_capacity(values.len());
    for v in values {
        if !seen.contains(v) {
            seen.push(*v);
        }
    }
    seen.len()
}

/// Sample standard deviation (n - 1 denominator)
fn sample_std(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    if values.len() < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / n;
    let ss: f64 = values.iter().map(|x| (x - mean).powi(2)).sum();
    (ss / (n - 1.0)).sqrt()
}

/// Missing/NaN numeric features are scored as 0
fn fill_non_finite(values: &mut [f64; FEATURE_COUNT], circuit_id: Option<&str>) {
    for (i, value) in values.iter_mut().enumerate() {
        if !value.is_finite() {
            log::warn!(
                "Non-finite feature '{}' ({}) in circuit {} replaced with 0",
                FEATURE_LAYOUT[i],
                value,
                circuit_id.unwrap_or("<request>")
            );
            *value = 0.0;
        }
    }
}
