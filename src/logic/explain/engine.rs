use std::collections::BTreeMap;

use super::types::{ExplainResult, FeatureContribution, Impact};
use crate::logic::features::{layout::feature_index, FeatureVector};

pub const DEFAULT_TOP_N: usize = 5;

/// Top-`top_n` features by model importance, normalized by the maximum.
/// Features with zero importance are never reported.
pub fn explain(
    importance: &BTreeMap<String, f64>,
    features: &FeatureVector,
    top_n: usize,
) -> Option<ExplainResult> {
    let max = importance
        .values()
        .copied()
        .filter(|v| v.is_finite())
        .fold(0.0f64, f64::max);
    if max <= 0.0 || top_n == 0 {
        return None;
    }

    let mut ranked: Vec<(usize, &str, f64)> = importance
        .iter()
        .filter(|&(_, &score)| score.is_finite() && score > 0.0)
        .filter_map(|(name, &score)| feature_index(name).map(|i| (i, name.as_str(), score)))
        .collect();

    // Sort by importance DESC, layout order on ties
    ranked.sort_by(|a, b| {
        b.2.partial_cmp(&a.2)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    ranked.truncate(top_n);

    let contributions: Vec<FeatureContribution> = ranked
        .into_iter()
        .map(|(index, name, score)| {
            let normalized = score / max;
            FeatureContribution {
                name: name.to_string(),
                importance: normalized,
                value: features.values[index],
                impact: Impact::from_normalized(normalized),
                description: get_description(name),
            }
        })
        .collect();

    if contributions.is_empty() {
        return None;
    }

    Some(ExplainResult { contributions })
}

fn get_description(name: &str) -> Option<String> {
    match name {
        "guard_usage_freq" => Some("How often the guard appeared in training circuits".to_string()),
        "guard_exit_pair_freq" => Some("Guard and exit seen together historically".to_string()),
        "exit_fingerprint_encoded" => Some("Identity of the exit relay".to_string()),
        "exit_country_encoded" => Some("Country of the exit relay".to_string()),
        "bw_ratio_guard_exit" => Some("Guard to exit bandwidth ratio".to_string()),
        "country_diversity" => Some("Distinct countries along the circuit".to_string()),
        "circuit_setup_duration" => Some("Time to build the circuit".to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::features::FEATURE_LAYOUT;

    fn importance(scores: &[(usize, f64)]) -> BTreeMap<String, f64> {
        let mut map: BTreeMap<String, f64> = FEATURE_LAYOUT.iter().map(|n| (n.to_string(), 0.0)).collect();
        for &(i, s) in scores {
            map.insert(FEATURE_LAYOUT[i].to_string(), s);
        }
        map
    }

    #[test]
    fn test_normalized_and_bucketed() {
        let imp = importance(&[(0, 10.0), (1, 5.0), (2, 2.0), (3, 8.0)]);
        let mut fv = FeatureVector::new();
        fv.set(3, 42.0);

        let result = explain(&imp, &fv, 5).unwrap();
        let c = &result.contributions;
        assert_eq!(c.len(), 4);

        assert_eq!(c[0].name, FEATURE_LAYOUT[0]);
        assert_eq!(c[0].importance, 1.0);
        assert_eq!(c[0].impact, Impact::High);

        assert_eq!(c[1].name, FEATURE_LAYOUT[3]);
        assert_eq!(c[1].value, 42.0);
        assert_eq!(c[1].impact, Impact::High);

        assert_eq!(c[2].impact, Impact::Medium); // 0.5
        assert_eq!(c[3].impact, Impact::Low); // 0.2
    }

    #[test]
    fn test_bounded_to_top_n() {
        let scores: Vec<(usize, f64)> = (0..10).map(|i| (i, 1.0 + i as f64)).collect();
        let result = explain(&importance(&scores), &FeatureVector::new(), DEFAULT_TOP_N).unwrap();
        assert_eq!(result.contributions.len(), 5);
        assert!(result.contributions.windows(2).all(|w| w[0].importance >= w[1].importance));
    }

    #[test]
    fn test_ties_use_layout_order() {
        let result = explain(&importance(&[(7, 1.0), (2, 1.0)]), &FeatureVector::new(), 5).unwrap();
        assert_eq!(result.contributions[0].name, FEATURE_LAYOUT[2]);
        assert_eq!(result.contributions[1].name, FEATURE_LAYOUT[7]);
    }

    #[test]
    fn test_all_zero_importance() {
        assert!(explain(&importance(&[]), &FeatureVector::new(), 5).is_none());
    }

    #[test]
    fn test_bucket_boundaries() {
        assert_eq!(Impact::from_normalized(0.71), Impact::High);
        assert_eq!(Impact::from_normalized(0.7), Impact::Medium);
        assert_eq!(Impact::from_normalized(0.4), Impact::Low);
    }
}
