//! Seeded, guard-stratified corpus split.
//!
//! Aggregates and encoders are fitted on `train` only; `validation` drives
//! early stopping and `test` is the held-out evaluation set.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use super::types::CircuitObservation;
use super::DatasetError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitConfig {
    pub validation_fraction: f64,
    pub test_fraction: f64,
    pub seed: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            validation_fraction: 0.15,
            test_fraction: 0.15,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CorpusSplit {
    pub train: Vec<CircuitObservation>,
    pub validation: Vec<CircuitObservation>,
    pub test: Vec<CircuitObservation>,
}

impl CorpusSplit {
    pub fn len(&self) -> usize {
        self.train.len() + self.validation.len() + self.test.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Split per guard so every guard keeps at least one training record.
pub fn split_corpus(
    corpus: &[CircuitObservation],
    config: &SplitConfig,
) -> Result<CorpusSplit, DatasetError> {
    let (val_frac, test_frac) = (config.validation_fraction, config.test_fraction);
    if !(0.0..1.0).contains(&val_frac) || !(0.0..1.0).contains(&test_frac) || val_frac + test_frac >= 1.0 {
        return Err(DatasetError::InvalidSplit(format!(
            "validation={} test={} must be in [0, 1) and sum below 1",
            val_frac, test_frac
        )));
    }
    if corpus.is_empty() {
        return Err(DatasetError::Empty("nothing to split".to_string()));
    }

    // BTreeMap keeps group order independent of hashing
    let mut by_guard: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    let mut unlabeled = 0usize;
    for (i, obs) in corpus.iter().enumerate() {
        match obs.guard_fingerprint() {
            Some(fp) => by_guard.entry(fp).or_default().push(i),
            None => unlabeled += 1,
        }
    }
    if unlabeled > 0 {
        log::warn!("Skipping {} records without a guard fingerprint", unlabeled);
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut split = CorpusSplit::default();

    for indices in by_guard.values_mut() {
        indices.shuffle(&mut rng);

        let n = indices.len();
        // epsilon keeps 40 * 0.15 at 6 instead of 5.999..
        let mut n_test = (n as f64 * test_frac + 1e-9).floor() as usize;
        let mut n_val = (n as f64 * val_frac + 1e-9).floor() as usize;
        while n_test + n_val >= n && n_val > 0 {
            n_val -= 1;
        }
        while n_test + n_val >= n && n_test > 0 {
            n_test -= 1;
        }

        let (test_idx, rest) = indices.split_at(n_test);
        let (val_idx, train_idx) = rest.split_at(n_val);

        split.test.extend(test_idx.iter().map(|&i| corpus[i].clone()));
        split.validation.extend(val_idx.iter().map(|&i| corpus[i].clone()));
        split.train.extend(train_idx.iter().map(|&i| corpus[i].clone()));
    }

    log::info!(
        "Data split: train={} validation={} test={} ({} guards)",
        split.train.len(),
        split.validation.len(),
        split.test.len(),
        by_guard.len()
    );

    Ok(split)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::dataset::types::RelayInfo;

    fn obs(guard: &str, id: usize) -> CircuitObservation {
        CircuitObservation {
            circuit_id: Some(format!("c{}", id)),
            guard: Some(RelayInfo::new(guard, "US", 8.0)),
            middle: RelayInfo::new("M1", "DE", 7.0),
            exit: RelayInfo::new("E1", "FR", 6.0),
            setup_duration: 1.0,
            total_bytes: 1000.0,
            status: None,
            purpose: None,
            timestamp: None,
            build_time: None,
        }
    }

    fn corpus() -> Vec<CircuitObservation> {
        let mut out = Vec::new();
        for i in 0..40 {
            out.push(obs("G1", i));
        }
        for i in 40..60 {
            out.push(obs("G2", i));
        }
        out.push(obs("G3", 60));
        out
    }

    #[test]
    fn test_split_is_deterministic() {
        let data = corpus();
        let a = split_corpus(&data, &SplitConfig::default()).unwrap();
        let b = split_corpus(&data, &SplitConfig::default()).unwrap();

        assert_eq!(a.train, b.train);
        assert_eq!(a.test, b.test);
        assert_eq!(a.len(), data.len());
    }

    #[test]
    fn test_every_guard_keeps_a_training_record() {
        let split = split_corpus(&corpus(), &SplitConfig::default()).unwrap();

        for guard in ["G1", "G2", "G3"] {
            assert!(split.train.iter().any(|o| o.guard_fingerprint() == Some(guard)));
        }
        // 40 * 0.15 = 6 for each of val/test
        assert_eq!(split.test.iter().filter(|o| o.guard_fingerprint() == Some("G1")).count(), 6);
    }

    #[test]
    fn test_rejects_bad_fractions() {
        let config = SplitConfig { validation_fraction: 0.6, test_fraction: 0.5, seed: 1 };
        assert!(matches!(split_corpus(&corpus(), &config), Err(DatasetError::InvalidSplit(_))));
    }

    #[test]
    fn test_rejects_empty_corpus() {
        assert!(matches!(split_corpus(&[], &SplitConfig::default()), Err(DatasetError::Empty(_))));
    }
}
