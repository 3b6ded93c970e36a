//! Ranking Evaluator
//!
//! Top-K accuracy and Mean Reciprocal Rank over a held-out set. Ranks come
//! from `top_k`, so tie-breaking matches what the service returns.
//!
//! | Metric | Range | Meaning |
//! |--------|-------|---------|
//! | top-K accuracy | [0, 1] | fraction with the true class in the top K |
//! | MRR@K | [0, 1] | mean of 1/rank, 0 when outside the top K |

use std::collections::BTreeMap;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use super::topk::{rank_of, RankingError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    /// K → top-K accuracy
    pub top_k_accuracy: BTreeMap<usize, f64>,
    pub mrr: f64,
    pub mrr_cutoff: usize,
    pub samples: usize,
}

fn check_shape(y_true: &[usize], probabilities: &Array2<f64>) -> Result<(), RankingError> {
    if y_true.len() != probabilities.nrows() {
        return Err(RankingError::LengthMismatch {
            labels: y_true.len(),
            rows: probabilities.nrows(),
        });
    }
    if y_true.is_empty() {
        return Err(RankingError::NoSamples);
    }
    Ok(())
}

/// 1-based rank of each true label within its top-`k`, None when absent
fn ranks(y_true: &[usize], probabilities: &Array2<f64>, k: usize) -> Result<Vec<Option<usize>>, RankingError> {
    check_shape(y_true, probabilities)?;
    y_true
        .iter()
        .zip(probabilities.rows())
        .map(|(&label, row)| rank_of(row, label, k))
        .collect()
}

pub fn top_k_accuracy(y_true: &[usize], probabilities: &Array2<f64>, k: usize) -> Result<f64, RankingError> {
    let ranks = ranks(y_true, probabilities, k)?;
    let hits = ranks.iter().filter(|r| r.is_some()).count();
    Ok(hits as f64 / ranks.len() as f64)
}

pub fn mrr(y_true: &[usize], probabilities: &Array2<f64>, k_cutoff: usize) -> Result<f64, RankingError> {
    let ranks = ranks(y_true, probabilities, k_cutoff)?;
    let sum: f64 = ranks.iter().flatten().map(|&r| 1.0 / r as f64).sum();
    Ok(sum / ranks.len() as f64)
}

/// Full report for every requested K plus MRR at `mrr_cutoff`
pub fn evaluate(
    y_true: &[usize],
    probabilities: &Array2<f64>,
    ks: &[usize],
    mrr_cutoff: usize,
) -> Result<EvaluationReport, RankingError> {
    let mut top_k_accuracy = BTreeMap::new();
    for &k in ks {
        top_k_accuracy.insert(k, self::top_k_accuracy(y_true, probabilities, k)?);
    }
    let report = EvaluationReport {
        top_k_accuracy,
        mrr: mrr(y_true, probabilities, mrr_cutoff)?,
        mrr_cutoff,
        samples: y_true.len(),
    };

    for (k, acc) in &report.top_k_accuracy {
        log::info!("Top-{} accuracy: {:.4}", k, acc);
    }
    log::info!("MRR@{}: {:.4} ({} samples)", mrr_cutoff, report.mrr, report.samples);

    Ok(report)
}
