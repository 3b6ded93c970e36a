//! Top-K Extractor
//!
//! Probability descending, ties broken by ascending class index. The same
//! ordering is used by the evaluator and the prediction service, so an
//! offline MRR and a live ranking always agree.

use std::cmp::Ordering;

use ndarray::ArrayView1;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RankingError {
    #[error("k must be a positive integer, got {0}")]
    InvalidK(i64),
    #[error("probability row is empty")]
    EmptyRow,
    #[error("{labels} labels but {rows} probability rows")]
    LengthMismatch { labels: usize, rows: usize },
    #[error("no evaluation samples")]
    NoSamples,
}

/// Validate a user-supplied k at the API boundary
pub fn validate_k(k: i64) -> Result<usize, RankingError> {
    if k <= 0 {
        return Err(RankingError::InvalidK(k));
    }
    usize::try_from(k).map_err(|_| RankingError::InvalidK(k))
}

/// Deterministic total order on (class, probability) pairs
fn rank_order(a: &(usize, f64), b: &(usize, f64)) -> Ordering {
    b.1.partial_cmp(&a.1)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.0.cmp(&b.0))
}

/// Ordered (class_index, probability) list of length `min(k, row.len())`
pub fn top_k(row: ArrayView1<f64>, k: usize) -> Result<Vec<(usize, f64)>, RankingError> {
    if k == 0 {
        return Err(RankingError::InvalidK(0));
    }
    if row.is_empty() {
        return Err(RankingError::EmptyRow);
    }

    let mut ranked: Vec<(usize, f64)> = row.iter().copied().enumerate().collect();
    let k = k.min(ranked.len());
    if k < ranked.len() {
        ranked.select_nth_unstable_by(k - 1, rank_order);
        ranked.truncate(k);
    }
    ranked.sort_by(rank_order);
    Ok(ranked)
}

/// 1-based rank of `class` inside the top-k list, if present
pub fn rank_of(row: ArrayView1<f64>, class: usize, k: usize) -> Result<Option<usize>, RankingError> {
    Ok(top_k(row, k)?
        .iter()
        .position(|&(c, _)| c == class)
        .map(|pos| pos + 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_descending_order() {
        let row = array![0.1, 0.7, 0.2];
        let ranked = top_k(row.view(), 3).unwrap();
        assert_eq!(ranked, vec![(1, 0.7), (2, 0.2), (0, 0.1)]);
    }

    #[test]
    fn test_ties_break_by_class_index() {
        let row = array![0.2, 0.3, 0.2, 0.3];
        let ranked = top_k(row.view(), 4).unwrap();
        let classes: Vec<usize> = ranked.iter().map(|&(c, _)| c).collect();
        assert_eq!(classes, vec![1, 3, 0, 2]);

        // Truncation keeps the lower index among equals
        let top1 = top_k(row.view(), 1).unwrap();
        assert_eq!(top1, vec![(1, 0.3)]);
        let top3 = top_k(row.view(), 3).unwrap();
        assert_eq!(top3.iter().map(|&(c, _)| c).collect::<Vec<_>>(), vec![1, 3, 0]);
    }

    #[test]
    fn test_k_is_clamped() {
        let row = array![0.5, 0.5];
        assert_eq!(top_k(row.view(), 10).unwrap().len(), 2);
    }

    #[test]
    fn test_invalid_k() {
        let row = array![1.0];
        assert_eq!(top_k(row.view(), 0), Err(RankingError::InvalidK(0)));
        assert_eq!(validate_k(0), Err(RankingError::InvalidK(0)));
        assert_eq!(validate_k(-3), Err(RankingError::InvalidK(-3)));
        assert_eq!(validate_k(5), Ok(5));
    }

    #[test]
    fn test_probabilities_non_increasing() {
        let row = array![0.05, 0.3, 0.05, 0.1, 0.25, 0.25];
        let ranked = top_k(row.view(), 6).unwrap();
        assert!(ranked.windows(2).all(|w| w[0].1 >= w[1].1));
    }

    #[test]
    fn test_rank_of() {
        let row = array![0.1, 0.7, 0.2];
        assert_eq!(rank_of(row.view(), 1, 3), Ok(Some(1)));
        assert_eq!(rank_of(row.view(), 0, 3), Ok(Some(3)));
        assert_eq!(rank_of(row.view(), 0, 2), Ok(None));
    }
}
