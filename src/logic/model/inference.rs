//! Ranking Model Abstraction
//!
//! Any multi-class probabilistic classifier can back the ranker as long as it
//! implements `RankingModel`. The feature engineer and the prediction service
//! only ever see this trait.

use std::collections::BTreeMap;

use ndarray::{Array2, ArrayView1};

use crate::logic::features::{FeatureVector, LayoutMismatchError, FEATURE_COUNT};

/// Row sums may drift this far from 1.0 before a row counts as non-normalized
pub const PROBABILITY_TOLERANCE: f64 = 1e-6;

// ============================================================================
// ERROR HANDLING
// ============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    #[error("training set is empty")]
    EmptyTrainingSet,
    #[error("need at least 2 classes to train, got {0}")]
    InsufficientClasses(usize),
    #[error("label {label} out of range for {num_classes} classes")]
    LabelOutOfRange { label: usize, num_classes: usize },
    #[error("{features} feature rows but {labels} labels")]
    LengthMismatch { features: usize, labels: usize },
    #[error("model expects {expected} inputs, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("model has not been fitted")]
    NotFitted,
    #[error("probability row {row} sums to {sum}, not 1")]
    NonNormalizedRow { row: usize, sum: f64 },
    #[error("probability row {row} has negative or non-finite entry at class {class}")]
    NegativeProbability { row: usize, class: usize },
    #[error("stale feature row: {0}")]
    StaleFeatures(#[from] LayoutMismatchError),
}

// ============================================================================
// TRAINING SET
// ============================================================================

/// Feature rows + class indices, already encoded
#[derive(Debug, Clone, Default)]
pub struct TrainingSet {
    pub features: Vec<FeatureVector>,
    pub labels: Vec<usize>,
    pub num_classes: usize,
}

impl TrainingSet {
    pub fn new(features: Vec<FeatureVector>, labels: Vec<usize>, num_classes: usize) -> Self {
        Self { features, labels, num_classes }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Reject inputs no classifier can train on
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.features.is_empty() {
            return Err(ModelError::EmptyTrainingSet);
        }
        if self.features.len() != self.labels.len() {
            return Err(ModelError::LengthMismatch {
                features: self.features.len(),
                labels: self.labels.len(),
            });
        }
        if self.num_classes < 2 {
            return Err(ModelError::InsufficientClasses(self.num_classes));
        }
        if let Some(&label) = self.labels.iter().find(|&&l| l >= self.num_classes) {
            return Err(ModelError::LabelOutOfRange {
                label,
                num_classes: self.num_classes,
            });
        }
        self.features.iter().try_for_each(FeatureVector::check_layout)?;
        Ok(())
    }

    /// Row-major design matrix (n × FEATURE_COUNT)
    pub fn matrix(&self) -> Array2<f64> {
        to_matrix(&self.features)
    }
}

pub fn to_matrix(features: &[FeatureVector]) -> Array2<f64> {
    let mut x = Array2::zeros((features.len(), FEATURE_COUNT));
    for (mut row, fv) in x.rows_mut().into_iter().zip(features) {
        for (cell, &value) in row.iter_mut().zip(fv.values.iter()) {
            *cell = value;
        }
    }
    x
}

// ============================================================================
// RANKING MODEL TRAIT
// ============================================================================

/// Classifier contract: fit on labelled vectors, emit one probability row
/// per input (width = `num_classes`, non-negative, summing to 1).
pub trait RankingModel: Send + Sync {
    fn fit(&mut self, training: &TrainingSet) -> Result<(), ModelError>;

    /// Fit with a held-out set for early stopping. Models without one
    /// ignore it.
    fn fit_with_validation(
        &mut self,
        training: &TrainingSet,
        _validation: Option<&TrainingSet>,
    ) -> Result<(), ModelError> {
        self.fit(training)
    }

    fn predict_proba(&self, features: &[FeatureVector]) -> Result<Array2<f64>, ModelError>;

    /// Feature name → non-negative score. Comparable within one model only.
    fn feature_importance(&self) -> BTreeMap<String, f64>;

    fn num_classes(&self) -> usize;

    /// Number of inputs the fitted model expects per row
    fn input_width(&self) -> usize;

    fn model_type(&self) -> &'static str;

    /// Internal consistency of deserialized parameters, checked at load
    fn check_state(&self) -> Result<(), ModelError> {
        Ok(())
    }
}

// ============================================================================
// PROBABILITY VALIDATION
// ============================================================================

/// Check one row. Never renormalizes: a bad row is a model defect.
pub fn validate_probability_row(row: ArrayView1<f64>, index: usize) -> Result<(), ModelError> {
    if let Some(class) = row.iter().position(|p| !p.is_finite() || *p < 0.0) {
        return Err(ModelError::NegativeProbability { row: index, class });
    }
    let sum = row.sum();
    if (sum - 1.0).abs() > PROBABILITY_TOLERANCE {
        return Err(ModelError::NonNormalizedRow { row: index, sum });
    }
    Ok(())
}

pub fn validate_probabilities(matrix: &Array2<f64>) -> Result<(), ModelError> {
    matrix
        .rows()
        .into_iter()
        .enumerate()
        .try_for_each(|(i, row)| validate_probability_row(row, i))
}
