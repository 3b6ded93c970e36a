//! Softmax Regression - Reference Ranking Model
//!
//! Multinomial logistic regression over z-score standardized features.
//! Zero-initialized, full-batch gradient descent with an L2 penalty and
//! early stopping on validation log-loss. No randomness anywhere, so the
//! same training set always yields the same weights.

use std::collections::BTreeMap;

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::logic::features::{FeatureVector, FEATURE_COUNT, FEATURE_LAYOUT};
use super::inference::{to_matrix, ModelError, RankingModel, TrainingSet};

pub const MODEL_TYPE: &str = "softmax_regression";

/// Floor for p(true class) inside the log-loss
const LOG_LOSS_EPSILON: f64 = 1e-15;

// ============================================================================
// CONFIG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoftmaxConfig {
    pub learning_rate: f64,
    pub max_epochs: usize,
    pub l2: f64,
    /// Epochs without validation improvement before stopping
    pub patience: usize,
}

impl Default for SoftmaxConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            max_epochs: 300,
            l2: 1e-3,
            patience: 20,
        }
    }
}

// ============================================================================
// MODEL
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoftmaxRegression {
    config: SoftmaxConfig,
    num_classes: usize,
    /// FEATURE_COUNT × num_classes
    weights: Array2<f64>,
    bias: Array1<f64>,
    /// Standardization fitted on the training rows
    mean: Array1<f64>,
    scale: Array1<f64>,
    epochs_trained: usize,
    best_validation_loss: Option<f64>,
}

impl Default for SoftmaxRegression {
    fn default() -> Self {
        Self::new(SoftmaxConfig::default())
    }
}

impl SoftmaxRegression {
    pub fn new(config: SoftmaxConfig) -> Self {
        Self {
            config,
            num_classes: 0,
            weights: Array2::zeros((FEATURE_COUNT, 0)),
            bias: Array1::zeros(0),
            mean: Array1::zeros(FEATURE_COUNT),
            scale: Array1::ones(FEATURE_COUNT),
            epochs_trained: 0,
            best_validation_loss: None,
        }
    }

    pub fn config(&self) -> &SoftmaxConfig {
        &self.config
    }

    pub fn is_fitted(&self) -> bool {
        self.num_classes > 0
    }

    pub fn epochs_trained(&self) -> usize {
        self.epochs_trained
    }

    pub fn best_validation_loss(&self) -> Option<f64> {
        self.best_validation_loss
    }

    /// Parameter shapes must agree before any broadcasting; a hand-edited
    /// or truncated model file would otherwise panic inside ndarray
    pub fn check_shapes(&self) -> Result<(), ModelError> {
        let c = self.num_classes;
        let checks = [
            (FEATURE_COUNT, self.weights.nrows()),
            (c, self.weights.ncols()),
            (c, self.bias.len()),
            (FEATURE_COUNT, self.mean.len()),
            (FEATURE_COUNT, self.scale.len()),
        ];
        match checks.into_iter().find(|(expected, actual)| expected != actual) {
            Some((expected, actual)) => Err(ModelError::DimensionMismatch { expected, actual }),
            None => Ok(()),
        }
    }

    fn standardize(&self, x: &Array2<f64>) -> Array2<f64> {
        (x - &self.mean) / &self.scale
    }

    fn probabilities(&self, xs: &Array2<f64>, weights: &Array2<f64>, bias: &Array1<f64>) -> Array2<f64> {
        let mut logits = xs.dot(weights) + bias;
        for mut row in logits.rows_mut() {
            let max = row.fold(f64::NEG_INFINITY, |m, &v| m.max(v));
            row.mapv_inplace(|v| (v - max).exp());
            let sum = row.sum();
            row.mapv_inplace(|v| v / sum);
        }
        logits
    }

    fn log_loss(probs: &Array2<f64>, labels: &[usize]) -> f64 {
        let total: f64 = labels
            .iter()
            .enumerate()
            .map(|(i, &y)| -probs[[i, y]].max(LOG_LOSS_EPSILON).ln())
            .sum();
        total / labels.len().max(1) as f64
    }

    fn fit_standardization(&mut self, x: &Array2<f64>) {
        let n = x.nrows() as f64;
        let mean = x.sum_axis(Axis(0)) / n;
        let var = x
            .axis_iter(Axis(0))
            .fold(Array1::zeros(x.ncols()), |acc: Array1<f64>, row| acc + (&row - &mean).mapv(|d| d * d))
            / n;
        // Constant columns keep scale 1
        self.scale = var.mapv(|v| if v > 0.0 { v.sqrt() } else { 1.0 });
        self.mean = mean;
    }

    fn one_hot(labels: &[usize], num_classes: usize) -> Array2<f64> {
        let mut y = Array2::zeros((labels.len(), num_classes));
        for (i, &label) in labels.iter().enumerate() {
            y[[i, label]] = 1.0;
        }
        y
    }

    fn train(&mut self, training: &TrainingSet, validation: Option<&TrainingSet>) -> Result<(), ModelError> {
        training.validate()?;
        let c = training.num_classes;

        let x = training.matrix();
        self.fit_standardization(&x);
        let xs = self.standardize(&x);
        let y = Self::one_hot(&training.labels, c);
        let n = xs.nrows() as f64;

        // Validation rows with labels this model cannot represent are dropped
        let held_out = validation.and_then(|v| {
            let (rows, labels): (Vec<FeatureVector>, Vec<usize>) = v
                .features
                .iter()
                .zip(&v.labels)
                .filter(|&(_, &l)| l < c)
                .map(|(f, &l)| (f.clone(), l))
                .unzip();
            if rows.is_empty() {
                None
            } else {
                Some((self.standardize(&to_matrix(&rows)), labels))
            }
        });

        let mut weights = Array2::<f64>::zeros((FEATURE_COUNT, c));
        let mut bias = Array1::<f64>::zeros(c);
        let mut best: Option<(f64, Array2<f64>, Array1<f64>)> = None;
        let mut stale = 0usize;
        let mut epochs = 0usize;
        let lr = self.config.learning_rate;

        for epoch in 0..self.config.max_epochs {
            epochs = epoch + 1;

            let probs = self.probabilities(&xs, &weights, &bias);
            let residual = probs - &y;
            let grad_w = xs.t().dot(&residual) / n + &weights * self.config.l2;
            let grad_b = residual.sum_axis(Axis(0)) / n;
            weights = weights - grad_w * lr;
            bias = bias - grad_b * lr;

            let Some((xv, yv)) = held_out.as_ref() else { continue };
            let loss = Self::log_loss(&self.probabilities(xv, &weights, &bias), yv);
            let improved = best.as_ref().map_or(true, |(b, _, _)| loss < *b);
            if improved {
                best = Some((loss, weights.clone(), bias.clone()));
                stale = 0;
            } else {
                stale += 1;
                if stale >= self.config.patience {
                    log::debug!("Early stopping at epoch {} (best val loss {:.5})", epochs, best.as_ref().map_or(loss, |b| b.0));
                    break;
                }
            }
        }

        match best {
            Some((loss, w, b)) => {
                self.weights = w;
                self.bias = b;
                self.best_validation_loss = Some(loss);
            }
            None => {
                self.weights = weights;
                self.bias = bias;
                self.best_validation_loss = None;
            }
        }
        self.num_classes = c;
        self.epochs_trained = epochs;

        log::info!(
            "Softmax regression trained: {} rows, {} classes, {} epochs, val loss {:?}",
            training.len(),
            c,
            epochs,
            self.best_validation_loss
        );
        Ok(())
    }
}

impl RankingModel for SoftmaxRegression {
    fn fit(&mut self, training: &TrainingSet) -> Result<(), ModelError> {
        self.train(training, None)
    }

    fn fit_with_validation(
        &mut self,
        training: &TrainingSet,
        validation: Option<&TrainingSet>,
    ) -> Result<(), ModelError> {
        self.train(training, validation)
    }

    fn predict_proba(&self, features: &[FeatureVector]) -> Result<Array2<f64>, ModelError> {
        if !self.is_fitted() {
            return Err(ModelError::NotFitted);
        }
        self.check_shapes()?;
        features.iter().try_for_each(FeatureVector::check_layout)?;
        let xs = self.standardize(&to_matrix(features));
        Ok(self.probabilities(&xs, &self.weights, &self.bias))
    }

    fn feature_importance(&self) -> BTreeMap<String, f64> {
        FEATURE_LAYOUT
            .iter()
            .enumerate()
            .map(|(j, name)| {
                let score = if j < self.weights.nrows() {
                    self.weights.row(j).iter().map(|w| w.abs()).sum()
                } else {
                    0.0
                };
                (name.to_string(), score)
            })
            .collect()
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn input_width(&self) -> usize {
        self.weights.nrows()
    }

    fn check_state(&self) -> Result<(), ModelError> {
        if self.is_fitted() {
            self.check_shapes()
        } else {
            Err(ModelError::NotFitted)
        }
    }

    fn model_type(&self) -> &'static str {
        MODEL_TYPE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::model::inference::validate_probabilities;

    /// Class is readable off feature 0 and a per-class indicator; feature 1 is noise
    fn separable(n_per_class: usize, classes: usize) -> TrainingSet {
        let mut features = Vec::new();
        let mut labels = Vec::new();
        for class in 0..classes {
            for i in 0..n_per_class {
                let mut fv = FeatureVector::new();
                fv.set(0, class as f64 * 10.0 + (i % 3) as f64 * 0.1);
                fv.set(1, (i % 5) as f64);
                fv.set(2 + class, 1.0);
                features.push(fv);
                labels.push(class);
            }
        }
        TrainingSet::new(features, labels, classes)
    }

    #[test]
    fn test_fit_and_predict_separable() {
        let data = separable(10, 3);
        let mut model = SoftmaxRegression::default();
        model.fit(&data).unwrap();

        let probs = model.predict_proba(&data.features).unwrap();
        assert_eq!(probs.dim(), (30, 3));
        validate_probabilities(&probs).unwrap();

        for (row, &label) in probs.rows().into_iter().zip(&data.labels) {
            let argmax = row
                .iter()
                .enumerate()
                .fold((0, f64::MIN), |best, (i, &p)| if p > best.1 { (i, p) } else { best })
                .0;
            assert_eq!(argmax, label);
        }
    }

    #[test]
    fn test_rejects_single_class() {
        let mut model = SoftmaxRegression::default();
        let result = model.fit(&separable(5, 1));
        assert_eq!(result, Err(ModelError::InsufficientClasses(1)));
        assert!(!model.is_fitted());
    }

    #[test]
    fn test_inconsistent_parameters_are_errors() {
        let mut model = SoftmaxRegression::default();
        model.fit(&separable(5, 2)).unwrap();
        assert!(model.check_shapes().is_ok());

        let mut short_bias = model.clone();
        short_bias.bias = Array1::zeros(1);
        assert_eq!(
            short_bias.predict_proba(&[FeatureVector::new()]),
            Err(ModelError::DimensionMismatch { expected: 2, actual: 1 })
        );

        let mut short_scale = model.clone();
        short_scale.scale = Array1::ones(3);
        assert_eq!(
            short_scale.predict_proba(&[FeatureVector::new()]),
            Err(ModelError::DimensionMismatch { expected: FEATURE_COUNT, actual: 3 })
        );

        let mut short_mean = model;
        short_mean.mean = Array1::zeros(FEATURE_COUNT + 1);
        assert!(short_mean.check_shapes().is_err());
    }

    #[test]
    fn test_predict_before_fit() {
        let model = SoftmaxRegression::default();
        assert_eq!(model.predict_proba(&[FeatureVector::new()]), Err(ModelError::NotFitted));
    }

    #[test]
    fn test_training_is_deterministic() {
        let data = separable(8, 4);
        let mut a = SoftmaxRegression::default();
        let mut b = SoftmaxRegression::default();
        a.fit(&data).unwrap();
        b.fit(&data).unwrap();

        let (pa, pb) = (a.predict_proba(&data.features).unwrap(), b.predict_proba(&data.features).unwrap());
        assert!(pa.iter().zip(pb.iter()).all(|(x, y)| x.to_bits() == y.to_bits()));
    }

    #[test]
    fn test_early_stopping_respects_cap() {
        let data = separable(6, 2);
        let validation = separable(2, 2);
        let mut model = SoftmaxRegression::new(SoftmaxConfig {
            max_epochs: 50,
            patience: 3,
            ..SoftmaxConfig::default()
        });
        model.fit_with_validation(&data, Some(&validation)).unwrap();

        assert!(model.epochs_trained() <= 50);
        assert!(model.best_validation_loss().is_some());
    }

    #[test]
    fn test_feature_importance() {
        let mut model = SoftmaxRegression::default();
        model.fit(&separable(10, 2)).unwrap();

        let importance = model.feature_importance();
        assert_eq!(importance.len(), FEATURE_COUNT);
        assert!(importance.values().all(|&s| s >= 0.0));

        // Constant columns never move off their zero init
        assert_eq!(importance[FEATURE_LAYOUT[FEATURE_COUNT - 1]], 0.0);
        assert!(importance[FEATURE_LAYOUT[0]] > importance[FEATURE_LAYOUT[1]]);
    }

    #[test]
    fn test_serde_round_trip_predicts_identically() {
        let data = separable(5, 3);
        let mut model = SoftmaxRegression::default();
        model.fit(&data).unwrap();

        let json = serde_json::to_string(&model).unwrap();
        let loaded: SoftmaxRegression = serde_json::from_str(&json).unwrap();

        let (a, b) = (model.predict_proba(&data.features).unwrap(), loaded.predict_proba(&data.features).unwrap());
        assert!(a.iter().zip(b.iter()).all(|(x, y)| x.to_bits() == y.to_bits()));
        assert_eq!(loaded.num_classes(), 3);
    }
}
