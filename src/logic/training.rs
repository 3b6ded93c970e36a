//! Training Pipeline - Offline, single-writer batch job
//!
//! corpus → split → encoders + aggregates (train partition only) →
//! feature engineer → model fit → held-out evaluation → `ArtifactBundle`.
//! Nothing is written to disk here; a failed fit therefore never leaves a
//! partial artifact behind.

use std::io::Write;

use crate::config::TrainingConfig;
use crate::logic::artifact::ArtifactBundle;
use crate::logic::dataset::{split_corpus, CircuitObservation, DatasetError};
use crate::logic::features::{
    AggregateTable, EncoderRegistry, FeatureEngineer, InferenceDefaults, FEATURE_LAYOUT, UNKNOWN_INDEX,
};
use crate::logic::model::{
    evaluate, validate_probabilities, EvaluationReport, ModelError, RankingError, RankingModel,
    SoftmaxRegression, TrainingSet,
};

#[derive(Debug, thiserror::Error)]
pub enum TrainingError {
    #[error(transparent)]
    Dataset(#[from] DatasetError),
    #[error("Model error: {0}")]
    Model(#[from] ModelError),
    #[error("Evaluation error: {0}")]
    Ranking(#[from] RankingError),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no evaluation rows with a guard known to the model")]
    NoEvaluationRows,
}

// ============================================================================
// LABELLED SETS
// ============================================================================

/// Engineer features and attach class labels. Rows whose guard is missing
/// or unknown to the target encoder are skipped; the count is returned.
///
/// With `hide_guard` the rows go through the serving path (guard replaced
/// by the inference defaults) while keeping their true label.
pub fn build_labelled_set(
    engineer: &FeatureEngineer<'_>,
    encoders: &EncoderRegistry,
    observations: &[CircuitObservation],
    hide_guard: bool,
) -> (TrainingSet, usize) {
    let num_classes = encoders.num_classes();
    let mut set = TrainingSet::new(Vec::with_capacity(observations.len()), Vec::new(), num_classes);
    let mut skipped = 0usize;

    for obs in observations {
        let label = obs
            .guard_fingerprint()
            .and_then(|fp| encoders.target().and_then(|t| t.index_of(fp)));
        let Some(label) = label else {
            skipped += 1;
            continue;
        };

        let features = if hide_guard {
            engineer.transform(&obs.without_guard())
        } else {
            engineer.transform(obs)
        };
        set.features.push(features);
        set.labels.push(label);
    }

    if skipped > 0 {
        log::info!("Skipped {} of {} rows with a guard unknown to the model", skipped, observations.len());
    }
    (set, skipped)
}

/// Predict, validate rows, then score
pub fn evaluate_model<M: RankingModel + ?Sized>(
    model: &M,
    set: &TrainingSet,
    ks: &[usize],
    mrr_cutoff: usize,
) -> Result<EvaluationReport, TrainingError> {
    if set.is_empty() {
        return Err(TrainingError::NoEvaluationRows);
    }
    let probabilities = model.predict_proba(&set.features)?;
    validate_probabilities(&probabilities)?;
    Ok(evaluate(&set.labels, &probabilities, ks, mrr_cutoff)?)
}

// ============================================================================
// TRAIN
// ============================================================================

/// Full training run with any `RankingModel`
pub fn train_with<M: RankingModel>(
    mut model: M,
    corpus: &[CircuitObservation],
    config: &TrainingConfig,
) -> Result<ArtifactBundle<M>, TrainingError> {
    let split = split_corpus(corpus, &config.split())?;
    log::info!(
        "Split {} rows: train={} validation={} test={}",
        split.len(),
        split.train.len(),
        split.validation.len(),
        split.test.len()
    );

    let encoders = EncoderRegistry::fit(&split.train);
    let aggregates = AggregateTable::build(&split.train);
    if encoders.num_classes() < 2 {
        return Err(ModelError::InsufficientClasses(encoders.num_classes()).into());
    }

    let defaults = &config.inference_defaults;
    let (training_rows, metrics) = {
        let engineer = FeatureEngineer::new(&encoders, &aggregates, defaults);
        let (train_set, _) = build_labelled_set(&engineer, &encoders, &split.train, false);
        let (validation_set, _) = build_labelled_set(&engineer, &encoders, &split.validation, false);

        let validation = (!validation_set.is_empty()).then_some(&validation_set);
        model.fit_with_validation(&train_set, validation)?;

        let (test_set, _) = build_labelled_set(&engineer, &encoders, &split.test, false);
        let metrics = if test_set.is_empty() {
            log::warn!("Test partition is empty, artifact will carry no metrics");
            None
        } else {
            Some(evaluate_model(&model, &test_set, &config.eval_ks, config.mrr_cutoff)?)
        };
        (train_set.len(), metrics)
    };

    let mut bundle = ArtifactBundle::new(model, encoders, aggregates)
        .with_defaults(defaults.clone())
        .with_training_rows(training_rows);
    if let Some(metrics) = metrics {
        bundle = bundle.with_metrics(metrics);
    }

    log::info!(
        "Training complete: artifact {} ({} classes, {} rows)",
        bundle.manifest.artifact_id,
        bundle.manifest.num_classes,
        training_rows
    );
    Ok(bundle)
}

pub fn train_softmax(
    corpus: &[CircuitObservation],
    config: &TrainingConfig,
) -> Result<ArtifactBundle<SoftmaxRegression>, TrainingError> {
    train_with(SoftmaxRegression::new(config.softmax()), corpus, config)
}

/// Score an existing bundle on a labelled corpus
pub fn evaluate_bundle<M: RankingModel>(
    bundle: &ArtifactBundle<M>,
    observations: &[CircuitObservation],
    ks: &[usize],
    mrr_cutoff: usize,
    serving_path: bool,
) -> Result<EvaluationReport, TrainingError> {
    let engineer = FeatureEngineer::new(&bundle.encoders, &bundle.aggregates, bundle.defaults());
    let (set, _) = build_labelled_set(&engineer, &bundle.encoders, observations, serving_path);
    evaluate_model(&bundle.model, &set, ks, mrr_cutoff)
}

// ============================================================================
// FEATURE EXPORT
// ============================================================================

/// Write the engineered matrix as CSV: layout columns + `guard_label`
/// (-1 when the guard is not a known class). Returns the row count.
pub fn export_features<W: Write>(
    writer: W,
    encoders: &EncoderRegistry,
    aggregates: &AggregateTable,
    defaults: &InferenceDefaults,
    observations: &[CircuitObservation],
) -> Result<usize, TrainingError> {
    let engineer = FeatureEngineer::new(encoders, aggregates, defaults);
    let mut csv = csv::Writer::from_writer(writer);

    let mut header: Vec<&str> = FEATURE_LAYOUT.to_vec();
    header.push("guard_label");
    csv.write_record(&header)?;

    for obs in observations {
        let fv = engineer.transform(obs);
        let label = obs
            .guard_fingerprint()
            .and_then(|fp| encoders.target().map(|t| t.encode(fp)))
            .unwrap_or(UNKNOWN_INDEX);

        let mut record: Vec<String> = fv.values.iter().map(|v| v.to_string()).collect();
        record.push(label.to_string());
        csv.write_record(&record)?;
    }
    csv.flush()?;

    log::info!("Exported {} feature rows", observations.len());
    Ok(observations.len())
}
