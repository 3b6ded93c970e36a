//! Commands - train / evaluate / predict / info / export

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::{Config, TrainingConfig};
use crate::logic::artifact::{self, ArtifactManifest};
use crate::logic::dataset::load_corpus;
use crate::logic::model::{EvaluationReport, SoftmaxRegression};
use crate::logic::service::{
    EngineStatus, ModelInfo, PredictionRequest, PredictionResult, PredictionService, ServiceSettings,
};
use crate::logic::training;

// ============================================================================
// TRAIN
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainSummary {
    pub artifact_dir: PathBuf,
    pub manifest: ArtifactManifest,
    pub metrics: Option<EvaluationReport>,
}

pub fn train(corpus: &Path, out_dir: &Path, config_file: Option<&Path>) -> Result<TrainSummary> {
    let config = match config_file {
        Some(path) => TrainingConfig::from_file(path)
            .with_context(|| format!("reading training config {}", path.display()))?,
        None => TrainingConfig::default(),
    };

    let observations = load_corpus(corpus).with_context(|| format!("loading corpus {}", corpus.display()))?;
    let mut bundle = training::train_softmax(&observations, &config).context("training failed")?;
    artifact::save_bundle(&mut bundle, out_dir)
        .with_context(|| format!("writing artifact to {}", out_dir.display()))?;

    Ok(TrainSummary {
        artifact_dir: out_dir.to_path_buf(),
        manifest: bundle.manifest,
        metrics: bundle.metrics,
    })
}

// ============================================================================
// EVALUATE
// ============================================================================

pub fn evaluate(
    artifact_dir: &Path,
    corpus: &Path,
    ks: &[usize],
    mrr_cutoff: usize,
    serving_path: bool,
) -> Result<EvaluationReport> {
    if ks.is_empty() {
        bail!("at least one K is required");
    }
    let bundle = artifact::load_bundle::<SoftmaxRegression>(artifact_dir)
        .with_context(|| format!("loading artifact {}", artifact_dir.display()))?;
    let observations = load_corpus(corpus).with_context(|| format!("loading corpus {}", corpus.display()))?;

    if serving_path {
        log::info!("Evaluating with the guard hidden (serving path)");
    }
    training::evaluate_bundle(&bundle, &observations, ks, mrr_cutoff, serving_path).context("evaluation failed")
}

// ============================================================================
// PREDICT / INFO
// ============================================================================

fn ready_service(config: &Config) -> Result<PredictionService> {
    let service = PredictionService::new(ServiceSettings::from(config));
    service
        .load_from_dir(&config.artifact_dir, config.metadata_path.as_deref(), None)
        .with_context(|| format!("loading artifact {}", config.artifact_dir.display()))?;
    Ok(service)
}

pub fn predict(config: &Config, request: &PredictionRequest) -> Result<PredictionResult> {
    let service = ready_service(config)?;
    service.predict(request).context("prediction failed")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfoReport {
    pub model: ModelInfo,
    pub status: EngineStatus,
}

pub fn info(config: &Config) -> Result<InfoReport> {
    let service = ready_service(config)?;
    Ok(InfoReport {
        model: service.model_info()?,
        status: service.status(),
    })
}

// ============================================================================
// EXPORT
// ============================================================================

/// Engineer the corpus with the artifact's encoders and aggregates
pub fn export_features(artifact_dir: &Path, corpus: &Path, output: Option<&Path>) -> Result<usize> {
    let bundle = artifact::load_bundle::<SoftmaxRegression>(artifact_dir)
        .with_context(|| format!("loading artifact {}", artifact_dir.display()))?;
    let observations = load_corpus(corpus).with_context(|| format!("loading corpus {}", corpus.display()))?;

    let writer: Box<dyn Write> = match output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("creating {}", path.display()))?,
        )),
        None => Box::new(std::io::stdout().lock()),
    };

    let rows = training::export_features(writer, &bundle.encoders, &bundle.aggregates, bundle.defaults(), &observations)
        .context("feature export failed")?;
    Ok(rows)
}
