//! Prediction Service - Serving state machine
//!
//! `Uninitialized → Loading → Ready`, with a terminal `Failed`.
//!
//! The loaded bundle lives in an immutable `PredictionContext` behind an
//! `Arc`. Each request clones the `Arc` under a short read lock and computes
//! without holding it; hot reload builds a new context off the lock and
//! swaps the pointer.

pub mod types;
#[cfg(test)]
mod tests;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;

use crate::config::Config;
use crate::logic::artifact::{self, validate_bundle, ArtifactBundle, ArtifactError};
use crate::logic::dataset::{CircuitObservation, RelayDirectory};
use crate::logic::explain;
use crate::logic::features::layout::{layout_hash, FEATURE_VERSION};
use crate::logic::features::{FeatureEngineer, FEATURE_COUNT};
use crate::logic::model::inference::validate_probability_row;
use crate::logic::model::{top_k, validate_k, ModelError, RankingError, RankingModel, SoftmaxRegression};

pub use types::{EngineStatus, GuardPrediction, ModelInfo, PredictionRequest, PredictionResult, ServiceState};

// ============================================================================
// ERROR HANDLING
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("service not ready (state: {state})")]
    NotReady { state: ServiceState },
    #[error("service failed to load and refuses predictions: {reason}")]
    Failed { reason: String },
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error(transparent)]
    InvalidK(#[from] RankingError),
    #[error("model error: {0}")]
    Model(#[from] ModelError),
    #[error("artifact error: {0}")]
    Artifact(#[from] ArtifactError),
    #[error("class index {0} has no guard identity")]
    UnknownClass(usize),
}

// ============================================================================
// CONTEXT
// ============================================================================

/// Everything a prediction reads. Built once, never mutated.
pub struct PredictionContext<M> {
    bundle: ArtifactBundle<M>,
    relays: RelayDirectory,
    importance: BTreeMap<String, f64>,
}

impl<M: RankingModel> PredictionContext<M> {
    pub fn new(bundle: ArtifactBundle<M>, relays: RelayDirectory) -> Result<Self, ServiceError> {
        validate_bundle(&bundle)?;
        let importance = bundle
            .feature_importance
            .clone()
            .unwrap_or_else(|| bundle.model.feature_importance());
        Ok(Self { bundle, relays, importance })
    }

    pub fn bundle(&self) -> &ArtifactBundle<M> {
        &self.bundle
    }

    fn predict(
        &self,
        observation: &CircuitObservation,
        k: usize,
        explain_top_n: Option<usize>,
    ) -> Result<(Vec<GuardPrediction>, Option<explain::ExplainResult>), ServiceError> {
        let bundle = &self.bundle;
        let engineer = FeatureEngineer::new(&bundle.encoders, &bundle.aggregates, bundle.defaults());
        let features = engineer.transform(observation);

        let probabilities = bundle.model.predict_proba(std::slice::from_ref(&features))?;
        if probabilities.nrows() != 1 || probabilities.ncols() != bundle.manifest.num_classes {
            return Err(ModelError::DimensionMismatch {
                expected: bundle.manifest.num_classes,
                actual: probabilities.ncols(),
            }
            .into());
        }
        let row = probabilities.row(0);
        validate_probability_row(row, 0)?;

        let predictions = top_k(row, k)?
            .into_iter()
            .enumerate()
            .map(|(position, (class, confidence))| {
                let fingerprint = bundle.class_identity(class).ok_or(ServiceError::UnknownClass(class))?;
                let meta = self.relays.label_for(fingerprint, class);
                Ok(GuardPrediction {
                    rank: position + 1,
                    class_index: class,
                    fingerprint: meta.fingerprint,
                    nickname: meta.nickname,
                    address: meta.address,
                    country: meta.country,
                    confidence,
                })
            })
            .collect::<Result<Vec<_>, ServiceError>>()?;

        let explanation = explain_top_n.and_then(|n| explain::explain(&self.importance, &features, n));
        Ok((predictions, explanation))
    }
}

// ============================================================================
// SERVICE
// ============================================================================

enum Slot<M> {
    Uninitialized,
    Loading,
    Ready(Arc<PredictionContext<M>>),
    Failed(String),
}

impl<M> Slot<M> {
    fn state(&self) -> ServiceState {
        match self {
            Slot::Uninitialized => ServiceState::Uninitialized,
            Slot::Loading => ServiceState::Loading,
            Slot::Ready(_) => ServiceState::Ready,
            Slot::Failed(_) => ServiceState::Failed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceSettings {
    pub default_k: usize,
    pub explain_top_n: usize,
}

impl From<&Config> for ServiceSettings {
    fn from(config: &Config) -> Self {
        Self {
            default_k: config.top_k,
            explain_top_n: config.explain_top_n,
        }
    }
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            default_k: crate::constants::DEFAULT_TOP_K,
            explain_top_n: explain::DEFAULT_TOP_N,
        }
    }
}

pub struct PredictionService<M = SoftmaxRegression> {
    slot: RwLock<Slot<M>>,
    settings: ServiceSettings,
    inference_count: AtomicU64,
    latency_us_sum: AtomicU64,
}

impl<M: RankingModel> PredictionService<M> {
    pub fn new(settings: ServiceSettings) -> Self {
        Self {
            slot: RwLock::new(Slot::Uninitialized),
            settings,
            inference_count: AtomicU64::new(0),
            latency_us_sum: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> ServiceState {
        self.slot.read().state()
    }

    /// Move `Uninitialized → Loading`, refusing every other state
    fn begin_load(&self) -> Result<(), ServiceError> {
        let mut slot = self.slot.write();
        match &*slot {
            Slot::Uninitialized => {
                *slot = Slot::Loading;
                Ok(())
            }
            Slot::Failed(reason) => Err(ServiceError::Failed { reason: reason.clone() }),
            other => Err(ServiceError::NotReady { state: other.state() }),
        }
    }

    /// Initial load. On any error the service becomes `Failed` for good.
    pub fn load(&self, bundle: ArtifactBundle<M>, relays: RelayDirectory) -> Result<(), ServiceError> {
        self.begin_load()?;
        self.finish_load(PredictionContext::new(bundle, relays))
    }

    fn finish_load(&self, context: Result<PredictionContext<M>, ServiceError>) -> Result<(), ServiceError> {
        match context {
            Ok(context) => {
                log::info!(
                    "Prediction service ready: artifact {} ({} classes)",
                    context.bundle.manifest.artifact_id,
                    context.bundle.manifest.num_classes
                );
                *self.slot.write() = Slot::Ready(Arc::new(context));
                Ok(())
            }
            Err(e) => {
                log::error!("Prediction service failed to load: {}", e);
                *self.slot.write() = Slot::Failed(e.to_string());
                Err(e)
            }
        }
    }

    /// Swap in a new bundle while `Ready`. A failed reload keeps the
    /// current context serving.
    pub fn reload(&self, bundle: ArtifactBundle<M>, relays: RelayDirectory) -> Result<(), ServiceError> {
        self.ready_context()?;
        let context = PredictionContext::new(bundle, relays).map_err(|e| {
            log::warn!("Reload rejected, keeping current artifact: {}", e);
            e
        })?;

        let mut slot = self.slot.write();
        // Re-check: state could only have stayed Ready, but never resurrect
        if !matches!(&*slot, Slot::Ready(_)) {
            return Err(ServiceError::NotReady { state: slot.state() });
        }
        log::info!("Hot reload: now serving artifact {}", context.bundle.manifest.artifact_id);
        *slot = Slot::Ready(Arc::new(context));
        Ok(())
    }

    fn ready_context(&self) -> Result<Arc<PredictionContext<M>>, ServiceError> {
        match &*self.slot.read() {
            Slot::Ready(context) => Ok(Arc::clone(context)),
            Slot::Failed(reason) => Err(ServiceError::Failed { reason: reason.clone() }),
            other => Err(ServiceError::NotReady { state: other.state() }),
        }
    }

    /// Rank guards for a client request
    pub fn predict(&self, request: &PredictionRequest) -> Result<PredictionResult, ServiceError> {
        let context = self.ready_context()?;

        let k = match request.k {
            Some(k) => validate_k(k)?,
            None => self.settings.default_k,
        };
        if request.exit_fingerprint.trim().is_empty() {
            return Err(ServiceError::InvalidRequest("exit_fingerprint is required".to_string()));
        }
        if !request.setup_time.is_finite() || request.setup_time < 0.0 {
            return Err(ServiceError::InvalidRequest(format!(
                "setup_time must be a non-negative number, got {}",
                request.setup_time
            )));
        }

        let observation = request.to_observation(context.bundle.defaults());
        let explain_top_n = request.explain.then_some(self.settings.explain_top_n);
        self.run(&context, &observation, k, explain_top_n)
    }

    /// Rank guards for an already-built observation (guard is ignored if set)
    pub fn predict_observation(
        &self,
        observation: &CircuitObservation,
        k: usize,
    ) -> Result<PredictionResult, ServiceError> {
        let context = self.ready_context()?;
        if k == 0 {
            return Err(RankingError::InvalidK(0).into());
        }
        self.run(&context, &observation.without_guard(), k, None)
    }

    fn run(
        &self,
        context: &PredictionContext<M>,
        observation: &CircuitObservation,
        k: usize,
        explain_top_n: Option<usize>,
    ) -> Result<PredictionResult, ServiceError> {
        let started = Instant::now();
        let (predictions, explanation) = context.predict(observation, k, explain_top_n)?;
        let elapsed = started.elapsed();

        self.inference_count.fetch_add(1, Ordering::Relaxed);
        self.latency_us_sum.fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
        log::debug!("Predicted {} candidates in {:?}", predictions.len(), elapsed);

        Ok(PredictionResult {
            k: predictions.len(),
            predictions,
            explanation,
            prediction_time_ms: elapsed.as_secs_f64() * 1000.0,
            model_version: context.bundle.manifest.version_label(),
        })
    }

    pub fn status(&self) -> EngineStatus {
        let (state, artifact_id, num_classes, last_error) = match &*self.slot.read() {
            Slot::Ready(context) => {
                let m = &context.bundle.manifest;
                (ServiceState::Ready, Some(m.artifact_id.clone()), m.num_classes, None)
            }
            Slot::Failed(reason) => (ServiceState::Failed, None, 0, Some(reason.clone())),
            other => (other.state(), None, 0, None),
        };

        let sum = self.latency_us_sum.load(Ordering::Relaxed);
        let count = self.inference_count.load(Ordering::Relaxed);
        let avg = if count > 0 { (sum as f64 / count as f64) / 1000.0 } else { 0.0 };

        EngineStatus {
            state,
            artifact_id,
            num_classes,
            feature_version: FEATURE_VERSION,
            layout_hash: layout_hash(),
            feature_count: FEATURE_COUNT,
            inference_count: count,
            avg_latency_ms: avg,
            last_error,
        }
    }

    pub fn model_info(&self) -> Result<ModelInfo, ServiceError> {
        let context = self.ready_context()?;
        let bundle = &context.bundle;
        let m = &bundle.manifest;
        Ok(ModelInfo {
            model_type: m.model_type.clone(),
            num_classes: m.num_classes,
            feature_count: m.feature_names.len(),
            feature_names: m.feature_names.clone(),
            artifact_id: m.artifact_id.clone(),
            artifact_version: m.version_label(),
            created_at: m.created_at,
            training_rows: m.training_rows,
            metrics: bundle.metrics.clone(),
        })
    }
}

impl<M: RankingModel + DeserializeOwned> PredictionService<M> {
    /// Initial load from an artifact directory. Read, checksum and schema
    /// errors all leave the service `Failed`.
    pub fn load_from_dir(
        &self,
        dir: &Path,
        metadata: Option<&Path>,
        aggregates_override: Option<&Path>,
    ) -> Result<(), ServiceError> {
        self.begin_load()?;
        let context = read_context(dir, metadata, aggregates_override);
        self.finish_load(context)
    }

    /// Hot reload from an artifact directory
    pub fn reload_from_dir(&self, dir: &Path, metadata: Option<&Path>) -> Result<(), ServiceError> {
        self.ready_context()?;
        let bundle = artifact::load_bundle::<M>(dir)?;
        self.reload(bundle, read_relays(metadata))
    }
}

/// Metadata only enriches labels: an unreadable file degrades to placeholders
fn read_relays(metadata: Option<&Path>) -> RelayDirectory {
    let Some(path) = metadata else {
        return RelayDirectory::default();
    };
    RelayDirectory::load(path).unwrap_or_else(|e| {
        log::warn!("Relay metadata {} unavailable, using placeholder labels: {}", path.display(), e);
        RelayDirectory::default()
    })
}

fn read_context<M: RankingModel + DeserializeOwned>(
    dir: &Path,
    metadata: Option<&Path>,
    aggregates_override: Option<&Path>,
) -> Result<PredictionContext<M>, ServiceError> {
    let mut bundle = artifact::load_bundle::<M>(dir)?;
    if let Some(path) = aggregates_override {
        bundle.aggregates = artifact::load_aggregates_override(path, &bundle.manifest)?;
    }
    PredictionContext::new(bundle, read_relays(metadata))
}
