use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::logic::features::layout::{feature_names, layout_hash, FEATURE_VERSION};
use crate::logic::features::{AggregateTable, EncoderRegistry, InferenceDefaults};
use crate::logic::model::{EvaluationReport, RankingModel};

// ============================================================================
// BUNDLE FILES
// ============================================================================

pub const MANIFEST_FILE: &str = "manifest.json";
pub const MODEL_FILE: &str = "model.json";
pub const ENCODERS_FILE: &str = "encoders.json";
pub const AGGREGATES_FILE: &str = "aggregates.json";
pub const METRICS_FILE: &str = "metrics.json";
pub const IMPORTANCE_FILE: &str = "feature_importance.json";

pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

// ============================================================================
// MANIFEST
// ============================================================================

/// Everything needed to decide whether a bundle can be served, without
/// deserializing the model itself
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub artifact_id: String,
    pub format_version: u32,
    pub created_at: DateTime<Utc>,
    pub model_type: String,

    // Feature schema the model was trained against
    pub feature_version: u8,
    pub layout_hash: u32,
    pub feature_names: Vec<String>,

    pub num_classes: usize,
    pub aggregates_digest: String,
    #[serde(default)]
    pub training_rows: usize,
    #[serde(default)]
    pub inference_defaults: InferenceDefaults,

    /// file name → SHA-256 hex
    #[serde(default)]
    pub checksums: BTreeMap<String, String>,
}

impl ArtifactManifest {
    pub fn new(model_type: &str, num_classes: usize, aggregates_digest: &str) -> Self {
        Self {
            artifact_id: uuid::Uuid::new_v4().to_string(),
            format_version: ARTIFACT_FORMAT_VERSION,
            created_at: Utc::now(),
            model_type: model_type.to_string(),
            feature_version: FEATURE_VERSION,
            layout_hash: layout_hash(),
            feature_names: feature_names(),
            num_classes,
            aggregates_digest: aggregates_digest.to_string(),
            training_rows: 0,
            inference_defaults: InferenceDefaults::default(),
            checksums: BTreeMap::new(),
        }
    }

    /// Short version label reported with every prediction
    pub fn version_label(&self) -> String {
        let short: String = self.artifact_id.chars().take(8).collect();
        format!("{}-{}", self.model_type, short)
    }
}

// ============================================================================
// BUNDLE
// ============================================================================

/// Model + the fitted state it cannot be served without. Loaded and saved
/// as one unit.
#[derive(Debug, Clone)]
pub struct ArtifactBundle<M> {
    pub manifest: ArtifactManifest,
    pub model: M,
    pub encoders: EncoderRegistry,
    pub aggregates: AggregateTable,
    pub metrics: Option<EvaluationReport>,
    /// Importance snapshot taken at training time. Served for explanations
    /// when present; the model is asked again only when it is missing.
    pub feature_importance: Option<BTreeMap<String, f64>>,
}

impl<M: RankingModel> ArtifactBundle<M> {
    pub fn new(model: M, encoders: EncoderRegistry, aggregates: AggregateTable) -> Self {
        let manifest = ArtifactManifest::new(model.model_type(), model.num_classes(), aggregates.digest());
        let feature_importance = Some(model.feature_importance());
        Self {
            manifest,
            model,
            encoders,
            aggregates,
            metrics: None,
            feature_importance,
        }
    }

    pub fn with_defaults(mut self, defaults: InferenceDefaults) -> Self {
        self.manifest.inference_defaults = defaults;
        self
    }

    pub fn with_metrics(mut self, metrics: EvaluationReport) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_training_rows(mut self, rows: usize) -> Self {
        self.manifest.training_rows = rows;
        self
    }

    pub fn defaults(&self) -> &InferenceDefaults {
        &self.manifest.inference_defaults
    }

    /// Guard fingerprint for a class index
    pub fn class_identity(&self, class: usize) -> Option<&str> {
        self.encoders
            .target()
            .and_then(|t| t.classes().get(class))
            .map(String::as_str)
    }
}
