use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::logic::dataset::{CircuitObservation, RelayInfo};
use crate::logic::explain::ExplainResult;
use crate::logic::features::InferenceDefaults;
use crate::logic::model::EvaluationReport;

// ============================================================================
// REQUEST
// ============================================================================

/// Partial circuit evidence from a client. The guard is what we predict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRequest {
    pub exit_fingerprint: String,
    pub exit_country: String,
    /// MB/s; 0 or missing means unknown
    #[serde(default)]
    pub bandwidth: f64,
    /// Circuit setup time in seconds
    #[serde(default)]
    pub setup_time: f64,
    #[serde(default)]
    pub middle_fingerprint: Option<String>,
    #[serde(default)]
    pub middle_country: Option<String>,
    /// Candidates to return; service default when absent
    #[serde(default)]
    pub k: Option<i64>,
    #[serde(default)]
    pub explain: bool,
}

impl PredictionRequest {
    pub fn new(exit_fingerprint: &str, exit_country: &str, bandwidth: f64, setup_time: f64) -> Self {
        Self {
            exit_fingerprint: exit_fingerprint.to_string(),
            exit_country: exit_country.to_string(),
            bandwidth,
            setup_time,
            middle_fingerprint: None,
            middle_country: None,
            k: None,
            explain: false,
        }
    }

    /// Serving-path observation: no guard, request fields + defaults
    pub fn to_observation(&self, defaults: &InferenceDefaults) -> CircuitObservation {
        let known_bandwidth = self.bandwidth > 0.0;
        let exit_bandwidth = if known_bandwidth { self.bandwidth } else { defaults.exit_bandwidth };
        let total_bytes = if known_bandwidth {
            self.bandwidth * self.setup_time * defaults.bytes_per_mb
        } else {
            defaults.total_bytes
        };

        let middle_fingerprint = self
            .middle_fingerprint
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(&defaults.unknown_fingerprint);
        let middle_country = self
            .middle_country
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(&defaults.unknown_country);

        CircuitObservation {
            circuit_id: None,
            guard: None,
            middle: RelayInfo::new(middle_fingerprint, middle_country, defaults.middle_bandwidth),
            exit: RelayInfo::new(&self.exit_fingerprint, &self.exit_country, exit_bandwidth),
            setup_duration: self.setup_time,
            total_bytes,
            status: None,
            purpose: None,
            timestamp: None,
            build_time: None,
        }
    }
}

// ============================================================================
// RESPONSE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardPrediction {
    /// 1-based
    pub rank: usize,
    pub class_index: usize,
    pub fingerprint: String,
    pub nickname: String,
    pub address: String,
    pub country: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub predictions: Vec<GuardPrediction>,
    pub explanation: Option<ExplainResult>,
    pub k: usize,
    pub prediction_time_ms: f64,
    pub model_version: String,
}

// ============================================================================
// STATE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    Uninitialized,
    Loading,
    Ready,
    Failed,
}

impl ServiceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceState::Uninitialized => "uninitialized",
            ServiceState::Loading => "loading",
            ServiceState::Ready => "ready",
            ServiceState::Failed => "failed",
        }
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Engine Status for clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStatus {
    pub state: ServiceState,
    pub artifact_id: Option<String>,
    pub num_classes: usize,
    pub feature_version: u8,
    pub layout_hash: u32,
    pub feature_count: usize,
    pub inference_count: u64,
    pub avg_latency_ms: f64,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub model_type: String,
    pub num_classes: usize,
    pub feature_count: usize,
    pub feature_names: Vec<String>,
    pub artifact_id: String,
    pub artifact_version: String,
    pub created_at: DateTime<Utc>,
    pub training_rows: usize,
    pub metrics: Option<EvaluationReport>,
}
