//! Configuration module

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::logic::artifact::get_default_artifact_dir;
use crate::logic::dataset::SplitConfig;
use crate::logic::features::InferenceDefaults;
use crate::logic::model::SoftmaxConfig;

/// Serving configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Artifact bundle directory
    pub artifact_dir: PathBuf,

    /// Optional relay metadata CSV
    pub metadata_path: Option<PathBuf>,

    /// Candidates returned when a request does not say
    pub top_k: usize,

    /// Explainability block size
    pub explain_top_n: usize,
}

impl Config {
    /// Load configuration from environment variables (and `.env` if present)
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        Self {
            artifact_dir: env::var(ENV_ARTIFACT_DIR)
                .map(PathBuf::from)
                .unwrap_or_else(|_| get_default_artifact_dir()),

            metadata_path: env::var(ENV_METADATA_PATH)
                .ok()
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),

            top_k: env::var(ENV_TOP_K)
                .ok()
                .and_then(|k| k.parse().ok())
                .filter(|&k| k > 0)
                .unwrap_or(DEFAULT_TOP_K),

            explain_top_n: env::var(ENV_EXPLAIN_TOP_N)
                .ok()
                .and_then(|n| n.parse().ok())
                .unwrap_or(DEFAULT_EXPLAIN_TOP_N),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            artifact_dir: get_default_artifact_dir(),
            metadata_path: None,
            top_k: DEFAULT_TOP_K,
            explain_top_n: DEFAULT_EXPLAIN_TOP_N,
        }
    }
}

// ============================================================================
// TRAINING
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub learning_rate: f64,
    pub max_epochs: usize,
    pub l2: f64,
    pub patience: usize,
    pub seed: u64,
    pub validation_fraction: f64,
    pub test_fraction: f64,
    pub eval_ks: Vec<usize>,
    pub mrr_cutoff: usize,
    pub inference_defaults: InferenceDefaults,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        let model = SoftmaxConfig::default();
        let split = SplitConfig::default();
        Self {
            learning_rate: model.learning_rate,
            max_epochs: model.max_epochs,
            l2: model.l2,
            patience: model.patience,
            seed: split.seed,
            validation_fraction: split.validation_fraction,
            test_fraction: split.test_fraction,
            eval_ks: DEFAULT_EVAL_KS.to_vec(),
            mrr_cutoff: DEFAULT_MRR_CUTOFF,
            inference_defaults: InferenceDefaults::default(),
        }
    }
}

impl TrainingConfig {
    /// Read from a JSON file; missing fields take their defaults
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let data = fs::read(path)?;
        Ok(serde_json::from_slice(&data)?)
    }

    pub fn split(&self) -> SplitConfig {
        SplitConfig {
            validation_fraction: self.validation_fraction,
            test_fraction: self.test_fraction,
            seed: self.seed,
        }
    }

    pub fn softmax(&self) -> SoftmaxConfig {
        SoftmaxConfig {
            learning_rate: self.learning_rate,
            max_epochs: self.max_epochs,
            l2: self.l2,
            patience: self.patience,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_training_defaults() {
        let c = TrainingConfig::default();
        assert_eq!(c.learning_rate, 0.1);
        assert_eq!(c.max_epochs, 300);
        assert_eq!(c.patience, 20);
        assert_eq!(c.seed, 42);
        assert_eq!(c.eval_ks, vec![1, 3, 5, 10, 20, 50]);
        assert_eq!(c.mrr_cutoff, 50);
    }

    #[test]
    fn test_partial_training_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("train.json");
        fs::write(&path, r#"{"max_epochs": 12, "inference_defaults": {"guard_bandwidth": 3.0}}"#).unwrap();

        let c = TrainingConfig::from_file(&path).unwrap();
        assert_eq!(c.max_epochs, 12);
        assert_eq!(c.learning_rate, 0.1);
        assert_eq!(c.inference_defaults.guard_bandwidth, 3.0);
        assert_eq!(c.inference_defaults.guard_country, "US");
        assert_eq!(c.softmax().max_epochs, 12);
        assert_eq!(c.split().seed, 42);
    }

    #[test]
    fn test_bad_training_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("train.json");
        fs::write(&path, "not json").unwrap();
        assert!(matches!(TrainingConfig::from_file(&path), Err(ConfigError::Parse(_))));
    }
}
