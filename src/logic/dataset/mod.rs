//! Dataset Module - Circuit corpus ingestion
//!
//! Reads the headered circuit CSV produced by the traffic collectors and
//! turns each row into a `CircuitObservation`.
//!
//! # Architecture
//! - `types.rs`: `CircuitObservation`, `RelayInfo`, `RelayRole`
//! - `split.rs`: seeded, guard-stratified train/validation/test split
//! - `relays.rs`: optional relay metadata used for prediction labels

pub mod types;
pub mod split;
pub mod relays;

use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};

pub use relays::{RelayDirectory, RelayMetadata};
pub use split::{split_corpus, CorpusSplit, SplitConfig};
pub use types::{CircuitObservation, RelayInfo, RelayRole};

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV Error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Corpus is empty: {0}")]
    Empty(String),
    #[error("Invalid split configuration: {0}")]
    InvalidSplit(String),
    #[error("Pattern error: {0}")]
    Pattern(#[from] regex::Error),
}

// ============================================================================
// CSV RECORD
// ============================================================================

/// One CSV row, column names as written by the collectors
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitRecord {
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub circuit_id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub status: Option<String>,

    pub guard_fingerprint: String,
    #[serde(default)]
    pub guard_nickname: String,
    #[serde(default)]
    pub guard_address: String,
    #[serde(default)]
    pub guard_country: String,

    pub middle_fingerprint: String,
    #[serde(default)]
    pub middle_nickname: String,
    #[serde(default)]
    pub middle_address: String,
    #[serde(default)]
    pub middle_country: String,

    pub exit_fingerprint: String,
    #[serde(default)]
    pub exit_nickname: String,
    #[serde(default)]
    pub exit_address: String,
    #[serde(default)]
    pub exit_country: String,

    #[serde(default)]
    pub build_time: Option<String>,
    #[serde(default)]
    pub purpose: Option<String>,

    #[serde(default)]
    pub guard_bandwidth: Option<f64>,
    #[serde(default)]
    pub middle_bandwidth: Option<f64>,
    #[serde(default)]
    pub exit_bandwidth: Option<f64>,
    #[serde(default)]
    pub circuit_setup_duration: Option<f64>,
    #[serde(default)]
    pub total_bytes: Option<f64>,
}

impl CircuitRecord {
    /// Missing numeric cells become NaN; the engineer fills them later
    pub fn into_observation(self) -> CircuitObservation {
        let num = |v: Option<f64>| v.unwrap_or(f64::NAN);

        CircuitObservation {
            circuit_id: self.circuit_id,
            guard: Some(RelayInfo {
                fingerprint: self.guard_fingerprint,
                nickname: self.guard_nickname,
                address: self.guard_address,
                country: self.guard_country,
                bandwidth: num(self.guard_bandwidth),
            }),
            middle: RelayInfo {
                fingerprint: self.middle_fingerprint,
                nickname: self.middle_nickname,
                address: self.middle_address,
                country: self.middle_country,
                bandwidth: num(self.middle_bandwidth),
            },
            exit: RelayInfo {
                fingerprint: self.exit_fingerprint,
                nickname: self.exit_nickname,
                address: self.exit_address,
                country: self.exit_country,
                bandwidth: num(self.exit_bandwidth),
            },
            setup_duration: num(self.circuit_setup_duration),
            total_bytes: num(self.total_bytes),
            status: self.status,
            purpose: self.purpose,
            timestamp: self.timestamp,
            build_time: self.build_time,
        }
    }
}

// ============================================================================
// LOADING
// ============================================================================

/// Read observations from any CSV source with a header row
pub fn read_corpus<R: Read>(reader: R) -> Result<Vec<CircuitObservation>, DatasetError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut observations = Vec::new();
    for row in csv_reader.deserialize::<CircuitRecord>() {
        observations.push(row?.into_observation());
    }

    Ok(observations)
}

/// Load the circuit corpus from disk
pub fn load_corpus(path: &Path) -> Result<Vec<CircuitObservation>, DatasetError> {
    log::info!("Loading circuit corpus from: {}", path.display());

    let file = File::open(path)?;
    let observations = read_corpus(file)?;

    if observations.is_empty() {
        return Err(DatasetError::Empty(path.display().to_string()));
    }

    log::info!("Loaded {} circuits", observations.len());
    Ok(observations)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "request_id,circuit_id,timestamp,status,guard_fingerprint,guard_nickname,guard_address,guard_country,middle_fingerprint,middle_nickname,middle_address,middle_country,exit_fingerprint,exit_nickname,exit_address,exit_country,build_time,purpose,guard_bandwidth,middle_bandwidth,exit_bandwidth,circuit_setup_duration,total_bytes";

    #[test]
    fn test_read_corpus_row() {
        let csv = format!(
            "{}\n1,c1,2025-11-20T22:19:59,BUILT,G1,guardA,10.0.0.1,US,M1,midA,10.0.0.2,DE,E1,exitA,10.0.0.3,FR,2025-11-20T22:19:58,GENERAL,8.5,7.0,6.5,1.2,50000\n",
            HEADER
        );

        let observations = read_corpus(csv.as_bytes()).unwrap();
        assert_eq!(observations.len(), 1);

        let obs = &observations[0];
        assert_eq!(obs.circuit_id.as_deref(), Some("c1"));
        assert_eq!(obs.guard_fingerprint(), Some("G1"));
        assert_eq!(obs.middle.country, "DE");
        assert_eq!(obs.exit.bandwidth, 6.5);
        assert_eq!(obs.total_bytes, 50000.0);
    }

    #[test]
    fn test_empty_numeric_cell_becomes_nan() {
        let csv = format!(
            "{}\n1,c1,,BUILT,G1,,,US,M1,,,DE,E1,,,FR,,GENERAL,,7.0,6.5,1.2,50000\n",
            HEADER
        );

        let observations = read_corpus(csv.as_bytes()).unwrap();
        let guard = observations[0].guard.as_ref().unwrap();
        assert!(guard.bandwidth.is_nan());
    }

    #[test]
    fn test_load_missing_file() {
        let result = load_corpus(Path::new("/nonexistent/corpus.csv"));
        assert!(matches!(result, Err(DatasetError::Io(_))));
    }
}
