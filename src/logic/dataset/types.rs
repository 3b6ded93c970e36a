use serde::{Deserialize, Serialize};

// ============================================================================
// RELAYS
// ============================================================================

/// Position of a relay inside a three-hop circuit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayRole {
    Guard,
    Middle,
    Exit,
}

impl RelayRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelayRole::Guard => "guard",
            RelayRole::Middle => "middle",
            RelayRole::Exit => "exit",
        }
    }
}

/// One relay as observed in a circuit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayInfo {
    pub fingerprint: String,
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub address: String,
    pub country: String,
    /// MB/s. NaN when the source cell was empty.
    pub bandwidth: f64,
}

impl RelayInfo {
    pub fn new(fingerprint: &str, country: &str, bandwidth: f64) -> Self {
        Self {
            fingerprint: fingerprint.to_string(),
            nickname: String::new(),
            address: String::new(),
            country: country.to_string(),
            bandwidth,
        }
    }
}

// ============================================================================
// CIRCUIT OBSERVATION
// ============================================================================

/// Raw circuit record, the single input type of the feature engineer.
///
/// `guard` is `Some` for training/evaluation records and `None` on the
/// serving path, where the guard is what we are predicting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitObservation {
    #[serde(default)]
    pub circuit_id: Option<String>,
    pub guard: Option<RelayInfo>,
    pub middle: RelayInfo,
    pub exit: RelayInfo,
    /// Seconds
    pub setup_duration: f64,
    pub total_bytes: f64,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub purpose: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub build_time: Option<String>,
}

impl CircuitObservation {
    /// Guard fingerprint, when known
    pub fn guard_fingerprint(&self) -> Option<&str> {
        self.guard.as_ref().map(|g| g.fingerprint.as_str())
    }

    /// Copy of this observation with the guard hidden, as the serving path sees it
    pub fn without_guard(&self) -> Self {
        Self {
            guard: None,
            ..self.clone()
        }
    }
}
