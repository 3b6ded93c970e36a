//! Categorical Encoder Registry
//!
//! Dense value → index mapping per categorical column, fitted once on the
//! training partition and immutable afterwards.
//!
//! Indices are assigned in order of first encounter, so the same corpus
//! always yields the same table. Values never seen during fit encode to
//! `UNKNOWN_INDEX` (-1); that sentinel has no inverse.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::logic::dataset::CircuitObservation;

/// Encoding of a value unseen at fit time. `decode(UNKNOWN_INDEX)` is "unknown",
/// reported as `EncoderError::Unknown`.
pub const UNKNOWN_INDEX: i64 = -1;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncoderError {
    #[error("index {index} out of range [0, {len})")]
    OutOfRange { index: i64, len: usize },
    #[error("sentinel index -1 denotes an unknown category and has no value")]
    Unknown,
    #[error("duplicate class '{0}' in persisted encoder")]
    DuplicateClass(String),
}

// ============================================================================
// SINGLE ENCODER
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct CategoricalEncoder {
    classes: Vec<String>,
    index: HashMap<String, usize>,
}

impl CategoricalEncoder {
    /// Fit on a sequence of raw values; duplicates reuse their first index
    pub fn fit<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut encoder = Self::default();
        for value in values {
            let value = value.as_ref();
            if !encoder.index.contains_key(value) {
                encoder.index.insert(value.to_string(), encoder.classes.len());
                encoder.classes.push(value.to_string());
            }
        }
        encoder
    }

    /// Index of `value`, or `UNKNOWN_INDEX` when it was never seen
    pub fn encode(&self, value: &str) -> i64 {
        self.index
            .get(value)
            .map(|&i| i as i64)
            .unwrap_or(UNKNOWN_INDEX)
    }

    /// Checked lookup for callers that need a class index (training labels)
    pub fn index_of(&self, value: &str) -> Option<usize> {
        self.index.get(value).copied()
    }

    pub fn decode(&self, index: i64) -> Result<&str, EncoderError> {
        if index == UNKNOWN_INDEX {
            return Err(EncoderError::Unknown);
        }
        usize::try_from(index)
            .ok()
            .and_then(|i| self.classes.get(i))
            .map(String::as_str)
            .ok_or(EncoderError::OutOfRange {
                index,
                len: self.classes.len(),
            })
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

impl TryFrom<Vec<String>> for CategoricalEncoder {
    type Error = EncoderError;

    fn try_from(classes: Vec<String>) -> Result<Self, Self::Error> {
        let mut index = HashMap::with_capacity(classes.len());
        for (i, class) in classes.iter().enumerate() {
            if index.insert(class.clone(), i).is_some() {
                return Err(EncoderError::DuplicateClass(class.clone()));
            }
        }
        Ok(Self { classes, index })
    }
}

impl From<CategoricalEncoder> for Vec<String> {
    fn from(encoder: CategoricalEncoder) -> Self {
        encoder.classes
    }
}

// ============================================================================
// REGISTRY
// ============================================================================

/// Categorical columns with a fitted encoder. `GuardFingerprint` is the
/// prediction target and is never an input feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoricalField {
    MiddleFingerprint,
    ExitFingerprint,
    GuardCountry,
    MiddleCountry,
    ExitCountry,
    GuardFingerprint,
}

impl CategoricalField {
    pub const ALL: [CategoricalField; 6] = [
        CategoricalField::MiddleFingerprint,
        CategoricalField::ExitFingerprint,
        CategoricalField::GuardCountry,
        CategoricalField::MiddleCountry,
        CategoricalField::ExitCountry,
        CategoricalField::GuardFingerprint,
    ];

    /// Raw value of this column in an observation; guard columns are
    /// absent on the serving path
    fn value_of<'a>(&self, obs: &'a CircuitObservation) -> Option<&'a str> {
        match self {
            CategoricalField::MiddleFingerprint => Some(obs.middle.fingerprint.as_str()),
            CategoricalField::ExitFingerprint => Some(obs.exit.fingerprint.as_str()),
            CategoricalField::MiddleCountry => Some(obs.middle.country.as_str()),
            CategoricalField::ExitCountry => Some(obs.exit.country.as_str()),
            CategoricalField::GuardCountry => obs.guard.as_ref().map(|g| g.country.as_str()),
            CategoricalField::GuardFingerprint => obs.guard_fingerprint(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderRegistry {
    encoders: BTreeMap<CategoricalField, CategoricalEncoder>,
}

impl EncoderRegistry {
    /// Fit every categorical column on the training partition
    pub fn fit(training: &[CircuitObservation]) -> Self {
        let encoders = CategoricalField::ALL
            .iter()
            .map(|field| {
                let encoder = CategoricalEncoder::fit(training.iter().filter_map(|obs| field.value_of(obs)));
                log::debug!("Encoder {:?}: {} classes", field, encoder.len());
                (*field, encoder)
            })
            .collect();

        Self { encoders }
    }

    pub fn get(&self, field: CategoricalField) -> Option<&CategoricalEncoder> {
        self.encoders.get(&field)
    }

    /// Never fails: a missing encoder behaves like an empty one
    pub fn encode(&self, field: CategoricalField, value: &str) -> i64 {
        self.encoders
            .get(&field)
            .map(|e| e.encode(value))
            .unwrap_or(UNKNOWN_INDEX)
    }

    /// Class index ↔ guard identity mapping
    pub fn target(&self) -> Option<&CategoricalEncoder> {
        self.get(CategoricalField::GuardFingerprint)
    }

    pub fn num_classes(&self) -> usize {
        self.target().map(CategoricalEncoder::len).unwrap_or(0)
    }
}
