//! Feature Vector
//!
//! One engineered circuit, stamped with the layout it was built against so
//! a model can refuse rows produced under a different schema.

use serde::{Deserialize, Serialize};
use super::layout::{layout_hash, validate_layout, LayoutMismatchError, FEATURE_COUNT, FEATURE_VERSION};

/// Produced only by the feature engineer. Training and serving both go
/// through this type, never through a raw `Vec<f64>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub version: u8,
    pub layout_hash: u32,
    /// Indexed by the `IDX_*` constants
    pub values: [f64; FEATURE_COUNT],
}

impl FeatureVector {
    /// All-zero vector under the current layout
    pub fn new() -> Self {
        Self::from_values([0.0; FEATURE_COUNT])
    }

    pub fn from_values(values: [f64; FEATURE_COUNT]) -> Self {
        Self {
            version: FEATURE_VERSION,
            layout_hash: layout_hash(),
            values,
        }
    }

    pub fn get(&self, index: usize) -> Option<f64> {
        self.values.get(index).copied()
    }

    /// Out-of-range indices are ignored
    pub fn set(&mut self, index: usize, value: f64) {
        if let Some(slot) = self.values.get_mut(index) {
            *slot = value;
        }
    }

    /// Error if this vector was engineered under another layout
    pub fn check_layout(&self) -> Result<(), LayoutMismatchError> {
        validate_layout(self.version, self.layout_hash)
    }

    /// Bitwise equality (NaN-safe, -0.0 != 0.0)
    pub fn bit_identical(&self, other: &FeatureVector) -> bool {
        self.version == other.version
            && self.layout_hash == other.layout_hash
            && self.values.iter().zip(other.values.iter()).all(|(a, b)| a.to_bits() == b.to_bits())
    }
}

impl Default for FeatureVector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_vector_matches_layout() {
        let fv = FeatureVector::new();
        assert_eq!(fv.version, FEATURE_VERSION);
        assert!(fv.check_layout().is_ok());
        assert!(fv.values.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_set_ignores_out_of_range() {
        let mut fv = FeatureVector::new();
        fv.set(3, 42.0);
        fv.set(FEATURE_COUNT, 1.0);
        assert_eq!(fv.get(3), Some(42.0));
        assert_eq!(fv.get(FEATURE_COUNT), None);
    }

    #[test]
    fn test_bit_identical_distinguishes_signed_zero() {
        let a = FeatureVector::from_values([1.5; FEATURE_COUNT]);
        assert!(a.bit_identical(&a.clone()));

        let mut b = a.clone();
        b.values[3] = -0.0;
        let mut c = a.clone();
        c.values[3] = 0.0;
        assert!(!b.bit_identical(&c));
    }

    #[test]
    fn test_stale_vector_is_rejected() {
        let mut fv = FeatureVector::new();
        fv.version = FEATURE_VERSION + 1;
        assert!(fv.check_layout().is_err());

        let mut fv = FeatureVector::new();
        fv.layout_hash ^= 1;
        assert!(fv.check_layout().is_err());
    }
}
