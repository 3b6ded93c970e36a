//! Feature Layout - the circuit feature schema
//!
//! The training pipeline, the persisted artifact and the prediction service
//! all read the same table below. A model trained against one layout can
//! never be served against another.
//!
//! Any change to `FEATURE_LAYOUT` (add, remove, reorder, rename) bumps
//! `FEATURE_VERSION`.

use crc32fast::Hasher;

pub const FEATURE_VERSION: u8 = 1;

// ============================================================================
// LAYOUT
// ============================================================================

/// Vector position of every feature, grouped by family
pub const FEATURE_LAYOUT: &[&str] = &[
    // === Bandwidth ratios (0-2) ===
    "bw_ratio_guard_middle",      // 0
    "bw_ratio_guard_exit",        // 1
    "bw_ratio_middle_exit",       // 2

    // === Bandwidth aggregates (3-6) ===
    "bw_total",                   // 3
    "bw_min",                     // 4
    "bw_max",                     // 5
    "bw_std",                     // 6: sample std over the 3 relays

    // === Geography (7-11) ===
    "same_country_guard_middle",  // 7
    "same_country_guard_exit",    // 8
    "same_country_middle_exit",   // 9
    "all_same_country",           // 10
    "country_diversity",          // 11: distinct countries / 3

    // === Historical aggregates (12-18) ===
    "guard_usage_freq",           // 12
    "middle_usage_freq",          // 13
    "exit_usage_freq",            // 14
    "guard_exit_pair_freq",       // 15
    "guard_avg_bandwidth",        // 16
    "guard_middle_pair_freq",     // 17
    "guard_prefers_exit_country", // 18

    // === Categorical encodings (19-23) ===
    "middle_fingerprint_encoded", // 19
    "exit_fingerprint_encoded",   // 20
    "guard_country_encoded",      // 21
    "middle_country_encoded",     // 22
    "exit_country_encoded",       // 23

    // === Interactions (24-25) ===
    "bw_guard_x_setup",           // 24
    "bw_total_x_bytes",           // 25

    // === Raw circuit measurements (26-30) ===
    "guard_bandwidth",            // 26
    "middle_bandwidth",           // 27
    "exit_bandwidth",             // 28
    "circuit_setup_duration",     // 29
    "total_bytes",                // 30
];

pub const FEATURE_COUNT: usize = 31;

// Named indices used by the engineer
pub const IDX_BW_RATIO_GUARD_MIDDLE: usize = 0;
pub const IDX_BW_RATIO_GUARD_EXIT: usize = 1;
pub const IDX_BW_RATIO_MIDDLE_EXIT: usize = 2;
pub const IDX_BW_TOTAL: usize = 3;
pub const IDX_BW_MIN: usize = 4;
pub const IDX_BW_MAX: usize = 5;
pub const IDX_BW_STD: usize = 6;
pub const IDX_SAME_COUNTRY_GUARD_MIDDLE: usize = 7;
pub const IDX_SAME_COUNTRY_GUARD_EXIT: usize = 8;
pub const IDX_SAME_COUNTRY_MIDDLE_EXIT: usize = 9;
pub const IDX_ALL_SAME_COUNTRY: usize = 10;
pub const IDX_COUNTRY_DIVERSITY: usize = 11;
pub const IDX_GUARD_USAGE_FREQ: usize = 12;
pub const IDX_MIDDLE_USAGE_FREQ: usize = 13;
pub const IDX_EXIT_USAGE_FREQ: usize = 14;
pub const IDX_GUARD_EXIT_PAIR_FREQ: usize = 15;
pub const IDX_GUARD_AVG_BANDWIDTH: usize = 16;
pub const IDX_GUARD_MIDDLE_PAIR_FREQ: usize = 17;
pub const IDX_GUARD_PREFERS_EXIT_COUNTRY: usize = 18;
pub const IDX_MIDDLE_FINGERPRINT_ENCODED: usize = 19;
pub const IDX_EXIT_FINGERPRINT_ENCODED: usize = 20;
pub const IDX_GUARD_COUNTRY_ENCODED: usize = 21;
pub const IDX_MIDDLE_COUNTRY_ENCODED: usize = 22;
pub const IDX_EXIT_COUNTRY_ENCODED: usize = 23;
pub const IDX_BW_GUARD_X_SETUP: usize = 24;
pub const IDX_BW_TOTAL_X_BYTES: usize = 25;
pub const IDX_GUARD_BANDWIDTH: usize = 26;
pub const IDX_MIDDLE_BANDWIDTH: usize = 27;
pub const IDX_EXIT_BANDWIDTH: usize = 28;
pub const IDX_CIRCUIT_SETUP_DURATION: usize = 29;
pub const IDX_TOTAL_BYTES: usize = 30;

// ============================================================================
// LAYOUT HASH
// ============================================================================

/// CRC32 over the version byte and the NUL-separated names. Stored in every
/// vector and manifest; any rename, reorder or insertion changes it.
pub fn layout_hash() -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(&[FEATURE_VERSION]);
    for name in FEATURE_LAYOUT {
        hasher.update(name.as_bytes());
        hasher.update(&[0]);
    }
    hasher.finalize()
}

/// Owned copy of the layout, as persisted in artifact manifests
pub fn feature_names() -> Vec<String> {
    FEATURE_LAYOUT.iter().map(|s| s.to_string()).collect()
}

// ============================================================================
// LAYOUT VALIDATION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LayoutMismatchError {
    #[error("Feature layout mismatch: expected v{expected_version} (hash: {expected_hash:08x}), got v{actual_version} (hash: {actual_hash:08x})")]
    Version {
        expected_version: u8,
        expected_hash: u32,
        actual_version: u8,
        actual_hash: u32,
    },
    #[error("Feature list length mismatch: engineer produces {expected}, artifact declares {actual}")]
    Length { expected: usize, actual: usize },
    #[error("Feature list order mismatch at position {position}: expected '{expected}', artifact declares '{actual}'")]
    Order {
        position: usize,
        expected: String,
        actual: String,
    },
}

/// Validate that a version/hash pair matches the current layout
pub fn validate_layout(incoming_version: u8, incoming_hash: u32) -> Result<(), LayoutMismatchError> {
    let current_hash = layout_hash();

    if incoming_version != FEATURE_VERSION || incoming_hash != current_hash {
        return Err(LayoutMismatchError::Version {
            expected_version: FEATURE_VERSION,
            expected_hash: current_hash,
            actual_version: incoming_version,
            actual_hash: incoming_hash,
        });
    }

    Ok(())
}

/// Validate a declared feature-name list against the layout, length first, then order
pub fn validate_feature_names<S: AsRef<str>>(declared: &[S]) -> Result<(), LayoutMismatchError> {
    if declared.len() != FEATURE_COUNT {
        return Err(LayoutMismatchError::Length {
            expected: FEATURE_COUNT,
            actual: declared.len(),
        });
    }

    for (position, (expected, actual)) in FEATURE_LAYOUT.iter().zip(declared).enumerate() {
        if *expected != actual.as_ref() {
            return Err(LayoutMismatchError::Order {
                position,
                expected: expected.to_string(),
                actual: actual.as_ref().to_string(),
            });
        }
    }

    Ok(())
}

// ============================================================================
// LOOKUP
// ============================================================================

pub fn feature_index(name: &str) -> Option<usize> {
    FEATURE_LAYOUT.iter().position(|&n| n == name)
}

pub fn feature_name(index: usize) -> Option<&'static str> {
    FEATURE_LAYOUT.get(index).copied()
}

// ============================================================================
// TESTS
// ============================================================================
