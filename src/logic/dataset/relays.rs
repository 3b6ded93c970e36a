//! Relay metadata lookup (nickname / address / country per fingerprint).
//!
//! Optional enrichment for prediction labels. Read from the same headered
//! CSV as the corpus; only the guard columns are used. A missing entry
//! degrades to a placeholder label and is never an error.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::DatasetError;

/// Relay fingerprints are 40 hex characters
pub const FINGERPRINT_PATTERN: &str = r"^[0-9A-Fa-f]{40}$";

pub const UNKNOWN_FIELD: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayMetadata {
    pub fingerprint: String,
    pub nickname: String,
    pub address: String,
    pub country: String,
}

impl RelayMetadata {
    /// Label for a candidate with no metadata entry
    pub fn placeholder(fingerprint: &str, class_index: usize) -> Self {
        Self {
            fingerprint: fingerprint.to_string(),
            nickname: format!("GuardNode{:03}", class_index),
            address: UNKNOWN_FIELD.to_string(),
            country: UNKNOWN_FIELD.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GuardColumns {
    guard_fingerprint: String,
    #[serde(default)]
    guard_nickname: String,
    #[serde(default)]
    guard_address: String,
    #[serde(default)]
    guard_country: String,
}

#[derive(Debug, Clone, Default)]
pub struct RelayDirectory {
    relays: HashMap<String, RelayMetadata>,
}

impl RelayDirectory {
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, DatasetError> {
        let pattern = Regex::new(FINGERPRINT_PATTERN)?;
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut relays = HashMap::new();
        let mut rejected = 0usize;
        for row in csv_reader.deserialize::<GuardColumns>() {
            let row = match row {
                Ok(row) => row,
                Err(e) if e.is_io_error() => return Err(e.into()),
                Err(e) => {
                    log::debug!("Relay metadata: skipping unreadable row: {}", e);
                    rejected += 1;
                    continue;
                }
            };
            if !pattern.is_match(&row.guard_fingerprint) {
                rejected += 1;
                continue;
            }
            let non_empty = |s: String| if s.is_empty() { UNKNOWN_FIELD.to_string() } else { s };
            // Last occurrence wins
            relays.insert(
                row.guard_fingerprint.clone(),
                RelayMetadata {
                    fingerprint: row.guard_fingerprint,
                    nickname: row.guard_nickname,
                    address: non_empty(row.guard_address),
                    country: non_empty(row.guard_country),
                },
            );
        }

        if rejected > 0 {
            log::warn!("Relay metadata: ignored {} malformed rows", rejected);
        }
        Ok(Self { relays })
    }

    pub fn load(path: &Path) -> Result<Self, DatasetError> {
        let directory = Self::from_reader(File::open(path)?)?;
        log::info!("Loaded metadata for {} relays from {}", directory.len(), path.display());
        Ok(directory)
    }

    pub fn get(&self, fingerprint: &str) -> Option<&RelayMetadata> {
        self.relays.get(fingerprint)
    }

    /// Metadata entry or the synthesized placeholder
    pub fn label_for(&self, fingerprint: &str, class_index: usize) -> RelayMetadata {
        match self.relays.get(fingerprint) {
            Some(meta) if !meta.nickname.is_empty() => meta.clone(),
            Some(meta) => RelayMetadata {
                nickname: format!("GuardNode{:03}", class_index),
                ..meta.clone()
            },
            None => RelayMetadata::placeholder(fingerprint, class_index),
        }
    }

    pub fn len(&self) -> usize {
        self.relays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relays.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FP_A: &str = "A1B2C3D4E5F60718293A4B5C6D7E8F9012345678";
    const FP_B: &str = "0000000000000000000000000000000000000000";

    fn csv() -> String {
        format!(
            "guard_fingerprint,guard_nickname,guard_address,guard_country,exit_fingerprint\n\
             {},alpha,192.0.2.1,US,X\n\
             {},,,,X\n\
             not-a-fingerprint,bad,192.0.2.9,DE,X\n",
            FP_A, FP_B
        )
    }

    #[test]
    fn test_load_and_lookup() {
        let dir = RelayDirectory::from_reader(csv().as_bytes()).unwrap();
        assert_eq!(dir.len(), 2);

        let a = dir.get(FP_A).unwrap();
        assert_eq!(a.nickname, "alpha");
        assert_eq!(a.country, "US");
        assert!(dir.get("not-a-fingerprint").is_none());
    }

    #[test]
    fn test_placeholder_labels() {
        let dir = RelayDirectory::from_reader(csv().as_bytes()).unwrap();

        let missing = dir.label_for("FFFF", 7);
        assert_eq!(missing.nickname, "GuardNode007");
        assert_eq!(missing.address, "Unknown");
        assert_eq!(missing.country, "Unknown");

        // Present but blank nickname
        let blank = dir.label_for(FP_B, 12);
        assert_eq!(blank.nickname, "GuardNode012");
        assert_eq!(blank.country, "Unknown");

        assert_eq!(dir.label_for(FP_A, 0).nickname, "alpha");
    }

    #[test]
    fn test_ragged_rows_are_skipped() {
        let csv = format!(
            "guard_fingerprint,guard_nickname\n{},alpha,extra\n{},beta\n",
            FP_A, FP_B
        );
        let dir = RelayDirectory::from_reader(csv.as_bytes()).unwrap();
        assert_eq!(dir.len(), 1);
        assert!(dir.get(FP_A).is_none());
        assert_eq!(dir.get(FP_B).unwrap().nickname, "beta");
    }

    #[test]
    fn test_empty_directory() {
        let dir = RelayDirectory::default();
        assert!(dir.is_empty());
        assert_eq!(dir.label_for(FP_A, 1).nickname, "GuardNode001");
    }
}
