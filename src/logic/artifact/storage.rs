use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::logic::features::{AggregateTable, EncoderRegistry};
use crate::logic::model::{EvaluationReport, RankingModel};
use super::types::*;
use super::validate::{check_aggregates, validate_bundle, validate_manifest, ArtifactError};

/// Get default artifact directory
pub fn get_default_artifact_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(crate::constants::APP_DIR_NAME)
        .join("artifacts")
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

// ============================================================================
// SAVE
// ============================================================================

/// Write the bundle as a set: every file goes to a staging directory that
/// is renamed over `dir` only once all of them are on disk.
pub fn save_bundle<M>(bundle: &mut ArtifactBundle<M>, dir: &Path) -> Result<(), ArtifactError>
where
    M: RankingModel + Serialize,
{
    validate_bundle(bundle)?;

    let mut files: Vec<(&str, Vec<u8>)> = vec![
        (MODEL_FILE, serde_json::to_vec_pretty(&bundle.model)?),
        (ENCODERS_FILE, serde_json::to_vec_pretty(&bundle.encoders)?),
        (AGGREGATES_FILE, serde_json::to_vec_pretty(&bundle.aggregates)?),
    ];
    if let Some(metrics) = &bundle.metrics {
        files.push((METRICS_FILE, serde_json::to_vec_pretty(metrics)?));
    }
    if let Some(importance) = &bundle.feature_importance {
        files.push((IMPORTANCE_FILE, serde_json::to_vec_pretty(importance)?));
    }

    bundle.manifest.checksums = files
        .iter()
        .map(|(name, bytes)| (name.to_string(), sha256_hex(bytes)))
        .collect();
    files.push((MANIFEST_FILE, serde_json::to_vec_pretty(&bundle.manifest)?));

    if dir.exists() && !is_bundle_dir(dir)? {
        return Err(ArtifactError::NotABundle(dir.to_path_buf()));
    }

    let staging = staging_path(dir);
    if let Some(parent) = staging.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::create_dir_all(&staging)?;
    for (name, bytes) in &files {
        fs::write(staging.join(name), bytes)?;
    }

    if dir.exists() {
        fs::remove_dir_all(dir)?;
    }
    fs::rename(&staging, dir)?;

    log::info!(
        "Artifact {} saved to {} ({} files)",
        bundle.manifest.artifact_id,
        dir.display(),
        files.len()
    );
    Ok(())
}

/// Empty directories and previous bundles may be replaced, anything else not
fn is_bundle_dir(dir: &Path) -> Result<bool, ArtifactError> {
    if dir.join(MANIFEST_FILE).is_file() {
        return Ok(true);
    }
    Ok(fs::read_dir(dir)?.next().is_none())
}

fn staging_path(dir: &Path) -> PathBuf {
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "artifact".to_string());
    dir.with_file_name(format!(".{}.staging-{}", name, uuid::Uuid::new_v4()))
}

// ============================================================================
// LOAD
// ============================================================================

pub fn load_manifest(dir: &Path) -> Result<ArtifactManifest, ArtifactError> {
    let path = dir.join(MANIFEST_FILE);
    if !path.is_file() {
        return Err(ArtifactError::MissingFile(path));
    }
    let manifest: ArtifactManifest = serde_json::from_slice(&fs::read(&path)?)?;
    Ok(manifest)
}

/// Read one bundle file, verifying its checksum against the manifest
fn read_verified(dir: &Path, manifest: &ArtifactManifest, name: &str) -> Result<Vec<u8>, ArtifactError> {
    let path = dir.join(name);
    let expected = manifest
        .checksums
        .get(name)
        .ok_or_else(|| ArtifactError::MissingFile(path.clone()))?;
    if !path.is_file() {
        return Err(ArtifactError::MissingFile(path));
    }

    let bytes = fs::read(&path)?;
    let actual = sha256_hex(&bytes);
    if &actual != expected {
        return Err(ArtifactError::ChecksumMismatch {
            file: name.to_string(),
            expected: expected.clone(),
            actual,
        });
    }
    Ok(bytes)
}

fn read_optional<T: DeserializeOwned>(
    dir: &Path,
    manifest: &ArtifactManifest,
    name: &str,
) -> Result<Option<T>, ArtifactError> {
    if !manifest.checksums.contains_key(name) {
        return Ok(None);
    }
    let bytes = read_verified(dir, manifest, name)?;
    Ok(Some(serde_json::from_slice(&bytes)?))
}

/// Load and fully validate a bundle. Any checksum or schema problem is an
/// error; an aggregate digest mismatch is only logged.
pub fn load_bundle<M>(dir: &Path) -> Result<ArtifactBundle<M>, ArtifactError>
where
    M: RankingModel + DeserializeOwned,
{
    let manifest = load_manifest(dir)?;
    validate_manifest(&manifest)?;

    let model: M = serde_json::from_slice(&read_verified(dir, &manifest, MODEL_FILE)?)?;
    let encoders: EncoderRegistry = serde_json::from_slice(&read_verified(dir, &manifest, ENCODERS_FILE)?)?;
    let aggregates: AggregateTable = serde_json::from_slice(&read_verified(dir, &manifest, AGGREGATES_FILE)?)?;
    let metrics: Option<EvaluationReport> = read_optional(dir, &manifest, METRICS_FILE)?;
    let feature_importance: Option<BTreeMap<String, f64>> = read_optional(dir, &manifest, IMPORTANCE_FILE)?;

    let bundle = ArtifactBundle {
        manifest,
        model,
        encoders,
        aggregates,
        metrics,
        feature_importance,
    };
    validate_bundle(&bundle)?;

    log::info!(
        "Artifact {} loaded from {} ({} classes, {})",
        bundle.manifest.artifact_id,
        dir.display(),
        bundle.manifest.num_classes,
        bundle.manifest.model_type
    );
    Ok(bundle)
}

/// Replace the bundled aggregate table with an external one
pub fn load_aggregates_override(path: &Path, manifest: &ArtifactManifest) -> Result<AggregateTable, ArtifactError> {
    if !path.is_file() {
        return Err(ArtifactError::MissingFile(path.to_path_buf()));
    }
    let table: AggregateTable = serde_json::from_slice(&fs::read(path)?)?;
    check_aggregates(manifest, &table);
    Ok(table)
}
