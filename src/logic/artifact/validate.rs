use std::path::PathBuf;

use crate::logic::features::layout::{validate_feature_names, validate_layout, LayoutMismatchError};
use crate::logic::features::AggregateTable;
use crate::logic::model::{ModelError, RankingModel};
use super::types::{ArtifactBundle, ArtifactManifest, ARTIFACT_FORMAT_VERSION};

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Artifact file missing: {0}")]
    MissingFile(PathBuf),
    #[error("Checksum mismatch for {file}: manifest {expected}, actual {actual}")]
    ChecksumMismatch {
        file: String,
        expected: String,
        actual: String,
    },
    #[error("Unsupported artifact format v{found} (supported: v{supported})")]
    UnsupportedFormat { found: u32, supported: u32 },
    #[error(transparent)]
    Layout(#[from] LayoutMismatchError),
    #[error("Model expects {actual} inputs but the artifact declares {expected} features")]
    InputWidth { expected: usize, actual: usize },
    #[error("Class count mismatch: manifest {manifest}, model {model}, target encoder {encoder}")]
    ClassCount {
        manifest: usize,
        model: usize,
        encoder: usize,
    },
    #[error("Model parameters are inconsistent: {0}")]
    Model(#[from] ModelError),
    #[error("Refusing to overwrite {0}: not an artifact bundle directory")]
    NotABundle(PathBuf),
}

/// Format + feature schema checks; no model needed
pub fn validate_manifest(manifest: &ArtifactManifest) -> Result<(), ArtifactError> {
    if manifest.format_version != ARTIFACT_FORMAT_VERSION {
        return Err(ArtifactError::UnsupportedFormat {
            found: manifest.format_version,
            supported: ARTIFACT_FORMAT_VERSION,
        });
    }
    // Length and order first: those errors name the offending feature
    validate_feature_names(&manifest.feature_names)?;
    validate_layout(manifest.feature_version, manifest.layout_hash)?;
    Ok(())
}

/// Everything that must agree before a bundle can serve
pub fn validate_bundle<M: RankingModel>(bundle: &ArtifactBundle<M>) -> Result<(), ArtifactError> {
    let manifest = &bundle.manifest;
    validate_manifest(manifest)?;

    bundle.model.check_state()?;

    let width = bundle.model.input_width();
    if width != manifest.feature_names.len() {
        return Err(ArtifactError::InputWidth {
            expected: manifest.feature_names.len(),
            actual: width,
        });
    }

    let (model, encoder) = (bundle.model.num_classes(), bundle.encoders.num_classes());
    if model != manifest.num_classes || encoder != manifest.num_classes {
        return Err(ArtifactError::ClassCount {
            manifest: manifest.num_classes,
            model,
            encoder,
        });
    }

    check_aggregates(manifest, &bundle.aggregates);
    Ok(())
}

/// A table that does not belong to this model degrades quality but is not
/// fatal: log it and keep going
pub fn check_aggregates(manifest: &ArtifactManifest, aggregates: &AggregateTable) -> bool {
    if !aggregates.is_intact() {
        log::warn!("Aggregate table content does not match its own digest");
        return false;
    }
    if aggregates.digest() != manifest.aggregates_digest {
        log::warn!(
            "Aggregate table {} was not built with artifact {} (expected {})",
            aggregates.digest(),
            manifest.artifact_id,
            manifest.aggregates_digest
        );
        return false;
    }
    true
}
