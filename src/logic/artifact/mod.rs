//! Artifact Module - Versioned model bundles
//!
//! A trained model is only servable together with the encoders and the
//! aggregate table it was fitted with. This module persists all of them as
//! one checksummed directory.
//!
//! # Architecture
//! - `types.rs`: `ArtifactManifest`, `ArtifactBundle`
//! - `validate.rs`: schema/width/class checks, `ArtifactError`
//! - `storage.rs`: save/load with SHA-256 verification
//!
//! # Failure Strategy
//! Checksum or feature layout mismatch on load -> refuse the bundle.
//! Aggregate digest mismatch -> warn and serve.

pub mod types;
pub mod validate;
pub mod storage;

pub use storage::{get_default_artifact_dir, load_aggregates_override, load_bundle, load_manifest, save_bundle};
pub use types::{ArtifactBundle, ArtifactManifest};
pub use validate::{check_aggregates, validate_bundle, validate_manifest, ArtifactError};
