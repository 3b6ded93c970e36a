//! Features Module - Feature Engineering Engine
//!
//! Turns raw circuit observations into the fixed-order vector the ranking
//! model consumes. Fitted state (encoders, aggregates) is built once from
//! the training partition and frozen.
//!
//! # Architecture
//! - `layout.rs`: authoritative feature order, version and hash
//! - `vector.rs`: `FeatureVector`
//! - `encoder.rs`: categorical encoder registry (sentinel -1 for unseen)
//! - `aggregates.rs`: historical aggregate table
//! - `engineer.rs`: the transform shared by training and serving

pub mod layout;
pub mod vector;
pub mod encoder;
pub mod aggregates;
pub mod engineer;


// Re-export common types
pub use aggregates::{AggregateTable, PairKind};
pub use encoder::{CategoricalEncoder, CategoricalField, EncoderError, EncoderRegistry, UNKNOWN_INDEX};
pub use engineer::{FeatureEngineer, InferenceDefaults, BANDWIDTH_STABILIZER};
pub use layout::{feature_name, FEATURE_COUNT, FEATURE_LAYOUT, LayoutMismatchError};
pub use vector::FeatureVector;
