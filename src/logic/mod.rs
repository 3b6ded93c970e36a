//! Logic Module - Ranking engines
//!
//! - `dataset/` - Corpus ingestion, stratified split, relay metadata
//! - `features/` - Encoders, historical aggregates, feature engineer
//! - `model/` - Ranking model trait, softmax classifier, top-K, evaluation
//! - `explain/` - Importance-based explanations
//! - `artifact/` - Versioned, checksummed model bundles
//! - `service/` - Serving state machine
//! - `training.rs` - Offline training pipeline

pub mod dataset;
pub mod features;
pub mod model;
pub mod explain;
pub mod artifact;
pub mod service;
pub mod training;
