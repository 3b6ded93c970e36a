//! Explain Module - per-prediction feature attribution

pub mod engine;
pub mod types;

pub use engine::{explain, DEFAULT_TOP_N};
pub use types::{ExplainResult, FeatureContribution, Impact};
