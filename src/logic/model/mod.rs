//! Model Module - Ranking Inference Engine
//!
//! Keeps the classifier behind a trait so it can be swapped without touching
//! feature engineering or serving.

pub mod inference;
pub mod softmax;
pub mod topk;
pub mod evaluate;

// Re-export common types
pub use evaluate::{evaluate, mrr, top_k_accuracy, EvaluationReport};
pub use inference::{validate_probabilities, ModelError, RankingModel, TrainingSet};
pub use softmax::{SoftmaxConfig, SoftmaxRegression};
pub use topk::{top_k, validate_k, RankingError};
