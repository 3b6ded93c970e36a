use serde::{Deserialize, Serialize};

/// Qualitative bucket for a normalized importance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    High,
    Medium,
    Low,
}

impl Impact {
    /// > 0.7 high, > 0.4 medium, else low
    pub fn from_normalized(importance: f64) -> Self {
        if importance > 0.7 {
            Impact::High
        } else if importance > 0.4 {
            Impact::Medium
        } else {
            Impact::Low
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureContribution {
    pub name: String,
    pub importance: f64, // normalized by the max, in (0, 1]
    pub value: f64,
    pub impact: Impact,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplainResult {
    pub contributions: Vec<FeatureContribution>,
}
