//! Central Configuration Constants
//!
//! Single source of truth for all configuration defaults.

/// App version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// App name
pub const APP_NAME: &str = "guard-ranker";

/// Directory under the platform data dir
pub const APP_DIR_NAME: &str = "guard-ranker";

/// Default number of ranked candidates per prediction
pub const DEFAULT_TOP_K: usize = 10;

/// Default size of the explainability block
pub const DEFAULT_EXPLAIN_TOP_N: usize = 5;

/// K values reported by evaluation
pub const DEFAULT_EVAL_KS: [usize; 6] = [1, 3, 5, 10, 20, 50];

/// MRR is reported at this cutoff
pub const DEFAULT_MRR_CUTOFF: usize = 50;

/// Environment variable names
pub const ENV_ARTIFACT_DIR: &str = "GUARD_RANKER_ARTIFACT_DIR";
pub const ENV_METADATA_PATH: &str = "GUARD_RANKER_METADATA_PATH";
pub const ENV_TOP_K: &str = "GUARD_RANKER_TOP_K";
pub const ENV_EXPLAIN_TOP_N: &str = "GUARD_RANKER_EXPLAIN_TOP_N";
