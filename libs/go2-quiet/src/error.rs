//! Error types for reward evaluation and task configuration.

use thiserror::Error;

/// Errors raised at the boundary between the simulator state and the reward terms.
///
/// Every variant is a setup problem (a misnamed sensor, a body index that does
/// not exist, a malformed config). None of them is recoverable at step time.
#[derive(Debug, Error)]
pub enum RewardError {
    #[error("unknown contact sensor: {0}")]
    UnknownSensor(String),

    #[error("unknown articulation: {0}")]
    UnknownAsset(String),

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("body index {index} out of range for {entity} ({available} bodies)")]
    BodyIndexOutOfRange {
        entity: String,
        index: usize,
        available: usize,
    },

    #[error("shape mismatch in {what}: expected {expected}, got {actual}")]
    ShapeMismatch {
        what: String,
        expected: String,
        actual: String,
    },

    #[error("entity {entity} has no resolved bodies")]
    EmptyBodySelection { entity: String },

    #[error("body pattern {pattern:?} matched nothing on {entity}")]
    UnmatchedBodyPattern { entity: String, pattern: String },

    #[error("invalid body pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("unknown task id: {0}")]
    UnknownTask(String),

    #[error("config parse error: {0}")]
    Config(#[from] serde_json::Error),
}

impl RewardError {
    pub fn shape(what: impl Into<String>, expected: impl ToString, actual: impl ToString) -> Self {
        Self::ShapeMismatch {
            what: what.into(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}
