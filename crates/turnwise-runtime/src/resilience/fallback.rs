//! What to do when the judge cannot answer.

use serde::{Deserialize, Serialize};

/// Fallback for a precondition the judge could not decide.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackStrategy {
    /// Use the rule's keyword heuristic; unmet when the rule has none
    #[default]
    Heuristic,

    /// Treat the precondition as unmet
    AssumeUnmet,
}

/// What to do when a rule judgment fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JudgeFailurePolicy {
    /// Fail the whole conversation
    #[default]
    Abort,

    /// Drop the rule/turn pair and note it under `skipped_rules`
    SkipRule,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_names() {
        let policy: JudgeFailurePolicy = serde_yaml::from_str("skip_rule").unwrap();
        assert_eq!(policy, JudgeFailurePolicy::SkipRule);

        let strategy: FallbackStrategy = serde_yaml::from_str("assume_unmet").unwrap();
        assert_eq!(strategy, FallbackStrategy::AssumeUnmet);
        assert_eq!(FallbackStrategy::default(), FallbackStrategy::Heuristic);
    }
}
