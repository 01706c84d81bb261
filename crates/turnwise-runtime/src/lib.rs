//! # turnwise-runtime
//!
//! Judge-driven evaluation of dialogue transcripts.
//!
//! `turnwise-core` decides everything that can be decided without a model:
//! tags, applicability, deterministic checks, aggregation. This crate adds
//! the parts that need one:
//! - an LLM judge for described rules and preconditions
//! - `N = auto` resolution
//! - the interactive and golden-history engines
//! - JSONL batch runs
//!
//! Judge failures are never scored. Depending on
//! [`JudgeFailurePolicy`], a failed judge call aborts the case or skips the
//! rule, and is reported either way.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use turnwise_runtime::{Engine, ProviderRegistry, RuntimeConfig};
//!
//! let config = RuntimeConfig::from_file("turnwise.yaml")?;
//! let engine = Engine::builder()
//!     .config(config)
//!     .connect(&ProviderRegistry::with_defaults())?
//!     .build()?;
//!
//! let report = engine.evaluate_interactive(&case).await?;
//! println!("total score: {}", report.summary.total_score);
//! ```

pub mod batch;
pub mod cache;
pub mod config;
pub mod engine;
pub mod evaluator;
pub mod generation;
pub mod judge;
pub mod precondition;
pub mod prompts;
pub mod providers;
pub mod resilience;

#[cfg(test)]
mod testing;

pub use batch::{
    read_cases, BatchOutput, BatchRunner, BatchSummary, CaseOutcome, CaseResult, EntryDetail,
    EntryStatus, EvaluationMode, LineError,
};
pub use cache::{CacheConfig, CachedJudge, JudgeCache};
pub use config::{BatchConfig, ConfigError, ModelConfig, RuntimeConfig};
pub use engine::{Engine, EngineBuilder, EngineError};
pub use evaluator::{EvaluatorError, RuleEvaluator, TurnContext};
pub use generation::{strip_reasoning, ResponseGenerator};
pub use judge::{FnJudge, Judge, JudgeCall, JudgeError, JudgeVerdict, LlmJudge, UnavailableJudge};
pub use precondition::{
    resolve_n, PreconditionAnswer, PreconditionChain, PreconditionError, PreconditionSource,
};
pub use providers::{
    ApiCredential, ChatMessage, CompletionConfig, CompletionResponse, LlmProvider,
    ProviderError, ProviderFactory, ProviderRegistry, TokenUsage,
};
pub use resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitState, FallbackStrategy, JudgeFailurePolicy,
    LlmUsage, RetryPolicy, UsageTracker,
};

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use turnwise_core::EvaluationCase;

    #[tokio::test]
    async fn test_offline_engine_runs_deterministic_rules() {
        let engine = Engine::builder().build().unwrap();
        let case: EvaluationCase = serde_json::from_value(json!({
            "messages": [
                {"role": "user", "content": "我今年70岁，血糖高"},
                {"role": "assistant", "content": "您好！空腹多少？餐后多少？"}
            ],
            "rule_list": ["single_turn:ask:multi_question", "single_turn:sty:gratitude"]
        }))
        .unwrap();

        // gratitude needs the judge, which is absent
        let err = engine.evaluate_interactive(&case).await.unwrap_err();
        assert!(matches!(err, EngineError::Evaluation(_)));

        let config = RuntimeConfig {
            on_judge_failure: JudgeFailurePolicy::SkipRule,
            ..RuntimeConfig::default()
        };
        let engine = Engine::builder().config(config).build().unwrap();
        let report = engine.evaluate_interactive(&case).await.unwrap();
        assert_eq!(report.summary.total_score, -1);
        assert_eq!(report.skipped_rules.len(), 1);
    }

    #[tokio::test]
    async fn test_llm_judge_through_engine() {
        let provider = Arc::new(testing::ScriptedProvider::always("TRIGGERED"));
        let usage = Arc::new(UsageTracker::new());
        let judge = LlmJudge::new(provider.clone())
            .with_retry(RetryPolicy::none())
            .with_usage_tracker(usage.clone());
        let engine = Engine::builder()
            .judge(Arc::new(judge))
            .usage_tracker(usage)
            .build()
            .unwrap();

        let case: EvaluationCase = serde_json::from_value(json!({
            "messages": [
                {"role": "user", "content": "你好"},
                {"role": "assistant", "content": "感谢您的信任！"}
            ],
            "rule_list": ["single_turn:sty:gratitude"]
        }))
        .unwrap();

        let report = engine.evaluate_interactive(&case).await.unwrap();
        assert_eq!(report.summary.total_score, -1);
        assert_eq!(provider.calls(), 1);
        assert_eq!(engine.usage().llm_calls, 1);
    }
}
