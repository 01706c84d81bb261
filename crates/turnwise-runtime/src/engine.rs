//! Conversation evaluation engine.
//!
//! Two modes over an [`EvaluationCase`]:
//!
//! - **Interactive**: every assistant reply in the transcript is evaluated
//!   against every rule that applies to its turn, turn by turn in order.
//!   FIRST_N rules are then folded and the conversation is scored.
//! - **Golden history**: the history is fixed and ends with a user message.
//!   Single-turn rules judge one new reply (given or generated); multi-turn
//!   rules judge the existing reply at their target position.

use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

use turnwise_core::{
    applies_to, finalize_first_n, locate_golden_target, parse_rule_list, render_messages,
    require_n, summarize, user_text, Applicability, ApplicabilityError, Catalog, CatalogError,
    Conversation, ConversationReport, EvaluationCase, GoldenReport, GoldenTarget, KeywordExtractor,
    KwargsExtractor, ParsedRule, Role, RuleRecord, SkippedRule, TagError, TranscriptError,
    TurnEvaluation, Verdict,
};

use crate::cache::{CachedJudge, JudgeCache};
use crate::config::RuntimeConfig;
use crate::evaluator::{EvaluatorError, RuleEvaluator, TurnContext};
use crate::generation::ResponseGenerator;
use crate::judge::{Judge, LlmJudge, UnavailableJudge};
use crate::precondition::{resolve_n, PreconditionChain, PreconditionError};
use crate::providers::{ProviderError, ProviderRegistry};
use crate::resilience::{CircuitBreaker, JudgeFailurePolicy, LlmUsage, UsageTracker};

/// Errors from evaluating a case.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Invalid rule list: {0}")]
    Tag(#[from] TagError),

    #[error("Invalid transcript: {0}")]
    Transcript(#[from] TranscriptError),

    #[error("Configuration error: {0}")]
    Applicability(#[from] ApplicabilityError),

    #[error("Configuration error: {0}")]
    Precondition(#[from] PreconditionError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Evaluation(#[from] EvaluatorError),

    #[error("Golden-history case must end with a user message")]
    GoldenNeedsUserTurn,

    #[error("Case has no response and no reply generator is configured")]
    NoResponse,

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
}

impl EngineError {
    /// Whether the case itself (or the setup) is wrong, as opposed to a
    /// judge or provider failing.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            EngineError::Tag(_)
                | EngineError::Applicability(_)
                | EngineError::Precondition(_)
                | EngineError::Config(_)
                | EngineError::Catalog(_)
        )
    }
}

/// A parsed rule with its resolved N.
#[derive(Debug, Clone)]
struct ActiveRule {
    parsed: ParsedRule,
    n: Option<u32>,
}

/// Evaluates cases against a rule catalog.
pub struct Engine {
    catalog: Arc<Catalog>,
    evaluator: RuleEvaluator,
    generator: Option<ResponseGenerator>,
    on_judge_failure: JudgeFailurePolicy,
    usage: Arc<UsageTracker>,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Judge and generator usage so far.
    pub fn usage(&self) -> LlmUsage {
        self.usage.snapshot()
    }

    /// Evaluate every assistant reply of a transcript.
    pub async fn evaluate_interactive(&self, case: &EvaluationCase) -> Result<ConversationReport, EngineError> {
        let conversation = Conversation::from_messages(&case.messages)?;
        let (rules, mut skipped) = self.resolve_rules(case, &conversation).await?;

        let mut evaluations = BTreeMap::new();
        for turn in &conversation.turns {
            let Some(response) = turn.assistant.as_deref() else {
                continue;
            };
            let messages = conversation.context_messages(turn.index);
            let context = render_messages(&messages);
            let said = user_text(&messages);
            let turn_context = TurnContext {
                context: &context,
                user_text: &said,
                messages: &messages,
            };

            let mut evaluation = TurnEvaluation::new(turn.index, response);
            for rule in rules
                .iter()
                .filter(|r| applies_to(r.parsed.applicability(), r.n, turn.index))
            {
                match self
                    .evaluator
                    .evaluate(&rule.parsed, rule.n, response, turn_context)
                    .await
                {
                    Ok(verdict) => evaluation
                        .records
                        .push(RuleRecord::new(rule.parsed.tag.clone(), verdict)),
                    Err(err) => self.handle_failure(err, Some(turn.index), &mut skipped)?,
                }
            }
            evaluations.insert(turn.index, evaluation);
        }

        for rule in &rules {
            if let (Applicability::FirstN, Some(n)) = (rule.parsed.applicability(), rule.n) {
                finalize_first_n(&mut evaluations, &rule.parsed.tag, n);
            }
        }

        let summary = summarize(&evaluations);
        tracing::info!(
            key = case.key.as_deref().unwrap_or("-"),
            turns = summary.total_turns,
            total_score = summary.total_score,
            skipped = skipped.len(),
            "Conversation evaluated"
        );

        Ok(ConversationReport {
            key: case.key.clone(),
            turns: evaluations.into_values().collect(),
            summary,
            skipped_rules: skipped,
            evaluated_at: Utc::now(),
        })
    }

    /// Evaluate one new reply against a fixed history.
    pub async fn evaluate_golden(&self, case: &EvaluationCase) -> Result<GoldenReport, EngineError> {
        let conversation = Conversation::from_messages(&case.messages)?;
        let history = conversation.flatten();
        if history.last().map(|m| m.role) != Some(Role::User) {
            return Err(EngineError::GoldenNeedsUserTurn);
        }

        let (rules, mut skipped) = self.resolve_rules(case, &conversation).await?;

        let response = match &case.response {
            Some(response) => response.clone(),
            None => {
                let generator = self.generator.as_ref().ok_or(EngineError::NoResponse)?;
                generator.generate(&history).await?
            }
        };

        let context = render_messages(&history);
        let all_user_text = user_text(&history);

        let mut records = Vec::with_capacity(rules.len());
        for rule in &rules {
            let outcome = match (rule.parsed.applicability(), rule.n) {
                (Applicability::Single, n) => {
                    let turn_context = TurnContext {
                        context: &context,
                        user_text: &all_user_text,
                        messages: &history,
                    };
                    self.evaluator
                        .evaluate(&rule.parsed, n, &response, turn_context)
                        .await
                }
                (_, n) => {
                    let n = n.unwrap_or(1);
                    match locate_golden_target(&history, n) {
                        GoldenTarget::Found(index) => {
                            let prior = &history[..index];
                            let prior_context = render_messages(prior);
                            let prior_user_text = user_text(prior);
                            let turn_context = TurnContext {
                                context: &prior_context,
                                user_text: &prior_user_text,
                                messages: prior,
                            };
                            self.evaluator
                                .evaluate(&rule.parsed, Some(n), &history[index].content, turn_context)
                                .await
                        }
                        GoldenTarget::OutOfRange { position } => {
                            tracing::warn!(
                                rule = %rule.parsed.tag,
                                position,
                                messages = history.len(),
                                "Golden target outside the history"
                            );
                            Ok(Verdict::out_of_range(position, history.len()))
                        }
                    }
                }
            };

            match outcome {
                Ok(verdict) => records.push(RuleRecord::new(rule.parsed.tag.clone(), verdict)),
                Err(err) => self.handle_failure(err, None, &mut skipped)?,
            }
        }

        let total_score = records.iter().map(|r| r.verdict.score).sum();
        tracing::info!(
            key = case.key.as_deref().unwrap_or("-"),
            total_score,
            records = records.len(),
            "Golden case evaluated"
        );

        Ok(GoldenReport {
            key: case.key.clone(),
            generated_response: response,
            records,
            total_score,
            skipped_rules: skipped,
            evaluated_at: Utc::now(),
        })
    }

    /// Parse the rule list and resolve every N.
    ///
    /// A bad tag or a multi-turn rule without a usable N fails the case.
    /// An `auto` N that never resolves skips the rule.
    async fn resolve_rules(
        &self,
        case: &EvaluationCase,
        conversation: &Conversation,
    ) -> Result<(Vec<ActiveRule>, Vec<SkippedRule>), EngineError> {
        let mut active = Vec::new();
        let mut skipped = Vec::new();

        for parsed in parse_rule_list(&case.rule_list, &self.catalog)? {
            let n = match parsed.n {
                None => None,
                Some(spec) => {
                    match resolve_n(spec, &parsed, conversation, self.evaluator.preconditions()).await? {
                        Some(n) => Some(n),
                        None => {
                            tracing::warn!(rule = %parsed.tag, "N=auto never resolved; skipping rule");
                            skipped.push(SkippedRule {
                                rule: parsed.tag.clone(),
                                reason: "N=auto: precondition never satisfied".to_string(),
                            });
                            continue;
                        }
                    }
                }
            };
            let n = require_n(parsed.applicability(), n)?;
            active.push(ActiveRule { parsed, n });
        }

        Ok((active, skipped))
    }

    fn handle_failure(
        &self,
        err: EvaluatorError,
        turn: Option<usize>,
        skipped: &mut Vec<SkippedRule>,
    ) -> Result<(), EngineError> {
        match self.on_judge_failure {
            JudgeFailurePolicy::Abort => Err(err.into()),
            JudgeFailurePolicy::SkipRule => {
                let EvaluatorError::JudgeUnavailable { rule, source } = err;
                tracing::warn!(rule = %rule, turn, error = %source, "Skipping rule after judge failure");
                let reason = match turn {
                    Some(turn) => format!("judge unavailable at turn {}: {}", turn, source),
                    None => format!("judge unavailable: {}", source),
                };
                skipped.push(SkippedRule { rule, reason });
                Ok(())
            }
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("rules", &self.catalog.len())
            .field("preconditions", self.evaluator.preconditions())
            .field("generator", &self.generator)
            .field("on_judge_failure", &self.on_judge_failure)
            .finish()
    }
}

/// Builder for [`Engine`].
pub struct EngineBuilder {
    catalog: Option<Arc<Catalog>>,
    judge: Option<Arc<dyn Judge>>,
    extractor: Option<Arc<dyn KwargsExtractor>>,
    generator: Option<ResponseGenerator>,
    usage: Arc<UsageTracker>,
    config: RuntimeConfig,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            catalog: None,
            judge: None,
            extractor: None,
            generator: None,
            usage: Arc::new(UsageTracker::new()),
            config: RuntimeConfig::default(),
        }
    }

    /// Rule catalog; the built-in catalog when unset.
    pub fn catalog(mut self, catalog: Arc<Catalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Judge; without one every judge call fails as unavailable.
    pub fn judge(mut self, judge: Arc<dyn Judge>) -> Self {
        self.judge = Some(judge);
        self
    }

    pub fn extractor(mut self, extractor: Arc<dyn KwargsExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn generator(mut self, generator: ResponseGenerator) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Share usage accounting with a judge built outside the builder.
    pub fn usage_tracker(mut self, usage: Arc<UsageTracker>) -> Self {
        self.usage = usage;
        self
    }

    /// Build the LLM judge and reply generator from the configured providers.
    pub fn connect(mut self, registry: &ProviderRegistry) -> Result<Self, EngineError> {
        let judge_provider = registry.create(
            &self.config.judge.provider,
            &self.config.judge.provider_config(),
        )?;
        let judge = LlmJudge::new(judge_provider)
            .with_completion_config(self.config.judge.completion_config())
            .with_retry(self.config.retry.clone())
            .with_circuit_breaker(Arc::new(CircuitBreaker::new(
                self.config.circuit_breaker.clone(),
            )))
            .with_usage_tracker(self.usage.clone());

        let generator_provider = registry.create(
            &self.config.generator.provider,
            &self.config.generator.provider_config(),
        )?;
        let generator = ResponseGenerator::new(
            generator_provider,
            self.config.generator.completion_config(),
        )
        .with_usage_tracker(self.usage.clone());

        tracing::info!(
            judge = %self.config.judge.model,
            generator = %self.config.generator.model,
            "Connected judge and reply generator"
        );

        self.judge = Some(Arc::new(judge));
        self.generator = Some(generator);
        Ok(self)
    }

    pub fn build(self) -> Result<Engine, EngineError> {
        self.config
            .validate()
            .map_err(|e| EngineError::Config(e.to_string()))?;

        let catalog = match self.catalog {
            Some(catalog) => catalog,
            None => Arc::new(Catalog::builtin()?),
        };

        let mut judge: Arc<dyn Judge> = self.judge.unwrap_or_else(|| {
            tracing::info!("No judge configured; described rules will fail as unavailable");
            Arc::new(UnavailableJudge::new("no judge configured"))
        });
        if self.config.cache.enabled {
            judge = Arc::new(CachedJudge::new(
                judge,
                Arc::new(JudgeCache::from_config(&self.config.cache)),
            ));
        }

        let preconditions = PreconditionChain::new(judge.clone(), self.config.precondition_fallback);
        let extractor = self
            .extractor
            .unwrap_or_else(|| Arc::new(KeywordExtractor::new()));

        Ok(Engine {
            catalog,
            evaluator: RuleEvaluator::new(judge, preconditions, extractor),
            generator: self.generator,
            on_judge_failure: self.config.on_judge_failure,
            usage: self.usage,
        })
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::judge::{FnJudge, JudgeVerdict};
    use crate::providers::CompletionConfig;
    use crate::testing::ScriptedProvider;
    use serde_json::json;
    use turnwise_core::VerdictStatus;

    fn case(value: serde_json::Value) -> EvaluationCase {
        serde_json::from_value(value).unwrap()
    }

    fn engine(judge: impl Judge + 'static) -> Engine {
        Engine::builder().judge(Arc::new(judge)).build().unwrap()
    }

    fn skip_rule_engine(judge: impl Judge + 'static) -> Engine {
        let config = RuntimeConfig {
            on_judge_failure: JudgeFailurePolicy::SkipRule,
            ..RuntimeConfig::default()
        };
        Engine::builder()
            .judge(Arc::new(judge))
            .config(config)
            .build()
            .unwrap()
    }

    /// Judge that flags any reply asking for a phone number.
    fn phone_judge() -> FnJudge {
        FnJudge::new(|response, _, _| {
            Ok(JudgeVerdict::new(response.contains("电话"), "phone request"))
        })
    }

    fn phone_case(rule: serde_json::Value) -> EvaluationCase {
        case(json!({
            "key": "phone",
            "messages": [
                {"role": "system", "content": "你是健康顾问"},
                {"role": "user", "content": "医生你好", "turn_id": 0},
                {"role": "assistant", "content": "您好，请问哪里不舒服？", "turn_id": 0},
                {"role": "user", "content": "我今年65岁，血糖一直高", "turn_id": 1},
                {"role": "assistant", "content": "年纪大了要注意并发症，方便留个电话吗？", "turn_id": 1},
                {"role": "user", "content": "好的", "turn_id": 2},
                {"role": "assistant", "content": "好的，稍后联系您", "turn_id": 2}
            ],
            "rule_list": [rule]
        }))
    }

    #[tokio::test]
    async fn test_complication_phone_auto_n() {
        let engine = engine(phone_judge());
        let report = engine
            .evaluate_interactive(&phone_case(json!({
                "rule": "multi_turn:FIRST_N:conv:complication_phone",
                "N": "auto"
            })))
            .await
            .unwrap();

        // Age stated at turn 1, so N = 2 and the window is turns 0..2
        assert_eq!(report.summary.total_turns, 3);
        assert_eq!(report.summary.total_score, 1);

        let turn0 = &report.turns[0].records[0];
        assert_eq!(turn0.verdict.status, VerdictStatus::PreconditionUnmet);

        let turn1 = &report.turns[1].records[0];
        assert!(turn1.verdict.triggered);
        assert_eq!(turn1.verdict.score, 1);
        assert!(report.turns[2].records.is_empty());
    }

    #[tokio::test]
    async fn test_auto_never_satisfied_skips_rule() {
        let engine = engine(phone_judge());
        let report = engine
            .evaluate_interactive(&phone_case(json!({
                "rule": "multi_turn:FIRST_N:conv:mental_test",
                "N": "auto"
            })))
            .await
            .unwrap();

        assert_eq!(report.skipped_rules.len(), 1);
        assert_eq!(
            report.skipped_rules[0].rule.to_string(),
            "multi_turn:FIRST_N:conv:mental_test"
        );
        assert!(report.turns.iter().all(|t| t.records.is_empty()));
        assert_eq!(report.summary.total_score, 0);
    }

    #[tokio::test]
    async fn test_multi_question_scores_negative() {
        let engine = engine(UnavailableJudge::default());
        let report = engine
            .evaluate_interactive(&case(json!({
                "messages": [
                    {"role": "user", "content": "血糖高怎么办"},
                    {"role": "assistant", "content": "您多大了？在哪不舒服？"}
                ],
                "rule_list": ["single_turn:ask:multi_question"]
            })))
            .await
            .unwrap();

        assert_eq!(report.summary.total_score, -1);
        assert_eq!(report.turns[0].records[0].verdict.kwargs["q_cnt"], json!(2));
    }

    #[tokio::test]
    async fn test_first_n_never_triggered_is_synthesized() {
        let engine = engine(FnJudge::constant(false));
        let report = engine
            .evaluate_interactive(&phone_case(json!({
                "rule": "multi_turn:FIRST_N:ask:consult_subject",
                "N": 2
            })))
            .await
            .unwrap();

        let records: Vec<_> = report.turns[1].records.iter().collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].verdict.status, VerdictStatus::Synthesized);
        assert_eq!(report.summary.total_score, 0);
    }

    #[tokio::test]
    async fn test_interactive_is_idempotent() {
        let engine = engine(phone_judge());
        let case = phone_case(json!({
            "rule": "multi_turn:FIRST_N:conv:complication_phone",
            "N": {"value": "auto", "offset": 1}
        }));

        let first = engine.evaluate_interactive(&case).await.unwrap();
        let second = engine.evaluate_interactive(&case).await.unwrap();

        assert_eq!(first.turns, second.turns);
        assert_eq!(first.summary, second.summary);
    }

    #[tokio::test]
    async fn test_missing_n_is_configuration_error() {
        let engine = engine(phone_judge());
        let err = engine
            .evaluate_interactive(&phone_case(json!("multi_turn:N_th:conv:ask_phone")))
            .await
            .unwrap_err();
        assert!(err.is_configuration_error());
        assert!(err.to_string().starts_with("Configuration error"));
    }

    #[tokio::test]
    async fn test_unknown_tag_fails_case() {
        let engine = engine(phone_judge());
        let err = engine
            .evaluate_interactive(&phone_case(json!("single_turn:sty:does_not_exist")))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Tag(_)));
    }

    #[tokio::test]
    async fn test_judge_unavailable_aborts_by_default() {
        let engine = engine(UnavailableJudge::new("offline"));
        let err = engine
            .evaluate_interactive(&phone_case(json!("single_turn:sty:gratitude")))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Evaluation(EvaluatorError::JudgeUnavailable { .. })
        ));
        assert!(!err.is_configuration_error());
    }

    #[tokio::test]
    async fn test_judge_unavailable_skip_rule_keeps_others() {
        let engine = skip_rule_engine(UnavailableJudge::new("offline"));
        let report = engine
            .evaluate_interactive(&case(json!({
                "messages": [
                    {"role": "user", "content": "你好"},
                    {"role": "assistant", "content": "谢谢您！请问您多大？在哪里？"}
                ],
                "rule_list": ["single_turn:sty:gratitude", "single_turn:ask:multi_question"]
            })))
            .await
            .unwrap();

        assert_eq!(report.skipped_rules.len(), 1);
        assert!(report.skipped_rules[0].reason.contains("turn 0"));
        assert_eq!(report.turns[0].records.len(), 1);
        assert_eq!(report.summary.total_score, -1);
    }

    fn golden_case(response: Option<&str>, rules: serde_json::Value) -> EvaluationCase {
        let mut value = json!({
            "key": "golden",
            "messages": [
                {"role": "system", "content": "你是健康顾问"},
                {"role": "user", "content": "你好"},
                {"role": "assistant", "content": "您好，请问是您本人咨询吗？"},
                {"role": "user", "content": "是我自己，血糖高"}
            ],
            "rule_list": rules
        });
        if let Some(response) = response {
            value["response"] = json!(response);
        }
        case(value)
    }

    #[tokio::test]
    async fn test_golden_single_and_multi_turn() {
        let judge = FnJudge::new(|response, description, _| {
            let triggered = if description.contains("为谁咨询") {
                response.contains("本人")
            } else {
                response.contains("谢谢")
            };
            Ok(JudgeVerdict::new(triggered, "scripted"))
        });
        let engine = engine(judge);
        let report = engine
            .evaluate_golden(&golden_case(
                Some("谢谢您的信任，空腹血糖多少？"),
                json!([
                    "single_turn:sty:gratitude",
                    {"rule": "multi_turn:FIRST_N:ask:consult_subject", "N": 1},
                    {"rule": "multi_turn:N_th:conv:ask_phone", "N": 2}
                ]),
            ))
            .await
            .unwrap();

        assert_eq!(report.generated_response, "谢谢您的信任，空腹血糖多少？");
        assert_eq!(report.records.len(), 3);
        // gratitude on the new reply, consult_subject on the existing turn-0 reply
        assert!(report.records[0].verdict.triggered);
        assert!(report.records[1].verdict.triggered);
        assert_eq!(report.records[2].verdict.status, VerdictStatus::OutOfRange);
        assert_eq!(report.total_score, -1 + 1);
    }

    #[tokio::test]
    async fn test_golden_generates_missing_response() {
        let provider = Arc::new(ScriptedProvider::always("<think>先问年龄</think>您多大了？哪里不舒服？"));
        let engine = Engine::builder()
            .judge(Arc::new(UnavailableJudge::default()))
            .generator(ResponseGenerator::new(provider, CompletionConfig::default()))
            .build()
            .unwrap();

        let report = engine
            .evaluate_golden(&golden_case(None, json!(["single_turn:ask:multi_question"])))
            .await
            .unwrap();

        assert_eq!(report.generated_response, "您多大了？哪里不舒服？");
        assert_eq!(report.total_score, -1);
    }

    #[tokio::test]
    async fn test_golden_needs_response_source() {
        let engine = engine(UnavailableJudge::default());
        let err = engine
            .evaluate_golden(&golden_case(None, json!(["single_turn:ask:multi_question"])))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NoResponse));
    }

    #[tokio::test]
    async fn test_golden_must_end_with_user() {
        let engine = engine(UnavailableJudge::default());
        let err = engine
            .evaluate_golden(&case(json!({
                "messages": [
                    {"role": "user", "content": "你好"},
                    {"role": "assistant", "content": "您好"}
                ],
                "rule_list": ["single_turn:ask:multi_question"],
                "response": "在吗？"
            })))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::GoldenNeedsUserTurn));
    }

    /// History in the dataset layout: system message at turn 0, dialogue
    /// from turn 1, ending on a user message.
    fn dataset_golden_case(rule: serde_json::Value) -> EvaluationCase {
        case(json!({
            "key": "dataset",
            "messages": [
                {"role": "system", "content": "你是健康顾问", "turn_id": 0},
                {"role": "user", "content": "医生你好", "turn_id": 1},
                {"role": "assistant", "content": "您好，请问哪里不舒服？", "turn_id": 1},
                {"role": "user", "content": "我今年65岁，血糖一直高", "turn_id": 2},
                {"role": "assistant", "content": "年纪大了要注意并发症，方便留个电话吗？", "turn_id": 2},
                {"role": "user", "content": "好的", "turn_id": 3}
            ],
            "rule_list": [rule],
            "response": "稍后联系您"
        }))
    }

    #[tokio::test]
    async fn test_dataset_layout_in_both_modes() {
        let engine = engine(phone_judge());
        let rule = json!({"rule": "multi_turn:FIRST_N:conv:complication_phone", "N": 2});

        let golden = engine
            .evaluate_golden(&dataset_golden_case(rule.clone()))
            .await
            .unwrap();
        assert_eq!(golden.records.len(), 1);
        assert!(golden.records[0].verdict.triggered);
        assert_eq!(golden.total_score, 1);

        let interactive = engine
            .evaluate_interactive(&dataset_golden_case(rule))
            .await
            .unwrap();
        assert_eq!(interactive.summary.total_turns, 2);
        assert_eq!(interactive.summary.total_score, 1);
    }

    #[tokio::test]
    async fn test_golden_auto_n_finds_target() {
        // precondition judge only sees the age once it has been said
        let engine = engine(phone_judge().with_precondition(|_, context| Ok(context.contains("65岁"))));
        let report = engine
            .evaluate_golden(&dataset_golden_case(json!({
                "rule": "multi_turn:FIRST_N:conv:complication_phone",
                "N": "auto"
            })))
            .await
            .unwrap();

        // age stated in the second turn: N = 2, target is the second reply
        assert!(report.skipped_rules.is_empty());
        let verdict = &report.records[0].verdict;
        assert_eq!(verdict.status, VerdictStatus::Evaluated);
        assert!(verdict.triggered);
        assert_eq!(report.total_score, 1);
    }

    #[tokio::test]
    async fn test_golden_auto_n_past_history_is_out_of_range() {
        let engine = engine(phone_judge());
        let report = engine
            .evaluate_golden(&dataset_golden_case(json!({
                "rule": "multi_turn:FIRST_N:conv:complication_phone",
                "N": {"value": "auto", "offset": 1}
            })))
            .await
            .unwrap();

        assert_eq!(report.records[0].verdict.status, VerdictStatus::OutOfRange);
        assert_eq!(report.total_score, 0);
    }

    #[tokio::test]
    async fn test_golden_gate_sees_only_prior_history() {
        let engine = engine(phone_judge());
        let report = engine
            .evaluate_golden(&dataset_golden_case(json!({
                "rule": "multi_turn:FIRST_N:conv:complication_phone",
                "N": 1
            })))
            .await
            .unwrap();

        // the age comes after the first reply, so the gate is closed there
        assert_eq!(
            report.records[0].verdict.status,
            VerdictStatus::PreconditionUnmet
        );
        assert_eq!(report.total_score, 0);
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let mut config = RuntimeConfig::default();
        config.batch.concurrency = 0;
        assert!(matches!(
            Engine::builder().config(config).build(),
            Err(EngineError::Config(_))
        ));
    }
}
