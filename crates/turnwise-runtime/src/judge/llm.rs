//! Judge backed by an LLM provider.

use async_trait::async_trait;
use backon::Retryable;
use std::sync::Arc;
use std::time::Duration;

use super::{Judge, JudgeCall, JudgeError, JudgeVerdict};
use crate::prompts::{
    parse_precondition_answer, parse_rule_answer, precondition_prompt, rule_prompt,
    PRECONDITION_SYSTEM_PROMPT, RULE_SYSTEM_PROMPT,
};
use crate::providers::{ChatMessage, CompletionConfig, CompletionResponse, LlmProvider};
use crate::resilience::{CircuitBreaker, LlmUsage, RetryPolicy, UsageTracker};

/// Judge that prompts an LLM for a single answer token.
///
/// Each call goes through the circuit breaker, then the provider under a
/// timeout, retried with backoff while the failure is transient.
pub struct LlmJudge {
    provider: Arc<dyn LlmProvider>,
    config: CompletionConfig,
    retry: RetryPolicy,
    circuit_breaker: Arc<CircuitBreaker>,
    usage: Arc<UsageTracker>,
}

impl LlmJudge {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            config: CompletionConfig::default(),
            retry: RetryPolicy::default(),
            circuit_breaker: Arc::new(CircuitBreaker::default()),
            usage: Arc::new(UsageTracker::new()),
        }
    }

    pub fn with_completion_config(mut self, config: CompletionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_circuit_breaker(mut self, circuit_breaker: Arc<CircuitBreaker>) -> Self {
        self.circuit_breaker = circuit_breaker;
        self
    }

    /// Share a usage tracker, e.g. with the reply generator.
    pub fn with_usage_tracker(mut self, usage: Arc<UsageTracker>) -> Self {
        self.usage = usage;
        self
    }

    pub fn usage(&self) -> LlmUsage {
        self.usage.snapshot()
    }

    async fn ask(&self, call: JudgeCall, messages: Vec<ChatMessage>) -> Result<String, JudgeError> {
        if self.circuit_breaker.is_open(call) {
            return Err(JudgeError::CircuitOpen(call));
        }

        let provider = &self.provider;
        let config = &self.config;
        let messages = &messages;

        let result = (|| async move {
            match tokio::time::timeout(config.timeout, provider.complete(messages.clone(), config)).await {
                Ok(response) => response.map_err(JudgeError::from),
                Err(_) => Err(JudgeError::Timeout(config.timeout)),
            }
        })
        .retry(self.retry.backoff())
        .when(JudgeError::is_transient)
        .notify(|err: &JudgeError, delay: Duration| {
            tracing::warn!(call = %call, error = %err, ?delay, "Retrying judge call");
        })
        .await;

        match result {
            Ok(CompletionResponse { content, usage, model, .. }) => {
                self.circuit_breaker.record_success(call);
                self.usage.record(&usage, &model);
                Ok(content)
            }
            Err(err) => {
                self.circuit_breaker.record_failure(call);
                tracing::warn!(call = %call, provider = self.provider.name(), error = %err, "Judge call failed");
                Err(err)
            }
        }
    }
}

#[async_trait]
impl Judge for LlmJudge {
    async fn judge(
        &self,
        response: &str,
        description: &str,
        context: Option<&str>,
    ) -> Result<JudgeVerdict, JudgeError> {
        let messages = vec![
            ChatMessage::system(RULE_SYSTEM_PROMPT),
            ChatMessage::user(rule_prompt(description, response, context)),
        ];
        let answer = self.ask(JudgeCall::Rule, messages).await?;

        match parse_rule_answer(&answer) {
            Some(triggered) => Ok(JudgeVerdict::new(
                triggered,
                format!("judge ({}): {}", self.config.model, answer.trim()),
            )),
            None => Err(JudgeError::Unparseable(answer)),
        }
    }

    async fn check_precondition(&self, precondition: &str, context: &str) -> Result<bool, JudgeError> {
        let messages = vec![
            ChatMessage::system(PRECONDITION_SYSTEM_PROMPT),
            ChatMessage::user(precondition_prompt(precondition, context)),
        ];
        let answer = self.ask(JudgeCall::Precondition, messages).await?;
        parse_precondition_answer(&answer).ok_or(JudgeError::Unparseable(answer))
    }

    fn name(&self) -> &str {
        self.provider.name()
    }
}

impl std::fmt::Debug for LlmJudge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmJudge")
            .field("provider", &self.provider.name())
            .field("model", &self.config.model)
            .field("retry", &self.retry)
            .finish()
    }
}
