//! Single rule evaluation.
//!
//! One rule against one assistant reply: precondition gate, then a
//! deterministic check or the judge, then scoring and kwargs.

use std::sync::Arc;
use thiserror::Error;

use turnwise_core::{
    extract_kwargs, Applicability, KwargsExtractor, Message, ParsedRule, RuleKind, RuleTag,
    Verdict,
};

use crate::judge::{Judge, JudgeError};
use crate::precondition::PreconditionChain;

/// Errors from evaluating a rule.
#[derive(Error, Debug)]
pub enum EvaluatorError {
    #[error("Judge unavailable for {rule}: {source}")]
    JudgeUnavailable {
        rule: RuleTag,
        #[source]
        source: JudgeError,
    },
}

/// What the evaluator may look at besides the reply.
#[derive(Debug, Clone, Copy)]
pub struct TurnContext<'a> {
    /// Rendered conversation leading up to the reply
    pub context: &'a str,

    /// User utterances so far, for precondition heuristics
    pub user_text: &'a str,

    /// Messages leading up to the reply, for kwargs extraction
    pub messages: &'a [Message],
}

/// Evaluates one rule against one reply.
#[derive(Clone)]
pub struct RuleEvaluator {
    judge: Arc<dyn Judge>,
    preconditions: PreconditionChain,
    extractor: Arc<dyn KwargsExtractor>,
}

impl RuleEvaluator {
    pub fn new(
        judge: Arc<dyn Judge>,
        preconditions: PreconditionChain,
        extractor: Arc<dyn KwargsExtractor>,
    ) -> Self {
        Self {
            judge,
            preconditions,
            extractor,
        }
    }

    pub fn preconditions(&self) -> &PreconditionChain {
        &self.preconditions
    }

    /// Evaluate `parsed` on `response`.
    ///
    /// `n` is the resolved N; for single-turn deterministic checks it is the
    /// threshold (1 when absent). Gated and deterministic rules never call
    /// the judge. A failed judge call is returned as
    /// [`EvaluatorError::JudgeUnavailable`], never scored.
    pub async fn evaluate(
        &self,
        parsed: &ParsedRule,
        n: Option<u32>,
        response: &str,
        turn: TurnContext<'_>,
    ) -> Result<Verdict, EvaluatorError> {
        let rule = &parsed.rule;

        if let Some(precondition) = &rule.precondition {
            let answer = self
                .preconditions
                .check(precondition, turn.context, turn.user_text)
                .await;
            if !answer.satisfied {
                return Ok(Verdict::precondition_unmet(&precondition.description));
            }
        }

        let (triggered, reason) = match rule.judgment {
            RuleKind::Deterministic { check } => {
                let threshold = match parsed.applicability() {
                    Applicability::Single => n.unwrap_or(1),
                    _ => 1,
                };
                let outcome = check.run(response, threshold);
                (outcome.triggered, outcome.reason)
            }
            RuleKind::Judged => {
                let description = rule.describe(n);
                let context = Some(turn.context).filter(|c| !c.is_empty());
                let verdict = self
                    .judge
                    .judge(response, &description, context)
                    .await
                    .map_err(|source| EvaluatorError::JudgeUnavailable {
                        rule: parsed.tag.clone(),
                        source,
                    })?;
                (verdict.triggered, verdict.reason)
            }
        };

        tracing::trace!(rule = %parsed.tag, triggered, "Rule evaluated");

        let kwargs = extract_kwargs(
            self.extractor.as_ref(),
            &parsed.tag,
            rule,
            response,
            turn.messages,
        );
        Ok(Verdict::evaluated(rule, triggered, reason).with_kwargs(kwargs))
    }
}
