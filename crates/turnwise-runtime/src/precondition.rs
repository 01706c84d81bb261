//! Precondition checks and `N = auto` resolution.
//!
//! A precondition is asked of the judge first. When the judge cannot
//! answer, the configured [`FallbackStrategy`] decides: by default the
//! rule's keyword heuristic over what the user has said.

use std::sync::Arc;
use thiserror::Error;

use turnwise_core::{Conversation, NSpec, ParsedRule, Precondition, RuleTag};

use crate::judge::{Judge, JudgeError};
use crate::resilience::FallbackStrategy;

/// Errors from resolving a rule's N.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PreconditionError {
    #[error("Rule {rule} asks for N=auto but has no precondition")]
    NoPrecondition { rule: RuleTag },

    #[error("Rule {rule} is single-turn; N=auto applies to multi-turn rules only")]
    AutoOnSingleTurn { rule: RuleTag },
}

/// Who decided a precondition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreconditionSource {
    Judge,
    Heuristic,
    Assumed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreconditionAnswer {
    pub satisfied: bool,
    pub source: PreconditionSource,
}

/// Judge first, then the fallback strategy.
#[derive(Clone)]
pub struct PreconditionChain {
    judge: Arc<dyn Judge>,
    fallback: FallbackStrategy,
}

impl PreconditionChain {
    pub fn new(judge: Arc<dyn Judge>, fallback: FallbackStrategy) -> Self {
        Self { judge, fallback }
    }

    /// Decide `precondition`.
    ///
    /// `context` goes to the judge; the heuristic only sees `user_text`.
    pub async fn check(&self, precondition: &Precondition, context: &str, user_text: &str) -> PreconditionAnswer {
        match self
            .judge
            .check_precondition(&precondition.description, context)
            .await
        {
            Ok(satisfied) => PreconditionAnswer {
                satisfied,
                source: PreconditionSource::Judge,
            },
            Err(err) => {
                let answer = match self.fallback {
                    FallbackStrategy::Heuristic => PreconditionAnswer {
                        satisfied: precondition.heuristic.holds(user_text),
                        source: PreconditionSource::Heuristic,
                    },
                    FallbackStrategy::AssumeUnmet => PreconditionAnswer {
                        satisfied: false,
                        source: PreconditionSource::Assumed,
                    },
                };
                if matches!(err, JudgeError::Unavailable(_)) {
                    tracing::debug!(
                        precondition = %precondition.description,
                        heuristic = precondition.heuristic.label(),
                        satisfied = answer.satisfied,
                        "No precondition judge, using fallback"
                    );
                } else {
                    tracing::warn!(
                        precondition = %precondition.description,
                        heuristic = precondition.heuristic.label(),
                        satisfied = answer.satisfied,
                        error = %err,
                        "Judge could not decide precondition, using fallback"
                    );
                }
                answer
            }
        }
    }
}

impl std::fmt::Debug for PreconditionChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreconditionChain")
            .field("judge", &self.judge.name())
            .field("fallback", &self.fallback)
            .finish()
    }
}

/// Resolve a rule's N against a conversation.
///
/// A literal passes through. `auto` becomes the 1-based position of the
/// first turn whose user utterance satisfies the rule's precondition, plus
/// the offset. `Ok(None)` means the precondition never held (or the offset
/// pushed N below 1); the caller skips the rule.
pub async fn resolve_n(
    spec: NSpec,
    parsed: &ParsedRule,
    conversation: &Conversation,
    chain: &PreconditionChain,
) -> Result<Option<u32>, PreconditionError> {
    let offset = match spec {
        NSpec::Literal(n) => return Ok(Some(n)),
        NSpec::Auto { offset } => offset,
    };

    if !parsed.applicability().is_multi_turn() {
        return Err(PreconditionError::AutoOnSingleTurn {
            rule: parsed.tag.clone(),
        });
    }
    let precondition = parsed
        .rule
        .precondition
        .as_ref()
        .ok_or_else(|| PreconditionError::NoPrecondition {
            rule: parsed.tag.clone(),
        })?;

    for turn in &conversation.turns {
        let Some(utterance) = turn.user.as_deref() else {
            continue;
        };
        let answer = chain
            .check(precondition, &format!("user: {}", utterance), utterance)
            .await;
        if answer.satisfied {
            let n = turn.index as i64 + 1 + i64::from(offset);
            tracing::debug!(rule = %parsed.tag, turn = turn.index, n, source = ?answer.source, "Resolved N=auto");
            return Ok(u32::try_from(n).ok().filter(|n| *n >= 1));
        }
    }

    tracing::debug!(rule = %parsed.tag, "Precondition never satisfied; N=auto unresolved");
    Ok(None)
}
