//! The judge: a pluggable yes/no decision service.
//!
//! Rules without a deterministic check, and preconditions, are decided by a
//! [`Judge`]. Production runs use [`LlmJudge`]; tests and offline runs plug
//! in [`FnJudge`] or [`UnavailableJudge`].

use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::providers::ProviderError;

mod llm;

pub use llm::LlmJudge;

/// Kind of judge call. Circuits and cache entries are kept per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JudgeCall {
    Rule,
    Precondition,
}

impl fmt::Display for JudgeCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JudgeCall::Rule => write!(f, "rule"),
            JudgeCall::Precondition => write!(f, "precondition"),
        }
    }
}

/// Errors from judge calls.
#[derive(Error, Debug)]
pub enum JudgeError {
    #[error("Judge unavailable: {0}")]
    Unavailable(String),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Judge timed out after {0:?}")]
    Timeout(Duration),

    #[error("Judge circuit open for {0} calls")]
    CircuitOpen(JudgeCall),

    #[error("Unparseable judge answer: {0:?}")]
    Unparseable(String),
}

impl JudgeError {
    /// Whether a retry could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            JudgeError::Provider(e) => e.is_transient(),
            JudgeError::Timeout(_) => true,
            _ => false,
        }
    }
}

/// A rule judgment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JudgeVerdict {
    pub triggered: bool,
    pub reason: String,
}

impl JudgeVerdict {
    pub fn new(triggered: bool, reason: impl Into<String>) -> Self {
        Self {
            triggered,
            reason: reason.into(),
        }
    }
}

/// Decides described rules and natural-language preconditions.
#[async_trait]
pub trait Judge: Send + Sync {
    /// Does `response` exhibit the behaviour in `description`?
    async fn judge(
        &self,
        response: &str,
        description: &str,
        context: Option<&str>,
    ) -> Result<JudgeVerdict, JudgeError>;

    /// Does `precondition` hold given `context`?
    async fn check_precondition(&self, precondition: &str, context: &str) -> Result<bool, JudgeError>;

    fn name(&self) -> &str;
}

type RuleFn = dyn Fn(&str, &str, Option<&str>) -> Result<JudgeVerdict, JudgeError> + Send + Sync;
type PreconditionFn = dyn Fn(&str, &str) -> Result<bool, JudgeError> + Send + Sync;

/// Judge backed by plain closures.
///
/// Without [`FnJudge::with_precondition`], precondition calls fail with
/// [`JudgeError::Unavailable`] so the keyword heuristic decides.
pub struct FnJudge {
    rule: Arc<RuleFn>,
    precondition: Arc<PreconditionFn>,
    calls: AtomicUsize,
}

impl FnJudge {
    /// `rule` receives `(response, description, context)`.
    pub fn new<F>(rule: F) -> Self
    where
        F: Fn(&str, &str, Option<&str>) -> Result<JudgeVerdict, JudgeError> + Send + Sync + 'static,
    {
        Self {
            rule: Arc::new(rule),
            precondition: Arc::new(|_, _| {
                Err(JudgeError::Unavailable("no precondition judge".to_string()))
            }),
            calls: AtomicUsize::new(0),
        }
    }

    /// Judge that answers every rule the same way.
    pub fn constant(triggered: bool) -> Self {
        Self::new(move |_, _, _| Ok(JudgeVerdict::new(triggered, "constant judge")))
    }

    /// `precondition` receives `(precondition, context)`.
    pub fn with_precondition<F>(mut self, precondition: F) -> Self
    where
        F: Fn(&str, &str) -> Result<bool, JudgeError> + Send + Sync + 'static,
    {
        self.precondition = Arc::new(precondition);
        self
    }

    /// Calls made so far, both kinds.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Judge for FnJudge {
    async fn judge(
        &self,
        response: &str,
        description: &str,
        context: Option<&str>,
    ) -> Result<JudgeVerdict, JudgeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.rule)(response, description, context)
    }

    async fn check_precondition(&self, precondition: &str, context: &str) -> Result<bool, JudgeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.precondition)(precondition, context)
    }

    fn name(&self) -> &str {
        "fn"
    }
}

impl fmt::Debug for FnJudge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnJudge").field("calls", &self.calls()).finish()
    }
}

/// Judge for offline runs: every call fails as unavailable.
#[derive(Debug, Clone, Default)]
pub struct UnavailableJudge {
    reason: String,
}

impl UnavailableJudge {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Judge for UnavailableJudge {
    async fn judge(
        &self,
        _response: &str,
        _description: &str,
        _context: Option<&str>,
    ) -> Result<JudgeVerdict, JudgeError> {
        Err(JudgeError::Unavailable(self.reason.clone()))
    }

    async fn check_precondition(&self, _precondition: &str, _context: &str) -> Result<bool, JudgeError> {
        Err(JudgeError::Unavailable(self.reason.clone()))
    }

    fn name(&self) -> &str {
        "unavailable"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fn_judge_passes_arguments() {
        let judge = FnJudge::new(|response, description, context| {
            Ok(JudgeVerdict::new(
                response.contains("谢谢") && description == "道谢" && context.is_none(),
                "checked",
            ))
        });
        let verdict = judge.judge("谢谢您", "道谢", None).await.unwrap();
        assert!(verdict.triggered);
        assert_eq!(judge.calls(), 1);
    }

    #[tokio::test]
    async fn test_fn_judge_precondition_defaults_to_unavailable() {
        let judge = FnJudge::constant(false);
        assert!(matches!(
            judge.check_precondition("用户年龄≥60岁", "user: 我65岁").await,
            Err(JudgeError::Unavailable(_))
        ));

        let judge = FnJudge::constant(false).with_precondition(|_, context| Ok(context.contains("65")));
        assert!(judge.check_precondition("用户年龄≥60岁", "user: 我65岁").await.unwrap());
    }

    #[tokio::test]
    async fn test_unavailable_judge() {
        let judge = UnavailableJudge::new("offline");
        let err = judge.judge("r", "d", None).await.unwrap_err();
        assert_eq!(err.to_string(), "Judge unavailable: offline");
        assert!(!err.is_transient());
    }

    #[test]
    fn test_transient_classification() {
        assert!(JudgeError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(JudgeError::Provider(ProviderError::HttpError("reset".into())).is_transient());
        assert!(!JudgeError::CircuitOpen(JudgeCall::Rule).is_transient());
        assert!(!JudgeError::Unparseable("maybe".into()).is_transient());
    }
}
