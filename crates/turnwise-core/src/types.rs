//! Evaluation inputs and results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::catalog::RuleDefinition;
use crate::conversation::Message;
use crate::tag::{RuleSpec, RuleTag};

/// One evaluation case, as read from a JSON/JSONL input file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationCase {
    /// Caller-assigned identifier, echoed into the report
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    pub messages: Vec<Message>,

    pub rule_list: Vec<RuleSpec>,

    /// Final assistant reply for golden-history evaluation; generated when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
}

/// How a verdict was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictStatus {
    /// The check or judge ran
    Evaluated,

    /// The rule's precondition does not hold; nothing was judged
    PreconditionUnmet,

    /// The rule's target turn is not in the transcript
    OutOfRange,

    /// Added by FIRST_N aggregation when the rule never fired
    Synthesized,
}

/// Outcome of one rule on one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub triggered: bool,

    /// The rule's signed score if triggered, otherwise 0
    pub score: i32,

    pub reason: String,

    #[serde(default)]
    pub kwargs: BTreeMap<String, Value>,

    pub status: VerdictStatus,
}

impl Verdict {
    /// A judged or checked outcome, scored by the rule.
    pub fn evaluated(rule: &RuleDefinition, triggered: bool, reason: impl Into<String>) -> Self {
        Self {
            triggered,
            score: if triggered { rule.score } else { 0 },
            reason: reason.into(),
            kwargs: BTreeMap::new(),
            status: VerdictStatus::Evaluated,
        }
    }

    pub fn precondition_unmet(precondition: &str) -> Self {
        Self::pass_through(
            format!("precondition not met: {}", precondition),
            VerdictStatus::PreconditionUnmet,
        )
    }

    pub fn out_of_range(position: usize, transcript_len: usize) -> Self {
        Self::pass_through(
            format!(
                "out of range: message {} is not an assistant reply in a transcript of {} message(s)",
                position, transcript_len
            ),
            VerdictStatus::OutOfRange,
        )
    }

    pub fn synthesized(n: u32) -> Self {
        Self::pass_through(
            format!("FIRST_N: never triggered within the first {} turn(s)", n),
            VerdictStatus::Synthesized,
        )
    }

    fn pass_through(reason: String, status: VerdictStatus) -> Self {
        Self {
            triggered: false,
            score: 0,
            reason,
            kwargs: BTreeMap::new(),
            status,
        }
    }

    pub fn with_kwargs(mut self, kwargs: BTreeMap<String, Value>) -> Self {
        self.kwargs = kwargs;
        self
    }

    pub fn was_evaluated(&self) -> bool {
        self.status == VerdictStatus::Evaluated
    }
}

/// A verdict tagged with its rule, as written to output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleRecord {
    pub rule: RuleTag,

    #[serde(flatten)]
    pub verdict: Verdict,
}

impl RuleRecord {
    pub fn new(rule: RuleTag, verdict: Verdict) -> Self {
        Self { rule, verdict }
    }
}

/// All records for one assistant turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnEvaluation {
    pub turn_id: usize,
    pub response: String,
    pub records: Vec<RuleRecord>,
}

impl TurnEvaluation {
    pub fn new(turn_id: usize, response: impl Into<String>) -> Self {
        Self {
            turn_id,
            response: response.into(),
            records: Vec::new(),
        }
    }

    pub fn score(&self) -> i32 {
        self.records.iter().map(|r| r.verdict.score).sum()
    }
}

/// Per-conversation totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Summary {
    pub total_score: i32,
    pub total_turns: usize,
}

/// A rule left out of an evaluation, and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedRule {
    pub rule: RuleTag,
    pub reason: String,
}

/// Result of evaluating a whole conversation turn by turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    pub turns: Vec<TurnEvaluation>,

    pub summary: Summary,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped_rules: Vec<SkippedRule>,

    pub evaluated_at: DateTime<Utc>,
}

/// Result of evaluating one new reply against a fixed history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoldenReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    pub generated_response: String,

    pub records: Vec<RuleRecord>,

    pub total_score: i32,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped_rules: Vec<SkippedRule>,

    pub evaluated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_flattens_verdict() {
        let tag: RuleTag = "single_turn:ask:multi_question".parse().unwrap();
        let record = RuleRecord::new(tag, Verdict::synthesized(3));
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["rule"], "single_turn:ask:multi_question");
        assert_eq!(json["triggered"], false);
        assert_eq!(json["score"], 0);
        assert_eq!(json["status"], "synthesized");
    }

    #[test]
    fn test_case_accepts_mixed_rule_list() {
        let case: EvaluationCase = serde_json::from_str(
            r#"{
                "key": "case-1",
                "messages": [
                    {"role": "user", "content": "你好", "turn_id": 0}
                ],
                "rule_list": [
                    "single_turn:sty:gratitude",
                    {"rule": "multi_turn:N_th:conv:ask_phone", "N": 2}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(case.rule_list.len(), 2);
        assert!(case.response.is_none());
    }
}
