//! Deterministic response checks.
//!
//! Rules whose judgment kind is `deterministic` never reach the judge; one of
//! these checks decides them from the response text alone.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::patterns::{
    contains_any, count_list_markers, count_questions, reads_as_question, GENDER_TERMS,
    QUOTE_OR_BRACKET_PATTERN,
};

/// Identifier of a built-in deterministic check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckId {
    /// More question marks than the threshold
    QuestionCount,

    /// A short explanation in quotes or brackets
    QuoteOrBracket,

    /// Two or more numbered list markers
    NumberedList,

    /// A question about the user's gender
    GenderInquiry,
}

/// Result of running a check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    pub triggered: bool,
    pub reason: String,
}

impl CheckOutcome {
    fn new(triggered: bool, reason: impl Into<String>) -> Self {
        Self {
            triggered,
            reason: reason.into(),
        }
    }
}

impl CheckId {
    /// Run the check against an assistant response.
    ///
    /// `threshold` only affects count-based checks; values below 1 are
    /// treated as 1.
    pub fn run(&self, response: &str, threshold: u32) -> CheckOutcome {
        match self {
            CheckId::QuestionCount => {
                let limit = threshold.max(1) as usize;
                let count = count_questions(response);
                CheckOutcome::new(
                    count > limit,
                    format!("{} question mark(s), limit {}", count, limit),
                )
            }
            CheckId::QuoteOrBracket => match QUOTE_OR_BRACKET_PATTERN.find(response) {
                Some(m) => CheckOutcome::new(true, format!("explanation in quotes/brackets: {}", m.as_str())),
                None => CheckOutcome::new(false, "no quoted or bracketed explanation"),
            },
            CheckId::NumberedList => {
                let markers = count_list_markers(response);
                CheckOutcome::new(markers >= 2, format!("{} numbered list marker(s)", markers))
            }
            CheckId::GenderInquiry => {
                let asks = contains_any(response, GENDER_TERMS) && reads_as_question(response);
                if asks {
                    CheckOutcome::new(true, "asks about gender")
                } else {
                    CheckOutcome::new(false, "no gender inquiry")
                }
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CheckId::QuestionCount => "question_count",
            CheckId::QuoteOrBracket => "quote_or_bracket",
            CheckId::NumberedList => "numbered_list",
            CheckId::GenderInquiry => "gender_inquiry",
        }
    }
}

impl fmt::Display for CheckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_questions_trigger_default_threshold() {
        let outcome = CheckId::QuestionCount.run("您多大了？在哪不舒服？", 1);
        assert!(outcome.triggered);
        assert!(outcome.reason.contains('2'));
    }

    #[test]
    fn test_single_question_does_not_trigger() {
        assert!(!CheckId::QuestionCount.run("您多大了？", 1).triggered);
        assert!(!CheckId::QuestionCount.run("您多大了？", 0).triggered);
    }

    #[test]
    fn test_threshold_raises_limit() {
        let reply = "您多大了？在哪不舒服？吃过药吗？";
        assert!(CheckId::QuestionCount.run(reply, 2).triggered);
        assert!(!CheckId::QuestionCount.run(reply, 3).triggered);
    }

    #[test]
    fn test_numbered_list() {
        assert!(CheckId::NumberedList.run("1. 少吃糖\n2. 多运动", 1).triggered);
        assert!(!CheckId::NumberedList.run("血糖 7.8 有点高", 1).triggered);
    }

    #[test]
    fn test_gender_inquiry_needs_a_question() {
        assert!(CheckId::GenderInquiry.run("请问您是男士还是女士？", 1).triggered);
        assert!(CheckId::GenderInquiry.run("方便说下性别吗", 1).triggered);
        assert!(!CheckId::GenderInquiry.run("女士您好，血糖偏高要注意。", 1).triggered);
    }

    #[test]
    fn test_serde_names() {
        let id: CheckId = serde_json::from_str("\"quote_or_bracket\"").unwrap();
        assert_eq!(id, CheckId::QuoteOrBracket);
        assert_eq!(id.to_string(), "quote_or_bracket");
    }
}
