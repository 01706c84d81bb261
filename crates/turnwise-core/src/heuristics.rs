//! Keyword heuristics for rule preconditions.
//!
//! Every precondition in the catalog carries one of these alongside its
//! natural-language description. The judge answers the description; the
//! heuristic answers when the judge is absent or fails.

use serde::{Deserialize, Serialize};

use crate::patterns::{
    contains_any, contains_phone, distinct_keywords, max_age, ADVICE_KEYWORDS, DISEASE_KEYWORDS,
    EXAM_KEYWORDS, MEDICATION_KEYWORDS, MENTAL_HEALTH_KEYWORDS, NOT_VISITED_KEYWORDS, PHONE_TERMS,
    QUESTION_MARKERS, REFUSAL_KEYWORDS, VISITED_KEYWORDS, WECHAT_TERMS,
};

/// Deterministic stand-in for a precondition judgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PreconditionHeuristic {
    /// User has not asked a concrete question
    UnclearQuestion,

    /// User mentions two or more conditions
    MultipleConditions,

    /// User mentions taking medication
    MedicationHistory,

    /// User states an age of at least `years`
    AgeAtLeast { years: u32 },

    /// User says they have not seen a doctor
    NotYetVisited,

    /// User has seen a doctor and mentions an exam or report
    VisitedWithReport,

    /// User takes medication and asks for advice
    MedicationAdvice,

    /// No phone number appears in what the user wrote
    NoPhoneGiven,

    /// User declined to give a phone number
    RefusedPhone,

    /// User declined both phone and WeChat
    RefusedPhoneAndWechat,

    /// User mentions a mental health problem
    MentalHealth,
}

impl PreconditionHeuristic {
    /// Decide the precondition from user-authored text.
    pub fn holds(&self, text: &str) -> bool {
        match self {
            PreconditionHeuristic::UnclearQuestion => !contains_any(text, QUESTION_MARKERS),
            PreconditionHeuristic::MultipleConditions => {
                distinct_keywords(text, DISEASE_KEYWORDS) >= 2
            }
            PreconditionHeuristic::MedicationHistory => contains_any(text, MEDICATION_KEYWORDS),
            PreconditionHeuristic::AgeAtLeast { years } => {
                max_age(text).is_some_and(|age| age >= *years)
            }
            PreconditionHeuristic::NotYetVisited => contains_any(text, NOT_VISITED_KEYWORDS),
            PreconditionHeuristic::VisitedWithReport => {
                visited(text) && contains_any(text, EXAM_KEYWORDS)
            }
            PreconditionHeuristic::MedicationAdvice => {
                contains_any(text, MEDICATION_KEYWORDS) && contains_any(text, ADVICE_KEYWORDS)
            }
            PreconditionHeuristic::NoPhoneGiven => !contains_phone(text),
            PreconditionHeuristic::RefusedPhone => {
                contains_any(text, REFUSAL_KEYWORDS) && contains_any(text, PHONE_TERMS)
            }
            PreconditionHeuristic::RefusedPhoneAndWechat => {
                contains_any(text, REFUSAL_KEYWORDS)
                    && contains_any(text, PHONE_TERMS)
                    && contains_any(text, WECHAT_TERMS)
            }
            PreconditionHeuristic::MentalHealth => contains_any(text, MENTAL_HEALTH_KEYWORDS),
        }
    }

    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            PreconditionHeuristic::UnclearQuestion => "unclear_question",
            PreconditionHeuristic::MultipleConditions => "multiple_conditions",
            PreconditionHeuristic::MedicationHistory => "medication_history",
            PreconditionHeuristic::AgeAtLeast { .. } => "age_at_least",
            PreconditionHeuristic::NotYetVisited => "not_yet_visited",
            PreconditionHeuristic::VisitedWithReport => "visited_with_report",
            PreconditionHeuristic::MedicationAdvice => "medication_advice",
            PreconditionHeuristic::NoPhoneGiven => "no_phone_given",
            PreconditionHeuristic::RefusedPhone => "refused_phone",
            PreconditionHeuristic::RefusedPhoneAndWechat => "refused_phone_and_wechat",
            PreconditionHeuristic::MentalHealth => "mental_health",
        }
    }
}

fn visited(text: &str) -> bool {
    contains_any(text, VISITED_KEYWORDS) && !contains_any(text, NOT_VISITED_KEYWORDS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_age_threshold() {
        let h = PreconditionHeuristic::AgeAtLeast { years: 60 };
        assert!(h.holds("我今年65岁"));
        assert!(h.holds("我60岁了"));
        assert!(!h.holds("我今年45岁"));
        assert!(!h.holds("血糖有点高"));
    }

    #[test]
    fn test_visit_negation() {
        assert!(PreconditionHeuristic::NotYetVisited.holds("还没去医院看过"));
        assert!(!PreconditionHeuristic::VisitedWithReport.holds("没去过医院，也没做检查"));
        assert!(PreconditionHeuristic::VisitedWithReport.holds("上周去过医院，检查报告出来了"));
    }

    #[test]
    fn test_refusals() {
        assert!(PreconditionHeuristic::RefusedPhone.holds("电话就不留了，不方便"));
        assert!(!PreconditionHeuristic::RefusedPhoneAndWechat.holds("电话不方便给"));
        assert!(PreconditionHeuristic::RefusedPhoneAndWechat.holds("电话和微信都不方便"));
    }

    #[test]
    fn test_medication_advice() {
        assert!(PreconditionHeuristic::MedicationAdvice.holds("一直在吃二甲双胍，要不要换药？"));
        assert!(!PreconditionHeuristic::MedicationAdvice.holds("要不要去医院？"));
    }

    #[test]
    fn test_unclear_question() {
        assert!(PreconditionHeuristic::UnclearQuestion.holds("你好"));
        assert!(!PreconditionHeuristic::UnclearQuestion.holds("血糖高怎么办？"));
    }

    #[test]
    fn test_serde_tagging() {
        let h: PreconditionHeuristic =
            serde_yaml::from_str("{ kind: age_at_least, years: 60 }").unwrap();
        assert_eq!(h, PreconditionHeuristic::AgeAtLeast { years: 60 });
        let h: PreconditionHeuristic = serde_yaml::from_str("kind: mental_health").unwrap();
        assert_eq!(h.label(), "mental_health");
    }
}
