//! Rule definitions as stored in the catalog.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::checks::CheckId;
use crate::heuristics::PreconditionHeuristic;
use crate::tag::RuleTag;

/// Which turns a rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Applicability {
    /// Single-turn rule, checked on every assistant reply
    #[serde(rename = "NONE")]
    Single,

    /// Succeeds if triggered at least once within the first N turns
    #[serde(rename = "FIRST_N")]
    FirstN,

    /// Checked on exactly the Nth turn
    #[serde(rename = "N_th")]
    NTh,
}

impl Applicability {
    /// Whether the rule needs an N.
    pub fn is_multi_turn(&self) -> bool {
        !matches!(self, Applicability::Single)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Applicability::Single => "NONE",
            Applicability::FirstN => "FIRST_N",
            Applicability::NTh => "N_th",
        }
    }

    /// Parse a multi-turn class segment (`FIRST_N` or `N_th`).
    pub fn from_class(class: &str) -> Option<Self> {
        match class {
            "FIRST_N" => Some(Applicability::FirstN),
            "N_th" => Some(Applicability::NTh),
            _ => None,
        }
    }
}

impl fmt::Display for Applicability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a rule is decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleKind {
    /// The judge decides from the rule description
    #[default]
    Judged,

    /// A built-in text check decides
    Deterministic { check: CheckId },
}

/// A rule's precondition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Precondition {
    /// Natural-language condition on what the user said (e.g. "用户年纪 >= 60岁")
    pub description: String,

    /// Keyword fallback for the same condition
    pub heuristic: PreconditionHeuristic,
}

/// Declared type of a kwargs field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Int,
    Enum,
}

/// One field of a rule's kwargs schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KwargField {
    #[serde(rename = "type")]
    pub field_type: FieldType,

    /// Allowed values for `enum` fields
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl KwargField {
    /// The declared default, or the type's zero value.
    pub fn default_value(&self) -> Value {
        if let Some(default) = &self.default {
            return default.clone();
        }
        match self.field_type {
            FieldType::String => Value::String(String::new()),
            FieldType::Int => Value::from(0),
            FieldType::Enum => self
                .values
                .first()
                .map(|v| Value::String(v.clone()))
                .unwrap_or(Value::Null),
        }
    }

    /// Whether a value conforms to this field.
    pub fn accepts(&self, value: &Value) -> bool {
        match self.field_type {
            FieldType::String => value.is_string(),
            FieldType::Int => value.is_i64() || value.is_u64(),
            FieldType::Enum => value
                .as_str()
                .is_some_and(|s| self.values.iter().any(|v| v == s)),
        }
    }
}

/// Field name to field definition.
pub type KwargsSchema = BTreeMap<String, KwargField>;

/// A catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDefinition {
    /// Numeric id, unique within single-turn or multi-turn rules
    pub id: u32,

    /// Category segment of the tag (e.g. "sty", "conv")
    pub category: String,

    /// Name segment of the tag
    pub name: String,

    pub applicability: Applicability,

    /// Signed score applied when triggered (negative = penalty)
    pub score: i32,

    /// Judge-facing description; may contain `{N}`
    pub description: String,

    #[serde(default)]
    pub judgment: RuleKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precondition: Option<Precondition>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub kwargs: KwargsSchema,
}

impl RuleDefinition {
    /// Canonical tag of this rule.
    pub fn tag(&self) -> RuleTag {
        RuleTag::new(self.applicability, &self.category, &self.name)
    }

    /// Description with `{N}` replaced by the resolved N.
    pub fn describe(&self, n: Option<u32>) -> String {
        match n {
            Some(n) if self.description.contains("{N}") => {
                self.description.replace("{N}", &n.to_string())
            }
            _ => self.description.clone(),
        }
    }

    /// Schema defaults for every kwargs field.
    pub fn kwargs_defaults(&self) -> BTreeMap<String, Value> {
        self.kwargs
            .iter()
            .map(|(name, field)| (name.clone(), field.default_value()))
            .collect()
    }

    pub fn is_deterministic(&self) -> bool {
        matches!(self.judgment, RuleKind::Deterministic { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enum_field() -> KwargField {
        KwargField {
            field_type: FieldType::Enum,
            values: vec!["self".into(), "family".into()],
            description: None,
            default: None,
        }
    }

    #[test]
    fn test_enum_default_falls_back_to_first_value() {
        assert_eq!(enum_field().default_value(), Value::String("self".into()));
    }

    #[test]
    fn test_accepts_checks_enum_membership() {
        let field = enum_field();
        assert!(field.accepts(&Value::String("family".into())));
        assert!(!field.accepts(&Value::String("friend".into())));
        assert!(!field.accepts(&Value::from(1)));
    }

    #[test]
    fn test_describe_substitutes_n() {
        let rule: RuleDefinition = serde_yaml::from_str(
            r#"
id: 1
category: ask
name: consult_subject
applicability: FIRST_N
score: 1
description: "在前{N}轮内询问咨询对象"
"#,
        )
        .unwrap();
        assert_eq!(rule.describe(Some(3)), "在前3轮内询问咨询对象");
        assert_eq!(rule.describe(None), "在前{N}轮内询问咨询对象");
        assert_eq!(rule.judgment, RuleKind::Judged);
        assert_eq!(rule.tag().to_string(), "multi_turn:FIRST_N:ask:consult_subject");
    }
}
