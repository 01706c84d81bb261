//! Structured attribute ("kwargs") extraction.
//!
//! Extraction is pluggable through [`KwargsExtractor`]. Whatever an extractor
//! returns is merged over the rule's schema defaults, and values that do not
//! conform to their field are replaced by the default.

use serde_json::Value;
use std::collections::BTreeMap;

use crate::catalog::{FieldType, KwargField, KwargsSchema, RuleDefinition};
use crate::conversation::{user_text, Message};
use crate::patterns::{
    count_list_markers, count_questions, first_keyword, BULLET_LIST_PATTERN, DISEASE_KEYWORDS,
    HOSPITAL_PATTERN,
};
use crate::tag::RuleTag;

/// Longest `phrase` value kept, in characters.
const MAX_PHRASE_CHARS: usize = 100;

/// Extracts attribute values for a rule from a response.
pub trait KwargsExtractor: Send + Sync {
    /// Return values for any subset of the schema's fields.
    ///
    /// # Arguments
    ///
    /// * `tag` - Canonical tag of the rule being filled
    /// * `schema` - The rule's kwargs fields
    /// * `response` - Assistant reply that was evaluated
    /// * `conversation` - Messages leading up to the reply
    fn extract(
        &self,
        tag: &RuleTag,
        schema: &KwargsSchema,
        response: &str,
        conversation: &[Message],
    ) -> BTreeMap<String, Value>;
}

/// Fill a rule's kwargs: extractor output over schema defaults.
pub fn extract_kwargs(
    extractor: &dyn KwargsExtractor,
    tag: &RuleTag,
    rule: &RuleDefinition,
    response: &str,
    conversation: &[Message],
) -> BTreeMap<String, Value> {
    if rule.kwargs.is_empty() {
        return BTreeMap::new();
    }

    let mut values = rule.kwargs_defaults();
    for (name, value) in extractor.extract(tag, &rule.kwargs, response, conversation) {
        match rule.kwargs.get(&name) {
            Some(field) if field.accepts(&value) => {
                values.insert(name, value);
            }
            Some(_) => {
                tracing::debug!(field = %name, value = %value, "Dropping non-conforming kwargs value");
            }
            None => {}
        }
    }
    values
}

/// Keyword-based extractor keyed on field names.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordExtractor;

impl KeywordExtractor {
    pub fn new() -> Self {
        Self
    }

    fn field_value(&self, name: &str, field: &KwargField, response: &str, user_text: &str) -> Option<Value> {
        let value = match name {
            "phrase" => Value::String(truncate(response, MAX_PHRASE_CHARS)),
            "q_cnt" => Value::from(count_questions(response)),
            "query_type" => Value::String(query_type(response).to_string()),
            "dx" => Value::String(first_keyword(response, DISEASE_KEYWORDS)?.to_string()),
            "disease" | "main_disease" => {
                let found = first_keyword(response, DISEASE_KEYWORDS)
                    .or_else(|| first_keyword(user_text, DISEASE_KEYWORDS))?;
                Value::String(found.to_string())
            }
            "who" => Value::String(consult_subject(user_text, response)?.to_string()),
            "prompt" => Value::String(prompt_kind(response).to_string()),
            "gender" => Value::String(gender(user_text)?.to_string()),
            "format" => Value::String(list_format(response)?.to_string()),
            "name" => Value::String(HOSPITAL_PATTERN.find(response)?.as_str().to_string()),
            _ => return None,
        };

        (field.field_type != FieldType::Enum || field.accepts(&value)).then_some(value)
    }
}

impl KwargsExtractor for KeywordExtractor {
    fn extract(
        &self,
        _tag: &RuleTag,
        schema: &KwargsSchema,
        response: &str,
        conversation: &[Message],
    ) -> BTreeMap<String, Value> {
        let user_text = user_text(conversation);
        schema
            .iter()
            .filter_map(|(name, field)| {
                self.field_value(name, field, response, &user_text)
                    .map(|value| (name.clone(), value))
            })
            .collect()
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

fn query_type(response: &str) -> &'static str {
    if response.contains("有什么") || response.contains("哪些") {
        "list"
    } else if ["有没有", "是否", "是不是"].iter().any(|k| response.contains(k)) {
        "yesno"
    } else {
        "unknown"
    }
}

fn consult_subject(user_text: &str, response: &str) -> Option<&'static str> {
    let text = if user_text.is_empty() { response } else { user_text };
    if ["孩子", "家人", "亲属", "父亲", "母亲", "爸", "妈"].iter().any(|k| text.contains(k)) {
        Some("family")
    } else if ["本人", "自己", "我"].iter().any(|k| text.contains(k)) {
        Some("self")
    } else if ["朋友", "同事"].iter().any(|k| text.contains(k)) {
        Some("other")
    } else {
        None
    }
}

fn prompt_kind(response: &str) -> &'static str {
    if response.contains("不适") || response.contains("不舒服") {
        "discomfort"
    } else if response.contains("问题") {
        "main_question"
    } else {
        "open"
    }
}

fn gender(user_text: &str) -> Option<&'static str> {
    if ["女", "女士", "小姐"].iter().any(|k| user_text.contains(k)) {
        Some("female")
    } else if ["男", "先生"].iter().any(|k| user_text.contains(k)) {
        Some("male")
    } else {
        None
    }
}

fn list_format(response: &str) -> Option<&'static str> {
    if count_list_markers(response) >= 2 {
        Some("1.2.3.")
    } else if BULLET_LIST_PATTERN.is_match(response) {
        Some("bullet")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::conversation::Role;

    fn rule(tag: &str) -> (RuleTag, RuleDefinition) {
        let rule = Catalog::builtin().unwrap().get(tag).unwrap().as_ref().clone();
        (rule.tag(), rule)
    }

    fn said(users: &[&str]) -> Vec<Message> {
        users
            .iter()
            .enumerate()
            .flat_map(|(i, u)| [Message::user(i, *u), Message::assistant(i, "好的")])
            .collect()
    }

    #[test]
    fn test_question_count_kwarg() {
        let (tag, rule) = rule("single_turn:ask:multi_question");
        let kwargs = extract_kwargs(&KeywordExtractor, &tag, &rule, "您多大了？在哪不舒服？", &[]);
        assert_eq!(kwargs["q_cnt"], Value::from(2));
    }

    #[test]
    fn test_defaults_fill_misses() {
        let (tag, rule) = rule("multi_turn:FIRST_N:ask:consult_subject");
        let kwargs = extract_kwargs(&KeywordExtractor, &tag, &rule, "您好", &[]);
        assert_eq!(kwargs["who"], Value::String("unknown".into()));

        let kwargs = extract_kwargs(&KeywordExtractor, &tag, &rule, "是您本人吗？", &said(&["帮我妈问的"]));
        assert_eq!(kwargs["who"], Value::String("family".into()));

        let kwargs = extract_kwargs(&KeywordExtractor, &tag, &rule, "是您本人吗？", &said(&["我自己血糖高"]));
        assert_eq!(kwargs["who"], Value::String("self".into()));
    }

    #[test]
    fn test_assistant_turns_do_not_count_as_user_text() {
        let (tag, rule) = rule("multi_turn:FIRST_N:ask:consult_subject");
        let conversation = vec![
            Message::user(0, "血糖高"),
            Message::assistant(0, "是帮家人问的吗？"),
        ];
        let kwargs = extract_kwargs(&KeywordExtractor, &tag, &rule, "您好", &conversation);
        assert_eq!(kwargs["who"], Value::String("unknown".into()));
    }

    #[test]
    fn test_phrase_is_truncated() {
        let (tag, rule) = rule("single_turn:sty:gratitude");
        let long = "谢".repeat(300);
        let kwargs = extract_kwargs(&KeywordExtractor, &tag, &rule, &long, &[]);
        assert_eq!(kwargs["phrase"].as_str().unwrap().chars().count(), MAX_PHRASE_CHARS);
    }

    #[test]
    fn test_rule_without_schema_gets_nothing() {
        let (tag, mut rule) = rule("single_turn:sty:gratitude");
        rule.kwargs.clear();
        assert!(extract_kwargs(&KeywordExtractor, &tag, &rule, "谢谢", &[]).is_empty());
    }

    /// Reports what it was handed, and one value of the wrong type.
    struct RecordingExtractor;

    impl KwargsExtractor for RecordingExtractor {
        fn extract(
            &self,
            tag: &RuleTag,
            _schema: &KwargsSchema,
            _response: &str,
            conversation: &[Message],
        ) -> BTreeMap<String, Value> {
            let roles: Vec<&str> = conversation.iter().map(|m| m.role.as_str()).collect();
            BTreeMap::from([
                ("q_cnt".to_string(), Value::String("two".into())),
                ("unrelated".to_string(), Value::from(1)),
                ("seen".to_string(), Value::String(format!("{} {}", tag, roles.join(",")))),
            ])
        }
    }

    #[test]
    fn test_non_conforming_values_fall_back_to_default() {
        let (tag, rule) = rule("single_turn:ask:multi_question");
        let kwargs = extract_kwargs(&RecordingExtractor, &tag, &rule, "", &[]);
        assert_eq!(kwargs.len(), 1);
        assert_eq!(kwargs["q_cnt"], Value::from(0));
    }

    #[test]
    fn test_extractor_sees_tag_and_roles() {
        let (tag, mut rule) = rule("single_turn:ask:multi_question");
        rule.kwargs.insert(
            "seen".to_string(),
            serde_json::from_value(serde_json::json!({"type": "string", "default": ""})).unwrap(),
        );
        let conversation = vec![
            Message::new(Role::System, "s", None),
            Message::user(0, "u"),
            Message::assistant(0, "a"),
        ];
        let kwargs = extract_kwargs(&RecordingExtractor, &tag, &rule, "", &conversation);
        assert_eq!(
            kwargs["seen"],
            Value::String("single_turn:ask:multi_question system,user,assistant".into())
        );
    }
}
