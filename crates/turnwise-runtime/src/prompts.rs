//! Judge prompts and answer parsing.
//!
//! The judge answers with a single token. Rule calls answer whether the
//! described behaviour is present in the reply (`TRIGGERED` or
//! `NOT_TRIGGERED`); precondition calls answer whether the condition holds
//! in the conversation (`SATISFIED` or `NOT_SATISFIED`).
//!
//! Each negative token contains its positive one, so parsers check the
//! negative token first.

/// System prompt for rule judgments.
pub const RULE_SYSTEM_PROMPT: &str = r#"你是一个客观公正的评估者。请根据给定的规则描述，判断模型的回复中是否出现了规则所描述的行为。

判断标准:
1. 只依据规则描述判断，不要自行增加标准
2. 结合上下文理解回复，但只评估回复本身
3. 回复中出现了规则描述的行为，返回 TRIGGERED
4. 回复中没有出现规则描述的行为，返回 NOT_TRIGGERED

只返回 TRIGGERED 或 NOT_TRIGGERED，不要输出其他内容。"#;

/// System prompt for precondition checks.
pub const PRECONDITION_SYSTEM_PROMPT: &str = r#"你是一个客观公正的评估者。请根据对话上下文判断给定的前置条件是否满足。

判断标准:
1. 只依据对话中用户已经说过的内容判断
2. 信息不足以确认时，视为不满足
3. 满足返回 SATISFIED，不满足返回 NOT_SATISFIED

只返回 SATISFIED 或 NOT_SATISFIED，不要输出其他内容。"#;

const NOT_TRIGGERED: &str = "NOT_TRIGGERED";
const TRIGGERED: &str = "TRIGGERED";
const NOT_SATISFIED: &str = "NOT_SATISFIED";
const SATISFIED: &str = "SATISFIED";

/// User prompt for one rule judgment.
pub fn rule_prompt(description: &str, response: &str, context: Option<&str>) -> String {
    let context = context.filter(|c| !c.trim().is_empty()).unwrap_or("无");
    format!(
        "规则描述: {}\n\n模型回复: {}\n\n上下文:\n{}\n\n判断:",
        description, response, context
    )
}

/// User prompt for one precondition check.
pub fn precondition_prompt(precondition: &str, context: &str) -> String {
    format!("前置条件: {}\n\n对话上下文:\n{}\n\n判断:", precondition, context)
}

/// Parse a rule answer. `None` when neither token is present.
pub fn parse_rule_answer(raw: &str) -> Option<bool> {
    parse_answer(raw, NOT_TRIGGERED, TRIGGERED)
}

/// Parse a precondition answer. `None` when neither token is present.
pub fn parse_precondition_answer(raw: &str) -> Option<bool> {
    parse_answer(raw, NOT_SATISFIED, SATISFIED)
}

fn parse_answer(raw: &str, negative: &str, positive: &str) -> Option<bool> {
    let normalized = raw.trim().to_uppercase().replace([' ', '-'], "_");
    if normalized.contains(negative) {
        Some(false)
    } else if normalized.contains(positive) {
        Some(true)
    } else {
        None
    }
}
