//! Reply generation for golden-history evaluation.
//!
//! When a golden case carries no `response`, the model under test is asked
//! for one from the fixed history.

use lazy_static::lazy_static;
use regex::Regex;
use std::sync::Arc;

use turnwise_core::Message;

use crate::providers::{ChatMessage, CompletionConfig, LlmProvider, ProviderError};
use crate::resilience::UsageTracker;

lazy_static! {
    static ref THINK_BLOCK: Regex = Regex::new(r"(?s)<think>.*?</think>").unwrap();
}

/// Drop reasoning blocks from a model reply.
///
/// `<think>...</think>` blocks are removed. A dangling `</think>` (the
/// opening tag was part of the prompt template) keeps only what follows it.
pub fn strip_reasoning(reply: &str) -> String {
    let without_blocks = THINK_BLOCK.replace_all(reply, "");
    let tail = match without_blocks.rfind("</think>") {
        Some(pos) => &without_blocks[pos + "</think>".len()..],
        None => &without_blocks[..],
    };
    tail.trim().to_string()
}

/// Asks the model under test for the next assistant reply.
pub struct ResponseGenerator {
    provider: Arc<dyn LlmProvider>,
    config: CompletionConfig,
    usage: Arc<UsageTracker>,
}

impl ResponseGenerator {
    pub fn new(provider: Arc<dyn LlmProvider>, config: CompletionConfig) -> Self {
        Self {
            provider,
            config,
            usage: Arc::new(UsageTracker::new()),
        }
    }

    pub fn with_usage_tracker(mut self, usage: Arc<UsageTracker>) -> Self {
        self.usage = usage;
        self
    }

    /// Generate a reply to `history`, reasoning stripped.
    pub async fn generate(&self, history: &[Message]) -> Result<String, ProviderError> {
        let messages: Vec<ChatMessage> = history.iter().map(ChatMessage::from).collect();
        let response = tokio::time::timeout(
            self.config.timeout,
            self.provider.complete(messages, &self.config),
        )
        .await
        .map_err(|_| ProviderError::Timeout(self.config.timeout))??;

        self.usage.record(&response.usage, &response.model);
        Ok(strip_reasoning(&response.content))
    }
}

impl std::fmt::Debug for ResponseGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseGenerator")
            .field("provider", &self.provider.name())
            .field("model", &self.config.model)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedProvider;

    #[test]
    fn test_strip_think_blocks() {
        assert_eq!(strip_reasoning("<think>先问年龄</think>\n您今年多大了？"), "您今年多大了？");
        assert_eq!(
            strip_reasoning("<think>a</think>您好<think>b</think>，请问哪里不舒服？"),
            "您好，请问哪里不舒服？"
        );
    }

    #[test]
    fn test_dangling_close_tag() {
        assert_eq!(strip_reasoning("推理过程……</think>\n\n您好"), "您好");
    }

    #[test]
    fn test_plain_reply_untouched() {
        assert_eq!(strip_reasoning("  您好  "), "您好");
    }

    #[tokio::test]
    async fn test_generate_forwards_history() {
        let provider = Arc::new(ScriptedProvider::always("<think>嗯</think>您好，请问哪里不舒服？"));
        let generator = ResponseGenerator::new(provider.clone(), CompletionConfig::default());

        let reply = generator
            .generate(&[Message::system("你是健康顾问"), Message::user(0, "你好")])
            .await
            .unwrap();

        assert_eq!(reply, "您好，请问哪里不舒服？");
        let sent = provider.last_messages();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0], ChatMessage::system("你是健康顾问"));
    }
}
