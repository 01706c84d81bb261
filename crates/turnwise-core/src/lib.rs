//! # turnwise-core
//!
//! Deterministic building blocks for evaluating multi-turn dialogue
//! transcripts against a catalog of behavioral rules.
//!
//! This crate answers, without any judge calls:
//! - Which rule does this tag name?
//! - Which turns does the rule apply to?
//! - Do the deterministic checks fire on this reply?
//! - What is the final FIRST_N decision and the conversation score?
//!
//! Judge-driven evaluation (preconditions, described rules, batch runs)
//! lives in `turnwise-runtime`.
//!
//! ## Example
//!
//! ```rust,ignore
//! use turnwise_core::{parse, Catalog, CheckId};
//!
//! let catalog = Catalog::builtin()?;
//! let rule = parse("single_turn:ask:multi_question", &catalog)?;
//! assert_eq!(rule.rule.score, -1);
//!
//! let outcome = CheckId::QuestionCount.run("您多大了？在哪不舒服？", 1);
//! assert!(outcome.triggered);
//! ```

pub mod aggregator;
pub mod applicability;
pub mod catalog;
pub mod checks;
pub mod conversation;
pub mod heuristics;
pub mod kwargs;
pub mod patterns;
pub mod tag;
pub mod types;

// Re-export main types at crate root
pub use aggregator::{finalize_first_n, summarize, FirstNOutcome};
pub use applicability::{
    applicable_turns, applies_to, locate_golden_target, require_n, ApplicabilityError,
    GoldenTarget,
};
pub use catalog::{
    Applicability, Catalog, CatalogError, FieldType, KwargField, KwargsSchema, Precondition,
    RuleDefinition, RuleKind,
};
pub use checks::{CheckId, CheckOutcome};
pub use conversation::{render_messages, user_text, Conversation, Message, Role, TranscriptError, Turn};
pub use heuristics::PreconditionHeuristic;
pub use kwargs::{extract_kwargs, KeywordExtractor, KwargsExtractor};
pub use tag::{parse, NSpec, ParsedRule, RuleSpec, RuleTag, TagError};
pub use types::{
    ConversationReport, EvaluationCase, GoldenReport, RuleRecord, SkippedRule, Summary,
    TurnEvaluation, Verdict, VerdictStatus,
};

use thiserror::Error;

/// Errors from the deterministic layer.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Tag error: {0}")]
    Tag(#[from] TagError),

    #[error("Transcript error: {0}")]
    Transcript(#[from] TranscriptError),

    #[error("Applicability error: {0}")]
    Applicability(#[from] ApplicabilityError),
}

/// Parse every entry of a case's rule list.
///
/// Fails on the first unresolvable tag; a bad tag is never skipped.
pub fn parse_rule_list(specs: &[RuleSpec], catalog: &Catalog) -> Result<Vec<ParsedRule>, TagError> {
    specs.iter().map(|spec| spec.parse(catalog)).collect()
}
