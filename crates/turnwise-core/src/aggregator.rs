//! FIRST_N aggregation and conversation totals.
//!
//! A FIRST_N rule is decided per turn like any other rule, then folded here:
//! one triggered turn inside the window is enough and stands on its own
//! record. A window with evaluations but no trigger gets exactly one
//! synthesized failure record.

use std::collections::BTreeMap;

use crate::tag::RuleTag;
use crate::types::{RuleRecord, Summary, TurnEvaluation, Verdict};

/// What [`finalize_first_n`] decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirstNOutcome {
    /// Triggered at this turn; records left as they were
    Triggered { turn: usize },

    /// Never triggered; a failure record was added at this turn
    Synthesized { turn: usize },

    /// No evaluated record in the window; nothing to decide
    NeverApplicable,
}

/// Fold a FIRST_N rule's per-turn records for the window `0..n`.
///
/// The synthesized record goes on turn `n - 1`, or on the last evaluated
/// window turn when the conversation ended earlier.
pub fn finalize_first_n(
    evaluations: &mut BTreeMap<usize, TurnEvaluation>,
    tag: &RuleTag,
    n: u32,
) -> FirstNOutcome {
    let window = 0..n as usize;
    let mut last_evaluated = None;

    for (turn, evaluation) in evaluations.range(window.clone()) {
        for record in evaluation.records.iter().filter(|r| &r.rule == tag) {
            if record.verdict.triggered {
                return FirstNOutcome::Triggered { turn: *turn };
            }
            if record.verdict.was_evaluated() {
                last_evaluated = Some(*turn);
            }
        }
    }

    let Some(last_evaluated) = last_evaluated else {
        return FirstNOutcome::NeverApplicable;
    };

    let target = if evaluations.contains_key(&(window.end - 1)) {
        window.end - 1
    } else {
        last_evaluated
    };

    if let Some(evaluation) = evaluations.get_mut(&target) {
        evaluation
            .records
            .push(RuleRecord::new(tag.clone(), Verdict::synthesized(n)));
    }

    tracing::debug!(rule = %tag, n, turn = target, "FIRST_N rule never triggered");
    FirstNOutcome::Synthesized { turn: target }
}

/// Sum scores over all turns.
pub fn summarize(evaluations: &BTreeMap<usize, TurnEvaluation>) -> Summary {
    Summary {
        total_score: evaluations.values().map(TurnEvaluation::score).sum(),
        total_turns: evaluations.len(),
    }
}
