//! Turn applicability.
//!
//! Maps a rule's applicability class and N onto concrete turn indices.
//! N is a 1-based turn count or position; turn indices are 0-based, so the
//! Nth turn is index `N - 1`.

use thiserror::Error;

use crate::catalog::Applicability;
use crate::conversation::{Conversation, Message, Role};

/// Errors from applicability resolution.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApplicabilityError {
    #[error("{0} rule needs an N")]
    MissingN(Applicability),

    #[error("N must be at least 1 for {0} rules")]
    ZeroN(Applicability),
}

/// Check that a multi-turn rule has a usable N.
pub fn require_n(applicability: Applicability, n: Option<u32>) -> Result<Option<u32>, ApplicabilityError> {
    match (applicability, n) {
        (Applicability::Single, n) => Ok(n),
        (class, None) => Err(ApplicabilityError::MissingN(class)),
        (class, Some(0)) => Err(ApplicabilityError::ZeroN(class)),
        (_, Some(n)) => Ok(Some(n)),
    }
}

/// Whether a rule applies to a turn index, ignoring whether the turn was answered.
pub fn applies_to(applicability: Applicability, n: Option<u32>, turn_index: usize) -> bool {
    match (applicability, n) {
        (Applicability::Single, _) => true,
        (Applicability::NTh, Some(n)) => n >= 1 && turn_index == (n - 1) as usize,
        (Applicability::FirstN, Some(n)) => turn_index < n as usize,
        (_, None) => false,
    }
}

/// Turn indices a rule is evaluated against.
///
/// Only turns with an assistant reply qualify. An N_th rule whose turn has no
/// reply yields nothing.
pub fn applicable_turns(
    applicability: Applicability,
    n: Option<u32>,
    conversation: &Conversation,
) -> Result<Vec<usize>, ApplicabilityError> {
    let n = require_n(applicability, n)?;
    Ok(conversation
        .answered_turns()
        .filter(|&index| applies_to(applicability, n, index))
        .collect())
}

/// Target message of an N-based rule in golden-history mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoldenTarget {
    /// Flat index of the existing assistant message to judge
    Found(usize),

    /// The computed position is past the end or not an assistant message
    OutOfRange { position: usize },
}

/// Locate the Nth assistant reply in a fixed flat transcript.
///
/// The position is `start + 2*(N-1) + 1`, where `start` is 1 when the
/// transcript opens with a system message. The transcript is assumed to
/// alternate user/assistant; anything else at that position fails closed.
pub fn locate_golden_target(messages: &[Message], n: u32) -> GoldenTarget {
    let start = usize::from(messages.first().is_some_and(|m| m.role == Role::System));
    let position = start + 2 * (n.max(1) as usize - 1) + 1;

    match messages.get(position) {
        Some(message) if message.role == Role::Assistant => GoldenTarget::Found(position),
        _ => GoldenTarget::OutOfRange { position },
    }
}
