//! Transcript model.
//!
//! A transcript arrives as a flat list of role-tagged messages and is grouped
//! into [`Turn`]s keyed by a zero-based turn index. A leading system message
//! is kept apart and never counts as a turn.
//!
//! Datasets number turns either from 0, or from 1 when a system message
//! holds turn id 0. Behind a leading system message, ids are taken relative
//! to the first turn's id, so both layouts group the same way.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors from transcript validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TranscriptError {
    #[error("System message at position {position}; only a leading system message is allowed")]
    MisplacedSystem { position: usize },

    #[error("Turn ids must be contiguous: expected {expected}, found {found}")]
    NonContiguousTurn { expected: usize, found: usize },

    #[error("Turn {turn} has more than one {role} message")]
    DuplicateRole { turn: usize, role: Role },

    #[error("Turn {turn}: user message follows the assistant message")]
    UserAfterAssistant { turn: usize },
}

/// Message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One transcript message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,

    /// Turn id; derived from message order when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn_id: Option<usize>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content, None)
    }

    pub fn user(turn_id: usize, content: impl Into<String>) -> Self {
        Self::new(Role::User, content, Some(turn_id))
    }

    pub fn assistant(turn_id: usize, content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content, Some(turn_id))
    }

    pub fn new(role: Role, content: impl Into<String>, turn_id: Option<usize>) -> Self {
        Self {
            role,
            content: content.into(),
            turn_id,
        }
    }
}

/// A user utterance and the assistant reply to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub index: usize,
    pub user: Option<String>,
    pub assistant: Option<String>,
}

impl Turn {
    fn new(index: usize) -> Self {
        Self {
            index,
            user: None,
            assistant: None,
        }
    }

    pub fn has_assistant(&self) -> bool {
        self.assistant.is_some()
    }
}

/// A validated transcript.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub system: Option<String>,
    pub turns: Vec<Turn>,
}

impl Conversation {
    /// Group flat messages into turns.
    ///
    /// Turn ids must never skip. They start at 0, or anywhere behind a
    /// leading system message, and are renumbered from 0. Messages without
    /// a turn id join the current turn unless their role is already filled
    /// there.
    pub fn from_messages(messages: &[Message]) -> Result<Self, TranscriptError> {
        let mut system = None;
        let mut turns: Vec<Turn> = Vec::new();
        let base = turn_id_base(messages);

        for (position, message) in messages.iter().enumerate() {
            if message.role == Role::System {
                if position != 0 {
                    return Err(TranscriptError::MisplacedSystem { position });
                }
                system = Some(message.content.clone());
                continue;
            }

            let index = match (message.turn_id, turns.last()) {
                (Some(id), _) => id.checked_sub(base).ok_or(TranscriptError::NonContiguousTurn {
                    expected: turns.last().map_or(base, |t| t.index + 1 + base),
                    found: id,
                })?,
                (None, None) => 0,
                (None, Some(current)) if starts_new_turn(current, message.role) => current.index + 1,
                (None, Some(current)) => current.index,
            };

            let needs_turn = turns.last().map_or(true, |t| t.index != index);
            if needs_turn {
                let expected = turns.last().map_or(0, |t| t.index + 1);
                if index != expected {
                    return Err(TranscriptError::NonContiguousTurn {
                        expected: expected + base,
                        found: index + base,
                    });
                }
                turns.push(Turn::new(index));
            }

            if let Some(turn) = turns.last_mut() {
                place(turn, message)?;
            }
        }

        Ok(Self { system, turns })
    }

    pub fn turn(&self, index: usize) -> Option<&Turn> {
        self.turns.get(index)
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Indices of turns that carry an assistant reply.
    pub fn answered_turns(&self) -> impl Iterator<Item = usize> + '_ {
        self.turns.iter().filter(|t| t.has_assistant()).map(|t| t.index)
    }

    /// Flat message list, system message first, with explicit turn ids.
    pub fn flatten(&self) -> Vec<Message> {
        let mut messages = Vec::with_capacity(self.turns.len() * 2 + 1);
        if let Some(system) = &self.system {
            messages.push(Message::system(system.clone()));
        }
        for turn in &self.turns {
            if let Some(user) = &turn.user {
                messages.push(Message::user(turn.index, user.clone()));
            }
            if let Some(assistant) = &turn.assistant {
                messages.push(Message::assistant(turn.index, assistant.clone()));
            }
        }
        messages
    }

    /// Judge context for the reply at `index`: the system message, earlier
    /// turns in full, then the user utterance the reply answers.
    pub fn context_messages(&self, index: usize) -> Vec<Message> {
        let mut messages = self.flatten();
        messages.retain(|m| match m.turn_id {
            Some(turn) if turn == index => m.role == Role::User,
            Some(turn) => turn < index,
            None => true,
        });
        messages
    }
}

/// `role: content` lines for a flat message slice.
pub fn render_messages(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// User utterances of a flat message slice, newline separated.
pub fn user_text(messages: &[Message]) -> String {
    messages
        .iter()
        .filter(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Turn id that maps to index 0: the first turn's id behind a leading
/// system message, otherwise 0.
fn turn_id_base(messages: &[Message]) -> usize {
    match messages.first() {
        Some(first) if first.role == Role::System => messages
            .iter()
            .skip(1)
            .find_map(|m| m.turn_id)
            .unwrap_or(0),
        _ => 0,
    }
}

fn starts_new_turn(current: &Turn, role: Role) -> bool {
    match role {
        Role::User => current.user.is_some() || current.assistant.is_some(),
        Role::Assistant => current.assistant.is_some(),
        Role::System => false,
    }
}

fn place(turn: &mut Turn, message: &Message) -> Result<(), TranscriptError> {
    match message.role {
        Role::User => {
            if turn.user.is_some() {
                return Err(TranscriptError::DuplicateRole {
                    turn: turn.index,
                    role: Role::User,
                });
            }
            if turn.assistant.is_some() {
                return Err(TranscriptError::UserAfterAssistant { turn: turn.index });
            }
            turn.user = Some(message.content.clone());
        }
        Role::Assistant => {
            if turn.assistant.is_some() {
                return Err(TranscriptError::DuplicateRole {
                    turn: turn.index,
                    role: Role::Assistant,
                });
            }
            turn.assistant = Some(message.content.clone());
        }
        Role::System => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_groups_explicit_turn_ids() {
        let messages = vec![
            Message::system("你是健康顾问"),
            Message::user(0, "你好"),
            Message::assistant(0, "您好，哪里不舒服？"),
            Message::user(1, "血糖高"),
        ];
        let conversation = Conversation::from_messages(&messages).unwrap();

        assert_eq!(conversation.system.as_deref(), Some("你是健康顾问"));
        assert_eq!(conversation.len(), 2);
        assert!(conversation.turns[0].has_assistant());
        assert!(!conversation.turns[1].has_assistant());
        assert_eq!(conversation.answered_turns().collect::<Vec<_>>(), vec![0]);
    }

    #[test]
    fn test_derives_missing_turn_ids() {
        let messages = vec![
            Message::new(Role::User, "a", None),
            Message::new(Role::Assistant, "b", None),
            Message::new(Role::User, "c", None),
            Message::new(Role::Assistant, "d", None),
        ];
        let conversation = Conversation::from_messages(&messages).unwrap();
        assert_eq!(conversation.len(), 2);
        assert_eq!(conversation.turns[1].user.as_deref(), Some("c"));
    }

    #[test]
    fn test_rejects_gaps_and_misordering() {
        let gap = vec![Message::user(0, "a"), Message::user(2, "b")];
        assert_eq!(
            Conversation::from_messages(&gap),
            Err(TranscriptError::NonContiguousTurn {
                expected: 1,
                found: 2
            })
        );

        let misordered = vec![Message::assistant(0, "a"), Message::user(0, "b")];
        assert_eq!(
            Conversation::from_messages(&misordered),
            Err(TranscriptError::UserAfterAssistant { turn: 0 })
        );

        let late_system = vec![Message::user(0, "a"), Message::system("s")];
        assert!(matches!(
            Conversation::from_messages(&late_system),
            Err(TranscriptError::MisplacedSystem { position: 1 })
        ));
    }

    #[test]
    fn test_flatten_and_render() {
        let messages = vec![
            Message::system("s"),
            Message::user(0, "u0"),
            Message::assistant(0, "a0"),
            Message::user(1, "u1"),
            Message::assistant(1, "a1"),
        ];
        let conversation = Conversation::from_messages(&messages).unwrap();
        assert_eq!(conversation.flatten(), messages);
        assert_eq!(conversation.context_messages(0), messages[..2].to_vec());
        assert_eq!(
            render_messages(&conversation.context_messages(1)),
            "system: s\nuser: u0\nassistant: a0\nuser: u1"
        );
        assert_eq!(user_text(&messages), "u0\nu1");
    }

    #[test]
    fn test_system_turn_zero_layout() {
        // system holds turn 0, the dialogue starts at turn 1
        let messages = vec![
            Message::new(Role::System, "你是健康顾问", Some(0)),
            Message::user(1, "你好"),
            Message::assistant(1, "您好，哪里不舒服？"),
            Message::user(2, "血糖高"),
        ];
        let conversation = Conversation::from_messages(&messages).unwrap();

        assert_eq!(conversation.len(), 2);
        assert_eq!(conversation.turns[0].user.as_deref(), Some("你好"));
        assert_eq!(conversation.turns[1].index, 1);
        assert_eq!(conversation.answered_turns().collect::<Vec<_>>(), vec![0]);
        assert_eq!(render_messages(&conversation.context_messages(1)), "system: 你是健康顾问\nuser: 你好\nassistant: 您好，哪里不舒服？\nuser: 血糖高");
    }

    #[test]
    fn test_offset_ids_need_leading_system() {
        let no_system = vec![Message::user(1, "你好")];
        assert_eq!(
            Conversation::from_messages(&no_system),
            Err(TranscriptError::NonContiguousTurn {
                expected: 0,
                found: 1
            })
        );

        let gap = vec![
            Message::system("s"),
            Message::user(1, "a"),
            Message::user(3, "b"),
        ];
        assert_eq!(
            Conversation::from_messages(&gap),
            Err(TranscriptError::NonContiguousTurn {
                expected: 2,
                found: 3
            })
        );
    }
}
