//! Conversation transcript model and window policy.
//!
//! A transcript is the ordered list of turns sent to the completion API on
//! every exchange. The first turn is always the deployment's system
//! instruction; it is written once when the transcript is created and is
//! never dropped by the window policy.

use serde::{Deserialize, Serialize};

/// Maximum number of turns kept before a new user turn is appended.
pub const DEFAULT_WINDOW: usize = 20;

/// Author of a single turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One role-tagged message. Serializes as `{"role": ..., "content": ...}`,
/// which is both the stored JSONB shape and the chat-completions wire shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Ordered dialogue history for one conversation key.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    /// Start a new transcript holding only the system instruction.
    pub fn new(system_prompt: &str) -> Self {
        Self {
            turns: vec![Turn::system(system_prompt)],
        }
    }

    /// Wrap turns loaded from storage as-is.
    pub fn from_turns(turns: Vec<Turn>) -> Self {
        Self { turns }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// The leading system turn, if the transcript has one.
    pub fn system_turn(&self) -> Option<&Turn> {
        self.turns.first().filter(|t| t.role == Role::System)
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.turns.push(Turn::user(content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.turns.push(Turn::assistant(content));
    }

    /// Truncate to at most `max_turns` turns, keeping the first turn and the
    /// most recent `max_turns - 1`. Returns the number of turns dropped.
    ///
    /// Transcripts at or under the bound are left untouched.
    pub fn apply_window(&mut self, max_turns: usize) -> usize {
        let len = self.turns.len();
        if max_turns == 0 || len <= max_turns {
            return 0;
        }
        let keep_tail = max_turns - 1;
        let dropped = len - 1 - keep_tail;
        self.turns.drain(1..1 + dropped);
        dropped
    }

    pub fn into_turns(self) -> Vec<Turn> {
        self.turns
    }
}
