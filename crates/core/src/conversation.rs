//! Conversation Store
//!
//! Owns the ordered list of turns for one session and enforces the bounded
//! history: the system turn at position 0 is permanent, and at most
//! `max_history` further turns are retained. Every mutation is published to an
//! optional observer as a [`ConversationSnapshot`], which is how the
//! orchestrator learns about changes.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// The author of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// One message in the conversation.
///
/// Serializes as `{"role": ..., "content": ...}`, the element format expected
/// by the remote completion service.
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

/// The fully-applied state of a conversation right after one mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationSnapshot {
    pub turns: Vec<Turn>,
}

impl ConversationSnapshot {
    pub fn last_turn(&self) -> Option<&Turn> {
        self.turns.last()
    }
}

/// Ordered, bounded conversation history for one session.
#[derive(Debug)]
pub struct Conversation {
    turns: Vec<Turn>,
    max_history: usize,
    observer: Option<mpsc::UnboundedSender<ConversationSnapshot>>,
}

impl Conversation {
    /// Starts a conversation holding only the system turn.
    ///
    /// A `max_history` of zero is raised to one; eviction always needs a
    /// non-system slot to free.
    pub fn new(system_prompt: impl Into<String>, max_history: usize) -> Self {
        Self {
            turns: vec![Turn::system(system_prompt)],
            max_history: max_history.max(1),
            observer: None,
        }
    }

    /// Attaches the channel that receives a snapshot after every mutation.
    pub fn with_observer(mut self, observer: mpsc::UnboundedSender<ConversationSnapshot>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Always false: the system turn is never removed.
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }

    /// The most recent turn, or the system turn when nothing else exists.
    pub fn last_turn(&self) -> &Turn {
        // The vector is created with the system turn and position 0 is never evicted.
        &self.turns[self.turns.len() - 1]
    }

    pub fn snapshot(&self) -> ConversationSnapshot {
        ConversationSnapshot {
            turns: self.turns.clone(),
        }
    }

    /// Appends a user turn. Empty or whitespace-only text is ignored.
    ///
    /// Returns whether the conversation changed.
    pub fn append_user_turn(&mut self, text: &str) -> bool {
        if text.trim().is_empty() {
            debug!("Ignoring empty user turn");
            return false;
        }
        self.push(Turn::user(text));
        true
    }

    /// Appends an assistant turn, evicting the oldest non-system turn if the
    /// history is full.
    pub fn append_assistant_turn(&mut self, text: &str) {
        self.push(Turn::assistant(text));
    }

    fn push(&mut self, turn: Turn) {
        // Position 1 is evicted regardless of its role.
        if self.turns.len() > self.max_history {
            let evicted = self.turns.remove(1);
            debug!(role = %evicted.role, "Evicted oldest turn from history");
        }
        debug!(role = %turn.role, len = self.turns.len() + 1, "Appending turn");
        self.turns.push(turn);
        self.notify();
    }

    fn notify(&self) {
        if let Some(observer) = &self.observer {
            if observer.send(self.snapshot()).is_err() {
                warn!("Failed to publish conversation change: observer dropped.");
            }
        }
    }
}
