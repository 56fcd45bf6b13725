//! The core models for keeping track of a conversation with an LLM.
use serde::{Deserialize, Serialize};

use crate::openai::{Message, Role};

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Assistant,
}

impl From<Speaker> for Role {
    fn from(speaker: Speaker) -> Role {
        match speaker {
            Speaker::User => Role::User,
            Speaker::Assistant => Role::Assistant,
        }
    }
}

/// One message in the conversation. Immutable once created.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Turn {
    role: Speaker,
    text: String,
}

impl Turn {
    pub fn new(role: Speaker, text: &str) -> Self {
        Self {
            role,
            text: text.to_string(),
        }
    }

    pub fn user(text: &str) -> Self {
        Self::new(Speaker::User, text)
    }

    pub fn assistant(text: &str) -> Self {
        Self::new(Speaker::Assistant, text)
    }

    pub fn role(&self) -> Speaker {
        self.role
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

impl From<&Turn> for Message {
    fn from(turn: &Turn) -> Message {
        Message::new(turn.role.into(), &turn.text)
    }
}

/// Append-only, chronologically ordered history of a single session.
/// The only way to remove turns is to clear all of them.
#[derive(Default, Clone, Debug)]
pub struct Transcript(Vec<Turn>);

impl Transcript {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn new_with_turns(turns: Vec<Turn>) -> Self {
        Self(turns)
    }

    pub fn append(&mut self, turn: Turn) {
        self.0.push(turn)
    }

    pub fn clear(&mut self) {
        self.0.clear()
    }

    pub fn all(&self) -> &[Turn] {
        &self.0
    }

    /// The last `limit` turns, or all of them when `limit` is `None`.
    pub fn recent(&self, limit: Option<usize>) -> &[Turn] {
        match limit {
            Some(n) if n < self.0.len() => &self.0[self.0.len() - n..],
            _ => &self.0,
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Turn> {
        self.0.iter()
    }
}
