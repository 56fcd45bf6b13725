//! Public types for the chat API
use serde::{Deserialize, Serialize};

use crate::ai::chat::Turn;

#[derive(Serialize, Deserialize)]
pub struct ChatSessionCreated {
    pub id: String,
}

#[derive(Serialize, Deserialize)]
pub struct ChatRequest {
    pub session_id: String,
    pub message: String,
}

/// Events sent over the SSE stream while a reply is generated. Each
/// `Fragment` is appended to the reply being rendered; `Done` carries
/// the reply exactly as it was recorded in the transcript.
#[derive(Serialize, Deserialize, Debug, PartialEq)]
#[serde(untagged)]
pub enum ChatStreamEvent {
    Fragment { content: String },
    Done { done: bool, reply: String },
}

#[derive(Serialize, Deserialize)]
pub struct ChatTranscriptResponse {
    pub transcript: Vec<Turn>,
}
