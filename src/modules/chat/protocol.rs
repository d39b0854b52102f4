use std::fmt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    Bot,
    You,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Stream,
    Thinking,
    ModerationError,
    Start,
    End,
    StartFollowup,
    StreamFollowup,
    EndFollowup,
    Error,
}

/// Envelope for every frame sent to the chat client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub sender: Sender,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
}

impl ChatResponse {
    pub fn bot(kind: MessageKind, message: impl Into<String>) -> Self {
        Self { sender: Sender::Bot, message: message.into(), kind }
    }

    pub fn you(message: impl Into<String>) -> Self {
        Self { sender: Sender::You, message: message.into(), kind: MessageKind::Stream }
    }
}

/// The client went away; the session should end.
#[derive(Debug, Clone, Copy)]
pub struct Disconnected;

impl fmt::Display for Disconnected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chat client disconnected")
    }
}

impl std::error::Error for Disconnected {}

/// Sending half of a session's frame queue.
#[derive(Clone)]
pub struct Outbox {
    tx: mpsc::Sender<ChatResponse>,
}

impl Outbox {
    pub fn new(tx: mpsc::Sender<ChatResponse>) -> Self {
        Self { tx }
    }

    pub async fn send(&self, response: ChatResponse) -> Result<(), Disconnected> {
        self.tx.send(response).await.map_err(|_| Disconnected)
    }

    pub async fn bot(&self, kind: MessageKind, message: impl Into<String>) -> Result<(), Disconnected> {
        self.send(ChatResponse::bot(kind, message)).await
    }
}
