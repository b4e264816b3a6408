use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    User,
    Agent,
}

/// Presentation tag only. Carries no control-flow meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    #[default]
    Normal,
    Success,
    Fail,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Ordinal, unique within a transcript, strictly increasing.
    pub id: u64,
    pub text: String,
    pub sender: Sender,
    pub status: MessageStatus,
}

/// Append-only conversation log. Messages are never edited, removed or reordered.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_user(&mut self, text: impl Into<String>) -> &Message {
        self.push(text.into(), Sender::User, MessageStatus::Normal)
    }

    pub fn push_agent(&mut self, text: impl Into<String>, status: MessageStatus) -> &Message {
        self.push(text.into(), Sender::Agent, status)
    }

    fn push(&mut self, text: String, sender: Sender, status: MessageStatus) -> &Message {
        let id = self.messages.last().map_or(1, |m| m.id + 1);
        self.messages.push(Message {
            id,
            text,
            sender,
            status,
        });
        &self.messages[self.messages.len() - 1]
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Messages appended after the one with `id` (all of them for `0`).
    pub fn since(&self, id: u64) -> &[Message] {
        let start = self.messages.partition_point(|m| m.id <= id);
        &self.messages[start..]
    }
}
