//! Chat histories: an ordered list of messages per record.

use crate::core::{RecordPayload, Result};
use crate::manager::RecordManager;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

pub type ChatManager = RecordManager<ChatPayload>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: u64,
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub model_name: String,
    /// Generation speed in tokens per second; zero for user messages.
    #[serde(default)]
    pub tps: f32,
    #[serde(default)]
    pub is_liked: bool,
    #[serde(default)]
    pub is_disliked: bool,
    pub timestamp: DateTime<Utc>,
    /// Tool invocations attached by the agent layer, kept verbatim.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<serde_json::Value>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: 0,
            role,
            content: content.into(),
            model_name: String::new(),
            tps: 0.0,
            is_liked: false,
            is_disliked: false,
            timestamp: Utc::now(),
            tool_calls: Vec::new(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>, model_name: impl Into<String>, tps: f32) -> Self {
        Self {
            model_name: model_name.into(),
            tps,
            ..Self::new(Role::Assistant, content)
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatPayload {
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl ChatPayload {
    /// Appends `message`, numbering it after the last message.
    pub fn push(&mut self, mut message: Message) -> u64 {
        message.id = self.messages.last().map_or(1, |last| last.id + 1);
        let id = message.id;
        self.messages.push(message);
        id
    }

    pub fn last_assistant(&self) -> Option<&Message> {
        self.messages
            .iter()
            .rev()
            .find(|message| message.role == Role::Assistant)
    }
}

impl RecordPayload for ChatPayload {
    const KIND: &'static str = "chat";
    const FILE_EXTENSION: &'static str = "chat";
    const DEFAULT_NAME: &'static str = "New Chat";

    fn blank() -> Self {
        ChatPayload::default()
    }
}

impl RecordManager<ChatPayload> {
    /// Appends a message to `name` and queues a save.
    pub async fn append_message(&self, name: &str, message: Message) -> bool {
        self.edit(name, move |chat| {
            chat.push(message);
        })
        .await
        .is_ok()
    }

    pub async fn append_to_current(&self, message: Message) -> bool {
        self.edit_current(move |chat| {
            chat.push(message);
        })
        .await
        .is_ok()
    }

    /// Drops every message of the selected chat and waits for the save.
    pub async fn clear_current(&self) -> Result<()> {
        self.edit_current(|chat| chat.messages.clear())
            .await?
            .wait()
            .await
    }

    /// Companion file holding inference state of the selected chat for `model`.
    pub fn current_companion_path(&self, model: &str, variant: &str) -> Option<PathBuf> {
        let name = self.current_name()?;
        self.companion_path(&name, model, variant)
    }
}
