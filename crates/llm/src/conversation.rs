//! Conversation model.
//!
//! A [`Conversation`] is the ordered list of messages sent to a provider.
//! At most one message has the [`Role::System`] role and, when present, it
//! is the first message. Every mutating operation keeps that invariant.

use lrepl_core::AppResult;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::warn;

/// Default number of recent messages kept by truncation.
pub const DEFAULT_KEEP_RECENT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    /// Parse a wire role; anything unrecognized is a user message.
    pub fn parse_lenient(s: &str) -> Self {
        match s {
            "system" => Self::System,
            "assistant" => Self::Assistant,
            "user" => Self::User,
            other => {
                warn!("Unknown role '{}', treating as user", other);
                Self::User
            }
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::System => "System",
            Self::User => "User",
            Self::Assistant => "Assistant",
        }
    }
}

impl Serialize for Role {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse_lenient(&raw))
    }
}

/// One role-tagged message. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    role: Role,
    content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Rough token count: one token per four bytes of content.
    pub fn estimate_tokens(&self) -> usize {
        self.content.len() / 4
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// A conversation that starts with `system_prompt`, or empty if it is blank.
    pub fn with_system_prompt(system_prompt: &str) -> Self {
        let mut conversation = Self::new();
        if !system_prompt.trim().is_empty() {
            conversation.set_system_prompt(system_prompt);
        }
        conversation
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.messages
            .first()
            .filter(|m| m.role == Role::System)
            .map(Message::content)
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Add a system message. Only an empty conversation gets a plain
    /// append; otherwise this replaces or inserts the leading system message.
    pub fn add_system(&mut self, content: impl Into<String>) {
        if self.messages.is_empty() {
            self.messages.push(Message::system(content));
        } else {
            self.set_system_prompt(content);
        }
    }

    pub fn add_user(&mut self, content: impl Into<String>) {
        self.messages.push(Message::user(content));
    }

    pub fn add_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(Message::assistant(content));
    }

    /// Replace the leading system message, or insert one at index 0.
    pub fn set_system_prompt(&mut self, content: impl Into<String>) {
        let message = Message::system(content);
        match self.messages.first_mut() {
            Some(first) if first.role == Role::System => *first = message,
            _ => self.messages.insert(0, message),
        }
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Sum of [`Message::estimate_tokens`]. This is a byte-length heuristic,
    /// not a tokenizer, and can be off by a wide margin for non-English text.
    pub fn estimate_tokens(&self) -> usize {
        self.messages.iter().map(Message::estimate_tokens).sum()
    }

    /// Sliding-window truncation.
    ///
    /// Does nothing while the estimate fits in `max_tokens`. Otherwise keeps
    /// the system message, if any, followed by the last `keep_recent` other
    /// messages in their original order.
    pub fn truncate_to_token_limit(&mut self, max_tokens: usize, keep_recent: usize) {
        let estimate = self.estimate_tokens();
        if estimate <= max_tokens {
            return;
        }

        let (system, rest): (Vec<Message>, Vec<Message>) = std::mem::take(&mut self.messages)
            .into_iter()
            .partition(|m| m.role == Role::System);

        let skip = rest.len().saturating_sub(keep_recent);
        self.messages = system.into_iter().take(1).chain(rest.into_iter().skip(skip)).collect();

        tracing::debug!(
            estimate,
            max_tokens,
            kept = self.messages.len(),
            "Truncated conversation"
        );
    }

    /// Ordered `{role, content}` records.
    pub fn to_wire_format(&self) -> Vec<Message> {
        self.messages.clone()
    }

    /// Rebuild from records, restoring the system-message invariant: the
    /// first system record moves to the front and later ones are dropped.
    pub fn from_wire_format(records: Vec<Message>) -> Self {
        let mut system = None;
        let mut rest = Vec::with_capacity(records.len());

        for message in records {
            if message.role != Role::System {
                rest.push(message);
            } else if system.is_none() {
                system = Some(message);
            } else {
                warn!("Dropping extra system message");
            }
        }

        Self {
            messages: system.into_iter().chain(rest).collect(),
        }
    }

    /// Pretty JSON array of `{role, content}` records.
    pub fn to_json_string(&self) -> AppResult<String> {
        Ok(serde_json::to_string_pretty(&self.messages)?)
    }

    pub fn from_json_str(json: &str) -> AppResult<Self> {
        let records: Vec<Message> = serde_json::from_str(json)?;
        Ok(Self::from_wire_format(records))
    }

    /// `[Role] content` lines for display.
    pub fn to_transcript(&self) -> String {
        self.messages
            .iter()
            .map(|m| format!("[{}] {}", m.role.label(), m.content))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
