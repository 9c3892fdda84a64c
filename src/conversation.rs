//! Conversation state
//!
//! An append-only, ordered list of user and bot messages. Every message gets
//! a session-unique identifier; appending a message whose identifier is
//! already present is an error rather than an overwrite.

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;

use crate::{Error, Result};

/// Opaque message identifier, unique within a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct MessageId(u64);

impl MessageId {
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Raw identifier value
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Bot,
}

/// A single conversation entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    id: MessageId,
    role: Role,
    text: String,
}

impl Message {
    #[must_use]
    pub fn new(id: MessageId, role: Role, text: impl Into<String>) -> Self {
        Self {
            id,
            role,
            text: text.into(),
        }
    }

    #[must_use]
    pub const fn id(&self) -> MessageId {
        self.id
    }

    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Ordered message history for one session
#[derive(Debug, Default)]
pub struct Conversation {
    messages: Vec<Message>,
    ids: HashSet<MessageId>,
    next_id: u64,
}

impl Conversation {
    /// Create an empty conversation
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a new message and return it
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateMessage`] if the allocated id is already taken,
    /// which is also how an exhausted id space surfaces
    pub fn push(&mut self, role: Role, text: impl Into<String>) -> Result<&Message> {
        let id = MessageId(self.next_id);
        self.next_id = self.next_id.saturating_add(1);
        self.append(Message::new(id, role, text))
    }

    /// Append a message that already carries an identifier
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateMessage`] if the identifier is already present
    pub fn append(&mut self, message: Message) -> Result<&Message> {
        if !self.ids.insert(message.id) {
            return Err(Error::DuplicateMessage(message.id.get()));
        }
        self.next_id = self.next_id.max(message.id.get().saturating_add(1));
        self.messages.push(message);
        Ok(&self.messages[self.messages.len() - 1])
    }

    /// Messages in insertion order
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Most recent message
    #[must_use]
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }
}
