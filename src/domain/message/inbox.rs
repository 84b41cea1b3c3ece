use super::message::Message;
use super::value_objects::MessageType;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-agent ordered message list, oldest first
///
/// The unread count is always derived from the messages themselves.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Inbox {
    messages: Vec<Message>,
}

impl Inbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub(crate) fn get_mut(&mut self, message_id: Uuid) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.id() == message_id)
    }

    pub fn get(&self, message_id: Uuid) -> Option<&Message> {
        self.messages.iter().find(|m| m.id() == message_id)
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn unread(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(|m| !m.is_read())
    }

    pub fn unread_count(&self) -> usize {
        self.unread().count()
    }

    pub fn of_type(&self, kind: MessageType) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(move |m| m.message_type() == kind)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Rebuilds an inbox from stored messages in arrival order
    pub fn from_persistence(messages: Vec<Message>) -> Self {
        Self { messages }
    }
}
