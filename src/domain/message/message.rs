use super::value_objects::{MessageStatus, MessageType};
use crate::domain::task::Priority;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single message copy addressed to exactly one agent
///
/// Content is immutable once created; status only moves forward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    message_id: Uuid,
    sender_id: String,
    recipient_id: String,
    subject: Option<String>,
    content: String,
    priority: Priority,
    #[serde(default)]
    message_type: MessageType,
    timestamp: DateTime<Utc>,
    status: MessageStatus,
}

impl Message {
    pub fn new(
        sender_id: impl Into<String>,
        recipient_id: impl Into<String>,
        content: impl Into<String>,
        subject: Option<String>,
        priority: Priority,
        message_type: MessageType,
    ) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            sender_id: sender_id.into(),
            recipient_id: recipient_id.into(),
            subject,
            content: content.into(),
            priority,
            message_type,
            timestamp: Utc::now(),
            status: MessageStatus::Sent,
        }
    }

    /// Marks the message read; returns `false` if it already was
    pub fn mark_read(&mut self) -> bool {
        if self.status == MessageStatus::Read {
            return false;
        }
        self.status = MessageStatus::Read;
        true
    }

    /// Promotes a sent message to delivered; read messages are left alone
    pub fn mark_delivered(&mut self) -> bool {
        if self.status != MessageStatus::Sent {
            return false;
        }
        self.status = MessageStatus::Delivered;
        true
    }

    pub fn is_read(&self) -> bool {
        self.status == MessageStatus::Read
    }

    // ===== Getters =====

    pub fn id(&self) -> Uuid {
        self.message_id
    }

    pub fn sender_id(&self) -> &str {
        &self.sender_id
    }

    pub fn recipient_id(&self) -> &str {
        &self.recipient_id
    }

    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn status(&self) -> MessageStatus {
        self.status
    }

    /// Reconstructs a Message from persistence layer data
    #[allow(clippy::too_many_arguments)]
    pub fn from_persistence(
        message_id: Uuid,
        sender_id: String,
        recipient_id: String,
        subject: Option<String>,
        content: String,
        priority: Priority,
        message_type: MessageType,
        timestamp: DateTime<Utc>,
        status: MessageStatus,
    ) -> Self {
        Self {
            message_id,
            sender_id,
            recipient_id,
            subject,
            content,
            priority,
            message_type,
            timestamp,
            status,
        }
    }
}
