use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Delivery state of a single message copy
///
/// ```text
/// Sent -> Delivered -> Read
///   └----------------> Read
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// Stored in the recipient's inbox
    Sent,
    /// Rendered into the recipient's terminal
    Delivered,
    /// Acknowledged by the recipient
    Read,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Sent => "sent",
            MessageStatus::Delivered => "delivered",
            MessageStatus::Read => "read",
        }
    }
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sent" => Ok(MessageStatus::Sent),
            "delivered" => Ok(MessageStatus::Delivered),
            "read" => Ok(MessageStatus::Read),
            other => Err(format!("Unknown message status: {}", other)),
        }
    }
}

/// Semantic category assigned to message content
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    StatusReport,
    ToolUseNotice,
    Question,
    ErrorReport,
    TaskUpdate,
    #[default]
    Generic,
}

impl MessageType {
    pub const ALL: [MessageType; 6] = [
        MessageType::StatusReport,
        MessageType::ToolUseNotice,
        MessageType::Question,
        MessageType::ErrorReport,
        MessageType::TaskUpdate,
        MessageType::Generic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::StatusReport => "status_report",
            MessageType::ToolUseNotice => "tool_use_notice",
            MessageType::Question => "question",
            MessageType::ErrorReport => "error_report",
            MessageType::TaskUpdate => "task_update",
            MessageType::Generic => "generic",
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MessageType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("Unknown message type: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_type_names_round_trip() {
        for kind in MessageType::ALL {
            assert_eq!(kind.as_str().parse::<MessageType>(), Ok(kind));
        }
    }

    #[test]
    fn message_status_display() {
        assert_eq!(MessageStatus::Delivered.to_string(), "delivered");
        assert!("lost".parse::<MessageStatus>().is_err());
    }
}
