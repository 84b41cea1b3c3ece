use std::sync::Arc;
use uuid::Uuid;

use super::classifier::MessageClassifier;
use crate::domain::message::{Inbox, Message};
use crate::domain::state::SystemState;
use crate::domain::task::Priority;
use crate::errors::{CoordinatorError, CoordinatorResult};

/// Sender id used for notices the coordinator generates itself
pub const SYSTEM_SENDER: &str = "system";

/// Message creation and addressing over per-agent inboxes
///
/// Every created message is also pushed to the caller's outbox so it can
/// be dispatched once the state is persisted.
#[derive(Debug, Clone)]
pub struct MessageBus {
    classifier: Arc<MessageClassifier>,
}

impl MessageBus {
    pub fn new(classifier: Arc<MessageClassifier>) -> Self {
        Self { classifier }
    }

    /// Sends one message to a registered recipient
    pub fn send(
        &self,
        state: &mut SystemState,
        outbox: &mut Vec<Message>,
        sender: &str,
        recipient: &str,
        content: &str,
        subject: Option<String>,
        priority: Priority,
    ) -> CoordinatorResult<Uuid> {
        if state.agent(recipient).is_none() {
            return Err(CoordinatorError::UnknownRecipient(recipient.to_string()));
        }

        let kind = self.classifier.classify(content);
        let message = Message::new(sender, recipient, content, subject, priority, kind);
        let message_id = message.id();

        state.inbox_mut(recipient).push(message.clone());
        outbox.push(message);

        tracing::debug!(
            message_id = %message_id,
            sender = %sender,
            recipient = %recipient,
            message_type = %kind,
            "Message sent"
        );
        Ok(message_id)
    }

    /// Sends an independent copy to every registered agent except the sender
    ///
    /// Recipients are visited in agent id order. No recipients is not an error.
    pub fn broadcast(
        &self,
        state: &mut SystemState,
        outbox: &mut Vec<Message>,
        sender: &str,
        content: &str,
        subject: Option<String>,
        priority: Priority,
    ) -> CoordinatorResult<Vec<Uuid>> {
        let recipients: Vec<String> = state
            .agents()
            .keys()
            .filter(|id| id.as_str() != sender)
            .cloned()
            .collect();

        let mut ids = Vec::with_capacity(recipients.len());
        for recipient in &recipients {
            ids.push(self.send(
                state,
                outbox,
                sender,
                recipient,
                content,
                subject.clone(),
                priority,
            )?);
        }

        tracing::info!(sender = %sender, recipients = ids.len(), "Broadcast sent");
        Ok(ids)
    }

    pub fn get_inbox(&self, state: &SystemState, agent_id: &str) -> CoordinatorResult<Inbox> {
        if state.agent(agent_id).is_none() {
            return Err(CoordinatorError::UnknownAgent(agent_id.to_string()));
        }
        Ok(state.inbox(agent_id).cloned().unwrap_or_default())
    }

    /// Marks a message read; marking it again is a no-op
    pub fn mark_read(
        &self,
        state: &mut SystemState,
        agent_id: &str,
        message_id: Uuid,
    ) -> CoordinatorResult<bool> {
        if state.agent(agent_id).is_none() {
            return Err(CoordinatorError::UnknownAgent(agent_id.to_string()));
        }

        let message = state.inbox_mut(agent_id).get_mut(message_id).ok_or_else(|| {
            CoordinatorError::UnknownMessage {
                agent_id: agent_id.to_string(),
                message_id,
            }
        })?;

        Ok(message.mark_read())
    }

    /// Records a successful terminal delivery; unknown ids are ignored
    pub fn mark_delivered(&self, state: &mut SystemState, agent_id: &str, message_id: Uuid) -> bool {
        state
            .inbox_mut(agent_id)
            .get_mut(message_id)
            .map(Message::mark_delivered)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::registry::AgentRegistry;
    use crate::domain::message::{MessageStatus, MessageType};
    use std::collections::BTreeSet;

    fn setup(agents: &[&str]) -> (MessageBus, SystemState) {
        let registry = AgentRegistry::default();
        let mut state = SystemState::new();
        for id in agents {
            registry.register(&mut state, id, BTreeSet::new()).unwrap();
        }
        (MessageBus::new(Arc::new(MessageClassifier::new())), state)
    }

    #[test]
    fn send_to_unknown_recipient_fails() {
        let (bus, mut state) = setup(&["a"]);
        let mut outbox = Vec::new();

        let result = bus.send(&mut state, &mut outbox, "a", "ghost", "hi", None, Priority::Normal);

        assert!(matches!(result, Err(CoordinatorError::UnknownRecipient(_))));
        assert!(outbox.is_empty());
    }

    #[test]
    fn send_appends_to_recipient_inbox() {
        let (bus, mut state) = setup(&["a", "b"]);
        let mut outbox = Vec::new();

        let id = bus
            .send(
                &mut state,
                &mut outbox,
                "a",
                "b",
                "What is the API port?",
                Some("question".to_string()),
                Priority::High,
            )
            .unwrap();

        let inbox = bus.get_inbox(&state, "b").unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox.unread_count(), 1);
        let message = inbox.get(id).unwrap();
        assert_eq!(message.message_type(), MessageType::Question);
        assert_eq!(message.status(), MessageStatus::Sent);
        assert_eq!(outbox.len(), 1);
    }

    #[test]
    fn broadcast_skips_sender() {
        let (bus, mut state) = setup(&["a", "b", "c"]);
        let mut outbox = Vec::new();

        let ids = bus
            .broadcast(&mut state, &mut outbox, "a", "standup in 5", None, Priority::Normal)
            .unwrap();

        assert_eq!(ids.len(), 2);
        assert_eq!(bus.get_inbox(&state, "a").unwrap().len(), 0);
        assert_eq!(bus.get_inbox(&state, "b").unwrap().len(), 1);
        assert_eq!(bus.get_inbox(&state, "c").unwrap().len(), 1);
        assert_ne!(ids[0], ids[1]);
    }

    #[test]
    fn broadcast_from_unregistered_sender_reaches_all() {
        let (bus, mut state) = setup(&["a", "b"]);
        let mut outbox = Vec::new();

        let ids = bus
            .broadcast(&mut state, &mut outbox, "operator", "freeze", None, Priority::Urgent)
            .unwrap();
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn broadcast_in_single_agent_system_is_empty() {
        let (bus, mut state) = setup(&["solo"]);
        let mut outbox = Vec::new();

        let ids = bus
            .broadcast(&mut state, &mut outbox, "solo", "anyone?", None, Priority::Low)
            .unwrap();
        assert!(ids.is_empty());
    }

    #[test]
    fn mark_read_is_idempotent_and_tracks_unread() {
        let (bus, mut state) = setup(&["a", "b"]);
        let mut outbox = Vec::new();
        let id = bus
            .send(&mut state, &mut outbox, "a", "b", "ping", None, Priority::Normal)
            .unwrap();
        bus.send(&mut state, &mut outbox, "a", "b", "pong", None, Priority::Normal)
            .unwrap();

        assert!(bus.mark_read(&mut state, "b", id).unwrap());
        assert_eq!(bus.get_inbox(&state, "b").unwrap().unread_count(), 1);

        assert!(!bus.mark_read(&mut state, "b", id).unwrap());
        assert_eq!(bus.get_inbox(&state, "b").unwrap().unread_count(), 1);
    }

    #[test]
    fn mark_read_of_foreign_message_fails() {
        let (bus, mut state) = setup(&["a", "b"]);
        let mut outbox = Vec::new();
        let id = bus
            .send(&mut state, &mut outbox, "a", "b", "ping", None, Priority::Normal)
            .unwrap();

        let result = bus.mark_read(&mut state, "a", id);
        assert!(matches!(result, Err(CoordinatorError::UnknownMessage { .. })));
    }

    #[test]
    fn get_inbox_of_unknown_agent_fails() {
        let (bus, state) = setup(&[]);
        assert!(matches!(
            bus.get_inbox(&state, "ghost"),
            Err(CoordinatorError::UnknownAgent(_))
        ));
    }
}
