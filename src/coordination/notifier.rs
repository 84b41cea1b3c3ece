use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::config::MIN_NOTIFICATION_DELAY;
use crate::domain::message::Message;
use crate::domain::terminal::TerminalDriver;
use crate::errors::{CoordinatorError, CoordinatorResult};

/// Pushes rendered messages into agent terminals
///
/// Text and submit are separated by a fixed delay so the receiving session
/// has rendered the text before the execute action arrives. Deliveries are
/// serialized; a second call waits for the first to finish.
pub struct NotificationDispatcher {
    driver: Arc<dyn TerminalDriver>,
    delay: Duration,
    gate: Mutex<()>,
}

impl NotificationDispatcher {
    /// Creates a dispatcher; delays under 100ms are raised to 100ms
    pub fn new(driver: Arc<dyn TerminalDriver>, delay: Duration) -> Self {
        Self {
            driver,
            delay: delay.max(MIN_NOTIFICATION_DELAY),
            gate: Mutex::new(()),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn driver_name(&self) -> &str {
        self.driver.name()
    }

    /// Renders the one-line notification shown in the terminal
    pub fn render(message: &Message) -> String {
        let subject = message
            .subject()
            .map(|s| format!(" ({})", s))
            .unwrap_or_default();
        format!(
            "[{}] {} from {}{}: {}",
            message.priority(),
            message.message_type(),
            message.sender_id(),
            subject,
            message.content()
        )
    }

    /// Delivers one message to `agent_id`'s terminal
    ///
    /// The delay is counted from the moment `write_text` returns and is
    /// waited out even when the driver fails. Submit is skipped if writing
    /// the text failed.
    pub async fn send_terminal_notification(
        &self,
        agent_id: &str,
        message: &Message,
    ) -> CoordinatorResult<()> {
        let _guard = self.gate.lock().await;
        let text = Self::render(message);

        let written = self.driver.write_text(agent_id, &text).await;
        tokio::time::sleep(self.delay).await;

        let result = match written {
            Ok(()) => self.driver.submit(agent_id).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                tracing::debug!(
                    agent_id = %agent_id,
                    message_id = %message.id(),
                    driver = self.driver.name(),
                    "Notification delivered"
                );
                Ok(())
            }
            Err(CoordinatorError::DeliveryFailure { agent_id, reason }) => {
                Err(CoordinatorError::DeliveryFailure { agent_id, reason })
            }
            Err(other) => Err(CoordinatorError::delivery(agent_id, other.to_string())),
        }
    }
}

impl std::fmt::Debug for NotificationDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationDispatcher")
            .field("driver", &self.driver.name())
            .field("delay", &self.delay)
            .finish()
    }
}
