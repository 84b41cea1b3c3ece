// Coordination services
// Stateless components operate on a borrowed SystemState; the manager owns
// persistence, locking and notification dispatch.

pub mod classifier;
pub mod decision;
pub mod manager;
pub mod messaging;
pub mod notifier;
pub mod poller;
pub mod registry;
pub mod tasks;

pub use classifier::MessageClassifier;
pub use decision::DecisionEngine;
pub use manager::{Assignment, AssignmentReport, MessagingStats, SharedStateManager, SystemStats};
pub use messaging::{MessageBus, SYSTEM_SENDER};
pub use notifier::NotificationDispatcher;
pub use poller::PollScheduler;
pub use registry::AgentRegistry;
pub use tasks::TaskLifecycleManager;
