// Domain layer module exports
// Entities, value objects and repository interfaces; independent of
// storage and terminal concerns

pub mod agent;
pub mod message;
pub mod repositories;
pub mod state;
pub mod task;
pub mod terminal;

pub use agent::{Agent, AgentStatus};
pub use message::{Inbox, Message, MessageStatus, MessageType};
pub use state::{SystemState, SystemStatus};
pub use task::{Priority, Task, TaskEvent, TaskStatus};
pub use terminal::TerminalDriver;
