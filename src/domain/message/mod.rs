// Message domain module
// Contains message copies, per-agent inboxes, and their value objects

#![allow(clippy::module_inception)]

pub mod inbox;
pub mod message;
pub mod value_objects;

pub use inbox::Inbox;
pub use message::Message;
pub use value_objects::{MessageStatus, MessageType};
