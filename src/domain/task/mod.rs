// Task domain module
// Contains task aggregate root, value objects, and domain events

#![allow(clippy::module_inception)]

pub mod events;
pub mod task;
pub mod value_objects;

pub use events::TaskEvent;
pub use task::Task;
pub use value_objects::{Priority, TaskStatus};
