//! Agent State Coordinator Library
//!
//! Shared state and messaging for a set of cooperating agent processes:
//! agent liveness and status, task lifecycle, per-agent inboxes, message
//! classification, terminal notifications and capability-based assignment.
//! All state flows through [`coordination::SharedStateManager`], which
//! persists every mutation to a JSON file or SQLite database.

pub mod cli;
pub mod config;
pub mod coordination;
pub mod domain;
pub mod errors;
pub mod infrastructure;
pub mod logging;
pub mod recovery;
