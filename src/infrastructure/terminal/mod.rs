// Terminal delivery drivers

pub mod log_terminal;

pub use log_terminal::LogTerminal;
