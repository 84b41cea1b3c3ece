// Infrastructure layer module
// Contains storage adapters and terminal delivery drivers
// Follows Hexagonal Architecture

pub mod repositories;
pub mod terminal;
