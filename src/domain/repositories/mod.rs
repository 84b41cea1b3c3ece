// Repository interfaces implemented by the infrastructure layer

pub mod state_store;

pub use state_store::StateStore;
