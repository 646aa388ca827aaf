/// Persister trait and the JSON implementation
pub mod state_persister;

/// Key-value storage backends
pub mod store;
