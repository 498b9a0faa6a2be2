//! Concrete collaborators backed by external services.

pub mod backend;

pub use backend::BackendClient;
