// Port Layer - Interfaces for external dependencies

pub mod command_runner;
pub mod id_provider; // For deterministic testing
pub mod time_provider;

// Re-exports
pub use command_runner::CommandRunner;
pub use id_provider::IdProvider;
pub use time_provider::TimeProvider;
