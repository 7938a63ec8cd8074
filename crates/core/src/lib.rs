// SysExec Core - Domain Logic, Enhanced Promise & Ports
// NO process spawning (Hexagonal Architecture: see sysexec-infra-system)

pub mod application;
pub mod domain;
pub mod error;
pub mod port;

pub use error::{AppError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
