// Domain Layer - Pure types of a supervised run

pub mod error;
pub mod hook;
pub mod options;
pub mod outcome;
pub mod parser;

// Re-exports
pub use error::{BoxError, ErrorDetails, ErrorKind, SysExecError};
pub use hook::{HookCommand, HookSettings};
pub use options::SysExecOptions;
pub use outcome::{ProcessExit, ProcessOutcome, SysExecResult};
pub use parser::{
    looks_like_syntax_error, JsonParser, NpmJsonParser, OutputParser, ParseError,
    PlaintextParser,
};
