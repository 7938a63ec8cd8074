// Command Runner Port
// Object-safe view of the supervised process runner (plaintext output),
// used by application services that only need "run this and tell me".

use async_trait::async_trait;

use crate::domain::{SysExecOptions, SysExecResult};

/// Supervised command execution
///
/// Implementations:
/// - SysExec (infra-system): real child processes with a read-timeout watchdog
/// - MockCommandRunner: scripted results for application tests
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run one command to completion, parsing stdout as plain text
    ///
    /// # Errors
    /// Any `SysExecError` kind; the payload is the lossy stdout text.
    async fn run_plaintext(
        &self,
        command: &str,
        args: &[String],
        options: &SysExecOptions,
    ) -> SysExecResult<String>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::domain::{ErrorDetails, ErrorKind, ProcessOutcome, SysExecError};
    use std::sync::{Arc, Mutex};

    /// Mock runner behavior
    #[derive(Debug, Clone)]
    pub enum MockBehavior {
        /// Exit 0 with the given stdout
        Success(String),
        /// Exit with the given non-zero code and stdout
        NonZeroExit(i32, String),
        /// Killed by the watchdog
        Timeout,
        /// Command could not be spawned
        SpawnFailure,
    }

    /// Mock Command Runner for testing
    ///
    /// Commands not listed in the script succeed with empty output.
    pub struct MockCommandRunner {
        script: Arc<Mutex<Vec<(String, MockBehavior)>>>,
        calls: Arc<Mutex<Vec<(String, Vec<String>)>>>,
    }

    impl MockCommandRunner {
        pub fn new() -> Self {
            Self {
                script: Arc::new(Mutex::new(Vec::new())),
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }

        /// Script the behavior for a command name
        pub fn on(self, command: impl Into<String>, behavior: MockBehavior) -> Self {
            self.script.lock().unwrap().push((command.into(), behavior));
            self
        }

        /// Commands actually run, in order
        pub fn calls(&self) -> Vec<(String, Vec<String>)> {
            self.calls.lock().unwrap().clone()
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    impl Default for MockCommandRunner {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl CommandRunner for MockCommandRunner {
        async fn run_plaintext(
            &self,
            command: &str,
            args: &[String],
            options: &SysExecOptions,
        ) -> SysExecResult<String> {
            if options.quiet {
                return Ok(None);
            }

            self.calls
                .lock()
                .unwrap()
                .push((command.to_string(), args.to_vec()));

            let behavior = self
                .script
                .lock()
                .unwrap()
                .iter()
                .find(|(name, _)| name == command)
                .map(|(_, behavior)| behavior.clone())
                .unwrap_or_else(|| MockBehavior::Success(String::new()));

            let outcome = |code: i32, stdout: String| ProcessOutcome {
                exit_code: Some(code),
                std_out: stdout.clone().into_bytes(),
                std_err: Vec::new(),
                parsed_std_out: stdout,
                duration_ms: 1,
            };

            match behavior {
                MockBehavior::Success(stdout) => Ok(Some(outcome(0, stdout))),
                MockBehavior::NonZeroExit(code, stdout) => Err(SysExecError::new(
                    format!("spawned process returned non-success ({code}) exit code"),
                    ErrorDetails::new(ErrorKind::NonZeroExit { code }).with_data(stdout),
                )),
                MockBehavior::Timeout => Err(SysExecError::new(
                    "spawned process was killed due to read timeout",
                    ErrorDetails::new(ErrorKind::KilledByTimeout {
                        read_timeout_ms: options.read_timeout_ms,
                    }),
                )),
                MockBehavior::SpawnFailure => Err(SysExecError::new(
                    format!("failed to spawn `{command}`"),
                    ErrorDetails::new(ErrorKind::SpawnFailure),
                )),
            }
        }
    }
}
