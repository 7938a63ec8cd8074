// Process Outcome - the single structured success value of a supervised run

use std::borrow::Cow;

use super::error::SysExecError;

/// Structured outcome of one supervised run
///
/// Only built on the success path, so `parsed_std_out` is always present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutcome<R> {
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
    /// All stdout chunks, concatenated in arrival order
    pub std_out: Vec<u8>,
    /// All stderr chunks, concatenated in arrival order
    pub std_err: Vec<u8>,
    pub parsed_std_out: R,
    pub duration_ms: i64,
}

impl<R> ProcessOutcome<R> {
    pub fn stdout_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.std_out)
    }

    pub fn stderr_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.std_err)
    }
}

/// Result of a run: `Ok(None)` means quiet mode, nothing was spawned
pub type SysExecResult<R> = Result<Option<ProcessOutcome<R>>, SysExecError<R>>;

/// How a process came to a close
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessExit {
    /// Normal exit with a numeric code
    Code(i32),
    /// Terminated by a signal (number when the platform reports one)
    Signal(Option<i32>),
}

impl ProcessExit {
    pub fn code(&self) -> Option<i32> {
        match self {
            ProcessExit::Code(code) => Some(*code),
            ProcessExit::Signal(_) => None,
        }
    }

    pub fn from_status(status: std::process::ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return ProcessExit::Code(code);
        }

        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            ProcessExit::Signal(status.signal())
        }

        #[cfg(not(unix))]
        {
            ProcessExit::Signal(None)
        }
    }
}
