// Logged runs - await an operation and report "<main>: <result>" once
use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use tracing::{error, info};

/// Options of a logged run
pub struct RunWithLogOptions<T> {
    /// Skip the operation entirely (it is never polled)
    pub quiet: bool,
    pub main_message: String,
    pub success_message: String,
    /// Extra check on the value; `false` turns success into failure
    pub success_condition: Option<Box<dyn Fn(&T) -> bool + Send + Sync>>,
    /// Return the failure to the caller instead of swallowing it
    pub propagate_errors: bool,
}

impl<T> RunWithLogOptions<T> {
    pub fn new(main_message: impl Into<String>, success_message: impl Into<String>) -> Self {
        Self {
            quiet: false,
            main_message: main_message.into(),
            success_message: success_message.into(),
            success_condition: None,
            propagate_errors: true,
        }
    }

    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn success_condition(mut self, check: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        self.success_condition = Some(Box::new(check));
        self
    }

    pub fn propagate_errors(mut self, propagate: bool) -> Self {
        self.propagate_errors = propagate;
        self
    }
}

/// Failure of a logged run
#[derive(Debug)]
pub enum LoggedRunError<E> {
    /// The operation itself failed
    Failed(E),
    /// The operation succeeded but the success condition rejected its value
    ConditionNotMet,
}

impl<E: fmt::Display> fmt::Display for LoggedRunError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoggedRunError::Failed(e) => fmt::Display::fmt(e, f),
            LoggedRunError::ConditionNotMet => {
                f.write_str("unknown error (result condition was not met)")
            }
        }
    }
}

impl<E: StdError + 'static> StdError for LoggedRunError<E> {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            LoggedRunError::Failed(e) => Some(e),
            LoggedRunError::ConditionNotMet => None,
        }
    }
}

/// Run `operation`, logging one success or failure line
///
/// Returns `Ok(None)` in quiet mode, and on failure when errors are not
/// propagated.
pub async fn run_with_log<T, E, F>(
    operation: F,
    options: RunWithLogOptions<T>,
) -> Result<Option<T>, LoggedRunError<E>>
where
    F: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    let RunWithLogOptions {
        quiet,
        main_message,
        success_message,
        success_condition,
        propagate_errors,
    } = options;

    if quiet {
        info!("{}: skipped (quiet)", main_message);
        return Ok(None);
    }

    let failure = match operation.await {
        Ok(value) => {
            let accepted = success_condition
                .as_ref()
                .map_or(true, |check| check(&value));
            if accepted {
                info!("{}: {}", main_message, success_message);
                return Ok(Some(value));
            }
            LoggedRunError::ConditionNotMet
        }
        Err(e) => LoggedRunError::Failed(e),
    };

    error!("{}: {}", main_message, failure);
    if propagate_errors {
        Err(failure)
    } else {
        Ok(None)
    }
}
