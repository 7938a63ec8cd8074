// Panic isolation for caller-supplied code (parsers, promise bodies)
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::error;

/// Result of a panic-guarded execution
#[derive(Debug)]
pub enum PanicGuardResult<T> {
    /// Execution completed
    Success(T),
    /// Execution panicked
    Panicked(String),
}

impl<T> PanicGuardResult<T> {
    pub fn into_result(self) -> Result<T, String> {
        match self {
            PanicGuardResult::Success(value) => Ok(value),
            PanicGuardResult::Panicked(msg) => Err(msg),
        }
    }
}

/// Extract a readable message from a panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

/// Execute a closure with panic isolation
///
/// A panicking parser must not take the runner down with it; the panic is
/// caught and returned as `PanicGuardResult::Panicked`.
///
/// # Example
/// ```text
/// let result = execute_guarded(|| parser.parse(&stdout));
///
/// if let PanicGuardResult::Panicked(msg) = result {
///     println!("Caught panic: {}", msg);
/// }
/// ```
pub fn execute_guarded<F, T>(f: F) -> PanicGuardResult<T>
where
    F: FnOnce() -> T,
{
    // Callers only hand in shared references to immutable data
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => PanicGuardResult::Success(result),
        Err(payload) => {
            let panic_msg = panic_message(payload.as_ref());
            error!(panic_msg = %panic_msg, "Guarded call panicked");
            PanicGuardResult::Panicked(panic_msg)
        }
    }
}
