// Application Layer - Settlement primitive and orchestration helpers

pub mod constants;
pub mod hooks;
pub mod panic_guard;
pub mod promise;
pub mod reporting;

// Re-exports
pub use hooks::{load_settings, HookRunner};
pub use panic_guard::{execute_guarded, PanicGuardResult};
pub use promise::{
    CancellationToken, EnhancedPromise, Handlers, Message, RejectHandle, RejectIfOptions,
};
pub use reporting::{run_with_log, LoggedRunError, RunWithLogOptions};
