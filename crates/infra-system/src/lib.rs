// SysExec Infrastructure - System Adapters
// Implements: CommandRunner (supervised child processes)

mod run_state;
pub mod sys_exec;
pub mod watchdog;

pub use sys_exec::SysExec;
pub use watchdog::WatchdogRegistry;
