// Supervision constants (No magic values)
use std::time::Duration;

/// Watchdog poll interval (1s)
/// Fixed; worst-case kill latency is read_timeout + this interval
pub const WATCHDOG_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Default allowed read silence before the watchdog kills (30s)
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 30_000;

/// Read timeout used for user hook commands (60s)
pub const HOOK_READ_TIMEOUT_MS: u64 = 60_000;

/// Exit code treated as success
pub const SUCCESS_EXIT_CODE: i32 = 0;

/// Size of one read from a child stream (8 KiB)
pub const READ_CHUNK_SIZE: usize = 8 * 1024;
