// Per-run mutable state, owned exclusively by one SysExec invocation

use crate::watchdog::Watchdog;

/// Which child stream a chunk came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StreamKind {
    Stdout,
    Stderr,
}

/// Chunks, read stamp, kill flag and the watchdog of one run
///
/// Discarded once the outcome is delivered; never shared between runs.
pub(crate) struct RunState {
    stdout_chunks: Vec<Vec<u8>>,
    stderr_chunks: Vec<Vec<u8>>,
    started_millis: i64,
    last_read_millis: i64,
    timeout_killed: bool,
    watchdog: Option<Watchdog>,
}

impl RunState {
    /// `started_millis` seeds the read stamp (process start)
    pub(crate) fn new(started_millis: i64) -> Self {
        Self {
            stdout_chunks: Vec::new(),
            stderr_chunks: Vec::new(),
            started_millis,
            last_read_millis: started_millis,
            timeout_killed: false,
            watchdog: None,
        }
    }

    pub(crate) fn started_millis(&self) -> i64 {
        self.started_millis
    }

    pub(crate) fn arm_watchdog(&mut self, watchdog: Watchdog) {
        self.watchdog = Some(watchdog);
    }

    /// Take the watchdog out (dropping it stops the timer)
    pub(crate) fn disarm_watchdog(&mut self) -> Option<Watchdog> {
        self.watchdog.take()
    }

    /// Wait for the next watchdog tick; pending forever when disarmed
    pub(crate) async fn watchdog_tick(&mut self) {
        match self.watchdog.as_mut() {
            Some(watchdog) => watchdog.tick().await,
            None => std::future::pending().await,
        }
    }

    /// Append a chunk in arrival order and stamp the read time
    pub(crate) fn record(&mut self, stream: StreamKind, chunk: &[u8], now_millis: i64) {
        self.last_read_millis = now_millis;
        match stream {
            StreamKind::Stdout => self.stdout_chunks.push(chunk.to_vec()),
            StreamKind::Stderr => self.stderr_chunks.push(chunk.to_vec()),
        }
    }

    pub(crate) fn silence_ms(&self, now_millis: i64) -> i64 {
        now_millis - self.last_read_millis
    }

    /// True exactly once: on the first breached tick of an armed watchdog
    pub(crate) fn should_kill(&self, now_millis: i64) -> bool {
        !self.timeout_killed
            && self
                .watchdog
                .as_ref()
                .is_some_and(|w| w.is_breached(self.silence_ms(now_millis)))
    }

    pub(crate) fn mark_timeout_killed(&mut self) {
        self.timeout_killed = true;
    }

    pub(crate) fn timeout_killed(&self) -> bool {
        self.timeout_killed
    }

    /// Concatenate a stream's chunks (drains them)
    pub(crate) fn take_output(&mut self, stream: StreamKind) -> Vec<u8> {
        let chunks = match stream {
            StreamKind::Stdout => std::mem::take(&mut self.stdout_chunks),
            StreamKind::Stderr => std::mem::take(&mut self.stderr_chunks),
        };
        chunks.concat()
    }
}
