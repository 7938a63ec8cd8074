// Run options recognized by the supervised process runner

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::application::constants::DEFAULT_READ_TIMEOUT_MS;

/// Options for one supervised run
///
/// Deserializable so hook files and env-driven config can carry them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SysExecOptions {
    /// Never spawn; settle immediately with no outcome (dry-run)
    pub quiet: bool,
    /// Allowed silence on stdout+stderr combined; 0 disables the watchdog
    pub read_timeout_ms: u64,
    /// Working directory (inherited when unset)
    pub cwd: Option<PathBuf>,
    /// Extra environment, added on top of the inherited one
    pub env: BTreeMap<String, String>,
}

impl Default for SysExecOptions {
    fn default() -> Self {
        Self {
            quiet: false,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            cwd: None,
            env: BTreeMap::new(),
        }
    }
}

impl SysExecOptions {
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn with_read_timeout_ms(mut self, read_timeout_ms: u64) -> Self {
        self.read_timeout_ms = read_timeout_ms;
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Watchdog timeout, `None` when disabled
    pub fn read_timeout(&self) -> Option<Duration> {
        (self.read_timeout_ms > 0).then(|| Duration::from_millis(self.read_timeout_ms))
    }
}
