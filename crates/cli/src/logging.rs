// Logging setup (tracing-subscriber)
use anyhow::{Context, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "sysexec=info";

/// Install the global subscriber
///
/// `SYSEXEC_LOG_FORMAT=json` selects JSON lines, anything else the pretty
/// format. Logs go to stderr so stdout stays free for command output.
pub fn init(verbose: bool) -> Result<()> {
    let log_format = std::env::var("SYSEXEC_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let default_filter = if verbose { "sysexec=debug" } else { DEFAULT_FILTER };
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .context("Failed to create env filter")?;

    match log_format.as_str() {
        "json" => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        _ => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().pretty().with_writer(std::io::stderr))
            .try_init(),
    }
    .context("Failed to install tracing subscriber")
}
