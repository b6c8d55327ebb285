//! Diagnostic logging.
//!
//! Logs always go to stderr; stdout carries only command output.

use tracing_subscriber::EnvFilter;

/// Filter directives, e.g. `TRIFORM_LOG=triform_runtime=debug`
pub const ENV_LOG: &str = "TRIFORM_LOG";

/// Set to `json` for one JSON object per log line
pub const ENV_LOG_FORMAT: &str = "TRIFORM_LOG_FORMAT";

/// Install the global subscriber; `false` if one was already installed
pub fn init_logging() -> bool {
    let filter = EnvFilter::try_from_env(ENV_LOG).unwrap_or_else(|_| EnvFilter::new("warn"));
    let json = std::env::var(ENV_LOG_FORMAT).is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if json {
        builder.json().try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    }
}
