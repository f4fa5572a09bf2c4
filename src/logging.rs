use anyhow::{Context, Result, anyhow};
use std::io::{self, IsTerminal};
use tracing_subscriber::EnvFilter;

/// Environment variable overriding the log filter given on the command line.
pub const LOG_ENV: &str = "PIPESH_LOG";

/// Installs the global subscriber. Logs go to stderr so they never mix with shell output.
pub fn init(default_filter: &str) -> Result<()> {
    let filter = EnvFilter::try_from_env(LOG_ENV).or_else(|_| build_filter(default_filter))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow!("failed to install log subscriber: {e}"))
}

fn build_filter(directives: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(directives).with_context(|| format!("invalid log filter {directives:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_accepts_levels_and_targets() {
        assert!(build_filter("warn").is_ok());
        assert!(build_filter("pipesh=trace,info").is_ok());
    }
}
