//! Process-wide `tracing` subscriber setup.

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Build the filter from `config.filter`.
fn build_filter(config: &LoggingConfig) -> anyhow::Result<EnvFilter> {
    EnvFilter::try_new(&config.filter)
        .with_context(|| format!("Invalid log filter '{}'", config.filter))
}

/// Install a fmt subscriber. Fails if one is already installed.
pub fn init(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = build_filter(config)?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(config.ansi)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(filter: &str) -> LoggingConfig {
        LoggingConfig {
            filter: filter.into(),
            ansi: false,
        }
    }

    #[test]
    fn accepts_target_directives() {
        assert!(build_filter(&config("authsync=debug,reqwest=warn")).is_ok());
    }

    #[test]
    fn rejects_malformed_level() {
        let err = build_filter(&config("authsync=loud")).unwrap_err();
        assert!(err.to_string().contains("authsync=loud"));
    }

    #[test]
    fn second_init_is_an_error() {
        let cfg = config("info");
        let _ = init(&cfg);
        assert!(init(&cfg).is_err());
    }
}
