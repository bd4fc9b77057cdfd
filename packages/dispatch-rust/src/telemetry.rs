//! Process-wide `tracing` subscriber setup for hosts and the demo binary.

use anyhow::Context as _;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::DispatchConfig;

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `config.log_filter`. Output is JSON lines when
/// `config.json_logs` is set, human-readable otherwise.
///
/// # Errors
///
/// Fails if the filter directive does not parse or a global subscriber is
/// already installed.
pub fn init_tracing(config: &DispatchConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .with_context(|| format!("invalid log filter `{}`", config.log_filter))?;

    let registry = tracing_subscriber::registry().with(filter);
    if config.json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    }
    .context("tracing subscriber already installed")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unparseable_filter() {
        // Only meaningful without RUST_LOG overriding the configured filter.
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let config = DispatchConfig {
            log_filter: "nexus=notalevel".to_string(),
            ..DispatchConfig::default()
        };
        let err = init_tracing(&config).unwrap_err();
        assert!(err.to_string().contains("invalid log filter"));
    }
}
