use std::time::Duration;

/// Configuration for the standard behaviors and logging setup.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// `tracing` filter directive used when `RUST_LOG` is not set.
    pub log_filter: String,
    /// Emit JSON log lines instead of human-readable ones.
    pub json_logs: bool,
    /// Upper bound for one request's pipeline, in milliseconds.
    pub request_timeout_ms: u64,
}

impl DispatchConfig {
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            log_filter: "info".to_string(),
            json_logs: false,
            request_timeout_ms: 30_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = DispatchConfig::default();
        assert_eq!(config.log_filter, "info");
        assert!(!config.json_logs);
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn request_timeout_follows_millis() {
        let config = DispatchConfig {
            request_timeout_ms: 250,
            ..DispatchConfig::default()
        };
        assert_eq!(config.request_timeout(), Duration::from_millis(250));
    }
}
