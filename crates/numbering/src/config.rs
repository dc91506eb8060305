//! Numbering configuration loaded from environment variables.

use std::time::Duration;

/// Tunables for the numbering protocol.
///
/// Reads from environment variables:
/// - `STORE_TIMEOUT_MS` — upper bound on any single store call (default: `5000`)
#[derive(Debug, Clone)]
pub struct NumberingConfig {
    pub store_timeout: Duration,
}

impl NumberingConfig {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            store_timeout: std::env::var("STORE_TIMEOUT_MS")
                .ok()
                .and_then(|ms| ms.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.store_timeout),
        }
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }
}

impl Default for NumberingConfig {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_secs(5),
        }
    }
}
