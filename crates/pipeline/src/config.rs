//! Pipeline configuration loaded from environment variables.

use std::time::Duration;

/// Topic names, series selection, and polling behaviour for the adapter.
///
/// Reads from environment variables:
/// - `INBOUND_TOPIC` — document-prepared topic (default: `"document-prepared"`)
/// - `OUTBOUND_TOPIC` — invoice-created topic (default: `"invoice-created"`)
/// - `DEAD_LETTER_TOPIC` — rejected messages (default: `"document-prepared.dead-letter"`)
/// - `NUMBERING_SERIES` — series name to number from (default: `"1"`)
/// - `BATCH_SIZE` — deliveries handled concurrently per poll (default: `16`)
/// - `POLL_INTERVAL_MS` — idle wait between empty polls (default: `100`)
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub inbound_topic: String,
    pub outbound_topic: String,
    pub dead_letter_topic: String,
    pub series_name: String,
    pub batch_size: usize,
    pub poll_interval: Duration,
}

impl PipelineConfig {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            inbound_topic: std::env::var("INBOUND_TOPIC").unwrap_or(defaults.inbound_topic),
            outbound_topic: std::env::var("OUTBOUND_TOPIC").unwrap_or(defaults.outbound_topic),
            dead_letter_topic: std::env::var("DEAD_LETTER_TOPIC")
                .unwrap_or(defaults.dead_letter_topic),
            series_name: std::env::var("NUMBERING_SERIES").unwrap_or(defaults.series_name),
            batch_size: std::env::var("BATCH_SIZE")
                .ok()
                .and_then(|n| n.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.batch_size),
            poll_interval: std::env::var("POLL_INTERVAL_MS")
                .ok()
                .and_then(|ms| ms.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            inbound_topic: "document-prepared".to_string(),
            outbound_topic: "invoice-created".to_string(),
            dead_letter_topic: "document-prepared.dead-letter".to_string(),
            series_name: "1".to_string(),
            batch_size: 16,
            poll_interval: Duration::from_millis(100),
        }
    }
}
