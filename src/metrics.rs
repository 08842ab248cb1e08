//! Metrics initialization and metric names.
//!
//! The dispatcher records through the `metrics` facade. Without an installed
//! recorder every call is a no-op, so workers never check whether export is on.

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::config::MetricsConfig;
use crate::error::{Error, Result};

pub const FRAMES_RECEIVED: &str = "whack_frames_received_total";
pub const QUERIES_RATE_LIMITED: &str = "whack_queries_rate_limited_total";
pub const PARSE_ERRORS: &str = "whack_parse_errors_total";
pub const CACHE_HITS: &str = "whack_cache_hits_total";
pub const CACHE_MISSES: &str = "whack_cache_misses_total";
pub const RESPONSES_SENT: &str = "whack_responses_sent_total";
pub const RESPONSES_DROPPED: &str = "whack_responses_dropped_total";
pub const ANSWERS_CACHED: &str = "whack_answers_cached_total";
pub const SWEPT_ENTRIES: &str = "whack_swept_entries_total";
pub const CACHE_ENTRIES: &str = "whack_cache_entries";

/// Initialize the metrics system based on configuration.
///
/// When enabled, this starts an HTTP server exposing a `/metrics` endpoint
/// for Prometheus to scrape. Must be called from within a tokio runtime.
pub fn init(config: &MetricsConfig) -> Result<()> {
    if !config.enabled {
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(config.listen)
        .install()
        .map_err(|err| Error::Metrics(err.to_string()))?;

    Ok(())
}
