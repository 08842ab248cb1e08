//! Configuration loading and validation.

use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ConfigError, Result, ValidationError};

/// Largest burst a single receive call may request.
pub const MAX_BURST_SIZE: usize = 512;

/// Main configuration for the whack cache.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Network interface to capture on. If None, auto-detect.
    pub interface: Option<String>,

    /// Maximum number of cached answers per worker.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// TTL applied to answers that carry no usable TTL of their own.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_seconds: u64,

    /// Wall-clock period between expiry sweeps.
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_seconds: u64,

    /// Maximum frames pulled per receive burst.
    #[serde(default = "default_burst_size")]
    pub burst_size: usize,

    /// Queries per second looked up in the cache. 0 disables the gate.
    #[serde(default = "default_rate_limit")]
    pub rate_limit: u32,

    /// Number of frame buffers backing the capture port.
    #[serde(default = "default_buffer_pool_size")]
    pub buffer_pool_size: usize,

    /// Capture read timeout, bounding how long an empty burst can block.
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_millis: u64,

    /// Pause after an empty burst before polling again.
    #[serde(default = "default_idle_pause")]
    pub idle_pause_micros: u64,

    /// Put the interface into promiscuous mode.
    #[serde(default = "default_promiscuous")]
    pub promiscuous: bool,

    /// Outstanding queries remembered while waiting for their response.
    #[serde(default = "default_pending_capacity")]
    pub pending_capacity: u64,

    /// How long an outstanding query waits for its response.
    #[serde(default = "default_pending_timeout")]
    pub pending_timeout_seconds: u64,

    /// Prometheus exporter settings.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Prometheus exporter settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Address of the `/metrics` HTTP listener.
    #[serde(default = "default_metrics_listen")]
    pub listen: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: default_metrics_listen(),
        }
    }
}

const fn default_cache_capacity() -> usize {
    10_000
}

const fn default_cache_ttl() -> u64 {
    3600
}

const fn default_cleanup_interval() -> u64 {
    60
}

const fn default_burst_size() -> usize {
    32
}

const fn default_rate_limit() -> u32 {
    5000
}

const fn default_buffer_pool_size() -> usize {
    8192
}

const fn default_poll_timeout() -> u64 {
    10
}

const fn default_idle_pause() -> u64 {
    50
}

const fn default_promiscuous() -> bool {
    true
}

const fn default_pending_capacity() -> u64 {
    65_536
}

const fn default_pending_timeout() -> u64 {
    5
}

fn default_metrics_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9090))
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate().map_err(ConfigError::from)?;
        Ok(config)
    }

    fn validate(&self) -> std::result::Result<(), ValidationError> {
        if self.cache_capacity == 0 {
            return Err(ValidationError::ZeroCacheCapacity);
        }
        if self.cache_ttl_seconds == 0 {
            return Err(ValidationError::ZeroCacheTtl);
        }
        if self.cleanup_interval_seconds == 0 {
            return Err(ValidationError::ZeroCleanupInterval);
        }
        if self.burst_size == 0 || self.burst_size > MAX_BURST_SIZE {
            return Err(ValidationError::InvalidBurstSize {
                value: self.burst_size,
                max: MAX_BURST_SIZE,
            });
        }
        if self.buffer_pool_size < self.burst_size {
            return Err(ValidationError::BufferPoolTooSmall {
                pool: self.buffer_pool_size,
                burst: self.burst_size,
            });
        }
        if self.pending_capacity == 0 {
            return Err(ValidationError::ZeroPendingCapacity);
        }
        if self.pending_timeout_seconds == 0 {
            return Err(ValidationError::ZeroPendingTimeout);
        }
        if self.poll_timeout_millis == 0 {
            return Err(ValidationError::ZeroPollTimeout);
        }
        Ok(())
    }

    /// Cache capacity as a non-zero count. Validation guarantees it is positive.
    pub fn capacity(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.cache_capacity).unwrap_or(NonZeroUsize::MIN)
    }

    pub const fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }

    pub const fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_seconds)
    }

    pub const fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_millis)
    }

    pub const fn idle_pause(&self) -> Duration {
        Duration::from_micros(self.idle_pause_micros)
    }

    pub const fn pending_timeout(&self) -> Duration {
        Duration::from_secs(self.pending_timeout_seconds)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interface: None,
            cache_capacity: default_cache_capacity(),
            cache_ttl_seconds: default_cache_ttl(),
            cleanup_interval_seconds: default_cleanup_interval(),
            burst_size: default_burst_size(),
            rate_limit: default_rate_limit(),
            buffer_pool_size: default_buffer_pool_size(),
            poll_timeout_millis: default_poll_timeout(),
            idle_pause_micros: default_idle_pause(),
            promiscuous: default_promiscuous(),
            pending_capacity: default_pending_capacity(),
            pending_timeout_seconds: default_pending_timeout(),
            metrics: MetricsConfig::default(),
        }
    }
}
