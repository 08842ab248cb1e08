//! Error types for whack.
//!
//! Only [`Error`] crosses the process boundary. The per-frame errors
//! ([`ParseError`], [`EncodeError`], [`CacheError`]) are absorbed by the
//! dispatcher and turned into counters.

use std::io;

use thiserror::Error;

/// Main error type for whack operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("device error: {0}")]
    Device(#[from] DeviceError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("metrics error: {0}")]
    Metrics(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadFile(#[source] io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[source] toml::de::Error),

    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
}

/// Validation errors for configuration values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("cache_capacity must be greater than 0")]
    ZeroCacheCapacity,

    #[error("cache_ttl_seconds must be greater than 0")]
    ZeroCacheTtl,

    #[error("cleanup_interval_seconds must be greater than 0")]
    ZeroCleanupInterval,

    #[error("burst_size must be between 1 and {max}, got {value}")]
    InvalidBurstSize { value: usize, max: usize },

    #[error("buffer_pool_size ({pool}) must be at least burst_size ({burst})")]
    BufferPoolTooSmall { pool: usize, burst: usize },

    #[error("pending_capacity must be greater than 0")]
    ZeroPendingCapacity,

    #[error("pending_timeout_seconds must be greater than 0")]
    ZeroPendingTimeout,

    #[error("poll_timeout_millis must be greater than 0")]
    ZeroPollTimeout,
}

/// Device-level errors. Fatal when raised during port bring-up.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("no suitable network interface found")]
    NoInterface,

    #[error("network interface {name:?} not found")]
    InterfaceNotFound { name: String },

    #[error("link is down on interface {name:?}")]
    LinkDown { name: String },

    #[error("failed to open datalink channel: {0}")]
    ChannelOpen(#[source] io::Error),

    #[error("unsupported channel type")]
    UnsupportedChannel,
}

/// Why a received frame could not be turned into a DNS message.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// Not UDP/53 over IPv4 or IPv6; not our traffic at all.
    #[error("frame does not carry DNS over UDP")]
    NotDns,

    #[error("malformed {layer}")]
    Malformed { layer: &'static str },

    #[error("DNS message carries no question")]
    NoQuestion,

    #[error("query name is {len} octets, maximum is {max}")]
    NameTooLong { len: usize, max: usize },
}

/// Why a response frame could not be built.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("cached payload could not be re-encoded: {0}")]
    Payload(#[from] hickory_proto::ProtoError),

    #[error("mixed IPv4/IPv6 addresses")]
    MixedAddressFamilies,

    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: usize, max: usize },

    #[error("{0} header construction failed")]
    Frame(&'static str),
}

/// Rejections at the answer cache boundary.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("payload of {len} bytes exceeds the {max} byte maximum")]
    InvalidPayload { len: usize, max: usize },

    #[error("ttl must be greater than zero")]
    ZeroTtl,
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;
