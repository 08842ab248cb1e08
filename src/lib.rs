//! Whack - a passive DNS answer cache.
//!
//! Whack watches DNS traffic on a network interface. Queries that miss are
//! remembered; when the resolver's answer goes by, it is cached. A repeated
//! query is answered straight from the cache with a frame built for the
//! querier, racing the real resolver.
//!
//! # Architecture
//!
//! - [`network`]: burst packet I/O and Ethernet/IP/UDP framing
//! - [`dns`]: classifying DNS frames and building responses
//! - [`cache`]: the capacity-bounded answer cache with TTL expiry
//! - [`dispatch`]: the per-queue receive/answer/learn loop
//! - [`config`]: configuration loading and validation
//! - [`clock`]: the time source handed to the dispatcher
//! - [`metrics`]: Prometheus export
//! - [`error`]: error types
//!
//! # Testing
//!
//! Time is always passed in, so the cache can be exercised without sleeping:
//!
//! ```rust
//! use std::num::NonZeroUsize;
//! use std::time::{Duration, Instant};
//!
//! use whack::cache::{AnswerCache, QueryKey};
//!
//! let mut cache = AnswerCache::new(NonZeroUsize::new(2).unwrap(), Duration::from_secs(60));
//! let key = QueryKey::new("Example.com.", 1, 1).unwrap();
//! let now = Instant::now();
//!
//! cache.insert(key.clone(), vec![0u8; 32], Some(Duration::from_secs(30)), now).unwrap();
//! assert!(cache.lookup(&key, now).is_some());
//! assert!(cache.lookup(&key, now + Duration::from_secs(30)).is_none());
//! ```

pub mod cache;
pub mod clock;
pub mod config;
pub mod dispatch;
pub mod dns;
pub mod error;
pub mod metrics;
pub mod network;

pub use config::Config;
pub use error::{Error, Result};
