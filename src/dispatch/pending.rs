//! Outstanding queries awaiting their response.
//!
//! Only a response that completes a query seen on the wire is allowed into
//! the answer cache. The table is bounded and entries expire on their own, so
//! queries that never get an answer cannot pile up.
//!
//! Whether a query is still outstanding is decided against the caller's
//! `now`, the same time source the cache uses. moka's own time-to-live only
//! reclaims memory for entries nobody asks about again.

use std::time::{Duration, Instant};

use moka::sync::Cache;

use crate::cache::QueryKey;

#[derive(Clone)]
pub struct PendingQueries {
    inner: Cache<(QueryKey, u16), Instant>,
    timeout: Duration,
}

impl PendingQueries {
    pub fn new(capacity: u64, timeout: Duration) -> Self {
        let inner = Cache::builder()
            .max_capacity(capacity)
            .time_to_live(timeout)
            .build();

        Self { inner, timeout }
    }

    /// Remember a query that missed the cache at `now`.
    pub fn record(&self, key: QueryKey, id: u16, now: Instant) {
        self.inner.insert((key, id), now);
    }

    /// Whether a response for `key` with transaction `id`, seen at `now`,
    /// completes an outstanding query. The query is forgotten either way.
    pub fn complete(&self, key: &QueryKey, id: u16, now: Instant) -> bool {
        self.inner
            .remove(&(key.clone(), id))
            .is_some_and(|asked_at| now.saturating_duration_since(asked_at) < self.timeout)
    }

    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Approximate number of outstanding queries.
    pub fn len(&self) -> u64 {
        self.inner.run_pending_tasks();
        self.inner.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
